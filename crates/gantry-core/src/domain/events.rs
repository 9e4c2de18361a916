//! Events - ビルド中に発生するイベント
//!
//! 実行エンジンが `BuildInvocation::emit` で流すイベントと、
//! ライフサイクル自身が流す開始／終了イベントをまとめて定義します。
//! event consumer（クライアントへの進捗通知）にもそのまま渡るので Serialize できる形にしています。

use serde::{Deserialize, Serialize};

use super::ids::BuildId;
use super::state::BuildOutcome;

/// task がどう終わったか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskOutcome {
    Executed,
    FromCache,
    UpToDate,
    Skipped,
    Failed,
}

impl TaskOutcome {
    pub const ALL: [TaskOutcome; 5] = [
        Self::Executed,
        Self::FromCache,
        Self::UpToDate,
        Self::Skipped,
        Self::Failed,
    ];

    /// キャッシュ統計の母数になるか（実際に仕事をした、またはキャッシュで代替した）
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Executed | Self::FromCache | Self::Failed)
    }
}

/// ビルドの大まかなフェーズ（通過する順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildPhase {
    Settings,
    Configuration,
    Execution,
}

/// BuildEvent はビルドのライフサイクル上のイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    BuildStarted {
        build_id: BuildId,
        nested: bool,
    },
    PhaseStarted {
        phase: BuildPhase,
    },
    PhaseFinished {
        phase: BuildPhase,
    },
    ScriptEvaluated {
        script: String,
    },
    TaskStarted {
        path: String,
    },
    TaskFinished {
        path: String,
        outcome: TaskOutcome,
    },
    BuildFinished {
        build_id: BuildId,
        outcome: BuildOutcome,
    },
}
