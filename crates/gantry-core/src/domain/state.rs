//! State - invocation の状態とビルド結果

use serde::{Deserialize, Serialize};

/// InvocationState は invocation のライフサイクル状態
///
/// # 状態遷移
/// - created → running → finished → stopped
/// - created → stopped（一度も run せずに捨てた場合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Created,
    Running,
    Finished,
    Stopped,
}

impl InvocationState {
    pub fn can_run(self) -> bool {
        self == Self::Created
    }
}

/// BuildOutcome は 1 回のビルドの結果
///
/// ビルドの失敗はライフサイクル層のエラーではないので、`LifecycleError` とは分けている。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    Succeeded,
    Failed { message: String },
    Cancelled,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// BuildFailure は BuildAction が返す失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BuildFailure {
    pub message: String,
}

impl BuildFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<crate::domain::LifecycleError> for BuildFailure {
    fn from(err: crate::domain::LifecycleError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<Result<(), BuildFailure>> for BuildOutcome {
    fn from(result: Result<(), BuildFailure>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(failure) => Self::Failed {
                message: failure.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_created_invocations_can_run() {
        assert!(InvocationState::Created.can_run());
        assert!(!InvocationState::Running.can_run());
        assert!(!InvocationState::Finished.can_run());
        assert!(!InvocationState::Stopped.can_run());
    }

    #[test]
    fn action_result_maps_to_outcome() {
        assert_eq!(BuildOutcome::from(Ok(())), BuildOutcome::Succeeded);
        assert_eq!(
            BuildOutcome::from(Err(BuildFailure::new("compile failed"))),
            BuildOutcome::Failed {
                message: "compile failed".to_string()
            }
        );
    }
}
