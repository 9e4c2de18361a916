//! Observability - tracing の初期化と tracker のスナップショット

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::domain::BuildId;

/// フィルタを上書きする環境変数
pub const LOG_ENV: &str = "GANTRY_LOG";

/// プロセス全体の tracing subscriber を設定する
///
/// `GANTRY_LOG` があればそれをフィルタに使い、無ければ `default_level`。
/// 2 回目以降の呼び出しは何もしない。
pub fn init_tracing(default_level: Level) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .ok();
}

/// BuildTracker のスナップショット（stack は底から順）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStatus {
    pub depth: usize,
    pub current: Option<BuildId>,
    pub stack: Vec<BuildId>,
}
