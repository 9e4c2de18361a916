//! App - ビルドのライフサイクル
//!
//! ports と scope を組み合わせて、invocation の生成・入れ子・後始末を実装します。
//!
//! # 主要コンポーネント
//! - **LauncherFactory**: top-level build の入口（tracker を所有）
//! - **InvocationBuilder**: build container の組み立て
//! - **NestedBuildFactory**: 実行中のビルドから nested build を作る
//! - **BuildInvocation**: 1 回のビルドのハンドルと run ライフサイクル
//! - **BuildTracker**: current build の LIFO stack
//! - **listeners / loggers / logging / deprecation**: ビルドを観測する部品

pub mod builder;
pub mod deprecation;
pub mod invocation;
pub mod launcher;
pub mod listeners;
pub mod loggers;
pub mod logging;
pub mod nested;
pub mod tracker;

pub use self::deprecation::{
    DeprecationLogger, UsageLocationReporter, is_trace_logging_enabled, set_trace_logging_enabled,
};
pub use self::invocation::BuildInvocation;
pub use self::launcher::{BuildRequestContext, LauncherFactory};
pub use self::listeners::{
    BuildListener, Composition, CompositionInputs, ListenerKind, ListenerManager,
    ListenerRegistration, compose_listeners,
};
pub use self::loggers::{
    BuildProfile, BuildProgressLogger, LoggerProvider, TaskExecutionCounts,
    TaskExecutionStatistics,
};
pub use self::logging::LoggingManager;
pub use self::nested::NestedBuildFactory;
pub use self::tracker::{BuildTracker, TrackerListener};
