//! Impls - ports の既定実装
//!
//! host（CLI）やテストが組み立てに使う、依存を持たない実装です。
//!
//! # 含まれる実装
//! - **DefaultSettingsLoaderFactory**: top-level / nested の settings loader
//! - **NoopEventConsumer** / **RecordingEventConsumer**: build event の受け口
//! - **DefaultUserHomeServiceRegistry**: user-home services の参照カウント付きプール
//! - **RecordingDeploymentRegistry**: 新しい top-level build の記録
//! - **TracingProgressLoggerFactory** / **RecordingProgressLoggerFactory**: 進捗表示

pub mod deployment;
pub mod event_consumer;
pub mod progress;
pub mod settings;
pub mod user_home;

pub use self::deployment::RecordingDeploymentRegistry;
pub use self::event_consumer::{NoopEventConsumer, RecordingEventConsumer};
pub use self::progress::{RecordingProgressLoggerFactory, TracingProgressLoggerFactory};
pub use self::settings::{DefaultSettingsLoaderFactory, NestedSettingsLoader, TopLevelSettingsLoader};
pub use self::user_home::DefaultUserHomeServiceRegistry;
