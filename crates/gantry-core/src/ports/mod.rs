//! Ports - 外部 collaborator への抽象化レイヤー
//!
//! ライフサイクル層が「何をするか」を持たないための境界です。
//! 実行エンジン、settings 評価、IPC、user-home の資源管理はすべてこの trait の向こう側。

pub mod build_action;
pub mod clock;
pub mod deployment;
pub mod event_consumer;
pub mod id_generator;
pub mod progress;
pub mod settings;
pub mod user_home;

pub use self::build_action::BuildAction;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::deployment::DeploymentRegistry;
pub use self::event_consumer::BuildEventConsumer;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::progress::{ProgressLogger, ProgressLoggerFactory};
pub use self::settings::{Settings, SettingsLoader, SettingsLoaderFactory};
pub use self::user_home::UserHomeServiceRegistry;
