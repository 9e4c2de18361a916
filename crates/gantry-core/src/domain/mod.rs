//! ドメインモデル（ID、パラメータ、イベント、結果、エラーなど）
//!
//! ライフサイクル層が扱う値オブジェクトだけを置く。container や tracker のような
//! 状態を持つ部品は `scope` / `app` 側にある。

pub mod cancellation;
pub mod errors;
pub mod events;
pub mod ids;
pub mod metadata;
pub mod parameters;
pub mod state;

pub use self::cancellation::BuildCancellationToken;
pub use self::errors::{ErrorKind, LifecycleError, TeardownError, TeardownFailure};
pub use self::events::{BuildEvent, BuildPhase, TaskOutcome};
pub use self::ids::{BuildId, SessionId};
pub use self::metadata::{BuildClientMetaData, BuildRequestMetaData};
pub use self::parameters::{BuildParameters, LogLevel, ShowStacktrace};
pub use self::state::{BuildFailure, BuildOutcome, InvocationState};
