//! Scope - resource container の階層と後始末
//!
//! - **ServiceContainer**: 親をたどる型付きサービスの入れ物
//! - **TeardownList**: 逆順・1 回だけ・失敗を集約する後始末リスト

pub mod container;
pub mod teardown;

pub use self::container::{ServiceContainer, ServiceScope};
pub use self::teardown::TeardownList;
