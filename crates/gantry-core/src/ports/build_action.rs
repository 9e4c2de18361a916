//! BuildAction port - 実行エンジンの入口
//!
//! `BuildInvocation::run` がこれを呼ぶ。nested build が必要なら action の中で
//! `build.nested_build_factory()` から作って `run` する。

use async_trait::async_trait;

use crate::app::BuildInvocation;
use crate::domain::BuildFailure;

#[async_trait]
pub trait BuildAction: Send + Sync {
    async fn execute(&self, build: &BuildInvocation) -> Result<(), BuildFailure>;
}
