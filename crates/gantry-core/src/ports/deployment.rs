//! DeploymentRegistry port - continuous build 中の deployment 管理
//!
//! top-level build が作られるたびに 1 回だけ通知される。

use crate::app::BuildInvocation;

pub trait DeploymentRegistry: Send + Sync {
    fn on_new_build(&self, build: &BuildInvocation);
}
