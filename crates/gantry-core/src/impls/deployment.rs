//! RecordingDeploymentRegistry - 新しい top-level build を記録するだけの DeploymentRegistry

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::app::BuildInvocation;
use crate::domain::BuildId;
use crate::ports::DeploymentRegistry;

#[derive(Default)]
pub struct RecordingDeploymentRegistry {
    builds: Mutex<Vec<BuildId>>,
}

impl RecordingDeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通知された build の id（通知順）
    pub fn builds(&self) -> Vec<BuildId> {
        self.builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DeploymentRegistry for RecordingDeploymentRegistry {
    fn on_new_build(&self, build: &BuildInvocation) {
        debug!(build_id = %build.id(), "deployment registry notified");
        self.builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(build.id());
    }
}
