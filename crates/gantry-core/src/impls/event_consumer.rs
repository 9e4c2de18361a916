//! BuildEventConsumer の実装
//!
//! - **NoopEventConsumer**: 何もしない（client が event を購読していないとき）
//! - **RecordingEventConsumer**: 受け取った event を順に記録する（テストと demo 用）

use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::domain::BuildEvent;
use crate::ports::BuildEventConsumer;

pub struct NoopEventConsumer;

impl BuildEventConsumer for NoopEventConsumer {
    fn dispatch(&self, _event: &BuildEvent) {}
}

#[derive(Default)]
pub struct RecordingEventConsumer {
    events: Mutex<Vec<BuildEvent>>,
}

impl RecordingEventConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BuildEventConsumer for RecordingEventConsumer {
    fn dispatch(&self, event: &BuildEvent) {
        trace!(?event, "build event recorded");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
