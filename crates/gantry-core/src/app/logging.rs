//! LoggingManager - ビルドごとの出力の窓口
//!
//! level が設定されるまでは何も流さない。builder は listener を合成する前に
//! level を設定するので、listener が設定前の出力を見ることはない。

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, info, warn};

use super::listeners::ListenerManager;
use crate::domain::{BuildId, LogLevel};

pub struct LoggingManager {
    build_id: BuildId,
    level: RwLock<Option<LogLevel>>,
    listeners: Arc<ListenerManager>,
}

impl LoggingManager {
    pub fn new(build_id: BuildId, listeners: Arc<ListenerManager>) -> Self {
        Self {
            build_id,
            level: RwLock::new(None),
            listeners,
        }
    }

    pub fn set_level(&self, level: LogLevel) {
        *self.level.write().unwrap_or_else(PoisonError::into_inner) = Some(level);
        debug!(build_id = %self.build_id, ?level, "build log level configured");
    }

    pub fn level(&self) -> Option<LogLevel> {
        *self.level.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// `level` の出力が今の設定で表示されるか
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.level().is_some_and(|configured| level >= configured)
    }

    /// tracing に流し、listener の `on_output` に渡す
    pub fn log(&self, level: LogLevel, text: &str) {
        if !self.is_enabled(level) {
            return;
        }
        let build_id = &self.build_id;
        match level.as_tracing_level() {
            tracing::Level::ERROR => error!(build_id = %build_id, "{text}"),
            tracing::Level::WARN => warn!(build_id = %build_id, "{text}"),
            tracing::Level::INFO => info!(build_id = %build_id, "{text}"),
            _ => debug!(build_id = %build_id, "{text}"),
        }
        self.listeners.on_output(level, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::listeners::{BuildListener, ListenerKind, ListenerRegistration};
    use std::sync::Mutex;
    use ulid::Ulid;

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl BuildListener for Capture {
        fn on_output(&self, _level: LogLevel, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    fn manager_with_capture() -> (LoggingManager, Arc<Capture>) {
        let capture = Arc::new(Capture::default());
        let listeners = Arc::new(ListenerManager::new());
        listeners
            .install(vec![ListenerRegistration::new(
                ListenerKind::UsageLocationReporter,
                capture.clone(),
            )])
            .unwrap();
        (
            LoggingManager::new(BuildId::from_ulid(Ulid::new()), listeners),
            capture,
        )
    }

    #[test]
    fn nothing_flows_before_the_level_is_set() {
        let (logging, capture) = manager_with_capture();

        logging.log(LogLevel::Error, "too early");
        assert!(capture.0.lock().unwrap().is_empty());

        logging.set_level(LogLevel::Lifecycle);
        logging.log(LogLevel::Error, "now visible");
        assert_eq!(*capture.0.lock().unwrap(), vec!["now visible"]);
    }

    #[test]
    fn finer_levels_are_filtered() {
        let (logging, capture) = manager_with_capture();
        logging.set_level(LogLevel::Warn);

        logging.log(LogLevel::Info, "chatty");
        logging.log(LogLevel::Lifecycle, "progress");
        logging.log(LogLevel::Warn, "careful");

        assert_eq!(*capture.0.lock().unwrap(), vec!["careful"]);
        assert!(logging.is_enabled(LogLevel::Error));
        assert!(!logging.is_enabled(LogLevel::Debug));
    }
}
