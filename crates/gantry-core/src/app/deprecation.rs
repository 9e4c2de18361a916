//! Deprecation - 非推奨機能の警告と、その発生場所の報告
//!
//! # プロセス全体の設定（注意）
//! deprecation trace を取るかどうかは **プロセス全体で 1 つ** のフラグ。
//! invocation ごとの設定ではなく、builder が組み立てのたびに上書きし、即座に
//! 並行して動いている他の invocation にも効く。単純化のための割り切りで、
//! 次に上書きされるまでその値が使われる。

use std::backtrace::Backtrace;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::invocation::BuildInvocation;
use super::listeners::BuildListener;
use super::logging::LoggingManager;
use crate::domain::{BuildEvent, LogLevel};

static TRACE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

/// deprecation trace の取得を切り替える（プロセス全体に即時反映）
pub fn set_trace_logging_enabled(enabled: bool) {
    TRACE_LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
}

/// deprecation trace を取る設定になっているか（プロセス全体の値）
pub fn is_trace_logging_enabled() -> bool {
    TRACE_LOGGING_ENABLED.load(Ordering::SeqCst)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// UsageLocationReporter は直近に評価された script を覚えておく
///
/// 合成の最後に置かれるので、それまでの listener がした logging 設定の変更を
/// すべて見たあとで動く。
#[derive(Default)]
pub struct UsageLocationReporter {
    current_script: Mutex<Option<String>>,
}

impl UsageLocationReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_location(&self) -> Option<String> {
        lock(&self.current_script).clone()
    }
}

impl BuildListener for UsageLocationReporter {
    fn on_event(&self, _build: &BuildInvocation, event: &BuildEvent) {
        if let BuildEvent::ScriptEvaluated { script } = event {
            *lock(&self.current_script) = Some(script.clone());
        }
    }
}

/// DeprecationLogger は build container に bind される非推奨警告の窓口
///
/// 同じ機能については 1 ビルドにつき 1 回だけ警告する。
pub struct DeprecationLogger {
    logging: Arc<LoggingManager>,
    reporter: Arc<UsageLocationReporter>,
    reported: Mutex<HashSet<String>>,
    messages: Mutex<Vec<String>>,
}

impl DeprecationLogger {
    pub fn new(logging: Arc<LoggingManager>, reporter: Arc<UsageLocationReporter>) -> Self {
        Self {
            logging,
            reporter,
            reported: Mutex::new(HashSet::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// `feature` の使用を警告する。初回なら true
    pub fn nag_user_of(&self, feature: &str, advice: &str) -> bool {
        if !lock(&self.reported).insert(feature.to_string()) {
            return false;
        }
        let mut message = format!("{feature} has been deprecated.");
        if !advice.is_empty() {
            message.push(' ');
            message.push_str(advice);
        }
        if let Some(location) = self.reporter.current_location() {
            message.push_str(&format!(" (used in {location})"));
        }
        if is_trace_logging_enabled() {
            message.push_str(&format!("\n{}", Backtrace::force_capture()));
        }
        self.logging.log(LogLevel::Warn, &message);
        lock(&self.messages).push(message);
        true
    }

    /// これまでに出した警告
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}
