//! Loggers - 合成に使われる組み込み listener
//!
//! - **TaskExecutionLogger**: task ごとの progress operation（top-level ではビルド全体の進捗も）
//! - **BuildSummaryLogger**: `BUILD SUCCESSFUL in 3s` のような最終行（top-level のみ）
//! - **TaskExecutionStatistics** / **CacheStatisticsReporter**: task の結果の集計と報告
//! - **ProfileEventAdapter** / **ReportGeneratingProfileListener**: フェーズと task の所要時間

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::invocation::BuildInvocation;
use super::listeners::BuildListener;
use super::logging::LoggingManager;
use crate::domain::{
    BuildEvent, BuildOutcome, BuildPhase, BuildRequestMetaData, LifecycleError, LogLevel,
    TaskOutcome,
};
use crate::ports::{Clock, ProgressLogger, ProgressLoggerFactory};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn log_to(logging: &Weak<LoggingManager>, level: LogLevel, text: &str) {
    if let Some(logging) = logging.upgrade() {
        logging.log(level, text);
    }
}

fn elapsed_label(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    let elapsed = (to - from).num_milliseconds().max(0);
    if elapsed < 1_000 {
        format!("{elapsed}ms")
    } else {
        format!("{}s", elapsed / 1_000)
    }
}

// ========================================
// 進捗表示
// ========================================

/// BuildProgressLogger は top-level build 全体の進捗表示
///
/// LauncherFactory が 1 つだけ持ち、top-level build ごとに作り直される operation を管理する。
/// nested build はここに触らない（top-level の表示を二重にしない）。
pub struct BuildProgressLogger {
    factory: Arc<dyn ProgressLoggerFactory>,
    state: Mutex<BuildProgressState>,
}

#[derive(Default)]
struct BuildProgressState {
    operation: Option<Box<dyn ProgressLogger>>,
    completed_tasks: usize,
}

impl BuildProgressLogger {
    pub fn new(factory: Arc<dyn ProgressLoggerFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(BuildProgressState::default()),
        }
    }

    pub fn build_started(&self) {
        let operation = self.factory.new_operation("build", "Build");
        operation.started("INITIALIZING");
        let mut state = lock(&self.state);
        state.operation = Some(operation);
        state.completed_tasks = 0;
    }

    pub fn phase_started(&self, phase: BuildPhase) {
        let label = match phase {
            BuildPhase::Settings => "INITIALIZING",
            BuildPhase::Configuration => "CONFIGURING",
            BuildPhase::Execution => "EXECUTING",
        };
        if let Some(operation) = &lock(&self.state).operation {
            operation.progress(label);
        }
    }

    pub fn task_completed(&self) {
        let mut state = lock(&self.state);
        state.completed_tasks += 1;
        let status = format!("EXECUTING ({} tasks completed)", state.completed_tasks);
        if let Some(operation) = &state.operation {
            operation.progress(&status);
        }
    }

    pub fn build_finished(&self, outcome: &BuildOutcome) {
        let operation = lock(&self.state).operation.take();
        if let Some(operation) = operation {
            let status = match outcome {
                BuildOutcome::Succeeded => "BUILD SUCCESSFUL",
                BuildOutcome::Failed { .. } => "BUILD FAILED",
                BuildOutcome::Cancelled => "BUILD CANCELLED",
            };
            operation.completed(status);
        }
    }
}

/// TaskExecutionLogger がビルド全体の進捗を誰に伝えるか
#[derive(Clone)]
pub enum LoggerProvider {
    Progress(Arc<BuildProgressLogger>),
    NoOp,
}

impl LoggerProvider {
    fn progress(&self) -> Option<&BuildProgressLogger> {
        match self {
            Self::Progress(logger) => Some(logger),
            Self::NoOp => None,
        }
    }
}

pub struct TaskExecutionLogger {
    factory: Arc<dyn ProgressLoggerFactory>,
    provider: LoggerProvider,
    running: Mutex<HashMap<String, Box<dyn ProgressLogger>>>,
}

impl TaskExecutionLogger {
    pub fn new(factory: Arc<dyn ProgressLoggerFactory>, provider: LoggerProvider) -> Self {
        Self {
            factory,
            provider,
            running: Mutex::new(HashMap::new()),
        }
    }
}

impl BuildListener for TaskExecutionLogger {
    fn build_started(&self, _build: &BuildInvocation) -> Result<(), LifecycleError> {
        if let Some(progress) = self.provider.progress() {
            progress.build_started();
        }
        Ok(())
    }

    fn on_event(&self, _build: &BuildInvocation, event: &BuildEvent) {
        match event {
            BuildEvent::PhaseStarted { phase } => {
                if let Some(progress) = self.provider.progress() {
                    progress.phase_started(*phase);
                }
            }
            BuildEvent::TaskStarted { path } => {
                let operation = self.factory.new_operation("task-execution", path);
                operation.started(&format!("> Task {path}"));
                lock(&self.running).insert(path.clone(), operation);
            }
            BuildEvent::TaskFinished { path, outcome } => {
                let operation = lock(&self.running).remove(path);
                if let Some(operation) = operation {
                    let status = match outcome {
                        TaskOutcome::Executed => "",
                        TaskOutcome::FromCache => "FROM-CACHE",
                        TaskOutcome::UpToDate => "UP-TO-DATE",
                        TaskOutcome::Skipped => "SKIPPED",
                        TaskOutcome::Failed => "FAILED",
                    };
                    operation.completed(status);
                }
                if let Some(progress) = self.provider.progress() {
                    progress.task_completed();
                }
            }
            _ => {}
        }
    }

    fn build_finished(
        &self,
        _build: &BuildInvocation,
        outcome: &BuildOutcome,
    ) -> Result<(), LifecycleError> {
        // 終わらなかった task の operation も閉じておく
        for (_, operation) in lock(&self.running).drain() {
            operation.completed("INTERRUPTED");
        }
        if let Some(progress) = self.provider.progress() {
            progress.build_finished(outcome);
        }
        Ok(())
    }
}

// ========================================
// ビルド結果の要約
// ========================================

pub struct BuildSummaryLogger {
    logging: Weak<LoggingManager>,
    clock: Arc<dyn Clock>,
    request: Arc<BuildRequestMetaData>,
}

impl BuildSummaryLogger {
    pub fn new(
        logging: Weak<LoggingManager>,
        clock: Arc<dyn Clock>,
        request: Arc<BuildRequestMetaData>,
    ) -> Self {
        Self {
            logging,
            clock,
            request,
        }
    }
}

impl BuildListener for BuildSummaryLogger {
    fn build_started(&self, build: &BuildInvocation) -> Result<(), LifecycleError> {
        log_to(
            &self.logging,
            LogLevel::Info,
            &format!(
                "Starting build {} for {}",
                build.id(),
                self.request.client.display_name
            ),
        );
        Ok(())
    }

    fn build_finished(
        &self,
        _build: &BuildInvocation,
        outcome: &BuildOutcome,
    ) -> Result<(), LifecycleError> {
        let took = elapsed_label(self.request.start_time, self.clock.now());
        match outcome {
            BuildOutcome::Succeeded => {
                log_to(&self.logging, LogLevel::Lifecycle, &format!("BUILD SUCCESSFUL in {took}"));
            }
            BuildOutcome::Failed { message } => {
                log_to(&self.logging, LogLevel::Error, &format!("BUILD FAILED in {took}"));
                log_to(&self.logging, LogLevel::Error, message);
            }
            BuildOutcome::Cancelled => {
                log_to(&self.logging, LogLevel::Lifecycle, &format!("BUILD CANCELLED in {took}"));
            }
        }
        Ok(())
    }
}

// ========================================
// キャッシュ統計
// ========================================

/// task の結果の集計値
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskExecutionCounts {
    pub executed: usize,
    pub from_cache: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TaskExecutionCounts {
    pub fn count(&self, outcome: TaskOutcome) -> usize {
        match outcome {
            TaskOutcome::Executed => self.executed,
            TaskOutcome::FromCache => self.from_cache,
            TaskOutcome::UpToDate => self.up_to_date,
            TaskOutcome::Skipped => self.skipped,
            TaskOutcome::Failed => self.failed,
        }
    }

    pub fn actionable(&self) -> usize {
        TaskOutcome::ALL
            .into_iter()
            .filter(|outcome| outcome.is_actionable())
            .map(|outcome| self.count(outcome))
            .sum()
    }

    fn record(&mut self, outcome: TaskOutcome) {
        let slot = match outcome {
            TaskOutcome::Executed => &mut self.executed,
            TaskOutcome::FromCache => &mut self.from_cache,
            TaskOutcome::UpToDate => &mut self.up_to_date,
            TaskOutcome::Skipped => &mut self.skipped,
            TaskOutcome::Failed => &mut self.failed,
        };
        *slot += 1;
    }
}

#[derive(Default)]
pub struct TaskExecutionStatistics {
    counts: Mutex<TaskExecutionCounts>,
}

impl TaskExecutionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TaskExecutionCounts {
        *lock(&self.counts)
    }
}

impl BuildListener for TaskExecutionStatistics {
    fn on_event(&self, _build: &BuildInvocation, event: &BuildEvent) {
        if let BuildEvent::TaskFinished { outcome, .. } = event {
            lock(&self.counts).record(*outcome);
        }
    }
}

pub struct CacheStatisticsReporter {
    statistics: Arc<TaskExecutionStatistics>,
    logging: Weak<LoggingManager>,
}

impl CacheStatisticsReporter {
    pub fn new(statistics: Arc<TaskExecutionStatistics>, logging: Weak<LoggingManager>) -> Self {
        Self {
            statistics,
            logging,
        }
    }

    /// `3 actionable tasks: 1 executed, 2 from cache (66%)`
    pub fn render(counts: &TaskExecutionCounts) -> Option<String> {
        let actionable = counts.actionable();
        if actionable == 0 {
            return None;
        }
        let mut line = format!(
            "{actionable} actionable task{}: {} executed, {} from cache",
            if actionable == 1 { "" } else { "s" },
            counts.executed,
            counts.from_cache
        );
        if counts.from_cache > 0 {
            line.push_str(&format!(" ({}%)", counts.from_cache * 100 / actionable));
        }
        Some(line)
    }
}

impl BuildListener for CacheStatisticsReporter {
    fn build_finished(
        &self,
        _build: &BuildInvocation,
        _outcome: &BuildOutcome,
    ) -> Result<(), LifecycleError> {
        if let Some(line) = Self::render(&self.statistics.snapshot()) {
            log_to(&self.logging, LogLevel::Lifecycle, &line);
        }
        Ok(())
    }
}

// ========================================
// プロファイル
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseTiming {
    pub phase: BuildPhase,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTiming {
    pub path: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub outcome: TaskOutcome,
}

/// 1 回のビルドのプロファイル
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildProfile {
    pub build_started: Option<DateTime<Utc>>,
    pub build_finished: Option<DateTime<Utc>>,
    pub phases: Vec<PhaseTiming>,
    pub tasks: Vec<TaskTiming>,
}

impl BuildProfile {
    /// 人が読むためのテキストレポート
    pub fn render(&self) -> String {
        let mut report = String::from("Profile report\n");
        if let (Some(started), Some(finished)) = (self.build_started, self.build_finished) {
            report.push_str(&format!("  total: {}\n", elapsed_label(started, finished)));
        }
        for phase in &self.phases {
            let took = phase
                .finished
                .map(|f| elapsed_label(phase.started, f))
                .unwrap_or_else(|| "unfinished".to_string());
            report.push_str(&format!("  {:?}: {took}\n", phase.phase));
        }
        for task in &self.tasks {
            report.push_str(&format!(
                "  {} {}: {:?}\n",
                task.path,
                elapsed_label(task.started, task.finished),
                task.outcome
            ));
        }
        report
    }
}

pub struct ProfileEventAdapter {
    clock: Arc<dyn Clock>,
    profile: Mutex<BuildProfile>,
    running_tasks: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ProfileEventAdapter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            profile: Mutex::new(BuildProfile::default()),
            running_tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn profile(&self) -> BuildProfile {
        lock(&self.profile).clone()
    }
}

impl BuildListener for ProfileEventAdapter {
    fn build_started(&self, _build: &BuildInvocation) -> Result<(), LifecycleError> {
        lock(&self.profile).build_started = Some(self.clock.now());
        Ok(())
    }

    fn on_event(&self, _build: &BuildInvocation, event: &BuildEvent) {
        let now = self.clock.now();
        match event {
            BuildEvent::PhaseStarted { phase } => lock(&self.profile).phases.push(PhaseTiming {
                phase: *phase,
                started: now,
                finished: None,
            }),
            BuildEvent::PhaseFinished { phase } => {
                let mut profile = lock(&self.profile);
                if let Some(timing) = profile
                    .phases
                    .iter_mut()
                    .rev()
                    .find(|t| t.phase == *phase && t.finished.is_none())
                {
                    timing.finished = Some(now);
                }
            }
            BuildEvent::TaskStarted { path } => {
                lock(&self.running_tasks).insert(path.clone(), now);
            }
            BuildEvent::TaskFinished { path, outcome } => {
                let started = lock(&self.running_tasks).remove(path).unwrap_or(now);
                lock(&self.profile).tasks.push(TaskTiming {
                    path: path.clone(),
                    started,
                    finished: now,
                    outcome: *outcome,
                });
            }
            _ => {}
        }
    }

    fn build_finished(
        &self,
        _build: &BuildInvocation,
        _outcome: &BuildOutcome,
    ) -> Result<(), LifecycleError> {
        lock(&self.profile).build_finished = Some(self.clock.now());
        Ok(())
    }
}

pub struct ReportGeneratingProfileListener {
    profile: Arc<ProfileEventAdapter>,
    logging: Weak<LoggingManager>,
    last_report: Mutex<Option<String>>,
}

impl ReportGeneratingProfileListener {
    pub fn new(profile: Arc<ProfileEventAdapter>, logging: Weak<LoggingManager>) -> Self {
        Self {
            profile,
            logging,
            last_report: Mutex::new(None),
        }
    }

    pub fn last_report(&self) -> Option<String> {
        lock(&self.last_report).clone()
    }
}

impl BuildListener for ReportGeneratingProfileListener {
    fn build_finished(
        &self,
        _build: &BuildInvocation,
        _outcome: &BuildOutcome,
    ) -> Result<(), LifecycleError> {
        let report = self.profile.profile().render();
        log_to(&self.logging, LogLevel::Lifecycle, &report);
        *lock(&self.last_report) = Some(report);
        Ok(())
    }
}
