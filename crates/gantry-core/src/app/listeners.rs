//! Listeners - invocation ごとの listener の合成
//!
//! listener の登録は実行時の `add_listener` 呼び出しではなく、invocation を組み立てるときに
//! 1 回だけ評価される順序付きリスト（[`compose_listeners`]）で決まる。
//! 登録順 = コールバック順。
//!
//! # 固定の相対順序
//! 1. TaskExecutionLogger（nested では no-op の logger provider）
//! 2. BuildSummaryLogger（top-level のみ）
//! 3. TrackerListener
//! 4. TaskExecutionStatistics + CacheStatisticsReporter（task output cache 有効時）
//! 5. ProfileEventAdapter + ReportGeneratingProfileListener（profile 有効時）
//! 6. UsageLocationReporter（常に最後）
//!
//! ListenerManager は invocation ごとに作られ、グローバルな listener manager は存在しない。
//! あるビルドの listener が次のビルドを観測することはない。

use std::sync::{Arc, OnceLock, Weak};

use serde::Serialize;
use tracing::warn;

use super::deprecation::UsageLocationReporter;
use super::invocation::BuildInvocation;
use super::logging::LoggingManager;
use super::loggers::{
    BuildSummaryLogger, CacheStatisticsReporter, LoggerProvider, ProfileEventAdapter,
    ReportGeneratingProfileListener, TaskExecutionLogger, TaskExecutionStatistics,
};
use super::tracker::{BuildTracker, TrackerListener};
use crate::domain::{BuildEvent, BuildOutcome, BuildParameters, BuildRequestMetaData, LifecycleError, LogLevel};
use crate::ports::{Clock, ProgressLoggerFactory};

/// BuildListener はビルドのライフサイクルを観測する
///
/// どのメソッドも既定では何もしない。必要なものだけ実装する。
pub trait BuildListener: Send + Sync {
    /// どの listener にも build_started を送る前に全員に聞く。ここで断られたら開始しない
    fn admit(&self, _build: &BuildInvocation) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn build_started(&self, _build: &BuildInvocation) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn on_event(&self, _build: &BuildInvocation, _event: &BuildEvent) {}

    /// LoggingManager を通った出力（level 設定後のものだけが届く）
    fn on_output(&self, _level: LogLevel, _text: &str) {}

    fn build_finished(
        &self,
        _build: &BuildInvocation,
        _outcome: &BuildOutcome,
    ) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// 合成に現れる listener の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    TaskExecutionLogger,
    BuildSummaryLogger,
    Tracker,
    TaskExecutionStatistics,
    CacheStatisticsReporter,
    ProfileEventAdapter,
    ReportGeneratingProfileListener,
    UsageLocationReporter,
}

#[derive(Clone)]
pub struct ListenerRegistration {
    pub kind: ListenerKind,
    pub listener: Arc<dyn BuildListener>,
}

impl ListenerRegistration {
    pub fn new(kind: ListenerKind, listener: Arc<dyn BuildListener>) -> Self {
        Self { kind, listener }
    }
}

/// invocation ごとの listener の集合
///
/// `install` は 1 回だけ。以降は読み取り専用なので、コールバック中に
/// 出力を書いても（= on_output が再入しても）ロックで詰まらない。
#[derive(Default)]
pub struct ListenerManager {
    registrations: OnceLock<Vec<ListenerRegistration>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, registrations: Vec<ListenerRegistration>) -> Result<(), LifecycleError> {
        self.registrations
            .set(registrations)
            .map_err(|_| LifecycleError::invariant("listeners are already installed for this build"))
    }

    fn registrations(&self) -> &[ListenerRegistration] {
        self.registrations.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn kinds(&self) -> Vec<ListenerKind> {
        self.registrations().iter().map(|r| r.kind).collect()
    }

    /// 全員の admit を通してから、登録順に build_started を通知する
    ///
    /// 途中で失敗したら、すでに開始した listener には逆順に失敗として
    /// build_finished を送り、それ以降の listener には何も知らせない。
    pub fn build_started(&self, build: &BuildInvocation) -> Result<(), LifecycleError> {
        let registrations = self.registrations();
        for registration in registrations {
            registration.listener.admit(build)?;
        }
        for (started, registration) in registrations.iter().enumerate() {
            if let Err(err) = registration.listener.build_started(build) {
                let outcome = BuildOutcome::Failed {
                    message: err.to_string(),
                };
                for earlier in registrations[..started].iter().rev() {
                    if let Err(rollback) = earlier.listener.build_finished(build, &outcome) {
                        warn!(listener = ?earlier.kind, error = %rollback, "listener failed while rolling back a start");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn on_event(&self, build: &BuildInvocation, event: &BuildEvent) {
        for registration in self.registrations() {
            registration.listener.on_event(build, event);
        }
    }

    pub fn on_output(&self, level: LogLevel, text: &str) {
        for registration in self.registrations() {
            registration.listener.on_output(level, text);
        }
    }

    /// 全員に通知してから、最初のエラーを返す
    pub fn build_finished(
        &self,
        build: &BuildInvocation,
        outcome: &BuildOutcome,
    ) -> Result<(), LifecycleError> {
        let mut first_error = None;
        for registration in self.registrations() {
            if let Err(err) = registration.listener.build_finished(build, outcome) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// 合成の入力
pub struct CompositionInputs<'a> {
    pub nested: bool,
    pub parameters: &'a BuildParameters,
    pub request: Arc<BuildRequestMetaData>,
    pub logger_provider: LoggerProvider,
    pub progress_logger_factory: Arc<dyn ProgressLoggerFactory>,
    pub tracker: Arc<BuildTracker>,
    pub logging: Weak<LoggingManager>,
    pub clock: Arc<dyn Clock>,
}

/// 合成の結果
///
/// 他の部品からも参照される listener は型付きで取り出せるようにしておく。
pub struct Composition {
    pub registrations: Vec<ListenerRegistration>,
    pub statistics: Option<Arc<TaskExecutionStatistics>>,
    pub profile: Option<Arc<ProfileEventAdapter>>,
    pub usage_reporter: Arc<UsageLocationReporter>,
}

impl Composition {
    pub fn kinds(&self) -> Vec<ListenerKind> {
        self.registrations.iter().map(|r| r.kind).collect()
    }
}

/// listener の順序付きリストを組み立てる（副作用なし）
pub fn compose_listeners(inputs: CompositionInputs<'_>) -> Composition {
    let logger_provider = if inputs.nested {
        LoggerProvider::NoOp
    } else {
        inputs.logger_provider
    };

    let mut registrations = vec![ListenerRegistration::new(
        ListenerKind::TaskExecutionLogger,
        Arc::new(TaskExecutionLogger::new(
            Arc::clone(&inputs.progress_logger_factory),
            logger_provider,
        )),
    )];

    if !inputs.nested {
        registrations.push(ListenerRegistration::new(
            ListenerKind::BuildSummaryLogger,
            Arc::new(BuildSummaryLogger::new(
                inputs.logging.clone(),
                Arc::clone(&inputs.clock),
                Arc::clone(&inputs.request),
            )),
        ));
    }

    registrations.push(ListenerRegistration::new(
        ListenerKind::Tracker,
        Arc::new(TrackerListener::new(Arc::clone(&inputs.tracker))),
    ));

    let statistics = inputs.parameters.task_output_cache_enabled.then(|| {
        let statistics = Arc::new(TaskExecutionStatistics::new());
        registrations.push(ListenerRegistration::new(
            ListenerKind::TaskExecutionStatistics,
            statistics.clone(),
        ));
        registrations.push(ListenerRegistration::new(
            ListenerKind::CacheStatisticsReporter,
            Arc::new(CacheStatisticsReporter::new(
                statistics.clone(),
                inputs.logging.clone(),
            )),
        ));
        statistics
    });

    let profile = inputs.parameters.profile.then(|| {
        let profile = Arc::new(ProfileEventAdapter::new(Arc::clone(&inputs.clock)));
        registrations.push(ListenerRegistration::new(
            ListenerKind::ProfileEventAdapter,
            profile.clone(),
        ));
        registrations.push(ListenerRegistration::new(
            ListenerKind::ReportGeneratingProfileListener,
            Arc::new(ReportGeneratingProfileListener::new(
                profile.clone(),
                inputs.logging.clone(),
            )),
        ));
        profile
    });

    let usage_reporter = Arc::new(UsageLocationReporter::new());
    registrations.push(ListenerRegistration::new(
        ListenerKind::UsageLocationReporter,
        usage_reporter.clone(),
    ));

    Composition {
        registrations,
        statistics,
        profile,
        usage_reporter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::loggers::BuildProgressLogger;
    use crate::domain::BuildClientMetaData;
    use crate::impls::RecordingProgressLoggerFactory;
    use crate::domain::ErrorKind;
    use crate::ports::SystemClock;
    use crate::testutil::Harness;
    use chrono::Utc;
    use rstest::rstest;
    use std::sync::Mutex;
    use ListenerKind as K;

    /// 呼ばれたコールバックを共有の journal に書く listener
    struct Journal {
        name: &'static str,
        lines: Arc<Mutex<Vec<String>>>,
        refuse_admission: bool,
        fail_start: bool,
    }

    impl Journal {
        fn new(name: &'static str, lines: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                lines: lines.clone(),
                refuse_admission: false,
                fail_start: false,
            }
        }
    }

    impl BuildListener for Journal {
        fn admit(&self, _build: &BuildInvocation) -> Result<(), LifecycleError> {
            if self.refuse_admission {
                return Err(LifecycleError::invariant(format!("{} refused", self.name)));
            }
            Ok(())
        }

        fn build_started(&self, _build: &BuildInvocation) -> Result<(), LifecycleError> {
            if self.fail_start {
                return Err(LifecycleError::invariant(format!("{} cannot start", self.name)));
            }
            self.lines.lock().unwrap().push(format!("{} started", self.name));
            Ok(())
        }

        fn build_finished(
            &self,
            _build: &BuildInvocation,
            outcome: &BuildOutcome,
        ) -> Result<(), LifecycleError> {
            let status = if outcome.is_success() { "succeeded" } else { "failed" };
            self.lines.lock().unwrap().push(format!("{} finished {status}", self.name));
            Ok(())
        }
    }

    fn manager(listeners: Vec<Journal>) -> ListenerManager {
        let manager = ListenerManager::new();
        manager
            .install(
                listeners
                    .into_iter()
                    .map(|l| ListenerRegistration::new(K::UsageLocationReporter, Arc::new(l)))
                    .collect(),
            )
            .unwrap();
        manager
    }

    fn compose(nested: bool, parameters: &BuildParameters) -> Composition {
        let factory: Arc<dyn ProgressLoggerFactory> = Arc::new(RecordingProgressLoggerFactory::new());
        compose_listeners(CompositionInputs {
            nested,
            parameters,
            request: Arc::new(BuildRequestMetaData::new(
                BuildClientMetaData::new("test"),
                Utc::now(),
            )),
            logger_provider: LoggerProvider::Progress(Arc::new(BuildProgressLogger::new(
                factory.clone(),
            ))),
            progress_logger_factory: factory,
            tracker: Arc::new(BuildTracker::new()),
            logging: Weak::new(),
            clock: Arc::new(SystemClock),
        })
    }

    #[rstest]
    #[case::top_level_plain(false, false, false, vec![K::TaskExecutionLogger, K::BuildSummaryLogger, K::Tracker, K::UsageLocationReporter])]
    #[case::nested_plain(true, false, false, vec![K::TaskExecutionLogger, K::Tracker, K::UsageLocationReporter])]
    #[case::with_cache(false, true, false, vec![
        K::TaskExecutionLogger, K::BuildSummaryLogger, K::Tracker,
        K::TaskExecutionStatistics, K::CacheStatisticsReporter, K::UsageLocationReporter,
    ])]
    #[case::with_profile(true, false, true, vec![
        K::TaskExecutionLogger, K::Tracker,
        K::ProfileEventAdapter, K::ReportGeneratingProfileListener, K::UsageLocationReporter,
    ])]
    #[case::everything(false, true, true, vec![
        K::TaskExecutionLogger, K::BuildSummaryLogger, K::Tracker,
        K::TaskExecutionStatistics, K::CacheStatisticsReporter,
        K::ProfileEventAdapter, K::ReportGeneratingProfileListener, K::UsageLocationReporter,
    ])]
    fn composition_order_is_fixed(
        #[case] nested: bool,
        #[case] cache: bool,
        #[case] profile: bool,
        #[case] expected: Vec<ListenerKind>,
    ) {
        let parameters = BuildParameters::default()
            .with_task_output_cache(cache)
            .with_profile(profile);

        let composition = compose(nested, &parameters);

        assert_eq!(composition.kinds(), expected);
        assert_eq!(composition.statistics.is_some(), cache);
        assert_eq!(composition.profile.is_some(), profile);
    }

    #[test]
    fn install_is_one_shot() {
        let manager = ListenerManager::new();
        assert!(manager.kinds().is_empty());

        manager.install(Vec::new()).unwrap();
        let err = manager.install(Vec::new()).unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::InvariantViolation);
    }

    #[test]
    fn refused_admission_notifies_nobody() {
        let harness = Harness::new();
        let build = harness.top_level(BuildParameters::default()).unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let mut gate = Journal::new("gate", &lines);
        gate.refuse_admission = true;
        let manager = manager(vec![Journal::new("first", &lines), gate]);

        let err = manager.build_started(&build).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(lines.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_start_finishes_the_listeners_that_already_started() {
        let harness = Harness::new();
        let build = harness.top_level(BuildParameters::default()).unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let mut broken = Journal::new("broken", &lines);
        broken.fail_start = true;
        let manager = manager(vec![
            Journal::new("first", &lines),
            Journal::new("second", &lines),
            broken,
            Journal::new("never", &lines),
        ]);

        manager.build_started(&build).unwrap_err();

        assert_eq!(
            *lines.lock().unwrap(),
            vec![
                "first started",
                "second started",
                "second finished failed",
                "first finished failed",
            ]
        );
    }
}
