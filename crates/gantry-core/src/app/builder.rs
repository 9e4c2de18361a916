//! InvocationBuilder - build container の組み立てと invocation の生成
//!
//! # 組み立て順
//! 0. パラメータ検証（まだ何も確保していない）
//! 1. session から build container を作る
//! 2. リクエスト由来のシングルトンを bind（metadata, token, event consumer, nested factory, parameters）
//! 3. LoggingManager を作って level を設定（listener の合成より前）
//! 4. listener を合成して 1 回だけ install
//! 5. deprecation trace のプロセス全体フラグを設定し、DeprecationLogger を bind
//! 6. settings loader を選ぶ（nested / top-level）
//! 7. invocation を返す（tracker には積まない）
//!
//! # Fail-fast
//! 1 以降で失敗したら build container を閉じ、リクエストの teardown も流してから
//! エラーを返す。途中まで作ったものは残らない。

use std::sync::Arc;

use tracing::{debug, warn};

use super::deprecation::{DeprecationLogger, set_trace_logging_enabled};
use super::invocation::{BuildInvocation, InvocationParts};
use super::launcher::LauncherShared;
use super::listeners::{CompositionInputs, ListenerManager, compose_listeners};
use super::loggers::LoggerProvider;
use super::logging::LoggingManager;
use super::nested::NestedBuildFactory;
use crate::domain::{
    BuildCancellationToken, BuildId, BuildParameters, BuildRequestMetaData, LifecycleError,
};
use crate::ports::{BuildEventConsumer, ProgressLoggerFactory, SettingsLoader, SettingsLoaderFactory};
use crate::scope::{ServiceContainer, TeardownList};

/// 1 回の invocation 生成に必要な入力
pub(crate) struct InvocationRequest {
    pub parameters: BuildParameters,
    pub parent: Option<BuildInvocation>,
    pub metadata: Arc<BuildRequestMetaData>,
    pub cancellation: BuildCancellationToken,
    pub event_consumer: Arc<dyn BuildEventConsumer>,
    /// build container の親になる session
    pub session: ServiceContainer,
    /// invocation の teardown に引き継がれる後始末（new session の解放など）
    pub teardown: TeardownList,
}

/// 組み立て途中でできた、invocation に渡す部品
struct Wiring {
    parameters: Arc<BuildParameters>,
    listeners: Arc<ListenerManager>,
    logging: Arc<LoggingManager>,
    settings_loader: Arc<dyn SettingsLoader>,
}

pub(crate) struct InvocationBuilder {
    shared: Arc<LauncherShared>,
}

impl InvocationBuilder {
    pub fn new(shared: Arc<LauncherShared>) -> Self {
        Self { shared }
    }

    pub fn build(&self, request: InvocationRequest) -> Result<BuildInvocation, LifecycleError> {
        if let Err(err) = request.parameters.validate() {
            discard(&request.teardown, None);
            return Err(err);
        }

        let id = self.shared.id_generator.generate_build_id();
        let services = match ServiceContainer::for_session(&request.session, format!("build {id}")) {
            Ok(services) => services,
            Err(err) => {
                discard(&request.teardown, None);
                return Err(err);
            }
        };

        let wiring = match self.wire(id, &services, &request) {
            Ok(wiring) => wiring,
            Err(err) => {
                discard(&request.teardown, Some(&services));
                return Err(err);
            }
        };

        debug!(
            build_id = %id,
            nested = request.parent.is_some(),
            listeners = ?wiring.listeners.kinds(),
            "build invocation assembled"
        );
        Ok(BuildInvocation::from_parts(InvocationParts {
            id,
            parent: request.parent,
            parameters: wiring.parameters,
            services,
            listeners: wiring.listeners,
            logging: wiring.logging,
            settings_loader: wiring.settings_loader,
            cancellation: request.cancellation,
            event_consumer: request.event_consumer,
            teardown: request.teardown,
        }))
    }

    fn wire(
        &self,
        id: BuildId,
        services: &ServiceContainer,
        request: &InvocationRequest,
    ) -> Result<Wiring, LifecycleError> {
        let nested = request.parent.is_some();
        let parameters = Arc::new(request.parameters.clone());

        services.add(Arc::clone(&request.metadata))?;
        services.add(Arc::new(request.metadata.client.clone()))?;
        services.add(Arc::new(request.cancellation.clone()))?;
        services.add::<dyn BuildEventConsumer>(Arc::clone(&request.event_consumer))?;
        services.add(Arc::new(NestedBuildFactory::new(
            Arc::clone(&self.shared),
            request.session.clone(),
        )))?;
        services.add(Arc::clone(&parameters))?;

        let listeners = Arc::new(ListenerManager::new());
        let logging = Arc::new(LoggingManager::new(id, Arc::clone(&listeners)));
        logging.set_level(parameters.log_level);
        services.add(Arc::clone(&logging))?;

        let composition = compose_listeners(CompositionInputs {
            nested,
            parameters: &parameters,
            request: Arc::clone(&request.metadata),
            logger_provider: LoggerProvider::Progress(Arc::clone(&self.shared.progress_logger)),
            progress_logger_factory: services.get::<dyn ProgressLoggerFactory>()?,
            tracker: Arc::clone(&self.shared.tracker),
            logging: Arc::downgrade(&logging),
            clock: Arc::clone(&self.shared.clock),
        });
        if let Some(statistics) = &composition.statistics {
            services.add(Arc::clone(statistics))?;
        }
        if let Some(profile) = &composition.profile {
            services.add(Arc::clone(profile))?;
        }
        services.add(Arc::clone(&composition.usage_reporter))?;
        listeners.install(composition.registrations)?;
        services.add(Arc::clone(&listeners))?;

        set_trace_logging_enabled(parameters.show_stacktrace.captures_deprecation_traces());
        services.add(Arc::new(DeprecationLogger::new(
            Arc::clone(&logging),
            composition.usage_reporter,
        )))?;

        let factory = services.get::<dyn SettingsLoaderFactory>()?;
        let settings_loader = if nested {
            factory.for_nested_build()
        } else {
            factory.for_top_level_build()
        };
        services.add::<dyn SettingsLoader>(Arc::clone(&settings_loader))?;

        Ok(Wiring {
            parameters,
            listeners,
            logging,
            settings_loader,
        })
    }
}

/// 組み立てに失敗したときの後始末。元のエラーを優先し、後始末の失敗はログだけ残す
fn discard(teardown: &TeardownList, services: Option<&ServiceContainer>) {
    if let Some(services) = services
        && let Err(err) = services.close()
    {
        warn!(error = %err, "closing a partially built container failed");
    }
    if let Err(err) = teardown.run() {
        warn!(error = %err, "request teardown failed while discarding a build");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::deprecation::is_trace_logging_enabled;
    use crate::app::listeners::ListenerKind;
    use crate::app::loggers::TaskExecutionStatistics;
    use crate::domain::{BuildClientMetaData, ErrorKind, ShowStacktrace};
    use crate::ports::{Clock, DeploymentRegistry};
    use crate::testutil::Harness;
    use std::sync::Mutex;

    fn request(harness: &Harness, parameters: BuildParameters) -> InvocationRequest {
        InvocationRequest {
            parameters,
            parent: None,
            metadata: Arc::new(BuildRequestMetaData::new(
                BuildClientMetaData::new("builder test"),
                harness.clock.now(),
            )),
            cancellation: BuildCancellationToken::new(),
            event_consumer: harness.consumer.clone(),
            session: harness.session.clone(),
            teardown: TeardownList::new(),
        }
    }

    #[test]
    fn binds_request_singletons_in_the_build_container() {
        let harness = Harness::new();
        let builder = InvocationBuilder::new(Arc::clone(harness.launcher.shared()));

        let build = builder.build(request(&harness, BuildParameters::default())).unwrap();
        let services = build.services();

        assert_eq!(
            services.get::<BuildClientMetaData>().unwrap().display_name,
            "builder test"
        );
        assert!(
            services
                .get::<BuildCancellationToken>()
                .unwrap()
                .same_token(build.cancellation_token())
        );
        assert!(services.contains::<dyn BuildEventConsumer>());
        assert!(services.contains::<NestedBuildFactory>());
        assert!(services.contains::<DeprecationLogger>());
        assert!(services.contains::<ListenerManager>());
        assert!(!services.contains::<TaskExecutionStatistics>());
        assert_eq!(build.settings_loader().name(), "top-level");
        assert_eq!(build.logging().level(), Some(build.parameters().log_level));
        // build の binding は session には漏れない
        assert!(!harness.session.contains::<NestedBuildFactory>());
        // session の binding は build から引ける
        assert!(services.contains::<dyn DeploymentRegistry>());
    }

    #[test]
    fn cache_flag_adds_statistics_listeners() {
        let harness = Harness::new();
        let builder = InvocationBuilder::new(Arc::clone(harness.launcher.shared()));

        let build = builder
            .build(request(
                &harness,
                BuildParameters::default().with_task_output_cache(true),
            ))
            .unwrap();

        let kinds = build.listener_kinds();
        assert!(kinds.contains(&ListenerKind::TaskExecutionStatistics));
        assert!(kinds.contains(&ListenerKind::CacheStatisticsReporter));
        assert_eq!(kinds.last(), Some(&ListenerKind::UsageLocationReporter));
        assert!(build.services().contains::<TaskExecutionStatistics>());
    }

    #[test]
    fn invalid_parameters_run_the_request_teardown() {
        let harness = Harness::new();
        let builder = InvocationBuilder::new(Arc::clone(harness.launcher.shared()));
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let req = request(&harness, BuildParameters::default().with_user_home_dir(""));
        req.teardown
            .register("mark", move || {
                *flag.lock().unwrap() = true;
                Ok(())
            })
            .unwrap();

        let err = builder.build(req).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn wiring_failure_closes_the_container_and_runs_the_request_teardown() {
        let harness = Harness::new();
        let builder = InvocationBuilder::new(Arc::clone(harness.launcher.shared()));
        // settings loader factory の無い階層
        let bare = Harness::bare_session();
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let mut req = request(&harness, BuildParameters::default());
        req.session = bare.clone();
        req.teardown
            .register("mark", move || {
                *flag.lock().unwrap() = true;
                Ok(())
            })
            .unwrap();

        let err = builder.build(req).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Lookup);
        assert!(*ran.lock().unwrap());
        bare.close().unwrap();
    }

    #[test]
    fn non_session_parent_is_rejected() {
        let harness = Harness::new();
        let builder = InvocationBuilder::new(Arc::clone(harness.launcher.shared()));
        let mut req = request(&harness, BuildParameters::default());
        req.session = harness.global.clone();

        let err = builder.build(req).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(err.to_string().contains("build session scope"));
    }

    #[test]
    #[serial_test::serial(trace_toggle)]
    fn on_error_stacktrace_disables_deprecation_traces() {
        let harness = Harness::new();
        let builder = InvocationBuilder::new(Arc::clone(harness.launcher.shared()));

        builder
            .build(request(
                &harness,
                BuildParameters::default().with_show_stacktrace(ShowStacktrace::OnError),
            ))
            .unwrap();

        assert!(!is_trace_logging_enabled());
    }
}
