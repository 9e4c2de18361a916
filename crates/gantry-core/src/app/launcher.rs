//! LauncherFactory - top-level build の入口
//!
//! host session ごとに 1 つ作る。tracker と top-level の進捗表示を持ち、
//! そこから作られた invocation と nested build はすべてこれを共有する。
//!
//! # 使用例
//! ```ignore
//! let launcher = LauncherFactory::new(progress, registry.clone(), clock, ids);
//! let session = launcher.open_session(Path::new(".gantry"))?;
//! let build = launcher.new_top_level(params, BuildRequestContext::new(metadata), &session)?;
//! let outcome = build.run(&action).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::builder::{InvocationBuilder, InvocationRequest};
use super::invocation::BuildInvocation;
use super::loggers::BuildProgressLogger;
use super::tracker::BuildTracker;
use crate::domain::{
    BuildCancellationToken, BuildParameters, BuildRequestMetaData, LifecycleError,
};
use crate::ports::{
    BuildEventConsumer, Clock, DeploymentRegistry, IdGenerator, ProgressLoggerFactory,
    UserHomeServiceRegistry,
};
use crate::impls::NoopEventConsumer;
use crate::scope::{ServiceContainer, ServiceScope, TeardownList};

/// launcher とそこから作られた build が共有する部品
pub(crate) struct LauncherShared {
    pub tracker: Arc<BuildTracker>,
    pub progress_logger: Arc<BuildProgressLogger>,
    pub user_home_registry: Arc<dyn UserHomeServiceRegistry>,
    pub clock: Arc<dyn Clock>,
    pub id_generator: Arc<dyn IdGenerator>,
}

/// top-level build のリクエストごとの入力
pub struct BuildRequestContext {
    pub metadata: BuildRequestMetaData,
    pub cancellation: BuildCancellationToken,
    pub event_consumer: Arc<dyn BuildEventConsumer>,
}

impl BuildRequestContext {
    /// 新しいキャンセルトークンと、何もしない event consumer で作る
    pub fn new(metadata: BuildRequestMetaData) -> Self {
        Self {
            metadata,
            cancellation: BuildCancellationToken::new(),
            event_consumer: Arc::new(NoopEventConsumer),
        }
    }

    pub fn with_cancellation(mut self, cancellation: BuildCancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_event_consumer(mut self, consumer: Arc<dyn BuildEventConsumer>) -> Self {
        self.event_consumer = consumer;
        self
    }
}

pub struct LauncherFactory {
    shared: Arc<LauncherShared>,
}

impl LauncherFactory {
    pub fn new(
        progress_logger_factory: Arc<dyn ProgressLoggerFactory>,
        user_home_registry: Arc<dyn UserHomeServiceRegistry>,
        clock: Arc<dyn Clock>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            shared: Arc::new(LauncherShared {
                tracker: Arc::new(BuildTracker::new()),
                progress_logger: Arc::new(BuildProgressLogger::new(progress_logger_factory)),
                user_home_registry,
                clock,
                id_generator,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<LauncherShared> {
        &self.shared
    }

    pub fn tracker(&self) -> &Arc<BuildTracker> {
        &self.shared.tracker
    }

    /// user-home services から host 用の session を作る
    ///
    /// session を閉じると user-home services の lease も返る。
    pub fn open_session(&self, user_home_dir: &Path) -> Result<ServiceContainer, LifecycleError> {
        let home = self.shared.user_home_registry.services_for(user_home_dir)?;
        let session_id = self.shared.id_generator.generate_session_id();
        let session = match ServiceContainer::for_new_session(&home, format!("session {session_id}")) {
            Ok(session) => session,
            Err(err) => {
                if let Err(release_err) = self.shared.user_home_registry.release(&home) {
                    warn!(error = %release_err, "releasing user-home services failed");
                }
                return Err(err);
            }
        };
        let registry = Arc::clone(&self.shared.user_home_registry);
        session.register_teardown("release user-home services", move || {
            registry.release(&home).map_err(Into::into)
        })?;
        Ok(session)
    }

    /// top-level build を作る（まだ tracker には積まない）
    ///
    /// # エラー
    /// - パラメータが不正: `Configuration`
    /// - すでに current build がある / `parent_services` が session scope でない: `InvariantViolation`
    /// - `parent_services` から `DeploymentRegistry` が引けない: `Lookup`
    pub fn new_top_level(
        &self,
        parameters: BuildParameters,
        context: BuildRequestContext,
        parent_services: &ServiceContainer,
    ) -> Result<BuildInvocation, LifecycleError> {
        parameters.validate()?;
        self.shared.tracker.require_none_current()?;
        if parent_services.scope() != ServiceScope::BuildSession {
            return Err(LifecycleError::invariant(format!(
                "top-level builds need build-session services, got {} container '{}'",
                parent_services.scope(),
                parent_services.name()
            )));
        }
        let deployments = parent_services.get::<dyn DeploymentRegistry>()?;

        let build = InvocationBuilder::new(Arc::clone(&self.shared)).build(InvocationRequest {
            parameters,
            parent: None,
            metadata: Arc::new(context.metadata),
            cancellation: context.cancellation,
            event_consumer: context.event_consumer,
            session: parent_services.clone(),
            teardown: TeardownList::new(),
        })?;
        deployments.on_new_build(&build);
        info!(build_id = %build.id(), "top-level build created");
        Ok(build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildClientMetaData, ErrorKind};
    use crate::impls::RecordingDeploymentRegistry;
    use crate::ports::{FixedClock, UlidGenerator};
    use crate::testutil::Harness;
    use chrono::Utc;

    /// user-home ではない container を貸し、返却も失敗する registry
    struct MisScopedRegistry {
        global: ServiceContainer,
    }

    impl UserHomeServiceRegistry for MisScopedRegistry {
        fn services_for(&self, _user_home_dir: &Path) -> Result<ServiceContainer, LifecycleError> {
            Ok(self.global.clone())
        }

        fn release(&self, _services: &ServiceContainer) -> Result<(), LifecycleError> {
            Err(LifecycleError::invariant("release refused"))
        }
    }

    fn context() -> BuildRequestContext {
        BuildRequestContext::new(BuildRequestMetaData::new(
            BuildClientMetaData::new("test client"),
            Utc::now(),
        ))
    }

    #[test]
    fn notifies_the_deployment_registry_once() {
        let harness = Harness::new();

        let build = harness.top_level(BuildParameters::default()).unwrap();

        assert_eq!(harness.deployments.builds(), vec![build.id()]);
        assert!(!build.is_nested());
        assert_eq!(harness.launcher.tracker().depth(), 0);
    }

    #[test]
    fn rejects_a_second_top_level_while_one_is_current() {
        let harness = Harness::new();
        let first = harness.top_level(BuildParameters::default()).unwrap();
        harness.launcher.tracker().push(&first).unwrap();

        let err = harness.top_level(BuildParameters::default()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(harness.deployments.builds(), vec![first.id()]);
    }

    #[test]
    fn rejects_non_session_parent_services() {
        let harness = Harness::new();

        let err = harness
            .launcher
            .new_top_level(BuildParameters::default(), context(), &harness.global)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn invalid_parameters_fail_before_anything_is_created() {
        let harness = Harness::new();

        let err = harness
            .top_level(BuildParameters::default().with_tasks([""]))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(harness.deployments.builds().is_empty());
    }

    #[test]
    fn missing_deployment_registry_is_a_lookup_error() {
        let harness = Harness::new();
        let bare_session = harness
            .launcher
            .open_session(Path::new("/tmp/gantry-bare"))
            .unwrap();

        let err = harness
            .launcher
            .new_top_level(BuildParameters::default(), context(), &bare_session)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Lookup);
        bare_session.close().unwrap();
    }

    #[test]
    fn closing_an_opened_session_releases_user_home_services() {
        let harness = Harness::new();
        let dir = Path::new("/tmp/gantry-session");
        let session = harness.launcher.open_session(dir).unwrap();
        assert_eq!(harness.registry.leases(dir), 1);

        session.add::<dyn DeploymentRegistry>(Arc::new(RecordingDeploymentRegistry::new())).unwrap();
        session.close().unwrap();

        assert_eq!(harness.registry.leases(dir), 0);
    }

    #[test]
    fn open_session_keeps_the_session_error_when_release_also_fails() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let launcher = LauncherFactory::new(
            Arc::new(crate::impls::RecordingProgressLoggerFactory::new()),
            Arc::new(MisScopedRegistry {
                global: ServiceContainer::root("global"),
            }),
            clock.clone(),
            Arc::new(UlidGenerator::new(clock)),
        );

        let err = launcher.open_session(Path::new("/tmp/gantry-misscoped")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(err.to_string().contains("must derive from user-home services"));
    }
}
