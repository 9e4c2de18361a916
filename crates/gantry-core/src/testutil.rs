//! テスト用の組み立て済み階層
//!
//! ```text
//! global（settings loader factory, progress logger factory）
//!   └─ user-home ".gantry"
//!        └─ session（DeploymentRegistry）
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::app::builder::{InvocationBuilder, InvocationRequest};
use crate::app::{BuildInvocation, BuildRequestContext, LauncherFactory};
use crate::domain::{
    BuildCancellationToken, BuildClientMetaData, BuildFailure, BuildParameters,
    BuildRequestMetaData, LifecycleError,
};
use crate::impls::{
    DefaultSettingsLoaderFactory, DefaultUserHomeServiceRegistry, RecordingDeploymentRegistry,
    RecordingEventConsumer, RecordingProgressLoggerFactory,
};
use crate::ports::{
    BuildAction, Clock, DeploymentRegistry, FixedClock, ProgressLoggerFactory, SettingsLoaderFactory,
    UlidGenerator,
};
use crate::scope::{ServiceContainer, ServiceScope, TeardownList};

pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub global: ServiceContainer,
    pub registry: Arc<DefaultUserHomeServiceRegistry>,
    pub session: ServiceContainer,
    pub launcher: LauncherFactory,
    pub deployments: Arc<RecordingDeploymentRegistry>,
    pub consumer: Arc<RecordingEventConsumer>,
    pub progress: Arc<RecordingProgressLoggerFactory>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let progress = Arc::new(RecordingProgressLoggerFactory::new());
        let global = ServiceContainer::root("global");
        global
            .add::<dyn SettingsLoaderFactory>(Arc::new(DefaultSettingsLoaderFactory::new()))
            .unwrap();
        global
            .add::<dyn ProgressLoggerFactory>(progress.clone())
            .unwrap();

        let registry = Arc::new(DefaultUserHomeServiceRegistry::new(global.clone()));
        let launcher = LauncherFactory::new(
            progress.clone(),
            registry.clone(),
            clock.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
        );
        let session = launcher.open_session(Path::new(".gantry")).unwrap();
        let deployments = Arc::new(RecordingDeploymentRegistry::new());
        session
            .add::<dyn DeploymentRegistry>(deployments.clone())
            .unwrap();

        Self {
            clock,
            global,
            registry,
            session,
            launcher,
            deployments,
            consumer: Arc::new(RecordingEventConsumer::new()),
            progress,
        }
    }

    /// ファクトリを 1 つも持たない階層の session
    pub fn bare_session() -> ServiceContainer {
        let global = ServiceContainer::root("bare global");
        let home = ServiceContainer::derive_child(&global, ServiceScope::UserHome, "bare home");
        ServiceContainer::for_new_session(&home, "bare session").unwrap()
    }

    pub fn context(&self) -> BuildRequestContext {
        BuildRequestContext::new(BuildRequestMetaData::new(
            BuildClientMetaData::new("harness"),
            self.clock.now(),
        ))
        .with_event_consumer(self.consumer.clone())
    }

    pub fn top_level(&self, parameters: BuildParameters) -> Result<BuildInvocation, LifecycleError> {
        self.launcher
            .new_top_level(parameters, self.context(), &self.session)
    }

    /// tracker の current チェックを通さずに top-level build を作る
    pub fn detached_top_level(&self, parameters: BuildParameters) -> BuildInvocation {
        InvocationBuilder::new(Arc::clone(self.launcher.shared()))
            .build(InvocationRequest {
                parameters,
                parent: None,
                metadata: Arc::new(BuildRequestMetaData::new(
                    BuildClientMetaData::new("detached"),
                    self.clock.now(),
                )),
                cancellation: BuildCancellationToken::new(),
                event_consumer: self.consumer.clone(),
                session: self.session.clone(),
                teardown: TeardownList::new(),
            })
            .unwrap()
    }
}

type ActionFn = dyn Fn(&BuildInvocation) -> Result<(), BuildFailure> + Send + Sync;

/// クロージャを BuildAction にする
pub struct FnAction {
    f: Box<ActionFn>,
}

impl FnAction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&BuildInvocation) -> Result<(), BuildFailure> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }

    /// 何もせず成功する
    pub fn ok() -> Self {
        Self::new(|_| Ok(()))
    }
}

#[async_trait]
impl BuildAction for FnAction {
    async fn execute(&self, build: &BuildInvocation) -> Result<(), BuildFailure> {
        (self.f)(build)
    }
}
