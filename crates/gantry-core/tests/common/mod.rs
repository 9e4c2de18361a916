//! 結合テスト用の host（公開 API だけで組み立てる）

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use gantry_core::app::{BuildInvocation, BuildRequestContext, LauncherFactory};
use gantry_core::domain::{
    BuildClientMetaData, BuildFailure, BuildParameters, BuildRequestMetaData, LifecycleError,
};
use gantry_core::impls::{
    DefaultSettingsLoaderFactory, DefaultUserHomeServiceRegistry, RecordingDeploymentRegistry,
    RecordingEventConsumer, RecordingProgressLoggerFactory,
};
use gantry_core::ports::{
    BuildAction, DeploymentRegistry, ProgressLoggerFactory, SettingsLoaderFactory, SystemClock,
    UlidGenerator,
};
use gantry_core::scope::ServiceContainer;

pub struct Host {
    pub global: ServiceContainer,
    pub registry: Arc<DefaultUserHomeServiceRegistry>,
    pub session: ServiceContainer,
    pub launcher: LauncherFactory,
    pub deployments: Arc<RecordingDeploymentRegistry>,
    pub consumer: Arc<RecordingEventConsumer>,
    pub progress: Arc<RecordingProgressLoggerFactory>,
}

impl Host {
    pub fn new() -> Self {
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
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(Arc::new(SystemClock))),
        );
        let session = launcher.open_session(Path::new(".gantry")).unwrap();
        let deployments = Arc::new(RecordingDeploymentRegistry::new());
        session
            .add::<dyn DeploymentRegistry>(deployments.clone())
            .unwrap();
        Self {
            global,
            registry,
            session,
            launcher,
            deployments,
            consumer: Arc::new(RecordingEventConsumer::new()),
            progress,
        }
    }

    pub fn top_level(&self, parameters: BuildParameters) -> Result<BuildInvocation, LifecycleError> {
        let context = BuildRequestContext::new(BuildRequestMetaData::new(
            BuildClientMetaData::new("integration"),
            Utc::now(),
        ))
        .with_event_consumer(self.consumer.clone());
        self.launcher.new_top_level(parameters, context, &self.session)
    }
}

type Step = Box<dyn Fn(&BuildInvocation) -> Result<(), BuildFailure> + Send + Sync>;

/// 同期のクロージャで書ける BuildAction
pub struct Steps(pub Step);

impl Steps {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&BuildInvocation) -> Result<(), BuildFailure> + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }
}

#[async_trait]
impl BuildAction for Steps {
    async fn execute(&self, build: &BuildInvocation) -> Result<(), BuildFailure> {
        (self.0)(build)
    }
}

/// 共有の記録用バッファ
pub fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}
