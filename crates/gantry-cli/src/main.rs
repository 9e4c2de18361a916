use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{Level, info, warn};

use gantry_core::app::{BuildInvocation, BuildRequestContext, LauncherFactory};
use gantry_core::domain::{
    BuildClientMetaData, BuildEvent, BuildFailure, BuildOutcome, BuildParameters, BuildPhase,
    BuildRequestMetaData, LifecycleError, TaskOutcome,
};
use gantry_core::impls::{
    DefaultSettingsLoaderFactory, DefaultUserHomeServiceRegistry, RecordingDeploymentRegistry,
    RecordingEventConsumer, TracingProgressLoggerFactory,
};
use gantry_core::observability::init_tracing;
use gantry_core::ports::{
    BuildAction, Clock, DeploymentRegistry, ProgressLoggerFactory, SettingsLoaderFactory,
    SystemClock, UlidGenerator,
};
use gantry_core::scope::ServiceContainer;

/// task を順に「実行」するだけの action
struct RunTasks {
    tasks: Vec<String>,
}

impl RunTasks {
    async fn run_tasks(&self, build: &BuildInvocation) -> Result<(), BuildFailure> {
        build.emit(BuildEvent::PhaseStarted {
            phase: BuildPhase::Execution,
        })?;
        for (i, path) in self.tasks.iter().enumerate() {
            build.emit(BuildEvent::TaskStarted { path: path.clone() })?;
            sleep(Duration::from_millis(20)).await;
            let outcome = if i % 2 == 0 {
                TaskOutcome::Executed
            } else {
                TaskOutcome::FromCache
            };
            build.emit(BuildEvent::TaskFinished {
                path: path.clone(),
                outcome,
            })?;
        }
        build.emit(BuildEvent::PhaseFinished {
            phase: BuildPhase::Execution,
        })?;
        Ok(())
    }
}

#[async_trait]
impl BuildAction for RunTasks {
    async fn execute(&self, build: &BuildInvocation) -> Result<(), BuildFailure> {
        build.emit(BuildEvent::ScriptEvaluated {
            script: "settings.gantry".to_string(),
        })?;
        self.run_tasks(build).await
    }
}

/// buildSrc 相当の nested build と、別の user home での nested build を挟む top-level action
struct TopLevel {
    tasks: RunTasks,
}

#[async_trait]
impl BuildAction for TopLevel {
    async fn execute(&self, build: &BuildInvocation) -> Result<(), BuildFailure> {
        build.emit(BuildEvent::ScriptEvaluated {
            script: "build.gantry".to_string(),
        })?;
        if let Ok(deprecations) = build.deprecation_logger() {
            deprecations.nag_user_of("The `compile` configuration", "Use `implementation` instead.");
        }

        let factory = build.nested_build_factory()?;
        let parameters = build.parameters().clone();

        let build_src = factory.nested_instance(parameters.clone().with_tasks([":buildSrc:jar"]))?;
        let outcome = build_src
            .run(&RunTasks {
                tasks: vec![":buildSrc:compile".to_string(), ":buildSrc:jar".to_string()],
            })
            .await?;
        expect_success("buildSrc", outcome)?;

        let isolated = factory.nested_instance_with_new_session(
            parameters.with_user_home_dir(".gantry-isolated"),
        )?;
        let outcome = isolated
            .run(&RunTasks {
                tasks: vec![":tool:run".to_string()],
            })
            .await?;
        expect_success("isolated", outcome)?;

        self.tasks.run_tasks(build).await
    }
}

fn expect_success(name: &str, outcome: BuildOutcome) -> Result<(), BuildFailure> {
    match outcome {
        BuildOutcome::Succeeded => Ok(()),
        other => Err(BuildFailure::new(format!("nested build {name} did not succeed: {other:?}"))),
    }
}

#[derive(Serialize)]
struct Report<'a> {
    outcome: &'a BuildOutcome,
    deployed_builds: usize,
    events: &'a [BuildEvent],
}

fn load_parameters() -> Result<BuildParameters, LifecycleError> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path).map_err(|e| {
                LifecycleError::configuration(format!("cannot read {path}: {e}"))
            })?;
            BuildParameters::from_json(&json)
        }
        None => Ok(BuildParameters::default()
            .with_task_output_cache(true)
            .with_profile(true)
            .with_tasks([":app:compile", ":app:test", ":app:jar"])),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(Level::INFO);

    let parameters = load_parameters()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let progress: Arc<dyn ProgressLoggerFactory> = Arc::new(TracingProgressLoggerFactory::new());

    // global → user home → session
    let global = ServiceContainer::root("global");
    global.add::<dyn SettingsLoaderFactory>(Arc::new(DefaultSettingsLoaderFactory::new()))?;
    global.add::<dyn ProgressLoggerFactory>(Arc::clone(&progress))?;
    let registry = Arc::new(DefaultUserHomeServiceRegistry::new(global.clone()));
    let launcher = LauncherFactory::new(
        progress,
        registry.clone(),
        Arc::clone(&clock),
        Arc::new(UlidGenerator::new(Arc::clone(&clock))),
    );
    let session = launcher.open_session(Path::new(&parameters.user_home_dir))?;
    let deployments = Arc::new(RecordingDeploymentRegistry::new());
    session.add::<dyn DeploymentRegistry>(deployments.clone())?;

    let consumer = Arc::new(RecordingEventConsumer::new());
    let context = BuildRequestContext::new(BuildRequestMetaData::new(
        BuildClientMetaData::new("gantry-cli"),
        clock.now(),
    ))
    .with_event_consumer(consumer.clone());

    let action = TopLevel {
        tasks: RunTasks {
            tasks: parameters.task_names.clone(),
        },
    };
    let build = launcher.new_top_level(parameters, context, &session)?;
    let outcome = build.run(&action).await?;
    info!(depth = launcher.tracker().depth(), "tracker after the build");

    let events = consumer.events();
    let report = Report {
        outcome: &outcome,
        deployed_builds: deployments.builds().len(),
        events: &events,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    session.close()?;
    if let Err(err) = registry.close_all() {
        warn!(error = %err, "user-home services did not close cleanly");
    }
    global.close()?;
    Ok(())
}
