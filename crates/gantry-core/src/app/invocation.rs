//! BuildInvocation - 1 回のビルド（top-level / nested）のハンドル
//!
//! # ライフサイクル
//! ```text
//! build() ──> Created ──run()──> Running ──> Finished ──stop()──> Stopped
//!                └──────────────────stop()──────────────────────────┘
//! ```
//! - tracker への push は `run()` が始まったとき（TrackerListener の build_started）
//! - `stop()` は build container を閉じてから invocation 自身の teardown を流す。何度呼んでもよい
//!
//! # 学習ポイント
//! - `Arc<Inner>` の clone で共有するハンドル
//! - 親への参照は `Weak`（親は子を持たないが、子が親を生かし続けることもない）

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{Instrument, info, info_span, warn};

use super::deprecation::DeprecationLogger;
use super::listeners::{ListenerKind, ListenerManager};
use super::logging::LoggingManager;
use super::nested::NestedBuildFactory;
use crate::domain::{
    BuildCancellationToken, BuildEvent, BuildId, BuildOutcome, BuildParameters, InvocationState,
    LifecycleError,
};
use crate::ports::{BuildAction, BuildEventConsumer, SettingsLoader};
use crate::scope::{ServiceContainer, TeardownList};

pub(crate) struct InvocationParts {
    pub id: BuildId,
    pub parent: Option<BuildInvocation>,
    pub parameters: Arc<BuildParameters>,
    pub services: ServiceContainer,
    pub listeners: Arc<ListenerManager>,
    pub logging: Arc<LoggingManager>,
    pub settings_loader: Arc<dyn SettingsLoader>,
    pub cancellation: BuildCancellationToken,
    pub event_consumer: Arc<dyn BuildEventConsumer>,
    pub teardown: TeardownList,
}

struct InvocationInner {
    id: BuildId,
    parent: Option<Weak<InvocationInner>>,
    parent_id: Option<BuildId>,
    parameters: Arc<BuildParameters>,
    services: ServiceContainer,
    listeners: Arc<ListenerManager>,
    logging: Arc<LoggingManager>,
    settings_loader: Arc<dyn SettingsLoader>,
    cancellation: BuildCancellationToken,
    event_consumer: Arc<dyn BuildEventConsumer>,
    teardown: TeardownList,
    state: Mutex<InvocationState>,
}

#[derive(Clone)]
pub struct BuildInvocation {
    inner: Arc<InvocationInner>,
}

impl BuildInvocation {
    pub(crate) fn from_parts(parts: InvocationParts) -> Self {
        let parent_id = parts.parent.as_ref().map(BuildInvocation::id);
        Self {
            inner: Arc::new(InvocationInner {
                id: parts.id,
                parent: parts.parent.as_ref().map(|p| Arc::downgrade(&p.inner)),
                parent_id,
                parameters: parts.parameters,
                services: parts.services,
                listeners: parts.listeners,
                logging: parts.logging,
                settings_loader: parts.settings_loader,
                cancellation: parts.cancellation,
                event_consumer: parts.event_consumer,
                teardown: parts.teardown,
                state: Mutex::new(InvocationState::Created),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, InvocationState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> BuildId {
        self.inner.id
    }

    pub fn is_nested(&self) -> bool {
        self.inner.parent_id.is_some()
    }

    pub fn parent_id(&self) -> Option<BuildId> {
        self.inner.parent_id
    }

    /// 親 invocation（top-level なら None、親がもう破棄されていても None）
    pub fn parent(&self) -> Option<BuildInvocation> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| BuildInvocation { inner })
    }

    pub fn parameters(&self) -> &BuildParameters {
        &self.inner.parameters
    }

    /// この invocation の build container
    pub fn services(&self) -> &ServiceContainer {
        &self.inner.services
    }

    pub fn cancellation_token(&self) -> &BuildCancellationToken {
        &self.inner.cancellation
    }

    pub fn event_consumer(&self) -> &Arc<dyn BuildEventConsumer> {
        &self.inner.event_consumer
    }

    pub fn settings_loader(&self) -> &Arc<dyn SettingsLoader> {
        &self.inner.settings_loader
    }

    pub fn logging(&self) -> &Arc<LoggingManager> {
        &self.inner.logging
    }

    pub fn listener_kinds(&self) -> Vec<ListenerKind> {
        self.inner.listeners.kinds()
    }

    pub fn state(&self) -> InvocationState {
        *self.lock_state()
    }

    /// 実行中のビルドから nested build を作るための capability
    pub fn nested_build_factory(&self) -> Result<Arc<NestedBuildFactory>, LifecycleError> {
        self.inner.services.get::<NestedBuildFactory>()
    }

    pub fn deprecation_logger(&self) -> Result<Arc<DeprecationLogger>, LifecycleError> {
        self.inner.services.get::<DeprecationLogger>()
    }

    /// 実行エンジンからのイベントを listener（登録順）と event consumer に渡す
    pub fn emit(&self, event: BuildEvent) -> Result<(), LifecycleError> {
        let state = self.state();
        if state != InvocationState::Running {
            return Err(LifecycleError::invariant(format!(
                "cannot emit events for build {} while it is {state:?}",
                self.id()
            )));
        }
        self.inner.listeners.on_event(self, &event);
        self.inner.event_consumer.dispatch(&event);
        Ok(())
    }

    /// ビルドを実行する
    ///
    /// 1. listener に build_started（tracker が push する）
    /// 2. キャンセル済みでなければ action を実行
    /// 3. listener に build_finished（tracker が pop する）
    /// 4. `stop()` で後始末
    ///
    /// action の失敗は `BuildOutcome::Failed` として返る。`Err` になるのは
    /// ライフサイクル自体の問題（tracker ルール違反、teardown の失敗）のときだけ。
    pub async fn run(&self, action: &dyn BuildAction) -> Result<BuildOutcome, LifecycleError> {
        {
            let mut state = self.lock_state();
            if !state.can_run() {
                return Err(LifecycleError::invariant(format!(
                    "build {} is {:?} and cannot run again",
                    self.id(),
                    *state
                )));
            }
            *state = InvocationState::Running;
        }
        let span = info_span!("build", build_id = %self.id(), nested = self.is_nested());
        self.run_started(action).instrument(span).await
    }

    async fn run_started(&self, action: &dyn BuildAction) -> Result<BuildOutcome, LifecycleError> {
        if let Err(err) = self.inner.listeners.build_started(self) {
            *self.lock_state() = InvocationState::Finished;
            if let Err(teardown) = self.stop() {
                warn!(error = %teardown, "teardown failed after the build could not start");
            }
            return Err(err);
        }
        self.inner.event_consumer.dispatch(&BuildEvent::BuildStarted {
            build_id: self.id(),
            nested: self.is_nested(),
        });
        info!("build started");

        let outcome = if self.inner.cancellation.is_cancellation_requested() {
            BuildOutcome::Cancelled
        } else {
            BuildOutcome::from(action.execute(self).await)
        };

        let finished = self.inner.listeners.build_finished(self, &outcome);
        self.inner.event_consumer.dispatch(&BuildEvent::BuildFinished {
            build_id: self.id(),
            outcome: outcome.clone(),
        });
        *self.lock_state() = InvocationState::Finished;
        info!(success = outcome.is_success(), "build finished");

        let stopped = self.stop();
        match (finished, stopped) {
            (Err(err), stopped) => {
                if let Err(teardown) = stopped {
                    warn!(error = %teardown, "teardown failed after a listener error");
                }
                Err(err)
            }
            (Ok(()), Err(teardown)) => Err(teardown),
            (Ok(()), Ok(())) => Ok(outcome),
        }
    }

    /// build container を閉じ、invocation の teardown を流す
    ///
    /// 実行中は止められない。2 回目以降は何もしない。
    pub fn stop(&self) -> Result<(), LifecycleError> {
        {
            let mut state = self.lock_state();
            match *state {
                InvocationState::Running => {
                    return Err(LifecycleError::invariant(format!(
                        "cannot stop build {} while it is running",
                        self.id()
                    )));
                }
                InvocationState::Stopped => return Ok(()),
                InvocationState::Created | InvocationState::Finished => {
                    *state = InvocationState::Stopped;
                }
            }
        }

        let mut failures = Vec::new();
        // 子（build container）を先に閉じ、session などの後始末はそのあと
        if let Err(err) = self.inner.services.close() {
            failures.extend(err.teardown_failures().iter().cloned());
        }
        if let Err(err) = self.inner.teardown.run() {
            failures.extend(err.teardown_failures().iter().cloned());
        }
        LifecycleError::from_teardown_failures(failures)
    }
}

impl PartialEq for BuildInvocation {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for BuildInvocation {}

impl std::fmt::Debug for BuildInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildInvocation")
            .field("id", &self.id())
            .field("parent", &self.parent_id())
            .field("state", &self.state())
            .finish()
    }
}
