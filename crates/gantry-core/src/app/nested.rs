//! NestedBuildFactory - 実行中のビルドから nested build を作る
//!
//! build container ごとに 1 つ bind され、その build の session を覚えている。
//! グローバルな入口は無く、nested build を作れるのは current build を持つ側だけ。
//!
//! # 2 つの作り方
//! - `nested_instance`: 同じ session を共有する
//! - `nested_instance_with_new_session`: user-home services から新しい session を切り出す。
//!   invocation の teardown は「session を閉じる」→「user-home services を返す」の順

use std::sync::Arc;

use tracing::{debug, warn};

use super::builder::{InvocationBuilder, InvocationRequest};
use super::invocation::BuildInvocation;
use super::launcher::LauncherShared;
use crate::domain::{
    BuildCancellationToken, BuildClientMetaData, BuildParameters, BuildRequestMetaData,
    LifecycleError,
};
use crate::ports::BuildEventConsumer;
use crate::scope::{ServiceContainer, TeardownList};

pub struct NestedBuildFactory {
    shared: Arc<LauncherShared>,
    session: ServiceContainer,
}

impl NestedBuildFactory {
    pub(crate) fn new(shared: Arc<LauncherShared>, session: ServiceContainer) -> Self {
        Self { shared, session }
    }

    /// 同じ session で nested build を作る
    pub fn nested_instance(
        &self,
        parameters: BuildParameters,
    ) -> Result<BuildInvocation, LifecycleError> {
        parameters.validate()?;
        let current = self.shared.tracker.require_current()?;
        let request = self
            .request_from(&current, parameters, self.session.clone(), TeardownList::new())
            .map_err(|(err, _)| err)?;
        let build = InvocationBuilder::new(Arc::clone(&self.shared)).build(request)?;
        debug!(build_id = %build.id(), parent = %current.id(), "nested build created");
        Ok(build)
    }

    /// 新しい session で nested build を作る
    ///
    /// 親の build の binding は見えない（user-home より上のものだけ引ける）。
    pub fn nested_instance_with_new_session(
        &self,
        parameters: BuildParameters,
    ) -> Result<BuildInvocation, LifecycleError> {
        parameters.validate()?;
        let current = self.shared.tracker.require_current()?;

        let registry = Arc::clone(&self.shared.user_home_registry);
        let home = registry.services_for(&parameters.user_home_dir)?;
        let teardown = TeardownList::new();
        let released = home.clone();
        teardown.register("release user-home services", move || {
            registry.release(&released).map_err(Into::into)
        })?;

        let session_id = self.shared.id_generator.generate_session_id();
        let session = match ServiceContainer::for_new_session(&home, format!("session {session_id}")) {
            Ok(session) => session,
            Err(err) => {
                if let Err(teardown_err) = teardown.run() {
                    warn!(error = %teardown_err, "releasing user-home services failed");
                }
                return Err(err);
            }
        };
        let closed = session.clone();
        teardown.register("close build session", move || closed.close().map_err(Into::into))?;

        // ここから先の失敗は builder が teardown を流す
        let request = match self.request_from(&current, parameters, session, teardown) {
            Ok(request) => request,
            Err((err, teardown)) => {
                if let Err(teardown_err) = teardown.run() {
                    warn!(error = %teardown_err, "discarding a new session failed");
                }
                return Err(err);
            }
        };
        let build = InvocationBuilder::new(Arc::clone(&self.shared)).build(request)?;
        debug!(
            build_id = %build.id(),
            parent = %current.id(),
            session = %session_id,
            "nested build created in a new session"
        );
        Ok(build)
    }

    /// current build の container から client, token, event consumer を引き継ぐ
    fn request_from(
        &self,
        current: &BuildInvocation,
        parameters: BuildParameters,
        session: ServiceContainer,
        teardown: TeardownList,
    ) -> Result<InvocationRequest, (LifecycleError, TeardownList)> {
        let services = current.services();
        let inherited = services.get::<BuildClientMetaData>().and_then(|client| {
            Ok((
                client,
                services.get::<BuildCancellationToken>()?,
                services.get::<dyn BuildEventConsumer>()?,
            ))
        });
        let (client, cancellation, event_consumer) = match inherited {
            Ok(inherited) => inherited,
            Err(err) => return Err((err, teardown)),
        };
        Ok(InvocationRequest {
            parameters,
            parent: Some(current.clone()),
            metadata: Arc::new(BuildRequestMetaData::new(
                client.as_ref().clone(),
                self.shared.clock.now(),
            )),
            cancellation: cancellation.as_ref().clone(),
            event_consumer,
            session,
            teardown,
        })
    }
}
