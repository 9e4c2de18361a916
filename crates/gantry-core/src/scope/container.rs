//! ServiceContainer - 親をたどって引ける型付きサービスの入れ物
//!
//! # 階層
//! ```text
//! Global ── UserHome(dir) ── BuildSession ── Build ── ...
//! ```
//! - `get::<T>()` は自分 → 親 → ... の順に探す（手前の binding が親を隠す）
//! - `for_new_session()` は呼び出し元の build ではなく user-home services にだけぶら下がる
//! - `close()` は teardown を逆順に 1 回だけ実行する
//!
//! # 学習ポイント
//! - `TypeId` をキーにした型消去（`Box<dyn Any>` に `Arc<T>` を入れて downcast で戻す）
//! - `T: ?Sized` にしておくと `dyn Trait` もそのままキーにできる
//! - 継承ではなく `Option<ServiceContainer>` の親参照による委譲

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::teardown::TeardownList;
use crate::domain::{LifecycleError, TeardownError};

/// 何の寿命に紐づく container か
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceScope {
    Global,
    UserHome,
    BuildSession,
    Build,
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Global => "global",
            Self::UserHome => "user-home",
            Self::BuildSession => "build-session",
            Self::Build => "build",
        };
        f.write_str(label)
    }
}

struct Binding {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

struct ContainerInner {
    name: String,
    scope: ServiceScope,
    parent: Option<ServiceContainer>,
    bindings: RwLock<HashMap<TypeId, Binding>>,
    teardown: TeardownList,
    closed: AtomicBool,
}

/// ServiceContainer は clone しても同じ実体を指すハンドル
#[derive(Clone)]
pub struct ServiceContainer {
    inner: Arc<ContainerInner>,
}

impl ServiceContainer {
    fn with_parent(
        name: impl Into<String>,
        scope: ServiceScope,
        parent: Option<ServiceContainer>,
    ) -> Self {
        let name = name.into();
        debug!(
            container = %name,
            %scope,
            parent = parent.as_ref().map(|p| p.name()).unwrap_or("-"),
            "service container created"
        );
        Self {
            inner: Arc::new(ContainerInner {
                name,
                scope,
                parent,
                bindings: RwLock::new(HashMap::new()),
                teardown: TeardownList::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// 親を持たない global scope の container
    pub fn root(name: impl Into<String>) -> Self {
        Self::with_parent(name, ServiceScope::Global, None)
    }

    /// `parent` にぶら下がる子 container を作る
    pub fn derive_child(
        parent: &ServiceContainer,
        scope: ServiceScope,
        name: impl Into<String>,
    ) -> Self {
        Self::with_parent(name, scope, Some(parent.clone()))
    }

    /// 新しい resource session を作る
    ///
    /// 親は durable な user-home services だけ。呼び出し元の build の一時的な
    /// binding は一切見えない。
    pub fn for_new_session(
        outer_services: &ServiceContainer,
        name: impl Into<String>,
    ) -> Result<Self, LifecycleError> {
        if outer_services.scope() != ServiceScope::UserHome {
            return Err(LifecycleError::invariant(format!(
                "a new session must derive from user-home services, got {} container '{}'",
                outer_services.scope(),
                outer_services.name()
            )));
        }
        Ok(Self::derive_child(
            outer_services,
            ServiceScope::BuildSession,
            name,
        ))
    }

    /// session から build container を作る
    pub fn for_session(
        session: &ServiceContainer,
        name: impl Into<String>,
    ) -> Result<Self, LifecycleError> {
        if session.scope() != ServiceScope::BuildSession {
            return Err(LifecycleError::invariant(format!(
                "service registry must be of build session scope, got {} container '{}'",
                session.scope(),
                session.name()
            )));
        }
        Ok(Self::derive_child(session, ServiceScope::Build, name))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn scope(&self) -> ServiceScope {
        self.inner.scope
    }

    pub fn parent(&self) -> Option<&ServiceContainer> {
        self.inner.parent.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// 同じ実体か
    pub fn same_container(&self, other: &ServiceContainer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn ensure_open(&self, what: &str) -> Result<(), LifecycleError> {
        if self.is_closed() {
            return Err(LifecycleError::invariant(format!(
                "cannot {what} on closed container '{}'",
                self.name()
            )));
        }
        Ok(())
    }

    /// `T` の binding を追加する（同じ型の既存 binding は上書き）
    ///
    /// ```ignore
    /// container.add::<dyn BuildEventConsumer>(consumer)?;
    /// container.add(Arc::new(token))?;
    /// ```
    pub fn add<T>(&self, value: Arc<T>) -> Result<(), LifecycleError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.ensure_open("add a service")?;
        let binding = Binding {
            type_name: type_name::<T>(),
            value: Box::new(value),
        };
        self.inner
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), binding);
        Ok(())
    }

    fn get_local<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let bindings = self
            .inner
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        bindings
            .get(&TypeId::of::<T>())
            .and_then(|b| b.value.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// `T` を自分から親へたどって探す
    pub fn get<T>(&self) -> Result<Arc<T>, LifecycleError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.ensure_open("look up a service")?;
        let mut current = Some(self);
        while let Some(container) = current {
            if let Some(found) = container.get_local::<T>() {
                return Ok(found);
            }
            current = container.parent();
        }
        Err(LifecycleError::Lookup {
            service: type_name::<T>(),
            container: self.name().to_string(),
        })
    }

    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get::<T>().is_ok()
    }

    /// この container 自身に bind された型名（親は含まない）
    pub fn local_service_names(&self) -> Vec<&'static str> {
        let bindings = self
            .inner
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&'static str> = bindings.values().map(|b| b.type_name).collect();
        names.sort_unstable();
        names
    }

    /// close 時に走る teardown action を登録する
    pub fn register_teardown<F>(&self, name: impl Into<String>, action: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> Result<(), TeardownError> + Send + 'static,
    {
        self.ensure_open("register a teardown action")?;
        self.inner.teardown.register(name, action)
    }

    /// teardown を逆順に実行し、binding を手放す
    ///
    /// 2 回目以降は何もしない。失敗した action があっても全部走らせてから
    /// `ResourceTeardown` を 1 つ返す。
    pub fn close(&self) -> Result<(), LifecycleError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(container = %self.name(), scope = %self.scope(), "closing service container");
        let result = self.inner.teardown.run();
        let released = std::mem::take(
            &mut *self
                .inner
                .bindings
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        drop(released);
        result
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("name", &self.name())
            .field("scope", &self.scope())
            .field("parent", &self.parent().map(|p| p.name().to_string()))
            .field("closed", &self.is_closed())
            .finish()
    }
}
