//! BuildTracker - 「いまどのビルドが current か」を LIFO で管理する
//!
//! # ルール
//! - top-level build は current が無いときだけ push できる
//! - nested build は current があるときだけ push でき、親は current の top でなければならない
//! - pop できるのは top だけ。違うものを pop しようとしたら stack には触らずエラー
//!
//! # 並行性
//! 1 つの階層（top-level build とその nested build 群）ごとに 1 つの tracker を使う。
//! 無関係な top-level build を並行で扱うなら tracker も別にする（LauncherFactory ごとに 1 つ）。
//! Mutex は handle を `Send + Sync` にするためだけのもので、複数スレッドからの
//! 交互の push/pop を想定したものではない。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::invocation::BuildInvocation;
use super::listeners::BuildListener;
use crate::domain::{BuildOutcome, LifecycleError};
use crate::observability::TrackerStatus;

#[derive(Default)]
pub struct BuildTracker {
    stack: Mutex<Vec<BuildInvocation>>,
}

impl BuildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BuildInvocation>> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 現在実行中のビルド（無ければ None）
    pub fn current(&self) -> Option<BuildInvocation> {
        self.lock().last().cloned()
    }

    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    /// nested build を作る前提条件: current があること
    pub fn require_current(&self) -> Result<BuildInvocation, LifecycleError> {
        self.current()
            .ok_or_else(|| LifecycleError::invariant("must have a current build"))
    }

    /// top-level build を作る前提条件: current が無いこと
    pub fn require_none_current(&self) -> Result<(), LifecycleError> {
        match self.current() {
            Some(current) => Err(LifecycleError::invariant(format!(
                "cannot have a current build, but {} is running",
                current.id()
            ))),
            None => Ok(()),
        }
    }

    /// `build` を今 push できるか（stack には触らない）
    pub fn check_admission(&self, build: &BuildInvocation) -> Result<(), LifecycleError> {
        admission(&self.lock(), build)
    }

    pub fn push(&self, build: &BuildInvocation) -> Result<(), LifecycleError> {
        let mut stack = self.lock();
        admission(&stack, build)?;
        stack.push(build.clone());
        debug!(build_id = %build.id(), depth = stack.len(), "build pushed on tracker");
        Ok(())
    }

    /// top を外す。`build` が top でなければ stack はそのまま
    pub fn pop(&self, build: &BuildInvocation) -> Result<(), LifecycleError> {
        let mut stack = self.lock();
        match stack.last() {
            Some(top) if top.id() == build.id() => {
                stack.pop();
                debug!(build_id = %build.id(), depth = stack.len(), "build popped from tracker");
                Ok(())
            }
            Some(top) => Err(LifecycleError::invariant(format!(
                "cannot finish build {} while {} is current",
                build.id(),
                top.id()
            ))),
            None => Err(LifecycleError::invariant(format!(
                "cannot finish build {}: no build is current",
                build.id()
            ))),
        }
    }

    pub fn status(&self) -> TrackerStatus {
        let stack = self.lock();
        TrackerStatus {
            depth: stack.len(),
            current: stack.last().map(BuildInvocation::id),
            stack: stack.iter().map(BuildInvocation::id).collect(),
        }
    }
}

fn admission(stack: &[BuildInvocation], build: &BuildInvocation) -> Result<(), LifecycleError> {
    if stack.iter().any(|b| b.id() == build.id()) {
        return Err(LifecycleError::invariant(format!(
            "build {} is already on the tracker stack",
            build.id()
        )));
    }
    match (stack.last(), build.parent_id()) {
        (Some(current), None) => Err(LifecycleError::invariant(format!(
            "cannot start top-level build {} while {} is current",
            build.id(),
            current.id()
        ))),
        (None, Some(_)) => Err(LifecycleError::invariant(format!(
            "cannot start nested build {} without a current build",
            build.id()
        ))),
        (Some(current), Some(parent)) if current.id() != parent => {
            Err(LifecycleError::invariant(format!(
                "nested build {} belongs to {parent}, but {} is current",
                build.id(),
                current.id()
            )))
        }
        _ => Ok(()),
    }
}

/// tracker を listener として invocation に組み込むためのアダプタ
///
/// build_started で push、build_finished で pop する。
/// push できないビルドは admit の段階で弾き、他の listener には開始を知らせない。
pub struct TrackerListener {
    tracker: Arc<BuildTracker>,
}

impl TrackerListener {
    pub fn new(tracker: Arc<BuildTracker>) -> Self {
        Self { tracker }
    }
}

impl BuildListener for TrackerListener {
    fn admit(&self, build: &BuildInvocation) -> Result<(), LifecycleError> {
        self.tracker.check_admission(build)
    }

    fn build_started(&self, build: &BuildInvocation) -> Result<(), LifecycleError> {
        self.tracker.push(build)
    }

    fn build_finished(
        &self,
        build: &BuildInvocation,
        _outcome: &BuildOutcome,
    ) -> Result<(), LifecycleError> {
        self.tracker.pop(build)
    }
}
