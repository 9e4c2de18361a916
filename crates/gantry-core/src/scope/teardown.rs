//! TeardownList - 登録順の逆に 1 回だけ走る後始末リスト
//!
//! # 保証
//! - 逆順実行（後から確保したものを先に解放する）
//! - 失敗しても止まらず最後まで走り、失敗は 1 つのエラーに集約する
//! - 2 回目以降の `run()` は何もしない

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::domain::{LifecycleError, TeardownError, TeardownFailure};

type TeardownAction = Box<dyn FnOnce() -> Result<(), TeardownError> + Send>;

struct TeardownState {
    actions: Vec<(String, TeardownAction)>,
    executed: bool,
}

pub struct TeardownList {
    state: Mutex<TeardownState>,
}

impl TeardownList {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TeardownState {
                actions: Vec::new(),
                executed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TeardownState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// teardown action を登録する
    ///
    /// 実行済みのリストには登録できない（走らない action を黙って受け取らない）。
    pub fn register<F>(&self, name: impl Into<String>, action: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> Result<(), TeardownError> + Send + 'static,
    {
        let name = name.into();
        let mut state = self.lock();
        if state.executed {
            return Err(LifecycleError::invariant(format!(
                "cannot register teardown action '{name}' after teardown has run"
            )));
        }
        state.actions.push((name, Box::new(action)));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_executed(&self) -> bool {
        self.lock().executed
    }

    /// 登録された action を逆順に実行する
    ///
    /// action はロックの外で実行する。action の中から別の container を close してもよい。
    pub fn run(&self) -> Result<(), LifecycleError> {
        let actions = {
            let mut state = self.lock();
            if state.executed {
                return Ok(());
            }
            state.executed = true;
            std::mem::take(&mut state.actions)
        };

        let mut failures = Vec::new();
        for (name, action) in actions.into_iter().rev() {
            match action() {
                Ok(()) => debug!(action = %name, "teardown action completed"),
                Err(err) => {
                    warn!(action = %name, error = %err, "teardown action failed");
                    failures.push(TeardownFailure {
                        action: name,
                        message: err.to_string(),
                    });
                }
            }
        }
        LifecycleError::from_teardown_failures(failures)
    }
}

impl Default for TeardownList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TeardownList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        let names: Vec<&str> = state.actions.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("TeardownList")
            .field("actions", &names)
            .field("executed", &state.executed)
            .finish()
    }
}
