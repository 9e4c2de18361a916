//! DefaultUserHomeServiceRegistry - user-home ディレクトリごとの services を貸し出すプール
//!
//! 同じディレクトリへの要求は同じ container を返し、lease を数える。
//! 最後の lease が返されたら container を閉じてプールから外す。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::domain::LifecycleError;
use crate::ports::UserHomeServiceRegistry;
use crate::scope::{ServiceContainer, ServiceScope};

struct Entry {
    services: ServiceContainer,
    leases: usize,
}

pub struct DefaultUserHomeServiceRegistry {
    global: ServiceContainer,
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl DefaultUserHomeServiceRegistry {
    /// `global` を親にした user-home services を作るプール
    pub fn new(global: ServiceContainer) -> Self {
        Self {
            global,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `dir` の services の貸出数
    pub fn leases(&self, dir: &Path) -> usize {
        self.lock().get(dir).map_or(0, |entry| entry.leases)
    }

    pub fn is_pooled(&self, dir: &Path) -> bool {
        self.lock().contains_key(dir)
    }

    /// lease に関係なくすべての user-home services を閉じる（host の終了時）
    pub fn close_all(&self) -> Result<(), LifecycleError> {
        let entries: Vec<Entry> = self.lock().drain().map(|(_, entry)| entry).collect();
        let mut failures = Vec::new();
        for entry in entries {
            if let Err(err) = entry.services.close() {
                failures.extend(err.teardown_failures().iter().cloned());
            }
        }
        LifecycleError::from_teardown_failures(failures)
    }
}

impl UserHomeServiceRegistry for DefaultUserHomeServiceRegistry {
    fn services_for(&self, user_home_dir: &Path) -> Result<ServiceContainer, LifecycleError> {
        if self.global.is_closed() {
            return Err(LifecycleError::invariant(
                "cannot lease user-home services after global services are closed",
            ));
        }
        let mut entries = self.lock();
        let entry = entries
            .entry(user_home_dir.to_path_buf())
            .or_insert_with(|| Entry {
                services: ServiceContainer::derive_child(
                    &self.global,
                    ServiceScope::UserHome,
                    format!("user-home {}", user_home_dir.display()),
                ),
                leases: 0,
            });
        entry.leases += 1;
        debug!(dir = %user_home_dir.display(), leases = entry.leases, "user-home services leased");
        Ok(entry.services.clone())
    }

    fn release(&self, services: &ServiceContainer) -> Result<(), LifecycleError> {
        let released = {
            let mut entries = self.lock();
            let Some(dir) = entries
                .iter()
                .find(|(_, entry)| entry.services.same_container(services))
                .map(|(dir, _)| dir.clone())
            else {
                return Err(LifecycleError::invariant(format!(
                    "user-home services '{}' were not leased from this registry",
                    services.name()
                )));
            };
            let remaining = match entries.get_mut(&dir) {
                Some(entry) => {
                    entry.leases -= 1;
                    entry.leases
                }
                None => 0,
            };
            debug!(dir = %dir.display(), leases = remaining, "user-home services released");
            if remaining == 0 { entries.remove(&dir) } else { None }
        };
        // ロックの外で閉じる（teardown が registry に触れても詰まらない）
        match released {
            Some(entry) => entry.services.close(),
            None => Ok(()),
        }
    }
}
