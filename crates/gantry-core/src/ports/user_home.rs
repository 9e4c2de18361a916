//! UserHomeServiceRegistry port - user-home scope の services の貸し出し
//!
//! 同じ user-home ディレクトリに対しては同じ container を返し、
//! `release` で返却する（貸し出し数の管理は実装側）。

use std::path::Path;

use crate::domain::LifecycleError;
use crate::scope::ServiceContainer;

pub trait UserHomeServiceRegistry: Send + Sync {
    /// `user_home_dir` 用の services を借りる
    fn services_for(&self, user_home_dir: &Path) -> Result<ServiceContainer, LifecycleError>;

    /// 借りた services を返す
    fn release(&self, services: &ServiceContainer) -> Result<(), LifecycleError>;
}
