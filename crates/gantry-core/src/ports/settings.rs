//! SettingsLoader port - settings の探索と評価
//!
//! top-level と nested で戦略が違う（nested はすでに決まった root を使う、など）。
//! どちらを使うかはライフサイクル層が選び、中身は外部の collaborator が持つ。

use std::path::PathBuf;

use crate::domain::{BuildParameters, LifecycleError};

/// 読み込まれた settings の要約
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub root_dir: Option<PathBuf>,
    pub loaded_by: &'static str,
}

pub trait SettingsLoader: Send + Sync {
    /// 戦略名（ログと診断用）
    fn name(&self) -> &'static str;

    fn load_settings(&self, parameters: &BuildParameters) -> Result<Settings, LifecycleError>;
}

pub trait SettingsLoaderFactory: Send + Sync {
    fn for_top_level_build(&self) -> std::sync::Arc<dyn SettingsLoader>;

    fn for_nested_build(&self) -> std::sync::Arc<dyn SettingsLoader>;
}
