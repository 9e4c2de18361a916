//! DefaultSettingsLoaderFactory - top-level と nested で別の settings loader を返す
//!
//! top-level は `project_dir`（無ければカレント）を root にする。nested は親の
//! ビルドが settings をもう決めているので root を持たない。

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::{BuildParameters, LifecycleError};
use crate::ports::{Settings, SettingsLoader, SettingsLoaderFactory};

pub struct TopLevelSettingsLoader;

impl SettingsLoader for TopLevelSettingsLoader {
    fn name(&self) -> &'static str {
        "top-level"
    }

    fn load_settings(&self, parameters: &BuildParameters) -> Result<Settings, LifecycleError> {
        let root_dir = parameters
            .project_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Settings {
            root_dir: Some(root_dir),
            loaded_by: self.name(),
        })
    }
}

pub struct NestedSettingsLoader;

impl SettingsLoader for NestedSettingsLoader {
    fn name(&self) -> &'static str {
        "nested"
    }

    fn load_settings(&self, parameters: &BuildParameters) -> Result<Settings, LifecycleError> {
        Ok(Settings {
            root_dir: parameters.project_dir.clone(),
            loaded_by: self.name(),
        })
    }
}

#[derive(Default)]
pub struct DefaultSettingsLoaderFactory;

impl DefaultSettingsLoaderFactory {
    pub fn new() -> Self {
        Self
    }
}

impl SettingsLoaderFactory for DefaultSettingsLoaderFactory {
    fn for_top_level_build(&self) -> Arc<dyn SettingsLoader> {
        Arc::new(TopLevelSettingsLoader)
    }

    fn for_nested_build(&self) -> Arc<dyn SettingsLoader> {
        Arc::new(NestedSettingsLoader)
    }
}
