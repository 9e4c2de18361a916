//! BuildParameters - ビルドの起動パラメータ
//!
//! JSON から読み込める設定層です。未指定のフィールドは `Default` で埋まります。
//!
//! ```ignore
//! let params = BuildParameters::from_json(r#"{ "log_level": "info", "show_stacktrace": "always" }"#)?;
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::errors::LifecycleError;

/// ビルドのログレベル（後ろほど粗い）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Lifecycle,
    Warn,
    Quiet,
    Error,
}

impl LogLevel {
    /// 対応する tracing の Level
    ///
    /// Lifecycle と Quiet は tracing に存在しないので、近い方に寄せる。
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info | Self::Lifecycle => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Quiet | Self::Error => tracing::Level::ERROR,
        }
    }
}

/// スタックトレース（と deprecation trace）をいつ見せるか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ShowStacktrace {
    Never,
    #[default]
    OnError,
    Always,
    AlwaysFull,
}

impl ShowStacktrace {
    /// `Always` / `AlwaysFull` のときだけ deprecation trace を取る
    pub fn captures_deprecation_traces(self) -> bool {
        matches!(self, Self::Always | Self::AlwaysFull)
    }
}

/// BuildParameters は 1 回のビルド起動の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildParameters {
    pub log_level: LogLevel,
    pub show_stacktrace: ShowStacktrace,
    pub task_output_cache_enabled: bool,
    pub profile: bool,
    /// user-home scope の識別子。new session の nested build はこれで services を引く
    pub user_home_dir: PathBuf,
    pub project_dir: Option<PathBuf>,
    pub task_names: Vec<String>,
}

impl Default for BuildParameters {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            show_stacktrace: ShowStacktrace::default(),
            task_output_cache_enabled: false,
            profile: false,
            user_home_dir: PathBuf::from(".gantry"),
            project_dir: None,
            task_names: Vec::new(),
        }
    }
}

impl BuildParameters {
    /// JSON から読み込んで検証する
    pub fn from_json(json: &str) -> Result<Self, LifecycleError> {
        let parameters: Self = serde_json::from_str(json)
            .map_err(|e| LifecycleError::configuration(format!("malformed parameters: {e}")))?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// パラメータの妥当性チェック
    ///
    /// リソースを確保する前に呼ぶこと。
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.user_home_dir.as_os_str().is_empty() {
            return Err(LifecycleError::configuration("user_home_dir must not be empty"));
        }
        if let Some(dir) = &self.project_dir
            && dir.as_os_str().is_empty()
        {
            return Err(LifecycleError::configuration(
                "project_dir must not be empty when set",
            ));
        }
        if let Some(blank) = self.task_names.iter().position(|t| t.trim().is_empty()) {
            return Err(LifecycleError::configuration(format!(
                "task name at position {blank} is blank"
            )));
        }
        Ok(())
    }

    pub fn with_user_home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_home_dir = dir.into();
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_show_stacktrace(mut self, show: ShowStacktrace) -> Self {
        self.show_stacktrace = show;
        self
    }

    pub fn with_task_output_cache(mut self, enabled: bool) -> Self {
        self.task_output_cache_enabled = enabled;
        self
    }

    pub fn with_profile(mut self, enabled: bool) -> Self {
        self.profile = enabled;
        self
    }

    pub fn with_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_names = tasks.into_iter().map(Into::into).collect();
        self
    }
}
