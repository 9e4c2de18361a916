//! Errors - エラー型と分類
//!
//! ライフサイクル層のエラーは 4 種類に分類されます。どれもリトライ対象ではありません
//! （リトライするなら、それはラップしている collaborator 側の責務）。

use std::fmt;

use thiserror::Error;

/// ErrorKind はエラーの運用分類
///
/// - InvariantViolation: tracker ルール違反などのプログラミング／統合エラー（常に fatal）
/// - Configuration: パラメータ不正（リソース確保前に呼び出し元へ返す）
/// - ResourceTeardown: teardown action の失敗（全 action 実行後に集約して返す）
/// - Lookup: container chain に必要な binding が無い（ワイヤリングのバグ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvariantViolation,
    Configuration,
    ResourceTeardown,
    Lookup,
}

/// teardown action 自体が返すエラー
pub type TeardownError = Box<dyn std::error::Error + Send + Sync>;

/// 失敗した teardown action 1 件分の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub action: String,
    pub message: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.action, self.message)
    }
}

/// LifecycleError はビルドライフサイクル層のエラー
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid build parameters: {0}")]
    Configuration(String),

    #[error("{} teardown action(s) failed: {}", .failures.len(), join_failures(.failures))]
    ResourceTeardown { failures: Vec<TeardownFailure> },

    #[error("no service of type {service} is bound in container '{container}' or its parents")]
    Lookup { service: &'static str, container: String },
}

impl LifecycleError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ResourceTeardown { .. } => ErrorKind::ResourceTeardown,
            Self::Lookup { .. } => ErrorKind::Lookup,
        }
    }

    /// 失敗した teardown action（実行順）
    pub fn teardown_failures(&self) -> &[TeardownFailure] {
        match self {
            Self::ResourceTeardown { failures } => failures,
            _ => &[],
        }
    }

    /// teardown の失敗を 1 つのエラーにまとめる。失敗が無ければ `Ok`
    pub fn from_teardown_failures(failures: Vec<TeardownFailure>) -> Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self::ResourceTeardown { failures })
        }
    }
}

fn join_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
