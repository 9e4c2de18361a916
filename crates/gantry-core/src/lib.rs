//! gantry-core
//!
//! ビルドの invocation（top-level と nested）を作り、入れ子にし、後始末する
//! ライフサイクル管理のコアです。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, parameters, events, state, metadata, cancellation, errors）
//! - **ports**: 外部の協力者との境界（SettingsLoaderFactory, BuildEventConsumer, UserHomeServiceRegistry, など）
//! - **scope**: 親をたどって引ける ServiceContainer と TeardownList
//! - **app**: tracker, builder, nested build factory, launcher, invocation, listener の合成
//! - **impls**: ports の既定実装
//! - **observability**: tracing の初期化と tracker のスナップショット

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod scope;

#[cfg(test)]
mod testutil;
