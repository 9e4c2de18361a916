//! Request metadata - 誰が、いつビルドを要求したか

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// BuildClientMetaData はビルドを要求したクライアントの情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildClientMetaData {
    pub display_name: String,
}

impl BuildClientMetaData {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }
}

/// BuildRequestMetaData は 1 回のビルド要求のメタデータ
///
/// nested build では client はそのまま引き継ぎ、start_time だけ作り直す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequestMetaData {
    pub client: BuildClientMetaData,
    pub start_time: DateTime<Utc>,
}

impl BuildRequestMetaData {
    pub fn new(client: BuildClientMetaData, start_time: DateTime<Utc>) -> Self {
        Self { client, start_time }
    }
}
