//! ProgressLogger port - 進捗表示の抽象化
//!
//! 実体はコンソールのステータス行やクライアントへの progress イベント。

/// 1 つの進捗 operation
pub trait ProgressLogger: Send + Sync {
    fn started(&self, status: &str);

    fn progress(&self, status: &str);

    fn completed(&self, status: &str);
}

pub trait ProgressLoggerFactory: Send + Sync {
    /// 新しい operation を作る（`category` は発生元の型名など）
    fn new_operation(&self, category: &str, description: &str) -> Box<dyn ProgressLogger>;
}
