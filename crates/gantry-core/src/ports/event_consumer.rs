//! BuildEventConsumer port - クライアントへの進捗通知
//!
//! 実体は IPC 層（tooling API の接続など）。ライフサイクル層はイベントを渡すだけ。
//! nested build は親と同じ consumer を使う。

use crate::domain::BuildEvent;

pub trait BuildEventConsumer: Send + Sync {
    fn dispatch(&self, event: &BuildEvent);
}
