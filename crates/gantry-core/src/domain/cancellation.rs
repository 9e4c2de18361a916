//! BuildCancellationToken - 外部から立てられるキャンセルフラグ
//!
//! 親から nested build へは同じ token（clone = 同じ実体）がそのまま渡ります。
//! ライフサイクル層は action 実行前に 1 回だけ確認し、それ以降は実行エンジン側が
//! `is_cancellation_requested()` や `cancelled().await` で見る想定です。

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct BuildCancellationToken {
    tx: Arc<watch::Sender<bool>>,
}

impl BuildCancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// キャンセルを要求する（何度呼んでもよい）
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancellation_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// キャンセルされるまで待つ
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // sender は self が持っているので wait_for がエラーになることはない
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// 同じ実体を共有しているか
    pub fn same_token(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

impl Default for BuildCancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_the_flag() {
        let token = BuildCancellationToken::new();
        let nested = token.clone();

        assert!(!nested.is_cancellation_requested());
        token.cancel();
        assert!(nested.is_cancellation_requested());
        assert!(token.same_token(&nested));
        assert!(!token.same_token(&BuildCancellationToken::new()));
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = BuildCancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
    }
}
