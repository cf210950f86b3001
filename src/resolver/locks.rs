use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per package id.
///
/// Cloning shares the table. Entries are never removed; the table grows with
/// the number of distinct ids touched by the process.
#[derive(Clone, Default)]
pub struct PackageLocks {
    table: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl PackageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        self.handle(id).lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let locks = PackageLocks::new();
        let guard = locks.acquire("x").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("x").await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = PackageLocks::new();
        let _x = locks.acquire("x").await;

        let acquired = tokio::time::timeout(Duration::from_secs(1), locks.acquire("y")).await;
        assert!(acquired.is_ok());
    }
}
