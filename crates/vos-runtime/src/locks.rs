//! Per-product evaluation locks.
//!
//! Evaluations for one product are serialized; different products proceed
//! in parallel. The lock is async so a waiting trigger yields its worker
//! thread instead of blocking it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use vos_core::ProductId;

#[derive(Debug, Default)]
pub struct ProductLocks {
    locks: Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `product_id`'s evaluation.
    pub async fn acquire(&self, product_id: &ProductId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(product_id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of products that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
