// src/provider/nonce_manager.rs

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use ethers_core::types::{Address, U256};
use tokio::sync::Mutex;

// Hands out sequential nonces per sender so back-to-back sends never reuse one.
#[derive(Debug, Clone, Default)]
pub struct NonceManager {
    nonces: DashMap<Address, Arc<Mutex<NonceState>>>,
}

#[derive(Debug)]
struct NonceState {
    next_nonce: Option<U256>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce for `address`. `fetch` is only awaited when nothing is
    /// cached yet, and runs while the per-address lock is held.
    pub async fn next_nonce<F, E>(&self, address: Address, fetch: F) -> Result<U256, E>
    where
        F: Future<Output = Result<U256, E>>,
    {
        let address_lock = self
            .nonces
            .entry(address)
            .or_insert_with(|| Arc::new(Mutex::new(NonceState { next_nonce: None })))
            .clone();

        let mut state = address_lock.lock().await;

        let nonce = match state.next_nonce {
            Some(nonce) => nonce,
            None => fetch.await?,
        };
        state.next_nonce = Some(nonce + U256::one());

        Ok(nonce)
    }

    /// Forget the cached nonce, e.g. after a send the node refused.
    pub async fn reset(&self, address: Address) {
        if let Some(entry) = self.nonces.get(&address) {
            let state = entry.clone();
            drop(entry);
            state.lock().await.next_nonce = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetches_once_then_increments() {
        let manager = NonceManager::new();
        let address = Address::repeat_byte(0x11);

        let first = manager
            .next_nonce(address, async { Ok::<_, ()>(U256::from(7)) })
            .await
            .unwrap();
        let second = manager
            .next_nonce(address, async { Err::<U256, ()>(()) })
            .await
            .unwrap();

        assert_eq!(first, U256::from(7));
        assert_eq!(second, U256::from(8));
    }

    #[tokio::test]
    async fn reset_refetches_from_chain() {
        let manager = NonceManager::new();
        let address = Address::repeat_byte(0x22);

        manager
            .next_nonce(address, async { Ok::<_, ()>(U256::from(3)) })
            .await
            .unwrap();
        manager.reset(address).await;
        let refetched = manager
            .next_nonce(address, async { Ok::<_, ()>(U256::from(3)) })
            .await
            .unwrap();

        assert_eq!(refetched, U256::from(3));
    }
}
