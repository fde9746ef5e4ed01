use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use super::{CartItem, CartStore};
use crate::error::Result;

/// Process-local carts, lost on restart.
#[derive(Default)]
pub struct MemoryCartStore {
    carts: Mutex<HashMap<i64, Vec<CartItem>>>,
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn items(&self, cart_id: i64) -> Result<Vec<CartItem>> {
        Ok(self.carts.lock().get(&cart_id).cloned().unwrap_or_default())
    }

    async fn add_item(&self, cart_id: i64, item: CartItem) -> Result<()> {
        self.carts.lock().entry(cart_id).or_default().push(item);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Carts stored as Redis lists of JSON items under `cart:{id}`.
///
/// `ConnectionManager` is cheaply cloneable and reconnects on its own, so
/// every call works on a clone of the same multiplexed connection.
#[derive(Clone)]
pub struct RedisCartStore {
    conn: ConnectionManager,
}

impl RedisCartStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url, "connected to Redis cart store");
        Ok(Self { conn })
    }

    fn key(cart_id: i64) -> String {
        format!("cart:{cart_id}")
    }
}

#[async_trait]
impl CartStore for RedisCartStore {
    async fn items(&self, cart_id: i64) -> Result<Vec<CartItem>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(Self::key(cart_id), 0, -1).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(Into::into))
            .collect()
    }

    async fn add_item(&self, cart_id: i64, item: CartItem) -> Result<()> {
        let json = serde_json::to_string(&item)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(Self::key(cart_id), json).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> CartItem {
        CartItem {
            name: name.into(),
            quantity: 1,
            price_cents: 999,
        }
    }

    #[tokio::test]
    async fn unknown_cart_is_empty() {
        let store = MemoryCartStore::new();
        assert!(store.items(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn items_accumulate_per_cart() {
        let store = MemoryCartStore::new();
        store.add_item(1, item("mug")).await.unwrap();
        store.add_item(1, item("tea")).await.unwrap();
        store.add_item(2, item("spoon")).await.unwrap();

        let first = store.items(1).await.unwrap();
        assert_eq!(first, vec![item("mug"), item("tea")]);
        assert_eq!(store.items(2).await.unwrap().len(), 1);
        assert!(store.ping().await.is_ok());
    }
}
