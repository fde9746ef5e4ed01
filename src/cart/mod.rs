pub mod service;
pub mod store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use service::{required_item_delay, CartService};
pub use store::{MemoryCartStore, RedisCartStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Unit price in cents (e.g. 12999 = $129.99)
    #[serde(default)]
    pub price_cents: u64,
}

fn default_quantity() -> u32 {
    1
}

/// Cart persistence. Unknown carts read as empty.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn items(&self, cart_id: i64) -> Result<Vec<CartItem>>;

    async fn add_item(&self, cart_id: i64, item: CartItem) -> Result<()>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<()>;
}
