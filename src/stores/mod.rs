//! Storage ports. Persistence is an external collaborator: the engines only
//! see these CRUD traits, with optimistic-concurrency `update` keyed on the
//! entity version. The in-memory implementations back the binary and tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Coupon, Order, Return, ReturnStatus};

pub mod memory;

pub use memory::{InMemoryCouponStore, InMemoryOrderStore, InMemoryReturnStore, InMemoryStockStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// The entity was modified since it was read; re-read and retry.
    #[error("version conflict")]
    VersionConflict,

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("insufficient stock for product {product_id} size {size}")]
    InsufficientStock { product_id: Uuid, size: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One line of an atomic stock decrement.
#[derive(Debug, Clone)]
pub struct StockLine {
    pub product_id: Uuid,
    pub size: String,
    pub quantity: u32,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<Order, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn get_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError>;

    /// Compare-and-swap update: fails with `VersionConflict` unless the
    /// stored version equals `order.version`. Returns the stored copy with
    /// the version bumped.
    async fn update(&self, order: Order) -> Result<Order, StoreError>;

    /// Newest first.
    async fn list(&self, page: u64, limit: u64) -> Result<(Vec<Order>, u64), StoreError>;
    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Order>, u64), StoreError>;

    /// Used by the coupon evaluator's first-order check.
    async fn count_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ReturnStore: Send + Sync {
    async fn insert(&self, ret: Return) -> Result<Return, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Return>, StoreError>;

    /// Compare-and-swap update, same contract as [`OrderStore::update`].
    async fn update(&self, ret: Return) -> Result<Return, StoreError>;

    async fn list(
        &self,
        page: u64,
        limit: u64,
        status: Option<ReturnStatus>,
    ) -> Result<(Vec<Return>, u64), StoreError>;
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<Return>, StoreError>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Fails with `Duplicate` when the canonical code already exists.
    async fn insert(&self, coupon: Coupon) -> Result<Coupon, StoreError>;
    async fn get_by_code(&self, canonical_code: &str) -> Result<Option<Coupon>, StoreError>;

    /// Compare-and-swap update, same contract as [`OrderStore::update`].
    async fn update(&self, coupon: Coupon) -> Result<Coupon, StoreError>;

    async fn list(&self) -> Result<Vec<Coupon>, StoreError>;
}

/// External product/stock store. `decrement` is the critical section for
/// checkout: all lines succeed or none do, and stock never goes negative.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn set_stock(&self, product_id: Uuid, size: &str, quantity: u32)
        -> Result<(), StoreError>;
    async fn available(&self, product_id: Uuid, size: &str) -> Result<u32, StoreError>;

    /// Atomic all-or-nothing conditional decrement across every line.
    async fn decrement(&self, lines: &[StockLine]) -> Result<(), StoreError>;

    /// Gives previously decremented units back, compensating a checkout
    /// that failed after its decrement committed.
    async fn restore(&self, lines: &[StockLine]) -> Result<(), StoreError>;
}
