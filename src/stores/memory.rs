//! In-memory store implementations. Per-key atomicity comes from the
//! dashmap entry guards; the stock table uses a single mutex so a multi-line
//! decrement validates and commits as one unit.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{Coupon, Order, Return, ReturnStatus};

use super::{CouponStore, OrderStore, ReturnStore, StockLine, StockStore, StoreError};

const MAX_PAGE_SIZE: u64 = 100;

fn paginate<T: Clone>(items: &[T], page: u64, limit: u64) -> Vec<T> {
    let page = page.max(1);
    let limit = limit.min(MAX_PAGE_SIZE);
    // page and limit are caller-supplied; the offset must not overflow.
    let start = usize::try_from((page - 1).saturating_mul(limit)).unwrap_or(usize::MAX);
    items.iter().skip(start).take(limit as usize).cloned().collect()
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    by_number: DashMap<String, Uuid>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_newest_first(&self, mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, mut order: Order) -> Result<Order, StoreError> {
        if self.by_number.contains_key(&order.order_number) {
            return Err(StoreError::Duplicate(order.order_number));
        }
        order.version = 1;
        self.by_number.insert(order.order_number.clone(), order.id);
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    async fn get_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        match self.by_number.get(order_number) {
            Some(id) => self.get(*id).await,
            None => Ok(None),
        }
    }

    async fn update(&self, mut order: Order) -> Result<Order, StoreError> {
        // Entry guard keeps the version check and the write atomic per key.
        let mut entry = self.orders.get_mut(&order.id).ok_or(StoreError::NotFound)?;
        if entry.version != order.version {
            return Err(StoreError::VersionConflict);
        }
        order.version += 1;
        order.updated_at = Some(Utc::now());
        *entry = order.clone();
        Ok(order)
    }

    async fn list(&self, page: u64, limit: u64) -> Result<(Vec<Order>, u64), StoreError> {
        let all: Vec<Order> = self.orders.iter().map(|e| e.clone()).collect();
        let total = all.len() as u64;
        let sorted = self.sorted_newest_first(all);
        Ok((paginate(&sorted, page, limit), total))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Order>, u64), StoreError> {
        let all: Vec<Order> = self
            .orders
            .iter()
            .filter(|e| e.user_id == Some(user_id))
            .map(|e| e.clone())
            .collect();
        let total = all.len() as u64;
        let sorted = self.sorted_newest_first(all);
        Ok((paginate(&sorted, page, limit), total))
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        Ok(self
            .orders
            .iter()
            .filter(|e| e.user_id == Some(user_id))
            .count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryReturnStore {
    returns: DashMap<Uuid, Return>,
}

impl InMemoryReturnStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReturnStore for InMemoryReturnStore {
    async fn insert(&self, mut ret: Return) -> Result<Return, StoreError> {
        ret.version = 1;
        self.returns.insert(ret.id, ret.clone());
        Ok(ret)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Return>, StoreError> {
        Ok(self.returns.get(&id).map(|r| r.clone()))
    }

    async fn update(&self, mut ret: Return) -> Result<Return, StoreError> {
        let mut entry = self.returns.get_mut(&ret.id).ok_or(StoreError::NotFound)?;
        if entry.version != ret.version {
            return Err(StoreError::VersionConflict);
        }
        ret.version += 1;
        ret.updated_at = Some(Utc::now());
        *entry = ret.clone();
        Ok(ret)
    }

    async fn list(
        &self,
        page: u64,
        limit: u64,
        status: Option<ReturnStatus>,
    ) -> Result<(Vec<Return>, u64), StoreError> {
        let mut all: Vec<Return> = self
            .returns
            .iter()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .map(|e| e.clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as u64;
        Ok((paginate(&all, page, limit), total))
    }

    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<Return>, StoreError> {
        let mut all: Vec<Return> = self
            .returns
            .iter()
            .filter(|e| e.order_id == order_id)
            .map(|e| e.clone())
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

#[derive(Default)]
pub struct InMemoryCouponStore {
    coupons: DashMap<String, Coupon>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn insert(&self, mut coupon: Coupon) -> Result<Coupon, StoreError> {
        if self.coupons.contains_key(&coupon.code) {
            return Err(StoreError::Duplicate(coupon.code));
        }
        coupon.version = 1;
        self.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(coupon)
    }

    async fn get_by_code(&self, canonical_code: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self.coupons.get(canonical_code).map(|c| c.clone()))
    }

    async fn update(&self, mut coupon: Coupon) -> Result<Coupon, StoreError> {
        let mut entry = self
            .coupons
            .get_mut(&coupon.code)
            .ok_or(StoreError::NotFound)?;
        if entry.version != coupon.version {
            return Err(StoreError::VersionConflict);
        }
        coupon.version += 1;
        coupon.updated_at = Some(Utc::now());
        *entry = coupon.clone();
        Ok(coupon)
    }

    async fn list(&self) -> Result<Vec<Coupon>, StoreError> {
        Ok(self.coupons.iter().map(|c| c.clone()).collect())
    }
}

#[derive(Default)]
pub struct InMemoryStockStore {
    // Single lock so decrement validates and commits all lines atomically.
    levels: Mutex<HashMap<(Uuid, String), u32>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn set_stock(
        &self,
        product_id: Uuid,
        size: &str,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let mut levels = self
            .levels
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        levels.insert((product_id, size.to_string()), quantity);
        Ok(())
    }

    async fn available(&self, product_id: Uuid, size: &str) -> Result<u32, StoreError> {
        let levels = self
            .levels
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(*levels.get(&(product_id, size.to_string())).unwrap_or(&0))
    }

    async fn decrement(&self, lines: &[StockLine]) -> Result<(), StoreError> {
        let mut levels = self
            .levels
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Duplicate lines for the same (product, size) draw from one level,
        // so aggregate per key before validating anything.
        let mut wanted: HashMap<(Uuid, String), u32> = HashMap::new();
        for line in lines {
            let entry = wanted
                .entry((line.product_id, line.size.clone()))
                .or_insert(0);
            *entry = entry.saturating_add(line.quantity);
        }

        // Validate every key before touching any level.
        for ((product_id, size), quantity) in &wanted {
            let available = *levels.get(&(*product_id, size.clone())).unwrap_or(&0);
            if available < *quantity {
                return Err(StoreError::InsufficientStock {
                    product_id: *product_id,
                    size: size.clone(),
                });
            }
        }
        for (key, quantity) in wanted {
            if let Some(level) = levels.get_mut(&key) {
                *level -= quantity;
            }
        }
        Ok(())
    }

    async fn restore(&self, lines: &[StockLine]) -> Result<(), StoreError> {
        let mut levels = self
            .levels
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        for line in lines {
            let level = levels
                .entry((line.product_id, line.size.clone()))
                .or_insert(0);
            *level = level.saturating_add(line.quantity);
        }
        Ok(())
    }
}
