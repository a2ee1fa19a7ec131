use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_core::repository::{CatalogRepository, OrderRepository, StoreError, UnitOfWork};
use folio_shared::{
    Item, ItemId, NewOrder, Order, OrderId, OrderLine, OrderStatus, PageRequest, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Operations that can be made to fail on demand, to exercise rollback paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    PersistOrder,
    DecrementStock,
    UpdatePaymentReference,
    Commit,
}

#[derive(Debug, Clone)]
struct OrderRecord {
    id: OrderId,
    buyer_id: UserId,
    lines: Vec<LineRecord>,
    total_cents: i64,
    status: OrderStatus,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct LineRecord {
    id: i64,
    item_id: ItemId,
    quantity: i32,
    unit_price_cents: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    items: HashMap<ItemId, Item>,
    orders: HashMap<OrderId, OrderRecord>,
}

impl MemoryState {
    fn hydrate(&self, record: &OrderRecord) -> Order {
        Order {
            id: record.id,
            buyer_id: record.buyer_id,
            lines: record
                .lines
                .iter()
                .map(|line| OrderLine {
                    id: line.id,
                    item_id: line.item_id,
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price_cents,
                    item: self.items.get(&line.item_id).cloned(),
                })
                .collect(),
            total_cents: record.total_cents,
            status: record.status,
            payment_reference: record.payment_reference.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn page<'a>(
        &self,
        records: impl Iterator<Item = &'a OrderRecord>,
        page: PageRequest,
    ) -> (Vec<Order>, u64) {
        let mut matching: Vec<&OrderRecord> = records.collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let orders = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .map(|record| self.hydrate(record))
            .collect();
        (orders, total)
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail: Mutex<HashSet<FailPoint>>,
    persist_latency: Mutex<Option<Duration>>,
}

impl Faults {
    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        let armed = self
            .fail
            .lock()
            .map(|set| set.contains(&point))
            .unwrap_or(false);
        if armed {
            return Err(StoreError::backend(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }

    fn latency(&self) -> Option<Duration> {
        self.persist_latency.lock().ok().and_then(|latency| *latency)
    }
}

/// In-process store with real transactional semantics: every unit of work
/// stages its writes privately and publishes them in one step on commit.
/// Used by the development profile (no database configured) and by tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
    next_order_id: Arc<AtomicI64>,
    next_line_id: Arc<AtomicI64>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let state = MemoryState {
            items: items.into_iter().map(|item| (item.id, item)).collect(),
            orders: HashMap::new(),
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            ..Self::default()
        }
    }

    pub async fn insert_item(&self, item: Item) {
        self.state.write().await.items.insert(item.id, item);
    }

    /// Catalog-side price change; existing order lines are unaffected
    pub async fn set_price(&self, id: ItemId, price_cents: i64) {
        if let Some(item) = self.state.write().await.items.get_mut(&id) {
            item.price_cents = price_cents;
        }
    }

    pub async fn set_stock(&self, id: ItemId, stock: i32) {
        if let Some(item) = self.state.write().await.items.get_mut(&id) {
            item.stock = stock;
        }
    }

    pub async fn stock(&self, id: ItemId) -> Option<i32> {
        self.state.read().await.items.get(&id).map(|item| item.stock)
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Overwrite the stored total, bypassing the settlement path
    pub async fn corrupt_total(&self, id: OrderId, total_cents: i64) {
        if let Some(order) = self.state.write().await.orders.get_mut(&id) {
            order.total_cents = total_cents;
        }
    }

    pub fn fail_on(&self, point: FailPoint) {
        if let Ok(mut set) = self.faults.fail.lock() {
            set.insert(point);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut set) = self.faults.fail.lock() {
            set.clear();
        }
    }

    /// Make every `persist_order` take at least this long
    pub fn set_persist_latency(&self, latency: Duration) {
        if let Ok(mut slot) = self.faults.persist_latency.lock() {
            *slot = Some(latency);
        }
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.state.read().await.items.get(&id).cloned())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork {
            state: self.state.clone(),
            next_order_id: self.next_order_id.clone(),
            next_line_id: self.next_line_id.clone(),
            faults: self.faults.clone(),
            orders: Vec::new(),
            stock: HashMap::new(),
            transitions: Vec::new(),
            references: Vec::new(),
        }))
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id).map(|record| state.hydrate(record)))
    }

    async fn list_orders_for_buyer(
        &self,
        buyer_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), StoreError> {
        let state = self.state.read().await;
        Ok(state.page(
            state.orders.values().filter(|o| o.buyer_id == buyer_id),
            page,
        ))
    }

    async fn list_orders(&self, page: PageRequest) -> Result<(Vec<Order>, u64), StoreError> {
        let state = self.state.read().await;
        Ok(state.page(state.orders.values(), page))
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&id) {
            Some(order) => {
                order.status = status;
                order.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

struct MemoryUnitOfWork {
    state: Arc<RwLock<MemoryState>>,
    next_order_id: Arc<AtomicI64>,
    next_line_id: Arc<AtomicI64>,
    faults: Arc<Faults>,
    orders: Vec<OrderRecord>,
    stock: HashMap<ItemId, i32>,
    transitions: Vec<(OrderId, OrderStatus, OrderStatus)>,
    references: Vec<(OrderId, String)>,
}

impl MemoryUnitOfWork {
    /// Status as this unit of work sees it
    async fn current_status(&self, id: OrderId) -> Option<OrderStatus> {
        if let Some((_, _, to)) = self.transitions.iter().rev().find(|(oid, _, _)| *oid == id) {
            return Some(*to);
        }
        if let Some(staged) = self.orders.iter().find(|o| o.id == id) {
            return Some(staged.status);
        }
        self.state.read().await.orders.get(&id).map(|o| o.status)
    }

    async fn order_exists(&self, id: OrderId) -> bool {
        self.orders.iter().any(|o| o.id == id) || self.state.read().await.orders.contains_key(&id)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn persist_order(&mut self, order: &NewOrder) -> Result<OrderId, StoreError> {
        if let Some(latency) = self.faults.latency() {
            tokio::time::sleep(latency).await;
        }
        self.faults.check(FailPoint::PersistOrder)?;

        let id = OrderId(self.next_order_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = Utc::now();
        let lines = order
            .lines
            .iter()
            .map(|line| LineRecord {
                id: self.next_line_id.fetch_add(1, Ordering::SeqCst) + 1,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
            })
            .collect();

        self.orders.push(OrderRecord {
            id,
            buyer_id: order.buyer_id,
            lines,
            total_cents: order.total_cents,
            status: order.status,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn stock_for_update(&mut self, item_id: ItemId) -> Result<Option<i32>, StoreError> {
        if let Some(staged) = self.stock.get(&item_id) {
            return Ok(Some(*staged));
        }
        Ok(self.state.read().await.items.get(&item_id).map(|item| item.stock))
    }

    async fn decrement_stock(&mut self, item_id: ItemId, new_value: i32) -> Result<(), StoreError> {
        self.faults.check(FailPoint::DecrementStock)?;
        if new_value < 0 {
            return Err(StoreError::backend(format!(
                "stock of item {} would become {}",
                item_id, new_value
            )));
        }
        if !self.state.read().await.items.contains_key(&item_id) {
            return Err(StoreError::RowNotFound(format!("item {}", item_id)));
        }
        self.stock.insert(item_id, new_value);
        Ok(())
    }

    async fn transition_status(
        &mut self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        if self.current_status(id).await != Some(from) {
            return Ok(false);
        }
        self.transitions.push((id, from, to));
        Ok(true)
    }

    async fn update_payment_reference(
        &mut self,
        id: OrderId,
        reference: &str,
    ) -> Result<bool, StoreError> {
        self.faults.check(FailPoint::UpdatePaymentReference)?;
        if !self.order_exists(id).await {
            return Ok(false);
        }
        self.references.push((id, reference.to_string()));
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.faults.check(FailPoint::Commit)?;

        let mut state = self.state.write().await;

        // Compare-and-set transitions must still hold against whatever other
        // units of work committed meanwhile. Only the first transition per
        // order reads committed state; later ones chain off it.
        let mut checked = HashSet::new();
        for (id, from, _) in &self.transitions {
            if !checked.insert(*id) || self.orders.iter().any(|o| o.id == *id) {
                continue;
            }
            if state.orders.get(id).map(|o| o.status) != Some(*from) {
                return Err(StoreError::Conflict(format!(
                    "order {} is no longer {}",
                    id, from
                )));
            }
        }

        let now = Utc::now();
        for (item_id, value) in &self.stock {
            if let Some(item) = state.items.get_mut(item_id) {
                item.stock = *value;
            }
        }
        for record in &self.orders {
            state.orders.insert(record.id, record.clone());
        }
        for (id, _, to) in &self.transitions {
            if let Some(order) = state.orders.get_mut(id) {
                order.status = *to;
                order.updated_at = now;
            }
        }
        for (id, reference) in &self.references {
            if let Some(order) = state.orders.get_mut(id) {
                order.payment_reference = Some(reference.clone());
                order.updated_at = now;
            }
        }

        debug!(
            orders = self.orders.len(),
            stock_writes = self.stock.len(),
            "In-memory unit of work committed"
        );
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        debug!(orders = self.orders.len(), "In-memory unit of work rolled back");
        Ok(())
    }
}
