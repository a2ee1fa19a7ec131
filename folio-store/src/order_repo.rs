use async_trait::async_trait;
use folio_core::repository::{OrderRepository, StoreError, UnitOfWork};
use folio_shared::{
    Item, ItemId, NewOrder, Order, OrderId, OrderLine, OrderStatus, PageRequest, UserId,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::database::db_error;

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn page_ids(
        &self,
        buyer_id: Option<UserId>,
        page: PageRequest,
    ) -> Result<(Vec<i64>, u64), StoreError> {
        let buyer = buyer_id.map(|b| b.0);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::BIGINT IS NULL OR buyer_id = $1)",
        )
        .bind(buyer)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE ($1::BIGINT IS NULL OR buyer_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(buyer)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok((ids, total.max(0) as u64))
    }

    async fn load_many(&self, ids: Vec<i64>) -> Result<Vec<Order>, StoreError> {
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = self.load_order(OrderId(id)).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    buyer_id: i64,
    total_cents: i64,
    status: String,
    payment_reference: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    id: i64,
    item_id: i64,
    quantity: i32,
    unit_price_cents: i64,
    title: Option<String>,
    current_price_cents: Option<i64>,
    stock: Option<i32>,
}

impl From<OrderLineRow> for OrderLine {
    fn from(row: OrderLineRow) -> Self {
        let item = match (row.title, row.current_price_cents, row.stock) {
            (Some(title), Some(price_cents), Some(stock)) => Some(Item {
                id: ItemId(row.item_id),
                title,
                price_cents,
                stock,
            }),
            _ => None,
        };

        OrderLine {
            id: row.id,
            item_id: ItemId(row.item_id),
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            item,
        }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, buyer_id, total_cents, status, payment_reference, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, OrderLineRow>(
            r#"
            SELECT l.id, l.item_id, l.quantity, l.unit_price_cents,
                   i.title, i.price_cents AS current_price_cents, i.stock
            FROM order_lines l
            LEFT JOIN items i ON i.id = l.item_id
            WHERE l.order_id = $1
            ORDER BY l.id
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::backend(format!("order {}: {}", row.id, e)))?;

        Ok(Some(Order {
            id: OrderId(row.id),
            buyer_id: UserId(row.buyer_id),
            lines: lines.into_iter().map(OrderLine::from).collect(),
            total_cents: row.total_cents,
            status,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn list_orders_for_buyer(
        &self,
        buyer_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), StoreError> {
        let (ids, total) = self.page_ids(Some(buyer_id), page).await?;
        Ok((self.load_many(ids).await?, total))
    }

    async fn list_orders(&self, page: PageRequest) -> Result<(Vec<Order>, u64), StoreError> {
        let (ids, total) = self.page_ids(None, page).await?;
        Ok((self.load_many(ids).await?, total))
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }
}

/// A Postgres transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn persist_order(&mut self, order: &NewOrder) -> Result<OrderId, StoreError> {
        let order_id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (buyer_id, total_cents, status) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(order.buyer_id.0)
        .bind(order.total_cents)
        .bind(order.status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        for line in &order.lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, item_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order_id)
            .bind(line.item_id.0)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        }

        debug!(order_id, lines = order.lines.len(), "Order rows inserted");
        Ok(OrderId(order_id))
    }

    async fn stock_for_update(&mut self, item_id: ItemId) -> Result<Option<i32>, StoreError> {
        sqlx::query_scalar("SELECT stock FROM items WHERE id = $1 FOR NO KEY UPDATE")
            .bind(item_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)
    }

    async fn decrement_stock(&mut self, item_id: ItemId, new_value: i32) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE items SET stock = $1, updated_at = NOW() WHERE id = $2")
            .bind(new_value)
            .bind(item_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound(format!("item {}", item_id)));
        }
        Ok(())
    }

    async fn transition_status(
        &mut self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
        )
        .bind(to.as_str())
        .bind(id.0)
        .bind(from.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_payment_reference(
        &mut self,
        id: OrderId,
        reference: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET payment_reference = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(reference)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.commit().await.map_err(db_error)?;
        info!("Database transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.rollback().await.map_err(db_error)?;
        info!("Database transaction rolled back");
        Ok(())
    }
}
