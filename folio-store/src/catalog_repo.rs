use async_trait::async_trait;
use folio_core::repository::{CatalogRepository, StoreError};
use folio_shared::{Item, ItemId};
use sqlx::PgPool;

use crate::database::db_error;

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    title: String,
    price_cents: i64,
    stock: i32,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: ItemId(row.id),
            title: row.title,
            price_cents: row.price_cents,
            stock: row.stock,
        }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>(
            "SELECT id, title, price_cents, stock FROM items WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(Item::from))
    }
}
