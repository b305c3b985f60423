use crate::{
    db::DbPool,
    entities::{product, product_variant},
    errors::ServiceError,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Authoritative price and available stock for one variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceAndStock {
    pub price: Decimal,
    pub stock: i32,
}

/// Read side of the product catalog used at checkout
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// `None` when the product, or its color/size variant, does not exist.
    async fn price_and_stock(
        &self,
        product_id: Uuid,
        color: &str,
        size: &str,
    ) -> Result<Option<PriceAndStock>, ServiceError>;
}

/// Catalog backed by the `products` and `product_variants` tables
#[derive(Clone)]
pub struct DbCatalogStore {
    db: Arc<DbPool>,
}

impl DbCatalogStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogStore for DbCatalogStore {
    async fn price_and_stock(
        &self,
        product_id: Uuid,
        color: &str,
        size: &str,
    ) -> Result<Option<PriceAndStock>, ServiceError> {
        let db = &*self.db;

        let Some(product) = product::Entity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(product_id = %product_id, error = %e, "Failed to load product");
                ServiceError::DatabaseError(e)
            })?
        else {
            debug!(product_id = %product_id, "Unknown product");
            return Ok(None);
        };

        let variants = product_variant::Entity::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .all(db)
            .await
            .map_err(|e| {
                error!(product_id = %product_id, error = %e, "Failed to load product variants");
                ServiceError::DatabaseError(e)
            })?;

        if variants.is_empty() {
            return Ok(Some(PriceAndStock {
                price: product.price,
                stock: product.stock_quantity,
            }));
        }

        Ok(variants
            .into_iter()
            .find(|v| v.color == color && v.size == size)
            .map(|v| PriceAndStock {
                price: product.price,
                stock: v.stock_quantity,
            }))
    }
}
