// Collaborators
pub mod catalog;
pub mod payment_gateway;

// Order workflow
pub mod checkout;
pub mod order_status;
pub mod orders;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::{self, DbConfig, DbPool};
    use crate::entities::{product, product_variant};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sea_orm::{ActiveModelTrait, Set};
    use std::sync::Arc;
    use uuid::Uuid;

    /// Migrated in-memory SQLite pinned to a single connection
    pub async fn memory_db() -> Arc<DbPool> {
        let pool = db::establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("sqlite connects");
        db::run_migrations(&pool).await.expect("migrations apply");
        Arc::new(pool)
    }

    pub async fn seed_product(db: &DbPool, price: Decimal, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        product::ActiveModel {
            id: Set(id),
            name: Set(format!("Tee {id}")),
            price: Set(price),
            stock_quantity: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("insert product");
        id
    }

    pub async fn seed_variant(db: &DbPool, product_id: Uuid, color: &str, size: &str, stock: i32) {
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            color: Set(color.to_string()),
            size: Set(size.to_string()),
            stock_quantity: Set(stock),
        }
        .insert(db)
        .await
        .expect("insert variant");
    }
}
