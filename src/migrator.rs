use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_products_table::Migration),
            Box::new(m20240601_000002_create_product_variants_table::Migration),
            Box::new(m20240601_000003_create_orders_table::Migration),
            Box::new(m20240601_000004_create_order_items_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240601_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Catalog rows; only price and stock are read by checkout
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Price).decimal_len(10, 2).not_null())
                        .col(
                            ColumnDef::new(Products::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Products {
        Table,
        Id,
        Name,
        Price,
        StockQuantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_product_variants_table {

    use super::m20240601_000001_create_products_table::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_product_variants_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariants::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariants::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductVariants::Color).string().not_null())
                        .col(ColumnDef::new(ProductVariants::Size).string().not_null())
                        .col(
                            ColumnDef::new(ProductVariants::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_variants_product")
                                .from(ProductVariants::Table, ProductVariants::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_variants_lookup")
                        .table(ProductVariants::Table)
                        .col(ProductVariants::ProductId)
                        .col(ProductVariants::Color)
                        .col(ProductVariants::Size)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProductVariants {
        Table,
        Id,
        ProductId,
        Color,
        Size,
        StockQuantity,
    }
}

mod m20240601_000003_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create orders table aligned with entities::order Model
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalPrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::ShippingName).string().not_null())
                        .col(
                            ColumnDef::new(Orders::ShippingAddressLine1)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::ShippingAddressLine2).string().null())
                        .col(ColumnDef::new(Orders::ShippingCity).string().not_null())
                        .col(
                            ColumnDef::new(Orders::ShippingPostalCode)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::ShippingCountry).string().not_null())
                        .col(
                            ColumnDef::new(Orders::Status)
                                .string_len(20)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(Orders::PaymentMethod).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Useful indexes
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Orders {
        Table,
        Id,
        UserId,
        TotalPrice,
        ShippingName,
        ShippingAddressLine1,
        ShippingAddressLine2,
        ShippingCity,
        ShippingPostalCode,
        ShippingCountry,
        Status,
        PaymentMethod,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000004_create_order_items_table {

    use super::m20240601_000001_create_products_table::Products;
    use super::m20240601_000003_create_orders_table::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Line items freeze price, color and size at purchase time
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::PriceAtPurchase)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::ColorAtPurchase)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::SizeAtPurchase)
                                .string()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_product")
                                .from(OrderItems::Table, OrderItems::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        PriceAtPurchase,
        ColorAtPurchase,
        SizeAtPurchase,
    }
}
