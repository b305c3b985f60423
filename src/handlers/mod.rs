pub mod orders;
pub mod payment_webhooks;

use std::sync::Arc;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        catalog::{CatalogStore, DbCatalogStore},
        checkout::CheckoutService,
        order_status::OrderStatusService,
        orders::OrderLedger,
        payment_gateway::PaymentGateway,
        reconciler::PaymentReconciler,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub ledger: OrderLedger,
    pub checkout: Arc<CheckoutService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub order_status: Arc<OrderStatusService>,
}

impl AppServices {
    /// Wires the services against the database catalog and the given gateway.
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let catalog: Arc<dyn CatalogStore> = Arc::new(DbCatalogStore::new(db_pool.clone()));
        let ledger = OrderLedger::new(db_pool);

        let checkout = Arc::new(CheckoutService::new(
            catalog,
            gateway.clone(),
            ledger.clone(),
            Some(event_sender.clone()),
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            gateway,
            ledger.clone(),
            Some(event_sender.clone()),
        ));
        let order_status = Arc::new(OrderStatusService::new(
            ledger.clone(),
            Some(event_sender),
        ));

        Self {
            ledger,
            checkout,
            reconciler,
            order_status,
        }
    }
}
