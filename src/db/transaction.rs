/*!
 * Transaction Helper Utilities
 *
 * Runs a unit of work inside a database transaction: commit on `Ok`, rollback on `Err`.
 */

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// The caller's error type is preserved; connection and commit failures are
/// converted through `From<DbErr>`.
///
/// # Example
///
/// ```rust,ignore
/// use crate::db::transaction::transaction_scope;
///
/// let order = transaction_scope(&db, |txn| {
///     Box::pin(async move {
///         let order = new_order.insert(txn).await?;
///         for item in items {
///             item.insert(txn).await?;
///         }
///         Ok::<_, ServiceError>(order)
///     })
/// })
/// .await?;
/// ```
pub async fn transaction_scope<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, E>> + Send,
    T: Send,
    E: From<DbErr> + std::error::Error + Send,
{
    db.transaction::<_, T, E>(f).await.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}
