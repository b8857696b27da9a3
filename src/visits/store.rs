use async_trait::async_trait;
use thiserror::Error;

use crate::db::{NewVisit, SellerId, Visit, VisitClosure, VisitId};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the insert because the seller already has a pending visit.
    #[error("seller already has a pending visit")]
    PendingVisitExists,

    /// Transport, policy or query failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistent store holding visit rows. Access policy is enforced by the store:
/// a seller only sees and closes their own rows.
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Most recent `pending` visit for the seller, if any.
    async fn find_pending_visit(&self, seller_id: SellerId) -> StoreResult<Option<Visit>>;

    /// Inserts a `pending` visit and returns the created row.
    async fn insert_visit(&self, visit: NewVisit) -> StoreResult<Visit>;

    /// Closes the visit and returns the rows actually updated. An empty vec
    /// means nothing matched: wrong owner, already closed, or gone.
    async fn close_visit(
        &self,
        seller_id: SellerId,
        visit_id: VisitId,
        closure: VisitClosure,
    ) -> StoreResult<Vec<Visit>>;
}
