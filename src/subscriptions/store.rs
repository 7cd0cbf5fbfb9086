use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::models::{NewSubscription, Plan, Subscription, SubscriptionStatus};

/// Name of the partial unique index that keeps one ACTIVE record per user.
pub const ONE_ACTIVE_PER_USER: &str = "subscriptions_one_active_per_user";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user already has an active subscription")]
    DuplicateActive,
    #[error("subscription {id} is {actual}, expected {expected}")]
    StatusMismatch {
        id: Uuid,
        expected: SubscriptionStatus,
        actual: SubscriptionStatus,
    },
    #[error("subscription {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    #[error("subscription {0} not found")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// key: plan-catalog -> read-only plan lookups
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    async fn find_plan_by_id(&self, id: Uuid) -> Result<Option<Plan>, StoreError>;
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError>;
}

/// key: subscription-store -> persistence seam for the lifecycle engine
///
/// Implementations must reject a second ACTIVE record for the same user at
/// write time with [`StoreError::DuplicateActive`], must apply guarded
/// status writes only when the record still holds the expected status, and
/// must refuse any status change out of a terminal status with
/// [`StoreError::InvalidTransition`].
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_active_subscription_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Most recently created record, ties broken by the highest id.
    async fn find_latest_subscription_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    async fn insert_subscription(
        &self,
        record: NewSubscription,
    ) -> Result<Subscription, StoreError>;

    async fn update_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
        expected: Option<SubscriptionStatus>,
    ) -> Result<Subscription, StoreError>;

    /// Cancels `current_id` (which must still be ACTIVE) and inserts
    /// `replacement` as one unit: both writes land or neither does.
    async fn switch_subscription(
        &self,
        current_id: Uuid,
        replacement: NewSubscription,
    ) -> Result<Subscription, StoreError>;
}
