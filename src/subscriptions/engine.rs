use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::duration::DurationError;
use super::models::{NewSubscription, Plan, Subscription, SubscriptionStatus};
use super::store::{PlanCatalog, StoreError, SubscriptionStore};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("plan {plan_id} has an unusable duration: {source}")]
    InvalidDuration {
        plan_id: Uuid,
        #[source]
        source: DurationError,
    },
    #[error("subscription store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl SubscriptionError {
    /// Only persistence failures are worth retrying; everything else needs a
    /// different request or a catalog fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubscriptionError::StoreUnavailable(_))
    }
}

impl From<StoreError> for SubscriptionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateActive
            | StoreError::StatusMismatch { .. }
            | StoreError::InvalidTransition { .. } => {
                SubscriptionError::Conflict(err.to_string())
            }
            StoreError::NotFound(_) => SubscriptionError::NotFound(err.to_string()),
            StoreError::Database(_) => SubscriptionError::StoreUnavailable(err),
        }
    }
}

const PLAN_NOT_FOUND: &str = "plan not found";
const NO_ACTIVE_SUBSCRIPTION: &str = "no active subscription found for this user";

/// key: subscription-engine -> lifecycle rules over catalog + store
///
/// Stateless between calls; every invariant is enforced through the store.
#[derive(Clone)]
pub struct SubscriptionEngine {
    catalog: Arc<dyn PlanCatalog>,
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionEngine {
    pub fn new(catalog: Arc<dyn PlanCatalog>, store: Arc<dyn SubscriptionStore>) -> Self {
        Self { catalog, store }
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>, SubscriptionError> {
        Ok(self.catalog.list_plans().await?)
    }

    pub async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, SubscriptionError> {
        Ok(self.catalog.find_plan_by_id(plan_id).await?)
    }

    pub async fn create_subscription(
        &self,
        user_id: &str,
        plan_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let user_id = require_user(user_id)?;
        let plan = self.require_plan(plan_id).await?;

        // Advisory: the store rejects a second ACTIVE record at write time.
        if self
            .store
            .find_active_subscription_by_user(user_id)
            .await?
            .is_some()
        {
            return Err(SubscriptionError::Conflict(
                "user already has an active subscription".to_string(),
            ));
        }

        let record = new_record(user_id, &plan, now)?;
        let created = self.store.insert_subscription(record).await?;
        info!(
            user_id = %created.user_id,
            subscription = %created.id,
            plan = %plan.id,
            end_date = %created.end_date,
            "subscription created"
        );
        Ok(created)
    }

    /// Latest record for the user, expired first if its period has lapsed.
    pub async fn get_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let user_id = require_user(user_id)?;
        let latest = self
            .store
            .find_latest_subscription_by_user(user_id)
            .await?
            .ok_or_else(|| {
                SubscriptionError::NotFound("no subscription found for this user".to_string())
            })?;

        if !latest.is_lapsed(now) {
            return Ok(latest);
        }

        match self
            .store
            .update_subscription_status(
                latest.id,
                SubscriptionStatus::Expired,
                Some(SubscriptionStatus::Active),
            )
            .await
        {
            Ok(expired) => {
                info!(
                    user_id = %expired.user_id,
                    subscription = %expired.id,
                    end_date = %expired.end_date,
                    "subscription changed to EXPIRED"
                );
                Ok(expired)
            }
            Err(StoreError::StatusMismatch { actual, .. }) => {
                warn!(
                    user_id = %latest.user_id,
                    subscription = %latest.id,
                    %actual,
                    "lazy expiry lost a race; returning current record"
                );
                self.store
                    .find_latest_subscription_by_user(user_id)
                    .await?
                    .ok_or_else(|| {
                        SubscriptionError::NotFound(
                            "no subscription found for this user".to_string(),
                        )
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Switches plans by cancelling the ACTIVE record and creating a new one
    /// in a single store transaction.
    pub async fn update_subscription(
        &self,
        user_id: &str,
        new_plan_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let user_id = require_user(user_id)?;
        let current = self.require_active(user_id).await?;
        let plan = self.require_plan(new_plan_id).await?;
        if current.plan_id == plan.id {
            return Err(SubscriptionError::Conflict(
                "user is already subscribed to this plan".to_string(),
            ));
        }

        let record = new_record(user_id, &plan, now)?;
        let created = self.store.switch_subscription(current.id, record).await?;
        info!(
            user_id = %created.user_id,
            cancelled = %current.id,
            subscription = %created.id,
            from_plan = %current.plan_id,
            to_plan = %created.plan_id,
            "subscription plan switched"
        );
        Ok(created)
    }

    pub async fn cancel_subscription(
        &self,
        user_id: &str,
    ) -> Result<Subscription, SubscriptionError> {
        let user_id = require_user(user_id)?;
        let current = self.require_active(user_id).await?;
        let cancelled = self
            .transition(&current, SubscriptionStatus::Cancelled)
            .await?;
        info!(
            user_id = %cancelled.user_id,
            subscription = %cancelled.id,
            "subscription cancelled"
        );
        Ok(cancelled)
    }

    async fn transition(
        &self,
        record: &Subscription,
        next: SubscriptionStatus,
    ) -> Result<Subscription, SubscriptionError> {
        if !record.status.can_transition_to(next) {
            return Err(SubscriptionError::Conflict(format!(
                "subscription {} cannot move from {} to {}",
                record.id, record.status, next
            )));
        }
        Ok(self
            .store
            .update_subscription_status(record.id, next, Some(record.status))
            .await?)
    }

    async fn require_plan(&self, plan_id: Uuid) -> Result<Plan, SubscriptionError> {
        self.catalog
            .find_plan_by_id(plan_id)
            .await?
            .ok_or_else(|| SubscriptionError::NotFound(PLAN_NOT_FOUND.to_string()))
    }

    async fn require_active(&self, user_id: &str) -> Result<Subscription, SubscriptionError> {
        self.store
            .find_active_subscription_by_user(user_id)
            .await?
            .ok_or_else(|| SubscriptionError::NotFound(NO_ACTIVE_SUBSCRIPTION.to_string()))
    }
}

fn require_user(user_id: &str) -> Result<&str, SubscriptionError> {
    if user_id.trim().is_empty() {
        return Err(SubscriptionError::InvalidInput(
            "user id must not be empty".to_string(),
        ));
    }
    Ok(user_id)
}

fn new_record(
    user_id: &str,
    plan: &Plan,
    now: DateTime<Utc>,
) -> Result<NewSubscription, SubscriptionError> {
    NewSubscription::for_plan(user_id, plan, now).map_err(|source| {
        error!(
            plan = %plan.id,
            duration = %plan.duration,
            %source,
            "plan catalog holds an unusable duration"
        );
        SubscriptionError::InvalidDuration {
            plan_id: plan.id,
            source,
        }
    })
}
