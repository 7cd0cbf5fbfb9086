use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{NewSubscription, Plan, Subscription, SubscriptionStatus};
use super::store::{PlanCatalog, StoreError, SubscriptionStore};

/// key: subscription-store-memory -> in-process double for the engine
///
/// Checks and writes happen under one lock, which gives the same guarantees
/// the Postgres partial unique index and transactions give `PgStore`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    plans: HashMap<Uuid, Plan>,
    subscriptions: HashMap<Uuid, Subscription>,
    last_stamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Strictly increasing at microsecond precision, like a Postgres timestamptz.
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn active_for(&self, user_id: &str) -> Option<&Subscription> {
        self.subscriptions
            .values()
            .find(|record| record.user_id == user_id && record.is_active())
    }

    fn insert_active(&mut self, record: NewSubscription) -> Result<Subscription, StoreError> {
        if self.active_for(&record.user_id).is_some() {
            return Err(StoreError::DuplicateActive);
        }
        let stamp = self.next_stamp();
        let created = Subscription {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            plan_id: record.plan_id,
            start_date: record.start_date,
            end_date: record.end_date,
            status: SubscriptionStatus::Active,
            price_at_subscription: record.price_at_subscription,
            created_at: stamp,
            updated_at: stamp,
        };
        self.subscriptions.insert(created.id, created.clone());
        Ok(created)
    }

    fn set_status(
        &mut self,
        id: Uuid,
        status: SubscriptionStatus,
        expected: Option<SubscriptionStatus>,
    ) -> Result<Subscription, StoreError> {
        let current = self
            .subscriptions
            .get(&id)
            .map(|record| record.status)
            .ok_or(StoreError::NotFound(id))?;
        if let Some(expected) = expected {
            if current != expected {
                return Err(StoreError::StatusMismatch {
                    id,
                    expected,
                    actual: current,
                });
            }
        }
        if !current.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: current,
                to: status,
            });
        }
        let stamp = self.next_stamp();
        let record = self
            .subscriptions
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        record.status = status;
        record.updated_at = stamp;
        Ok(record.clone())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a catalog entry. Catalog management is not part of the engine, so
    /// this is only used to seed fixtures.
    pub async fn add_plan(
        &self,
        name: &str,
        price: f64,
        duration: &str,
        features: &[&str],
    ) -> Plan {
        let mut state = self.inner.lock().await;
        let stamp = state.next_stamp();
        let plan = Plan {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price,
            features: features.iter().map(|feature| feature.to_string()).collect(),
            duration: duration.to_string(),
            created_at: stamp,
            updated_at: stamp,
        };
        state.plans.insert(plan.id, plan.clone());
        plan
    }

    /// Overwrites a catalog entry, simulating out-of-band catalog edits.
    pub async fn replace_plan(&self, mut plan: Plan) -> Plan {
        let mut state = self.inner.lock().await;
        plan.updated_at = state.next_stamp();
        state.plans.insert(plan.id, plan.clone());
        plan
    }

    /// Every record ever created for `user_id`, oldest first.
    pub async fn subscriptions_for_user(&self, user_id: &str) -> Vec<Subscription> {
        let state = self.inner.lock().await;
        let mut records: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }
}

#[async_trait]
impl PlanCatalog for MemoryStore {
    async fn find_plan_by_id(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        Ok(self.inner.lock().await.plans.get(&id).cloned())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let state = self.inner.lock().await;
        let mut plans: Vec<Plan> = state.plans.values().cloned().collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(plans)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find_active_subscription_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self.inner.lock().await.active_for(user_id).cloned())
    }

    async fn find_latest_subscription_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let state = self.inner.lock().await;
        let latest = state
            .subscriptions
            .values()
            .filter(|record| record.user_id == user_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned();
        Ok(latest)
    }

    async fn insert_subscription(
        &self,
        record: NewSubscription,
    ) -> Result<Subscription, StoreError> {
        self.inner.lock().await.insert_active(record)
    }

    async fn update_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
        expected: Option<SubscriptionStatus>,
    ) -> Result<Subscription, StoreError> {
        self.inner.lock().await.set_status(id, status, expected)
    }

    async fn switch_subscription(
        &self,
        current_id: Uuid,
        replacement: NewSubscription,
    ) -> Result<Subscription, StoreError> {
        let mut state = self.inner.lock().await;
        let previous = state
            .subscriptions
            .get(&current_id)
            .cloned()
            .ok_or(StoreError::NotFound(current_id))?;
        state.set_status(
            current_id,
            SubscriptionStatus::Cancelled,
            Some(SubscriptionStatus::Active),
        )?;
        match state.insert_active(replacement) {
            Ok(created) => Ok(created),
            Err(err) => {
                state.subscriptions.insert(previous.id, previous);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(user_id: &str, plan: &Plan) -> NewSubscription {
        NewSubscription::for_plan(user_id, plan, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn second_active_insert_is_rejected() {
        let store = MemoryStore::new();
        let plan = store.add_plan("Basic", 5.0, "1 month", &[]).await;
        store.insert_subscription(new_record("u1", &plan)).await.unwrap();
        let err = store
            .insert_subscription(new_record("u1", &plan))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateActive));
        store.insert_subscription(new_record("u2", &plan)).await.unwrap();
    }

    #[tokio::test]
    async fn guarded_status_write_reports_actual_status() {
        let store = MemoryStore::new();
        let plan = store.add_plan("Basic", 5.0, "1 month", &[]).await;
        let record = store.insert_subscription(new_record("u1", &plan)).await.unwrap();
        store
            .update_subscription_status(
                record.id,
                SubscriptionStatus::Cancelled,
                Some(SubscriptionStatus::Active),
            )
            .await
            .unwrap();
        let err = store
            .update_subscription_status(
                record.id,
                SubscriptionStatus::Expired,
                Some(SubscriptionStatus::Active),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusMismatch {
                actual: SubscriptionStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn terminal_records_never_change_status() {
        let store = MemoryStore::new();
        let plan = store.add_plan("Basic", 5.0, "1 month", &[]).await;
        let record = store.insert_subscription(new_record("u1", &plan)).await.unwrap();
        let cancelled = store
            .update_subscription_status(
                record.id,
                SubscriptionStatus::Cancelled,
                Some(SubscriptionStatus::Active),
            )
            .await
            .unwrap();

        for next in [SubscriptionStatus::Active, SubscriptionStatus::Expired] {
            let err = store
                .update_subscription_status(record.id, next, None)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                StoreError::InvalidTransition {
                    from: SubscriptionStatus::Cancelled,
                    ..
                }
            ));
        }
        let history = store.subscriptions_for_user("u1").await;
        assert_eq!(history, vec![cancelled]);
    }

    #[tokio::test]
    async fn failed_switch_leaves_previous_record_active() {
        let store = MemoryStore::new();
        let plan = store.add_plan("Basic", 5.0, "1 month", &[]).await;
        let current = store.insert_subscription(new_record("u1", &plan)).await.unwrap();
        // A replacement for another user that already holds an ACTIVE record
        // makes the insert half fail after the cancel half has run.
        store.insert_subscription(new_record("u2", &plan)).await.unwrap();
        let err = store
            .switch_subscription(current.id, new_record("u2", &plan))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateActive));
        let active = store.find_active_subscription_by_user("u1").await.unwrap();
        assert_eq!(active, Some(current));
    }

    #[tokio::test]
    async fn latest_prefers_newest_creation() {
        let store = MemoryStore::new();
        let plan = store.add_plan("Basic", 5.0, "1 month", &[]).await;
        let first = store.insert_subscription(new_record("u1", &plan)).await.unwrap();
        let second = store
            .switch_subscription(first.id, new_record("u1", &plan))
            .await
            .unwrap();
        let latest = store.find_latest_subscription_by_user("u1").await.unwrap();
        assert_eq!(latest.map(|record| record.id), Some(second.id));
        assert_eq!(store.subscriptions_for_user("u1").await.len(), 2);
    }
}
