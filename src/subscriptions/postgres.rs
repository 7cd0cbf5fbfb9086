use async_trait::async_trait;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use super::models::{NewSubscription, Plan, Subscription, SubscriptionStatus};
use super::store::{PlanCatalog, StoreError, SubscriptionStore, ONE_ACTIVE_PER_USER};

/// key: subscription-store-postgres -> sqlx backed catalog and store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// SQLSTATE of `RAISE EXCEPTION`, used by `subscriptions_guard_update`.
const TRIGGER_REJECTED: &str = "P0001";

fn is_trigger_rejection(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(TRIGGER_REJECTED),
        _ => false,
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some(ONE_ACTIVE_PER_USER) {
            return StoreError::DuplicateActive;
        }
    }
    StoreError::Database(err)
}

async fn insert_active<'c, E>(executor: E, record: &NewSubscription) -> Result<Subscription, StoreError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (
            id,
            user_id,
            plan_id,
            start_date,
            end_date,
            status,
            price_at_subscription
        ) VALUES ($1, $2, $3, $4, $5, 'ACTIVE', $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&record.user_id)
    .bind(record.plan_id)
    .bind(record.start_date)
    .bind(record.end_date)
    .bind(record.price_at_subscription)
    .fetch_one(executor)
    .await
    .map_err(map_write_error)
}

async fn current_status<'c, E>(
    executor: E,
    id: Uuid,
) -> Result<Option<SubscriptionStatus>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_scalar("SELECT status FROM subscriptions WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Explains why a guarded write touched no row.
async fn guard_failure<'c, E>(
    executor: E,
    id: Uuid,
    expected: Option<SubscriptionStatus>,
) -> StoreError
where
    E: Executor<'c, Database = Postgres>,
{
    match (current_status(executor, id).await, expected) {
        (Err(err), _) => StoreError::Database(err),
        (Ok(None), _) | (Ok(Some(_)), None) => StoreError::NotFound(id),
        (Ok(Some(actual)), Some(expected)) => StoreError::StatusMismatch {
            id,
            expected,
            actual,
        },
    }
}

#[async_trait]
impl PlanCatalog for PgStore {
    async fn find_plan_by_id(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let plans = sqlx::query_as::<_, Plan>("SELECT * FROM plans ORDER BY created_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(plans)
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn find_active_subscription_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let record = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = $1 AND status = 'ACTIVE'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_latest_subscription_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let record = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn insert_subscription(
        &self,
        record: NewSubscription,
    ) -> Result<Subscription, StoreError> {
        insert_active(&self.pool, &record).await
    }

    async fn update_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
        expected: Option<SubscriptionStatus>,
    ) -> Result<Subscription, StoreError> {
        let result = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET status = $2, updated_at = NOW()
            WHERE id = $1
              AND ($3::subscription_status IS NULL OR status = $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await;

        let updated = match result {
            Ok(updated) => updated,
            Err(err) if is_trigger_rejection(&err) => {
                return Err(match current_status(&self.pool, id).await {
                    Ok(Some(from)) => StoreError::InvalidTransition {
                        id,
                        from,
                        to: status,
                    },
                    Ok(None) => StoreError::NotFound(id),
                    Err(err) => StoreError::Database(err),
                });
            }
            Err(err) => return Err(map_write_error(err)),
        };

        match updated {
            Some(record) => Ok(record),
            None => Err(guard_failure(&self.pool, id, expected).await),
        }
    }

    async fn switch_subscription(
        &self,
        current_id: Uuid,
        replacement: NewSubscription,
    ) -> Result<Subscription, StoreError> {
        let mut tx = self.pool.begin().await?;

        let cancelled: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE subscriptions
            SET status = 'CANCELLED', updated_at = NOW()
            WHERE id = $1 AND status = 'ACTIVE'
            RETURNING id
            "#,
        )
        .bind(current_id)
        .fetch_optional(&mut *tx)
        .await?;

        if cancelled.is_none() {
            let err = guard_failure(&mut *tx, current_id, Some(SubscriptionStatus::Active)).await;
            tx.rollback().await?;
            return Err(err);
        }

        // Dropping `tx` on the error path rolls the cancellation back.
        let created = insert_active(&mut *tx, &replacement).await?;
        tx.commit().await?;
        Ok(created)
    }
}
