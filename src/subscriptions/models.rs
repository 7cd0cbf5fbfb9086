use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::duration::{self, DurationError};

/// key: subscription-models -> plans,subscriptions,status graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionStatus {
    Active,
    /// Reserved terminal status; no lifecycle operation moves a record here yet.
    Inactive,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Inactive => "INACTIVE",
            SubscriptionStatus::Cancelled => "CANCELLED",
            SubscriptionStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubscriptionStatus::Active)
    }

    /// Only ACTIVE records move, and only into a terminal status.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        matches!(self, SubscriptionStatus::Active) && next.is_terminal()
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub features: Vec<String>,
    pub duration: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: String,
    pub plan_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub price_at_subscription: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// An ACTIVE record whose period ended strictly before `now`.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now > self.end_date
    }
}

/// Insert payload; every new record starts ACTIVE. The store assigns the id
/// and bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub user_id: String,
    pub plan_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub price_at_subscription: f64,
}

impl NewSubscription {
    /// Freezes the plan's price and the derived end date at `start`.
    pub fn for_plan(
        user_id: &str,
        plan: &Plan,
        start: DateTime<Utc>,
    ) -> Result<Self, DurationError> {
        let end_date = duration::apply(start, &plan.duration)?;
        Ok(Self {
            user_id: user_id.to_string(),
            plan_id: plan.id,
            start_date: start,
            end_date,
            price_at_subscription: plan.price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ALL: [SubscriptionStatus; 4] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Inactive,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Expired,
    ];

    #[test]
    fn active_moves_only_into_terminal_statuses() {
        let active = SubscriptionStatus::Active;
        assert!(!active.can_transition_to(SubscriptionStatus::Active));
        assert!(active.can_transition_to(SubscriptionStatus::Inactive));
        assert!(active.can_transition_to(SubscriptionStatus::Cancelled));
        assert!(active.can_transition_to(SubscriptionStatus::Expired));
    }

    #[test]
    fn terminal_statuses_never_move() {
        for from in ALL.into_iter().filter(|status| status.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&SubscriptionStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
        let parsed: SubscriptionStatus = serde_json::from_str("\"EXPIRED\"").unwrap();
        assert_eq!(parsed, SubscriptionStatus::Expired);
    }

    #[test]
    fn new_subscription_snapshots_plan() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).single().unwrap();
        let plan = Plan {
            id: Uuid::new_v4(),
            name: "Pro".into(),
            price: 10.0,
            features: vec!["priority-support".into()],
            duration: "1 month".into(),
            created_at: now,
            updated_at: now,
        };
        let record = NewSubscription::for_plan("u1", &plan, now).unwrap();
        assert_eq!(record.plan_id, plan.id);
        assert_eq!(record.start_date, now);
        assert_eq!(
            record.end_date,
            Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).single().unwrap()
        );
        assert_eq!(record.price_at_subscription, 10.0);
    }

    #[test]
    fn lapsed_requires_active_and_strictly_past_end() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap();
        let mut record = Subscription {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            plan_id: Uuid::new_v4(),
            start_date: start,
            end_date: start + chrono::Duration::days(1),
            status: SubscriptionStatus::Active,
            price_at_subscription: 5.0,
            created_at: start,
            updated_at: start,
        };
        assert!(!record.is_lapsed(record.end_date));
        assert!(record.is_lapsed(record.end_date + chrono::Duration::seconds(1)));
        record.status = SubscriptionStatus::Cancelled;
        assert!(!record.is_lapsed(record.end_date + chrono::Duration::days(30)));
    }
}
