pub mod api;
pub mod duration;
pub mod engine;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use api::{
    cancel_subscription, create_subscription, get_subscription, list_plans, update_subscription,
    CreateSubscriptionRequest, SubscriptionEnvelope, UpdateSubscriptionRequest,
};
pub use duration::{DurationError, DurationSpec, DurationUnit};
pub use engine::{SubscriptionEngine, SubscriptionError};
pub use memory::MemoryStore;
pub use models::{NewSubscription, Plan, Subscription, SubscriptionStatus};
pub use postgres::PgStore;
pub use store::{PlanCatalog, StoreError, SubscriptionStore};
