use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;

use super::{Plan, Subscription, SubscriptionEngine};

/// key: subscription-api -> rest endpoints
pub async fn list_plans(
    Extension(engine): Extension<Arc<SubscriptionEngine>>,
    _user: AuthUser,
) -> AppResult<Json<Vec<Plan>>> {
    let plans = engine.list_plans().await?;
    Ok(Json(plans))
}

pub async fn create_subscription(
    Extension(engine): Extension<Arc<SubscriptionEngine>>,
    AuthUser { user_id }: AuthUser,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> AppResult<(StatusCode, Json<Subscription>)> {
    let plan_id = parse_plan_id("planId", payload.plan_id.as_ref())?;
    let subscription = engine
        .create_subscription(&user_id, plan_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn get_subscription(
    Extension(engine): Extension<Arc<SubscriptionEngine>>,
    AuthUser { user_id }: AuthUser,
    Path(target): Path<String>,
) -> AppResult<Json<SubscriptionEnvelope>> {
    let user_id = ensure_owner(&user_id, &target, "retrieve")?;
    let subscription = engine.get_subscription(user_id, Utc::now()).await?;
    let plan = engine.find_plan(subscription.plan_id).await?;
    Ok(Json(SubscriptionEnvelope { subscription, plan }))
}

pub async fn update_subscription(
    Extension(engine): Extension<Arc<SubscriptionEngine>>,
    AuthUser { user_id }: AuthUser,
    Path(target): Path<String>,
    Json(payload): Json<UpdateSubscriptionRequest>,
) -> AppResult<Json<Subscription>> {
    let user_id = ensure_owner(&user_id, &target, "update")?;
    let new_plan_id = parse_plan_id("newPlanId", payload.new_plan_id.as_ref())?;
    let subscription = engine
        .update_subscription(user_id, new_plan_id, Utc::now())
        .await?;
    Ok(Json(subscription))
}

pub async fn cancel_subscription(
    Extension(engine): Extension<Arc<SubscriptionEngine>>,
    AuthUser { user_id }: AuthUser,
    Path(target): Path<String>,
) -> AppResult<Json<Subscription>> {
    let user_id = ensure_owner(&user_id, &target, "cancel")?;
    let subscription = engine.cancel_subscription(user_id).await?;
    Ok(Json(subscription))
}

fn ensure_owner<'a>(caller: &str, target: &'a str, action: &str) -> AppResult<&'a str> {
    if target.trim().is_empty() {
        return Err(AppError::BadRequest("userId is required".into()));
    }
    if caller != target {
        tracing::warn!(
            %caller,
            %target,
            action,
            "rejected access to another user's subscription"
        );
        return Err(AppError::Forbidden);
    }
    Ok(target)
}

/// Plan ids arrive as raw JSON so a wrongly typed value is a 400, not a
/// body rejection.
fn parse_plan_id(field: &str, raw: Option<&Value>) -> AppResult<Uuid> {
    let raw = match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.trim()).filter(|value| !value.is_empty()),
        Some(_) => return Err(AppError::BadRequest(format!("{field} is invalid"))),
    }
    .ok_or_else(|| AppError::BadRequest(format!("{field} is required")))?;
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("{field} is invalid")))
}

#[derive(Debug, Serialize)]
pub struct SubscriptionEnvelope {
    pub subscription: Subscription,
    pub plan: Option<Plan>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    #[serde(default)]
    pub plan_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubscriptionRequest {
    #[serde(default)]
    pub new_plan_id: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_id_must_be_present_and_a_uuid() {
        assert!(matches!(
            parse_plan_id("planId", None),
            Err(AppError::BadRequest(message)) if message == "planId is required"
        ));
        assert!(matches!(
            parse_plan_id("planId", Some(&Value::Null)),
            Err(AppError::BadRequest(message)) if message == "planId is required"
        ));
        assert!(matches!(
            parse_plan_id("planId", Some(&Value::from("  "))),
            Err(AppError::BadRequest(message)) if message == "planId is required"
        ));
        assert!(matches!(
            parse_plan_id("newPlanId", Some(&Value::from("not-a-uuid"))),
            Err(AppError::BadRequest(message)) if message == "newPlanId is invalid"
        ));
        assert!(matches!(
            parse_plan_id("planId", Some(&Value::from(42))),
            Err(AppError::BadRequest(message)) if message == "planId is invalid"
        ));
        let id = Uuid::new_v4();
        assert_eq!(
            parse_plan_id("planId", Some(&Value::from(id.to_string()))).unwrap(),
            id
        );
    }

    #[test]
    fn callers_only_reach_their_own_records() {
        assert_eq!(ensure_owner("u1", "u1", "retrieve").unwrap(), "u1");
        assert!(matches!(
            ensure_owner("u1", "u2", "cancel"),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            ensure_owner("u1", " ", "update"),
            Err(AppError::BadRequest(_))
        ));
    }
}
