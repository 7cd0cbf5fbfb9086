use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use axum_prometheus::PrometheusMetricLayer;

use crate::subscriptions::{self, SubscriptionEngine};

async fn root() -> &'static str {
    "Subscription Service API"
}

/// Subscription endpoints. Callers layer an `Extension<Arc<SubscriptionEngine>>`.
pub fn api_routes() -> Router {
    Router::new()
        .route("/api/plans", get(subscriptions::list_plans))
        .route(
            "/api/subscriptions",
            post(subscriptions::create_subscription),
        )
        .route(
            "/api/subscriptions/:user_id",
            get(subscriptions::get_subscription)
                .put(subscriptions::update_subscription)
                .delete(subscriptions::cancel_subscription),
        )
}

/// Full service router with the root banner and Prometheus metrics.
///
/// Installs the global metrics recorder, so call it once per process.
pub fn app(engine: Arc<SubscriptionEngine>) -> Router {
    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    Router::new()
        .route("/", get(root))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes())
        .layer(prometheus_layer)
        .layer(Extension(engine))
}
