use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use subscription_service::app;
use subscription_service::subscriptions::{MemoryStore, SubscriptionEngine};
use tower::ServiceExt;

#[tokio::test]
async fn metrics_returns_ok() {
    let store = Arc::new(MemoryStore::new());
    let app = app(Arc::new(SubscriptionEngine::new(store.clone(), store)));
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
