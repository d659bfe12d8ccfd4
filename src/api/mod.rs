//! HTTP surface. Which routes exist depends on the service role.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use handlers::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new().route("/health", get(handlers::health_check));

    if state.role.hosts_catalog() {
        app = app
            .route("/items", post(handlers::create_item).get(handlers::list_items))
            .route(
                "/items/:id",
                get(handlers::get_item)
                    .put(handlers::update_item)
                    .delete(handlers::delete_item),
            );
    }
    if state.role.hosts_users() {
        app = app
            .route("/users", post(handlers::create_user).get(handlers::list_users))
            .route("/users/:id", get(handlers::get_user));
    }

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{CatalogService, UserService};
    use crate::store::{InMemoryItemStore, InMemoryUserStore};
    use crate::types::ServiceRole;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state(role: ServiceRole) -> Arc<AppState> {
        Arc::new(AppState {
            role,
            catalog: role
                .hosts_catalog()
                .then(|| CatalogService::new(Arc::new(InMemoryItemStore::new()), None)),
            users: role
                .hosts_users()
                .then(|| UserService::new(Arc::new(InMemoryUserStore::new()))),
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_item_lifecycle() {
        let app = router(state(ServiceRole::Catalog));
        let body = r#"{"country":"Peru","year":1935,"currency":"sol","value":1.0,"price":4.0,"confirmedByUserId":"U1"}"#;

        let (status, created) = send(app.clone(), "POST", "/items", body).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["confirmedByUserId"], "U1");

        let (status, fetched) = send(app.clone(), "GET", &format!("/items/{}", id), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["country"], "Peru");

        let (status, _) = send(app.clone(), "DELETE", &format!("/items/{}", id), "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(app, "GET", &format!("/items/{}", id), "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_routes_follow_role() {
        let app = router(state(ServiceRole::Users));

        let (status, user) = send(app.clone(), "POST", "/users", r#"{"name":"Ann","email":"a@x.io"}"#).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["registeredObjects"], 0);

        let (status, _) = send(app, "GET", "/items", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_reports_role() {
        let (status, health) = send(router(state(ServiceRole::All)), "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["role"], "all");
    }
}
