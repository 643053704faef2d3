pub mod auth;
pub mod error;
pub mod realtime;
pub mod routes;
pub mod state;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use state::SharedState;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// `/health`, `/ws` and the authenticated REST surface under `/api`.
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/babies", post(routes::create_baby).get(routes::list_babies))
        .route(
            "/babies/{baby_id}",
            get(routes::get_baby)
                .put(routes::update_baby)
                .delete(routes::delete_baby),
        )
        .route("/babies/{baby_id}/members", get(routes::list_members))
        .route(
            "/babies/{baby_id}/family-members/{user_id}",
            delete(routes::remove_member),
        )
        .route("/babies/{baby_id}/invites", post(routes::create_invite))
        .route(
            "/babies/{baby_id}/growth",
            get(routes::list_growth).post(routes::upsert_growth),
        )
        .route("/babies/{baby_id}/growth/stats", get(routes::growth_stats))
        .route(
            "/babies/{baby_id}/settings",
            get(routes::get_settings).put(routes::update_settings),
        )
        .route("/babies/{baby_id}/next-feeding", get(routes::next_feeding))
        .route(
            "/babies/{baby_id}/preferences",
            get(routes::get_preference).put(routes::update_preference),
        )
        .route(
            "/babies/{baby_id}/formula",
            get(routes::current_formula).post(routes::select_formula),
        )
        .route(
            "/babies/{baby_id}/weaning-plan",
            get(routes::current_weaning_plan)
                .post(routes::create_weaning_plan)
                .put(routes::update_weaning_plan),
        )
        .route("/invites/redeem", post(routes::redeem_invite))
        .route("/feedings", post(routes::create_feeding).get(routes::list_feedings))
        .route("/feedings/stats", get(routes::feeding_stats))
        .route(
            "/feedings/{feeding_id}",
            put(routes::update_feeding).delete(routes::delete_feeding),
        )
        .route("/standards", post(routes::import_standard))
        .route("/standards/versions", get(routes::standard_versions))
        .route("/standards/{version}/activate", post(routes::activate_standard))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .route("/health", get(routes::health_handler))
        .route("/ws", get(realtime::ws_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use lib_naibao::auth::TokenService;
    use lib_naibao::connections::MemoryStore;
    use lib_naibao::core::{EventPublisher, Hub, HubConfig, SessionConfig};
    use lib_naibao::services::{ServiceContext, Services};
    use lib_naibao::utils::CivilClock;
    use serde_json::{Value, json};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    const SECRET: &[u8] = b"router-test-secret";

    fn test_app() -> (Router, TokenService) {
        let clock = CivilClock::default();
        let (hub, _task) = Hub::spawn(HubConfig::default(), CancellationToken::new());
        let ctx = ServiceContext::new(Arc::new(MemoryStore::new()), clock, EventPublisher::new(hub.clone()));
        let services = Services::new(ctx, HashSet::from([99]));
        let tokens = TokenService::new(SECRET, 1);
        let state = state::AppState::new(services, tokens.clone(), hub, SessionConfig::default(), clock);
        (router(state), tokens)
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn response_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap_or(json!({}))
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let (app, _) = test_app();
        let response = app.oneshot(request(Method::GET, "/health", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_rejects_missing_and_bad_tokens() {
        let (app, _) = test_app();
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/babies", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let other = TokenService::new(b"someone-else", 1).issue(1).unwrap();
        let response = app
            .oneshot(request(Method::GET, "/api/babies", Some(&other), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_feeding_flow_over_http() {
        let (app, tokens) = test_app();
        let owner = tokens.issue(1).unwrap();
        let stranger = tokens.issue(2).unwrap();

        let birth = CivilClock::default().now().date_naive() - chrono::Duration::days(30);
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/babies",
                Some(&owner),
                Some(json!({ "name": "Doudou", "birth_date": birth.to_string() })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let baby_id = response_json(response).await["baby"]["id"].as_u64().unwrap();

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/feedings",
                Some(&owner),
                Some(json!({ "baby_id": baby_id, "amount": 120 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let uri = format!("/api/feedings?baby_id={}", baby_id);
        let response = app
            .clone()
            .oneshot(request(Method::GET, &uri, Some(&owner), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let feedings = response_json(response).await;
        assert_eq!(feedings["feedings"].as_array().map(Vec::len), Some(1));

        let response = app
            .clone()
            .oneshot(request(Method::GET, &uri, Some(&stranger), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(request(Method::GET, "/api/feedings?baby_id=0", Some(&owner), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_baby_management_over_http() {
        let (app, tokens) = test_app();
        let owner = tokens.issue(1).unwrap();
        let stranger = tokens.issue(2).unwrap();

        let birth = CivilClock::default().now().date_naive() - chrono::Duration::days(30);
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/babies",
                Some(&owner),
                Some(json!({ "name": "Doudou", "birth_date": birth.to_string() })),
            ))
            .await
            .unwrap();
        let baby_id = response_json(response).await["baby"]["id"].as_u64().unwrap();
        let baby_uri = format!("/api/babies/{}", baby_id);

        let response = app
            .clone()
            .oneshot(request(
                Method::PUT,
                &baby_uri,
                Some(&owner),
                Some(json!({ "nickname": "Mimi", "current_weight": 4.6 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let baby = response_json(response).await;
        assert_eq!(baby["baby"]["name"], "Mimi");
        assert_eq!(baby["baby"]["current_weight"], 4.6);

        let uri = format!("{}/preferences", baby_uri);
        let response = app
            .clone()
            .oneshot(request(Method::PUT, &uri, Some(&owner), Some(json!({ "default_amount": 110 }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(request(Method::GET, &uri, Some(&owner), None)).await.unwrap();
        assert_eq!(response_json(response).await["preference"]["default_amount"], 110);

        let uri = format!("{}/formula", baby_uri);
        let response = app.clone().oneshot(request(Method::GET, &uri, Some(&owner), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app
            .clone()
            .oneshot(request(Method::POST, &uri, Some(&owner), Some(json!({ "brand_id": 3 }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(request(Method::GET, &uri, Some(&owner), None)).await.unwrap();
        assert_eq!(response_json(response).await["selection"]["brand_id"], 3);

        let uri = format!("{}/weaning-plan", baby_uri);
        let response = app.clone().oneshot(request(Method::GET, &uri, Some(&owner), None)).await.unwrap();
        assert_eq!(response_json(response).await["plan"], Value::Null);
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &uri,
                Some(&owner),
                Some(json!({ "old_brand_id": 3, "new_brand_id": 5 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = app
            .clone()
            .oneshot(request(Method::PUT, &uri, Some(&owner), Some(json!({ "action": "pause" }))))
            .await
            .unwrap();
        assert_eq!(response_json(response).await["plan"]["status"], "paused");

        let uri = format!("{}/family-members/7", baby_uri);
        let response = app.clone().oneshot(request(Method::DELETE, &uri, Some(&stranger), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = app.clone().oneshot(request(Method::DELETE, &uri, Some(&owner), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(request(Method::DELETE, &baby_uri, Some(&owner), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.oneshot(request(Method::GET, &baby_uri, Some(&owner), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ws_handshake_is_checked_before_upgrade() {
        let (app, tokens) = test_app();
        let owner = tokens.issue(1).unwrap();

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/ws?baby_id=1", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let uri = format!("/ws?token={}", owner);
        let response = app.clone().oneshot(request(Method::GET, &uri, None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/ws?token={}&baby_id=404", owner);
        let response = app.oneshot(request(Method::GET, &uri, None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
