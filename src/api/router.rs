//! Dashboard API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the dashboard API router.
pub fn dashboard_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        // Clinician dashboard
        .route("/doctors/:id/alerts", get(endpoints::alerts::pending_for_doctor))
        .route("/doctors/:id/patients", get(endpoints::patients::list_for_doctor))
        .route(
            "/doctors/:id/missed-checkins",
            get(endpoints::patients::missed_checkins),
        )
        .route("/doctors/:id/declining", get(endpoints::patients::declining))
        .route("/alerts/:id/resolve", post(endpoints::alerts::resolve))
        .route("/patients/:id/alerts", get(endpoints::alerts::history_for_patient))
        .route("/patients/:id/sessions", get(endpoints::patients::sessions))
        .route("/patients/:id/schedule", put(endpoints::patients::update_schedule))
        .route("/patients/:id/recompute", post(endpoints::patients::recompute))
        .route("/sessions/:id/messages", get(endpoints::patients::session_messages))
        // Chat transport
        .route("/checkin/message", post(endpoints::checkin::message))
        .route("/checkin/help", post(endpoints::checkin::help))
        .with_state(ctx)
        .layer(axum::middleware::from_fn(middleware::audit::log_access));

    Router::new().nest("/api", api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::EngineConfig;
    use crate::scoring::LexiconScorer;

    fn test_core() -> Arc<CoreState> {
        Arc::new(CoreState::in_memory(Arc::new(LexiconScorer::new()), EngineConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn health_is_mounted_under_api() {
        let app = dashboard_router(test_core());
        let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = dashboard_router(test_core());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_is_405() {
        let app = dashboard_router(test_core());
        let req = Request::builder()
            .method("GET")
            .uri(format!("/api/alerts/{}/resolve", uuid::Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
