// routes.rs
use axum::routing::{get, post};
use axum::Router;
use http::header::{HeaderName, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::services::PollService;

pub fn create_routes(service: PollService) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/polls", get(handlers::list_polls).post(handlers::create_poll))
        .route("/polls/{id}", get(handlers::get_poll))
        .route("/polls/{id}/vote", post(handlers::vote))
        .route("/polls/{id}/reconcile", post(handlers::reconcile_poll));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(service)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(handlers::VOTER_ID_HEADER),
        ])
}
