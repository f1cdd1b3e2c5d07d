mod handlers;

pub use handlers::{CompleteResponse, ErrorBody, StepFailureBody, TopicList};

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::orchestrator::Orchestrator;

pub fn create_router(orchestrator: Orchestrator) -> Router {
    let api = Router::new()
        // Generation
        .route("/outline", post(handlers::generate_outline))
        .route("/budget", post(handlers::generate_budget))
        .route("/review", post(handlers::simulate_review))
        .route("/complete", post(handlers::generate_complete))
        // Derived versions
        .route("/refine", post(handlers::refine))
        .route("/adjust-budget", post(handlers::adjust_budget))
        // Topics
        .route("/topics", get(handlers::list_topics))
        .route(
            "/topics/{topic}",
            get(handlers::get_project).delete(handlers::delete_topic),
        )
        .route("/topics/{topic}/summary", get(handlers::topic_summary))
        .route(
            "/topics/{topic}/panel-summary",
            post(handlers::generate_panel_summary),
        )
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(orchestrator)
}
