//! HTTP route definitions, mounted under the `/0.1` base path.

pub mod analysis;
pub mod datasets;
pub mod results;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::ApiState;

/// Build the application router with all routes and middleware
pub fn create_router(state: ApiState) -> Router {
    let api = Router::new()
        .route("/methods", get(analysis::list_methods))
        .route("/types", get(analysis::list_types))
        .route("/analysis", post(analysis::start_analysis))
        .route("/status/:id", get(results::get_status))
        .route("/result/:id", get(results::get_result))
        .route("/report_status/:id", get(results::get_report_status))
        .route("/data/sources", get(datasets::list_sources))
        .route("/data/examples", get(datasets::list_examples))
        .route("/data/search", get(datasets::search_datasets))
        .route("/data/load/:resource_id", post(datasets::load_dataset))
        .route("/data/status/:loading_id", get(datasets::get_loading_status))
        .route("/data/summary/:dataset_id", get(datasets::get_summary));

    Router::new()
        .nest("/0.1", api)
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
