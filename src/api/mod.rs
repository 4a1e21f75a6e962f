use crate::jobs::{JobContext, ReportRegistry};
use axum::Router;
use axum::routing::get;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<RwLock<ReportRegistry>>,
    pub context: Arc<JobContext>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/trigger_report",
            get(handlers::trigger_report).post(handlers::trigger_report),
        )
        .route("/get_report/{report_id}", get(handlers::get_report))
        .route("/api/health", get(handlers::get_health))
        .with_state(state)
}
