use crate::insights::predictive_engine::{InsightReport, PredictiveEngine};
use axum::{extract::State, response::Json, routing::get, Router};
use std::sync::Arc;

pub fn create_insights_router(engine: Arc<PredictiveEngine>) -> Router {
    Router::new()
        .route("/v1/soc/insights", get(get_insights))
        .with_state(engine)
}

async fn get_insights(State(engine): State<Arc<PredictiveEngine>>) -> Json<InsightReport> {
    Json(engine.generate().await)
}
