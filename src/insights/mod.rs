pub mod api;
pub mod predictive_engine;

#[cfg(test)]
mod tests;

pub use predictive_engine::{
    EventCounts, HealthStatus, InsightReport, PredictiveEngine, PredictiveInsight,
    ResponseTimeTrend, SystemHealthInsight,
};
