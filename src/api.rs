use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::auth::{auth_middleware, ApiKeyValidator};
use crate::config::SocConfig;
use crate::containment::{
    middleware::{ip_block_middleware, GatewayState},
    AccountRegistry, ContainmentEngine, IpBlocklist,
};
use crate::error::{SocError, SocResult};
use crate::forensics::{api::ForensicsState, resolve_signer, ForensicsExporter};
use crate::health::{HealthCheckManager, ServiceStatus};
use crate::insights::PredictiveEngine;
use crate::metrics::create_metrics_router;
use crate::playbooks::{IncidentStore, PlaybookDispatcher};
use crate::rate_limiter::{principal_rate_limit_middleware, rate_limit_middleware, RateLimiter};
use crate::security_log::{EventStore, SecurityLogger};

/// Everything the HTTP surface needs, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub logger: SecurityLogger,
    pub rate_limiter: Arc<RateLimiter>,
    pub blocklist: Arc<IpBlocklist>,
    pub trust_proxy_headers: bool,
    pub dispatcher: Arc<PlaybookDispatcher>,
    pub insights: Arc<PredictiveEngine>,
    pub forensics: ForensicsState,
    pub api_keys: Arc<ApiKeyValidator>,
    pub health: Arc<HealthCheckManager>,
}

impl AppState {
    pub fn build(
        config: &SocConfig,
        store: Arc<dyn EventStore>,
        accounts: Arc<dyn AccountRegistry>,
        incidents: Arc<dyn IncidentStore>,
    ) -> SocResult<Self> {
        let production = config.environment.is_production();

        let logger = SecurityLogger::new(store.clone());
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.window_ms,
            config.rate_limit.max_requests,
        ));
        let blocklist = Arc::new(IpBlocklist::new());

        let engine = Arc::new(ContainmentEngine::new(
            accounts,
            blocklist.clone(),
            logger.clone(),
        ));
        let dispatcher = Arc::new(PlaybookDispatcher::new(
            engine,
            logger.clone(),
            incidents,
            rate_limiter.clone(),
        ));

        let insights = Arc::new(PredictiveEngine::with_window(
            store.clone(),
            config.insights.window_hours,
            config.insights.sample_limit,
        ));

        let signer = resolve_signer(config.forensics.signing_secret.as_deref(), production)?;
        let forensics = ForensicsState {
            exporter: Arc::new(ForensicsExporter::new(store.clone(), signer)),
            logger: logger.clone(),
            default_hours: config.forensics.default_hours,
        };

        let allow_anonymous = !production && config.auth.admin_keys.is_empty();
        if allow_anonymous {
            tracing::warn!("No admin keys configured, SOC endpoints accept anonymous requests");
        }
        let api_keys = ApiKeyValidator::from_entries(
            config.auth.key_secret.clone(),
            &config.auth.admin_keys,
        )
        .map_err(|e| SocError::configuration(format!("Invalid admin keys: {}", e)))?
        .allow_anonymous(allow_anonymous);

        let health = Arc::new(HealthCheckManager::new(
            store,
            rate_limiter.clone(),
            blocklist.clone(),
        ));

        Ok(Self {
            logger,
            rate_limiter,
            blocklist,
            trust_proxy_headers: config.server.trust_proxy_headers,
            dispatcher,
            insights,
            forensics,
            api_keys: Arc::new(api_keys),
            health,
        })
    }
}

/// The SOC routes behind the gateway checks.
///
/// Layer order, outermost first: blocked addresses, per-address rate limit,
/// API key, per-principal rate limit. `/health` and `/metrics` sit outside
/// all of them.
///
/// Client addresses come from the socket peer, so serve the router with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router(state: AppState) -> Router {
    let gateway = GatewayState {
        blocklist: state.blocklist.clone(),
        trust_proxy_headers: state.trust_proxy_headers,
    };

    let soc_routes = Router::new()
        .merge(crate::security_log::api::create_ingest_router(state.logger.clone()))
        .merge(crate::playbooks::api::create_playbook_router(state.dispatcher.clone()))
        .merge(crate::insights::api::create_insights_router(state.insights.clone()))
        .merge(crate::forensics::api::create_forensics_router(state.forensics.clone()))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            principal_rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.api_keys.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(gateway, ip_block_middleware));

    Router::new()
        .route("/health", get(health_check))
        .with_state(state.health.clone())
        .merge(create_metrics_router())
        .merge(soc_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_methods([Method::GET, Method::POST])
                        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                        .allow_origin(Any),
                )
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                )),
        )
}

async fn health_check(State(health): State<Arc<HealthCheckManager>>) -> Response {
    let report = health.check().await;
    let status = match report.status {
        ServiceStatus::Healthy => StatusCode::OK,
        ServiceStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report)).into_response()
}
