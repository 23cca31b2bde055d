//! HTTP API gateway for Dealroom.
//!
//! Exposes the health check and the v1 API: streaming chat over SSE plus
//! read access to the caller's conversations and the tool catalog.
//!
//! Built on Axum.

pub mod api_v1;
pub mod event_log;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use dealroom_assistant::AssistantService;
use dealroom_config::AppConfig;
use dealroom_core::identity::Principal;
use dealroom_tools::InMemoryDealDirectory;

use api_v1::ErrorResponse;

/// Identity used in development mode when no header names one.
pub const DEV_USER_ID: &str = "dev-user";
pub const DEV_ORGANIZATION_ID: &str = "dev-org";

const USER_HEADER: &str = "x-user-id";
const ORGANIZATION_HEADER: &str = "x-organization-id";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub assistant: AssistantService,
    /// Bearer token → principal. Empty means development mode.
    api_keys: HashMap<String, Principal>,
    allowed_origins: Vec<String>,
}

impl GatewayState {
    pub fn new(assistant: AssistantService, config: &AppConfig) -> Self {
        let api_keys = config
            .gateway
            .api_keys
            .iter()
            .map(|k| {
                (
                    k.token.clone(),
                    Principal::new(&k.user_id, &k.organization_id),
                )
            })
            .collect();
        Self {
            assistant,
            api_keys,
            allowed_origins: config.gateway.allowed_origins.clone(),
        }
    }

    pub fn dev_mode(&self) -> bool {
        self.api_keys.is_empty()
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router.
///
/// Layers applied:
/// - Principal resolution on all /v1 routes
/// - CORS limited to the configured origins
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.allowed_origins);

    let v1 = api_v1::v1_router(state.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(USER_HEADER),
            HeaderName::from_static(ORGANIZATION_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Build the assistant from configuration: provider, store, tool catalog.
///
/// The deal directory is the in-memory demo pipeline, seeded for the
/// development organization and for every organization an API key maps to.
pub async fn build_assistant(
    config: &AppConfig,
) -> Result<AssistantService, Box<dyn std::error::Error + Send + Sync>> {
    let provider = dealroom_providers::from_config(config)?;
    let store = dealroom_store::open(&config.store).await?;

    let mut directory = InMemoryDealDirectory::new()
        .with_demo_data(DEV_ORGANIZATION_ID)
        .await;
    let mut seeded = vec![DEV_ORGANIZATION_ID.to_string()];
    for key in &config.gateway.api_keys {
        if !seeded.contains(&key.organization_id) {
            directory = directory.with_demo_data(&key.organization_id).await;
            seeded.push(key.organization_id.clone());
        }
    }
    let tools = Arc::new(dealroom_tools::default_registry(Arc::new(directory)));

    info!(
        provider = provider.name(),
        store = store.name(),
        tools = tools.len(),
        organizations = seeded.len(),
        "Assistant ready"
    );
    Ok(AssistantService::from_config(config, provider, tools, store))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let assistant = build_assistant(&config).await?;
    event_log::spawn_event_log(assistant.event_bus());
    let state = Arc::new(GatewayState::new(assistant, &config));
    if state.dev_mode() {
        warn!("No gateway.api_keys configured — identity is taken from X-User-Id / X-Organization-Id");
    }

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting with v1 API");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.assistant.provider_name().to_string(),
    })
}

/// Resolve the caller for the /v1 API.
///
/// With API keys configured, requires `Authorization: Bearer <token>` and
/// uses the principal the token maps to. Without, takes the identity from
/// `X-User-Id` / `X-Organization-Id`, falling back to the dev principal.
async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, (StatusCode, Json<ErrorResponse>)> {
    let principal = if state.dev_mode() {
        let header_or = |name: &str, fallback: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        Principal::new(
            header_or(USER_HEADER, DEV_USER_ID),
            header_or(ORGANIZATION_HEADER, DEV_ORGANIZATION_ID),
        )
    } else {
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match token.and_then(|t| state.api_keys.get(t)) {
            Some(principal) => principal.clone(),
            None => {
                warn!("Unauthorized request to /v1 API — missing or invalid bearer token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: "Missing or invalid bearer token".into(),
                    }),
                ));
            }
        }
    };

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use dealroom_assistant::AssistantSettings;
    use dealroom_core::error::ProviderError;
    use dealroom_core::provider::{ModelEventStream, Provider, ProviderRequest};
    use dealroom_store::InMemoryStore;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct OfflineProvider;

    #[async_trait::async_trait]
    impl Provider for OfflineProvider {
        fn name(&self) -> &str {
            "offline"
        }

        async fn stream(&self, _request: ProviderRequest) -> Result<ModelEventStream, ProviderError> {
            Err(ProviderError::NotConfigured("offline".into()))
        }
    }

    fn test_state() -> SharedState {
        let assistant = AssistantService::new(
            Arc::new(OfflineProvider),
            Arc::new(dealroom_core::tool::ToolRegistry::new()),
            Arc::new(InMemoryStore::new()),
            AssistantSettings::default(),
        );
        Arc::new(GatewayState::new(assistant, &AppConfig::default()))
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state());

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["provider"], "offline");
    }

    #[tokio::test]
    async fn health_is_open_even_with_api_keys() {
        let mut config = AppConfig::default();
        config.gateway.api_keys = vec![dealroom_config::ApiKeyConfig {
            token: "t".into(),
            user_id: "u".into(),
            organization_id: "o".into(),
        }];
        let state = Arc::new(GatewayState::new(test_state().assistant.clone(), &config));
        assert!(!state.dev_mode());

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn invalid_cors_origins_are_skipped() {
        // Must not panic on garbage
        let _ = cors_layer(&["https://app.example.com".into(), "not a\norigin".into()]);
    }
}
