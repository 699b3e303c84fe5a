use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use base64::Engine;
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use ag_auth::{AuthCircuitBreaker, DeviceAuth, DeviceKeyRegistry};
use ag_domain::config::{Config, ConfigSeverity, CorsConfig};
use ag_sessions::{IdentityContext, IdentityResolver, SessionManager};

use ag_gateway::api;
use ag_gateway::api::inbound::DedupeStore;
use ag_gateway::cli::{Cli, Command, ConfigCommand};
use ag_gateway::nodes::registry::NodeRegistry;
use ag_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = ag_gateway::cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = ag_gateway::cli::load_config()?;
            let valid = ag_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = ag_gateway::cli::load_config()?;
            ag_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("ag-gateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ag_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("gateway starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Device auth ──────────────────────────────────────────────────
    let device_keys = DeviceKeyRegistry::new(config.auth.allow_tofu, config.auth.max_device_keys);
    for known in &config.auth.known_keys {
        match base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(&known.public_key) {
            Ok(bytes) => device_keys.seed(known.node_id.clone(), bytes),
            Err(e) => tracing::warn!(
                node_id = %known.node_id,
                error = %e,
                "skipping known_keys entry: invalid base64url public key"
            ),
        }
    }
    tracing::info!(
        allow_tofu = config.auth.allow_tofu,
        known_keys = config.auth.known_keys.len(),
        "device key registry ready"
    );

    let circuit = AuthCircuitBreaker::new(
        Duration::from_secs(config.auth.circuit_cooldown_secs),
        config.auth.circuit_failure_threshold,
    );

    let device_auth = Arc::new(DeviceAuth::new(
        config.auth.mode,
        config.auth.legacy_token.clone(),
        device_keys,
        circuit,
        config.auth.jwt_max_age_secs,
    ));

    // ── Session management ───────────────────────────────────────────
    let sessions = Arc::new(SessionManager::new(
        config.sessions.session_timeout_secs,
        config.sessions.suspend_timeout_secs,
    ));
    let identity = Arc::new(IdentityResolver::new(IdentityContext::default()));

    // ── Node registry ────────────────────────────────────────────────
    // Every connection's own task removes itself from the registry on
    // disconnect, timeout, or supersession (see nodes::ws::handle_socket),
    // so no separate stale-node sweep is needed.
    let nodes = Arc::new(NodeRegistry::new());

    // ── Inbound dedupe ───────────────────────────────────────────────
    let dedupe = Arc::new(DedupeStore::new(Duration::from_secs(86_400)));

    // ── Legacy bearer token hash ─────────────────────────────────────
    let api_token_hash = config
        .auth
        .legacy_token
        .as_ref()
        .filter(|t| !t.is_empty())
        .map(|t| Sha256::digest(t.as_bytes()).to_vec());
    if api_token_hash.is_none() {
        tracing::warn!("no auth.legacy_token configured — API endpoints are unauthenticated");
    }

    let state = AppState {
        config: config.clone(),
        nodes,
        sessions,
        identity,
        device_auth,
        dedupe,
        api_token_hash,
    };

    // ── Router ───────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);
    let app = api::router(state.clone())
        .layer(cors_layer)
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the CORS layer from configuration. Supports exact origins and
/// wildcard-port patterns like `"http://localhost:*"`, which accepts any
/// port on that host. A literal `"*"` allows all origins (not recommended
/// for production).
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
