use std::net::TcpListener;
use std::process::ExitCode;

use docshield::config::{LicensingConfig, SidecarConfig};
use docshield::licensing::{generate_keypair, LicenseIssuer, LicenseService, SeatRegistry};
use docshield::rate_limiter::{RateLimitConfig, RateLimiter};
use docshield::state::AppState;

const EXIT_STARTUP_FAILURE: u8 = 1;
const EXIT_PORT_BIND_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let mode = std::env::args().nth(1).unwrap_or_default();
    match mode.as_str() {
        "generate-keys" => generate_keys(),
        "licensing" => run_licensing().await,
        _ => run_sidecar().await,
    }
}

/// One-time setup utility: print a fresh Ed25519 keypair for the
/// licensing server environment.
fn generate_keys() -> ExitCode {
    let (private, public) = generate_keypair();
    println!("PS_ED25519_PRIVATE_KEY_B64={private}");
    println!("PS_ED25519_PUBLIC_KEY_B64={public}");
    ExitCode::SUCCESS
}

async fn run_sidecar() -> ExitCode {
    let config = match SidecarConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("startup failed: {e:#}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    let _log_guard = docshield::logging::init(
        &config.log_format,
        &config.log_level,
        &config.data_dir.join("logs"),
    );
    tracing::info!(version = docshield::commands::VERSION, "docshield sidecar starting");

    // NER/LLM backends register here when their runtimes are present;
    // detection works with any subset.
    let state = AppState::initialize(config, None, None);

    let listener = match TcpListener::bind((state.config.host.as_str(), state.config.port)) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error_type = "port_bind", port = state.config.port, "cannot bind port: {e}");
            return ExitCode::from(EXIT_PORT_BIND_FAILURE);
        }
    };
    let port = listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(state.config.port);

    // The desktop shell reads the port from the first stdout line.
    println!("PORT:{port}");
    tracing::info!(port = port, "sidecar listening; router attaches here");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("signal handler failed: {e}");
    }
    state.shutdown();
    drop(listener);
    tracing::info!("clean shutdown");
    ExitCode::SUCCESS
}

async fn run_licensing() -> ExitCode {
    let config = LicensingConfig::from_env();

    let _log_guard = docshield::logging::init(
        &std::env::var("PS_LOG_FORMAT").unwrap_or_else(|_| "json".into()),
        "info",
        std::path::Path::new("logs"),
    );

    let issuer = match LicenseIssuer::from_config(&config) {
        Ok(issuer) => issuer,
        Err(e) => {
            tracing::error!(error_type = "signing_key", "cannot load signing key: {e}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    let registry = match SeatRegistry::open(&config.database_url) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error_type = "database", "cannot open registry: {e}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    let _limiter = RateLimiter::new(RateLimitConfig {
        max_requests: config.rate_limit_max_requests,
        window_seconds: config.rate_limit_window_secs,
    });
    let service = LicenseService::new(registry, issuer, config);
    tracing::info!(public_key = %service.public_key_b64(), "licensing service ready");

    let port: u16 = std::env::var("PS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8920);
    let listener = match TcpListener::bind(("0.0.0.0", port)) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error_type = "port_bind", port = port, "cannot bind port: {e}");
            return ExitCode::from(EXIT_PORT_BIND_FAILURE);
        }
    };
    tracing::info!(port = port, "licensing listening; router attaches here");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("signal handler failed: {e}");
    }
    drop(listener);
    ExitCode::SUCCESS
}
