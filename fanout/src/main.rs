use anyhow::{Context, Result};
use clap::Parser;
use fanout::model::IceServerConfig;
use fanout::server::{AllowAll, SfuConfig, SignalingService, TransportConfig, WebRtcEngine, router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Selective forwarding unit for multi-party audio/video calls.
#[derive(Parser, Debug)]
#[command(name = "fanout", version)]
struct Cli {
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// STUN/TURN server URL. Repeat the flag or pass a comma separated list.
    #[arg(long = "ice-url", env = "ICE_URLS", value_delimiter = ',')]
    ice_urls: Vec<String>,

    #[arg(long, env = "TURN_USERNAME")]
    turn_username: Option<String>,

    #[arg(long, env = "TURN_CREDENTIAL")]
    turn_credential: Option<String>,
}

impl Cli {
    fn transport_config(&self) -> TransportConfig {
        if self.ice_urls.is_empty() {
            return TransportConfig::default();
        }
        TransportConfig {
            ice_servers: vec![IceServerConfig {
                urls: self.ice_urls.clone(),
                username: self.turn_username.clone(),
                credential: self.turn_credential.clone(),
            }],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let engine = WebRtcEngine::new(cli.transport_config())
        .context("Failed to initialize WebRTC engine")?;
    let signaling = SignalingService::new(Arc::new(engine), Arc::new(AllowAll), SfuConfig::default());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(signaling).layer(cors).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.http_port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.bind, cli.http_port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("SFU listening on ws://{}/ws", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
