//! Main application entry point for the e-Amuse server
//!
//! Loads configuration, opens the database, registers the game families and
//! serves the XRPC pipeline over HTTP until a shutdown signal arrives.

mod cli;
mod config;
mod http;
mod logging;
mod scheduler;
mod signals;

use anyhow::Context;
use cli::CliArgs;
use config::AppConfig;
use eamuse_data::Database;
use eamuse_protocol::{CompressionRegistry, EamuseProtocol, KeystreamCipher};
use eamuse_server::{GameRegistry, XrpcService};
use http::HttpState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

// ============================================================================
// Application
// ============================================================================

/// Everything the server needs, assembled and validated.
pub struct Application {
    config: AppConfig,
    service: XrpcService,
}

impl Application {
    /// Builds the application from command line arguments.
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = Some(bind_address);
        }
        if let Some(database) = args.database {
            config.database.path = Some(database);
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

        logging::setup_logging(&config.logging)?;
        display_banner();

        let database = Database::open(&config.database).context("opening database")?;
        info!(
            "🗄️ Database: {}",
            config
                .database
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string())
        );

        let registry = Arc::new(GameRegistry::new());
        game_sample::register(&registry);

        let protocol = EamuseProtocol::new(
            CompressionRegistry::default(),
            KeystreamCipher::new(config.crypto.secret.as_bytes()),
        );
        let service = XrpcService::new(protocol, database, registry, config.to_server_config());

        info!("📂 Config: {}", args.config_path.display());
        Ok(Self { config, service })
    }

    /// Serves requests until a shutdown signal arrives.
    pub async fn run(self) -> anyhow::Result<()> {
        let bind_address = self.config.bind_address();
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", bind_address);
        info!("  🔗 Advertised URL: {}", self.service.config().url());
        info!(
            "  💳 PASELI: enabled={} infinite={}",
            self.config.paseli.enabled, self.config.paseli.infinite
        );
        for game in self.service.registry().all_games() {
            info!("  🎮 {} ({} v{})", game.name, game.game, game.version);
        }

        let scheduler_handle = match self.config.scheduler.interval_secs {
            0 => {
                info!("🗓️ Scheduled work disabled");
                None
            }
            secs => Some(scheduler::spawn(
                self.service.clone(),
                Duration::from_secs(secs),
            )),
        };

        let listener = tokio::net::TcpListener::bind(&bind_address)
            .await
            .with_context(|| format!("binding {bind_address}"))?;
        let app = http::router(HttpState {
            service: self.service,
            frontend_port: self.config.server.frontend_port,
        });

        info!("✅ e-Amuse server is now running!");
        info!("🎮 Ready to accept connections on {}", bind_address);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signals::shutdown_signal())
        .await;

        info!("🛑 Shutdown signal received, stopping background work...");
        if let Some(handle) = scheduler_handle {
            handle.abort();
        }
        served.context("serving HTTP")?;

        info!("👋 e-Amuse server shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Utilities and Helpers
// ============================================================================

/// Display startup banner using proper logging
fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║             🎵 E-AMUSE SERVER 🎵          ║");
    info!("║                  v{:<23}║", version);
    info!("║                                          ║");
    info!("║  Arcade network backend                  ║");
    info!("║  XRPC over HTTP                          ║");
    info!("╚══════════════════════════════════════════╝");
}
