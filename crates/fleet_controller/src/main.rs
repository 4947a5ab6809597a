//! Fleet controller entry point.
//!
//! Loads configuration, owns the [`ServerRegistry`] for the lifetime of the
//! process, accepts socket backends and tears everything down on SIGINT or
//! SIGTERM.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{anyhow, Context};
use cli::CliArgs;
use config::AppConfig;
use server_fleet::{ServerRegistry, SocketListener, TomlFileStore};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Owns everything that lives as long as the process.
pub struct Application {
    config: AppConfig,
    registry: Arc<ServerRegistry>,
}

impl Application {
    /// Loads and validates configuration, sets up logging, opens the
    /// connection store and builds the registry.
    ///
    /// CLI flags take precedence over the configuration file.
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.listener.bind_address = bind_address;
        }
        if let Some(store_path) = args.store_path {
            config.store.path = store_path.to_string_lossy().to_string();
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

        if let Err(e) = logging::setup_logging(&config.logging) {
            eprintln!("⚠️ Logging already initialized, keeping the existing subscriber: {e}");
        }

        let store = TomlFileStore::open(config.store_path())
            .await
            .with_context(|| format!("opening connection store {}", config.store.path))?;

        info!("🚀 Fleet Controller v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "📂 Config: {} | Store: {}",
            args.config_path.display(),
            store.path().display()
        );

        let registry = Arc::new(ServerRegistry::new(config.to_registry_config()?, Arc::new(store)));

        Ok(Self { config, registry })
    }

    /// Runs until a shutdown signal arrives.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("📋 Configuration Summary:");
        info!("  🔑 RCON host: {}", self.config.rcon.host);
        info!("  ⏱️ Request timeout: {}s", self.config.rcon.request_timeout_secs);
        info!("  🔤 Wire encoding: {:?}", self.config.sync.wire_encoding);

        let connected = self.registry.init().await;
        if connected == 0 && !self.registry.is_any_online().await {
            warn!("⚠️ No servers online yet");
        }

        let listener = if self.config.listener.enabled {
            let listener = Arc::new(SocketListener::new(self.registry.clone(), self.config.bind_address()?));
            let bound = listener.bind()?;
            let handle = {
                let listener = listener.clone();
                tokio::spawn(async move {
                    if let Err(e) = listener.serve(bound).await {
                        error!("❌ Listener error: {}", e);
                    }
                })
            };
            info!("🎮 Accepting socket backends on {}", listener.bind_address());
            Some((listener, handle))
        } else {
            info!("⏸️ Socket listener disabled");
            None
        };

        for status in self.registry.statuses().await {
            info!(
                "  #{} {} [{}] {}",
                status.ordinal.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string()),
                status.name,
                status.kind.map(|k| k.to_string()).unwrap_or_else(|| "never connected".to_string()),
                if status.live { "online" } else { "offline" }
            );
        }

        info!("✅ Fleet Controller is now running");
        info!("🛑 Press Ctrl+C to gracefully shutdown");
        let signal = signals::wait_for_shutdown().await?;

        info!("📡 Received {}, initiating graceful shutdown...", signal);
        if let Some((listener, handle)) = listener {
            listener.shutdown();
            if let Err(e) = handle.await {
                warn!("Listener task ended abnormally: {}", e);
            }
        }

        self.registry.unload_all().await;
        info!("👋 Fleet Controller shutdown complete");
        Ok(())
    }
}

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
            eprintln!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args(dir: &TempDir) -> CliArgs {
        CliArgs {
            config_path: dir.path().join("fleet.toml"),
            bind_address: Some("127.0.0.1:0".to_string()),
            store_path: Some(dir.path().join("servers.toml")),
            log_level: Some("debug".to_string()),
            json_logs: false,
        }
    }

    #[tokio::test]
    async fn test_application_creation_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let app = Application::new(args(&dir)).await.unwrap();

        assert!(dir.path().join("fleet.toml").exists());
        assert_eq!(app.config.listener.bind_address, "127.0.0.1:0");
        assert_eq!(
            PathBuf::from(&app.config.store.path),
            dir.path().join("servers.toml")
        );
        assert!(app.registry.store().servers().await.is_empty());
        assert!(!app.registry.is_any_online().await);
    }

    #[tokio::test]
    async fn test_invalid_override_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut args = args(&dir);
        args.log_level = Some("loud".to_string());

        let error = Application::new(args).await.err().unwrap();
        assert!(error.to_string().contains("Invalid log level"));
    }
}
