//! Runs the reactor periodic driver: event polling and cron scheduling
//! against Redis. Loads `Settings`, builds the `App`, registers a small set
//! of example handlers, and runs the `PeriodicDriver` until `SIGINT`.

use std::sync::Arc;

use clap::Parser;
use reactor_core::app::App;
use reactor_core::config::Settings;
use reactor_core::driver::PeriodicDriver;
use reactor_core::registry::HandlerRegistry;

#[derive(Parser, Debug)]
#[command(name = "reactor-cli", about = "Event poller and cron scheduler driver")]
struct Cli {
    /// Path to the TOML config file (without extension), resolved relative
    /// to the working directory. Defaults to `reactor` (i.e. `reactor.toml`).
    #[arg(long, default_value = "reactor")]
    config: String,
}

fn example_handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register("notif.digest", |_app, payload| {
        Box::pin(async move {
            let count = payload.as_array().map(|a| a.len()).unwrap_or(1);
            tracing::info!("notif.digest: delivering a combined notification for {count} event(s)");
        })
    });

    registry.register("cron:log_heartbeat", |_app: Arc<App>, _payload| {
        Box::pin(async move {
            tracing::info!("cron:log_heartbeat fired");
        })
    });

    registry
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // REACTOR_CONFIG always wins over the --config flag's default, per §6.
    let config_path = std::env::var("REACTOR_CONFIG").unwrap_or(cli.config);

    let settings = Settings::load(&config_path).unwrap_or_else(|e| {
        eprintln!("failed to load configuration from '{config_path}': {e}");
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.env.default_log_level())),
        )
        .init();

    tracing::info!(env = ?settings.env, "reactor-cli starting");

    let app = match App::configure(settings, example_handlers()).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("failed to configure app: {e}");
            std::process::exit(1);
        }
    };

    let driver = PeriodicDriver::new(app);
    let shutdown = driver.shutdown_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, shutting down");
            shutdown.cancel();
        }
    });

    driver.run().await;
    tracing::info!("reactor-cli stopped");
}
