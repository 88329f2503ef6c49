//! churn-server - HTTP inference service for the customer churn model

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use churn_core::schema::model_columns;
use churn_server::api::{self, AppState};
use churn_server::config::Config;
use churn_server::{load_predictor, logging, predict_file, rate_limit};

#[derive(Parser)]
#[command(name = "churn-server")]
#[command(version)]
#[command(about = "Churn prediction inference server", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, global = true, env = "CHURN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Bind address
        #[arg(long, env = "CHURN_BIND")]
        bind: Option<String>,

        /// Server port
        #[arg(short, long, env = "CHURN_PORT")]
        port: Option<u16>,

        /// Model artifact path
        #[arg(short, long, env = "CHURN_MODEL")]
        model: Option<PathBuf>,

        /// Requests per client per window (0 = disabled)
        #[arg(long, env = "CHURN_RATE_LIMIT")]
        rate_limit: Option<u32>,
    },

    /// Load the model artifact and run the startup checks
    CheckModel {
        /// Model artifact path
        #[arg(short, long, env = "CHURN_MODEL")]
        model: Option<PathBuf>,
    },

    /// Predict a single JSON record offline
    Predict {
        /// JSON file holding one record
        #[arg(short, long)]
        input: PathBuf,

        /// Model artifact path
        #[arg(short, long, env = "CHURN_MODEL")]
        model: Option<PathBuf>,
    },

    /// Generate example configuration file
    ConfigGen {
        /// Output format (yaml, toml)
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            port,
            model,
            rate_limit,
        } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(model) = model {
                config.model.path = model;
            }
            match rate_limit {
                Some(0) => config.rate_limit.enabled = false,
                Some(n) => {
                    config.rate_limit.enabled = true;
                    config.rate_limit.requests = n;
                }
                None => {}
            }
            config.validate()?;
            logging::init(&config.logging)?;
            run_server(config).await?;
        }

        Commands::CheckModel { model } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(model) = model {
                config.model.path = model;
            }
            logging::init(&config.logging)?;
            let predictor = load_predictor(&config.model)?;
            println!("Model OK: {}", config.model.path.display());
            println!("  format:         {}", config.model.format);
            println!("  classes:        {:?}", predictor.classes());
            println!(
                "  positive class: {} (index {})",
                predictor.positive_class(),
                predictor.positive_index()
            );
            println!("  columns:");
            for column in model_columns() {
                println!("    {}", column);
            }
        }

        Commands::Predict { input, model } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(model) = model {
                config.model.path = model;
            }
            logging::init(&config.logging)?;
            let predictor = load_predictor(&config.model)?;
            let result = predict_file(&config, &predictor, &input)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::ConfigGen { format, output } => {
            config_gen(&format, output.as_ref())?;
        }
    }

    Ok(())
}

/// File config when `--config` is given, defaults otherwise
fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::default()),
    }
}

fn config_gen(format: &str, output: Option<&PathBuf>) -> Result<()> {
    let content = match format.to_lowercase().as_str() {
        "yaml" | "yml" => Config::example_yaml()?,
        "toml" => Config::example_toml()?,
        _ => anyhow::bail!("Unsupported format: {}. Use 'yaml' or 'toml'", format),
    };

    if let Some(path) = output {
        std::fs::write(path, &content)?;
        println!("Configuration written to: {}", path.display());
    } else {
        println!("{}", content);
    }
    Ok(())
}

// =============================================================================
// Server Mode
// =============================================================================

async fn run_server(config: Config) -> Result<()> {
    // Load-or-fail: no socket is bound until the model passes its checks
    let predictor = load_predictor(&config.model)?;
    let state = Arc::new(AppState::from_config(predictor, &config));

    if state.limiter.config().enabled {
        info!(
            requests = state.limiter.config().max_requests,
            window_secs = state.limiter.config().window.as_secs(),
            "Rate limiting enabled"
        );
    }
    let cleanup = rate_limit::spawn_cleanup(state.limiter.clone());

    let routes = api::api_routes(state, &config.cors);

    let bind_addr: std::net::IpAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", config.server.bind, e))?;

    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown((bind_addr, config.server.port), shutdown_signal())
        .map_err(|e| anyhow::anyhow!("Failed to bind {}:{}: {}", bind_addr, config.server.port, e))?;

    info!("Server listening on {}", addr);
    server.await;

    if let Some(handle) = cleanup {
        handle.abort();
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
