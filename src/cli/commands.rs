use crate::app::App;
use crate::config::AppConfig;
use crate::demo;
use crate::logging::{init_logging_with_config, LogConfig};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// Command-line interface for the demo application
#[derive(Parser, Debug)]
#[command(name = "zealrouter")]
#[command(about = "zealrouter demo server", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the demo routes
    Serve {
        /// Listen address; overrides `server.host`/`server.port` from the config file
        #[arg(long, env = "ZEAL_ADDR")]
        addr: Option<String>,

        /// YAML configuration file
        #[arg(short, long, env = "ZEAL_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the route table in match-priority order
    Routes {
        /// YAML configuration file
        #[arg(short, long, env = "ZEAL_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn demo_app(config: Option<&PathBuf>) -> anyhow::Result<App> {
    let config = AppConfig::load_or_default(config.map(PathBuf::as_path))?;
    demo::build_app(config).context("registering demo routes")
}

pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { addr, config } => {
            init_logging_with_config(&LogConfig::from_env())?;
            let app = demo_app(config.as_ref())?;
            let addr = addr.unwrap_or_else(|| app.config().server.addr());
            info!(addr = %addr, routes = app.router().len(), "Starting demo server");
            let handle = app.run(addr.as_str())?;
            handle
                .join()
                .map_err(|e| anyhow!("server coroutine panicked: {e:?}"))
        }
        Commands::Routes { config } => {
            let app = demo_app(config.as_ref())?;
            app.router().dump_routes();
            Ok(())
        }
    }
}
