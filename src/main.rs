use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dashbundle::config::DEFAULT_CONFIG_FILE;
use dashbundle::logging::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "dashbundle")]
#[command(version, about = "Notebook dashboard bundler with a git smart-HTTP endpoint")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the bundle and git endpoints over HTTP
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Base path the server is mounted at
        #[arg(long)]
        base_url: Option<String>,

        /// Root directory notebooks are resolved against
        #[arg(long)]
        notebook_dir: Option<PathBuf>,

        /// Directory holding anonymous bundles
        #[arg(long)]
        tmp_dir: Option<PathBuf>,

        /// Path to git-http-backend
        #[arg(long)]
        git_backend: Option<PathBuf>,

        /// Enable dev mode (permissive CORS)
        #[arg(long)]
        dev: bool,
    },
    /// Bundle a notebook from the command line
    Bundle {
        /// Notebook to bundle
        notebook: PathBuf,

        /// Bundle type: zip, bluemix, dashboard, ipynb
        #[arg(short = 't', long = "type", default_value = "zip")]
        bundle_type: String,

        /// Where to copy a zip artifact (defaults to ./<name>.zip)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default dashbundle.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // A missing .env is the common case.
    let _ = dotenvy::dotenv();
    logging::init(cli.log_format, cli.verbose);

    match &cli.command {
        Commands::Serve {
            host,
            port,
            base_url,
            notebook_dir,
            tmp_dir,
            git_backend,
            dev,
        } => {
            let overrides = dashbundle::config::CliOverrides {
                host: host.clone(),
                port: *port,
                base_url: base_url.clone(),
                notebook_dir: notebook_dir.clone(),
                tmp_dir: tmp_dir.clone(),
                git_backend: git_backend.clone(),
                dev: *dev,
            };
            cmd::cmd_serve(&cli.config, overrides).await?;
        }
        Commands::Bundle {
            notebook,
            bundle_type,
            output,
        } => {
            cmd::cmd_bundle(&cli.config, notebook, bundle_type, output.as_deref()).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli.config, command.clone())?,
    }

    Ok(())
}
