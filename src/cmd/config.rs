//! Configuration view and validation commands: `dashbundle config`.

use std::path::Path;

use anyhow::Result;
use dashbundle::config::{CliOverrides, DashbundleConfig, DashbundleToml};

use super::super::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Dashbundle Configuration");
            println!("========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No config file at {}; using defaults.", config_path.display());
            }
            println!();

            let file = DashbundleToml::load_or_default(config_path)?;
            let config = DashbundleConfig::resolve(file, CliOverrides::default())?;

            println!("[server]");
            println!("  host = \"{}\"", config.host);
            println!("  port = {}", config.port);
            println!("  base_url = \"{}\"", config.base_url);
            println!("  dev = {}", config.dev);
            println!(
                "  trust_forwarded_headers = {}",
                config.trust_forwarded_headers
            );
            println!();
            println!("[bundles]");
            println!("  notebook_dir = \"{}\"", config.notebook_dir.display());
            println!("  tmp_dir = \"{}\"", config.tmp_dir.display());
            println!();
            println!("[git]");
            println!("  backend = \"{}\"", config.git.backend.display());
            if !config.git.backend_args.is_empty() {
                println!("  backend_args = {:?}", config.git.backend_args);
            }
            println!("  timeout_secs = {}", config.git.timeout_secs);
            println!(
                "  missing_terminator = \"{}\"",
                config.git.missing_terminator
            );
            println!();
            println!("[renderer]");
            println!("  command = {:?}", config.renderer.command);
            if let Some(dir) = &config.renderer.template_dir {
                println!("  template_dir = \"{}\"", dir.display());
            }
            println!();

            // Effective values include KERNEL_SERVICE_URL / TMPNB_MODE.
            println!("[execution]");
            match &config.execution.kernel_service_url {
                Some(url) => println!("  kernel_service_url = \"{}\"", url),
                None => println!("  kernel_service_url = (serving server)"),
            }
            println!("  tmpnb_mode = {}", config.execution.tmpnb_mode);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", config_path.display());
                return Ok(());
            }

            let toml = DashbundleToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists.", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            DashbundleToml::default().save(config_path)?;

            println!("Created {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, base_url");
            println!("  - [bundles] notebook_dir, tmp_dir");
            println!("  - [git] backend, timeout_secs, missing_terminator");
            println!();
        }
    }

    Ok(())
}
