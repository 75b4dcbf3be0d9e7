//! HTTP server command: `dashbundle serve`.

use std::path::Path;

use anyhow::Result;
use dashbundle::config::{CliOverrides, DashbundleConfig, DashbundleToml};

pub async fn cmd_serve(config_path: &Path, overrides: CliOverrides) -> Result<()> {
    let file = DashbundleToml::load_or_default(config_path)?;
    for warning in file.validate() {
        tracing::warn!("{}", warning);
    }
    let config = DashbundleConfig::resolve(file, overrides)?;
    dashbundle::server::start_server(config).await
}
