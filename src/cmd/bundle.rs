//! One-shot bundling command: `dashbundle bundle`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use dashbundle::bundle::BundleType;
use dashbundle::bundle::artifact::Artifact;
use dashbundle::bundle::converter::INDEX_HTML;
use dashbundle::bundle::orchestrator::{BundleOrchestrator, RequestOrigin};
use dashbundle::config::{CliOverrides, DashbundleConfig, DashbundleToml};
use dashbundle::render::{NbconvertRenderer, Renderer};

pub async fn cmd_bundle(
    config_path: &Path,
    notebook: &Path,
    bundle_type: &str,
    output: Option<&Path>,
) -> Result<()> {
    if !notebook.is_file() {
        bail!("notebook not found: {}", notebook.display());
    }
    let bundle_type: BundleType = bundle_type.parse()?;
    let notebook = notebook
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", notebook.display()))?;

    let file = DashbundleToml::load_or_default(config_path)?;
    let config = DashbundleConfig::resolve(file, CliOverrides::default())?;
    std::fs::create_dir_all(&config.tmp_dir).with_context(|| {
        format!(
            "Failed to create bundle directory {}",
            config.tmp_dir.display()
        )
    })?;

    let renderer: Arc<dyn Renderer> = Arc::new(NbconvertRenderer::new(&config.renderer));
    let orchestrator =
        BundleOrchestrator::new(config.tmp_dir.clone(), config.execution.clone(), renderer);
    let origin = RequestOrigin {
        scheme: "http".to_string(),
        host: format!("{}:{}", config.host, config.port),
        base_url: config.base_url.clone(),
    };

    let artifact = orchestrator
        .build_artifact(bundle_type, &notebook, &config.notebook_dir, &origin)
        .await?;

    match artifact {
        Artifact::Archive { metadata, path } => {
            let target = output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(format!("{}.zip", metadata.notebook_basename)));
            std::fs::copy(&path, &target).with_context(|| {
                format!("Failed to copy {} to {}", path.display(), target.display())
            })?;
            println!("{}", target.display());
        }
        Artifact::Repository(metadata) => {
            println!("{}", metadata.bundle_dir.display());
        }
        Artifact::Dashboard(metadata) => {
            println!("{}", metadata.bundle_dir.join(INDEX_HTML).display());
        }
    }

    Ok(())
}
