//! Per-type finishing of a rendered bundle.

use std::path::{Path, PathBuf};

use rand::{CryptoRng, RngCore};
use tracing::instrument;

use super::BundleType;
use super::converter;
use super::orchestrator::{
    BundleMetadata, BundleOptions, BundleOrchestrator, RequestOrigin, run_blocking,
};
use crate::errors::BundleError;

/// Directory under the notebook root holding locally served dashboards.
pub const LOCAL_DASHBOARDS: &str = "local_dashboards";

/// Template used for locally served dashboards.
pub const LOCAL_TEMPLATE: &str = "local.tpl";

/// What a finished bundle request left on disk.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Committed git repository at `metadata.bundle_dir`.
    Repository(BundleMetadata),
    /// Zip archive at `path`.
    Archive {
        metadata: BundleMetadata,
        path: PathBuf,
    },
    /// Dashboard with a localized `index.html` under the notebook root.
    Dashboard(BundleMetadata),
}

impl Artifact {
    pub fn metadata(&self) -> &BundleMetadata {
        match self {
            Artifact::Repository(md) | Artifact::Dashboard(md) => md,
            Artifact::Archive { metadata, .. } => metadata,
        }
    }
}

impl<R: RngCore + CryptoRng> BundleOrchestrator<R> {
    /// Create a bundle of `bundle_type` and finish it into its artifact.
    ///
    /// Dashboards are written under `<notebook_root>/local_dashboards`.
    #[instrument(skip_all, fields(bundle_type = %bundle_type))]
    pub async fn build_artifact(
        &self,
        bundle_type: BundleType,
        notebook_path: &Path,
        notebook_root: &Path,
        origin: &RequestOrigin,
    ) -> Result<Artifact, BundleError> {
        match bundle_type {
            BundleType::Bluemix => {
                let options = BundleOptions {
                    dir_suffix: Some(".git".into()),
                    ..Default::default()
                };
                let md = self.create_bundle(notebook_path, &options, origin).await?;
                let (dir, kernel, name, tmpnb) = finishing_inputs(&md);
                run_blocking(move || {
                    converter::add_cf_manifest(&dir, &kernel, &name, tmpnb)?;
                    converter::to_git_repository(&dir)?;
                    Ok(())
                })
                .await?;
                Ok(Artifact::Repository(md))
            }
            BundleType::Zip => {
                let md = self
                    .create_bundle(notebook_path, &BundleOptions::default(), origin)
                    .await?;
                let (dir, kernel, name, tmpnb) = finishing_inputs(&md);
                let path = run_blocking(move || {
                    converter::add_cf_manifest(&dir, &kernel, &name, tmpnb)?;
                    converter::add_dockerfile(&dir, &kernel, tmpnb)?;
                    converter::to_zip(&dir)
                })
                .await?;
                Ok(Artifact::Archive { metadata: md, path })
            }
            BundleType::Dashboard => {
                let options = BundleOptions {
                    bundle_root: Some(notebook_root.join(LOCAL_DASHBOARDS)),
                    overwrite: true,
                    template: Some(LOCAL_TEMPLATE.into()),
                    ..Default::default()
                };
                let md = self.create_bundle(notebook_path, &options, origin).await?;
                let (dir, server) = (md.bundle_dir.clone(), md.jupyter_server.clone());
                run_blocking(move || converter::localize_index(&dir, &server)).await?;
                Ok(Artifact::Dashboard(md))
            }
            BundleType::Ipynb => {
                let md = self.stage_notebook_with_files(notebook_path, origin).await?;
                let dir = md.bundle_dir.clone();
                let path = run_blocking(move || converter::to_zip(&dir)).await?;
                Ok(Artifact::Archive { metadata: md, path })
            }
        }
    }
}

fn finishing_inputs(md: &BundleMetadata) -> (PathBuf, String, String, bool) {
    (
        md.bundle_dir.clone(),
        md.kernel_server.clone(),
        md.notebook_basename.clone(),
        md.tmpnb_mode,
    )
}
