//! Bundle creation workflow.
//!
//! Allocates a bundle id and directory, resolves the servers a deployed
//! bundle will talk to, and hands content generation to a [`Renderer`].
//! The returned [`BundleMetadata`] is everything response builders need.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::Serialize;
use tracing::{info, instrument};

use super::converter::INDEX_PHP;
use super::dir::ensure_directory;
use super::id::BundleIdAllocator;
use super::references;
use crate::config::ExecutionConfig;
use crate::errors::BundleError;
use crate::render::Renderer;

/// Where the inbound request reached this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    pub host: String,
    /// Always starts and ends with `/`.
    pub base_url: String,
}

impl RequestOrigin {
    /// Client-facing URL of this server, including the base path.
    pub fn server_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.base_url)
    }
}

/// Per-call knobs for [`BundleOrchestrator::create_bundle`].
#[derive(Debug, Clone, Default)]
pub struct BundleOptions {
    /// Appended to the bundle directory name, e.g. `.git`.
    pub dir_suffix: Option<String>,
    /// Reuse `<bundle_root>/<notebook>` instead of an anonymous id directory.
    pub bundle_root: Option<PathBuf>,
    /// Remove any existing directory first.
    pub overwrite: bool,
    /// Renderer template name.
    pub template: Option<String>,
}

/// Result of bundle creation.
#[derive(Debug, Clone, Serialize)]
pub struct BundleMetadata {
    pub bundle_id: String,
    pub bundle_dir: PathBuf,
    pub notebook_basename: String,
    pub jupyter_server: String,
    pub kernel_server: String,
    pub tmpnb_mode: bool,
    pub created_at: DateTime<Utc>,
}

/// Creates bundles on disk.
pub struct BundleOrchestrator<R = OsRng> {
    tmp_dir: PathBuf,
    execution: ExecutionConfig,
    allocator: BundleIdAllocator<R>,
    renderer: Arc<dyn Renderer>,
}

impl BundleOrchestrator<OsRng> {
    pub fn new(
        tmp_dir: impl Into<PathBuf>,
        execution: ExecutionConfig,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self::with_allocator(tmp_dir, execution, renderer, BundleIdAllocator::from_os())
    }
}

impl<R: rand::RngCore + rand::CryptoRng> BundleOrchestrator<R> {
    pub fn with_allocator(
        tmp_dir: impl Into<PathBuf>,
        execution: ExecutionConfig,
        renderer: Arc<dyn Renderer>,
        allocator: BundleIdAllocator<R>,
    ) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
            execution,
            allocator,
            renderer,
        }
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Kernel endpoint and execution mode for a bundle served from `jupyter_server`.
    ///
    /// Without a configured kernel service the serving server executes the
    /// bundle itself and managed execution is always off.
    pub fn kernel_endpoint(&self, jupyter_server: &str) -> (String, bool) {
        match &self.execution.kernel_service_url {
            Some(url) => (url.clone(), self.execution.tmpnb_mode),
            None => (jupyter_server.to_string(), false),
        }
    }

    /// Render `notebook_path` into a new (or reused) bundle directory.
    #[instrument(skip_all, fields(notebook = %notebook_path.display()))]
    pub async fn create_bundle(
        &self,
        notebook_path: &Path,
        options: &BundleOptions,
        origin: &RequestOrigin,
    ) -> Result<BundleMetadata, BundleError> {
        let notebook_basename = notebook_basename(notebook_path)?;

        let (bundle_id, mut bundle_dir) = match &options.bundle_root {
            None => {
                let id = self.allocator.allocate().to_string();
                let dir = self.tmp_dir.join(&id).join(&notebook_basename);
                (id, dir)
            }
            Some(root) => (notebook_basename.clone(), root.join(&notebook_basename)),
        };
        if let Some(suffix) = &options.dir_suffix {
            let mut name = bundle_dir.into_os_string();
            name.push(suffix);
            bundle_dir = PathBuf::from(name);
        }

        let jupyter_server = origin.server_url();
        let (kernel_server, tmpnb_mode) = self.kernel_endpoint(&jupyter_server);

        let dir = bundle_dir.clone();
        let overwrite = options.overwrite;
        run_blocking(move || ensure_directory(&dir, overwrite)).await?;

        let markup = self
            .renderer
            .render(notebook_path, options.template.as_deref())
            .await?;

        let nb = notebook_path.to_path_buf();
        let dir = bundle_dir.clone();
        run_blocking(move || {
            let files = references::referenced_files(&nb)?;
            references::copy_list(notebook_dir(&nb), &dir, &files)?;
            // Rendered page replaces any referenced file of the same name.
            let index = dir.join(INDEX_PHP);
            std::fs::write(&index, markup).map_err(|e| BundleError::io(&index, e))
        })
        .await?;

        info!(bundle_id = %bundle_id, dir = %bundle_dir.display(), "bundle created");
        Ok(BundleMetadata {
            bundle_id,
            bundle_dir,
            notebook_basename,
            jupyter_server,
            kernel_server,
            tmpnb_mode,
            created_at: Utc::now(),
        })
    }

    /// Copy a notebook and its referenced files into a fresh anonymous bundle.
    #[instrument(skip_all, fields(notebook = %notebook_path.display()))]
    pub async fn stage_notebook_with_files(
        &self,
        notebook_path: &Path,
        origin: &RequestOrigin,
    ) -> Result<BundleMetadata, BundleError> {
        let notebook_basename = notebook_basename(notebook_path)?;
        let bundle_id = self.allocator.allocate().to_string();
        let bundle_dir = self.tmp_dir.join(&bundle_id).join(&notebook_basename);

        let nb = notebook_path.to_path_buf();
        let dir = bundle_dir.clone();
        run_blocking(move || {
            ensure_directory(&dir, false)?;
            let files = references::referenced_files(&nb)?;
            references::copy_list(notebook_dir(&nb), &dir, &files)?;
            let file_name = nb
                .file_name()
                .ok_or_else(|| BundleError::InvalidNotebookPath(nb.display().to_string()))?;
            let target = dir.join(file_name);
            std::fs::copy(&nb, &target).map_err(|e| BundleError::io(&target, e))?;
            Ok(())
        })
        .await?;

        let jupyter_server = origin.server_url();
        let (kernel_server, tmpnb_mode) = self.kernel_endpoint(&jupyter_server);
        info!(bundle_id = %bundle_id, dir = %bundle_dir.display(), "notebook staged");
        Ok(BundleMetadata {
            bundle_id,
            bundle_dir,
            notebook_basename,
            jupyter_server,
            kernel_server,
            tmpnb_mode,
            created_at: Utc::now(),
        })
    }
}

/// File name without extension.
pub fn notebook_basename(path: &Path) -> Result<String, BundleError> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BundleError::InvalidNotebookPath(path.display().to_string()))
}

fn notebook_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

/// Run filesystem-bound work off the async executor.
pub async fn run_blocking<T, F>(f: F) -> Result<T, BundleError>
where
    F: FnOnce() -> Result<T, BundleError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BundleError::Other(anyhow::anyhow!("blocking task failed: {}", e)))?
}
