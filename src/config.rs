//! Layered configuration for dashbundle.
//!
//! Settings are read from `dashbundle.toml` (optional), then environment
//! variables, then CLI flags. Everything is resolved once at startup into a
//! [`DashbundleConfig`]; request handlers never read the environment.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8888
//! base_url = "/"
//! trust_forwarded_headers = false
//!
//! [bundles]
//! notebook_dir = "."
//! tmp_dir = "/tmp/bundle"
//!
//! [git]
//! backend = "/usr/lib/git-core/git-http-backend"
//! backend_args = []
//! timeout_secs = 300
//! missing_terminator = "reject"
//!
//! [renderer]
//! command = ["jupyter", "nbconvert"]
//! template_dir = "templates"
//!
//! [execution]
//! kernel_service_url = "https://kernels.example.com"
//! tmpnb_mode = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gateway::cgi::MissingTerminatorPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "dashbundle.toml";
pub const DEFAULT_GIT_BACKEND: &str = "/usr/lib/git-core/git-http-backend";

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base path this server is mounted at; always starts and ends with `/`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Permissive CORS for local frontend development.
    #[serde(default)]
    pub dev: bool,
    /// Honour `X-Forwarded-Proto` / `X-Forwarded-Host` from a reverse proxy.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_base_url() -> String {
    "/".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            dev: false,
            trust_forwarded_headers: false,
        }
    }
}

/// `[bundles]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundlesSection {
    /// Root notebooks are resolved against. Defaults to the working directory.
    #[serde(default)]
    pub notebook_dir: Option<PathBuf>,
    /// Where anonymous bundles live until pickup. Defaults to `$TMPDIR/bundle`.
    #[serde(default)]
    pub tmp_dir: Option<PathBuf>,
}

/// `[git]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSection {
    #[serde(default = "default_backend")]
    pub backend: PathBuf,
    /// Arguments placed before the CGI call, e.g. `["http-backend"]` when
    /// `backend = "git"`.
    #[serde(default)]
    pub backend_args: Vec<String>,
    /// Upper bound on a single backend invocation; 0 disables the limit.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub missing_terminator: MissingTerminatorPolicy,
}

fn default_backend() -> PathBuf {
    PathBuf::from(DEFAULT_GIT_BACKEND)
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            backend_args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            missing_terminator: MissingTerminatorPolicy::default(),
        }
    }
}

/// `[renderer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererSection {
    /// Program plus leading arguments of the notebook converter.
    #[serde(default = "default_renderer_command")]
    pub command: Vec<String>,
    /// Directory holding nbconvert templates such as `thebe.tpl` and `local.tpl`.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
}

fn default_renderer_command() -> Vec<String> {
    vec!["jupyter".to_string(), "nbconvert".to_string()]
}

impl Default for RendererSection {
    fn default() -> Self {
        Self {
            command: default_renderer_command(),
            template_dir: None,
        }
    }
}

/// `[execution]` section. Where deployed dashboards send kernel traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Kernel service endpoint. When absent the serving server is used.
    #[serde(default)]
    pub kernel_service_url: Option<String>,
    /// Managed/ephemeral kernel execution (tmpnb).
    #[serde(default)]
    pub tmpnb_mode: bool,
}

impl ExecutionConfig {
    /// Overlay `KERNEL_SERVICE_URL` and `TMPNB_MODE` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(
            std::env::var("KERNEL_SERVICE_URL").ok(),
            std::env::var("TMPNB_MODE").ok(),
        );
    }

    fn apply_vars(&mut self, kernel_service_url: Option<String>, tmpnb_mode: Option<String>) {
        if let Some(url) = kernel_service_url.filter(|u| !u.trim().is_empty()) {
            self.kernel_service_url = Some(url);
        }
        if let Some(mode) = tmpnb_mode {
            self.tmpnb_mode = mode.trim().eq_ignore_ascii_case("true");
        }
    }
}

/// The complete dashbundle.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashbundleToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub bundles: BundlesSection,
    #[serde(default)]
    pub git: GitSection,
    #[serde(default)]
    pub renderer: RendererSection,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl DashbundleToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse dashbundle.toml")
    }

    /// Load from `path` when it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize dashbundle.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Collect human-readable warnings about questionable settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.server.base_url.starts_with('/') {
            warnings.push(format!(
                "server.base_url '{}' should start with '/'",
                self.server.base_url
            ));
        }
        if !self.git.backend.exists() {
            warnings.push(format!(
                "git.backend {} does not exist; clone requests will fail",
                self.git.backend.display()
            ));
        }
        if self.renderer.command.is_empty() {
            warnings.push("renderer.command is empty".to_string());
        }
        if self.git.timeout_secs == 0 {
            warnings.push("git.timeout_secs is 0; backend calls may hang forever".to_string());
        }
        if let Some(url) = &self.execution.kernel_service_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(format!(
                    "execution.kernel_service_url '{}' is not an http(s) URL",
                    url
                ));
            }
        }
        warnings
    }
}

/// CLI overrides applied on top of file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_url: Option<String>,
    pub notebook_dir: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub git_backend: Option<PathBuf>,
    pub dev: bool,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct DashbundleConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub dev: bool,
    pub trust_forwarded_headers: bool,
    pub notebook_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub git: GitSection,
    pub renderer: RendererSection,
    pub execution: ExecutionConfig,
}

impl DashbundleConfig {
    /// Resolve file → env → CLI.
    pub fn resolve(file: DashbundleToml, cli: CliOverrides) -> Result<Self> {
        let mut execution = file.execution;
        execution.apply_env();
        Self::resolve_with_execution(
            file.server,
            file.bundles,
            file.git,
            file.renderer,
            execution,
            cli,
        )
    }

    fn resolve_with_execution(
        server: ServerSection,
        bundles: BundlesSection,
        mut git: GitSection,
        renderer: RendererSection,
        execution: ExecutionConfig,
        cli: CliOverrides,
    ) -> Result<Self> {
        let notebook_dir = match cli.notebook_dir.or(bundles.notebook_dir) {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let tmp_dir = cli
            .tmp_dir
            .or(bundles.tmp_dir)
            .unwrap_or_else(|| std::env::temp_dir().join("bundle"));
        if let Some(backend) = cli.git_backend {
            git.backend = backend;
        }

        Ok(Self {
            host: cli.host.unwrap_or(server.host),
            port: cli.port.unwrap_or(server.port),
            base_url: normalize_base_url(&cli.base_url.unwrap_or(server.base_url)),
            dev: cli.dev || server.dev,
            trust_forwarded_headers: server.trust_forwarded_headers,
            notebook_dir,
            tmp_dir,
            git,
            renderer,
            execution,
        })
    }
}

/// Ensure a base path starts and ends with a single `/`.
pub fn normalize_base_url(base: &str) -> String {
    let trimmed = base.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
