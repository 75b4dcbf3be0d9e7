//! Notebook → markup rendering.
//!
//! Rendering is delegated to an external converter (nbconvert by default).
//! Callers only see the [`Renderer`] trait so tests and alternative
//! converters can be swapped in.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::config::RendererSection;
use crate::errors::BundleError;
use crate::gateway::process::{self, ProcessInvocation};

/// Template used when the caller does not ask for one.
pub const DEFAULT_TEMPLATE: &str = "thebe.tpl";

/// Turns a notebook into a page of markup.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, notebook: &Path, template: Option<&str>) -> Result<Vec<u8>, BundleError>;
}

/// Runs `jupyter nbconvert` and captures its stdout.
#[derive(Debug, Clone)]
pub struct NbconvertRenderer {
    command: Vec<String>,
    template_dir: Option<PathBuf>,
}

impl NbconvertRenderer {
    pub fn new(config: &RendererSection) -> Self {
        Self {
            command: config.command.clone(),
            template_dir: config.template_dir.clone(),
        }
    }

    /// Requested template when it exists in the template dir, else the default.
    fn template_for(&self, template: Option<&str>) -> String {
        match (template, &self.template_dir) {
            (Some(name), Some(dir)) if dir.join(name).is_file() => name.to_string(),
            _ => DEFAULT_TEMPLATE.to_string(),
        }
    }

    fn invocation(
        &self,
        notebook: &Path,
        template: Option<&str>,
    ) -> Result<ProcessInvocation, BundleError> {
        let (program, leading) = self
            .command
            .split_first()
            .ok_or_else(|| BundleError::Render("renderer command is empty".to_string()))?;

        let mut invocation = ProcessInvocation::new(program)
            .args(leading.iter())
            .args(["--log-level", "ERROR", "--stdout", "--to", "html"]);
        if let Some(dir) = &self.template_dir {
            invocation = invocation.arg(format!(
                "--TemplateExporter.template_path=[\"{}\"]",
                dir.display()
            ));
        }
        Ok(invocation
            .arg("--template")
            .arg(self.template_for(template))
            .arg(notebook.as_os_str()))
    }
}

#[async_trait]
impl Renderer for NbconvertRenderer {
    async fn render(
        &self,
        notebook: &Path,
        template: Option<&str>,
    ) -> Result<Vec<u8>, BundleError> {
        let invocation = self.invocation(notebook, template)?;
        debug!(notebook = %notebook.display(), args = ?invocation.args, "rendering notebook");
        let result = process::invoke(invocation).await?;
        if !result.stderr.is_empty() {
            return Err(BundleError::Render(format!(
                "converter wrote to stderr: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(result.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn renderer(command: &[&str], template_dir: Option<PathBuf>) -> NbconvertRenderer {
        NbconvertRenderer::new(&RendererSection {
            command: command.iter().map(|s| s.to_string()).collect(),
            template_dir,
        })
    }

    #[test]
    fn test_template_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("local.tpl"), "").unwrap();
        let r = renderer(&["jupyter", "nbconvert"], Some(tmp.path().to_path_buf()));
        assert_eq!(r.template_for(Some("local.tpl")), "local.tpl");
        assert_eq!(r.template_for(Some("missing.tpl")), DEFAULT_TEMPLATE);
        assert_eq!(r.template_for(None), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_invocation_arguments() {
        let r = renderer(&["jupyter", "nbconvert"], None);
        let inv = r.invocation(Path::new("/nb/a.ipynb"), None).unwrap();
        assert_eq!(inv.program, "jupyter");
        let args: Vec<String> = inv
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args.first().map(String::as_str), Some("nbconvert"));
        assert!(args.contains(&"--stdout".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/nb/a.ipynb"));
    }

    #[test]
    fn test_empty_command_is_error() {
        let r = renderer(&[], None);
        assert!(r.invocation(Path::new("a.ipynb"), None).is_err());
    }

    #[tokio::test]
    async fn test_render_captures_stdout() {
        let r = renderer(&["sh", "-c", "printf '<!DOCTYPE html>'", "sh"], None);
        let out = r.render(Path::new("a.ipynb"), None).await.unwrap();
        assert_eq!(out, b"<!DOCTYPE html>");
    }

    #[tokio::test]
    async fn test_render_fails_on_stderr() {
        let r = renderer(&["sh", "-c", "printf html; printf boom >&2", "sh"], None);
        let err = r.render(Path::new("a.ipynb"), None).await.unwrap_err();
        assert!(matches!(err, BundleError::Render(msg) if msg.contains("boom")));
    }
}
