//! Deployment artifacts added to a rendered bundle.

use std::io::Write;
use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Repository, Signature};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::errors::BundleError;

pub const INDEX_PHP: &str = "index.php";
pub const INDEX_HTML: &str = "index.html";

const KERNEL_URL_PLACEHOLDER: &str = r#"<?php echo $_ENV["KERNEL_SERVICE_URL"] ?>"#;
const TMPNB_MODE_PLACEHOLDER: &str = r#"<?php echo $_ENV["TMPNB_MODE"] ?>"#;

fn manifest(app_name: &str, kernel_server: &str, tmpnb_mode: bool) -> String {
    format!(
        "---\n\
         applications:\n\
         - name: {app_name}\n\
         \x20 memory: 128M\n\
         \x20 env:\n\
         \x20   KERNEL_SERVICE_URL: {kernel_server}\n\
         \x20   TMPNB_MODE: {tmpnb_mode}\n"
    )
}

fn dockerfile(kernel_server: &str, tmpnb_mode: bool) -> String {
    format!(
        "FROM php:5.6-apache\n\
         ENV KERNEL_SERVICE_URL {kernel_server}\n\
         ENV TMPNB_MODE {tmpnb_mode}\n\
         COPY . /var/www/html/\n"
    )
}

/// Write a Cloud Foundry `manifest.yml`.
pub fn add_cf_manifest(
    dir: &Path,
    kernel_server: &str,
    app_name: &str,
    tmpnb_mode: bool,
) -> Result<PathBuf, BundleError> {
    let path = dir.join("manifest.yml");
    std::fs::write(&path, manifest(app_name, kernel_server, tmpnb_mode))
        .map_err(|e| BundleError::io(&path, e))?;
    Ok(path)
}

/// Write a `Dockerfile` serving the bundle from Apache/PHP.
pub fn add_dockerfile(
    dir: &Path,
    kernel_server: &str,
    tmpnb_mode: bool,
) -> Result<PathBuf, BundleError> {
    let path = dir.join("Dockerfile");
    std::fs::write(&path, dockerfile(kernel_server, tmpnb_mode))
        .map_err(|e| BundleError::io(&path, e))?;
    Ok(path)
}

/// Turn `dir` into a git repository with every file committed.
pub fn to_git_repository(dir: &Path) -> Result<String, BundleError> {
    let repo = Repository::init(dir)?;
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let sig = Signature::now("user", "user@localhost")?;
    let commit_id = repo.commit(Some("HEAD"), &sig, &sig, "initial deployment", &tree, &[])?;
    Ok(commit_id.to_string())
}

/// Zip the tree under `dir` into `<dir>.zip`; entries are relative to `dir`.
pub fn to_zip(dir: &Path) -> Result<PathBuf, BundleError> {
    let mut zip_path = dir.as_os_str().to_owned();
    zip_path.push(".zip");
    let zip_path = PathBuf::from(zip_path);

    let file = std::fs::File::create(&zip_path).map_err(|e| BundleError::io(&zip_path, e))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| BundleError::Other(e.into()))?;
        let rel = match entry.path().strip_prefix(dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{}/", name), options)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options)?;
            let data = std::fs::read(entry.path()).map_err(|e| BundleError::io(entry.path(), e))?;
            writer
                .write_all(&data)
                .map_err(|e| BundleError::io(&zip_path, e))?;
        }
    }
    writer.finish()?;
    Ok(zip_path)
}

/// Produce a plain `index.html` from the rendered `index.php`, pointing the
/// page at `kernel_server` with managed execution off.
pub fn localize_index(dir: &Path, kernel_server: &str) -> Result<PathBuf, BundleError> {
    let php_path = dir.join(INDEX_PHP);
    let php = std::fs::read_to_string(&php_path).map_err(|e| BundleError::io(&php_path, e))?;
    let html = php
        .replace(KERNEL_URL_PLACEHOLDER, kernel_server)
        .replace(TMPNB_MODE_PLACEHOLDER, "false");
    let html_path = dir.join(INDEX_HTML);
    std::fs::write(&html_path, html).map_err(|e| BundleError::io(&html_path, e))?;
    Ok(html_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_add_cf_manifest() {
        let tmp = TempDir::new().unwrap();
        let path = add_cf_manifest(tmp.path(), "http://k:8888", "sales", true).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("---\napplications:\n- name: sales\n"));
        assert!(content.contains("  memory: 128M\n"));
        assert!(content.contains("    KERNEL_SERVICE_URL: http://k:8888\n"));
        assert!(content.contains("    TMPNB_MODE: true\n"));
    }

    #[test]
    fn test_add_dockerfile() {
        let tmp = TempDir::new().unwrap();
        let path = add_dockerfile(tmp.path(), "http://k:8888", false).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            content,
            "FROM php:5.6-apache\nENV KERNEL_SERVICE_URL http://k:8888\nENV TMPNB_MODE false\nCOPY . /var/www/html/\n"
        );
    }

    #[test]
    fn test_to_git_repository_commits_everything() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("README"), "test").unwrap();
        std::fs::create_dir(tmp.path().join("static")).unwrap();
        std::fs::write(tmp.path().join("static/main.js"), "//").unwrap();

        let sha = to_git_repository(tmp.path()).unwrap();
        let repo = Repository::open(tmp.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id().to_string(), sha);
        assert_eq!(head.message(), Some("initial deployment"));
        let tree = head.tree().unwrap();
        assert!(tree.get_name("README").is_some());
        assert!(tree.get_path(Path::new("static/main.js")).is_ok());
    }

    #[test]
    fn test_to_zip_contains_relative_entries() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nb");
        std::fs::create_dir_all(dir.join("static")).unwrap();
        std::fs::write(dir.join("index.php"), "<!DOCTYPE html>").unwrap();
        std::fs::write(dir.join("static/app.js"), "x").unwrap();

        let zip_path = to_zip(&dir).unwrap();
        assert_eq!(zip_path, tmp.path().join("nb.zip"));

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"index.php".to_string()));
        assert!(names.contains(&"static/app.js".to_string()));

        let mut content = String::new();
        archive
            .by_name("index.php")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "<!DOCTYPE html>");
    }

    #[test]
    fn test_localize_index_replaces_placeholders() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(INDEX_PHP),
            format!(
                "<script>var url='{}'; var tmp='{}';</script>",
                KERNEL_URL_PLACEHOLDER, TMPNB_MODE_PLACEHOLDER
            ),
        )
        .unwrap();
        let html_path = localize_index(tmp.path(), "http://localhost:8888/").unwrap();
        let html = std::fs::read_to_string(html_path).unwrap();
        assert_eq!(
            html,
            "<script>var url='http://localhost:8888/'; var tmp='false';</script>"
        );
    }

    #[test]
    fn test_localize_index_missing_php() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            localize_index(tmp.path(), "x"),
            Err(BundleError::Io { .. })
        ));
    }
}
