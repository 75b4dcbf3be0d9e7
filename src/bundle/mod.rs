//! Notebook bundles.
//!
//! | Module         | Responsibility                                          |
//! |----------------|---------------------------------------------------------|
//! | `id`           | `BundleId`, `BundleIdAllocator` (explicit CSPRNG)       |
//! | `dir`          | `ensure_directory` with overwrite and bounded retry     |
//! | `orchestrator` | `BundleOrchestrator::create_bundle` → `BundleMetadata`  |
//! | `artifact`     | per-type finishing: git repo, zip, local dashboard      |
//! | `converter`    | manifest.yml, Dockerfile, git repo, zip, local index    |
//! | `references`   | files a notebook declares, glob expansion, copying      |
//!
//! A bundle's directory is its only durable state; nothing keeps an
//! in-memory registry of bundles.

pub mod artifact;
pub mod converter;
pub mod dir;
pub mod id;
pub mod orchestrator;
pub mod references;

use std::str::FromStr;

use crate::errors::BundleError;

/// Kind of artifact a bundle request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleType {
    /// Git repository + redirect to the Bluemix deploy flow.
    Bluemix,
    /// Zipped application with manifest and Dockerfile.
    Zip,
    /// Locally served dashboard.
    Dashboard,
    /// Zip of the notebook and its referenced files.
    Ipynb,
}

impl FromStr for BundleType {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bluemix" => Ok(BundleType::Bluemix),
            "zip" => Ok(BundleType::Zip),
            "dashboard" => Ok(BundleType::Dashboard),
            "ipynb" => Ok(BundleType::Ipynb),
            _ => Err(BundleError::UnknownBundleType),
        }
    }
}

impl std::fmt::Display for BundleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleType::Bluemix => write!(f, "bluemix"),
            BundleType::Zip => write!(f, "zip"),
            BundleType::Dashboard => write!(f, "dashboard"),
            BundleType::Ipynb => write!(f, "ipynb"),
        }
    }
}
