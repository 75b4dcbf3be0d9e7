//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `bundle` | `Bundle`         |
//! | `config` | `Config`         |

pub mod bundle;
pub mod config;
pub mod serve;

pub use bundle::cmd_bundle;
pub use config::cmd_config;
pub use serve::cmd_serve;
