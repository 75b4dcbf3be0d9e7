//! dashbundle: turns Jupyter notebooks into deployable dashboard bundles
//! and serves finished bundles to git clients over smart HTTP.
//!
//! | Module    | Responsibility                                          |
//! |-----------|---------------------------------------------------------|
//! | `bundle`  | ids, directories, orchestration, artifacts, references  |
//! | `gateway` | git-http-backend behind a CGI bridge                    |
//! | `render`  | notebook → HTML via an external converter               |
//! | `server`  | axum routes and startup                                 |
//! | `config`  | `dashbundle.toml`, env and CLI layering                 |
//! | `errors`  | typed error enums and their HTTP status                 |
//! | `logging` | tracing subscriber setup                                |

pub mod bundle;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod logging;
pub mod render;
pub mod server;
