//! HTTP front end.
//!
//! | Route                                 | Handler                         |
//! |---------------------------------------|---------------------------------|
//! | `GET /bundle?notebook=..&type=..`     | create a bundle of that type    |
//! | `GET\|POST /bundle/{id}/{*path}`      | git smart HTTP via the gateway  |
//! | `GET /health`                         | liveness                        |
//!
//! All routes are nested under the configured base URL.

pub mod api;
#[allow(clippy::module_inception)]
pub mod server;

pub use api::AppState;
pub use server::{build_router, start_server};
