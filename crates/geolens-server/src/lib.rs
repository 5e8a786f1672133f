//! GeoLens Server
//!
//! HTTP front end for the identification engine, plus the `geolens`
//! command-line tool.

pub mod cli;
pub mod routes;
pub mod state;

pub use routes::{create_router, DEFAULT_BODY_LIMIT};
pub use state::AppState;
