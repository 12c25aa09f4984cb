//! HealthSphere Server
//!
//! HTTP front end for disease prediction. Uploaded images are classified by
//! the model provisioning and inference stack in `healthsphere-models`.

pub mod config;
pub mod routes;
pub mod state;

pub use config::{Cli, ServiceConfig};
pub use routes::{create_router, AppError};
pub use state::AppState;
