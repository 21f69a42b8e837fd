//! Node configuration: one TOML file, `.env` values and `SWITCHYARD_*`
//! environment overrides.

mod helpers;
mod loading;
mod types;
mod validation;

#[cfg(test)]
mod tests;

pub use helpers::parse_endpoint_to_transport;
pub use types::{ClientConfig, ClusterConfig, NodeConfig};
