use std::collections::HashSet;

use super::helpers::parse_endpoint_to_transport;
use super::types::NodeConfig;
use crate::error::NodeError;

impl NodeConfig {
    /// Validate the config: identities, endpoints, partitions and the
    /// bulkhead levels they run on.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.validate_service_id()?;
        self.validate_bulkhead()?;
        self.validate_clients()?;
        self.validate_endpoints()?;
        Ok(())
    }

    fn validate_service_id(&self) -> Result<(), NodeError> {
        if self.service_id.trim().is_empty() {
            return Err(NodeError::Config("service_id must not be empty".into()));
        }
        Ok(())
    }

    fn validate_bulkhead(&self) -> Result<(), NodeError> {
        if self.scheduler.bulkhead.is_empty() {
            return Err(NodeError::Config(
                "scheduler.bulkhead must define at least one level".into(),
            ));
        }
        let mut seen = HashSet::new();
        for level in &self.scheduler.bulkhead {
            if !seen.insert(level.level) {
                return Err(NodeError::Config(format!(
                    "bulkhead level {} is defined more than once",
                    level.level
                )));
            }
        }
        Ok(())
    }

    /// Client ids are unique, partitions are valid and every partition
    /// priority names a bulkhead level.
    fn validate_clients(&self) -> Result<(), NodeError> {
        let levels = self.scheduler.level_count();
        let mut ids = HashSet::new();
        for client in &self.clients {
            if !ids.insert(client.id.as_str()) {
                return Err(NodeError::Config(format!(
                    "client id '{}' is used more than once",
                    client.id
                )));
            }
            client
                .partition
                .validate()
                .map_err(|e| NodeError::Config(format!("client '{}': {e}", client.id)))?;
            if client.partition.priority >= levels {
                return Err(NodeError::Config(format!(
                    "client '{}' uses priority {} but the bulkhead has {levels} level(s)",
                    client.id, client.partition.priority
                )));
            }
            if client.buffer_limit == 0 {
                return Err(NodeError::Config(format!(
                    "client '{}' buffer_limit must be > 0",
                    client.id
                )));
            }
        }
        Ok(())
    }

    fn validate_endpoints(&self) -> Result<(), NodeError> {
        parse_endpoint_to_transport(&self.cluster.bind)?;
        for peer in &self.cluster.peers {
            parse_endpoint_to_transport(peer)?;
        }
        for client in &self.clients {
            parse_endpoint_to_transport(&client.endpoint)?;
        }
        Ok(())
    }
}
