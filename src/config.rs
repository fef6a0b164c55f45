//! Startup configuration: subgraph list plus gateway options, loaded from a
//! single YAML file (grounded on the old `apollographql-router` `configuration`
//! crate's typed-config-over-serde_yaml pattern).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubgraphConfig {
    /// Logical identifier used in errors and the ownership/entity maps.
    pub name: String,
    /// Base URL the executor issues HTTP POSTs against.
    pub url: String,
    /// One or more SDL files that concatenate into this subgraph's schema.
    pub sdl_files: Vec<String>,
}

fn default_endpoint_path() -> String {
    "/graphql".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub subgraphs: Vec<SubgraphConfig>,

    #[serde(default)]
    pub listen_port: Option<u16>,

    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub forward_headers: bool,

    #[serde(default)]
    pub tracing_enabled: bool,

    #[serde(default)]
    pub service_name: Option<String>,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port.unwrap_or(4000)
    }

    /// Loads and validates a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: GatewayConfig = serde_yaml::from_str(&raw)
            .map_err(|e| GatewayError::Config(format!("invalid configuration: {e}")))?;
        if config.subgraphs.is_empty() {
            return Err(GatewayError::Config(
                "configuration must declare at least one subgraph".to_string(),
            ));
        }
        for subgraph in &config.subgraphs {
            if subgraph.sdl_files.is_empty() {
                return Err(GatewayError::Config(format!(
                    "subgraph `{}` has no sdl_files",
                    subgraph.name
                )));
            }
        }
        Ok(config)
    }

    /// Reads and concatenates a subgraph's `sdl_files`, relative to `base_dir`
    /// when the paths aren't already absolute.
    pub fn read_subgraph_sdl(
        &self,
        subgraph: &SubgraphConfig,
        base_dir: &Path,
    ) -> Result<String, GatewayError> {
        let mut sdl = String::new();
        for file in &subgraph.sdl_files {
            let path = base_dir.join(file);
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                GatewayError::Config(format!(
                    "failed to read sdl_files entry {} for subgraph `{}`: {e}",
                    path.display(),
                    subgraph.name
                ))
            })?;
            sdl.push_str(&contents);
            sdl.push('\n');
        }
        Ok(sdl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_subgraph_list() {
        let yaml = "subgraphs: []\n";
        let path = std::env::temp_dir().join("federation-gateway-empty-config-test.yaml");
        std::fs::write(&path, yaml).unwrap();
        let err = GatewayConfig::load(&path).expect_err("empty subgraph list should fail");
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn applies_defaults() {
        let yaml = r#"
subgraphs:
  - name: products
    url: http://localhost:4001
    sdl_files: [products.graphql]
"#;
        let path = std::env::temp_dir().join("federation-gateway-defaults-config-test.yaml");
        std::fs::write(&path, yaml).unwrap();
        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.endpoint_path, "/graphql");
        assert_eq!(config.request_timeout_secs, 30);
        assert!(!config.forward_headers);
    }
}
