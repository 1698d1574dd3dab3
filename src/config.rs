//! Adaptor configuration
//!
//! Network selection and public-key serialization are per-adaptor settings,
//! never per-request. Configuration can be loaded from JSON or assembled by
//! the CLI from flags.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{GatewayError, GatewayResult};

/// Bitcoin network an adaptor is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
    Signet,
}

impl NetworkKind {
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            NetworkKind::Mainnet => bitcoin::Network::Bitcoin,
            NetworkKind::Testnet => bitcoin::Network::Testnet,
            NetworkKind::Regtest => bitcoin::Network::Regtest,
            NetworkKind::Signet => bitcoin::Network::Signet,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkKind::Mainnet => "mainnet",
            NetworkKind::Testnet => "testnet",
            NetworkKind::Regtest => "regtest",
            NetworkKind::Signet => "signet",
        }
    }
}

impl FromStr for NetworkKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(NetworkKind::Mainnet),
            "testnet" | "test" | "testnet3" => Ok(NetworkKind::Testnet),
            "regtest" => Ok(NetworkKind::Regtest),
            "signet" => Ok(NetworkKind::Signet),
            other => Err(GatewayError::configuration(format!(
                "unknown network '{other}'"
            ))),
        }
    }
}

/// How public keys are serialized into unlocking scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublicKeyFormat {
    #[default]
    Compressed,
    Uncompressed,
}

impl PublicKeyFormat {
    pub fn is_compressed(self) -> bool {
        matches!(self, PublicKeyFormat::Compressed)
    }

    pub fn other(self) -> Self {
        match self {
            PublicKeyFormat::Compressed => PublicKeyFormat::Uncompressed,
            PublicKeyFormat::Uncompressed => PublicKeyFormat::Compressed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PublicKeyFormat::Compressed => "compressed",
            PublicKeyFormat::Uncompressed => "uncompressed",
        }
    }
}

impl FromStr for PublicKeyFormat {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compressed" => Ok(PublicKeyFormat::Compressed),
            "uncompressed" => Ok(PublicKeyFormat::Uncompressed),
            other => Err(GatewayError::configuration(format!(
                "unknown public key format '{other}'"
            ))),
        }
    }
}

/// Full node JSON-RPC endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8332".to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

/// Configuration for one UTXO chain adaptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub network: NetworkKind,
    pub public_key_format: PublicKeyFormat,
    pub allow_script_hash_destinations: bool,
    pub min_confirmations: u64,
    /// Zero disables the transaction cache
    pub cache_capacity: usize,
    pub rpc: Option<RpcConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            network: NetworkKind::Mainnet,
            public_key_format: PublicKeyFormat::Compressed,
            allow_script_hash_destinations: true,
            min_confirmations: 1,
            cache_capacity: 1024,
            rpc: None,
        }
    }
}

impl GatewayConfig {
    pub fn for_network(network: NetworkKind) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn with_public_key_format(mut self, format: PublicKeyFormat) -> Self {
        self.public_key_format = format;
        self
    }

    pub fn with_rpc(mut self, rpc: RpcConfig) -> Self {
        self.rpc = Some(rpc);
        self
    }

    pub fn from_json_str(json: &str) -> GatewayResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GatewayError::configuration(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if let Some(rpc) = &self.rpc {
            if rpc.url.trim().is_empty() {
                return Err(GatewayError::configuration("rpc.url must not be empty"));
            }
            if rpc.timeout_secs == 0 {
                return Err(GatewayError::configuration(
                    "rpc.timeout_secs must be greater than zero",
                ));
            }
            if rpc.username.is_some() != rpc.password.is_some() {
                return Err(GatewayError::configuration(
                    "rpc.username and rpc.password must be set together",
                ));
            }
        }
        Ok(())
    }

    pub fn bitcoin_network(&self) -> bitcoin::Network {
        self.network.to_bitcoin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.network, NetworkKind::Mainnet);
        assert_eq!(config.public_key_format, PublicKeyFormat::Compressed);
        assert_eq!(config.min_confirmations, 1);
        assert!(config.rpc.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = GatewayConfig::from_json_str(
            r#"{"network":"testnet","public_key_format":"uncompressed","rpc":{"url":"http://node:18332"}}"#,
        )
        .unwrap();
        assert_eq!(config.network, NetworkKind::Testnet);
        assert_eq!(config.public_key_format, PublicKeyFormat::Uncompressed);
        assert_eq!(config.bitcoin_network(), bitcoin::Network::Testnet);
        let rpc = config.rpc.unwrap();
        assert_eq!(rpc.url, "http://node:18332");
        assert_eq!(rpc.timeout_secs, 30);
    }

    #[test]
    fn test_validate_rejects_half_credentials() {
        let config = GatewayConfig::default().with_rpc(RpcConfig {
            username: Some("user".to_string()),
            ..RpcConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_network() {
        assert!(GatewayConfig::from_json_str(r#"{"network":"moon"}"#).is_err());
        assert!("moon".parse::<NetworkKind>().is_err());
        assert_eq!("Regtest".parse::<NetworkKind>().unwrap(), NetworkKind::Regtest);
    }
}
