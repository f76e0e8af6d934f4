//! Transfer configuration
//!
//! Defaults describe the Base Sepolia → Aptos testnet deployment. Any field can
//! be overridden through `CCTP_*` environment variables, optionally loaded from
//! a `.env` file first.

use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;

use crate::error::TransferError;
use crate::redact::SecretKey;
use crate::retry::RetryConfig;
use crate::types::DomainId;

/// Main configuration for the transfer pipeline
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceChainConfig,
    #[serde(default)]
    pub destination: DestinationChainConfig,
    #[serde(default)]
    pub attestation: AttestationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Source (burn) chain configuration
#[derive(Clone, Deserialize)]
pub struct SourceChainConfig {
    pub name: String,
    pub chain_id: u64,
    pub domain: DomainId,
    pub rpc_url: String,
    pub decimals: u8,
    pub token_messenger: String,
    pub message_transmitter: String,
    pub usdc: String,
    #[serde(default)]
    pub private_key: Option<String>,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for SourceChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceChainConfig")
            .field("name", &self.name)
            .field("chain_id", &self.chain_id)
            .field("domain", &self.domain)
            .field("rpc_url", &self.rpc_url)
            .field("decimals", &self.decimals)
            .field("token_messenger", &self.token_messenger)
            .field("message_transmitter", &self.message_transmitter)
            .field("usdc", &self.usdc)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for SourceChainConfig {
    fn default() -> Self {
        Self {
            name: "Base Sepolia".to_string(),
            chain_id: 84532,
            domain: DomainId::BASE,
            rpc_url: "https://sepolia.base.org".to_string(),
            decimals: 6,
            token_messenger: "0x9f3B8679c73C2Fef8b59B4f3444d4e156fb70AA5".to_string(),
            message_transmitter: "0x2703483B1a5a7c577e8680de9Df8Be03c6f30e3c".to_string(),
            usdc: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string(),
            private_key: None,
        }
    }
}

impl SourceChainConfig {
    /// Parsed signing credential, if one is configured
    pub fn credential(&self) -> Result<SecretKey, TransferError> {
        let raw = self.private_key.as_deref().ok_or_else(|| {
            TransferError::InvalidCredential("source private key not configured".to_string())
        })?;
        SecretKey::parse(raw)
    }
}

/// Destination (mint) chain configuration
#[derive(Clone, Deserialize)]
pub struct DestinationChainConfig {
    pub name: String,
    pub domain: DomainId,
    pub rpc_url: String,
    pub decimals: u8,
    pub message_transmitter: String,
    pub token_messenger_minter: String,
    pub usdc: String,
    #[serde(default)]
    pub private_key: Option<String>,
    /// Default recipient when a request does not name one
    #[serde(default)]
    pub recipient: Option<String>,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for DestinationChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationChainConfig")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("rpc_url", &self.rpc_url)
            .field("decimals", &self.decimals)
            .field("message_transmitter", &self.message_transmitter)
            .field("token_messenger_minter", &self.token_messenger_minter)
            .field("usdc", &self.usdc)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("recipient", &self.recipient)
            .finish()
    }
}

impl Default for DestinationChainConfig {
    fn default() -> Self {
        Self {
            name: "Aptos Testnet".to_string(),
            domain: DomainId::APTOS,
            rpc_url: "https://fullnode.testnet.aptoslabs.com".to_string(),
            decimals: 6,
            message_transmitter:
                "0x081e86cebf457a0c6004f35bd648a2794698f52e0dde09a48619dcd3d4cc23d9".to_string(),
            token_messenger_minter:
                "0x5f9b937419dda90aa06c1836b7847f65bbbe3f1217567758dc2488be31a477b9".to_string(),
            usdc: "0x69091fbab5f7d635ee7ac5098cf0c1efbe31d68fec0f2cd565e8d168daf52832".to_string(),
            private_key: None,
            recipient: None,
        }
    }
}

impl DestinationChainConfig {
    /// Parsed signing credential, if one is configured
    pub fn credential(&self) -> Result<SecretKey, TransferError> {
        let raw = self.private_key.as_deref().ok_or_else(|| {
            TransferError::InvalidCredential("destination private key not configured".to_string())
        })?;
        SecretKey::parse(raw)
    }
}

/// Attestation authority and poll-loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AttestationConfig {
    #[serde(default = "default_attestation_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            base_url: default_attestation_url(),
            poll_interval_ms: default_poll_interval(),
            max_wait_ms: default_max_wait(),
            max_polls: default_max_polls(),
            request_timeout_ms: default_request_timeout(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl AttestationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Default functions
fn default_attestation_url() -> String {
    "https://iris-api-sandbox.circle.com".to_string()
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_max_wait() -> u64 {
    5 * 60 * 1000
}

fn default_max_polls() -> u32 {
    150
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    fn load_from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CCTP_*` overrides from a key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u64 = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|v| v.parse::<u64>().wrap_err_with(|| format!("{} must be a valid u64", key)))
                .transpose()
        };

        if let Some(v) = lookup("CCTP_SOURCE_RPC_URL") {
            self.source.rpc_url = v;
        }
        if let Some(v) = parse_u64("CCTP_SOURCE_CHAIN_ID")? {
            self.source.chain_id = v;
        }
        if let Some(v) = parse_u64("CCTP_SOURCE_DECIMALS")? {
            self.source.decimals = narrow(v, "CCTP_SOURCE_DECIMALS")?;
        }
        if let Some(v) = lookup("CCTP_SOURCE_TOKEN_MESSENGER") {
            self.source.token_messenger = v;
        }
        if let Some(v) = lookup("CCTP_SOURCE_MESSAGE_TRANSMITTER") {
            self.source.message_transmitter = v;
        }
        if let Some(v) = lookup("CCTP_SOURCE_USDC") {
            self.source.usdc = v;
        }
        if let Some(v) = lookup("CCTP_SOURCE_PRIVATE_KEY") {
            self.source.private_key = Some(v);
        }

        if let Some(v) = lookup("CCTP_DEST_RPC_URL") {
            self.destination.rpc_url = v;
        }
        if let Some(v) = parse_u64("CCTP_DEST_DECIMALS")? {
            self.destination.decimals = narrow(v, "CCTP_DEST_DECIMALS")?;
        }
        if let Some(v) = lookup("CCTP_DEST_PRIVATE_KEY") {
            self.destination.private_key = Some(v);
        }
        if let Some(v) = lookup("CCTP_DEST_RECIPIENT") {
            self.destination.recipient = Some(v);
        }

        if let Some(v) = lookup("CCTP_ATTESTATION_URL") {
            self.attestation.base_url = v;
        }
        if let Some(v) = parse_u64("CCTP_POLL_INTERVAL_MS")? {
            self.attestation.poll_interval_ms = v;
        }
        if let Some(v) = parse_u64("CCTP_MAX_WAIT_MS")? {
            self.attestation.max_wait_ms = v;
        }
        if let Some(v) = parse_u64("CCTP_MAX_POLLS")? {
            self.attestation.max_polls = narrow(v, "CCTP_MAX_POLLS")?;
        }

        if let Some(v) = parse_u64("CCTP_RETRY_ATTEMPTS")? {
            self.retry.max_attempts = narrow(v, "CCTP_RETRY_ATTEMPTS")?;
        }
        if let Some(v) = parse_u64("CCTP_RETRY_BACKOFF_MS")? {
            self.retry.backoff_ms = v;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_url("source.rpc_url", &self.source.rpc_url)?;
        validate_url("destination.rpc_url", &self.destination.rpc_url)?;
        validate_url("attestation.base_url", &self.attestation.base_url)?;

        validate_decimals("source.decimals", self.source.decimals)?;
        validate_decimals("destination.decimals", self.destination.decimals)?;

        if self.source.domain == self.destination.domain {
            return Err(eyre!(
                "source and destination share domain {}",
                self.source.domain
            ));
        }

        if self.attestation.poll_interval_ms == 0 {
            return Err(eyre!("attestation.poll_interval_ms must be greater than 0"));
        }
        if self.attestation.max_wait_ms == 0 {
            return Err(eyre!("attestation.max_wait_ms must be greater than 0"));
        }
        if self.attestation.max_polls == 0 {
            return Err(eyre!("attestation.max_polls must be greater than 0"));
        }
        if self.attestation.cache_capacity == 0 {
            return Err(eyre!("attestation.cache_capacity must be greater than 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(eyre!("retry.max_attempts must be greater than 0"));
        }

        if let Some(ref key) = self.source.private_key {
            if !SecretKey::new_unchecked(key.clone()).is_well_formed() {
                return Err(eyre!(
                    "source.private_key must be 66 chars (0x + 64 hex chars)"
                ));
            }
        }
        if let Some(ref key) = self.destination.private_key {
            if !SecretKey::new_unchecked(key.clone()).is_well_formed() {
                return Err(eyre!(
                    "destination.private_key must be 66 chars (0x + 64 hex chars)"
                ));
            }
        }

        Ok(())
    }
}

fn validate_url(field: &str, raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(eyre!("{} cannot be empty", field));
    }
    url::Url::parse(raw).wrap_err_with(|| format!("{} is not a valid URL: {}", field, raw))?;
    Ok(())
}

fn validate_decimals(field: &str, decimals: u8) -> Result<()> {
    if decimals == 0 || decimals > crate::amount::MAX_DECIMALS {
        return Err(eyre!(
            "{} must be between 1 and {}, got {}",
            field,
            crate::amount::MAX_DECIMALS,
            decimals
        ));
    }
    Ok(())
}

fn narrow<T: TryFrom<u64>>(value: u64, key: &str) -> Result<T> {
    T::try_from(value).map_err(|_| eyre!("{} is out of range: {}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_testnet_deployment() {
        let config = Config::default();
        assert_eq!(config.source.domain, DomainId(6));
        assert_eq!(config.source.chain_id, 84532);
        assert_eq!(config.destination.domain, DomainId(9));
        assert_eq!(config.attestation.base_url, "https://iris-api-sandbox.circle.com");
        assert_eq!(config.attestation.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.attestation.max_wait(), Duration::from_secs(300));
        assert_eq!(config.attestation.max_polls, 150);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                ("CCTP_SOURCE_RPC_URL", "http://localhost:8545"),
                ("CCTP_MAX_POLLS", "10"),
                ("CCTP_POLL_INTERVAL_MS", "500"),
                ("CCTP_DEST_DECIMALS", "8"),
                ("CCTP_SOURCE_PRIVATE_KEY", KEY),
            ]))
            .unwrap();

        assert_eq!(config.source.rpc_url, "http://localhost:8545");
        assert_eq!(config.attestation.max_polls, 10);
        assert_eq!(config.attestation.poll_interval_ms, 500);
        assert_eq!(config.destination.decimals, 8);
        assert_eq!(config.source.credential().unwrap().expose(), KEY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_override_parse_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(lookup_from(&[("CCTP_MAX_POLLS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("CCTP_MAX_POLLS"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.source.rpc_url = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.attestation.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.destination.decimals = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source.decimals = 19;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.attestation.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.destination.private_key = Some("0x1234".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_private_keys() {
        let mut config = Config::default();
        config.source.private_key = Some(KEY.to_string());
        config.destination.private_key = Some(KEY.to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(KEY));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_missing_credential() {
        let config = Config::default();
        assert_eq!(
            config.destination.credential().unwrap_err().code(),
            "INVALID_CREDENTIAL"
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"attestation": {"base_url": "https://iris-api.circle.com", "max_polls": 20}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.attestation.base_url, "https://iris-api.circle.com");
        assert_eq!(config.attestation.max_polls, 20);
        assert_eq!(config.attestation.poll_interval_ms, 2000);
        assert_eq!(config.source.domain, DomainId::BASE);
    }
}
