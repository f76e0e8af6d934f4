//! Secret redaction for credentials in logs, serialization, and display.
//!
//! Use [`Redacted`] to wrap values that must never appear in logs, error messages,
//! or serialized output. [`SecretKey`] is the credential type handed to ledger
//! collaborators; it is validated on construction and never printed.

use std::fmt::{self, Debug, Display};

use crate::error::TransferError;

/// Wrapper that redacts its inner value when formatted or serialized.
///
/// ```ignore
/// use cctp_relay::redact::Redacted;
///
/// let key = "0xac09...";
/// tracing::info!(key = %Redacted(key), "Signing burn");
/// // Logs: key = <redacted>
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        "<redacted>".serialize(serializer)
    }
}

/// A signing credential: `0x` followed by 64 hex characters.
///
/// Both the source (secp256k1) and destination (ed25519) private keys share this
/// textual shape. The key material is only reachable through [`SecretKey::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Redacted<String>);

impl SecretKey {
    /// Validate and wrap a hex private key
    pub fn parse(raw: &str) -> Result<Self, TransferError> {
        if !is_hex_key(raw) {
            return Err(TransferError::InvalidCredential(
                "expected 0x followed by 64 hex characters".to_string(),
            ));
        }
        Ok(SecretKey(Redacted(raw.to_string())))
    }

    /// Wrap a key without validation.
    ///
    /// Used when the caller wants the orchestrator's pre-flight check to report
    /// the format problem instead of failing at construction.
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        SecretKey(Redacted(raw.into()))
    }

    /// Whether the wrapped value has the expected key shape
    pub fn is_well_formed(&self) -> bool {
        is_hex_key(&self.0 .0)
    }

    /// Raw key material, for collaborators that sign transactions
    pub fn expose(&self) -> &str {
        &self.0 .0
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&self.0).finish()
    }
}

fn is_hex_key(raw: &str) -> bool {
    raw.len() == 66
        && raw.starts_with("0x")
        && raw[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_redacted_display_and_debug() {
        let secret = Redacted("hunter2");
        assert_eq!(format!("{}", secret), "<redacted>");
        assert_eq!(format!("{:?}", secret), "<redacted>");
    }

    #[test]
    fn test_redacted_serializes_placeholder() {
        let json = serde_json::to_string(&Redacted("sk-12345")).unwrap();
        assert_eq!(json, "\"<redacted>\"");
    }

    #[test]
    fn test_secret_key_parse() {
        let key = SecretKey::parse(KEY).unwrap();
        assert_eq!(key.expose(), KEY);
        assert!(key.is_well_formed());
    }

    #[test]
    fn test_secret_key_rejects_bad_shapes() {
        assert!(SecretKey::parse("0x1234").is_err());
        assert!(SecretKey::parse(&KEY[2..]).is_err());
        let not_hex = format!("0x{}", "z".repeat(64));
        assert!(SecretKey::parse(&not_hex).is_err());
    }

    #[test]
    fn test_secret_key_debug_hides_material() {
        let key = SecretKey::parse(KEY).unwrap();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("ac0974"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_unchecked_key_reports_shape() {
        assert!(!SecretKey::new_unchecked("0xdead").is_well_formed());
    }
}
