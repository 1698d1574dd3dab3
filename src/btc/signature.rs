//! Translation of raw signer output into wire signatures and keys
//!
//! Signers return 64-byte compact `(r, s)` signatures, optionally followed by
//! a recovery byte which is ignored. Public keys are re-serialized in the
//! form the adaptor is configured for rather than the form they arrive in.

use bitcoin::secp256k1::{self, ecdsa::Signature as CompactSignature};
use bitcoin::{ecdsa, PublicKey, Script};

use crate::btc::script::SpendKind;
use crate::config::PublicKeyFormat;
use crate::errors::SignatureError;

pub const COMPACT_SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct SignatureAdapter {
    format: PublicKeyFormat,
}

impl SignatureAdapter {
    pub fn new(format: PublicKeyFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> PublicKeyFormat {
        self.format
    }

    pub fn check_length(index: usize, raw: &[u8]) -> Result<(), SignatureError> {
        if raw.len() < COMPACT_SIGNATURE_LEN {
            return Err(SignatureError::TooShort {
                index,
                len: raw.len(),
            });
        }
        Ok(())
    }

    /// DER-encoded, low-S signature with SIGHASH_ALL appended
    pub fn encode_signature(
        &self,
        index: usize,
        raw: &[u8],
    ) -> Result<ecdsa::Signature, SignatureError> {
        Self::check_length(index, raw)?;
        let mut signature = CompactSignature::from_compact(&raw[..COMPACT_SIGNATURE_LEN])
            .map_err(|e| SignatureError::InvalidEncoding {
                index,
                reason: e.to_string(),
            })?;
        signature.normalize_s();
        Ok(ecdsa::Signature::sighash_all(signature))
    }

    /// Parse a key in either form and apply the configured serialization
    pub fn encode_public_key(&self, index: usize, raw: &[u8]) -> Result<PublicKey, SignatureError> {
        let inner = secp256k1::PublicKey::from_slice(raw).map_err(|e| {
            SignatureError::InvalidPublicKey {
                index,
                reason: e.to_string(),
            }
        })?;
        Ok(self.with_format(inner, self.format))
    }

    fn with_format(&self, inner: secp256k1::PublicKey, format: PublicKeyFormat) -> PublicKey {
        match format {
            PublicKeyFormat::Compressed => PublicKey::new(inner),
            PublicKeyFormat::Uncompressed => PublicKey::new_uncompressed(inner),
        }
    }

    /// Require `key` to hash to the owner script of input `index`
    ///
    /// When the key only matches in the other serialization, the error says so.
    pub fn check_owner(
        &self,
        index: usize,
        kind: SpendKind,
        key: &PublicKey,
        owner: &str,
        owner_script: &Script,
    ) -> Result<(), SignatureError> {
        let expected = match kind.script_for_key(key) {
            Some(script) => script,
            None => return Ok(()),
        };
        if expected.as_script() == owner_script {
            return Ok(());
        }

        let other = self.format.other();
        let hint = match kind.script_for_key(&self.with_format(key.inner, other)) {
            Some(script) if script.as_script() == owner_script => format!(
                " (it matches the {} form, adaptor is configured for {})",
                other.as_str(),
                self.format.as_str()
            ),
            _ => String::new(),
        };
        Err(SignatureError::PublicKeyMismatch {
            index,
            owner: owner.to_string(),
            hint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::ScriptBuf;

    const UNCOMPRESSED_KEY: &str = "043cd360fecac46da64c411c6b471d8e147504ed74c2cafd9a29329c63c4eaf1603fb5a230c1ba28d93bb6834989869259d4a4156d33fd5f99075e4b968cdbe8b8";

    fn owner_script() -> ScriptBuf {
        ScriptBuf::from_hex("76a91419064bda7eb5049f922a4bca4c24808c6aea948d88ac").unwrap()
    }

    #[test]
    fn test_short_signature_rejected() {
        let adapter = SignatureAdapter::new(PublicKeyFormat::Compressed);
        let err = adapter.encode_signature(2, &[0u8; 63]).unwrap_err();
        assert!(matches!(err, SignatureError::TooShort { index: 2, len: 63 }));
    }

    #[test]
    fn test_signature_gets_sighash_all_suffix() {
        let compact = hex::decode(
            "486972701a1f11d72c575e0fec145c957c21a89df58a2c5878a4f62253eedaa165e13ca5d689c8b1c86bbcc5d30f05340948cc12c5e17c55cc434fca6f495ba1",
        )
        .unwrap();
        let adapter = SignatureAdapter::new(PublicKeyFormat::Uncompressed);
        let encoded = adapter.encode_signature(0, &compact).unwrap();
        assert_eq!(
            hex::encode(encoded.to_vec()),
            "30440220486972701a1f11d72c575e0fec145c957c21a89df58a2c5878a4f62253eedaa1022065e13ca5d689c8b1c86bbcc5d30f05340948cc12c5e17c55cc434fca6f495ba101"
        );

        let mut with_recovery = compact.clone();
        with_recovery.push(1);
        assert_eq!(adapter.encode_signature(0, &with_recovery).unwrap(), encoded);
    }

    #[test]
    fn test_public_key_format_is_configured() {
        let raw = hex::decode(UNCOMPRESSED_KEY).unwrap();
        let compressed = SignatureAdapter::new(PublicKeyFormat::Compressed)
            .encode_public_key(0, &raw)
            .unwrap();
        assert_eq!(compressed.to_bytes().len(), 33);
        let uncompressed = SignatureAdapter::new(PublicKeyFormat::Uncompressed)
            .encode_public_key(0, &compressed.to_bytes())
            .unwrap();
        assert_eq!(hex::encode(uncompressed.to_bytes()), UNCOMPRESSED_KEY);
    }

    #[test]
    fn test_owner_check_with_hint() {
        let raw = hex::decode(UNCOMPRESSED_KEY).unwrap();

        let adapter = SignatureAdapter::new(PublicKeyFormat::Uncompressed);
        let key = adapter.encode_public_key(0, &raw).unwrap();
        assert!(adapter
            .check_owner(0, SpendKind::PubkeyHash, &key, "owner", &owner_script())
            .is_ok());

        let adapter = SignatureAdapter::new(PublicKeyFormat::Compressed);
        let key = adapter.encode_public_key(0, &raw).unwrap();
        let err = adapter
            .check_owner(0, SpendKind::PubkeyHash, &key, "owner", &owner_script())
            .unwrap_err();
        assert!(err.to_string().contains("uncompressed form"));
    }
}
