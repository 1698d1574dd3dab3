//! Locking and unlocking script construction
//!
//! Destinations are either addresses of the configured network or
//! data-carrier pseudo-addresses. A data-carrier destination is a hex string
//! beginning with [`DATA_CARRIER_PREFIX`]; the whole decoded string is pushed
//! verbatim into a provably unspendable `OP_RETURN` output.

use bitcoin::address::Address;
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::{ecdsa, CompressedPublicKey, PublicKey, Script, ScriptBuf, Witness};

use crate::btc::address::AddressCodec;
use crate::errors::{AddressError, SignatureError, TransactionError};

/// Hex marker ("omni") that identifies a data-carrier destination
pub const DATA_CARRIER_PREFIX: &str = "6f6d6e69";

/// Resolved output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Address(Address),
    DataCarrier(Vec<u8>),
}

/// How an input spending a given locking script must be signed and unlocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendKind {
    PubkeyHash,
    /// Redeem script is unknown to the engine
    ScriptHash,
    WitnessPubkeyHash,
}

impl SpendKind {
    /// Classify a previous output's locking script
    pub fn of(index: usize, script: &Script) -> Result<Self, TransactionError> {
        if script.is_p2pkh() {
            Ok(SpendKind::PubkeyHash)
        } else if script.is_p2sh() {
            Ok(SpendKind::ScriptHash)
        } else if script.is_p2wpkh() {
            Ok(SpendKind::WitnessPubkeyHash)
        } else {
            Err(TransactionError::UnsupportedScript {
                index,
                kind: describe(script),
            })
        }
    }

    /// Locking script this kind would produce for a key; `None` for script hashes
    pub fn script_for_key(self, key: &PublicKey) -> Option<ScriptBuf> {
        match self {
            SpendKind::PubkeyHash => Some(ScriptBuf::new_p2pkh(&key.pubkey_hash())),
            SpendKind::ScriptHash => None,
            SpendKind::WitnessPubkeyHash => Some(ScriptBuf::new_p2wpkh(
                &CompressedPublicKey(key.inner).wpubkey_hash(),
            )),
        }
    }
}

fn describe(script: &Script) -> String {
    if script.is_p2wsh() {
        "witness script hash".to_string()
    } else if script.is_p2tr() {
        "taproot".to_string()
    } else if script.is_op_return() {
        "data carrier".to_string()
    } else {
        format!("non-standard script {}", script.to_hex_string())
    }
}

/// Builds scripts for one network and destination policy
#[derive(Debug, Clone, Copy)]
pub struct ScriptBuilder {
    codec: AddressCodec,
    allow_script_hash: bool,
}

impl ScriptBuilder {
    pub fn new(codec: AddressCodec, allow_script_hash: bool) -> Self {
        Self {
            codec,
            allow_script_hash,
        }
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    pub fn is_data_carrier(destination: &str) -> bool {
        destination.starts_with(DATA_CARRIER_PREFIX)
    }

    /// Resolve an output destination string
    pub fn destination(&self, destination: &str) -> Result<Destination, AddressError> {
        if Self::is_data_carrier(destination) {
            let payload = hex::decode(destination)
                .map_err(|e| AddressError::InvalidPayload(e.to_string()))?;
            return Ok(Destination::DataCarrier(payload));
        }
        let validated = self.codec.validate(destination, self.allow_script_hash)?;
        if !validated.can_withdrawal {
            return Err(AddressError::ScriptHashNotAllowed(destination.to_string()));
        }
        Ok(Destination::Address(validated.address))
    }

    /// Locking script for an output destination
    pub fn output_script(&self, destination: &str) -> Result<ScriptBuf, AddressError> {
        match self.destination(destination)? {
            Destination::Address(address) => Ok(address.script_pubkey()),
            Destination::DataCarrier(payload) => {
                let push = PushBytesBuf::try_from(payload)
                    .map_err(|e| AddressError::InvalidPayload(e.to_string()))?;
                Ok(ScriptBuf::new_op_return(push))
            }
        }
    }

    /// Locking script of the output an input spends, rebuilt from its owner
    pub fn owner_script(&self, owner: &str) -> Result<ScriptBuf, AddressError> {
        if owner.is_empty() || Self::is_data_carrier(owner) {
            return Err(AddressError::NotSpendable(owner.to_string()));
        }
        Ok(self.codec.decode(owner)?.script_pubkey())
    }

    /// Destination string a locking script pays to; empty when it has none
    pub fn destination_of(&self, script: &Script) -> String {
        if script.is_op_return() {
            return data_carrier_payload(script).unwrap_or_default();
        }
        self.codec
            .address_of(script)
            .map(|address| address.to_string())
            .unwrap_or_default()
    }
}

fn data_carrier_payload(script: &Script) -> Option<String> {
    let mut instructions = script.instructions().skip(1);
    match instructions.next() {
        Some(Ok(Instruction::PushBytes(bytes))) => {
            let payload = hex::encode(bytes.as_bytes());
            payload.starts_with(DATA_CARRIER_PREFIX).then_some(payload)
        }
        _ => None,
    }
}

/// `<signature> <public key>` unlocking script for pay-to-pubkey-hash inputs
pub fn p2pkh_unlocking_script(
    index: usize,
    signature: &ecdsa::Signature,
    key: &PublicKey,
) -> Result<ScriptBuf, SignatureError> {
    let push = PushBytesBuf::try_from(signature.to_vec()).map_err(|e| {
        SignatureError::InvalidEncoding {
            index,
            reason: e.to_string(),
        }
    })?;
    Ok(Builder::new().push_slice(push).push_key(key).into_script())
}

/// `[signature, compressed key]` witness for native witness inputs
pub fn p2wpkh_witness(signature: &ecdsa::Signature, key: &PublicKey) -> Witness {
    Witness::from_slice(&[signature.to_vec(), key.inner.serialize().to_vec()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkKind;

    fn builder(allow_script_hash: bool) -> ScriptBuilder {
        ScriptBuilder::new(AddressCodec::new(NetworkKind::Testnet), allow_script_hash)
    }

    #[test]
    fn test_output_scripts_by_kind() {
        let scripts = builder(true);
        let p2pkh = scripts
            .output_script("mhoGjKn5xegDXL6u5LFSUQdm5ozdM6xao9")
            .unwrap();
        assert_eq!(
            p2pkh.to_hex_string(),
            "76a91419064bda7eb5049f922a4bca4c24808c6aea948d88ac"
        );
        let p2sh = scripts
            .output_script("2MthzQgsQ8Rw8vPMtTsrTdqc9HsWiDHM9VY")
            .unwrap();
        assert_eq!(
            p2sh.to_hex_string(),
            "a91410080578e54a2a66efcb55e69b073100d0da47b987"
        );
        let p2wpkh = scripts
            .output_script("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx")
            .unwrap();
        assert!(p2wpkh.is_p2wpkh());
    }

    #[test]
    fn test_script_hash_destination_policy() {
        let err = builder(false)
            .output_script("2MthzQgsQ8Rw8vPMtTsrTdqc9HsWiDHM9VY")
            .unwrap_err();
        assert!(matches!(err, AddressError::ScriptHashNotAllowed(_)));
    }

    #[test]
    fn test_data_carrier_round_trip() {
        let scripts = builder(true);
        let destination = format!("{DATA_CARRIER_PREFIX}0000000000000001000000000000000a");
        let script = scripts.output_script(&destination).unwrap();
        assert!(script.is_op_return());
        assert_eq!(
            script.to_hex_string(),
            format!("6a14{destination}")
        );
        assert_eq!(scripts.destination_of(&script), destination);
    }

    #[test]
    fn test_invalid_data_carrier() {
        let err = builder(true)
            .output_script(&format!("{DATA_CARRIER_PREFIX}zz"))
            .unwrap_err();
        assert!(matches!(err, AddressError::InvalidPayload(_)));
    }

    #[test]
    fn test_unknown_scripts_have_empty_destination() {
        let scripts = builder(true);
        let foreign_op_return =
            ScriptBuf::new_op_return(PushBytesBuf::try_from(vec![0xde, 0xad]).unwrap());
        assert_eq!(scripts.destination_of(&foreign_op_return), "");
        let garbage = ScriptBuf::from_bytes(vec![0x51, 0x52]);
        assert_eq!(scripts.destination_of(&garbage), "");
    }

    #[test]
    fn test_spend_kind_classification() {
        let scripts = builder(true);
        let owner = scripts
            .owner_script("2Mww6tED1opzwN2D3rqqKW9z6BdLstdRFpL")
            .unwrap();
        assert_eq!(SpendKind::of(0, &owner).unwrap(), SpendKind::ScriptHash);
        let owner = scripts
            .owner_script("tb1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3q0sl5k7")
            .unwrap();
        assert!(matches!(
            SpendKind::of(3, &owner),
            Err(TransactionError::UnsupportedScript { index: 3, .. })
        ));
    }

    #[test]
    fn test_owner_must_be_an_address() {
        let scripts = builder(true);
        assert!(matches!(
            scripts.owner_script(""),
            Err(AddressError::NotSpendable(_))
        ));
        assert!(matches!(
            scripts.owner_script(DATA_CARRIER_PREFIX),
            Err(AddressError::NotSpendable(_))
        ));
    }
}
