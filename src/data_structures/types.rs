//! Core value types shared by construction and decoding

use serde::{Deserialize, Serialize};

/// 32-byte digest an external signer signs for one input
pub type SignHash = [u8; 32];

/// A transaction input as claimed by the caller or resolved from chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vin {
    /// Previous transaction id in display (reversed) hex order
    #[serde(default)]
    pub hash: String,
    /// Index of the spent output within the previous transaction
    #[serde(default)]
    pub index: u32,
    /// Amount of the spent output in satoshis
    #[serde(default)]
    pub amount: u64,
    /// Owner address of the spent output
    #[serde(default)]
    pub address: String,
}

impl Vin {
    pub fn new(hash: impl Into<String>, index: u32, amount: u64, address: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            index,
            amount,
            address: address.into(),
        }
    }

    /// Outpoint-only input, as produced when no owner data is available
    pub fn outpoint(hash: impl Into<String>, index: u32) -> Self {
        Self {
            hash: hash.into(),
            index,
            ..Self::default()
        }
    }
}

/// A transaction output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vout {
    /// Destination address, or a data-carrier pseudo-address
    #[serde(default)]
    pub address: String,
    /// Amount in satoshis
    #[serde(default)]
    pub amount: u64,
    /// Position within the transaction outputs
    #[serde(default)]
    pub index: u32,
}

impl Vout {
    pub fn new(address: impl Into<String>, amount: u64, index: u32) -> Self {
        Self {
            address: address.into(),
            amount,
            index,
        }
    }
}

/// Canonical decoded view of a transaction, shared by create and decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    /// Transaction id, only computed for signed transactions
    pub tx_hash: Option<String>,
    pub vins: Vec<Vin>,
    pub vouts: Vec<Vout>,
    /// `sum(vins) - sum(vouts)`; negative when input amounts are unknown
    pub fee: i64,
    /// One digest per input, in input order
    pub sign_hashes: Vec<SignHash>,
}

impl DecodedTransaction {
    pub fn sign_hash_bytes(&self) -> Vec<Vec<u8>> {
        self.sign_hashes.iter().map(|h| h.to_vec()).collect()
    }
}

/// Envelope status code carried by every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnCode {
    #[default]
    Success,
    Error,
}

/// On-chain status of a queried transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    NotFound,
    Pending,
    Success,
    /// Used for transactions decoded from bytes rather than looked up
    #[default]
    Other,
}

/// Sum amounts without overflow, for fee and conservation arithmetic
pub fn total_amount<I: IntoIterator<Item = u64>>(amounts: I) -> i128 {
    amounts.into_iter().map(i128::from).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vin_json_defaults() {
        let vin: Vin = serde_json::from_str(r#"{"hash":"ab","index":2}"#).unwrap();
        assert_eq!(vin, Vin::outpoint("ab", 2));
        assert_eq!(vin.amount, 0);
        assert!(vin.address.is_empty());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TxStatus::NotFound).unwrap(),
            r#""NOT_FOUND""#
        );
        assert_eq!(serde_json::to_string(&ReturnCode::Error).unwrap(), r#""ERROR""#);
    }

    #[test]
    fn test_total_amount_does_not_overflow() {
        let total = total_amount([u64::MAX, u64::MAX]);
        assert_eq!(total, 2 * i128::from(u64::MAX));
    }
}
