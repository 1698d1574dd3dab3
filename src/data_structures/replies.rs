//! Request and reply structures exposed by chain adaptors
//!
//! Every reply carries a `code`/`msg` envelope. Typed callers work with
//! [`GatewayResult`] directly; wire callers turn a result into a reply with
//! [`respond`], which keeps the error message verbatim.

use serde::{Deserialize, Serialize};

use crate::data_structures::types::{ReturnCode, TxStatus, Vin, Vout};
use crate::errors::GatewayResult;
use crate::hex_utils::{hex_bytes, hex_bytes_list};

/// Uniform status envelope shared by every reply
pub trait Envelope: Default {
    fn code(&self) -> ReturnCode;
    fn msg(&self) -> &str;
    fn set_status(&mut self, code: ReturnCode, msg: String);

    /// Reply carrying only an error status and message
    fn failure(msg: impl Into<String>) -> Self {
        let mut reply = Self::default();
        reply.set_status(ReturnCode::Error, msg.into());
        reply
    }

    fn is_success(&self) -> bool {
        self.code() == ReturnCode::Success
    }
}

/// Convert a typed result into an error-carrying reply
pub fn respond<R: Envelope>(result: GatewayResult<R>) -> R {
    match result {
        Ok(reply) => reply,
        Err(e) => R::failure(e.to_string()),
    }
}

macro_rules! impl_envelope {
    ($($reply:ty),+ $(,)?) => {
        $(
            impl Envelope for $reply {
                fn code(&self) -> ReturnCode {
                    self.code
                }

                fn msg(&self) -> &str {
                    &self.msg
                }

                fn set_status(&mut self, code: ReturnCode, msg: String) {
                    self.code = code;
                    self.msg = msg;
                }
            }
        )+
    };
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertAddressRequest {
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertAddressReply {
    pub code: ReturnCode,
    pub msg: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidAddressRequest {
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidAddressReply {
    pub code: ReturnCode,
    pub msg: String,
    pub valid: bool,
    /// Whether the gateway may pay to this address
    pub can_withdrawal: bool,
    pub canonical_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUtxoTransactionRequest {
    pub vins: Vec<Vin>,
    pub vouts: Vec<Vout>,
    /// Decimal satoshis, or `0x`-prefixed hex
    pub fee: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUtxoTransactionReply {
    pub code: ReturnCode,
    pub msg: String,
    #[serde(with = "hex_bytes")]
    pub tx_data: Vec<u8>,
    #[serde(with = "hex_bytes_list")]
    pub sign_hashes: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUtxoSignedTransactionRequest {
    #[serde(with = "hex_bytes")]
    pub tx_data: Vec<u8>,
    #[serde(with = "hex_bytes_list")]
    pub signatures: Vec<Vec<u8>>,
    #[serde(with = "hex_bytes_list")]
    pub public_keys: Vec<Vec<u8>>,
    /// Optional input hints; empty means resolve from chain
    #[serde(default)]
    pub vins: Vec<Vin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSignedTransactionReply {
    pub code: ReturnCode,
    pub msg: String,
    #[serde(with = "hex_bytes")]
    pub signed_tx_data: Vec<u8>,
    pub hash: String,
}

/// Decode request for unsigned or signed bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeTransactionRequest {
    #[serde(with = "hex_bytes")]
    pub raw_data: Vec<u8>,
    #[serde(default)]
    pub vins: Vec<Vin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryUtxoTransactionReply {
    pub code: ReturnCode,
    pub msg: String,
    pub tx_hash: String,
    pub tx_status: TxStatus,
    pub vins: Vec<Vin>,
    pub vouts: Vec<Vout>,
    /// Fee in satoshis as a decimal string, possibly negative
    pub cost_fee: String,
    pub block_height: u64,
    pub block_time: u64,
    #[serde(with = "hex_bytes_list")]
    pub sign_hashes: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySignedTransactionRequest {
    #[serde(with = "hex_bytes")]
    pub signed_tx_data: Vec<u8>,
    #[serde(default)]
    pub vins: Vec<Vin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySignedTransactionReply {
    pub code: ReturnCode,
    pub msg: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastTransactionRequest {
    #[serde(with = "hex_bytes")]
    pub raw_tx: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastTransactionReply {
    pub code: ReturnCode,
    pub msg: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryUtxoRequest {
    pub vin: Vin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryUtxoReply {
    pub code: ReturnCode,
    pub msg: String,
    pub unspent: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTransactionRequest {
    /// Asset symbol, used as the cache namespace
    pub symbol: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryUtxoInsFromDataRequest {
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryUtxoInsFromDataReply {
    pub code: ReturnCode,
    pub msg: String,
    pub vins: Vec<Vin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryGasPriceReply {
    pub code: ReturnCode,
    pub msg: String,
    /// Fee rate in satoshis per kilo-vbyte
    pub gas_price: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestBlockHeightReply {
    pub code: ReturnCode,
    pub msg: String,
    pub height: u64,
}

impl_envelope!(
    ConvertAddressReply,
    ValidAddressReply,
    CreateUtxoTransactionReply,
    CreateSignedTransactionReply,
    QueryUtxoTransactionReply,
    VerifySignedTransactionReply,
    BroadcastTransactionReply,
    QueryUtxoReply,
    QueryUtxoInsFromDataReply,
    QueryGasPriceReply,
    LatestBlockHeightReply,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{GatewayError, TransactionError};

    #[test]
    fn test_respond_keeps_error_message() {
        let result: GatewayResult<VerifySignedTransactionReply> = Err(GatewayError::from(
            TransactionError::verification_failed(0, "script failed"),
        ));
        let reply = respond(result);
        assert_eq!(reply.code, ReturnCode::Error);
        assert!(!reply.verified);
        assert_eq!(
            reply.msg,
            "input 0: script verification failed: script failed"
        );
    }

    #[test]
    fn test_respond_passes_success_through() {
        let reply = respond(Ok(QueryUtxoReply {
            unspent: true,
            ..Default::default()
        }));
        assert!(reply.is_success());
        assert!(reply.unspent);
    }

    #[test]
    fn test_signed_request_from_json() {
        let json = r#"{
            "tx_data": "0100",
            "signatures": ["aa", "bb"],
            "public_keys": ["02ff", "03ee"]
        }"#;
        let req: CreateUtxoSignedTransactionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.tx_data, vec![0x01, 0x00]);
        assert_eq!(req.signatures, vec![vec![0xaa], vec![0xbb]]);
        assert!(req.vins.is_empty());
    }
}
