//! Error types for the transaction gateway
//!
//! Every fallible operation returns [`GatewayResult`]. The umbrella
//! [`GatewayError`] wraps one domain enum per component so callers can match
//! on the failing layer, and [`GatewayError::kind`] folds everything into the
//! coarse taxonomy used by reply envelopes.

use thiserror::Error;

/// Result alias used throughout the crate
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unparsable bytes, undecodable address, short signature, count mismatches
    MalformedInput,
    /// `sum(inputs) != sum(outputs) + fee`
    ConservationViolation,
    /// Caller claims disagree with what the chain or the script proves
    ReconciliationMismatch,
    /// Script execution failed for an input
    AuthorizationFailure,
    /// Chain query or broadcast failed
    CollaboratorFailure,
    /// Operation not implemented by this chain family
    Unsupported,
    /// Invalid adaptor configuration
    Configuration,
    /// A worker task panicked or was cancelled by the runtime
    Internal,
}

/// Umbrella error for all gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    ChainQuery(#[from] ChainQueryError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported operation")]
    UnsupportedOperation,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Transaction(e) => e.kind(),
            GatewayError::Address(_) => ErrorKind::MalformedInput,
            GatewayError::Signature(e) => e.kind(),
            GatewayError::ChainQuery(_) => ErrorKind::CollaboratorFailure,
            GatewayError::Configuration(_) => ErrorKind::Configuration,
            GatewayError::UnsupportedOperation => ErrorKind::Unsupported,
            GatewayError::InvalidRequest(_) => ErrorKind::MalformedInput,
            GatewayError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        GatewayError::Configuration(msg.into())
    }
}

/// Errors raised while building, decoding or verifying transactions
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("invalid len in or out: {inputs} inputs, {outputs} outputs")]
    EmptyInputsOrOutputs { inputs: usize, outputs: usize },

    #[error("fail to get fee from '{0}'")]
    InvalidFee(String),

    #[error(
        "total amount in != total amount out + fee (in: {total_in}, out: {total_out}, fee: {fee})"
    )]
    AmountMismatch {
        total_in: i128,
        total_out: i128,
        fee: i64,
    },

    #[error("invalid transaction hash '{hash}': {reason}")]
    InvalidTxHash { hash: String, reason: String },

    #[error("failed to deserialize transaction: {0}")]
    Deserialize(String),

    #[error("the length of deserialized tx's in ({inputs}) differs from vin in req ({hints})")]
    HintCountMismatch { hints: usize, inputs: usize },

    #[error("Signature number ({signatures}) != Txin number ({inputs})")]
    SignatureCountMismatch { signatures: usize, inputs: usize },

    #[error("Pubkey number ({public_keys}) != Txin number ({inputs})")]
    PublicKeyCountMismatch { public_keys: usize, inputs: usize },

    #[error("input {index}: {field} mismatch (claimed {claimed}, actual {actual})")]
    ReconciliationMismatch {
        index: usize,
        field: &'static str,
        claimed: String,
        actual: String,
    },

    #[error("input {index}: unsupported previous output script ({kind})")]
    UnsupportedScript { index: usize, kind: String },

    #[error("input {index}: sighash computation failed: {reason}")]
    Sighash { index: usize, reason: String },

    #[error("input {index}: script verification failed: {reason}")]
    VerificationFailed { index: usize, reason: String },

    #[error("amount overflow while summing {0}")]
    AmountOverflow(&'static str),
}

impl TransactionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransactionError::AmountMismatch { .. } => ErrorKind::ConservationViolation,
            TransactionError::ReconciliationMismatch { .. } => ErrorKind::ReconciliationMismatch,
            TransactionError::VerificationFailed { .. } => ErrorKind::AuthorizationFailure,
            _ => ErrorKind::MalformedInput,
        }
    }

    pub fn invalid_tx_hash(hash: &str, reason: impl ToString) -> Self {
        TransactionError::InvalidTxHash {
            hash: hash.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn verification_failed(index: usize, reason: impl ToString) -> Self {
        TransactionError::VerificationFailed {
            index,
            reason: reason.to_string(),
        }
    }

    pub fn mismatch(
        index: usize,
        field: &'static str,
        claimed: impl ToString,
        actual: impl ToString,
    ) -> Self {
        TransactionError::ReconciliationMismatch {
            index,
            field,
            claimed: claimed.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Errors raised while decoding, validating or deriving addresses
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("failed to decode address '{address}': {reason}")]
    Decode { address: String, reason: String },

    #[error("address {address} is not valid for network {network}")]
    WrongNetwork { address: String, network: String },

    #[error("script-hash destination {0} is not allowed by this adaptor")]
    ScriptHashNotAllowed(String),

    #[error("parse omni data error: {0}")]
    InvalidPayload(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("address {0} cannot be used as a spending owner")]
    NotSpendable(String),
}

impl AddressError {
    pub fn decode(address: &str, reason: impl ToString) -> Self {
        AddressError::Decode {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while translating signatures and public keys
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Invalid signature length: input {index} has {len} bytes, need at least 64")]
    TooShort { index: usize, len: usize },

    #[error("input {index}: invalid (r, s) signature: {reason}")]
    InvalidEncoding { index: usize, reason: String },

    #[error("input {index}: invalid public key: {reason}")]
    InvalidPublicKey { index: usize, reason: String },

    #[error("input {index}: public key does not hash to owner {owner}{hint}")]
    PublicKeyMismatch {
        index: usize,
        owner: String,
        hint: String,
    },
}

impl SignatureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignatureError::PublicKeyMismatch { .. } => ErrorKind::ReconciliationMismatch,
            _ => ErrorKind::MalformedInput,
        }
    }
}

/// Errors raised by the chain-query collaborator
#[derive(Debug, Error)]
pub enum ChainQueryError {
    #[error("blockchain connection failed: {0}")]
    ConnectionFailed(String),

    #[error("RPC error (code: {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response from node: {0}")]
    InvalidResponse(String),

    #[error("no chain query service configured for online resolution")]
    Unavailable,
}

impl ChainQueryError {
    pub fn connection_failed(msg: &str) -> Self {
        ChainQueryError::ConnectionFailed(msg.to_string())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        ChainQueryError::InvalidResponse(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ChainQueryError::NotFound(what.into())
    }
}
