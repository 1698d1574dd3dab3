//! Bitcoin UTXO engine
//!
//! Address and script handling, unsigned transaction construction, sign-hash
//! computation, signature assembly, decoding and script verification. The
//! [`BitcoinAdaptor`] ties these together behind the adaptor traits.

pub mod adaptor;
pub mod address;
pub mod amount;
pub mod decoder;
pub mod raw_tx;
pub mod script;
pub mod sighash;
pub mod signature;
pub mod verifier;

pub use adaptor::{BitcoinAdaptor, SignedTransaction, BITCOIN_CHAIN};
pub use address::{AddressCodec, ValidatedAddress};
pub use decoder::{ParsedTx, TxDecoder};
pub use raw_tx::RawTxBuilder;
pub use script::{ScriptBuilder, SpendKind, DATA_CARRIER_PREFIX};
pub use sighash::SignHashCalculator;
pub use signature::SignatureAdapter;
pub use verifier::{ScriptVerifier, SpentOutput};
