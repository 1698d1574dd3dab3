//! Data structures for transaction construction, decoding and adaptor replies

pub mod replies;
pub mod types;

pub use replies::*;
pub use types::{
    total_amount, DecodedTransaction, ReturnCode, SignHash, TxStatus, Vin, Vout,
};
