//! Script verification through libbitcoinconsensus

use bitcoin::consensus::encode::serialize;
use bitcoin::{Amount, Script, Transaction};
use bitcoinconsensus::{
    VERIFY_CHECKLOCKTIMEVERIFY, VERIFY_CHECKSEQUENCEVERIFY, VERIFY_DERSIG, VERIFY_NULLDUMMY,
    VERIFY_P2SH, VERIFY_WITNESS,
};
use tracing::warn;

use crate::errors::TransactionError;

/// Standard verification flags, without taproot
pub const STANDARD_VERIFY_FLAGS: u32 = VERIFY_P2SH
    | VERIFY_DERSIG
    | VERIFY_NULLDUMMY
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY
    | VERIFY_WITNESS;

/// Previous output an input spends, as needed by the interpreter
#[derive(Debug, Clone, Copy)]
pub struct SpentOutput<'a> {
    pub script_pubkey: &'a Script,
    pub amount: u64,
}

pub struct ScriptVerifier;

impl ScriptVerifier {
    /// Run every input of `tx` against the output it spends
    pub fn verify_transaction(
        tx: &Transaction,
        spent: &[SpentOutput<'_>],
    ) -> Result<(), TransactionError> {
        if spent.len() != tx.input.len() {
            return Err(TransactionError::HintCountMismatch {
                hints: spent.len(),
                inputs: tx.input.len(),
            });
        }
        let tx_bytes = serialize(tx);
        for (index, output) in spent.iter().enumerate() {
            Self::verify_input(&tx_bytes, index, output)?;
        }
        Ok(())
    }

    pub fn verify_input(
        tx_bytes: &[u8],
        index: usize,
        output: &SpentOutput<'_>,
    ) -> Result<(), TransactionError> {
        output
            .script_pubkey
            .verify_with_flags(
                index,
                Amount::from_sat(output.amount),
                tx_bytes,
                STANDARD_VERIFY_FLAGS,
            )
            .map_err(|e| {
                warn!(index, error = %e, "Script verification failed");
                TransactionError::verification_failed(index, e)
            })
    }
}
