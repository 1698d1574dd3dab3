//! Unsigned transaction construction

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::btc::script::ScriptBuilder;
use crate::data_structures::{total_amount, Vin, Vout};
use crate::errors::{GatewayResult, TransactionError};

/// Transaction format version used for every built transaction
pub const TX_VERSION: Version = Version::ONE;

/// Builds unsigned transactions with empty unlocking scripts
#[derive(Debug, Clone, Copy)]
pub struct RawTxBuilder {
    scripts: ScriptBuilder,
}

impl RawTxBuilder {
    pub fn new(scripts: ScriptBuilder) -> Self {
        Self { scripts }
    }

    /// Require at least one input and one output
    pub fn check_shape(vins: &[Vin], vouts: &[Vout]) -> Result<(), TransactionError> {
        if vins.is_empty() || vouts.is_empty() {
            return Err(TransactionError::EmptyInputsOrOutputs {
                inputs: vins.len(),
                outputs: vouts.len(),
            });
        }
        Ok(())
    }

    /// Check `sum(vins) == sum(vouts) + fee` with a non-negative fee
    pub fn check_conservation(vins: &[Vin], vouts: &[Vout], fee: i64) -> Result<(), TransactionError> {
        if fee < 0 {
            return Err(TransactionError::InvalidFee(fee.to_string()));
        }
        let total_in = total_amount(vins.iter().map(|v| v.amount));
        let total_out = total_amount(vouts.iter().map(|v| v.amount));
        if total_in != total_out + i128::from(fee) {
            return Err(TransactionError::AmountMismatch {
                total_in,
                total_out,
                fee,
            });
        }
        Ok(())
    }

    /// Build the unsigned transaction spending `vins` into `vouts`
    ///
    /// Callers run [`RawTxBuilder::check_shape`] first.
    pub fn build(&self, vins: &[Vin], vouts: &[Vout]) -> GatewayResult<Transaction> {
        let outputs = vouts
            .iter()
            .map(|vout| {
                Ok(TxOut {
                    value: Amount::from_sat(vout.amount),
                    script_pubkey: self.scripts.output_script(&vout.address)?,
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        Self::template(vins, outputs)
    }

    /// Canonical transaction over `vins` with blank unlocking data and the given outputs
    pub fn template(vins: &[Vin], outputs: Vec<TxOut>) -> GatewayResult<Transaction> {
        let input = vins
            .iter()
            .map(|vin| {
                Ok(TxIn {
                    previous_output: outpoint(vin)?,
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
            })
            .collect::<Result<Vec<_>, TransactionError>>()?;

        Ok(Transaction {
            version: TX_VERSION,
            lock_time: LockTime::ZERO,
            input,
            output: outputs,
        })
    }
}

/// Parse the outpoint a caller-supplied input refers to
pub fn outpoint(vin: &Vin) -> Result<OutPoint, TransactionError> {
    let txid =
        Txid::from_str(&vin.hash).map_err(|e| TransactionError::invalid_tx_hash(&vin.hash, e))?;
    Ok(OutPoint::new(txid, vin.index))
}
