//! Sign-hash computation
//!
//! One SIGHASH_ALL digest per input, in input order. Pay-to-pubkey-hash and
//! pay-to-script-hash owners use the legacy algorithm with the owner's
//! locking script as script code; native witness owners use the BIP143
//! algorithm, which commits to the claimed input amount.

use bitcoin::hashes::Hash;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, Transaction};
use tracing::debug;

use crate::btc::script::{ScriptBuilder, SpendKind};
use crate::data_structures::{SignHash, Vin};
use crate::errors::{GatewayResult, TransactionError};

#[derive(Debug, Clone, Copy)]
pub struct SignHashCalculator {
    scripts: ScriptBuilder,
}

impl SignHashCalculator {
    pub fn new(scripts: ScriptBuilder) -> Self {
        Self { scripts }
    }

    /// Digest for every input of `tx`, whose previous outputs are described by `vins`
    pub fn sign_hashes(&self, tx: &Transaction, vins: &[Vin]) -> GatewayResult<Vec<SignHash>> {
        if vins.len() != tx.input.len() {
            return Err(TransactionError::HintCountMismatch {
                hints: vins.len(),
                inputs: tx.input.len(),
            }
            .into());
        }

        let mut cache = SighashCache::new(tx);
        let mut hashes = Vec::with_capacity(vins.len());
        for (index, vin) in vins.iter().enumerate() {
            let script_code = self.scripts.owner_script(&vin.address)?;
            let hash = match SpendKind::of(index, &script_code)? {
                SpendKind::PubkeyHash | SpendKind::ScriptHash => cache
                    .legacy_signature_hash(index, &script_code, EcdsaSighashType::All.to_u32())
                    .map(|h| h.to_byte_array())
                    .map_err(|e| sighash_error(index, e))?,
                SpendKind::WitnessPubkeyHash => cache
                    .p2wpkh_signature_hash(
                        index,
                        &script_code,
                        Amount::from_sat(vin.amount),
                        EcdsaSighashType::All,
                    )
                    .map(|h| h.to_byte_array())
                    .map_err(|e| sighash_error(index, e))?,
            };
            debug!(index, owner = %vin.address, sign_hash = %hex::encode(hash), "Computed sign hash");
            hashes.push(hash);
        }
        Ok(hashes)
    }
}

fn sighash_error(index: usize, e: impl ToString) -> TransactionError {
    TransactionError::Sighash {
        index,
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btc::address::AddressCodec;
    use crate::btc::raw_tx::RawTxBuilder;
    use crate::config::NetworkKind;
    use crate::data_structures::Vout;

    fn scripts() -> ScriptBuilder {
        ScriptBuilder::new(AddressCodec::new(NetworkKind::Testnet), true)
    }

    fn vins() -> Vec<Vin> {
        vec![Vin::new(
            "c94a4debf11bfef9316681f61fb663d15ed7a6ad8698063c4f1348575aec57a9",
            0,
            32_500_000,
            "mhoGjKn5xegDXL6u5LFSUQdm5ozdM6xao9",
        )]
    }

    #[test]
    fn test_legacy_known_answer() {
        let vouts = vec![
            Vout::new("mhoGjKn5xegDXL6u5LFSUQdm5ozdM6xao9", 32_000_000, 0),
            Vout::new("2MthzQgsQ8Rw8vPMtTsrTdqc9HsWiDHM9VY", 480_000, 1),
        ];
        let tx = RawTxBuilder::new(scripts()).build(&vins(), &vouts).unwrap();
        let hashes = SignHashCalculator::new(scripts())
            .sign_hashes(&tx, &vins())
            .unwrap();
        assert_eq!(hashes.len(), 1);
        assert_eq!(
            hex::encode(hashes[0]),
            "faa1e29f8ff3c19e6f307e9f2ce2f2f0ded93930796dbcf84ea59431136a0b6e"
        );
    }

    #[test]
    fn test_witness_hash_commits_to_amount() {
        let owner = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
        let mut vins = vec![Vin::new(
            "c94a4debf11bfef9316681f61fb663d15ed7a6ad8698063c4f1348575aec57a9",
            1,
            50_000,
            owner,
        )];
        let vouts = vec![Vout::new(owner, 40_000, 0)];
        let tx = RawTxBuilder::new(scripts()).build(&vins, &vouts).unwrap();
        let calculator = SignHashCalculator::new(scripts());
        let first = calculator.sign_hashes(&tx, &vins).unwrap();
        vins[0].amount = 50_001;
        let second = calculator.sign_hashes(&tx, &vins).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_count_mismatch() {
        let vouts = vec![Vout::new("mhoGjKn5xegDXL6u5LFSUQdm5ozdM6xao9", 1, 0)];
        let tx = RawTxBuilder::new(scripts()).build(&vins(), &vouts).unwrap();
        assert!(SignHashCalculator::new(scripts()).sign_hashes(&tx, &[]).is_err());
    }
}
