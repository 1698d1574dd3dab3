//! Transaction decoding
//!
//! Decoding runs through explicit stages, each a distinct type:
//! [`ParsedTx`] → [`InputsResolved`] → [`OutputsResolved`] → [`DecodedTransaction`].
//!
//! Inputs are resolved offline from caller hints when a hint is supplied for
//! every wire input, and online through [`ChainQuery`] when no hints are
//! supplied. Sign-hashes are always recomputed over the canonical template
//! (version 1, lock time 0, final sequences) built from the resolved inputs
//! and the wire outputs.

use bitcoin::consensus::encode::deserialize;
use bitcoin::{OutPoint, Transaction};
use futures::future::try_join_all;
use tracing::debug;

use crate::btc::raw_tx::{outpoint, RawTxBuilder};
use crate::btc::script::ScriptBuilder;
use crate::btc::sighash::SignHashCalculator;
use crate::btc::verifier::{ScriptVerifier, SpentOutput};
use crate::chain_query::ChainQuery;
use crate::data_structures::{total_amount, DecodedTransaction, Vin, Vout};
use crate::errors::{ChainQueryError, GatewayResult, TransactionError};

/// Where input amounts and owners come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Trust caller hints
    Offline,
    /// Look every input up on chain
    Online,
}

impl Resolution {
    /// Choose the mode for `hints` against `input_count` wire inputs
    pub fn select(hints: &[Vin], input_count: usize) -> Result<Self, TransactionError> {
        if hints.is_empty() {
            Ok(Resolution::Online)
        } else if hints.len() == input_count {
            Ok(Resolution::Offline)
        } else {
            Err(TransactionError::HintCountMismatch {
                hints: hints.len(),
                inputs: input_count,
            })
        }
    }
}

/// Successfully deserialized transaction
#[derive(Debug, Clone)]
pub struct ParsedTx {
    tx: Transaction,
}

impl ParsedTx {
    pub fn parse(data: &[u8]) -> Result<Self, TransactionError> {
        let tx: Transaction =
            deserialize(data).map_err(|e| TransactionError::Deserialize(e.to_string()))?;
        debug!(inputs = tx.input.len(), outputs = tx.output.len(), "Parsed transaction");
        Ok(Self { tx })
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn into_tx(self) -> Transaction {
        self.tx
    }

    /// Inputs carrying only the outpoints read from the wire
    pub fn outpoints(&self) -> Vec<Vin> {
        self.tx
            .input
            .iter()
            .map(|txin| {
                Vin::outpoint(
                    txin.previous_output.txid.to_string(),
                    txin.previous_output.vout,
                )
            })
            .collect()
    }

    /// Resolve input amounts and owners from hints or from chain
    pub async fn resolve_inputs(
        self,
        hints: &[Vin],
        chain: Option<&dyn ChainQuery>,
    ) -> GatewayResult<InputsResolved> {
        let vins = match Resolution::select(hints, self.tx.input.len())? {
            Resolution::Offline => self.reconcile_hints(hints)?,
            Resolution::Online => {
                let chain = chain.ok_or(ChainQueryError::Unavailable)?;
                self.lookup_inputs(chain).await?
            }
        };
        debug!(inputs = vins.len(), "Resolved transaction inputs");
        Ok(InputsResolved { tx: self.tx, vins })
    }

    fn reconcile_hints(&self, hints: &[Vin]) -> Result<Vec<Vin>, TransactionError> {
        self.tx
            .input
            .iter()
            .zip(hints)
            .enumerate()
            .map(|(index, (txin, hint))| {
                let wire = txin.previous_output;
                if !hint.hash.is_empty() && outpoint(hint)? != wire {
                    return Err(TransactionError::mismatch(
                        index,
                        "outpoint",
                        format!("{}:{}", hint.hash, hint.index),
                        wire,
                    ));
                }
                Ok(Vin::new(
                    wire.txid.to_string(),
                    wire.vout,
                    hint.amount,
                    hint.address.clone(),
                ))
            })
            .collect()
    }

    async fn lookup_inputs(&self, chain: &dyn ChainQuery) -> GatewayResult<Vec<Vin>> {
        let lookups = self.tx.input.iter().map(|txin| async move {
            let OutPoint { txid, vout } = txin.previous_output;
            let prev = chain.get_previous_output(&txid, vout).await?;
            Ok::<_, ChainQueryError>(Vin::new(txid.to_string(), vout, prev.amount, prev.address))
        });
        Ok(try_join_all(lookups).await?)
    }
}

/// Transaction with every input's amount and owner known
#[derive(Debug, Clone)]
pub struct InputsResolved {
    tx: Transaction,
    vins: Vec<Vin>,
}

impl InputsResolved {
    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn vins(&self) -> &[Vin] {
        &self.vins
    }

    pub fn into_parts(self) -> (Transaction, Vec<Vin>) {
        (self.tx, self.vins)
    }

    pub fn resolve_outputs(self, scripts: &ScriptBuilder) -> OutputsResolved {
        let vouts = self
            .tx
            .output
            .iter()
            .enumerate()
            .map(|(index, txout)| Vout {
                address: scripts.destination_of(&txout.script_pubkey),
                amount: txout.value.to_sat(),
                index: index as u32,
            })
            .collect();
        OutputsResolved {
            tx: self.tx,
            vins: self.vins,
            vouts,
        }
    }
}

/// Fully resolved transaction, ready for verification and sign-hash recomputation
#[derive(Debug, Clone)]
pub struct OutputsResolved {
    tx: Transaction,
    vins: Vec<Vin>,
    vouts: Vec<Vout>,
}

impl OutputsResolved {
    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    /// Run every input against the locking script of its resolved owner
    pub fn verify(&self, scripts: &ScriptBuilder) -> GatewayResult<()> {
        let owner_scripts = self
            .vins
            .iter()
            .map(|vin| scripts.owner_script(&vin.address))
            .collect::<Result<Vec<_>, _>>()?;
        let spent: Vec<SpentOutput<'_>> = owner_scripts
            .iter()
            .zip(&self.vins)
            .map(|(script, vin)| SpentOutput {
                script_pubkey: script,
                amount: vin.amount,
            })
            .collect();
        ScriptVerifier::verify_transaction(&self.tx, &spent)?;
        debug!(txid = %self.tx.compute_txid(), "Verified all inputs");
        Ok(())
    }

    /// Recompute sign-hashes and the fee
    pub fn finish(
        self,
        scripts: &ScriptBuilder,
        with_tx_hash: bool,
    ) -> GatewayResult<DecodedTransaction> {
        let template = RawTxBuilder::template(&self.vins, self.tx.output.clone())?;
        let sign_hashes = SignHashCalculator::new(*scripts).sign_hashes(&template, &self.vins)?;

        let total_in = total_amount(self.vins.iter().map(|v| v.amount));
        let total_out = total_amount(self.vouts.iter().map(|v| v.amount));
        let fee = i64::try_from(total_in - total_out)
            .map_err(|_| TransactionError::AmountOverflow("fee"))?;

        Ok(DecodedTransaction {
            tx_hash: with_tx_hash.then(|| self.tx.compute_txid().to_string()),
            vins: self.vins,
            vouts: self.vouts,
            fee,
            sign_hashes,
        })
    }
}

/// Decodes raw transactions for one network
pub struct TxDecoder<'a> {
    scripts: ScriptBuilder,
    chain: Option<&'a dyn ChainQuery>,
}

impl<'a> TxDecoder<'a> {
    pub fn new(scripts: ScriptBuilder, chain: Option<&'a dyn ChainQuery>) -> Self {
        Self { scripts, chain }
    }

    /// Decode `data`; with `verify` every input must pass script verification
    /// and the transaction id is reported
    pub async fn decode(
        &self,
        data: &[u8],
        hints: &[Vin],
        verify: bool,
    ) -> GatewayResult<DecodedTransaction> {
        let resolved = self.resolve(data, hints).await?;
        if verify {
            resolved.verify(&self.scripts)?;
        }
        resolved.finish(&self.scripts, verify)
    }

    /// Parse and resolve inputs and outputs without verifying
    pub async fn resolve(&self, data: &[u8], hints: &[Vin]) -> GatewayResult<OutputsResolved> {
        let parsed = ParsedTx::parse(data)?;
        let inputs = parsed.resolve_inputs(hints, self.chain).await?;
        Ok(inputs.resolve_outputs(&self.scripts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btc::address::AddressCodec;
    use crate::chain_query::MockChainQuery;
    use crate::config::NetworkKind;
    use crate::errors::GatewayError;
    use bitcoin::Txid;
    use std::str::FromStr;

    const NESTED_WITNESS_SIGNED: &str = "02000000000101266715d8a3aab35fabf484f8e98a68396473ed59f0ec76dddc350ec8d5c9033800000000171600147e6e0170c81cf74bb9a433a2f905546a2766c98bfeffffff0210270000000000001976a914d6c331c38a8b4c966397c4862f86bcfe42cd924588ac6ccdae000000000017a914336b360ddbaf7dd99716bf1c2b92ad233ca9e2aa870247304402200d6fafc20ec2d1a52b62bf6130bbb22678e14c11dec18eea997483cd1cf9340a02201b88b3508454ae7ccf1ccef245f6eafaee6209b5f55bb2c27b17de44d20db67a012103fe6fb3175dd133e95bb8312ef0ad87017cb12f5b62b59fc2dd4b2e39690b2bf3fa2f1700";
    const PREV_TX: &str = "3803c9d5c80e35dcdd76ecf059ed736439688ae9f884f4ab5fb3aaa3d8156726";
    const OWNER: &str = "2MyXNsXWUYmhVth3Rm6DWrDnpfiia79UsPk";

    fn scripts() -> ScriptBuilder {
        ScriptBuilder::new(AddressCodec::new(NetworkKind::Testnet), true)
    }

    fn hints() -> Vec<Vin> {
        vec![Vin::new(PREV_TX, 0, 11_466_020, OWNER)]
    }

    fn data() -> Vec<u8> {
        hex::decode(NESTED_WITNESS_SIGNED).unwrap()
    }

    fn assert_known_decode(decoded: &DecodedTransaction) {
        assert_eq!(
            decoded.tx_hash.as_deref(),
            Some("c2247fb66cf44652f27552b052a7d359d48a1c8e90a50651f6104a441041963f")
        );
        assert_eq!(decoded.fee, 168);
        assert_eq!(
            decoded.vouts,
            vec![
                Vout::new("n16WjT35Tt33QHtySf31SB3M3bFFBSPU9w", 10_000, 0),
                Vout::new("2Mww6tED1opzwN2D3rqqKW9z6BdLstdRFpL", 11_455_852, 1),
            ]
        );
        assert_eq!(decoded.sign_hashes.len(), 1);
        assert_eq!(
            hex::encode(decoded.sign_hashes[0]),
            "61946e95671a258120ef31f6c19c6d80f9d4c2e040b985d1e02d9a5740dbfaf8"
        );
    }

    #[tokio::test]
    async fn test_offline_signed_decode() {
        let decoder = TxDecoder::new(scripts(), None);
        let decoded = decoder.decode(&data(), &hints(), true).await.unwrap();
        assert_known_decode(&decoded);
        assert_eq!(decoded.vins, hints());
    }

    #[tokio::test]
    async fn test_online_decode_matches_offline() {
        let chain = MockChainQuery::new();
        chain.add_funding_output(Txid::from_str(PREV_TX).unwrap(), 0, 11_466_020, OWNER);
        let decoder = TxDecoder::new(scripts(), Some(&chain));
        let decoded = decoder.decode(&data(), &[], true).await.unwrap();
        assert_known_decode(&decoded);
        assert_eq!(decoded.vins, hints());
        assert_eq!(chain.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_unsigned_decode_has_no_hash() {
        let decoder = TxDecoder::new(scripts(), None);
        let decoded = decoder.decode(&data(), &hints(), false).await.unwrap();
        assert!(decoded.tx_hash.is_none());
        assert_eq!(decoded.fee, 168);
    }

    #[tokio::test]
    async fn test_hint_count_mismatch() {
        let decoder = TxDecoder::new(scripts(), None);
        let mut two = hints();
        two.push(hints()[0].clone());
        let err = decoder.decode(&data(), &two, false).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Transaction(TransactionError::HintCountMismatch { hints: 2, inputs: 1 })
        ));
    }

    #[tokio::test]
    async fn test_hint_outpoint_mismatch() {
        let decoder = TxDecoder::new(scripts(), None);
        let mut wrong = hints();
        wrong[0].index = 1;
        assert!(decoder.decode(&data(), &wrong, false).await.is_err());

        let mut backfilled = hints();
        backfilled[0].hash.clear();
        backfilled[0].index = 0;
        let decoded = decoder.decode(&data(), &backfilled, false).await.unwrap();
        assert_eq!(decoded.vins[0].hash, PREV_TX);
    }

    #[tokio::test]
    async fn test_online_without_chain() {
        let decoder = TxDecoder::new(scripts(), None);
        let err = decoder.decode(&data(), &[], false).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ChainQuery(ChainQueryError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_corrupted_bytes_rejected() {
        let decoder = TxDecoder::new(scripts(), None);

        let mut trailing = data();
        trailing.extend_from_slice(&[0x1d, 0x34, 0x76]);
        assert!(decoder.decode(&trailing, &hints(), false).await.is_err());

        let truncated = &data()[..40];
        assert!(decoder.decode(truncated, &hints(), false).await.is_err());
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_amount() {
        let decoder = TxDecoder::new(scripts(), None);
        let mut wrong = hints();
        wrong[0].amount += 1;
        let err = decoder.decode(&data(), &wrong, true).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Transaction(TransactionError::VerificationFailed { .. })
        ));
    }

    #[test]
    fn test_outpoints() {
        let parsed = ParsedTx::parse(&data()).unwrap();
        assert_eq!(parsed.outpoints(), vec![Vin::outpoint(PREV_TX, 0)]);
    }
}
