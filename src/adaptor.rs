//! Chain adaptor traits
//!
//! Each chain family implements [`ChainAdaptor`] and, for UTXO chains,
//! [`UtxoChainAdaptor`]. Every operation has a default implementation that
//! returns [`GatewayError::UnsupportedOperation`], so an adaptor only
//! overrides what its chain supports.

use async_trait::async_trait;

use crate::data_structures::*;
use crate::errors::{GatewayError, GatewayResult};

#[async_trait]
pub trait ChainAdaptor: Send + Sync {
    /// Chain identifier, e.g. `"btc"`
    fn chain_name(&self) -> &str;

    async fn convert_address(
        &self,
        _req: &ConvertAddressRequest,
    ) -> GatewayResult<ConvertAddressReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn valid_address(&self, _req: &ValidAddressRequest) -> GatewayResult<ValidAddressReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn query_gas_price(&self) -> GatewayResult<QueryGasPriceReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn broadcast_transaction(
        &self,
        _req: &BroadcastTransactionRequest,
    ) -> GatewayResult<BroadcastTransactionReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn get_latest_block_height(&self) -> GatewayResult<LatestBlockHeightReply> {
        Err(GatewayError::UnsupportedOperation)
    }
}

#[async_trait]
pub trait UtxoChainAdaptor: ChainAdaptor {
    async fn create_utxo_transaction(
        &self,
        _req: &CreateUtxoTransactionRequest,
    ) -> GatewayResult<CreateUtxoTransactionReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn create_utxo_signed_transaction(
        &self,
        _req: &CreateUtxoSignedTransactionRequest,
    ) -> GatewayResult<CreateSignedTransactionReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn query_utxo_transaction_from_data(
        &self,
        _req: &DecodeTransactionRequest,
    ) -> GatewayResult<QueryUtxoTransactionReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn query_utxo_transaction_from_signed_data(
        &self,
        _req: &DecodeTransactionRequest,
    ) -> GatewayResult<QueryUtxoTransactionReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn verify_utxo_signed_transaction(
        &self,
        _req: &VerifySignedTransactionRequest,
    ) -> GatewayResult<VerifySignedTransactionReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn query_utxo(&self, _req: &QueryUtxoRequest) -> GatewayResult<QueryUtxoReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn query_utxo_ins_from_data(
        &self,
        _req: &QueryUtxoInsFromDataRequest,
    ) -> GatewayResult<QueryUtxoInsFromDataReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    async fn query_utxo_transaction(
        &self,
        _req: &QueryTransactionRequest,
    ) -> GatewayResult<QueryUtxoTransactionReply> {
        Err(GatewayError::UnsupportedOperation)
    }

    /// Every transaction of the block at `height`, inputs left unresolved
    async fn get_utxo_transactions_by_height(
        &self,
        _height: u64,
    ) -> GatewayResult<Vec<QueryUtxoTransactionReply>> {
        Err(GatewayError::UnsupportedOperation)
    }
}

/// Adaptor for chains this crate does not implement
#[derive(Debug, Clone)]
pub struct UnsupportedChainAdaptor {
    chain: String,
}

impl UnsupportedChainAdaptor {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
        }
    }
}

#[async_trait]
impl ChainAdaptor for UnsupportedChainAdaptor {
    fn chain_name(&self) -> &str {
        &self.chain
    }
}

#[async_trait]
impl UtxoChainAdaptor for UnsupportedChainAdaptor {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[tokio::test]
    async fn test_fallback_answers_unsupported() {
        let adaptor = UnsupportedChainAdaptor::new("eth");
        assert_eq!(adaptor.chain_name(), "eth");

        let err = adaptor
            .create_utxo_transaction(&CreateUtxoTransactionRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let reply = respond(
            adaptor
                .valid_address(&ValidAddressRequest {
                    address: "0xabc".to_string(),
                })
                .await,
        );
        assert_eq!(reply.code, ReturnCode::Error);
        assert_eq!(reply.msg, "unsupported operation");
        assert!(adaptor.get_utxo_transactions_by_height(1).await.is_err());
    }
}
