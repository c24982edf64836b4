// This file is part of Relayer.
//
// Relayer is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Relayer is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Relayer.
// If not, see https://www.gnu.org/licenses/.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use relayer_provider::{ConditionalOptions, EvmProvider, TransactionRequest};
use relayer_types::StorageMap;
use tracing::debug;

use super::{Result, SentTxInfo, TransactionSender, TxStatus};
use crate::signer::Signer;

/// Broadcasts signed transactions through `eth_sendRawTransaction`, or
/// `eth_sendRawTransactionConditional` when conditional broadcast is enabled.
#[derive(Debug)]
pub(crate) struct RawTransactionSender<P, S> {
    submit_provider: P,
    signer: S,
    use_conditional_rpc: bool,
}

#[async_trait]
impl<P, S> TransactionSender for RawTransactionSender<P, S>
where
    P: EvmProvider,
    S: Signer + 'static,
{
    async fn send_transaction(
        &self,
        tx: TransactionRequest,
        storage_map: &StorageMap,
    ) -> Result<SentTxInfo> {
        let (raw_tx, nonce) = self.signer.fill_and_sign(tx).await?;

        let tx_hash = if self.use_conditional_rpc {
            debug!(
                "Sending conditional transaction with {} known accounts",
                storage_map.len()
            );
            self.submit_provider
                .send_raw_transaction_conditional(
                    raw_tx,
                    ConditionalOptions {
                        known_accounts: storage_map.clone(),
                    },
                )
                .await?
        } else {
            self.submit_provider.send_raw_transaction(raw_tx).await?
        };

        Ok(SentTxInfo { nonce, tx_hash })
    }

    async fn get_transaction_status(&self, tx_hash: B256) -> Result<TxStatus> {
        let status = match self
            .submit_provider
            .get_transaction_receipt(tx_hash)
            .await?
        {
            Some(receipt) => TxStatus::Mined {
                block_number: receipt.block_number.unwrap_or_default(),
                success: receipt.inner.status(),
            },
            None => TxStatus::Pending,
        };
        Ok(status)
    }

    fn address(&self) -> Address {
        self.signer.address()
    }
}

impl<P, S> RawTransactionSender<P, S> {
    pub(crate) fn new(submit_provider: P, signer: S, use_conditional_rpc: bool) -> Self {
        Self {
            submit_provider,
            signer,
            use_conditional_rpc,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_consensus::TxEnvelope;
    use alloy_eips::eip2718::Decodable2718;
    use alloy_primitives::Bytes;
    use alloy_signer_local::PrivateKeySigner;
    use relayer_provider::{MockEvmProvider, ProviderError};

    use super::*;
    use crate::{sender::TxSenderError, signer::LocalSigner};

    fn request() -> TransactionRequest {
        TransactionRequest::default()
            .to(Address::repeat_byte(0xee))
            .nonce(7)
            .gas_limit(1_000_000)
            .max_fee_per_gas(100)
            .max_priority_fee_per_gas(10)
    }

    fn signer() -> LocalSigner {
        LocalSigner::new(PrivateKeySigner::random(), 1)
    }

    fn assert_signed_1559(raw: &Bytes) {
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        assert!(envelope.is_eip1559());
    }

    #[tokio::test]
    async fn plain_broadcast() {
        let mut provider = MockEvmProvider::new();
        provider.expect_send_raw_transaction().times(1).returning(|raw| {
            assert_signed_1559(&raw);
            Ok(B256::repeat_byte(1))
        });
        provider.expect_send_raw_transaction_conditional().never();
        let sender = RawTransactionSender::new(provider, signer(), false);

        let sent = sender
            .send_transaction(request(), &StorageMap::new())
            .await
            .unwrap();
        assert_eq!(sent.nonce, 7);
        assert_eq!(sent.tx_hash, B256::repeat_byte(1));
    }

    #[tokio::test]
    async fn conditional_broadcast_carries_storage() {
        let mut storage = StorageMap::new();
        storage.set_root_hash(Address::repeat_byte(1), B256::repeat_byte(0xff));
        let expected = storage.clone();

        let mut provider = MockEvmProvider::new();
        provider.expect_send_raw_transaction().never();
        provider
            .expect_send_raw_transaction_conditional()
            .times(1)
            .returning(move |raw, options| {
                assert_signed_1559(&raw);
                assert_eq!(options.known_accounts, expected);
                Ok(B256::repeat_byte(2))
            });
        let sender = RawTransactionSender::new(provider, signer(), true);

        let sent = sender.send_transaction(request(), &storage).await.unwrap();
        assert_eq!(sent.tx_hash, B256::repeat_byte(2));
    }

    #[tokio::test]
    async fn unsupported_conditional_method_is_fatal() {
        let mut provider = MockEvmProvider::new();
        provider
            .expect_send_raw_transaction_conditional()
            .returning(|_, _| {
                Err(ProviderError::Rpc {
                    code: -32601,
                    message: "the method eth_sendRawTransactionConditional does not exist/is not available".to_string(),
                    data: None,
                })
            });
        let sender = RawTransactionSender::new(provider, signer(), true);

        let err = sender
            .send_transaction(request(), &StorageMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TxSenderError::MethodNotSupported(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn missing_nonce_is_an_error() {
        let provider = MockEvmProvider::new();
        let sender = RawTransactionSender::new(provider, signer(), false);
        let mut tx = request();
        tx.nonce = None;

        let err = sender
            .send_transaction(tx, &StorageMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TxSenderError::Other(_)));
    }
}
