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

mod local;

use alloy_consensus::{SignableTransaction, TxEnvelope, TypedTransaction};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, B256};
use alloy_signer::Signature;
use anyhow::{bail, Context};
pub(crate) use local::*;
use metrics::Gauge;
use metrics_derive::Metrics;
use relayer_provider::{EvmProvider, TransactionRequest};
use relayer_utils::math;

#[async_trait::async_trait]
pub(crate) trait Signer: Send + Sync {
    fn address(&self) -> Address;

    fn chain_id(&self) -> u64;

    async fn sign_hash(&self, hash: &B256) -> anyhow::Result<Signature>;

    /// Sign an EIP-1559 request, returning the encoded transaction and its nonce.
    ///
    /// The request must already carry its nonce, gas limit and fees.
    async fn fill_and_sign(&self, mut tx: TransactionRequest) -> anyhow::Result<(Bytes, u64)> {
        tx = tx.from(self.address());
        tx.chain_id = Some(self.chain_id());

        let nonce = tx
            .nonce
            .context("nonce should be set when transaction is filled")?;

        let TypedTransaction::Eip1559(tx_1559) = tx
            .build_typed_tx()
            .map_err(|_| anyhow::anyhow!("bundle transaction request is incomplete"))?
        else {
            bail!("transaction is not eip1559");
        };

        let tx_hash = tx_1559.signature_hash();
        let signature = self
            .sign_hash(&tx_hash)
            .await
            .context("should sign transaction before sending")?;

        let signed: TxEnvelope = tx_1559.into_signed(signature).into();
        let mut encoded = vec![];
        signed.encode_2718(&mut encoded);

        Ok((encoded.into(), nonce))
    }
}

#[derive(Metrics)]
#[metrics(scope = "bundle_builder")]
struct BuilderMetric {
    #[metric(describe = "the balance of the bundle signer in ether.")]
    account_balance: Gauge,
}

pub(crate) async fn monitor_account_balance<P: EvmProvider>(addr: Address, provider: P) {
    let metric = BuilderMetric::new_with_labels(&[("addr", format!("{addr:?}"))]);
    loop {
        match provider.get_balance(addr, None).await {
            Ok(balance) => {
                let eth_balance = math::saturating_u128(balance) as f64 / 1e18;
                tracing::debug!("account {addr:?} balance: {}", eth_balance);
                metric.account_balance.set(eth_balance);
            }
            Err(err) => {
                tracing::error!("Get account {addr:?} balance error {err:?}");
            }
        };
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    }
}
