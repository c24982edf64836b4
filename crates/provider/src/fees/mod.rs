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

//! Bundle transaction fee estimation

use std::sync::Arc;

#[cfg(feature = "test-utils")]
use mockall::automock;
use relayer_types::GasFees;
use tokio::try_join;
use tracing::instrument;

use crate::EvmProvider;

mod polygon;
pub use polygon::PolygonGasStationOracle;

/// Estimates the fees of the next bundle transaction
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait FeeOracle: Send + Sync + 'static {
    /// Current max fee and max priority fee per gas
    async fn estimate_fees(&self) -> anyhow::Result<GasFees>;
}

/// Fee oracle backed by the node's fee RPC methods.
///
/// The max fee leaves room for the base fee to double before the transaction
/// is priced out.
#[derive(Debug, Clone)]
pub struct ProviderFeeOracle<P> {
    provider: P,
}

impl<P> ProviderFeeOracle<P> {
    /// Create an oracle using `provider`
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl<P: EvmProvider> FeeOracle for ProviderFeeOracle<P> {
    #[instrument(skip_all)]
    async fn estimate_fees(&self) -> anyhow::Result<GasFees> {
        let (base_fee, priority_fee) = try_join!(
            self.provider.get_pending_base_fee(),
            self.provider.get_max_priority_fee()
        )?;

        Ok(GasFees {
            max_fee_per_gas: base_fee.saturating_mul(2).saturating_add(priority_fee),
            max_priority_fee_per_gas: priority_fee,
        })
    }
}

/// Select the fee strategy for a chain.
///
/// Polygon mainnet and Amoy use the Polygon gas station, every other chain the node.
pub fn fee_oracle_for_chain<P: EvmProvider>(chain_id: u64, provider: P) -> Arc<dyn FeeOracle> {
    match PolygonGasStationOracle::for_chain(chain_id) {
        Some(oracle) => Arc::new(oracle),
        None => Arc::new(ProviderFeeOracle::new(provider)),
    }
}
