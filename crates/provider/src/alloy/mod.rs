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

use std::time::Duration;

use alloy_provider::RootProvider;
use alloy_rpc_client::ClientBuilder;
use alloy_transport::layers::RetryBackoffLayer;
use anyhow::Context;
use evm::AlloyEvmProvider;
use layer::ProviderClientLayer;
use url::Url;

pub(crate) mod entry_point;
pub(crate) mod evm;
mod layer;

/// Create a new alloy evm provider from a given RPC URL
pub fn new_alloy_evm_provider(
    rpc_url: &str,
    provider_client_timeout_seconds: u64,
) -> anyhow::Result<AlloyEvmProvider<RootProvider>> {
    let provider = new_alloy_provider(rpc_url, provider_client_timeout_seconds)?;
    Ok(AlloyEvmProvider::new(provider))
}

/// Create a new alloy provider from a given RPC URL
///
/// Requests are retried with backoff on rate limits and time out on the client
/// side after `provider_client_timeout_seconds`.
pub fn new_alloy_provider(
    rpc_url: &str,
    provider_client_timeout_seconds: u64,
) -> anyhow::Result<RootProvider> {
    let url = Url::parse(rpc_url).context("invalid rpc url")?;
    let retry_layer = RetryBackoffLayer::new(10, 500, 1_000_000);
    let client_layer =
        ProviderClientLayer::new(Duration::from_secs(provider_client_timeout_seconds));
    let client = ClientBuilder::default()
        .layer(retry_layer)
        .layer(client_layer)
        .http(url);
    Ok(RootProvider::new(client))
}
