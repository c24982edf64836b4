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

use anyhow::Context;
use relayer_types::GasFees;
use relayer_utils::math;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use super::FeeOracle;

const POLYGON_MAINNET_CHAIN_ID: u64 = 137;
const POLYGON_AMOY_CHAIN_ID: u64 = 80002;

const POLYGON_MAINNET_GAS_STATION: &str = "https://gasstation.polygon.technology/v2";
const POLYGON_AMOY_GAS_STATION: &str = "https://gasstation.polygon.technology/amoy";

/// Fee oracle backed by the Polygon gas station API.
#[derive(Debug, Clone)]
pub struct PolygonGasStationOracle {
    client: reqwest::Client,
    url: Url,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GasStationFees {
    max_priority_fee: f64,
    max_fee: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct GasStationResponse {
    standard: GasStationFees,
}

impl PolygonGasStationOracle {
    /// Create an oracle querying the gas station at `url`
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Gas station of a Polygon chain, `None` for other chains
    pub fn for_chain(chain_id: u64) -> Option<Self> {
        let url = match chain_id {
            POLYGON_MAINNET_CHAIN_ID => POLYGON_MAINNET_GAS_STATION,
            POLYGON_AMOY_CHAIN_ID => POLYGON_AMOY_GAS_STATION,
            _ => return None,
        };
        Url::parse(url).ok().map(Self::new)
    }
}

impl From<GasStationFees> for GasFees {
    fn from(fees: GasStationFees) -> Self {
        GasFees {
            max_fee_per_gas: math::gwei_to_wei(fees.max_fee),
            max_priority_fee_per_gas: math::gwei_to_wei(fees.max_priority_fee),
        }
    }
}

#[async_trait::async_trait]
impl FeeOracle for PolygonGasStationOracle {
    #[instrument(skip_all)]
    async fn estimate_fees(&self) -> anyhow::Result<GasFees> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("gas station request failed")?
            .error_for_status()
            .context("gas station returned an error status")?
            .json::<GasStationResponse>()
            .await
            .context("gas station returned an invalid body")?;

        Ok(response.standard.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_polygon_chains() {
        assert_eq!(
            PolygonGasStationOracle::for_chain(137).unwrap().url.as_str(),
            POLYGON_MAINNET_GAS_STATION
        );
        assert_eq!(
            PolygonGasStationOracle::for_chain(80002)
                .unwrap()
                .url
                .as_str(),
            POLYGON_AMOY_GAS_STATION
        );
        assert!(PolygonGasStationOracle::for_chain(1).is_none());
    }

    #[test]
    fn parses_standard_fees_in_gwei() {
        let body = r#"{
            "safeLow": {"maxPriorityFee": 30.0, "maxFee": 30.1},
            "standard": {"maxPriorityFee": 31.5, "maxFee": 40.25},
            "fast": {"maxPriorityFee": 35.0, "maxFee": 45.0},
            "estimatedBaseFee": 8.75,
            "blockTime": 2,
            "blockNumber": 55000000
        }"#;
        let response: GasStationResponse = serde_json::from_str(body).unwrap();
        let fees: GasFees = response.standard.into();
        assert_eq!(fees.max_priority_fee_per_gas, 31_500_000_000);
        assert_eq!(fees.max_fee_per_gas, 40_250_000_000);
    }
}
