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

use alloy_primitives::{hex, Bytes};
use anyhow::Context;
use clap::Args;
use relayer_sim::ValidationSettings;

/// CLI options for operation validation
#[derive(Args, Debug)]
#[command(next_help_heading = "SIMULATION")]
pub struct SimArgs {
    /// Hex file with the deployed bytecode that replaces the entry point during `simulateValidation`
    #[arg(
        long = "sim.simulations_bytecode",
        name = "sim.simulations_bytecode",
        env = "SIM_SIMULATIONS_BYTECODE"
    )]
    simulations_bytecode: Option<String>,

    #[arg(
        long = "sim.max_verification_gas",
        name = "sim.max_verification_gas",
        env = "SIM_MAX_VERIFICATION_GAS",
        default_value = "5000000"
    )]
    max_verification_gas: u64,
}

impl SimArgs {
    pub fn validation_settings(&self) -> ValidationSettings {
        ValidationSettings {
            max_verification_gas: self.max_verification_gas,
        }
    }

    pub fn simulations_code(&self) -> anyhow::Result<Option<Bytes>> {
        let Some(path) = &self.simulations_bytecode else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("should read simulations bytecode from {path}"))?;
        let code = hex::decode(contents.trim()).context("simulations bytecode should be hex")?;
        Ok(Some(code.into()))
    }
}
