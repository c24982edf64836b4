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
use alloy_signer::{Signature, Signer as _};
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use relayer_provider::EvmProvider;
use relayer_utils::handle::SpawnGuard;

use super::Signer;

/// A signer holding its private key in memory
#[derive(Debug)]
pub(crate) struct LocalSigner {
    signer: PrivateKeySigner,
    chain_id: u64,
    _monitor_abort_handle: Option<SpawnGuard>,
}

impl LocalSigner {
    /// Parse `private_key` and start reporting the signer's balance
    pub(crate) fn connect<P: EvmProvider + 'static>(
        provider: P,
        chain_id: u64,
        private_key: &str,
    ) -> anyhow::Result<Self> {
        let mut signer = Self::new(
            private_key
                .parse::<PrivateKeySigner>()
                .context("should create signer")?,
            chain_id,
        );
        signer._monitor_abort_handle = Some(SpawnGuard::spawn_with_guard(
            super::monitor_account_balance(signer.address(), provider),
        ));
        Ok(signer)
    }

    pub(crate) fn new(signer: PrivateKeySigner, chain_id: u64) -> Self {
        Self {
            signer: signer.with_chain_id(Some(chain_id)),
            chain_id,
            _monitor_abort_handle: None,
        }
    }
}

#[async_trait::async_trait]
impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn sign_hash(&self, hash: &B256) -> anyhow::Result<Signature> {
        self.signer
            .sign_hash(hash)
            .await
            .context("local signer failed")
    }
}
