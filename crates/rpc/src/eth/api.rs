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

use std::sync::Arc;

use alloy_primitives::{Address, B256, U64};
use relayer_types::pool::Pool;
use tracing::{debug, instrument};

use super::error::{EthResult, EthRpcError};
use crate::types::{RpcUserOperation, RpcUserOperationByHash};

/// Settings for the `eth_` API
#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// Chain id operations are hashed for
    pub chain_id: u64,
}

pub(crate) struct EthApi<P> {
    settings: Settings,
    pool: Arc<P>,
}

impl<P> EthApi<P>
where
    P: Pool,
{
    pub(crate) fn new(settings: Settings, pool: Arc<P>) -> Self {
        Self { settings, pool }
    }

    #[instrument(skip_all)]
    pub(crate) async fn send_user_operation(
        &self,
        op: RpcUserOperation,
        entry_point: Address,
    ) -> EthResult<B256> {
        self.check_entry_point(entry_point)?;
        let op = op.into_user_operation(entry_point, self.settings.chain_id)?;

        self.pool.add_op(op).await.map_err(|error| {
            debug!("failed to add op to the mempool: {error}");
            EthRpcError::from(error)
        })
    }

    #[instrument(skip_all)]
    pub(crate) async fn get_user_operation_by_hash(
        &self,
        hash: B256,
    ) -> EthResult<Option<RpcUserOperationByHash>> {
        if hash == B256::ZERO {
            return Err(EthRpcError::InvalidParams(
                "Missing/invalid userOpHash".to_string(),
            ));
        }

        Ok(self
            .pool
            .get_op_by_hash(hash)
            .map(|po| RpcUserOperationByHash {
                user_operation: po.uo.clone().into(),
                entry_point: po.entry_point,
                block_number: None,
                block_hash: None,
                transaction_hash: None,
            }))
    }

    pub(crate) async fn supported_entry_points(&self) -> EthResult<Vec<String>> {
        Ok(vec![self.pool.entry_point().to_checksum(None)])
    }

    pub(crate) async fn chain_id(&self) -> EthResult<U64> {
        Ok(U64::from(self.settings.chain_id))
    }

    fn check_entry_point(&self, entry_point: Address) -> EthResult<()> {
        if entry_point != self.pool.entry_point() {
            return Err(EthRpcError::InvalidParams(format!(
                "entry point {entry_point} is not supported"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use alloy_primitives::Bytes;
    use relayer_types::{
        pool::{MempoolError, MockPool, PoolOperation},
        ReferencedContracts, UserOperationBuilder, UserOperationRequiredFields,
    };

    use super::*;

    const ENTRY_POINT: Address = Address::repeat_byte(0xee);

    fn rpc_op() -> RpcUserOperation {
        let op = UserOperationBuilder::new(
            ENTRY_POINT,
            1,
            UserOperationRequiredFields {
                sender: Address::repeat_byte(1),
                call_gas_limit: 50_000,
                max_fee_per_gas: 10,
                signature: Bytes::from_static(&[1]),
                ..Default::default()
            },
        )
        .build();
        op.into()
    }

    fn pool() -> MockPool {
        let mut pool = MockPool::new();
        pool.expect_entry_point().return_const(ENTRY_POINT);
        pool
    }

    #[tokio::test]
    async fn send_adds_op_to_pool() {
        let mut pool = pool();
        let expected = rpc_op().into_user_operation(ENTRY_POINT, 1).unwrap();
        let hash = expected.hash();
        pool.expect_add_op()
            .withf(move |op| op.hash() == hash)
            .returning(|op| Ok(op.hash()));
        let api = EthApi::new(Settings { chain_id: 1 }, Arc::new(pool));

        let sent = api.send_user_operation(rpc_op(), ENTRY_POINT).await.unwrap();
        assert_eq!(sent, hash);
    }

    #[tokio::test]
    async fn send_rejects_other_entry_point() {
        let mut pool = pool();
        pool.expect_add_op().never();
        let api = EthApi::new(Settings { chain_id: 1 }, Arc::new(pool));

        let result = api
            .send_user_operation(rpc_op(), Address::repeat_byte(0xaa))
            .await;
        assert!(matches!(result, Err(EthRpcError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn send_maps_pool_error() {
        let mut pool = pool();
        pool.expect_add_op()
            .returning(|_| Err(MempoolError::OperationAlreadyKnown));
        let api = EthApi::new(Settings { chain_id: 1 }, Arc::new(pool));

        let result = api.send_user_operation(rpc_op(), ENTRY_POINT).await;
        assert!(matches!(result, Err(EthRpcError::OperationAlreadyKnown)));
    }

    #[tokio::test]
    async fn get_by_hash_reads_pool() {
        let op = rpc_op().into_user_operation(ENTRY_POINT, 1).unwrap();
        let hash = op.hash();
        let po = Arc::new(PoolOperation {
            uo: op,
            entry_point: ENTRY_POINT,
            referenced_contracts: ReferencedContracts::default(),
            added_at: Instant::now(),
        });
        let mut pool = pool();
        pool.expect_get_op_by_hash()
            .returning(move |h| (h == hash).then(|| Arc::clone(&po)));
        let api = EthApi::new(Settings { chain_id: 1 }, Arc::new(pool));

        let found = api.get_user_operation_by_hash(hash).await.unwrap().unwrap();
        assert_eq!(found.user_operation, rpc_op());
        assert_eq!(found.entry_point, ENTRY_POINT);
        assert!(found.transaction_hash.is_none());
        assert!(api
            .get_user_operation_by_hash(B256::repeat_byte(9))
            .await
            .unwrap()
            .is_none());
        assert!(api.get_user_operation_by_hash(B256::ZERO).await.is_err());
    }

    #[tokio::test]
    async fn supported_entry_points_checksummed() {
        let api = EthApi::new(Settings { chain_id: 137 }, Arc::new(pool()));
        assert_eq!(
            api.supported_entry_points().await.unwrap(),
            vec![ENTRY_POINT.to_checksum(None)]
        );
        assert_eq!(api.chain_id().await.unwrap(), U64::from(137));
    }
}
