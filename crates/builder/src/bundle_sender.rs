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

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, B256, U256};
use anyhow::anyhow;
use async_trait::async_trait;
use metrics::{Counter, Histogram};
use metrics_derive::Metrics;
#[cfg(test)]
use mockall::automock;
use relayer_provider::{EntryPoint, EvmProvider, FeeOracle, HandleOpsOut, ProviderError};
use relayer_types::{
    builder::SentBundle,
    pool::{ChainReconciler, Pool, ReputationManager},
    GasFees,
};
use relayer_utils::{emit::EventEmitter, handle::with_deadline};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{
    bundle_proposer::{Bundle, BundleProposer, BundleProposerError},
    emit::{BuilderEvent, OpRejectionReason},
    failure,
    sender::{TransactionSender, TxSenderError, TxStatus},
};

/// Runs bundle cycles, one at a time.
#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait BundleSender: Send + Sync + 'static {
    /// Reconcile the pool, assemble a bundle and submit it.
    ///
    /// Returns the sent bundle, or `None` when nothing was sent: the bundle was
    /// empty, a failed operation was handled, or a recoverable error was
    /// logged. Errors are fatal to the cycle, such as a missing RPC method or
    /// the cycle timing out.
    async fn run_cycle(&self) -> anyhow::Result<Option<SentBundle>>;
}

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    /// Receives the bundle fees while the signer is funded
    pub(crate) beneficiary: Address,
    /// Signer balance at or below which fees are paid to the signer instead
    pub(crate) min_signer_balance: U256,
    /// Gas limit of the bundle transaction
    pub(crate) bundle_gas_limit: u64,
    pub(crate) cycle_timeout: Duration,
    pub(crate) receipt_poll_interval: Duration,
    /// Conditional broadcasts are not waited on and their ops stay pooled
    /// until the reconciler sees them included
    pub(crate) conditional_rpc: bool,
}

pub(crate) struct BundleSenderImpl<BP, P, R, E, EP, T> {
    proposer: BP,
    reconciler: Arc<dyn ChainReconciler>,
    pool: Arc<P>,
    reputation: Arc<R>,
    entry_point: E,
    provider: EP,
    sender: T,
    fee_oracle: Arc<dyn FeeOracle>,
    settings: Settings,
    event_sender: EventEmitter<BuilderEvent>,
    cycle_lock: Mutex<()>,
    metrics: BuilderMetric,
}

#[async_trait]
impl<BP, P, R, E, EP, T> BundleSender for BundleSenderImpl<BP, P, R, E, EP, T>
where
    BP: BundleProposer,
    P: Pool,
    R: ReputationManager,
    E: EntryPoint,
    EP: EvmProvider,
    T: TransactionSender,
{
    async fn run_cycle(&self) -> anyhow::Result<Option<SentBundle>> {
        let _guard = self.cycle_lock.lock().await;
        let start = std::time::Instant::now();
        let result = with_deadline("bundle cycle", self.settings.cycle_timeout, self.cycle()).await;
        self.metrics
            .cycle_time_ms
            .record(start.elapsed().as_millis() as f64);
        if result.is_err() {
            self.metrics.cycle_errors.increment(1);
        }
        result
    }
}

/// Outcome of a single attempt that did not send a bundle
type Step<T> = anyhow::Result<Result<T, Skip>>;

/// The cycle stopped early without an error
struct Skip;

impl<BP, P, R, E, EP, T> BundleSenderImpl<BP, P, R, E, EP, T>
where
    BP: BundleProposer,
    P: Pool,
    R: ReputationManager,
    E: EntryPoint,
    EP: EvmProvider,
    T: TransactionSender,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        proposer: BP,
        reconciler: Arc<dyn ChainReconciler>,
        pool: Arc<P>,
        reputation: Arc<R>,
        entry_point: E,
        provider: EP,
        sender: T,
        fee_oracle: Arc<dyn FeeOracle>,
        settings: Settings,
        event_sender: EventEmitter<BuilderEvent>,
    ) -> Self {
        let metrics =
            BuilderMetric::new_with_labels(&[("entry_point", entry_point.address().to_string())]);
        Self {
            proposer,
            reconciler,
            pool,
            reputation,
            entry_point,
            provider,
            sender,
            fee_oracle,
            settings,
            event_sender,
            cycle_lock: Mutex::new(()),
            metrics,
        }
    }

    #[instrument(skip_all, fields(entry_point = %self.entry_point.address()))]
    async fn cycle(&self) -> anyhow::Result<Option<SentBundle>> {
        match self.reconciler.reconcile().await {
            Ok(removed) if removed > 0 => debug!("Reconciled {removed} ops with chain"),
            Ok(_) => {}
            Err(error) => {
                warn!("Failed to reconcile pool with chain, skipping cycle: {error:#}");
                return Ok(None);
            }
        }

        let bundle = match self.proposer.make_bundle().await {
            Ok(bundle) => bundle,
            Err(BundleProposerError::ProviderError(error)) => {
                return skip_unless_fatal::<()>("propose bundle", error).map(|_| None);
            }
            Err(BundleProposerError::Other(error)) => {
                warn!("Failed to propose bundle: {error:#}");
                return Ok(None);
            }
        };
        if bundle.is_empty() {
            debug!("No ops to send");
            self.metrics.empty_bundles.increment(1);
            return Ok(None);
        }

        let fees = match self.fee_oracle.estimate_fees().await {
            Ok(fees) => fees,
            Err(error) => {
                warn!("Failed to estimate bundle fees: {error:#}");
                return Ok(None);
            }
        };

        let Ok(beneficiary) = self.select_beneficiary().await? else {
            return Ok(None);
        };

        if self.dry_run(&bundle, beneficiary, fees, None).await?.is_err() {
            return Ok(None);
        }

        let nonce = match self
            .provider
            .get_transaction_count(self.sender.address())
            .await
        {
            Ok(nonce) => nonce,
            Err(error) => {
                return skip_unless_fatal::<()>("get signer nonce", error).map(|_| None)
            }
        };

        let tx = self
            .entry_point
            .get_send_bundle_transaction(
                bundle.ops.clone(),
                beneficiary,
                self.settings.bundle_gas_limit,
                fees,
            )
            .nonce(nonce);

        let sent = match self.sender.send_transaction(tx, &bundle.storage_map).await {
            Ok(sent) => sent,
            Err(error) if error.is_fatal() => {
                return Err(anyhow::Error::from(error).context("failed to send bundle"));
            }
            Err(TxSenderError::Reverted(data)) => {
                warn!("Bundle reverted on broadcast");
                self.metrics.bundle_txns_failed.increment(1);
                let out = self.entry_point.decode_handle_ops_revert(&data);
                if self.handle_ops_out(&bundle, out, None).is_ok() {
                    warn!("Broadcast revert did not name a failed op");
                }
                return Ok(None);
            }
            Err(TxSenderError::ConditionNotMet(message)) => {
                info!("Bundle storage condition not met, retrying next cycle: {message}");
                self.metrics.bundle_txns_failed.increment(1);
                return Ok(None);
            }
            Err(error) => {
                warn!("Failed to send bundle: {error:#}");
                self.metrics.bundle_txns_failed.increment(1);
                return Ok(None);
            }
        };

        let op_hashes = bundle.op_hashes();
        info!(
            "Sent bundle of {} ops in transaction {:?} with nonce {}",
            op_hashes.len(),
            sent.tx_hash,
            sent.nonce
        );
        self.metrics.bundle_txns_sent.increment(1);
        self.event_sender.emit(BuilderEvent::BundleSent {
            tx_hash: sent.tx_hash,
            nonce: sent.nonce,
            beneficiary,
            fees,
            op_hashes: Arc::new(op_hashes.clone()),
        });

        if !self.settings.conditional_rpc {
            let success = match self.wait_until_mined(sent.tx_hash).await? {
                Ok(success) => success,
                Err(Skip) => return Ok(None),
            };
            if !success {
                warn!("Bundle transaction {:?} reverted", sent.tx_hash);
                self.metrics.bundle_txns_failed.increment(1);
                // state has moved on, the dry run now points at the failed op
                if self
                    .dry_run(&bundle, beneficiary, fees, Some(sent.tx_hash))
                    .await?
                    .is_ok()
                {
                    warn!(
                        "Reverted bundle {:?} passes simulation now, nothing to blame",
                        sent.tx_hash
                    );
                }
                return Ok(None);
            }
            self.metrics.bundle_txns_success.increment(1);

            for hash in &op_hashes {
                self.pool.remove_op(*hash);
            }
        }
        // conditional bundles can still be dropped, the reconciler prunes them once included

        Ok(Some(SentBundle {
            transaction_hash: sent.tx_hash,
            user_op_hashes: op_hashes,
        }))
    }

    /// Pay the configured beneficiary unless the signer is running low on funds
    async fn select_beneficiary(&self) -> Step<Address> {
        let signer = self.sender.address();
        let balance = match self.provider.get_balance(signer, None).await {
            Ok(balance) => balance,
            Err(error) => return skip_unless_fatal("get signer balance", error),
        };
        if balance <= self.settings.min_signer_balance {
            info!(
                "Signer balance {balance} at or below {}, using signer {signer:?} as beneficiary",
                self.settings.min_signer_balance
            );
            Ok(Ok(signer))
        } else {
            Ok(Ok(self.settings.beneficiary))
        }
    }

    /// Simulate `handleOps` for the bundle and handle any failed operation.
    ///
    /// `tx_hash` is set when classifying a bundle that already reverted on chain.
    async fn dry_run(
        &self,
        bundle: &Bundle,
        beneficiary: Address,
        fees: GasFees,
        tx_hash: Option<B256>,
    ) -> Step<()> {
        let out = match self
            .entry_point
            .call_handle_ops(
                bundle.ops.clone(),
                beneficiary,
                self.sender.address(),
                self.settings.bundle_gas_limit,
                fees,
            )
            .await
        {
            Ok(out) => out,
            Err(error) => return skip_unless_fatal("dry run bundle", error),
        };

        Ok(self.handle_ops_out(bundle, out, tx_hash))
    }

    /// Classify the outcome of `handleOps` for the bundle
    fn handle_ops_out(
        &self,
        bundle: &Bundle,
        out: HandleOpsOut,
        tx_hash: Option<B256>,
    ) -> Result<(), Skip> {
        match out {
            HandleOpsOut::Success => Ok(()),
            HandleOpsOut::FailedOp(index, reason) => {
                self.metrics.bundles_reverted.increment(1);
                self.event_sender.emit(BuilderEvent::BundleReverted {
                    tx_hash,
                    reason: Arc::new(reason.clone()),
                });
                self.handle_failed_op(bundle, index, &reason);
                Err(Skip)
            }
            HandleOpsOut::Revert(data) => {
                warn!("Bundle reverted with undecodable data {data}");
                self.metrics.bundles_reverted.increment(1);
                self.event_sender.emit(BuilderEvent::BundleReverted {
                    tx_hash,
                    reason: Arc::new(data.to_string()),
                });
                Err(Skip)
            }
        }
    }

    fn handle_failed_op(&self, bundle: &Bundle, index: usize, reason: &str) {
        let Some(op) = bundle.ops.get(index) else {
            warn!(
                "Entry point blamed op {index} of a bundle of {} ops: {reason}",
                bundle.ops.len()
            );
            return;
        };
        let op_hash = op.hash();
        let action =
            failure::handle_failed_op(self.pool.as_ref(), self.reputation.as_ref(), op, reason);
        if let Some(entity) = action.crashed_entity() {
            self.metrics.entity_crashes.increment(1);
            self.event_sender
                .emit(BuilderEvent::EntityCrashed { op_hash, entity });
        }
        if action.removes_op() {
            self.event_sender.emit(BuilderEvent::RejectedOp {
                op_hash,
                reason: OpRejectionReason::FailedInBundle {
                    message: Arc::new(reason.to_string()),
                },
            });
        }
    }

    /// Poll until the transaction is mined, returning whether it succeeded
    async fn wait_until_mined(&self, tx_hash: B256) -> Step<bool> {
        loop {
            match self.sender.get_transaction_status(tx_hash).await {
                Ok(TxStatus::Mined {
                    block_number,
                    success,
                }) => {
                    debug!("Bundle transaction {tx_hash:?} mined in block {block_number}");
                    return Ok(Ok(success));
                }
                Ok(TxStatus::Pending) => {}
                Err(error) if error.is_fatal() => {
                    return Err(anyhow::Error::from(error).context("failed to get bundle receipt"));
                }
                Err(error) => warn!("Failed to get status of bundle {tx_hash:?}: {error:#}"),
            }
            tokio::time::sleep(self.settings.receipt_poll_interval).await;
        }
    }
}

/// Turn a provider failure into a fatal error or a skipped cycle
fn skip_unless_fatal<T>(what: &'static str, error: ProviderError) -> Step<T> {
    if error.is_method_not_found() {
        Err(anyhow!(error).context(format!("node does not support a method needed to {what}")))
    } else {
        warn!("Failed to {what}: {error}");
        Ok(Err(Skip))
    }
}

#[derive(Metrics)]
#[metrics(scope = "builder")]
struct BuilderMetric {
    #[metric(describe = "the count of bundle transactions already sent.")]
    bundle_txns_sent: Counter,
    #[metric(describe = "the count of bundle transactions successed.")]
    bundle_txns_success: Counter,
    #[metric(describe = "the count of failed bundle transactions.")]
    bundle_txns_failed: Counter,
    #[metric(describe = "the count of bundles with a failed op.")]
    bundles_reverted: Counter,
    #[metric(describe = "the count of crashes reported against entities.")]
    entity_crashes: Counter,
    #[metric(describe = "the count of cycles with no ops to send.")]
    empty_bundles: Counter,
    #[metric(describe = "the count of cycles aborted by an error.")]
    cycle_errors: Counter,
    #[metric(describe = "the timespan of a bundle cycle.")]
    cycle_time_ms: Histogram,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy_primitives::Bytes;
    use relayer_provider::{MockEntryPoint, MockEvmProvider, MockFeeOracle, TransactionRequest};
    use relayer_types::{
        pool::{MockChainReconciler, MockPool, MockReputationManager},
        UserOperation, UserOperationBuilder, UserOperationRequiredFields,
    };
    use relayer_utils::emit::WithEntryPoint;
    use tokio::sync::broadcast;

    use super::*;
    use crate::{
        bundle_proposer::{BundleProposerResult, MockBundleProposer},
        sender::{MockTransactionSender, SentTxInfo},
    };

    const EP: Address = Address::repeat_byte(0xee);
    const SIGNER: Address = Address::repeat_byte(0x5e);
    const BENEFICIARY: Address = Address::repeat_byte(0xbe);
    const PAYMASTER: Address = Address::repeat_byte(0xaa);
    const TX_HASH: B256 = B256::repeat_byte(0x77);

    fn op(sender: u8, paymaster: Option<Address>) -> UserOperation {
        let mut builder = UserOperationBuilder::new(
            EP,
            1,
            UserOperationRequiredFields {
                sender: Address::repeat_byte(sender),
                ..Default::default()
            },
        );
        if let Some(paymaster) = paymaster {
            builder = builder.paymaster(paymaster, 0, 0, Bytes::new());
        }
        builder.build()
    }

    fn settings() -> Settings {
        Settings {
            beneficiary: BENEFICIARY,
            min_signer_balance: U256::from(1000),
            bundle_gas_limit: 10_000_000,
            cycle_timeout: Duration::from_secs(60),
            receipt_poll_interval: Duration::from_secs(1),
            conditional_rpc: false,
        }
    }

    fn proposer_for(ops: Vec<UserOperation>) -> MockBundleProposer {
        let mut proposer = MockBundleProposer::new();
        proposer.expect_make_bundle().returning(move || {
            Ok(Bundle {
                ops: ops.clone(),
                ..Default::default()
            })
        });
        proposer
    }

    struct Mocks {
        reconciler: MockChainReconciler,
        pool: MockPool,
        reputation: MockReputationManager,
        entry_point: MockEntryPoint,
        provider: MockEvmProvider,
        sender: MockTransactionSender,
        fee_oracle: MockFeeOracle,
    }

    type TestSender<BP> = BundleSenderImpl<
        BP,
        MockPool,
        MockReputationManager,
        MockEntryPoint,
        MockEvmProvider,
        MockTransactionSender,
    >;

    impl Mocks {
        fn new() -> Self {
            let mut entry_point = MockEntryPoint::new();
            entry_point.expect_address().return_const(EP);
            entry_point
                .expect_get_send_bundle_transaction()
                .returning(|_, _, gas_limit, _| TransactionRequest::default().gas_limit(gas_limit));
            let mut sender = MockTransactionSender::new();
            sender.expect_address().return_const(SIGNER);
            let mut fee_oracle = MockFeeOracle::new();
            fee_oracle.expect_estimate_fees().returning(|| {
                Ok(GasFees {
                    max_fee_per_gas: 100,
                    max_priority_fee_per_gas: 10,
                })
            });
            let mut provider = MockEvmProvider::new();
            provider.expect_get_transaction_count().returning(|_| Ok(3));

            Self {
                reconciler: MockChainReconciler::new(),
                pool: MockPool::new(),
                reputation: MockReputationManager::new(),
                entry_point,
                provider,
                sender,
                fee_oracle,
            }
        }

        fn reconciled(mut self) -> Self {
            self.reconciler.expect_reconcile().returning(|| Ok(0));
            self
        }

        fn signer_balance(mut self, balance: u64) -> Self {
            self.provider
                .expect_get_balance()
                .returning(move |_, _| Ok(U256::from(balance)));
            self
        }

        fn dry_run(mut self, out: HandleOpsOut) -> Self {
            self.entry_point
                .expect_call_handle_ops()
                .returning(move |_, _, _, _, _| Ok(out.clone()));
            self
        }

        fn sends(mut self) -> Self {
            self.sender
                .expect_send_transaction()
                .times(1)
                .returning(|tx, _| {
                    assert_eq!(tx.nonce, Some(3));
                    Ok(SentTxInfo {
                        nonce: 3,
                        tx_hash: TX_HASH,
                    })
                });
            self
        }

        fn build<BP: BundleProposer>(
            self,
            proposer: BP,
            settings: Settings,
        ) -> (TestSender<BP>, broadcast::Receiver<WithEntryPoint<BuilderEvent>>) {
            let (tx, rx) = broadcast::channel(100);
            let sender = BundleSenderImpl::new(
                proposer,
                Arc::new(self.reconciler),
                Arc::new(self.pool),
                Arc::new(self.reputation),
                self.entry_point,
                self.provider,
                self.sender,
                Arc::new(self.fee_oracle),
                settings,
                EventEmitter::new(EP, tx),
            );
            (sender, rx)
        }
    }

    fn events(rx: &mut broadcast::Receiver<WithEntryPoint<BuilderEvent>>) -> Vec<BuilderEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event.event);
        }
        events
    }

    #[tokio::test]
    async fn empty_bundle_sends_nothing() {
        let mut mocks = Mocks::new().reconciled();
        mocks.sender.expect_send_transaction().never();
        mocks.entry_point.expect_call_handle_ops().never();
        let (sender, _) = mocks.build(proposer_for(vec![]), settings());

        assert_eq!(sender.run_cycle().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_bundle_and_removes_included_ops() {
        let ops = vec![op(1, None), op(2, None)];
        let hashes = ops.iter().map(UserOperation::hash).collect::<Vec<_>>();

        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .dry_run(HandleOpsOut::Success)
            .sends();
        let mut polls = 0;
        mocks
            .sender
            .expect_get_transaction_status()
            .returning(move |_| {
                polls += 1;
                if polls < 3 {
                    Ok(TxStatus::Pending)
                } else {
                    Ok(TxStatus::Mined {
                        block_number: 10,
                        success: true,
                    })
                }
            });
        let removed = hashes.clone();
        mocks
            .pool
            .expect_remove_op()
            .withf(move |h| removed.contains(h))
            .times(2)
            .return_const(true);
        let (sender, mut rx) = mocks.build(proposer_for(ops), settings());

        let sent = sender.run_cycle().await.unwrap().unwrap();
        assert_eq!(sent.transaction_hash, TX_HASH);
        assert_eq!(sent.user_op_hashes, hashes);
        assert!(matches!(
            events(&mut rx)[..],
            [BuilderEvent::BundleSent { beneficiary, nonce: 3, .. }] if beneficiary == BENEFICIARY
        ));
    }

    #[tokio::test]
    async fn low_signer_balance_pays_signer() {
        let mut mocks = Mocks::new().reconciled().signer_balance(1000).sends();
        mocks
            .entry_point
            .expect_call_handle_ops()
            .withf(|_, beneficiary, sender_eoa, _, _| *beneficiary == SIGNER && *sender_eoa == SIGNER)
            .returning(|_, _, _, _, _| Ok(HandleOpsOut::Success));
        let settings = Settings {
            conditional_rpc: true,
            ..settings()
        };
        let (sender, mut rx) = mocks.build(proposer_for(vec![op(1, None)]), settings);

        assert!(sender.run_cycle().await.unwrap().is_some());
        assert!(matches!(
            events(&mut rx)[..],
            [BuilderEvent::BundleSent { beneficiary, .. }] if beneficiary == SIGNER
        ));
    }

    #[tokio::test]
    async fn conditional_bundle_leaves_ops_for_reconciler() {
        let ops = vec![op(1, None), op(2, None)];
        let hashes = ops.iter().map(UserOperation::hash).collect::<Vec<_>>();
        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .dry_run(HandleOpsOut::Success)
            .sends();
        mocks.sender.expect_get_transaction_status().never();
        mocks.pool.expect_remove_op().never();
        let settings = Settings {
            conditional_rpc: true,
            ..settings()
        };
        let (sender, _) = mocks.build(proposer_for(ops), settings);

        let sent = sender.run_cycle().await.unwrap().unwrap();
        assert_eq!(sent.transaction_hash, TX_HASH);
        assert_eq!(sent.user_op_hashes, hashes);
    }

    #[tokio::test]
    async fn broadcast_failed_op_is_classified() {
        let bad = op(1, Some(PAYMASTER));
        let bad_hash = bad.hash();
        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .dry_run(HandleOpsOut::Success);
        mocks.sender.expect_send_transaction().returning(|_, _| {
            Err(ProviderError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
                data: Some(Bytes::from_static(&[0x22, 0x02, 0x55, 0x08, 0x01])),
            }
            .into())
        });
        mocks
            .entry_point
            .expect_decode_handle_ops_revert()
            .withf(|data| data.len() == 5)
            .returning(|_| HandleOpsOut::FailedOp(0, "AA31 paymaster deposit too low".to_string()));
        mocks.sender.expect_get_transaction_status().never();
        mocks
            .reputation
            .expect_report_crash()
            .withf(|a| *a == PAYMASTER)
            .times(1)
            .return_const(());
        mocks.pool.expect_remove_op().never();
        let (sender, mut rx) = mocks.build(proposer_for(vec![bad, op(2, None)]), settings());

        assert_eq!(sender.run_cycle().await.unwrap(), None);
        assert!(matches!(
            events(&mut rx)[..],
            [
                BuilderEvent::BundleReverted { tx_hash: None, .. },
                BuilderEvent::EntityCrashed { op_hash, .. }
            ] if op_hash == bad_hash
        ));
    }

    #[tokio::test]
    async fn undecodable_broadcast_revert_is_logged() {
        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .dry_run(HandleOpsOut::Success);
        mocks.sender.expect_send_transaction().returning(|_, _| {
            Err(TxSenderError::Reverted(Bytes::from_static(&[0xde, 0xad])))
        });
        mocks
            .entry_point
            .expect_decode_handle_ops_revert()
            .returning(|data| HandleOpsOut::Revert(data.clone()));
        mocks.reputation.expect_report_crash().never();
        mocks.pool.expect_remove_op().never();
        let (sender, mut rx) = mocks.build(proposer_for(vec![op(1, None)]), settings());

        assert_eq!(sender.run_cycle().await.unwrap(), None);
        assert!(matches!(
            events(&mut rx)[..],
            [BuilderEvent::BundleReverted { tx_hash: None, .. }]
        ));
    }

    #[tokio::test]
    async fn paymaster_blamed_failure_reports_crash_and_keeps_op() {
        let bad = op(1, Some(PAYMASTER));
        let bad_hash = bad.hash();
        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .dry_run(HandleOpsOut::FailedOp(
                0,
                "AA31 paymaster deposit too low".to_string(),
            ));
        mocks
            .reputation
            .expect_report_crash()
            .withf(|a| *a == PAYMASTER)
            .times(1)
            .return_const(());
        mocks.pool.expect_remove_op().never();
        mocks.sender.expect_send_transaction().never();
        let (sender, mut rx) = mocks.build(proposer_for(vec![bad, op(2, None)]), settings());

        assert_eq!(sender.run_cycle().await.unwrap(), None);
        let events = events(&mut rx);
        assert!(matches!(
            events[..],
            [
                BuilderEvent::BundleReverted { tx_hash: None, .. },
                BuilderEvent::EntityCrashed { op_hash, .. }
            ] if op_hash == bad_hash
        ));
    }

    #[tokio::test]
    async fn unrecognized_failure_removes_only_offending_op() {
        let ops = vec![op(1, Some(PAYMASTER)), op(2, Some(PAYMASTER))];
        let bad_hash = ops[1].hash();
        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .dry_run(HandleOpsOut::FailedOp(1, "AA95 out of gas".to_string()));
        mocks.reputation.expect_report_crash().never();
        mocks
            .pool
            .expect_remove_op()
            .withf(move |h| *h == bad_hash)
            .times(1)
            .return_const(true);
        mocks.sender.expect_send_transaction().never();
        let (sender, _) = mocks.build(proposer_for(ops), settings());

        assert_eq!(sender.run_cycle().await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_op_index_out_of_range_is_ignored() {
        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .dry_run(HandleOpsOut::FailedOp(5, "AA23 reverted".to_string()));
        mocks.reputation.expect_report_crash().never();
        mocks.pool.expect_remove_op().never();
        let (sender, _) = mocks.build(proposer_for(vec![op(1, None)]), settings());

        assert_eq!(sender.run_cycle().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_bundle_is_classified_after_mining() {
        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .sends();
        let mut dry_runs = 0;
        mocks
            .entry_point
            .expect_call_handle_ops()
            .times(2)
            .returning(move |_, _, _, _, _| {
                dry_runs += 1;
                if dry_runs == 1 {
                    Ok(HandleOpsOut::Success)
                } else {
                    Ok(HandleOpsOut::FailedOp(0, "AA33 reverted".to_string()))
                }
            });
        mocks.sender.expect_get_transaction_status().returning(|_| {
            Ok(TxStatus::Mined {
                block_number: 10,
                success: false,
            })
        });
        mocks
            .reputation
            .expect_report_crash()
            .withf(|a| *a == PAYMASTER)
            .times(1)
            .return_const(());
        mocks.pool.expect_remove_op().never();
        let (sender, mut rx) = mocks.build(proposer_for(vec![op(1, Some(PAYMASTER))]), settings());

        assert_eq!(sender.run_cycle().await.unwrap(), None);
        assert!(events(&mut rx)
            .iter()
            .any(|e| matches!(e, BuilderEvent::BundleReverted { tx_hash: Some(h), .. } if *h == TX_HASH)));
    }

    #[tokio::test]
    async fn unsupported_conditional_broadcast_is_fatal() {
        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .dry_run(HandleOpsOut::Success);
        mocks.sender.expect_send_transaction().returning(|_, _| {
            Err(TxSenderError::MethodNotSupported(
                "eth_sendRawTransactionConditional".to_string(),
            ))
        });
        mocks.pool.expect_remove_op().never();
        let settings = Settings {
            conditional_rpc: true,
            ..settings()
        };
        let (sender, _) = mocks.build(proposer_for(vec![op(1, None)]), settings);

        assert!(sender.run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn rejected_broadcast_is_retried_later() {
        let mut mocks = Mocks::new()
            .reconciled()
            .signer_balance(1_000_000)
            .dry_run(HandleOpsOut::Success);
        mocks
            .sender
            .expect_send_transaction()
            .returning(|_, _| Err(TxSenderError::Rejected("nonce too low".to_string())));
        mocks.pool.expect_remove_op().never();
        let (sender, _) = mocks.build(proposer_for(vec![op(1, None)]), settings());

        assert_eq!(sender.run_cycle().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unsupported_dry_run_method_is_fatal() {
        let mut mocks = Mocks::new().reconciled().signer_balance(1_000_000);
        mocks
            .entry_point
            .expect_call_handle_ops()
            .returning(|_, _, _, _, _| {
                Err(ProviderError::Rpc {
                    code: -32601,
                    message: "method not found".to_string(),
                    data: None,
                })
            });
        let (sender, _) = mocks.build(proposer_for(vec![op(1, None)]), settings());

        assert!(sender.run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn failed_reconcile_skips_cycle() {
        let mut mocks = Mocks::new();
        mocks
            .reconciler
            .expect_reconcile()
            .returning(|| Err(anyhow!("logs unavailable")));
        let mut proposer = MockBundleProposer::new();
        proposer.expect_make_bundle().never();
        let (sender, _) = mocks.build(proposer, settings());

        assert_eq!(sender.run_cycle().await.unwrap(), None);
    }

    /// Proposer that takes a while and records how many proposals overlap
    struct SlowProposer {
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BundleProposer for SlowProposer {
        async fn make_bundle(&self) -> BundleProposerResult<Bundle> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Bundle::default())
        }
    }

    fn slow_proposer(delay: Duration) -> (SlowProposer, Arc<AtomicUsize>) {
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        (
            SlowProposer {
                delay,
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: max_in_flight.clone(),
            },
            max_in_flight,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn cycles_never_overlap() {
        let (proposer, max_in_flight) = slow_proposer(Duration::from_secs(1));
        let (sender, _) = Mocks::new().reconciled().build(proposer, settings());

        let (a, b) = tokio::join!(sender.run_cycle(), sender.run_cycle());
        assert_eq!(a.unwrap(), None);
        assert_eq!(b.unwrap(), None);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_cycle_times_out() {
        let (proposer, _) = slow_proposer(Duration::from_secs(3600));
        let (sender, _) = Mocks::new().reconciled().build(proposer, settings());

        let err = sender.run_cycle().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
