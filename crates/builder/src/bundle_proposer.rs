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

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use metrics::{Counter, Histogram};
use metrics_derive::Metrics;
#[cfg(test)]
use mockall::automock;
use relayer_provider::{EntryPoint, EvmProvider, ProviderError};
use relayer_sim::Validator;
use relayer_types::{
    pool::{Pool, PoolOperation, ReputationManager, ReputationStatus},
    StorageMap, UserOperation, ValidationOutput,
};
use relayer_utils::emit::EventEmitter;
use tracing::{debug, info, warn};

use crate::emit::{BuilderEvent, OpRejectionReason, SkipReason};

/// A bundle of operations ready to be sent to the entry point
#[derive(Debug, Default, Clone)]
pub(crate) struct Bundle {
    pub(crate) ops: Vec<UserOperation>,
    /// Expected storage of every account the operations read during validation
    pub(crate) storage_map: StorageMap,
    /// Sum of `preOpGas + callGasLimit` over `ops`
    pub(crate) total_gas: u128,
}

impl Bundle {
    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn op_hashes(&self) -> Vec<B256> {
        self.ops.iter().map(UserOperation::hash).collect()
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait BundleProposer: Send + Sync + 'static {
    /// Select operations from the pool for the next bundle.
    ///
    /// Banned and invalid operations found along the way are removed from
    /// the pool. An empty bundle is not an error.
    async fn make_bundle(&self) -> BundleProposerResult<Bundle>;
}

pub(crate) type BundleProposerResult<T> = std::result::Result<T, BundleProposerError>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum BundleProposerError {
    #[error(transparent)]
    ProviderError(#[from] ProviderError),
    /// All other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    /// Ceiling on the summed `preOpGas + callGasLimit` of a bundle
    pub(crate) max_bundle_gas: u128,
    /// Operations a single paymaster or factory may have in one bundle
    pub(crate) throttled_entity_bundle_count: usize,
    pub(crate) conditional_rpc: bool,
    /// Pin deployed senders to their storage root instead of individual slots
    pub(crate) merge_to_account_root_hash: bool,
}

pub(crate) struct BundleProposerImpl<P, R, V, E, EP> {
    pool: Arc<P>,
    reputation: Arc<R>,
    validator: V,
    entry_point: E,
    provider: EP,
    settings: Settings,
    event_sender: EventEmitter<BuilderEvent>,
    metrics: BuilderProposerMetrics,
}

#[async_trait]
impl<P, R, V, E, EP> BundleProposer for BundleProposerImpl<P, R, V, E, EP>
where
    P: Pool,
    R: ReputationManager,
    V: Validator,
    E: EntryPoint,
    EP: EvmProvider,
{
    async fn make_bundle(&self) -> BundleProposerResult<Bundle> {
        let start = Instant::now();
        // snapshot for the whole pass, ops added meanwhile wait for the next one
        let candidates = self.pool.sorted_for_inclusion();
        let known_senders = self.pool.known_senders();
        let mut context = ProposalContext::default();

        debug!("Proposing bundle from {} candidate ops", candidates.len());

        for po in candidates {
            if let Considered::Stop = self.consider_op(&po, &known_senders, &mut context).await? {
                break;
            }
        }

        let bundle = context.bundle;
        self.metrics
            .proposal_time_ms
            .record(start.elapsed().as_millis() as f64);
        self.metrics.bundle_ops.record(bundle.ops.len() as f64);
        if !bundle.is_empty() {
            info!(
                "Proposed bundle with {} ops and {} gas",
                bundle.ops.len(),
                bundle.total_gas
            );
        }
        Ok(bundle)
    }
}

/// Outcome of looking at a single candidate
enum Considered {
    Admitted,
    Skipped,
    Stop,
}

impl<P, R, V, E, EP> BundleProposerImpl<P, R, V, E, EP>
where
    P: Pool,
    R: ReputationManager,
    V: Validator,
    E: EntryPoint,
    EP: EvmProvider,
{
    pub(crate) fn new(
        pool: Arc<P>,
        reputation: Arc<R>,
        validator: V,
        entry_point: E,
        provider: EP,
        settings: Settings,
        event_sender: EventEmitter<BuilderEvent>,
    ) -> Self {
        let metrics = BuilderProposerMetrics::new_with_labels(&[(
            "entry_point",
            entry_point.address().to_string(),
        )]);
        Self {
            pool,
            reputation,
            validator,
            entry_point,
            provider,
            settings,
            event_sender,
            metrics,
        }
    }

    async fn consider_op(
        &self,
        po: &PoolOperation,
        known_senders: &HashSet<Address>,
        context: &mut ProposalContext,
    ) -> BundleProposerResult<Considered> {
        let op = &po.uo;
        let op_hash = op.hash();

        if let Some(entity) = op
            .staked_entities()
            .find(|e| self.reputation.status(e.address) == ReputationStatus::Banned)
        {
            self.reject_op(op_hash, OpRejectionReason::EntityBanned { entity });
            return Ok(Considered::Skipped);
        }

        if let Some(entity) = op.staked_entities().find(|e| {
            self.is_reputation_throttled(e.address)
                || context.is_count_over_cap(e.address, self.settings.throttled_entity_bundle_count)
        }) {
            self.skip_op(op_hash, SkipReason::Throttled { entity });
            return Ok(Considered::Skipped);
        }

        if context.senders.contains(&op.sender) {
            self.skip_op(op_hash, SkipReason::SenderInBundle);
            return Ok(Considered::Skipped);
        }

        let output = match self
            .validator
            .validate(op.clone(), Some(po.referenced_contracts.clone()), true)
            .await
        {
            Ok(output) => output,
            Err(error) if !error.is_rejection() => {
                warn!("Failed to revalidate op {op_hash:?}, keeping it for a later bundle: {error:#}");
                self.skip_op(
                    op_hash,
                    SkipReason::Other {
                        reason: Arc::new(format!("{error:#}")),
                    },
                );
                return Ok(Considered::Skipped);
            }
            Err(error) => {
                self.reject_op(
                    op_hash,
                    OpRejectionReason::FailedRevalidation {
                        error: Arc::new(error.to_string()),
                    },
                );
                return Ok(Considered::Skipped);
            }
        };

        if let Some(other_sender) = output
            .storage_map
            .addresses()
            .find(|a| **a != op.sender && known_senders.contains(*a))
        {
            self.skip_op(
                op_hash,
                SkipReason::AccessedOtherSender {
                    other_sender: *other_sender,
                },
            );
            return Ok(Considered::Skipped);
        }

        let gas = output.bundle_gas(op.call_gas_limit);
        let total_gas = context.bundle.total_gas.saturating_add(gas);
        if total_gas > self.settings.max_bundle_gas {
            self.skip_op(op_hash, SkipReason::BundleGasLimit);
            return Ok(Considered::Stop);
        }

        let remaining_deposit = match op.paymaster {
            Some(paymaster) => {
                let Some(deposit) = self.paymaster_deposit(paymaster, op_hash, context).await?
                else {
                    return Ok(Considered::Skipped);
                };
                if deposit < output.required_prefund {
                    self.skip_op(
                        op_hash,
                        SkipReason::InsufficientDeposit {
                            paymaster,
                            required: output.required_prefund,
                            remaining: deposit,
                        },
                    );
                    return Ok(Considered::Skipped);
                }
                Some((paymaster, deposit - output.required_prefund))
            }
            None => None,
        };

        let Some(op_storage) = self.op_storage(op, &output).await? else {
            self.skip_op(
                op_hash,
                SkipReason::Other {
                    reason: Arc::new("failed to get sender storage root".to_string()),
                },
            );
            return Ok(Considered::Skipped);
        };
        if let Err(conflict) = context.bundle.storage_map.check_merge(&op_storage) {
            self.skip_op(op_hash, SkipReason::StorageConflict(conflict));
            return Ok(Considered::Skipped);
        }

        // every check passed, commit the op to the bundle
        if let Some((paymaster, remaining)) = remaining_deposit {
            context.paymaster_deposits.insert(paymaster, remaining);
        }
        for entity in op.staked_entities() {
            context.increment_count(entity.address);
        }
        context
            .bundle
            .storage_map
            .merge(&op_storage)
            .map_err(anyhow::Error::from)?;
        context.senders.insert(op.sender);
        context.bundle.ops.push(op.clone());
        context.bundle.total_gas = total_gas;
        Ok(Considered::Admitted)
    }

    /// Remaining deposit of a paymaster in this bundle, fetched on first use.
    ///
    /// Returns `None` if the deposit could not be read, after skipping the op.
    async fn paymaster_deposit(
        &self,
        paymaster: Address,
        op_hash: B256,
        context: &mut ProposalContext,
    ) -> BundleProposerResult<Option<U256>> {
        if let Some(deposit) = context.paymaster_deposits.get(&paymaster) {
            return Ok(Some(*deposit));
        }
        match self.entry_point.balance_of(paymaster, None).await {
            Ok(deposit) => {
                context.paymaster_deposits.insert(paymaster, deposit);
                Ok(Some(deposit))
            }
            Err(error) if error.is_method_not_found() => Err(error.into()),
            Err(error) => {
                warn!("Failed to get deposit of paymaster {paymaster:?}: {error}");
                self.skip_op(
                    op_hash,
                    SkipReason::Other {
                        reason: Arc::new(format!("failed to get paymaster deposit: {error}")),
                    },
                );
                Ok(None)
            }
        }
    }

    /// Storage the bundle transaction is conditioned on for this op.
    ///
    /// Returns `None` if the sender's storage root was needed but could not be read.
    async fn op_storage(
        &self,
        op: &UserOperation,
        output: &ValidationOutput,
    ) -> BundleProposerResult<Option<StorageMap>> {
        let mut storage = output.storage_map.clone();
        if self.settings.conditional_rpc
            && self.settings.merge_to_account_root_hash
            && op.factory.is_none()
        {
            match self.provider.get_storage_root(op.sender).await {
                Ok(root) => storage.set_root_hash(op.sender, root),
                Err(error) if error.is_method_not_found() => return Err(error.into()),
                Err(error) => {
                    warn!("Failed to get storage root of {:?}: {error}", op.sender);
                    return Ok(None);
                }
            }
        }
        Ok(Some(storage))
    }

    fn is_reputation_throttled(&self, address: Address) -> bool {
        self.reputation.status(address) == ReputationStatus::Throttled
    }

    fn skip_op(&self, op_hash: B256, reason: SkipReason) {
        debug!("Skipping op {op_hash:?}: {reason}");
        self.metrics.ops_skipped.increment(1);
        self.event_sender
            .emit(BuilderEvent::SkippedOp { op_hash, reason });
    }

    fn reject_op(&self, op_hash: B256, reason: OpRejectionReason) {
        info!("Removing op {op_hash:?} from pool: {reason}");
        self.pool.remove_op(op_hash);
        self.metrics.ops_rejected.increment(1);
        self.event_sender
            .emit(BuilderEvent::RejectedOp { op_hash, reason });
    }
}

/// Accounting for a single proposal pass, dropped when the pass ends
#[derive(Debug, Default)]
struct ProposalContext {
    bundle: Bundle,
    senders: HashSet<Address>,
    paymaster_deposits: HashMap<Address, U256>,
    staked_entity_count: HashMap<Address, usize>,
}

impl ProposalContext {
    fn is_count_over_cap(&self, address: Address, cap: usize) -> bool {
        self.staked_entity_count
            .get(&address)
            .is_some_and(|count| *count >= cap)
    }

    fn increment_count(&mut self, address: Address) {
        *self.staked_entity_count.entry(address).or_default() += 1;
    }
}

#[derive(Metrics)]
#[metrics(scope = "builder_proposer")]
struct BuilderProposerMetrics {
    #[metric(describe = "the number of ops skipped while proposing bundles.")]
    ops_skipped: Counter,
    #[metric(describe = "the number of ops removed from the pool while proposing bundles.")]
    ops_rejected: Counter,
    #[metric(describe = "the number of ops in proposed bundles.")]
    bundle_ops: Histogram,
    #[metric(describe = "the time to propose a bundle in milliseconds.")]
    proposal_time_ms: Histogram,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use alloy_primitives::Bytes;
    use relayer_provider::{MockEntryPoint, MockEvmProvider};
    use relayer_sim::MockValidator;
    use relayer_types::{
        pool::{MockPool, MockReputationManager},
        AccountStorage, Entity, ReferencedContracts, UserOperationBuilder,
        UserOperationRequiredFields, ValidationError,
    };
    use tokio::sync::broadcast;

    use super::*;

    const EP: Address = Address::repeat_byte(0xee);
    const PAYMASTER: Address = Address::repeat_byte(0xaa);
    const FACTORY: Address = Address::repeat_byte(0xbb);

    #[derive(Clone, Copy, Debug)]
    enum Revalidation {
        Valid,
        Rejected,
        CodeChanged,
        Unavailable,
    }

    #[derive(Clone, Debug)]
    struct MockOp {
        sender: Address,
        nonce: u64,
        paymaster: Option<Address>,
        factory: Option<Address>,
        call_gas_limit: u128,
        pre_op_gas: u128,
        prefund: U256,
        storage: StorageMap,
        revalidation: Revalidation,
    }

    impl MockOp {
        fn op(&self) -> UserOperation {
            let mut builder = UserOperationBuilder::new(
                EP,
                1,
                UserOperationRequiredFields {
                    sender: self.sender,
                    nonce: U256::from(self.nonce),
                    call_gas_limit: self.call_gas_limit,
                    max_fee_per_gas: 10,
                    max_priority_fee_per_gas: 1,
                    ..Default::default()
                },
            );
            if let Some(factory) = self.factory {
                builder = builder.factory(factory, Bytes::new());
            }
            if let Some(paymaster) = self.paymaster {
                builder = builder.paymaster(paymaster, 0, 0, Bytes::new());
            }
            builder.build()
        }

        fn paymaster(mut self, paymaster: Address) -> Self {
            self.paymaster = Some(paymaster);
            self
        }

        fn factory(mut self, factory: Address) -> Self {
            self.factory = Some(factory);
            self
        }

        fn nonce(mut self, nonce: u64) -> Self {
            self.nonce = nonce;
            self
        }

        fn gas(mut self, pre_op_gas: u128, call_gas_limit: u128) -> Self {
            self.pre_op_gas = pre_op_gas;
            self.call_gas_limit = call_gas_limit;
            self
        }

        fn slot(mut self, address: Address, slot: u8, value: u8) -> Self {
            self.storage
                .insert_slot(address, B256::repeat_byte(slot), B256::repeat_byte(value));
            self
        }

        fn revalidation(mut self, revalidation: Revalidation) -> Self {
            self.revalidation = revalidation;
            self
        }
    }

    fn mock_op(sender: u8) -> MockOp {
        MockOp {
            sender: Address::repeat_byte(sender),
            nonce: 0,
            paymaster: None,
            factory: None,
            call_gas_limit: 100_000,
            pre_op_gas: 50_000,
            prefund: U256::from(1000),
            storage: StorageMap::new(),
            revalidation: Revalidation::Valid,
        }
    }

    fn settings() -> Settings {
        Settings {
            max_bundle_gas: 5_000_000,
            throttled_entity_bundle_count: 4,
            conditional_rpc: false,
            merge_to_account_root_hash: false,
        }
    }

    type TestProposer = BundleProposerImpl<
        MockPool,
        MockReputationManager,
        MockValidator,
        MockEntryPoint,
        MockEvmProvider,
    >;

    struct Harness {
        proposer: TestProposer,
        removed: Arc<Mutex<Vec<B256>>>,
        events: broadcast::Receiver<relayer_utils::emit::WithEntryPoint<BuilderEvent>>,
    }

    impl Harness {
        fn removed(&self) -> Vec<B256> {
            self.removed.lock().unwrap().clone()
        }

        fn skipped(&mut self) -> Vec<(B256, SkipReason)> {
            let mut skipped = vec![];
            while let Ok(event) = self.events.try_recv() {
                if let BuilderEvent::SkippedOp { op_hash, reason } = event.event {
                    skipped.push((op_hash, reason));
                }
            }
            skipped
        }
    }

    fn create_proposer(
        ops: &[MockOp],
        statuses: HashMap<Address, ReputationStatus>,
        deposits: HashMap<Address, U256>,
        settings: Settings,
        provider: MockEvmProvider,
    ) -> Harness {
        let pool_ops = ops
            .iter()
            .map(|m| {
                Arc::new(PoolOperation {
                    uo: m.op(),
                    entry_point: EP,
                    referenced_contracts: ReferencedContracts::default(),
                    added_at: Instant::now(),
                })
            })
            .collect::<Vec<_>>();
        let known_senders = ops.iter().map(|m| m.sender).collect::<HashSet<_>>();
        let by_hash = ops
            .iter()
            .map(|m| (m.op().hash(), m.clone()))
            .collect::<HashMap<_, _>>();

        let removed = Arc::new(Mutex::new(vec![]));
        let mut pool = MockPool::new();
        pool.expect_sorted_for_inclusion()
            .returning(move || pool_ops.clone());
        pool.expect_known_senders()
            .returning(move || known_senders.clone());
        let r = removed.clone();
        pool.expect_remove_op().returning(move |hash| {
            r.lock().unwrap().push(hash);
            true
        });

        let mut reputation = MockReputationManager::new();
        reputation
            .expect_status()
            .returning(move |a| statuses.get(&a).copied().unwrap_or(ReputationStatus::Ok));

        let mut validator = MockValidator::new();
        validator.expect_validate().returning(move |op, _, second_pass| {
            assert!(second_pass);
            let m = &by_hash[&op.hash()];
            match m.revalidation {
                Revalidation::Valid => Ok(ValidationOutput {
                    pre_op_gas: m.pre_op_gas,
                    required_prefund: m.prefund,
                    storage_map: m.storage.clone(),
                    referenced_contracts: ReferencedContracts::default(),
                }),
                Revalidation::Rejected => Err(ValidationError::Revert {
                    reason: "AA23 reverted".to_string(),
                }),
                Revalidation::CodeChanged => Err(ValidationError::CodeHashChanged),
                Revalidation::Unavailable => {
                    Err(ValidationError::Other(anyhow::anyhow!("connection refused")))
                }
            }
        });

        let mut entry_point = MockEntryPoint::new();
        entry_point.expect_address().return_const(EP);
        entry_point
            .expect_balance_of()
            .returning(move |a, _| Ok(deposits.get(&a).copied().unwrap_or_default()));

        let (tx, events) = broadcast::channel(1000);
        let proposer = BundleProposerImpl::new(
            Arc::new(pool),
            Arc::new(reputation),
            validator,
            entry_point,
            provider,
            settings,
            EventEmitter::new(EP, tx),
        );
        Harness {
            proposer,
            removed,
            events,
        }
    }

    fn simple_proposer(ops: &[MockOp]) -> Harness {
        create_proposer(
            ops,
            HashMap::new(),
            HashMap::new(),
            settings(),
            MockEvmProvider::new(),
        )
    }

    fn hashes(ops: &[MockOp]) -> Vec<B256> {
        ops.iter().map(|m| m.op().hash()).collect()
    }

    fn assert_invariants(bundle: &Bundle, settings: &Settings) {
        let senders = bundle.ops.iter().map(|op| op.sender).collect::<HashSet<_>>();
        assert_eq!(senders.len(), bundle.ops.len(), "duplicate sender in bundle");
        assert!(bundle.total_gas <= settings.max_bundle_gas);

        let mut counts: HashMap<Entity, usize> = HashMap::new();
        for op in &bundle.ops {
            for entity in op.staked_entities() {
                *counts.entry(entity).or_default() += 1;
            }
        }
        assert!(counts
            .values()
            .all(|c| *c <= settings.throttled_entity_bundle_count));
    }

    #[tokio::test]
    async fn distinct_senders_all_included_in_pool_order() {
        let ops = (1..=5).map(mock_op).collect::<Vec<_>>();
        let harness = simple_proposer(&ops);

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), hashes(&ops));
        assert_eq!(bundle.total_gas, 5 * 150_000);
        assert!(harness.removed().is_empty());
        assert_invariants(&bundle, &settings());
    }

    #[tokio::test]
    async fn second_op_of_sender_skipped() {
        let ops = vec![mock_op(1), mock_op(1).nonce(1), mock_op(2)];
        let mut harness = simple_proposer(&ops);

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), vec![ops[0].op().hash(), ops[2].op().hash()]);
        assert!(harness.removed().is_empty());
        let skipped = harness.skipped();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].0, ops[1].op().hash());
        assert!(matches!(skipped[0].1, SkipReason::SenderInBundle));
    }

    #[tokio::test]
    async fn unfunded_paymaster_skipped_every_pass() {
        let ops = vec![mock_op(1).paymaster(PAYMASTER), mock_op(2)];
        let mut harness = create_proposer(
            &ops,
            HashMap::new(),
            HashMap::from([(PAYMASTER, U256::ZERO)]),
            settings(),
            MockEvmProvider::new(),
        );

        for _ in 0..2 {
            let bundle = harness.proposer.make_bundle().await.unwrap();
            assert_eq!(bundle.op_hashes(), vec![ops[1].op().hash()]);
            let skipped = harness.skipped();
            assert!(matches!(
                skipped[..],
                [(hash, SkipReason::InsufficientDeposit { paymaster, .. })]
                    if hash == ops[0].op().hash() && paymaster == PAYMASTER
            ));
        }
        assert!(harness.removed().is_empty());
    }

    #[tokio::test]
    async fn paymaster_deposit_spent_across_ops() {
        let ops = (1..=3)
            .map(|i| mock_op(i).paymaster(PAYMASTER))
            .collect::<Vec<_>>();
        let mut harness = create_proposer(
            &ops,
            HashMap::new(),
            HashMap::from([(PAYMASTER, U256::from(2500))]),
            settings(),
            MockEvmProvider::new(),
        );

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), hashes(&ops[..2]));
        assert!(matches!(
            harness.skipped()[..],
            [(_, SkipReason::InsufficientDeposit { remaining, .. })] if remaining == U256::from(500)
        ));
    }

    #[tokio::test]
    async fn banned_entities_removed_and_excluded() {
        let banned_factory = Address::repeat_byte(0xcc);
        let ops = vec![
            mock_op(1).paymaster(PAYMASTER),
            mock_op(2).factory(banned_factory),
            mock_op(3),
        ];
        let harness = create_proposer(
            &ops,
            HashMap::from([
                (PAYMASTER, ReputationStatus::Banned),
                (banned_factory, ReputationStatus::Banned),
            ]),
            HashMap::new(),
            settings(),
            MockEvmProvider::new(),
        );

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), vec![ops[2].op().hash()]);
        assert_eq!(harness.removed(), hashes(&ops[..2]));
    }

    #[tokio::test]
    async fn throttled_entity_skipped_not_removed() {
        let ops = vec![mock_op(1).paymaster(PAYMASTER), mock_op(2)];
        let mut harness = create_proposer(
            &ops,
            HashMap::from([(PAYMASTER, ReputationStatus::Throttled)]),
            HashMap::from([(PAYMASTER, U256::MAX)]),
            settings(),
            MockEvmProvider::new(),
        );

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), vec![ops[1].op().hash()]);
        assert!(harness.removed().is_empty());
        assert!(matches!(
            harness.skipped()[..],
            [(_, SkipReason::Throttled { entity })] if entity == Entity::paymaster(PAYMASTER)
        ));
    }

    #[tokio::test]
    async fn entity_capped_per_bundle() {
        let ops = (1..=6)
            .map(|i| mock_op(i).factory(FACTORY))
            .collect::<Vec<_>>();
        let mut harness = simple_proposer(&ops);

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), hashes(&ops[..4]));
        assert!(harness.removed().is_empty());
        assert_eq!(harness.skipped().len(), 2);
        assert_invariants(&bundle, &settings());
    }

    #[tokio::test]
    async fn entity_cap_is_configurable() {
        let ops = (1..=3)
            .map(|i| mock_op(i).paymaster(PAYMASTER))
            .collect::<Vec<_>>();
        let settings = Settings {
            throttled_entity_bundle_count: 1,
            ..settings()
        };
        let harness = create_proposer(
            &ops,
            HashMap::new(),
            HashMap::from([(PAYMASTER, U256::MAX)]),
            settings,
            MockEvmProvider::new(),
        );

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), hashes(&ops[..1]));
        assert_invariants(&bundle, &settings);
    }

    #[tokio::test]
    async fn gas_ceiling_stops_scan() {
        let ops = vec![
            mock_op(1),
            mock_op(2),
            mock_op(3),
            // would fit, but scanning stops at the first op over the ceiling
            mock_op(4).gas(1_000, 1_000),
        ];
        let settings = Settings {
            max_bundle_gas: 400_000,
            ..settings()
        };
        let mut harness = create_proposer(
            &ops,
            HashMap::new(),
            HashMap::new(),
            settings,
            MockEvmProvider::new(),
        );

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), hashes(&ops[..2]));
        assert_eq!(bundle.total_gas, 300_000);
        assert_invariants(&bundle, &settings);
        assert!(matches!(
            harness.skipped()[..],
            [(hash, SkipReason::BundleGasLimit)] if hash == ops[2].op().hash()
        ));
    }

    #[tokio::test]
    async fn failed_revalidation_removes_op() {
        let ops = vec![
            mock_op(1).revalidation(Revalidation::Rejected),
            mock_op(2),
        ];
        let harness = simple_proposer(&ops);

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), vec![ops[1].op().hash()]);
        assert_eq!(harness.removed(), vec![ops[0].op().hash()]);
    }

    #[tokio::test]
    async fn changed_code_on_revalidation_removes_op() {
        let ops = vec![
            mock_op(1),
            mock_op(2).revalidation(Revalidation::CodeChanged),
        ];
        let harness = simple_proposer(&ops);

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), vec![ops[0].op().hash()]);
        assert_eq!(harness.removed(), vec![ops[1].op().hash()]);
    }

    #[tokio::test]
    async fn unavailable_revalidation_keeps_op() {
        let ops = vec![
            mock_op(1).revalidation(Revalidation::Unavailable),
            mock_op(2),
        ];
        let harness = simple_proposer(&ops);

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), vec![ops[1].op().hash()]);
        assert!(harness.removed().is_empty());
    }

    #[tokio::test]
    async fn op_touching_other_sender_skipped() {
        let other = Address::repeat_byte(2);
        let ops = vec![mock_op(1).slot(other, 1, 1), mock_op(2)];
        let mut harness = simple_proposer(&ops);

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), vec![ops[1].op().hash()]);
        assert!(harness.removed().is_empty());
        assert!(matches!(
            harness.skipped()[..],
            [(_, SkipReason::AccessedOtherSender { other_sender })] if other_sender == other
        ));
    }

    #[tokio::test]
    async fn own_storage_is_not_a_conflict() {
        let ops = vec![mock_op(1).slot(Address::repeat_byte(1), 1, 1)];
        let harness = simple_proposer(&ops);

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), hashes(&ops));
        assert_eq!(bundle.storage_map.len(), 1);
    }

    #[tokio::test]
    async fn conflicting_expected_storage_skipped() {
        let token = Address::repeat_byte(0x70);
        let ops = vec![
            mock_op(1).slot(token, 1, 1),
            mock_op(2).slot(token, 1, 2),
            mock_op(3).slot(token, 2, 2),
        ];
        let mut harness = simple_proposer(&ops);

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.op_hashes(), vec![ops[0].op().hash(), ops[2].op().hash()]);
        let AccountStorage::Slots(slots) = bundle.storage_map.get(&token).unwrap() else {
            panic!("expected slots");
        };
        assert_eq!(slots.len(), 2);
        assert!(matches!(
            harness.skipped()[..],
            [(_, SkipReason::StorageConflict(_))]
        ));
    }

    #[tokio::test]
    async fn rescan_of_unchanged_pool_is_identical() {
        let ops = vec![
            mock_op(1).paymaster(PAYMASTER),
            mock_op(1).nonce(1),
            mock_op(2).factory(FACTORY).slot(Address::repeat_byte(0x70), 1, 1),
            mock_op(3).slot(Address::repeat_byte(1), 1, 1),
            mock_op(4).paymaster(PAYMASTER),
        ];
        let harness = create_proposer(
            &ops,
            HashMap::new(),
            HashMap::from([(PAYMASTER, U256::from(1500))]),
            settings(),
            MockEvmProvider::new(),
        );

        let first = harness.proposer.make_bundle().await.unwrap();
        let second = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(first.op_hashes(), second.op_hashes());
        assert_eq!(first.storage_map, second.storage_map);
        assert_eq!(first.total_gas, second.total_gas);
        assert_eq!(first.ops.len(), 2);
    }

    #[tokio::test]
    async fn deployed_sender_pinned_to_root_hash() {
        let deployed = mock_op(1).slot(Address::repeat_byte(1), 1, 1);
        let undeployed = mock_op(2)
            .factory(FACTORY)
            .slot(Address::repeat_byte(2), 1, 1);
        let mut provider = MockEvmProvider::new();
        provider
            .expect_get_storage_root()
            .withf(|a| *a == Address::repeat_byte(1))
            .times(1)
            .returning(|_| Ok(B256::repeat_byte(0xff)));
        let settings = Settings {
            conditional_rpc: true,
            merge_to_account_root_hash: true,
            ..settings()
        };
        let harness = create_proposer(
            &[deployed, undeployed],
            HashMap::new(),
            HashMap::new(),
            settings,
            provider,
        );

        let bundle = harness.proposer.make_bundle().await.unwrap();
        assert_eq!(bundle.ops.len(), 2);
        assert_eq!(
            bundle.storage_map.get(&Address::repeat_byte(1)),
            Some(&AccountStorage::RootHash(B256::repeat_byte(0xff)))
        );
        assert!(matches!(
            bundle.storage_map.get(&Address::repeat_byte(2)),
            Some(AccountStorage::Slots(_))
        ));
    }

    #[tokio::test]
    async fn unsupported_storage_root_method_is_fatal() {
        let mut provider = MockEvmProvider::new();
        provider.expect_get_storage_root().returning(|_| {
            Err(ProviderError::Rpc {
                code: -32601,
                message: "the method eth_getProof does not exist".to_string(),
                data: None,
            })
        });
        let settings = Settings {
            conditional_rpc: true,
            merge_to_account_root_hash: true,
            ..settings()
        };
        let harness = create_proposer(&[mock_op(1)], HashMap::new(), HashMap::new(), settings, provider);

        let err = harness.proposer.make_bundle().await.unwrap_err();
        assert!(matches!(err, BundleProposerError::ProviderError(e) if e.is_method_not_found()));
    }
}
