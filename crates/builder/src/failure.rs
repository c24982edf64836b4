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

//! Classification of failed operations reported by the entry point.
//!
//! `FailedOp` reasons carry an `AAxx` code. The tens digit names the part of
//! the operation that failed: `AA1x` the factory, `AA2x` the sender and
//! `AA3x` the paymaster.

use relayer_types::{
    pool::{Pool, ReputationManager},
    Entity, UserOperation,
};
use tracing::{info, warn};

/// Band of an entry point revert reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RevertBand {
    Factory,
    Sender,
    Paymaster,
    Unclassified,
}

impl RevertBand {
    pub(crate) fn from_reason(reason: &str) -> Self {
        match reason.get(..3) {
            Some("AA1") => RevertBand::Factory,
            Some("AA2") => RevertBand::Sender,
            Some("AA3") => RevertBand::Paymaster,
            _ => RevertBand::Unclassified,
        }
    }

    /// Entity of `op` implicated by this band, if the operation has it
    fn blamed_entity(self, op: &UserOperation) -> Option<Entity> {
        match self {
            RevertBand::Factory => op.factory.map(Entity::factory),
            RevertBand::Sender => Some(Entity::account(op.sender)),
            RevertBand::Paymaster => op.paymaster.map(Entity::paymaster),
            RevertBand::Unclassified => None,
        }
    }
}

/// What was done about a failed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FailureAction {
    /// A crash was reported for the entity, the operation stays pooled
    Crashed(Entity),
    /// A crash was reported for the sender and the operation was removed
    CrashedAndRemoved(Entity),
    /// The operation was removed, reputation untouched
    Removed,
}

impl FailureAction {
    pub(crate) fn for_failure(op: &UserOperation, reason: &str) -> Self {
        let band = RevertBand::from_reason(reason);
        match band.blamed_entity(op) {
            Some(entity) if band == RevertBand::Sender => FailureAction::CrashedAndRemoved(entity),
            Some(entity) => FailureAction::Crashed(entity),
            None => FailureAction::Removed,
        }
    }

    pub(crate) fn crashed_entity(&self) -> Option<Entity> {
        match self {
            FailureAction::Crashed(e) | FailureAction::CrashedAndRemoved(e) => Some(*e),
            FailureAction::Removed => None,
        }
    }

    pub(crate) fn removes_op(&self) -> bool {
        !matches!(self, FailureAction::Crashed(_))
    }
}

/// Apply the failure of `op` with `reason` to the pool and the reputation oracle.
pub(crate) fn handle_failed_op<P, R>(
    pool: &P,
    reputation: &R,
    op: &UserOperation,
    reason: &str,
) -> FailureAction
where
    P: Pool + ?Sized,
    R: ReputationManager + ?Sized,
{
    let action = FailureAction::for_failure(op, reason);
    if let Some(entity) = action.crashed_entity() {
        info!("Reporting crash of {entity} for op {:?}: {reason}", op.hash());
        reputation.report_crash(entity.address);
    }
    if action.removes_op() {
        warn!("Removing op {:?} after failed bundle: {reason}", op.hash());
        pool.remove_op(op.hash());
    }
    action
}
