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

mod raw;

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
pub(crate) use raw::RawTransactionSender;
use relayer_provider::{ProviderError, TransactionRequest};
use relayer_types::StorageMap;

#[derive(Debug)]
pub(crate) struct SentTxInfo {
    pub(crate) nonce: u64,
    pub(crate) tx_hash: B256,
}

/// Errors from transaction senders
#[derive(Debug, thiserror::Error)]
pub(crate) enum TxSenderError {
    /// The node rejected the transaction because the expected storage no
    /// longer holds
    #[error("storage condition not met: {0}")]
    ConditionNotMet(String),
    /// The node rejected the transaction
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// Gas estimation of the transaction reverted, carrying the revert data
    #[error("transaction reverted with data {0}")]
    Reverted(Bytes),
    /// The node does not support the broadcast method
    #[error("broadcast method not supported: {0}")]
    MethodNotSupported(String),
    /// All other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TxSenderError {
    /// Errors the builder cannot recover from by retrying
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, TxSenderError::MethodNotSupported(_))
    }
}

impl From<ProviderError> for TxSenderError {
    fn from(err: ProviderError) -> Self {
        if err.is_method_not_found() {
            return TxSenderError::MethodNotSupported(err.to_string());
        }
        match err {
            ProviderError::Rpc { message, data, .. } => {
                let lowered = message.to_lowercase();
                if lowered.contains("storage") || lowered.contains("knownaccounts") {
                    TxSenderError::ConditionNotMet(message)
                } else if let Some(data) = data.filter(|d| !d.is_empty()) {
                    TxSenderError::Reverted(data)
                } else {
                    TxSenderError::Rejected(message)
                }
            }
            ProviderError::Other(e) => TxSenderError::Other(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxStatus {
    Pending,
    Mined { block_number: u64, success: bool },
}

pub(crate) type Result<T> = std::result::Result<T, TxSenderError>;

#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait TransactionSender: Send + Sync + 'static {
    /// Sign and broadcast a bundle transaction.
    ///
    /// `storage_map` is only used by senders that broadcast conditionally.
    async fn send_transaction(
        &self,
        tx: TransactionRequest,
        storage_map: &StorageMap,
    ) -> Result<SentTxInfo>;

    async fn get_transaction_status(&self, tx_hash: B256) -> Result<TxStatus>;

    /// Address of the signer, used as the transaction's sender
    fn address(&self) -> Address;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(code: i64, message: &str) -> ProviderError {
        ProviderError::Rpc {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    #[test]
    fn classify_provider_errors() {
        assert!(matches!(
            TxSenderError::from(rpc(-32601, "method not found")),
            TxSenderError::MethodNotSupported(_)
        ));
        assert!(matches!(
            TxSenderError::from(rpc(-32003, "storage slot value condition not met")),
            TxSenderError::ConditionNotMet(_)
        ));
        assert!(matches!(
            TxSenderError::from(rpc(-32000, "nonce too low")),
            TxSenderError::Rejected(_)
        ));
        assert!(matches!(
            TxSenderError::from(ProviderError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
                data: Some(Bytes::from_static(&[0x22, 0x02, 0x55, 0x08])),
            }),
            TxSenderError::Reverted(data) if data.len() == 4
        ));
        assert!(matches!(
            TxSenderError::from(ProviderError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
                data: Some(Bytes::new()),
            }),
            TxSenderError::Rejected(_)
        ));
        assert!(TxSenderError::from(rpc(-32601, "x")).is_fatal());
        assert!(!TxSenderError::from(rpc(-32000, "nonce too low")).is_fatal());
    }
}
