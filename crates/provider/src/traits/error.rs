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

use alloy_primitives::Bytes;
use alloy_transport::TransportError;

/// JSON-RPC error code for a method the node does not serve
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

/// Result of a provider method call
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Error enumeration for the Provider trait
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The node answered with a JSON-RPC error
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Error code
        code: i64,
        /// Error message
        message: String,
        /// Revert data, when the error carries any
        data: Option<Bytes>,
    },
    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    /// Revert data attached to the error, if any
    pub fn revert_data(&self) -> Option<&Bytes> {
        match self {
            ProviderError::Rpc { data, .. } => data.as_ref(),
            ProviderError::Other(_) => None,
        }
    }

    /// Whether the node does not support the requested method
    pub fn is_method_not_found(&self) -> bool {
        match self {
            ProviderError::Rpc { code, message, .. } => {
                let message = message.to_lowercase();
                *code == METHOD_NOT_FOUND_CODE
                    || message.contains("method not found")
                    || (message.contains("method") && message.contains("does not exist"))
            }
            ProviderError::Other(_) => false,
        }
    }
}

impl From<TransportError> for ProviderError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ErrorResp(payload) => ProviderError::Rpc {
                code: payload.code,
                data: payload.as_revert_data(),
                message: payload.message.to_string(),
            },
            other => ProviderError::Other(other.into()),
        }
    }
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
    fn detects_unsupported_method() {
        assert!(rpc(-32601, "whatever").is_method_not_found());
        assert!(rpc(-32000, "the method eth_sendRawTransactionConditional does not exist/is not available").is_method_not_found());
        assert!(!rpc(-32000, "execution reverted").is_method_not_found());
        assert!(!ProviderError::Other(anyhow::anyhow!("method not found")).is_method_not_found());
    }
}
