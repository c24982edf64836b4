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
    task::{Context, Poll},
    time::{Duration, Instant},
};

use alloy_json_rpc::{RequestPacket, ResponsePacket};
use alloy_transport::{TransportError, TransportFut};
use tower::{Layer, Service};

/// Applies a client side timeout to requests and records per method metrics.
#[derive(Debug, Clone)]
pub(crate) struct ProviderClientLayer {
    timeout: Duration,
}

impl ProviderClientLayer {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for ProviderClientLayer {
    type Service = ProviderClientService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ProviderClientService {
            service,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ProviderClientService<S> {
    service: S,
    timeout: Duration,
}

impl<S> Service<RequestPacket> for ProviderClientService<S>
where
    S: Service<RequestPacket, Response = ResponsePacket, Error = TransportError>
        + Send
        + Sync
        + Clone
        + 'static,
    S::Future: Send + 'static,
{
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = TransportFut<'static>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: RequestPacket) -> Self::Future {
        let method = method_name(&request);
        let timeout = self.timeout;
        let response = self.service.call(request);

        Box::pin(async move {
            let start = Instant::now();
            let result = match tokio::time::timeout(timeout, response).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::local_usage_str(
                    "provider request timeout from client side",
                )),
            };

            metrics::counter!("provider_requests", "method" => method.clone()).increment(1);
            metrics::histogram!("provider_request_duration_ms", "method" => method.clone())
                .record(start.elapsed().as_millis() as f64);
            if result.is_err() {
                metrics::counter!("provider_request_errors", "method" => method).increment(1);
            }
            result
        })
    }
}

fn method_name(request: &RequestPacket) -> String {
    match request {
        RequestPacket::Single(req) => req.method().to_string(),
        RequestPacket::Batch(_) => "batch".to_string(),
    }
}
