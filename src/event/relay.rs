use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
#[cfg(test)]
use mockall::automock;
use tonic::async_trait;
use tonic::transport::Endpoint;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::EventStreamer;
use crate::proto::relay::relay_service_client::RelayServiceClient;
use crate::proto::relay::FetchReconfigureEventsRequest;
use crate::utils::async_task::with_jitter;
use crate::BackoffPolicy;
use crate::NetworkError;
use crate::Result;

/// Stream of relay pulses, one item per reconfigure event
pub type RelayStream = BoxStream<'static, Result<()>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RelayClient: Send + Sync + 'static {
    /// Opens `FetchReconfigureEvents` for `cluster_id`
    async fn subscribe(
        &self,
        cluster_id: &str,
    ) -> Result<RelayStream>;
}

/// tonic client for `kong.relay.v1.RelayService`
#[derive(Debug, Clone)]
pub struct GrpcRelayClient {
    endpoint: String,
    connect_timeout: Duration,
    keep_alive_interval: Duration,
}

impl GrpcRelayClient {
    pub fn new(
        endpoint: String,
        connect_timeout: Duration,
        keep_alive_interval: Duration,
    ) -> Self {
        Self {
            endpoint,
            connect_timeout,
            keep_alive_interval,
        }
    }
}

#[async_trait]
impl RelayClient for GrpcRelayClient {
    async fn subscribe(
        &self,
        cluster_id: &str,
    ) -> Result<RelayStream> {
        let channel = Endpoint::try_from(self.endpoint.clone())
            .map_err(|e| NetworkError::InvalidURI(format!("{}: {}", self.endpoint, e)))?
            .connect_timeout(self.connect_timeout)
            .http2_keep_alive_interval(self.keep_alive_interval)
            .connect()
            .await
            .map_err(|e| NetworkError::TonicError(Box::new(e)))?;

        let response = RelayServiceClient::new(channel)
            .fetch_reconfigure_events(FetchReconfigureEventsRequest {
                cluster_id: cluster_id.to_string(),
            })
            .await
            .map_err(|status| NetworkError::TonicStatusError(Box::new(status)))?;

        let stream = response.into_inner().map(|item| {
            item.map(|_| ())
                .map_err(|status| NetworkError::TonicStatusError(Box::new(status)).into())
        });
        Ok(stream.boxed())
    }
}

/// Keeps a relay subscription open for one cluster, re-establishing it
/// with exponential backoff until cancelled.
pub struct RelayListener {
    client: Arc<dyn RelayClient>,
    streamer: Arc<EventStreamer>,
    cluster_id: String,
    policy: BackoffPolicy,
}

impl RelayListener {
    pub fn new(
        client: Arc<dyn RelayClient>,
        streamer: Arc<EventStreamer>,
        cluster_id: String,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            client,
            streamer,
            cluster_id,
            policy,
        }
    }

    pub async fn run(
        self,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let subscribed = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.client.subscribe(&self.cluster_id) => result,
            };

            match subscribed {
                Ok(stream) => {
                    info!(cluster_id = %self.cluster_id, "relay stream established");
                    attempt = 0;
                    if self.consume(stream, &cancel).await {
                        break;
                    }
                }
                Err(e) => {
                    let e = NetworkError::RelaySetupFailed(e.to_string());
                    warn!(cluster_id = %self.cluster_id, attempt, "{}", e);
                }
            }

            let delay = with_jitter(self.policy.delay_for(attempt));
            attempt = attempt.saturating_add(1);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(cluster_id = %self.cluster_id, "relay listener stopped");
        Ok(())
    }

    /// Forwards events until the stream ends or fails. Returns true when
    /// cancelled.
    async fn consume(
        &self,
        mut stream: RelayStream,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return true,
                item = stream.next() => item,
            };
            match item {
                Some(Ok(())) => {
                    debug!(cluster_id = %self.cluster_id, "relay reconfigure event");
                    self.streamer.notify(&self.cluster_id);
                }
                Some(Err(e)) => {
                    warn!(cluster_id = %self.cluster_id, "relay stream failed, re-establishing: {:?}", e);
                    return false;
                }
                None => {
                    info!(cluster_id = %self.cluster_id, "relay stream ended, re-establishing");
                    return false;
                }
            }
        }
    }
}
