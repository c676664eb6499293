use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    time::sleep,
};

use crate::{client::Shared, ApiResponse, PipelineError, RequestSpec, Result, Transport};

/// A queued call and the channel its outcome goes back on.
pub(crate) struct PendingRequest {
    pub spec: RequestSpec,
    pub reply: oneshot::Sender<Result<ApiResponse>>,
}

/// FIFO front of the single dispatcher task.
///
/// Only the pump ever calls the transport for queued requests, so at most
/// one of them is in flight at any time.
#[derive(Clone, Debug)]
pub(crate) struct Throttler {
    tx: mpsc::UnboundedSender<PendingRequest>,
}

impl Throttler {
    /// Spawns the pump on `handle`. It stops once every `Throttler` clone is dropped.
    pub fn start<T: Transport>(shared: Arc<Shared<T>>, handle: &Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(pump(shared, rx));
        Self { tx }
    }

    pub async fn enqueue(&self, spec: RequestSpec) -> Result<ApiResponse> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(PendingRequest { spec, reply })
            .map_err(|_| PipelineError::Closed)?;
        outcome.await.map_err(|_| PipelineError::Closed)?
    }
}

async fn pump<T: Transport>(shared: Arc<Shared<T>>, mut rx: mpsc::UnboundedReceiver<PendingRequest>) {
    while let Some(PendingRequest { spec, reply }) = rx.recv().await {
        let cache_key = spec.cache_key();

        if let Some(hit) = cache_key.as_deref().and_then(|key| shared.cache.get(key)) {
            deliver(reply, Ok(hit));
            sleep(shared.options.cache_hit_delay).await;
            continue;
        }

        // Dispatch runs in its own task so a panicking transport cannot take
        // the pump down with it.
        let task_shared = Arc::clone(&shared);
        let task_spec = spec.clone();
        let outcome = match tokio::spawn(async move { task_shared.dispatch(&task_spec).await }).await {
            Ok(outcome) => outcome,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(method = %spec.method, path = %spec.path, error = %err, "dispatch task failed");
                Err(PipelineError::Dispatch(err.to_string()))
            }
        };

        if let (Ok(response), Some(key)) = (&outcome, cache_key) {
            if response.is_success() {
                shared.cache.set(key, response.clone());
            }
        }

        deliver(reply, outcome);
        sleep(shared.options.queue_delay).await;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("request queue closed");
}

fn deliver(reply: oneshot::Sender<Result<ApiResponse>>, outcome: Result<ApiResponse>) {
    if reply.send(outcome).is_err() {
        #[cfg(feature = "tracing")]
        tracing::debug!("caller went away before its response was ready");
    }
}
