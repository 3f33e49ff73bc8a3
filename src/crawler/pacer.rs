//! Single-lane request pacer
//!
//! Every outbound request goes through one admission loop that spaces
//! dispatch starts by a minimum interval. Each admitted request runs on its
//! own task, so a slow response never delays the next dispatch, and its
//! result is routed back through a one-shot channel created at submission.

use reqwest::{Client, Request, Response};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// A request waiting for its dispatch slot, with the channel its result goes back on
struct Submission {
    request: Request,
    reply: oneshot::Sender<Result<Response, reqwest::Error>>,
}

/// Errors surfaced by the pacer itself rather than the request
#[derive(Debug, thiserror::Error)]
pub enum PacerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("pacer is no longer running")]
    Closed,
}

/// Spaces outbound HTTP dispatches by at least `min_interval`
///
/// Cloning is cheap; every clone feeds the same admission loop.
#[derive(Clone)]
pub struct Pacer {
    client: Client,
    queue: mpsc::UnboundedSender<Submission>,
}

impl Pacer {
    /// Creates a pacer and spawns its admission loop
    ///
    /// Must be called from within a Tokio runtime. The loop exits once every
    /// clone of the returned pacer has been dropped.
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client requests are executed with
    /// * `min_interval` - Minimum spacing between two dispatch starts
    pub fn new(client: Client, min_interval: Duration) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        tokio::spawn(admission_loop(client.clone(), receiver, min_interval));

        Self { client, queue }
    }

    /// Returns the underlying client, for building requests
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Submits a request and waits for its paced response
    ///
    /// # Returns
    ///
    /// * `Ok(Response)` - The response to exactly this request
    /// * `Err(PacerError::Http)` - The request failed in transport
    /// * `Err(PacerError::Closed)` - The admission loop is gone
    pub async fn submit(&self, request: Request) -> Result<Response, PacerError> {
        let (reply, result) = oneshot::channel();

        self.queue
            .send(Submission { request, reply })
            .map_err(|_| PacerError::Closed)?;

        match result.await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => Err(PacerError::Closed),
        }
    }
}

async fn admission_loop(
    client: Client,
    mut receiver: mpsc::UnboundedReceiver<Submission>,
    min_interval: Duration,
) {
    let mut last_dispatch: Option<Instant> = None;

    while let Some(Submission { request, reply }) = receiver.recv().await {
        if let Some(last) = last_dispatch {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        last_dispatch = Some(Instant::now());

        tracing::trace!("Dispatching {} {}", request.method(), request.url());

        let client = client.clone();
        tokio::spawn(async move {
            let outcome = client.execute(request).await;
            // The caller may have given up waiting; nothing to route then
            let _ = reply.send(outcome);
        });
    }

    tracing::debug!("Pacer admission loop stopped");
}
