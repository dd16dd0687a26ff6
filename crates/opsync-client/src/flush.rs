//! Queue flush against the sync gateway.
//!
//! One flush runs at a time per device; a `tokio::sync::Mutex` serializes
//! callers. The normal path is one batch `POST /sync/push`; if that
//! endpoint cannot be reached, or rejects the batch wholesale (a body
//! over the gateway's size limit, say), the flusher falls back to
//! pushing items one at a time so a single oversized backlog never
//! wedges the whole queue.

use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use opsync_core::wire::{ClientCompletion, PushRequest, PushResponse};

use crate::errors::{ClientError, Result};
use crate::queue::OfflineQueue;

/// How many pending rows a single flush will attempt.
pub const FLUSH_BATCH_LIMIT: u32 = 100;

/// Identity presented to the gateway (trusted-proxy headers).
#[derive(Clone, Debug)]
pub struct GatewayIdentity {
    /// Tenant the device belongs to.
    pub tenant_id: String,
    /// The signed-in user.
    pub user_id: String,
    /// Role string (`staff`, `manager`, `admin`).
    pub role: String,
}

/// HTTP client for the sync gateway.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    identity: GatewayIdentity,
}

impl GatewayClient {
    /// Create a client for a gateway at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, identity: GatewayIdentity) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), identity }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&self.identity.tenant_id) {
            let _ = headers.insert("x-tenant-id", v);
        }
        if let Ok(v) = HeaderValue::from_str(&self.identity.user_id) {
            let _ = headers.insert("x-user-id", v);
        }
        if let Ok(v) = HeaderValue::from_str(&self.identity.role) {
            let _ = headers.insert("x-role", v);
        }
        headers
    }

    /// Batch push.
    pub async fn push_batch(&self, req: &PushRequest) -> Result<PushResponse> {
        self.post_json("/sync/push", req).await
    }

    /// Single-item fallback push.
    pub async fn push_single(&self, item: &ClientCompletion) -> Result<PushResponse> {
        self.post_json("/sync/completions", item).await
    }

    async fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<PushResponse> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .headers(self.headers())
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClientError::GatewayStatus { status: resp.status().as_u16() });
        }
        Ok(resp.json::<PushResponse>().await?)
    }
}

/// Outcome of one flush pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Rows acknowledged (created or duplicate) and marked synced.
    pub synced: usize,
    /// Rows the gateway rejected; they stay queued with a bumped
    /// retry counter.
    pub rejected: usize,
    /// Whether the single-item fallback path was used.
    pub fallback_used: bool,
}

/// Drains the offline queue toward a gateway, one flush at a time.
pub struct Flusher {
    queue: OfflineQueue,
    gateway: GatewayClient,
    in_flight: Mutex<()>,
}

impl Flusher {
    /// Pair a queue with a gateway client.
    pub fn new(queue: OfflineQueue, gateway: GatewayClient) -> Self {
        Self { queue, gateway, in_flight: Mutex::new(()) }
    }

    /// The underlying queue, for captures.
    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Push everything pending. Partial success is normal: acknowledged
    /// rows leave the queue, rejected rows stay with their retry counter
    /// bumped, and a transport failure leaves everything still queued
    /// for the next attempt.
    pub async fn flush(&self) -> Result<FlushReport> {
        let _guard = self.in_flight.lock().await;

        let pending = self.queue.pending(FLUSH_BATCH_LIMIT)?;
        if pending.is_empty() {
            return Ok(FlushReport::default());
        }
        let items: Vec<ClientCompletion> =
            pending.into_iter().map(|row| row.completion).collect();

        let batch = PushRequest { completions: items.clone(), checklist_updates: vec![] };
        match self.gateway.push_batch(&batch).await {
            Ok(resp) => {
                let mut report = FlushReport::default();
                self.settle(&resp, &mut report)?;
                debug!(synced = report.synced, rejected = report.rejected, "batch flush settled");
                Ok(report)
            }
            Err(ClientError::Transport(err)) => {
                warn!(error = %err, "batch endpoint unreachable, falling back to single pushes");
                self.flush_one_by_one(&items).await
            }
            Err(ClientError::GatewayStatus { status }) => {
                warn!(status, "batch push rejected wholesale, falling back to single pushes");
                self.flush_one_by_one(&items).await
            }
            Err(err) => Err(err),
        }
    }

    /// Fallback: drain item by item. A transport error stops the pass
    /// (connectivity is gone); a gateway rejection of one item records
    /// the failure and moves on.
    async fn flush_one_by_one(&self, items: &[ClientCompletion]) -> Result<FlushReport> {
        let mut report = FlushReport { fallback_used: true, ..FlushReport::default() };
        for item in items {
            match self.gateway.push_single(item).await {
                Ok(resp) => self.settle(&resp, &mut report)?,
                Err(ClientError::Transport(err)) => {
                    warn!(error = %err, "transport lost mid-fallback, stopping flush");
                    break;
                }
                Err(ClientError::GatewayStatus { status }) => {
                    self.queue
                        .record_failure(&item.offline_id, &format!("HTTP {status}"))?;
                    report.rejected += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    /// Apply one gateway response to the queue: acks (created and
    /// duplicate alike) are terminal, item errors stay pending.
    fn settle(&self, resp: &PushResponse, report: &mut FlushReport) -> Result<()> {
        for ack in &resp.completions {
            self.queue.mark_synced(&ack.offline_id)?;
            report.synced += 1;
        }
        for err in &resp.errors {
            self.queue.record_failure(&err.id, &err.error)?;
            report.rejected += 1;
        }
        Ok(())
    }
}
