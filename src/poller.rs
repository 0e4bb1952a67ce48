use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::platform::{InboundUpdate, Transport, TransportError};

/// Processes a single update. An error keeps the cursor on that update.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: &InboundUpdate) -> Result<()>;
}

#[async_trait]
impl<H: UpdateHandler> UpdateHandler for Arc<H> {
    async fn handle(&self, update: &InboundUpdate) -> Result<()> {
        self.as_ref().handle(update).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    StopRequested,
    Stopped,
}

/// Drives fetch, handle and cursor advancement for one update stream.
///
/// Updates are handled strictly in order. The cursor only moves past an
/// update once its handler succeeded, so a failing update is fetched again
/// on the next poll together with everything after it.
pub struct UpdateLoop<H> {
    transport: Arc<dyn Transport>,
    handler: H,
    shutdown: CancellationToken,
    cursor: Option<u32>,
    state: LoopState,
}

impl<H: UpdateHandler> UpdateLoop<H> {
    pub fn new(transport: Arc<dyn Transport>, handler: H, shutdown: CancellationToken) -> Self {
        Self {
            transport,
            handler,
            shutdown,
            cursor: None,
            state: LoopState::Running,
        }
    }

    /// Id of the last successfully handled update
    pub fn cursor(&self) -> Option<u32> {
        self.cursor
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Poll until the shutdown token is cancelled. Cancellation is only
    /// observed between iterations.
    pub async fn run(&mut self) {
        info!("Starting update loop");
        while self.state == LoopState::Running {
            if self.shutdown.is_cancelled() {
                self.state = LoopState::StopRequested;
                info!("Stop requested at cursor {:?}", self.cursor);
            } else {
                self.poll_once().await;
            }
        }

        info!("Stopping update handling because of terminate signal");
        self.state = LoopState::Stopped;
    }

    /// One fetch and the handling of the fetched batch
    pub async fn poll_once(&mut self) {
        let updates = match self.transport.fetch_updates(self.cursor).await {
            Ok(updates) => updates,
            Err(TransportError::Throttled { retry_after }) => {
                warn!(
                    "Sent too many requests to Telegram, retrying after {}s",
                    retry_after.as_secs()
                );
                tokio::time::sleep(retry_after).await;
                return;
            }
            Err(TransportError::Timeout) => {
                warn!("Encountered timeout while getting updates");
                return;
            }
            Err(e) => {
                error!("Could not fetch updates: {}", e);
                return;
            }
        };

        self.handle_batch(updates).await;
    }

    async fn handle_batch(&mut self, updates: Vec<InboundUpdate>) {
        for update in updates {
            info!("Received update {}", update.id);
            if let Err(e) = self.handler.handle(&update).await {
                error!("Could not handle update {}: {:#}", update.id, e);
                if let Some(TransportError::Throttled { retry_after }) = e.downcast_ref::<TransportError>() {
                    warn!(
                        "Telegram throttled a reply, retrying update {} after {}s",
                        update.id,
                        retry_after.as_secs()
                    );
                    tokio::time::sleep(*retry_after).await;
                }
                return;
            }
            self.cursor = Some(update.id);
        }
    }
}
