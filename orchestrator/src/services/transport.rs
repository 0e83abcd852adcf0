//! In-process channel transport
//!
//! A pair of tokio mpsc queues standing in for a socket between the
//! orchestrator and a worker pool living in the same process. Closing one
//! end delivers `TransportEvent::Closed` to the other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use shared::Domain;
use tokio::sync::mpsc;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{ChannelHandle, Transport, TransportEvent};

const DEFAULT_CAPACITY: usize = 256;

pub struct InProcessTransport {
    domain: Domain,
    peer: mpsc::Sender<TransportEvent>,
    open: AtomicBool,
}

impl InProcessTransport {
    /// Two connected ends: (orchestrator side, worker side)
    pub fn pair(domain: Domain) -> (ChannelHandle, ChannelHandle) {
        Self::pair_with_capacity(domain, DEFAULT_CAPACITY)
    }

    pub fn pair_with_capacity(domain: Domain, capacity: usize) -> (ChannelHandle, ChannelHandle) {
        let (to_worker, worker_inbound) = mpsc::channel(capacity.max(1));
        let (to_orchestrator, orchestrator_inbound) = mpsc::channel(capacity.max(1));

        let orchestrator_side = ChannelHandle {
            transport: Arc::new(Self::new(domain, to_worker)),
            inbound: orchestrator_inbound,
        };
        let worker_side = ChannelHandle {
            transport: Arc::new(Self::new(domain, to_orchestrator)),
            inbound: worker_inbound,
        };
        (orchestrator_side, worker_side)
    }

    fn new(domain: Domain, peer: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            domain,
            peer,
            open: AtomicBool::new(true),
        }
    }

    fn ensure_open(&self) -> OrchestratorResult<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(OrchestratorError::transport(self.domain, "transport closed"));
        }
        if self.peer.is_closed() {
            return Err(OrchestratorError::transport(self.domain, "peer dropped"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn transmit(&self, frame: String) -> OrchestratorResult<()> {
        self.ensure_open()?;
        self.peer
            .send(TransportEvent::Frame(frame))
            .await
            .map_err(|_| OrchestratorError::transport(self.domain, "peer dropped"))
    }

    async fn ping(&self) -> OrchestratorResult<()> {
        self.ensure_open()
    }

    async fn close(&self) -> OrchestratorResult<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            // Peer may already be gone
            let _ = self.peer.send(TransportEvent::Closed).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_the_pair() {
        let (orchestrator, mut worker) = InProcessTransport::pair(Domain::Quality);
        orchestrator.transport.transmit("hello".to_string()).await.unwrap();
        assert_eq!(worker.inbound.recv().await, Some(TransportEvent::Frame("hello".to_string())));
    }

    #[tokio::test]
    async fn test_close_notifies_peer_and_blocks_sends() {
        let (orchestrator, mut worker) = InProcessTransport::pair(Domain::Quality);
        orchestrator.transport.close().await.unwrap();

        assert_eq!(worker.inbound.recv().await, Some(TransportEvent::Closed));
        assert!(orchestrator.transport.transmit("late".to_string()).await.is_err());
        assert!(orchestrator.transport.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_ping_fails_when_peer_dropped() {
        let (orchestrator, worker) = InProcessTransport::pair(Domain::Security);
        drop(worker);
        assert!(orchestrator.transport.ping().await.is_err());
    }
}
