//! Service-specific tests
//!
//! Communication layer behaviour driven through mocked and in-process
//! transports.


// Common test utilities for services
pub mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{broadcast, mpsc};
    use tokio::time::timeout;

    use crate::config::CommunicationConfig;
    use crate::events::Notification;
    use crate::traits::{ChannelHandle, MockTransport, Transport, TransportEvent};

    /// Standard timeout for async operations in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_millis(500);

    /// Helper to run async operations with timeout
    pub async fn with_timeout<T, F>(future: F) -> Result<T, tokio::time::error::Elapsed>
    where
        F: std::future::Future<Output = T>,
    {
        timeout(TEST_TIMEOUT, future).await
    }

    /// Millisecond-scale timings so retry and backoff are observable in tests
    pub fn fast_config() -> CommunicationConfig {
        CommunicationConfig {
            retry_interval_ms: 20,
            retry_delay_ms: 10,
            heartbeat_interval_ms: 20,
            reconnect_delay_ms: 10,
            default_max_retries: 3,
            history_limit: 100,
        }
    }

    /// Wrap a mock transport in a handle; the sender feeds its inbound side
    pub fn mock_handle(transport: MockTransport) -> (ChannelHandle, mpsc::Sender<TransportEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let transport: Arc<dyn Transport> = Arc::new(transport);
        (ChannelHandle { transport, inbound: rx }, tx)
    }

    /// Wait for the first notification matching `predicate`
    pub async fn wait_for<F>(rx: &mut broadcast::Receiver<Notification>, predicate: F) -> Notification
    where
        F: Fn(&Notification) -> bool,
    {
        with_timeout(async {
            loop {
                match rx.recv().await {
                    Ok(notification) if predicate(&notification) => return notification,
                    Ok(_) => continue,
                    Err(e) => panic!("notification stream failed: {e}"),
                }
            }
        })
        .await
        .expect("notification within timeout")
    }
}
