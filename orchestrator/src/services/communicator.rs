//! Worker communication layer
//!
//! One logical channel per domain. Messages that cannot be delivered are
//! queued and retried with growing backoff until their retry budget runs out,
//! connected channels are pinged periodically, and inbound frames are parsed
//! and forwarded to the orchestrator.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use shared::{
    process_debug, process_info, process_warn, Domain, Message, MessageType, Priority, ProcessId,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::CommunicationConfig;
use crate::events::{EventBus, Notification};
use crate::traits::{ChannelHandle, Transport, TransportEvent};

const INBOUND_CAPACITY: usize = 1024;

/// Public view of one registered channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerChannel {
    pub channel_id: String,
    pub domain: Domain,
    pub connected: bool,
    pub healthy: bool,
    pub last_activity: DateTime<Utc>,
    pub sent_count: u64,
    pub received_count: u64,
    pub established_at: DateTime<Utc>,
}

/// A message waiting for its channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedMessage {
    pub message: Message,
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub direction: Direction,
    pub domain: Domain,
    pub message_id: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommunicatorStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_queued: u64,
    pub messages_failed: u64,
    pub retries_attempted: u64,
    pub parse_errors: u64,
    pub heartbeats_sent: u64,
    pub heartbeat_failures: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunicatorMetrics {
    pub stats: CommunicatorStats,
    pub channels: Vec<WorkerChannel>,
    pub queue_depth: usize,
    pub history_len: usize,
}

/// Final outcome of a message that had to wait in the retry queue
///
/// Every queued message yields exactly one report, unless shutdown discards it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    Delivered { domain: Domain, message_id: String },
    Failed { domain: Domain, message_id: String, attempts: u32 },
}

/// Receiving ends handed to the communicator's owner
pub struct CommunicatorReceivers {
    /// Parsed non-heartbeat messages from workers
    pub inbound: mpsc::Receiver<(Domain, Message)>,
    pub deliveries: mpsc::UnboundedReceiver<DeliveryReport>,
}

struct ChannelEntry {
    info: WorkerChannel,
    transport: Arc<dyn Transport>,
    reader: JoinHandle<()>,
}

/// Shared handle; clones drive the same channels and queues
#[derive(Clone)]
pub struct WorkerCommunicator {
    config: CommunicationConfig,
    source: ProcessId,
    channels: Arc<Mutex<HashMap<Domain, ChannelEntry>>>,
    queues: Arc<Mutex<HashMap<Domain, VecDeque<QueuedMessage>>>>,
    history: Arc<Mutex<VecDeque<HistoryEntry>>>,
    stats: Arc<Mutex<CommunicatorStats>>,
    inbound: mpsc::Sender<(Domain, Message)>,
    deliveries: mpsc::UnboundedSender<DeliveryReport>,
    timers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    events: EventBus,
}

impl WorkerCommunicator {
    /// Create the communicator and the receivers for inbound traffic and delivery outcomes
    pub fn new(config: CommunicationConfig, events: EventBus) -> (Self, CommunicatorReceivers) {
        let (inbound, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (deliveries, deliveries_rx) = mpsc::unbounded_channel();
        let communicator = Self {
            config,
            source: *ProcessId::current(),
            channels: Arc::new(Mutex::new(HashMap::new())),
            queues: Arc::new(Mutex::new(HashMap::new())),
            history: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(CommunicatorStats::default())),
            inbound,
            deliveries,
            timers: Arc::new(Mutex::new(Vec::new())),
            events,
        };
        let receivers = CommunicatorReceivers {
            inbound: inbound_rx,
            deliveries: deliveries_rx,
        };
        (communicator, receivers)
    }

    /// Start the retry sweep and heartbeat loops
    pub async fn start(&self) {
        let retry = {
            let communicator = self.clone();
            let period = self.config.retry_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    communicator.process_retry_queue().await;
                }
            })
        };
        let heartbeat = {
            let communicator = self.clone();
            let period = self.config.heartbeat_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    communicator.heartbeat().await;
                }
            })
        };

        let mut timers = self.timers.lock().await;
        timers.push(retry);
        timers.push(heartbeat);
        process_debug!(ProcessId::current(), "⏱️ Retry sweep and heartbeat loops started");
    }

    /// Build a message addressed to a domain's worker pool
    pub fn message(&self, target: Domain, message_type: MessageType, payload: serde_json::Value, priority: Priority) -> Message {
        Message::new(message_type, self.source, ProcessId::Worker(target), payload, priority)
    }

    /// Send with the default retry budget
    pub async fn send(&self, target: Domain, message_type: MessageType, payload: serde_json::Value, priority: Priority) -> bool {
        let message = self.message(target, message_type, payload, priority);
        self.send_message(target, message, self.config.default_max_retries).await
    }

    /// Transmit now, or queue for retry and return false
    ///
    /// Never blocks on a missing or broken channel.
    pub async fn send_message(&self, target: Domain, message: Message, max_retries: u32) -> bool {
        match self.try_transmit(target, &message).await {
            Ok(()) => true,
            Err(reason) => {
                process_debug!(
                    ProcessId::current(),
                    "📥 Queueing message {} for {}: {}",
                    message.id,
                    target,
                    reason
                );
                self.enqueue(target, message, max_retries).await;
                false
            }
        }
    }

    /// Send to every registered domain
    pub async fn broadcast(&self, payload: serde_json::Value, priority: Priority) -> HashMap<Domain, bool> {
        let domains: Vec<Domain> = self.channels.lock().await.keys().copied().collect();
        let mut results = HashMap::with_capacity(domains.len());
        for domain in domains {
            let delivered = self.send(domain, MessageType::Broadcast, payload.clone(), priority).await;
            results.insert(domain, delivered);
        }
        results
    }

    async fn try_transmit(&self, target: Domain, message: &Message) -> Result<(), String> {
        let transport = {
            let channels = self.channels.lock().await;
            match channels.get(&target) {
                Some(entry) if entry.info.connected => entry.transport.clone(),
                Some(_) => return Err("channel disconnected".to_string()),
                None => return Err("no channel registered".to_string()),
            }
        };

        let frame = message.to_frame().map_err(|e| e.to_string())?;
        transport.transmit(frame).await.map_err(|e| e.to_string())?;

        if let Some(entry) = self.channels.lock().await.get_mut(&target) {
            entry.info.sent_count += 1;
            entry.info.last_activity = Utc::now();
        }
        self.stats.lock().await.messages_sent += 1;
        self.record(Direction::Outbound, target, message).await;
        self.events.emit(Notification::MessageSent {
            domain: target,
            message_id: message.id.clone(),
        });
        Ok(())
    }

    async fn enqueue(&self, target: Domain, message: Message, max_retries: u32) {
        let message_id = message.id.clone();
        let entry = QueuedMessage {
            message,
            attempts: 0,
            next_retry_at: Utc::now() + self.backoff(1),
            max_retries,
        };
        self.queues.lock().await.entry(target).or_default().push_back(entry);
        self.stats.lock().await.messages_queued += 1;
        self.events.emit(Notification::MessageQueued {
            domain: target,
            message_id,
        });
    }

    fn backoff(&self, attempts: u32) -> ChronoDuration {
        ChronoDuration::milliseconds(self.config.retry_delay_ms as i64 * attempts.max(1) as i64)
    }

    /// Retry every due queue entry once; exhausted entries are reported failed
    pub async fn process_retry_queue(&self) {
        let now = Utc::now();
        let due: Vec<(Domain, QueuedMessage)> = {
            let mut queues = self.queues.lock().await;
            let mut due = Vec::new();
            for (domain, queue) in queues.iter_mut() {
                let (ready, waiting): (VecDeque<_>, VecDeque<_>) =
                    queue.drain(..).partition(|entry| entry.next_retry_at <= now);
                *queue = waiting;
                due.extend(ready.into_iter().map(|entry| (*domain, entry)));
            }
            due
        };

        for (domain, mut entry) in due {
            if entry.attempts >= entry.max_retries {
                process_warn!(
                    ProcessId::current(),
                    "💀 Message {} to {} dropped after {} attempts",
                    entry.message.id,
                    domain,
                    entry.attempts
                );
                self.stats.lock().await.messages_failed += 1;
                self.events.emit(Notification::MessageFailed {
                    domain,
                    message_id: entry.message.id.clone(),
                    attempts: entry.attempts,
                });
                self.report(DeliveryReport::Failed {
                    domain,
                    message_id: entry.message.id,
                    attempts: entry.attempts,
                });
                continue;
            }

            entry.attempts += 1;
            entry.message.retry_count = entry.attempts;
            self.stats.lock().await.retries_attempted += 1;

            match self.try_transmit(domain, &entry.message).await {
                Ok(()) => self.report(DeliveryReport::Delivered {
                    domain,
                    message_id: entry.message.id,
                }),
                Err(reason) => {
                    process_debug!(
                        ProcessId::current(),
                        "🔁 Retry {}/{} of {} to {} failed: {}",
                        entry.attempts,
                        entry.max_retries,
                        entry.message.id,
                        domain,
                        reason
                    );
                    entry.next_retry_at = Utc::now() + self.backoff(entry.attempts);
                    self.queues.lock().await.entry(domain).or_default().push_back(entry);
                }
            }
        }
    }

    fn report(&self, report: DeliveryReport) {
        // Receiver gone means the owner is shutting down
        let _ = self.deliveries.send(report);
    }

    /// Attempt every queued message for a domain once, without spending attempts
    async fn flush_queue(&self, domain: Domain) {
        let pending = self.queues.lock().await.remove(&domain).unwrap_or_default();
        if pending.is_empty() {
            return;
        }

        let total = pending.len();
        let mut still_waiting = VecDeque::new();
        for entry in pending {
            if self.try_transmit(domain, &entry.message).await.is_ok() {
                self.report(DeliveryReport::Delivered {
                    domain,
                    message_id: entry.message.id,
                });
            } else {
                still_waiting.push_back(entry);
            }
        }
        process_debug!(
            ProcessId::current(),
            "📤 Flushed {}/{} queued messages to {}",
            total - still_waiting.len(),
            total,
            domain
        );

        if !still_waiting.is_empty() {
            let mut queues = self.queues.lock().await;
            let queue = queues.entry(domain).or_default();
            // Keep original order ahead of anything queued meanwhile
            still_waiting.extend(queue.drain(..));
            *queue = still_waiting;
        }
    }

    /// Wire a channel for a domain, replacing any previous one
    pub async fn register_channel(&self, domain: Domain, handle: ChannelHandle) {
        let ChannelHandle { transport, inbound } = handle;
        let reader = self.spawn_reader(domain, inbound);
        let now = Utc::now();

        let info = WorkerChannel {
            channel_id: Uuid::new_v4().to_string(),
            domain,
            connected: true,
            healthy: true,
            last_activity: now,
            sent_count: 0,
            received_count: 0,
            established_at: now,
        };

        let previous = self.channels.lock().await.insert(
            domain,
            ChannelEntry {
                info,
                transport,
                reader,
            },
        );
        if let Some(previous) = previous {
            previous.reader.abort();
            // The old transport is being replaced; a failed close changes nothing
            let _ = previous.transport.close().await;
        }

        process_info!(ProcessId::current(), "🔗 Channel registered for {}", domain);
        self.events.emit(Notification::ChannelConnected { domain });
        self.flush_queue(domain).await;
    }

    /// Close and forget a domain's channel
    pub async fn unregister_channel(&self, domain: Domain) -> bool {
        let Some(entry) = self.channels.lock().await.remove(&domain) else {
            return false;
        };
        entry.reader.abort();
        if let Err(e) = entry.transport.close().await {
            process_warn!(ProcessId::current(), "⚠️ Closing {} channel failed: {}", domain, e);
        }
        process_info!(ProcessId::current(), "🔌 Channel unregistered for {}", domain);
        self.events.emit(Notification::ChannelDisconnected {
            domain,
            unexpected: false,
        });
        true
    }

    fn spawn_reader(&self, domain: Domain, mut inbound: mpsc::Receiver<TransportEvent>) -> JoinHandle<()> {
        let communicator = self.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                match event {
                    TransportEvent::Frame(frame) => communicator.handle_frame(domain, &frame).await,
                    TransportEvent::Error(error) => {
                        process_warn!(ProcessId::current(), "⚠️ Channel error on {}: {}", domain, error);
                        communicator.events.emit(Notification::ChannelError { domain, error });
                    }
                    TransportEvent::Closed => break,
                }
            }
            communicator.handle_channel_closed(domain).await;
        })
    }

    async fn handle_frame(&self, domain: Domain, frame: &str) {
        let message = match Message::from_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                self.stats.lock().await.parse_errors += 1;
                process_warn!(ProcessId::current(), "⚠️ Dropping unparseable frame from {}: {}", domain, e);
                return;
            }
        };

        if let Some(entry) = self.channels.lock().await.get_mut(&domain) {
            entry.info.received_count += 1;
            entry.info.last_activity = Utc::now();
            if message.message_type == MessageType::Heartbeat {
                entry.info.healthy = true;
            }
        }
        self.stats.lock().await.messages_received += 1;
        self.record(Direction::Inbound, domain, &message).await;
        self.events.emit(Notification::MessageReceived {
            domain,
            message_id: message.id.clone(),
        });

        if message.message_type != MessageType::Heartbeat {
            // Receiver gone means the orchestrator is shutting down
            let _ = self.inbound.send((domain, message)).await;
        }
    }

    async fn handle_channel_closed(&self, domain: Domain) {
        {
            let mut channels = self.channels.lock().await;
            let Some(entry) = channels.get_mut(&domain).filter(|e| e.info.connected) else {
                return;
            };
            entry.info.connected = false;
            entry.info.healthy = false;
        }

        process_warn!(ProcessId::current(), "⚠️ Channel to {} closed unexpectedly", domain);
        self.events.emit(Notification::ChannelDisconnected {
            domain,
            unexpected: true,
        });

        let events = self.events.clone();
        let delay = self.config.reconnect_delay();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.emit(Notification::ReconnectRequested { domain });
        });
        let mut timers = self.timers.lock().await;
        timers.retain(|t| !t.is_finished());
        timers.push(timer);
    }

    /// Ping every connected channel once
    pub async fn heartbeat(&self) {
        let targets: Vec<(Domain, Arc<dyn Transport>)> = self
            .channels
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| entry.info.connected)
            .map(|(domain, entry)| (*domain, entry.transport.clone()))
            .collect();

        for (domain, transport) in targets {
            self.stats.lock().await.heartbeats_sent += 1;
            // The reply marks the channel healthy; an unanswered heartbeat is not an error
            let pinged = match transport.ping().await {
                Ok(()) => {
                    let heartbeat = self.message(domain, MessageType::Heartbeat, serde_json::Value::Null, Priority::Low);
                    self.try_transmit(domain, &heartbeat).await
                }
                Err(e) => Err(e.to_string()),
            };

            if let Err(error) = pinged {
                if let Some(entry) = self.channels.lock().await.get_mut(&domain) {
                    entry.info.healthy = false;
                }
                self.stats.lock().await.heartbeat_failures += 1;
                process_warn!(ProcessId::current(), "💔 Heartbeat to {} failed: {}", domain, error);
                self.events.emit(Notification::ChannelError { domain, error });
            }
        }
    }

    async fn record(&self, direction: Direction, domain: Domain, message: &Message) {
        let mut history = self.history.lock().await;
        history.push_back(HistoryEntry {
            direction,
            domain,
            message_id: message.id.clone(),
            message_type: message.message_type,
            timestamp: Utc::now(),
        });
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    /// Stop timers, close every channel best-effort, release all state
    pub async fn shutdown(&self) {
        for timer in self.timers.lock().await.drain(..) {
            timer.abort();
        }

        let entries: Vec<(Domain, ChannelEntry)> = self.channels.lock().await.drain().collect();
        for (domain, entry) in entries {
            entry.reader.abort();
            if let Err(e) = entry.transport.close().await {
                process_warn!(ProcessId::current(), "⚠️ Closing {} channel failed: {}", domain, e);
            }
            self.events.emit(Notification::ChannelDisconnected {
                domain,
                unexpected: false,
            });
        }

        let dropped: usize = self.queues.lock().await.drain().map(|(_, q)| q.len()).sum();
        if dropped > 0 {
            process_warn!(ProcessId::current(), "⚠️ {} queued messages discarded at shutdown", dropped);
        }
        process_info!(ProcessId::current(), "🛑 Communicator shut down");
    }

    pub async fn channel(&self, domain: Domain) -> Option<WorkerChannel> {
        self.channels.lock().await.get(&domain).map(|e| e.info.clone())
    }

    pub async fn queued(&self, domain: Domain) -> Vec<QueuedMessage> {
        self.queues
            .lock()
            .await
            .get(&domain)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn queue_depth(&self) -> usize {
        self.queues.lock().await.values().map(VecDeque::len).sum()
    }

    /// Background timers still tracked (sweep, heartbeat, pending reconnects)
    pub async fn timer_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().await.iter().cloned().collect()
    }

    pub async fn metrics(&self) -> CommunicatorMetrics {
        let mut channels: Vec<WorkerChannel> = self
            .channels
            .lock()
            .await
            .values()
            .map(|e| e.info.clone())
            .collect();
        channels.sort_by_key(|c| c.domain);

        CommunicatorMetrics {
            stats: self.stats.lock().await.clone(),
            channels,
            queue_depth: self.queue_depth().await,
            history_len: self.history.lock().await.len(),
        }
    }
}
