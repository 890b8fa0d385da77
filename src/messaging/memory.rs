use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use tokio::sync::Notify;
use super::{
    attempt_from_headers, InboundMessage, MessageSource, MessagingError, OutboundRecord,
    Publisher, Topology,
};

// In-process broker for tests. Publishing to a consumed topic makes the record
// available to every MemorySource attached to the broker (one shared group).

#[derive(Default)]
struct BrokerState {
    published: Vec<OutboundRecord>,
    pending: VecDeque<InboundMessage>,
    next_offset: HashMap<(String, i32), i64>,
    committed: Vec<(String, i32, i64)>,
    rewound: Vec<(String, i32, i64)>,
    failing_publishes: u32,
    failing_rewinds: u32,
}

#[derive(Clone)]
pub struct MemoryBroker {
    topology: Topology,
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl MemoryBroker {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            state: Arc::new(Mutex::new(BrokerState::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn source(&self) -> MemorySource {
        MemorySource { broker: self.clone() }
    }

    /// Make the next `n` publishes fail.
    pub fn fail_next_publishes(&self, n: u32) {
        self.state.lock().unwrap().failing_publishes = n;
    }

    /// Make the next `n` rewinds fail.
    pub fn fail_next_rewinds(&self, n: u32) {
        self.state.lock().unwrap().failing_rewinds = n;
    }

    pub fn published(&self) -> Vec<OutboundRecord> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<OutboundRecord> {
        self.published().into_iter().filter(|r| r.topic == topic).collect()
    }

    pub fn committed(&self) -> Vec<(String, i32, i64)> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn rewound(&self) -> Vec<(String, i32, i64)> {
        self.state.lock().unwrap().rewound.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, record: OutboundRecord) -> Result<(), MessagingError> {
        let mut state = self.state.lock().unwrap();

        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(MessagingError::Publish {
                topic: record.topic,
                message: "injected failure".to_string(),
            });
        }

        let partition = record.partition.unwrap_or(0);
        let offset_slot = state
            .next_offset
            .entry((record.topic.clone(), partition))
            .or_insert(0);
        let offset = *offset_slot;
        *offset_slot += 1;

        let consumed = self.topology.consumed_topics().contains(&record.topic.as_str());
        if let (true, Some(channel)) = (consumed, self.topology.channel_for(&record.topic)) {
            let attempt = attempt_from_headers(
                record.headers.iter().map(|(k, v)| (k.as_str(), Some(v.as_bytes()))),
            );
            state.pending.push_back(InboundMessage {
                channel,
                topic: record.topic.clone(),
                partition,
                offset,
                key: record.key.clone(),
                payload: record.payload.clone(),
                attempt,
            });
            self.notify.notify_one();
        }

        state.published.push(record);
        Ok(())
    }
}

pub struct MemorySource {
    broker: MemoryBroker,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn recv(&mut self) -> Result<InboundMessage, MessagingError> {
        loop {
            let next = self.broker.state.lock().unwrap().pending.pop_front();
            if let Some(message) = next {
                return Ok(message);
            }
            self.broker.notify.notified().await;
        }
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), MessagingError> {
        self.broker
            .state
            .lock()
            .unwrap()
            .committed
            .push((message.topic.clone(), message.partition, message.offset));
        Ok(())
    }

    async fn rewind(&mut self, message: &InboundMessage) -> Result<(), MessagingError> {
        let mut state = self.broker.state.lock().unwrap();

        if state.failing_rewinds > 0 {
            state.failing_rewinds -= 1;
            return Err(MessagingError::Rewind(format!(
                "{}/{}@{}: injected failure",
                message.topic, message.partition, message.offset
            )));
        }

        state
            .rewound
            .push((message.topic.clone(), message.partition, message.offset));
        state.pending.push_front(message.clone());
        self.broker.notify.notify_one();
        Ok(())
    }
}
