//! In-memory broker for tests and single-process deployments.
//!
//! Mirrors the Kafka semantics the confirmation protocol relies on:
//! - topics split into partitions, keys mapped through a consistent-hash ring
//! - consumer groups with committed offsets per partition
//! - group members share partitions; the split is recomputed when a member
//!   joins or leaves, and new owners resume from the committed offset, so
//!   uncommitted messages are delivered again
//! - an availability switch to simulate an unreachable broker

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::{
    BrokerError, ConsistentHashPartitioner, Delivery, Envelope, MessageConsumer, MessageProducer,
};

#[derive(Debug, Clone)]
struct Record {
    key: Option<String>,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct GroupState {
    /// Next offset to deliver after a rebalance, per partition
    committed: Vec<i64>,
    /// Member ids in join order
    members: Vec<u64>,
    generation: u64,
}

impl GroupState {
    fn new(partitions: usize) -> Self {
        Self {
            committed: vec![0; partitions],
            members: Vec::new(),
            generation: 0,
        }
    }

    fn assigned(&self, member: u64) -> Vec<usize> {
        let Some(index) = self.members.iter().position(|m| *m == member) else {
            return Vec::new();
        };
        let count = self.members.len();
        (0..self.committed.len())
            .filter(|p| p % count == index)
            .collect()
    }
}

#[derive(Debug)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<Record>>>,
    /// Keyed by (group id, topic)
    groups: HashMap<(String, String), GroupState>,
    available: bool,
    next_member_id: u64,
}

impl BrokerState {
    fn check_available(&self) -> Result<(), BrokerError> {
        if self.available {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("in-memory broker is offline".to_string()))
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: Mutex<BrokerState>,
    notify: Notify,
    partitioner: ConsistentHashPartitioner,
}

impl Inner {
    fn partitions(&self) -> usize {
        self.partitioner.num_partitions()
    }

    fn topic_mut<'a>(&self, state: &'a mut BrokerState, topic: &str) -> &'a mut Vec<Vec<Record>> {
        let partitions = self.partitions();
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions])
    }
}

/// Shared broker handle. Clones refer to the same topics and groups.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState {
                    topics: HashMap::new(),
                    groups: HashMap::new(),
                    available: true,
                    next_member_id: 0,
                }),
                notify: Notify::new(),
                partitioner: ConsistentHashPartitioner::new(partitions),
            }),
        }
    }

    pub fn producer(&self) -> InMemoryProducer {
        InMemoryProducer {
            inner: Arc::clone(&self.inner),
        }
    }

    /// A new member of `group_id`. It joins the group on `subscribe`.
    pub fn consumer(&self, group_id: impl Into<String>) -> InMemoryConsumer {
        let member_id = {
            let mut state = self.inner.state.lock();
            state.next_member_id += 1;
            state.next_member_id
        };
        InMemoryConsumer {
            inner: Arc::clone(&self.inner),
            group_id: group_id.into(),
            member_id,
            topic: None,
            generation: 0,
            positions: HashMap::new(),
            cursor: 0,
        }
    }

    /// Take the broker offline (`false`) or bring it back (`true`).
    pub fn set_available(&self, available: bool) {
        self.inner.state.lock().available = available;
        self.inner.notify.notify_waiters();
    }

    /// Partition a key maps to.
    pub fn partition_for(&self, key: &str) -> i32 {
        self.inner.partitioner.get_partition(key) as i32
    }

    /// Every message on `topic`, partition by partition.
    pub fn messages(&self, topic: &str) -> Vec<Envelope> {
        let state = self.inner.state.lock();
        let Some(partitions) = state.topics.get(topic) else {
            return Vec::new();
        };
        partitions
            .iter()
            .enumerate()
            .flat_map(|(partition, records)| {
                records.iter().enumerate().map(move |(offset, record)| Envelope {
                    topic: topic.to_string(),
                    partition: partition as i32,
                    offset: offset as i64,
                    key: record.key.clone(),
                    payload: record.payload.clone(),
                })
            })
            .collect()
    }

    /// Committed offset (next offset to read) of `group_id` on a partition.
    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> i64 {
        let state = self.inner.state.lock();
        state
            .groups
            .get(&(group_id.to_string(), topic.to_string()))
            .and_then(|g| g.committed.get(partition as usize).copied())
            .unwrap_or(0)
    }

    /// Sum of committed offsets of `group_id` across all partitions of `topic`.
    pub fn committed_total(&self, group_id: &str, topic: &str) -> i64 {
        let state = self.inner.state.lock();
        state
            .groups
            .get(&(group_id.to_string(), topic.to_string()))
            .map(|g| g.committed.iter().sum())
            .unwrap_or(0)
    }
}

/// Producer half of [`InMemoryBroker`].
#[derive(Debug, Clone)]
pub struct InMemoryProducer {
    inner: Arc<Inner>,
}

#[async_trait]
impl MessageProducer for InMemoryProducer {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<Delivery, BrokerError> {
        let partition = self.inner.partitioner.get_partition(key);
        let offset = {
            let mut state = self.inner.state.lock();
            state.check_available()?;
            let log = &mut self.inner.topic_mut(&mut state, topic)[partition];
            log.push(Record {
                key: Some(key.to_string()),
                payload: payload.to_vec(),
            });
            (log.len() - 1) as i64
        };
        self.inner.notify.notify_waiters();

        Ok(Delivery {
            partition: partition as i32,
            offset,
        })
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// One consumer-group member of [`InMemoryBroker`]. Leaves the group on drop.
#[derive(Debug)]
pub struct InMemoryConsumer {
    inner: Arc<Inner>,
    group_id: String,
    member_id: u64,
    topic: Option<String>,
    /// Generation the local positions belong to
    generation: u64,
    positions: HashMap<usize, i64>,
    /// Round-robin start among assigned partitions
    cursor: usize,
}

impl InMemoryConsumer {
    fn group_key(&self, topic: &str) -> (String, String) {
        (self.group_id.clone(), topic.to_string())
    }

    /// Try to take one message without waiting.
    fn try_fetch(&mut self, topic: &str) -> Result<Option<Envelope>, BrokerError> {
        let mut state = self.inner.state.lock();
        state.check_available()?;

        let key = self.group_key(topic);
        let (assigned, generation, committed) = match state.groups.get(&key) {
            Some(group) => (group.assigned(self.member_id), group.generation, group.committed.clone()),
            None => return Err(BrokerError::NotSubscribed),
        };

        if generation != self.generation {
            // Rebalanced: resume every owned partition from its committed offset
            self.positions = assigned
                .iter()
                .map(|p| (*p, committed[*p]))
                .collect();
            self.generation = generation;
            debug!(
                group = %self.group_id,
                member = self.member_id,
                partitions = ?assigned,
                "Partitions assigned"
            );
        }

        if assigned.is_empty() {
            return Ok(None);
        }

        let partitions = self.inner.topic_mut(&mut state, topic);
        for step in 0..assigned.len() {
            let partition = assigned[(self.cursor + step) % assigned.len()];
            let position = self.positions.get(&partition).copied().unwrap_or(0);
            if let Some(record) = partitions[partition].get(position as usize) {
                self.positions.insert(partition, position + 1);
                self.cursor = (self.cursor + step + 1) % assigned.len();
                return Ok(Some(Envelope {
                    topic: topic.to_string(),
                    partition: partition as i32,
                    offset: position,
                    key: record.key.clone(),
                    payload: record.payload.clone(),
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl MessageConsumer for InMemoryConsumer {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        {
            let mut state = self.inner.state.lock();
            state.check_available()?;
            self.inner.topic_mut(&mut state, topic);

            let partitions = self.inner.partitions();
            let group = state
                .groups
                .entry(self.group_key(topic))
                .or_insert_with(|| GroupState::new(partitions));
            if !group.members.contains(&self.member_id) {
                group.members.push(self.member_id);
                group.generation += 1;
            }
        }
        self.topic = Some(topic.to_string());
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<Envelope>, BrokerError> {
        let topic = self.topic.clone().ok_or(BrokerError::NotSubscribed)?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let inner = Arc::clone(&self.inner);
            let notified = inner.notify.notified();
            if let Some(envelope) = self.try_fetch(&topic)? {
                return Ok(Some(envelope));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&mut self, envelope: &Envelope) -> Result<(), BrokerError> {
        let mut state = self.inner.state.lock();
        state.check_available()?;

        let member_id = self.member_id;
        let group = state
            .groups
            .get_mut(&self.group_key(&envelope.topic))
            .ok_or(BrokerError::NotSubscribed)?;

        let partition = envelope.partition as usize;
        if !group.assigned(member_id).contains(&partition) {
            return Err(BrokerError::Commit(format!(
                "partition {} is not assigned to this member",
                envelope.partition
            )));
        }

        let next = envelope.offset + 1;
        if group.committed[partition] < next {
            group.committed[partition] = next;
        }
        Ok(())
    }
}

impl Drop for InMemoryConsumer {
    fn drop(&mut self) {
        let Some(topic) = self.topic.take() else {
            return;
        };
        let key = self.group_key(&topic);
        {
            let mut state = self.inner.state.lock();
            if let Some(group) = state.groups.get_mut(&key) {
                group.members.retain(|m| *m != self.member_id);
                group.generation += 1;
            }
        }
        self.inner.notify.notify_waiters();
    }
}
