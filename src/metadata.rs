//! In-memory cluster/topic/broker metadata cache.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::events::{ClientEvent, EventBus};

pub type NodeId = i32;
pub type PartitionId = i32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpointInfo {
    pub host: String,
    pub port: u16,
}

/// `nodeId -> {host, port}`.
pub type BrokerMetadata = HashMap<NodeId, BrokerEndpointInfo>;

#[derive(Debug, Clone, Default)]
pub struct PartitionMetadata {
    pub leader: NodeId,
    pub replicas: Vec<NodeId>,
    pub isr: Vec<NodeId>,
}

/// `topic -> partition -> {leader, replicas, isr}`.
pub type TopicMetadata = HashMap<String, HashMap<PartitionId, PartitionMetadata>>;

#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    pub controller_id: Option<NodeId>,
}

/// The wire shape a metadata refresh produces: `[brokers, {metadata,
/// clusterMetadata?}]`.
pub struct MetadataUpdate {
    pub brokers: BrokerMetadata,
    pub topics: TopicMetadata,
    pub cluster: Option<ClusterMetadata>,
}

#[derive(Default)]
struct Inner {
    brokers: BrokerMetadata,
    topics: TopicMetadata,
    cluster: ClusterMetadata,
}

/// All state lives behind one `RwLock`; reads (routing decisions) are
/// frequent and short, writes (refreshes) are rare, matching the
/// read/write skew this cache sees in practice.
pub struct MetadataStore {
    inner: RwLock<Inner>,
    events: EventBus,
}

impl MetadataStore {
    pub fn new(events: EventBus) -> Self {
        MetadataStore { inner: RwLock::new(Inner::default()), events }
    }

    pub fn brokers(&self) -> BrokerMetadata {
        self.inner.read().brokers.clone()
    }

    pub fn broker(&self, node_id: NodeId) -> Option<BrokerEndpointInfo> {
        self.inner.read().brokers.get(&node_id).cloned()
    }

    pub fn controller_id(&self) -> Option<NodeId> {
        self.inner.read().cluster.controller_id
    }

    pub fn leader_for(&self, topic: &str, partition: PartitionId) -> Option<NodeId> {
        self.inner
            .read()
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .map(|p| p.leader)
    }

    pub fn has_metadata(&self, topic: &str, partition: PartitionId) -> bool {
        self.leader_for(topic, partition).is_some()
    }

    /// True iff any partition metadata is known for `topic` at all
    /// (`ensure_topics_exist` only needs topic-level presence).
    pub fn has_topic(&self, topic: &str) -> bool {
        self.inner.read().topics.contains_key(topic)
    }

    pub fn valid_broker_addrs(&self) -> std::collections::HashSet<String> {
        self.inner
            .read()
            .brokers
            .values()
            .map(|b| crate::network::BrokerEndpoint::new(b.host.clone(), b.port).key())
            .collect()
    }

    /// Replaces the broker map; schedules `brokersChanged` on the next tick
    /// if the set actually changed. "Next tick" here is a `tokio::spawn` of
    /// the emission so it never runs synchronously inside the caller's own
    /// metadata-update critical section.
    pub fn set_broker_metadata(&self, new: BrokerMetadata) {
        let changed = {
            let mut inner = self.inner.write();
            let changed = !inner.brokers.is_empty() && inner.brokers != new;
            inner.brokers = new;
            changed
        };

        if changed {
            let events = self.events.clone();
            tokio::spawn(async move {
                events.emit(ClientEvent::BrokersChanged);
            });
        }
    }

    pub fn set_cluster_metadata(&self, new: ClusterMetadata) {
        self.inner.write().cluster = new;
    }

    /// Setting the controller id to `None` is the signal that the cached
    /// controller is stale.
    pub fn set_controller_id(&self, id: Option<NodeId>) {
        self.inner.write().cluster.controller_id = id;
    }

    /// Applies a full refresh result: replaces brokers, either replaces or
    /// merges topic metadata, and updates cluster metadata if present.
    pub fn update(&self, update: MetadataUpdate, replace_topics: bool) {
        self.set_broker_metadata(update.brokers);

        {
            let mut inner = self.inner.write();
            if replace_topics {
                inner.topics = update.topics;
            } else {
                for (topic, partitions) in update.topics {
                    inner.topics.insert(topic, partitions);
                }
            }
        }

        if let Some(cluster) = update.cluster {
            self.set_cluster_metadata(cluster);
        }
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        MetadataStore::new(EventBus::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(id: NodeId, port: u16) -> (NodeId, BrokerEndpointInfo) {
        (id, BrokerEndpointInfo { host: "localhost".to_owned(), port })
    }

    #[test]
    fn has_metadata_reflects_known_leaders() {
        let store = MetadataStore::default();
        assert!(!store.has_metadata("topic", 0));

        let mut topics = TopicMetadata::new();
        topics.insert(
            "topic".to_owned(),
            HashMap::from([(0, PartitionMetadata { leader: 1, replicas: vec![1], isr: vec![1] })]),
        );

        store.update(
            MetadataUpdate {
                brokers: HashMap::from([broker(1, 9092)]),
                topics,
                cluster: None,
            },
            true,
        );

        assert!(store.has_metadata("topic", 0));
        assert_eq!(store.leader_for("topic", 0), Some(1));
    }

    #[test]
    fn merge_keeps_topics_not_present_in_the_update() {
        let store = MetadataStore::default();

        let mut first = TopicMetadata::new();
        first.insert(
            "a".to_owned(),
            HashMap::from([(0, PartitionMetadata { leader: 1, ..Default::default() })]),
        );
        store.update(
            MetadataUpdate { brokers: HashMap::from([broker(1, 9092)]), topics: first, cluster: None },
            true,
        );

        let mut second = TopicMetadata::new();
        second.insert(
            "b".to_owned(),
            HashMap::from([(0, PartitionMetadata { leader: 1, ..Default::default() })]),
        );
        store.update(
            MetadataUpdate { brokers: HashMap::from([broker(1, 9092)]), topics: second, cluster: None },
            false,
        );

        assert!(store.has_metadata("a", 0));
        assert!(store.has_metadata("b", 0));
    }

    #[test]
    fn controller_id_none_marks_it_stale() {
        let store = MetadataStore::default();
        store.set_controller_id(Some(1));
        assert_eq!(store.controller_id(), Some(1));
        store.set_controller_id(None);
        assert_eq!(store.controller_id(), None);
    }
}
