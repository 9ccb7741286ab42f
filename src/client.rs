//! The orchestrator tying bootstrap connect, metadata, routing, and the
//! callback queue together into the public surface a higher-level
//! Producer/Consumer would be built on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use tokio::sync::Mutex as AsyncMutex;

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::correlation::CorrelationCounter;
use crate::errors::{Error, Result};
use crate::events::{ClientEvent, EventBus};
use crate::metadata::{
    BrokerEndpointInfo, BrokerMetadata, ClusterMetadata, MetadataStore, MetadataUpdate, NodeId,
    PartitionId, PartitionMetadata, TopicMetadata,
};
use crate::network::{BrokerConnection, BrokerEndpoint, BrokerPool, CallbackQueue};
use crate::protocol::{ApiKeys, CodecRegistry};
use crate::router::{self, Router};

/// One `(topic, partition, payload bytes)` triple to send, e.g. a produce
/// record set or a fetch request for that partition.
#[derive(Debug, Clone)]
pub struct Payload {
    pub topic: String,
    pub partition: PartitionId,
    pub data: Bytes,
}

/// A `sendRequest` call: one request type, fanned out per leader.
pub struct SendRequest {
    pub api_key: ApiKeys,
    pub api_version: i16,
    pub longpolling: bool,
    pub payloads: Vec<Payload>,
    /// `Some(0)` takes the `writeAsync`/no-callback fast path.
    pub require_acks: Option<i16>,
    pub timeout: Duration,
}

/// What happened for one leader's share of a `sendRequest` fan-out.
#[derive(Debug)]
pub enum LeaderOutcome {
    Response(Bytes),
    /// A long-poll was already in flight on this connection; deduped.
    Deduped,
    /// `requireAcks == 0`: written, no response expected.
    NoAck,
}

#[derive(Debug)]
pub struct LeaderResult {
    pub leader: NodeId,
    pub outcome: Result<LeaderOutcome>,
}

pub struct NewTopic {
    pub name: String,
    pub num_partitions: i32,
    pub replication_factor: i16,
}

#[derive(Debug, Clone)]
pub struct TopicCreationResult {
    pub topic: String,
    pub error: Option<crate::errors::KafkaCode>,
}

#[derive(Debug, Clone)]
pub struct GroupOverview {
    pub group_id: String,
    pub protocol_type: String,
}

#[derive(Debug, Clone)]
pub struct GroupDescription {
    pub group_id: String,
    pub state: String,
    pub members: Vec<String>,
}

/// Cheaply `Clone`able; every clone shares the same connections, metadata,
/// and in-flight state.
#[derive(Clone)]
pub struct KafkaClient {
    inner: Arc<Core>,
}

struct Core {
    config: ClientConfig,
    events: EventBus,
    metadata: Arc<MetadataStore>,
    pool: Arc<BrokerPool>,
    registry: Arc<CodecRegistry>,
    callback_queue: CallbackQueue,
    correlation: Arc<CorrelationCounter>,
    router: Router,

    ready: AtomicBool,
    closed: AtomicBool,
    connect_lock: AsyncMutex<()>,
    close_lock: AsyncMutex<()>,
    refresh_lock: AsyncMutex<()>,
    refresh_generation: AtomicU64,
}

impl KafkaClient {
    /// Builds a client around `config` and `registry` (the host
    /// application's wire codec bindings). Does not connect — call
    /// [`KafkaClient::connect`], or rely on `config.auto_connect` at the call
    /// site that owns the runtime.
    pub fn new(config: ClientConfig, registry: CodecRegistry) -> Self {
        let events = EventBus::default();
        let metadata = Arc::new(MetadataStore::new(events.clone()));
        let pool = Arc::new(BrokerPool::new(events.clone()));
        let registry = Arc::new(registry);
        let callback_queue = CallbackQueue::new();
        let correlation = Arc::new(CorrelationCounter::new());
        let config = Arc::new(config);

        let router = Router {
            pool: pool.clone(),
            metadata: metadata.clone(),
            registry: registry.clone(),
            callback_queue: callback_queue.clone(),
            correlation: correlation.clone(),
            config: config.clone(),
        };

        KafkaClient {
            inner: Arc::new(Core {
                config: (*config).clone(),
                events,
                metadata,
                pool,
                registry,
                callback_queue,
                correlation,
                router,
                ready: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                connect_lock: AsyncMutex::new(()),
                close_lock: AsyncMutex::new(()),
                refresh_lock: AsyncMutex::new(()),
                refresh_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.inner.metadata
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Bootstrap connect with retry. A second overlapping call blocks on
    /// the first and, once it observes `isReady`, returns immediately
    /// without bootstrapping again.
    pub async fn connect(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let _guard = self.inner.connect_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        self.inner.events.emit(ClientEvent::Connect);

        match self.bootstrap_connect().await {
            Ok(()) => {
                self.inner.ready.store(true, Ordering::Release);
                self.inner.events.emit(ClientEvent::Ready);
                Ok(())
            }
            Err(e) => {
                let main_error = Error::BootstrapExhausted(e.to_string());
                self.inner.events.emit(ClientEvent::Error(Arc::new(main_error)));
                Err(e)
            }
        }
    }

    async fn bootstrap_connect(&self) -> Result<()> {
        let mut backoff = Backoff::new(self.inner.config.connect_retry_options);

        loop {
            match self.try_bootstrap_once().await {
                Ok(()) => return Ok(()),
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        tracing::warn!(error = %e, delay = ?delay, "bootstrap attempt failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// One pass: shuffle `initialHosts`, try them in order, first success
    /// wins; then load metadata from that bootstrap connection and replace
    /// the stores.
    async fn try_bootstrap_once(&self) -> Result<()> {
        let mut hosts: Vec<BrokerEndpoint> = crate::config::parse_hosts(&self.inner.config.kafka_hosts.join(","))
            .into_iter()
            .map(|(host, port)| BrokerEndpoint::new(host, port))
            .collect();
        hosts.shuffle(&mut rand::thread_rng());

        if hosts.is_empty() {
            return Err(Error::NoAvailableBrokers);
        }

        let mut last_err = None;
        for endpoint in hosts {
            match self
                .inner
                .pool
                .get_or_open(
                    endpoint,
                    false,
                    &self.inner.config,
                    &self.inner.callback_queue,
                    &self.inner.registry,
                    &self.inner.correlation,
                )
                .await
            {
                Ok(_conn) => return self.load_metadata(&[], true).await,
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or(Error::NoAvailableBrokers))
    }

    /// The primary data-plane entry point. Groups `payloads` by leader and
    /// issues one request per leader, concurrently; failures are isolated
    /// per leader.
    pub async fn send_request(&self, request: SendRequest) -> Result<Vec<LeaderResult>> {
        let by_leader = self.payloads_by_leader(&request.payloads);
        let SendRequest { api_key, api_version, longpolling, require_acks, timeout, .. } = request;

        let results = stream::iter(by_leader.into_iter().map(move |(leader, payloads)| async move {
            let outcome = self
                .send_to_leader(leader, api_key, api_version, longpolling, require_acks, &payloads, timeout)
                .await;
            LeaderResult { leader, outcome }
        }))
        .buffer_unordered(self.inner.config.max_async_requests.max(1))
        .collect::<Vec<_>>()
        .await;

        Ok(results)
    }

    fn payloads_by_leader(&self, payloads: &[Payload]) -> HashMap<NodeId, Vec<Payload>> {
        let mut by_leader: HashMap<NodeId, Vec<Payload>> = HashMap::new();
        for payload in payloads {
            if let Some(leader) = self.inner.metadata.leader_for(&payload.topic, payload.partition) {
                by_leader.entry(leader).or_default().push(payload.clone());
            }
        }
        by_leader
    }

    async fn send_to_leader(
        &self,
        leader: NodeId,
        api_key: ApiKeys,
        api_version: i16,
        longpolling: bool,
        require_acks: Option<i16>,
        payloads: &[Payload],
        timeout: Duration,
    ) -> Result<LeaderOutcome> {
        let conn = match self.inner.router.for_node(leader, longpolling).await {
            Ok(conn) => conn,
            Err(e) => {
                let core = self.clone();
                tokio::spawn(async move {
                    if let Err(refresh_err) = core.refresh_broker_metadata().await {
                        tracing::debug!(error = %refresh_err, "background metadata refresh after routing failure also failed");
                    }
                });
                return Err(e);
            }
        };

        if longpolling && conn.is_waiting() {
            return Ok(LeaderOutcome::Deduped);
        }

        let body = encode_payloads(payloads);
        let correlation_id = self.inner.correlation.next();
        let codec = self.inner.registry.get(api_key, api_version)?;
        let request = codec.encode(correlation_id, Some(&self.inner.config.client_id), &body)?;

        if require_acks == Some(0) {
            conn.write_async(request).await;
            return Ok(LeaderOutcome::NoAck);
        }

        if longpolling {
            conn.set_waiting(true);
        }

        let registry = self.inner.registry.clone();
        let decode = move |body: Bytes| registry.get(api_key, api_version)?.decode(body);

        let result = conn.request(correlation_id, timeout, decode, request).await;

        if longpolling {
            conn.set_waiting(false);
        }

        result.map(LeaderOutcome::Response)
    }

    /// Wraps a request to the controller with the one-shot `NotController`
    /// retry.
    pub async fn send_controller_request(&self, api_key: ApiKeys, api_version: i16, payload: &[u8]) -> Result<Bytes> {
        router::with_controller_retry(&self.inner.metadata, || async {
            let conn = self.resolve_controller().await?;
            let correlation_id = self.inner.correlation.next();
            let codec = self.inner.registry.get(api_key, api_version)?;
            let request = codec.encode(correlation_id, Some(&self.inner.config.client_id), payload)?;

            let registry = self.inner.registry.clone();
            let decode = move |body: Bytes| registry.get(api_key, api_version)?.decode(body);

            conn.request(correlation_id, self.inner.config.request_timeout, decode, request).await
        })
        .await
    }

    /// Controller resolution: use the cached controller if reachable,
    /// otherwise force one metadata reload and try exactly once more.
    async fn resolve_controller(&self) -> Result<Arc<BrokerConnection>> {
        match self.inner.router.controller_once().await {
            Ok(conn) => Ok(conn),
            Err(_) => {
                self.load_metadata(&[], true).await?;
                self.inner.router.controller_once().await
            }
        }
    }

    /// Verify leaders, send, and emit `brokersChanged` if any leader result
    /// surfaced a stale-leader error.
    pub async fn send_produce_request(
        &self,
        payloads: Vec<Payload>,
        require_acks: Option<i16>,
        timeout: Duration,
    ) -> Result<Vec<LeaderResult>> {
        self.verify_payloads_has_leaders(&payloads).await?;

        let results = self
            .send_request(SendRequest {
                api_key: ApiKeys::Produce,
                api_version: 0,
                longpolling: false,
                payloads,
                require_acks,
                timeout,
            })
            .await?;

        if results.iter().any(|r| matches!(&r.outcome, Err(e) if e.is_stale_leader())) {
            self.inner.events.emit(ClientEvent::BrokersChanged);
        }

        Ok(results)
    }

    /// Verify leaders, then a long-polling `send_request`.
    pub async fn send_fetch_request(&self, payloads: Vec<Payload>, timeout: Duration) -> Result<Vec<LeaderResult>> {
        self.verify_payloads_has_leaders(&payloads).await?;

        self.send_request(SendRequest {
            api_key: ApiKeys::Fetch,
            api_version: 0,
            longpolling: true,
            payloads,
            require_acks: None,
            timeout,
        })
        .await
    }

    /// Refreshes once, scoped to the affected topics, if any payload has
    /// no known leader.
    async fn verify_payloads_has_leaders(&self, payloads: &[Payload]) -> Result<()> {
        let missing_topics: Vec<String> = payloads
            .iter()
            .filter(|p| !self.inner.metadata.has_metadata(&p.topic, p.partition))
            .map(|p| p.topic.clone())
            .collect();

        if missing_topics.is_empty() {
            return Ok(());
        }

        self.refresh_metadata(&missing_topics).await?;

        let still_missing = payloads.iter().any(|p| !self.inner.metadata.has_metadata(&p.topic, p.partition));
        if still_missing {
            return Err(Error::BrokerNotAvailable("Could not find the leader".to_owned()));
        }

        Ok(())
    }

    /// A merge-mode metadata refresh scoped to `topics`.
    pub async fn refresh_metadata(&self, topics: &[String]) -> Result<()> {
        self.load_metadata(topics, false).await
    }

    /// Single-flight full refresh against any-connected broker, then reap
    /// dead brokers.
    pub async fn refresh_broker_metadata(&self) -> Result<()> {
        let observed = self.inner.refresh_generation.load(Ordering::Acquire);
        let _guard = self.inner.refresh_lock.lock().await;

        if self.inner.refresh_generation.load(Ordering::Acquire) != observed {
            return Ok(());
        }

        let result = self.load_metadata(&[], true).await;

        match &result {
            Ok(()) => {
                self.inner.pool.close_dead(&self.inner.metadata.valid_broker_addrs()).await;
            }
            Err(e) => {
                self.inner
                    .events
                    .emit(ClientEvent::Error(Arc::new(Error::BrokerNotAvailable(e.to_string()).background())));
            }
        }

        self.inner.refresh_generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// Issues a `Metadata` request against any-connected and applies the
    /// result.
    async fn load_metadata(&self, topics: &[String], replace: bool) -> Result<()> {
        let conn = self.inner.router.any_connected().await?;

        let correlation_id = self.inner.correlation.next();
        let codec = self.inner.registry.get(ApiKeys::Metadata, 0)?;
        let request_body = encode_topic_list(topics);
        let request = codec.encode(correlation_id, Some(&self.inner.config.client_id), &request_body)?;

        let registry = self.inner.registry.clone();
        let decode = move |body: Bytes| registry.get(ApiKeys::Metadata, 0)?.decode(body);

        let body = conn.request(correlation_id, self.inner.config.request_timeout, decode, request).await?;
        let update = decode_metadata_update(&body)?;
        self.inner.metadata.update(update, replace);
        Ok(())
    }

    /// Refresh scoped to `topics`, fail naming whichever remained
    /// unresolved.
    pub async fn ensure_topics_exist(&self, topics: &[String]) -> Result<()> {
        self.refresh_metadata(topics).await?;

        let missing: Vec<String> = topics
            .iter()
            .filter(|t| !self.inner.metadata.has_topic(t))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(Error::TopicsNotExist(missing));
        }
        Ok(())
    }

    /// A controller request, one `CreateTopics` call per invocation.
    pub async fn create_topics(&self, topics: Vec<NewTopic>, _timeout: Duration) -> Result<Vec<TopicCreationResult>> {
        let body = encode_new_topics(&topics);
        let response = self.send_controller_request(ApiKeys::CreateTopics, 0, &body).await?;
        decode_topic_creation_results(&response)
    }

    /// Fans `ListGroups` out to every connected broker, bounded by
    /// `maxAsyncRequests`, and merges the per-broker lists.
    pub async fn list_groups(&self) -> Result<Vec<GroupOverview>> {
        let connections = self.inner.pool.get_connected();

        let per_broker: Vec<Result<Vec<GroupOverview>>> = stream::iter(connections.into_iter().map(|conn| async move {
            let correlation_id = self.inner.correlation.next();
            let codec = self.inner.registry.get(ApiKeys::ListGroups, 0)?;
            let request = codec.encode(correlation_id, Some(&self.inner.config.client_id), &[])?;

            let registry = self.inner.registry.clone();
            let decode = move |body: Bytes| registry.get(ApiKeys::ListGroups, 0)?.decode(body);

            let body = conn.request(correlation_id, self.inner.config.request_timeout, decode, request).await?;
            decode_group_overviews(&body)
        }))
        .buffer_unordered(self.inner.config.max_async_requests.max(1))
        .collect()
        .await;

        let mut merged = Vec::new();
        for result in per_broker {
            merged.extend(result?);
        }
        Ok(merged)
    }

    /// Resolves each group's coordinator and fans out `DescribeGroups`,
    /// merged the same way as [`KafkaClient::list_groups`].
    pub async fn describe_groups(&self, groups: &[String]) -> Result<Vec<GroupDescription>> {
        let descriptions: Vec<Result<GroupDescription>> = stream::iter(groups.iter().map(|group| async move {
            let conn = self.inner.router.coordinator(group).await?;

            let correlation_id = self.inner.correlation.next();
            let codec = self.inner.registry.get(ApiKeys::DescribeGroups, 0)?;
            let request = codec.encode(correlation_id, Some(&self.inner.config.client_id), group.as_bytes())?;

            let registry = self.inner.registry.clone();
            let decode = move |body: Bytes| registry.get(ApiKeys::DescribeGroups, 0)?.decode(body);

            let body = conn.request(correlation_id, self.inner.config.request_timeout, decode, request).await?;
            decode_group_description(group, &body)
        }))
        .buffer_unordered(self.inner.config.max_async_requests.max(1))
        .collect()
        .await;

        descriptions.into_iter().collect()
    }

    /// Lowers idle timeouts, waits for the callback queue to drain, then
    /// tears everything down. Multiple overlapping calls coalesce onto one
    /// teardown.
    pub async fn close(&self) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }

        let _guard = self.inner.close_lock.lock().await;
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }

        self.inner.pool.mark_closing();
        for conn in self.inner.pool.get_connected() {
            conn.set_idle_timeout(Duration::from_secs(5));
        }

        self.inner.callback_queue.wait_drained().await;

        self.inner.pool.close_all().await;
        self.inner.closed.store(true, Ordering::Release);
        self.inner.events.emit(ClientEvent::Close);
    }
}

// --- Wire placeholders -----------------------------------------------
//
// The wire codec bodies are an external collaborator; the encodings below
// are this crate's internal placeholder shape, just structured enough to
// exercise the dispatch/merge logic above against the in-process fake
// broker in the test suite. A real deployment's codec
// registry produces and consumes the actual Kafka wire format instead.

fn encode_topic_list(topics: &[String]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&(topics.len() as i32).to_be_bytes());
    for topic in topics {
        buf.extend_from_slice(&(topic.len() as i16).to_be_bytes());
        buf.extend_from_slice(topic.as_bytes());
    }
    buf.to_vec()
}

fn encode_payloads(payloads: &[Payload]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&(payloads.len() as i32).to_be_bytes());
    for payload in payloads {
        buf.extend_from_slice(&(payload.topic.len() as i16).to_be_bytes());
        buf.extend_from_slice(payload.topic.as_bytes());
        buf.extend_from_slice(&payload.partition.to_be_bytes());
        buf.extend_from_slice(&(payload.data.len() as i32).to_be_bytes());
        buf.extend_from_slice(&payload.data);
    }
    buf.to_vec()
}

fn encode_new_topics(topics: &[NewTopic]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&(topics.len() as i32).to_be_bytes());
    for topic in topics {
        buf.extend_from_slice(&(topic.name.len() as i16).to_be_bytes());
        buf.extend_from_slice(topic.name.as_bytes());
        buf.extend_from_slice(&topic.num_partitions.to_be_bytes());
        buf.extend_from_slice(&topic.replication_factor.to_be_bytes());
    }
    buf.to_vec()
}

struct Reader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(body: &'a [u8]) -> Self {
        Reader { body, pos: 0 }
    }

    fn malformed() -> Error {
        Error::BrokerNotAvailable("malformed response body".to_owned())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.body.len() {
            return Err(Self::malformed());
        }
        let slice = &self.body[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_i16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Self::malformed())
    }

    fn read_node_ids(&mut self) -> Result<Vec<NodeId>> {
        let count = self.read_i32()?;
        (0..count).map(|_| self.read_i32()).collect()
    }
}

fn decode_metadata_update(body: &[u8]) -> Result<MetadataUpdate> {
    let mut reader = Reader::new(body);

    let broker_count = reader.read_i32()?;
    let mut brokers = BrokerMetadata::new();
    for _ in 0..broker_count {
        let node_id = reader.read_i32()?;
        let host = reader.read_string()?;
        let port = reader.read_i32()? as u16;
        brokers.insert(node_id, BrokerEndpointInfo { host, port });
    }

    let topic_count = reader.read_i32()?;
    let mut topics = TopicMetadata::new();
    for _ in 0..topic_count {
        let topic = reader.read_string()?;
        let partition_count = reader.read_i32()?;
        let mut partitions = HashMap::new();
        for _ in 0..partition_count {
            let partition_id = reader.read_i32()?;
            let leader = reader.read_i32()?;
            let replicas = reader.read_node_ids()?;
            let isr = reader.read_node_ids()?;
            partitions.insert(partition_id, PartitionMetadata { leader, replicas, isr });
        }
        topics.insert(topic, partitions);
    }

    let has_cluster = reader.take(1)?[0] != 0;
    let cluster = if has_cluster {
        Some(ClusterMetadata { controller_id: Some(reader.read_i32()?) })
    } else {
        None
    };

    Ok(MetadataUpdate { brokers, topics, cluster })
}

fn decode_topic_creation_results(body: &[u8]) -> Result<Vec<TopicCreationResult>> {
    let mut reader = Reader::new(body);
    let count = reader.read_i32()?;
    let mut results = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let topic = reader.read_string()?;
        let code = reader.read_i16()?;
        let error = if code == 0 { None } else { Some(crate::errors::KafkaCode::from(code)) };
        results.push(TopicCreationResult { topic, error });
    }
    Ok(results)
}

fn decode_group_overviews(body: &[u8]) -> Result<Vec<GroupOverview>> {
    let mut reader = Reader::new(body);
    let count = reader.read_i32()?;
    let mut groups = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let group_id = reader.read_string()?;
        let protocol_type = reader.read_string()?;
        groups.push(GroupOverview { group_id, protocol_type });
    }
    Ok(groups)
}

fn decode_group_description(group: &str, body: &[u8]) -> Result<GroupDescription> {
    let mut reader = Reader::new(body);
    let state = reader.read_string()?;
    let member_count = reader.read_i32()?;
    let mut members = Vec::with_capacity(member_count.max(0) as usize);
    for _ in 0..member_count {
        members.push(reader.read_string()?);
    }
    Ok(GroupDescription { group_id: group.to_owned(), state, members })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_update_round_trips_through_the_placeholder_wire_shape() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&1i32.to_be_bytes()); // 1 broker
        buf.extend_from_slice(&7i32.to_be_bytes());
        buf.extend_from_slice(&4i16.to_be_bytes());
        buf.extend_from_slice(b"host");
        buf.extend_from_slice(&9092i32.to_be_bytes());

        buf.extend_from_slice(&1i32.to_be_bytes()); // 1 topic
        buf.extend_from_slice(&5i16.to_be_bytes());
        buf.extend_from_slice(b"topic");
        buf.extend_from_slice(&1i32.to_be_bytes()); // 1 partition
        buf.extend_from_slice(&0i32.to_be_bytes()); // partition id
        buf.extend_from_slice(&7i32.to_be_bytes()); // leader
        buf.extend_from_slice(&0i32.to_be_bytes()); // 0 replicas
        buf.extend_from_slice(&0i32.to_be_bytes()); // 0 isr

        buf.extend_from_slice(&[1u8]); // has cluster
        buf.extend_from_slice(&7i32.to_be_bytes()); // controller id

        let update = decode_metadata_update(&buf).unwrap();
        assert_eq!(update.brokers.len(), 1);
        assert_eq!(update.topics["topic"][&0].leader, 7);
        assert_eq!(update.cluster.unwrap().controller_id, Some(7));
    }

    #[test]
    fn malformed_metadata_body_is_a_broker_not_available_error_not_a_panic() {
        let result = decode_metadata_update(&[0, 0]);
        assert!(matches!(result, Err(Error::BrokerNotAvailable(_))));
    }

    #[test]
    fn payloads_by_leader_groups_only_resolvable_partitions() {
        let client = KafkaClient::new(ClientConfig::default(), CodecRegistry::default());
        client.inner.metadata.update(
            MetadataUpdate {
                brokers: BrokerMetadata::new(),
                topics: TopicMetadata::from([(
                    "topic".to_owned(),
                    HashMap::from([(0, PartitionMetadata { leader: 1, ..Default::default() })]),
                )]),
                cluster: None,
            },
            true,
        );

        let payloads = vec![
            Payload { topic: "topic".to_owned(), partition: 0, data: Bytes::new() },
            Payload { topic: "unknown".to_owned(), partition: 0, data: Bytes::new() },
        ];

        let grouped = client.payloads_by_leader(&payloads);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[&1].len(), 1);
    }
}
