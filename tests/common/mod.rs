//! Shared scaffolding for the integration tests: a minimal in-process stand-in
//! for a Kafka broker, speaking just enough of the wire layout to drive the
//! client core end to end without a real cluster.

use bytes::{Bytes, BytesMut};
use kafka_core::{ApiKeys, Codec, ClientConfig, ClientConfigBuilder, CodecRegistry, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A registry codec that actually writes the wire layout (length-prefixed
/// header, api key/version, correlation id, client id) instead of the
/// crate's internal `PassthroughCodec`, so the fake broker on the other end
/// of the socket can parse a real frame.
pub struct WireCodec {
    pub api_key: i16,
    pub api_version: i16,
}

impl Codec for WireCodec {
    fn encode(&self, correlation_id: i32, client_id: Option<&str>, payload: &[u8]) -> Result<Bytes> {
        let client_id = client_id.unwrap_or("");
        let mut body = BytesMut::new();
        body.extend_from_slice(&self.api_key.to_be_bytes());
        body.extend_from_slice(&self.api_version.to_be_bytes());
        body.extend_from_slice(&correlation_id.to_be_bytes());
        body.extend_from_slice(&(client_id.len() as i16).to_be_bytes());
        body.extend_from_slice(client_id.as_bytes());
        body.extend_from_slice(payload);

        let mut frame = BytesMut::new();
        frame.extend_from_slice(&(body.len() as i32).to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame.freeze())
    }

    fn decode(&self, frame: Bytes) -> Result<Bytes> {
        Ok(frame)
    }
}

pub fn registry() -> CodecRegistry {
    let mut registry = CodecRegistry::default();
    for key in [ApiKeys::ApiVersions, ApiKeys::Metadata, ApiKeys::Produce, ApiKeys::Fetch, ApiKeys::GroupCoordinator] {
        registry.register(key, 0, Box::new(WireCodec { api_key: key as i16, api_version: 0 }));
    }
    registry
}

pub fn config(hosts: Vec<String>) -> ClientConfig {
    ClientConfigBuilder::from_hosts(hosts)
        .versions_disabled(true)
        .auto_connect(false)
        .build()
        .unwrap()
}

pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

pub struct RawRequest {
    pub api_key: i16,
    pub correlation_id: i32,
    pub body: Vec<u8>,
}

/// Reads one request frame off `stream` using the wire layout `WireCodec`
/// produces: `length | apiKey | apiVersion | correlationId | clientId | body`.
pub async fn read_request(stream: &mut TcpStream) -> RawRequest {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = i32::from_be_bytes(len_buf) as usize;

    let mut rest = vec![0u8; len];
    stream.read_exact(&mut rest).await.unwrap();

    let api_key = i16::from_be_bytes([rest[0], rest[1]]);
    let correlation_id = i32::from_be_bytes(rest[4..8].try_into().unwrap());
    let client_id_len = i16::from_be_bytes([rest[8], rest[9]]) as usize;
    let body = rest[10 + client_id_len..].to_vec();

    RawRequest { api_key, correlation_id, body }
}

/// Writes one response frame: `length | correlationId | body`, the layout
/// `KafkaFrameCodec::decode` expects.
pub async fn write_response(stream: &mut TcpStream, correlation_id: i32, body: &[u8]) {
    let mut frame = Vec::new();
    frame.extend_from_slice(&correlation_id.to_be_bytes());
    frame.extend_from_slice(body);

    let mut out = Vec::new();
    out.extend_from_slice(&(frame.len() as i32).to_be_bytes());
    out.extend_from_slice(&frame);
    stream.write_all(&out).await.unwrap();
}

/// Encodes a `Metadata` response body in the exact layout
/// `kafka_core::client`'s internal `decode_metadata_update` expects:
/// `brokerCount | {nodeId,hostLen,host,port}* | topicCount |
/// {topicLen,topic,partitionCount,{partitionId,leader,replicaCount,replicas,
/// isrCount,isr}*}* | hasCluster | controllerId?`.
pub fn encode_metadata_response(
    brokers: &[(i32, &str, u16)],
    topics: &[(&str, Vec<(i32, i32)>)],
    controller_id: Option<i32>,
) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(&(brokers.len() as i32).to_be_bytes());
    for (node_id, host, port) in brokers {
        buf.extend_from_slice(&node_id.to_be_bytes());
        buf.extend_from_slice(&(host.len() as i16).to_be_bytes());
        buf.extend_from_slice(host.as_bytes());
        buf.extend_from_slice(&(*port as i32).to_be_bytes());
    }

    buf.extend_from_slice(&(topics.len() as i32).to_be_bytes());
    for (topic, partitions) in topics {
        buf.extend_from_slice(&(topic.len() as i16).to_be_bytes());
        buf.extend_from_slice(topic.as_bytes());
        buf.extend_from_slice(&(partitions.len() as i32).to_be_bytes());
        for (partition_id, leader) in partitions {
            buf.extend_from_slice(&partition_id.to_be_bytes());
            buf.extend_from_slice(&leader.to_be_bytes());
            buf.extend_from_slice(&0i32.to_be_bytes()); // replicas
            buf.extend_from_slice(&0i32.to_be_bytes()); // isr
        }
    }

    match controller_id {
        Some(id) => {
            buf.push(1);
            buf.extend_from_slice(&id.to_be_bytes());
        }
        None => buf.push(0),
    }

    buf
}
