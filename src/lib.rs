//! Connection pooling, metadata, and request routing core for a Kafka
//! client. Produce/consume batching, the consumer-group protocol state
//! machine, and the wire codec itself are external collaborators built on
//! top of this crate.

pub mod backoff;
pub mod client;
pub mod config;
pub mod correlation;
pub mod errors;
pub mod events;
pub mod metadata;
pub mod negotiator;
pub mod network;
pub mod protocol;
pub mod router;

pub use client::{
    GroupDescription, GroupOverview, KafkaClient, LeaderOutcome, LeaderResult, NewTopic, Payload,
    SendRequest, TopicCreationResult,
};
pub use config::{ClientConfig, ClientConfigBuilder, RetryOptions, SslOptions, VersionNegotiationOptions};
pub use errors::{Error, KafkaCode, Result};
pub use events::{ClientEvent, EventBus};
pub use metadata::{
    BrokerEndpointInfo, BrokerMetadata, ClusterMetadata, MetadataStore, MetadataUpdate, NodeId,
    PartitionId, PartitionMetadata, TopicMetadata,
};
pub use network::BrokerEndpoint;
pub use protocol::{ApiKeys, ApiVersion, Codec, CodecRegistry, PassthroughCodec};
