//! The versioned request/response registry.
//!
//! The wire encoders/decoders themselves are an external collaborator: this
//! module only models the *shape* of the registry the core dispatches
//! through — an `ApiKeys` enum, a per-broker negotiated version table, and
//! a lookup from `(request type, usable version)` to an opaque
//! encoder/decoder pair. A real deployment plugs in the actual codec crate
//! behind the `Codec` trait.

mod registry;

pub use self::registry::{ApiVersionMap, Codec, CodecRegistry, UsableApiVersions};

use std::mem;

/// The numeric codes the `apiKey` field of a request header can take, per
/// the Kafka wire protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKeys {
    Produce = 0,
    Fetch = 1,
    Offsets = 2,
    Metadata = 3,
    LeaderAndIsr = 4,
    StopReplica = 5,
    UpdateMetadata = 6,
    ControlledShutdown = 7,
    OffsetCommit = 8,
    OffsetFetch = 9,
    GroupCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
    DescribeGroups = 15,
    ListGroups = 16,
    SaslHandshake = 17,
    ApiVersions = 18,
    CreateTopics = 19,
    DeleteTopics = 20,
}

impl ApiKeys {
    pub fn name(&self) -> &'static str {
        match *self {
            ApiKeys::Produce => "Produce",
            ApiKeys::Fetch => "Fetch",
            ApiKeys::Offsets => "Offsets",
            ApiKeys::Metadata => "Metadata",
            ApiKeys::LeaderAndIsr => "LeaderAndIsr",
            ApiKeys::StopReplica => "StopReplica",
            ApiKeys::UpdateMetadata => "UpdateMetadata",
            ApiKeys::ControlledShutdown => "ControlledShutdown",
            ApiKeys::OffsetCommit => "OffsetCommit",
            ApiKeys::OffsetFetch => "OffsetFetch",
            ApiKeys::GroupCoordinator => "GroupCoordinator",
            ApiKeys::JoinGroup => "JoinGroup",
            ApiKeys::Heartbeat => "Heartbeat",
            ApiKeys::LeaveGroup => "LeaveGroup",
            ApiKeys::SyncGroup => "SyncGroup",
            ApiKeys::DescribeGroups => "DescribeGroups",
            ApiKeys::ListGroups => "ListGroups",
            ApiKeys::SaslHandshake => "SaslHandshake",
            ApiKeys::ApiVersions => "ApiVersions",
            ApiKeys::CreateTopics => "CreateTopics",
            ApiKeys::DeleteTopics => "DeleteTopics",
        }
    }
}

impl From<i16> for ApiKeys {
    fn from(v: i16) -> Self {
        // SAFETY: `ApiKeys` is a field-less `repr(i16)` enum covering 0..=20;
        // callers are expected to range-check against the protocol's known
        // API key space before converting.
        unsafe { mem::transmute(v.clamp(0, 20)) }
    }
}

/// A negotiated (or base) protocol version for one request type.
pub type ApiVersion = i16;

/// The version set assumed for brokers older than 0.10 (no `ApiVersions`
/// support).
pub fn base_protocol_versions() -> ApiVersionMap {
    use ApiKeys::*;

    let mut map = ApiVersionMap::default();
    for key in [
        Produce,
        Fetch,
        Offsets,
        Metadata,
        OffsetCommit,
        OffsetFetch,
        GroupCoordinator,
        JoinGroup,
        Heartbeat,
        LeaveGroup,
        SyncGroup,
        DescribeGroups,
        ListGroups,
        CreateTopics,
        DeleteTopics,
    ] {
        map.set(key, 0);
    }
    map
}
