//! Error taxonomy for the client core.
//!
//! `KafkaCode` transcribes the Kafka wire protocol's numeric error codes.
//! `Error` is the crate-level enum the rest of the core returns.

use std::fmt;
use std::time::Duration;

/// Numeric error codes reported by a Kafka broker.
///
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i16)]
pub enum KafkaCode {
    Unknown = -1,
    None = 0,
    OffsetOutOfRange = 1,
    CorruptMessage = 2,
    UnknownTopicOrPartition = 3,
    InvalidMessageSize = 4,
    LeaderNotAvailable = 5,
    /// The client's metadata is out of date: it sent a request to a
    /// broker that is no longer the leader for the partition.
    NotLeaderForPartition = 6,
    RequestTimedOut = 7,
    BrokerNotAvailable = 8,
    ReplicaNotAvailable = 9,
    MessageSizeTooLarge = 10,
    StaleControllerEpoch = 11,
    OffsetMetadataTooLarge = 12,
    NetworkException = 13,
    GroupLoadInProgress = 14,
    GroupCoordinatorNotAvailable = 15,
    NotCoordinatorForGroup = 16,
    InvalidTopic = 17,
    RecordListTooLarge = 18,
    NotEnoughReplicas = 19,
    NotEnoughReplicasAfterAppend = 20,
    InvalidRequiredAcks = 21,
    IllegalGeneration = 22,
    InconsistentGroupProtocol = 23,
    InvalidGroupId = 24,
    UnknownMemberId = 25,
    InvalidSessionTimeout = 26,
    RebalanceInProgress = 27,
    InvalidCommitOffsetSize = 28,
    TopicAuthorizationFailed = 29,
    GroupAuthorizationFailed = 30,
    ClusterAuthorizationFailed = 31,
    InvalidTimestamp = 32,
    UnsupportedSaslMechanism = 33,
    IllegalSaslState = 34,
    UnsupportedVersion = 35,
    TopicAlreadyExists = 36,
    InvalidPartitions = 37,
    InvalidReplicationFactor = 38,
    InvalidReplicaAssignment = 39,
    InvalidConfig = 40,
    /// The targeted broker is not (or is no longer) the cluster controller.
    NotController = 41,
    InvalidRequest = 42,
    UnsupportedForMessageFormat = 43,
    PolicyViolation = 44,
}

impl From<i16> for KafkaCode {
    fn from(v: i16) -> Self {
        match v {
            -1 => KafkaCode::Unknown,
            0 => KafkaCode::None,
            1 => KafkaCode::OffsetOutOfRange,
            2 => KafkaCode::CorruptMessage,
            3 => KafkaCode::UnknownTopicOrPartition,
            4 => KafkaCode::InvalidMessageSize,
            5 => KafkaCode::LeaderNotAvailable,
            6 => KafkaCode::NotLeaderForPartition,
            7 => KafkaCode::RequestTimedOut,
            8 => KafkaCode::BrokerNotAvailable,
            9 => KafkaCode::ReplicaNotAvailable,
            10 => KafkaCode::MessageSizeTooLarge,
            11 => KafkaCode::StaleControllerEpoch,
            12 => KafkaCode::OffsetMetadataTooLarge,
            13 => KafkaCode::NetworkException,
            14 => KafkaCode::GroupLoadInProgress,
            15 => KafkaCode::GroupCoordinatorNotAvailable,
            16 => KafkaCode::NotCoordinatorForGroup,
            17 => KafkaCode::InvalidTopic,
            18 => KafkaCode::RecordListTooLarge,
            19 => KafkaCode::NotEnoughReplicas,
            20 => KafkaCode::NotEnoughReplicasAfterAppend,
            21 => KafkaCode::InvalidRequiredAcks,
            22 => KafkaCode::IllegalGeneration,
            23 => KafkaCode::InconsistentGroupProtocol,
            24 => KafkaCode::InvalidGroupId,
            25 => KafkaCode::UnknownMemberId,
            26 => KafkaCode::InvalidSessionTimeout,
            27 => KafkaCode::RebalanceInProgress,
            28 => KafkaCode::InvalidCommitOffsetSize,
            29 => KafkaCode::TopicAuthorizationFailed,
            30 => KafkaCode::GroupAuthorizationFailed,
            31 => KafkaCode::ClusterAuthorizationFailed,
            32 => KafkaCode::InvalidTimestamp,
            33 => KafkaCode::UnsupportedSaslMechanism,
            34 => KafkaCode::IllegalSaslState,
            35 => KafkaCode::UnsupportedVersion,
            36 => KafkaCode::TopicAlreadyExists,
            37 => KafkaCode::InvalidPartitions,
            38 => KafkaCode::InvalidReplicationFactor,
            39 => KafkaCode::InvalidReplicaAssignment,
            40 => KafkaCode::InvalidConfig,
            41 => KafkaCode::NotController,
            42 => KafkaCode::InvalidRequest,
            43 => KafkaCode::UnsupportedForMessageFormat,
            44 => KafkaCode::PolicyViolation,
            _ => KafkaCode::Unknown,
        }
    }
}

impl fmt::Display for KafkaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors produced by the client core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No connection to the target broker could be obtained, or the
    /// selected broker is disconnected/unready.
    #[error("broker not available: {0}")]
    BrokerNotAvailable(String),

    /// A connect, ApiVersions, or per-request timeout elapsed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The targeted broker indicated it is not the current controller.
    #[error("not controller")]
    NotController,

    /// A metadata refresh could not resolve every requested topic.
    #[error("topics not found: {0:?}")]
    TopicsNotExist(Vec<String>),

    /// A data-plane call arrived after `close()` began.
    #[error("client is closing")]
    ClientIsClosing,

    /// A protocol-level error code surfaced by a decoder.
    #[error("kafka error: {0}")]
    Kafka(KafkaCode),

    /// Bootstrap exhausted every candidate host.
    #[error("unable to connect to any bootstrap broker: {0}")]
    BootstrapExhausted(String),

    /// No usable encoder/decoder pair exists for the given request type
    /// and negotiated version (a programming error).
    #[error("unsupported request type {request_type} at version {version}")]
    UnsupportedRequest { request_type: &'static str, version: i16 },

    /// No connected broker was available to route an any-connected request.
    #[error("unable to find available brokers")]
    NoAvailableBrokers,

    /// The given host could not be resolved or connected to.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Lower-level I/O failure on an established connection.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The `clientId` configuration option failed validation.
    #[error("invalid client id: {0}")]
    InvalidClientId(String),

    /// A background operation (metadata refresh, reconnect) failed; the
    /// original cause is preserved.
    #[error("background operation failed: {0}")]
    Background(Box<Error>),

    /// TLS setup or handshake failed.
    #[error("tls error: {0}")]
    Tls(String),
}

impl Error {
    pub fn broker_not_available(addr: impl fmt::Display) -> Self {
        Error::BrokerNotAvailable(addr.to_string())
    }

    pub fn background(self) -> Self {
        Error::Background(Box::new(self))
    }

    /// True for the two produce errors that should also trigger a
    /// `brokersChanged` emission.
    pub fn is_stale_leader(&self) -> bool {
        matches!(
            self,
            Error::Kafka(KafkaCode::NotLeaderForPartition)
                | Error::Kafka(KafkaCode::UnknownTopicOrPartition)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
