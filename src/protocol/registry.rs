use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

use crate::errors::{Error, Result};
use crate::protocol::ApiKeys;

/// `apiSupport[requestType].usable`: the highest version of a request type
/// a specific broker and this client jointly support.
#[derive(Debug, Default, Clone)]
pub struct ApiVersionMap {
    usable: HashMap<ApiKeys, i16>,
}

impl ApiVersionMap {
    pub fn set(&mut self, key: ApiKeys, usable: i16) {
        self.usable.insert(key, usable);
    }

    pub fn usable(&self, key: ApiKeys) -> Option<i16> {
        self.usable.get(&key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.usable.is_empty()
    }
}

/// The broker-reported `(min, max)` range for one API key, as returned by
/// an `ApiVersions` response.
#[derive(Debug, Clone, Copy)]
pub struct UsableApiVersions {
    pub min_version: i16,
    pub max_version: i16,
}

/// An opaque request encoder/decoder pair for one `(request type, version)`.
///
/// The actual wire format is an external collaborator; this trait is the
/// seam a real codec crate plugs into. `encode` turns a
/// caller-supplied payload plus a correlation id into wire bytes; `decode`
/// turns a response frame's body back into a caller-meaningful value.
pub trait Codec: Send + Sync {
    fn encode(&self, correlation_id: i32, client_id: Option<&str>, payload: &[u8]) -> Result<Bytes>;

    fn decode(&self, frame: Bytes) -> Result<Bytes>;
}

/// A no-op codec used where the wire body is not modeled by this crate
/// (the core only needs to know whether an encoder/decoder pair *exists*
/// for a version).
pub struct PassthroughCodec;

impl Codec for PassthroughCodec {
    fn encode(&self, _correlation_id: i32, _client_id: Option<&str>, payload: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(payload))
    }

    fn decode(&self, frame: Bytes) -> Result<Bytes> {
        Ok(frame)
    }
}

/// The registry of `(ApiKeys, version) -> Codec` pairs, `apiMap[requestType][usable]`.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<(ApiKeys, i16), Box<dyn Codec>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("entries", &self.codecs.len())
            .finish()
    }
}

impl CodecRegistry {
    pub fn register(&mut self, key: ApiKeys, version: i16, codec: Box<dyn Codec>) {
        self.codecs.insert((key, version), codec);
    }

    /// Looks up the `(encoder, decoder)` pair for a negotiated version.
    /// Absence is a programming error, surfaced as `Error::UnsupportedRequest`
    /// rather than a panic so a misconfigured registry fails a single call
    /// instead of the whole connection.
    pub fn get(&self, key: ApiKeys, version: i16) -> Result<&dyn Codec> {
        self.codecs
            .get(&(key, version))
            .map(|c| c.as_ref())
            .ok_or(Error::UnsupportedRequest {
                request_type: key.name(),
                version,
            })
    }
}
