//! Record types carried inside a frame, and their protobuf payloads.
//!
//! The payload layout is fixed by records already on chain, so the prost
//! messages below are written by hand rather than generated:
//!
//! ```text
//! message Bulletin    { required string message = 1; required uint64 timestamp = 2; optional Location location = 3; }
//! message Location    { required double lat = 1; required double lon = 2; required double h = 3; }
//! message Endorsement { required bytes bid = 1; required uint64 timestamp = 2; }
//! ```

use bitcoin::hashes::Hash;
use bitcoin::Txid;
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::WireError;

// ─── Domain types ─────────────────────────────────────────────────────────────

/// A decoded record. The set of record types is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Bulletin(Bulletin),
    Endorsement(Endorsement),
}

/// A short public message, optionally pinned to a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bulletin {
    pub message: String,
    /// Author-declared unix timestamp (seconds).
    pub timestamp: i64,
    pub location: Option<Location>,
}

/// WGS84 coordinates in degrees plus altitude in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
}

/// A public vote for a bulletin, identified by that bulletin's txid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    /// Raw txid bytes of the endorsed bulletin, in internal byte order.
    pub bid: [u8; 32],
    pub timestamp: i64,
}

/// The type byte following the magic prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    Bulletin = 0x01,
    Endorsement = 0x02,
}

impl RecordKind {
    pub fn from_byte(b: u8) -> Result<Self, WireError> {
        match b {
            0x01 => Ok(Self::Bulletin),
            0x02 => Ok(Self::Endorsement),
            other => Err(WireError::BadWireType(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl Bulletin {
    pub fn new(message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            message: message.into(),
            timestamp,
            location: None,
        }
    }

    pub fn with_location(mut self, lat: f64, lon: f64, altitude: f64) -> Self {
        self.location = Some(Location { lat, lon, altitude });
        self
    }
}

impl Endorsement {
    pub fn new(bid: Txid, timestamp: i64) -> Self {
        Self {
            bid: bid.to_byte_array(),
            timestamp,
        }
    }

    /// The endorsed bulletin's txid.
    pub fn bid_txid(&self) -> Txid {
        Txid::from_byte_array(self.bid)
    }
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Bulletin(_) => RecordKind::Bulletin,
            Self::Endorsement(_) => RecordKind::Endorsement,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Bulletin(b) => b.timestamp,
            Self::Endorsement(e) => e.timestamp,
        }
    }

    /// Check the invariants a record must satisfy before it is framed or
    /// after it has been decoded.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.timestamp() < 0 {
            return Err(WireError::invalid("negative timestamp"));
        }
        match self {
            Self::Bulletin(b) if b.message.is_empty() => {
                Err(WireError::invalid("bulletin message is empty"))
            }
            _ => Ok(()),
        }
    }

    /// Serialize the protobuf payload (no magic, type byte, or length).
    pub(crate) fn encode_payload(&self) -> Vec<u8> {
        match self {
            Self::Bulletin(b) => BulletinPayload::from(b).encode_to_vec(),
            Self::Endorsement(e) => EndorsementPayload::from(e).encode_to_vec(),
        }
    }

    /// Parse a protobuf payload of the given kind.
    pub(crate) fn decode_payload(kind: RecordKind, payload: &[u8]) -> Result<Self, WireError> {
        let record = match kind {
            RecordKind::Bulletin => {
                let msg = BulletinPayload::decode(payload)
                    .map_err(|e| WireError::malformed(format!("bulletin payload: {e}")))?;
                Self::Bulletin(msg.try_into()?)
            }
            RecordKind::Endorsement => {
                let msg = EndorsementPayload::decode(payload)
                    .map_err(|e| WireError::malformed(format!("endorsement payload: {e}")))?;
                Self::Endorsement(msg.try_into()?)
            }
        };
        record.validate()?;
        Ok(record)
    }
}

impl From<Bulletin> for Record {
    fn from(b: Bulletin) -> Self {
        Self::Bulletin(b)
    }
}

impl From<Endorsement> for Record {
    fn from(e: Endorsement) -> Self {
        Self::Endorsement(e)
    }
}

// ─── Protobuf payloads ────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
struct BulletinPayload {
    #[prost(string, optional, tag = "1")]
    message: Option<String>,
    #[prost(uint64, optional, tag = "2")]
    timestamp: Option<u64>,
    #[prost(message, optional, tag = "3")]
    location: Option<LocationPayload>,
}

#[derive(Clone, PartialEq, Message)]
struct LocationPayload {
    #[prost(double, optional, tag = "1")]
    lat: Option<f64>,
    #[prost(double, optional, tag = "2")]
    lon: Option<f64>,
    #[prost(double, optional, tag = "3")]
    h: Option<f64>,
}

#[derive(Clone, PartialEq, Message)]
struct EndorsementPayload {
    #[prost(bytes = "vec", optional, tag = "1")]
    bid: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "2")]
    timestamp: Option<u64>,
}

fn required<T>(field: Option<T>, name: &str) -> Result<T, WireError> {
    field.ok_or_else(|| WireError::malformed(format!("missing required field '{name}'")))
}

fn timestamp_from_wire(ts: u64) -> Result<i64, WireError> {
    i64::try_from(ts).map_err(|_| WireError::invalid(format!("timestamp {ts} out of range")))
}

impl From<&Bulletin> for BulletinPayload {
    fn from(b: &Bulletin) -> Self {
        Self {
            message: Some(b.message.clone()),
            timestamp: Some(b.timestamp as u64),
            location: b.location.map(|loc| LocationPayload {
                lat: Some(loc.lat),
                lon: Some(loc.lon),
                h: Some(loc.altitude),
            }),
        }
    }
}

impl TryFrom<BulletinPayload> for Bulletin {
    type Error = WireError;

    fn try_from(msg: BulletinPayload) -> Result<Self, Self::Error> {
        let location = msg
            .location
            .map(|loc| -> Result<Location, WireError> {
                Ok(Location {
                    lat: required(loc.lat, "location.lat")?,
                    lon: required(loc.lon, "location.lon")?,
                    altitude: required(loc.h, "location.h")?,
                })
            })
            .transpose()?;
        Ok(Self {
            message: required(msg.message, "message")?,
            timestamp: timestamp_from_wire(required(msg.timestamp, "timestamp")?)?,
            location,
        })
    }
}

impl From<&Endorsement> for EndorsementPayload {
    fn from(e: &Endorsement) -> Self {
        Self {
            bid: Some(e.bid.to_vec()),
            timestamp: Some(e.timestamp as u64),
        }
    }
}

impl TryFrom<EndorsementPayload> for Endorsement {
    type Error = WireError;

    fn try_from(msg: EndorsementPayload) -> Result<Self, Self::Error> {
        let bid = required(msg.bid, "bid")?;
        let bid: [u8; 32] = bid.as_slice().try_into().map_err(|_| {
            WireError::invalid(format!("endorsed id must be 32 bytes, got {}", bid.len()))
        })?;
        Ok(Self {
            bid,
            timestamp: timestamp_from_wire(required(msg.timestamp, "timestamp")?)?,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
