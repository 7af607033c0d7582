//! ombindex-wire — the on-chain encoding of Ombuds records.
//!
//! # Layers
//!
//! ```text
//! Record ──encode──▶ frame bytes ──to_outputs──▶ P2PKH outputs
//!    ▲                                                │
//!    └──────────── extract (window search) ◀──────────┘
//! ```
//!
//! Everything in this crate is pure: no I/O, no shared state.

pub mod chunk;
pub mod error;
pub mod extract;
pub mod frame;
pub mod record;
pub mod varint;

pub use chunk::{
    encode_as_outputs, from_outputs, has_magic_prefix, outputs_needed, to_outputs, CHUNK_LEN,
};
pub use error::WireError;
pub use extract::{extract, recover_author, Extracted};
pub use frame::{decode, encode, MAGIC, MAX_FRAME_LEN};
pub use record::{Bulletin, Endorsement, Location, Record, RecordKind};
pub use varint::{read_varint, write_varint};
