//! Scanflow Blob
//!
//! Splits large payloads into fixed-size chunks so they can pass through a
//! [`KvStore`](scanflow_host_kv::KvStore) that caps the size of a single
//! value, and puts them back together.
//!
//! Chunk *i* of a blob with prefix `p` lives under the key `p-i`, with
//! zero-based contiguous indices. Order is defined only by that index:
//! reassembly never depends on the order a store happens to return entries
//! in, and a missing index aborts reconstruction instead of producing a
//! truncated payload.
//!
//! The free functions ([`split`], [`persist`], [`fetch`], [`reassemble`])
//! are the codec itself; [`ChunkedBlob`] ties them to a prefix and chunk size
//! and records what was written in a [`BlobManifest`].

mod blob;
mod codec;
mod error;

pub use blob::{BlobManifest, ChunkedBlob};
pub use codec::{chunk_key, delete, fetch, persist, reassemble, reassemble_indexed, split};
pub use error::BlobError;
