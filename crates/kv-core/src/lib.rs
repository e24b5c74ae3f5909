//! kv-core — arena allocator, tagged value model, chained hash table, and
//! snapshot codec. No network or async dependencies; everything above this
//! crate (the facade in `kv-engine`, the wire protocol in `kv-proto`, the
//! server in `kvstored`) is built on top of the types here.

pub mod arena;
pub mod codec;
pub mod error;
pub mod table;
pub mod value;

pub use error::{EngineError, EngineResult};
pub use table::{fnv1a, Table, TableStats};
pub use value::{Value, MAX_STRING_SIZE};
