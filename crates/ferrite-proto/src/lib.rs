//! Versioned binary wire format for the Ferrite machine-code IR.
//!
//! The format mirrors the object graph: a fixed header (magic, version,
//! flags, CRC32 checksum) followed by the IR message tree in pre-order,
//! with every node carrying its UUID so that identities survive the round
//! trip. Saving walks the graph; loading reconstructs all nodes first and
//! resolves cross-references second, dropping unresolvable references into
//! warnings rather than failing.
//!
//! Enum codes written here are stable across versions: values may be
//! appended, never renumbered. The loader refuses input newer than
//! [`ferrite_ir::IR_VERSION`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod load;
pub mod save;
pub mod wire;

pub use load::{load_ir, LoadError, LoadWarning, Loaded};
pub use save::{save_ir, MAGIC};
pub use wire::{DecodeError, WireReader, WireWriter};
