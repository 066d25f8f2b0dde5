//! Ferrite IR: an in-memory representation of machine code for binary
//! analysis and rewriting.
//!
//! The object graph is the container hierarchy
//! `IR → Module → Section → ByteInterval → {CodeBlock, DataBlock,
//! SymbolicExpression}` plus `Symbol` and `ProxyBlock`, all owned by a
//! [`Context`] arena and identified by serialization-stable UUIDs. Each
//! container keeps address- and name-keyed indices over its children;
//! mutations report up the tree through an observer chain so that
//! module-level "find by address" queries stay consistent after any edit.
//!
//! This crate provides:
//! - The arena ([`Context`]) and typed node handles
//! - Multi-index address/name/referent lookups on every container
//! - Address-ordered aggregate iteration via k-way merge
//! - The control-flow graph over code and proxy blocks
//! - Auxiliary data attachment
//!
//! Serialization lives in the companion `ferrite-proto` crate.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod addr;
pub mod aux_data;
pub mod block;
pub mod byte_interval;
pub mod cfg;
pub mod context;
pub mod ir;
pub mod merge;
pub mod module;
pub mod node;
pub mod observer;
pub mod proxy_block;
pub mod section;
pub mod symbol;
pub mod symbolic_expression;

mod interval_map;

pub use addr::{Addr, AddrRange};
pub use aux_data::{AuxData, AuxDataContainer};
pub use block::{Block, CodeBlock, DataBlock, DecodeMode};
pub use byte_interval::{ByteInterval, Word};
pub use cfg::{Cfg, CfgNode, Edge, EdgeLabel, EdgeType};
pub use context::{Context, Error};
pub use ir::{Ir, IR_VERSION};
pub use merge::MergeSorted;
pub use module::{ByteOrder, FileFormat, Isa, Module};
pub use node::{Node, NodeKind};
pub use observer::ChangeStatus;
pub use proxy_block::ProxyBlock;
pub use section::{Section, SectionFlag, SectionFlags};
pub use symbol::{Referent, Symbol, SymbolPayload};
pub use symbolic_expression::{
    SymAddrAddr, SymAddrConst, SymAttribute, SymAttributes, SymExprKind, SymStackConst,
    SymbolicExpression,
};
