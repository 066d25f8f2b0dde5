//! The arena that owns every node.
//!
//! A [`Context`] holds the data of every node ever created through it, keyed
//! by UUID, and never frees a node individually; node lifetime equals
//! context lifetime. The graph is cyclic (a symbol can refer to a code block
//! whose byte interval sits in a section of the module that owns the
//! symbol), so every inter-node link (parent, referent, entry point) is a
//! UUID into this arena rather than an owning edge. That makes
//! `uuid → node` resolution a single map lookup and removes the cycle
//! problem entirely.

use crate::block::{CodeBlockData, DataBlockData};
use crate::byte_interval::ByteIntervalData;
use crate::ir::IrData;
use crate::module::ModuleData;
use crate::node::{Node, NodeKind};
use crate::proxy_block::ProxyBlockData;
use crate::section::SectionData;
use crate::symbol::SymbolData;
use crate::{ByteInterval, CodeBlock, DataBlock, Ir, Module, ProxyBlock, Section, Symbol};
use rustc_hash::FxHashMap;
use thiserror::Error;
use uuid::Uuid;

/// Graph construction errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A node with this UUID already exists in the context.
    #[error("duplicate UUID in context: {0}")]
    DuplicateUuid(Uuid),
}

/// Owns every node of every graph built through it.
#[derive(Debug, Default)]
pub struct Context {
    pub(crate) irs: FxHashMap<Uuid, IrData>,
    pub(crate) modules: FxHashMap<Uuid, ModuleData>,
    pub(crate) sections: FxHashMap<Uuid, SectionData>,
    pub(crate) intervals: FxHashMap<Uuid, ByteIntervalData>,
    pub(crate) code_blocks: FxHashMap<Uuid, CodeBlockData>,
    pub(crate) data_blocks: FxHashMap<Uuid, DataBlockData>,
    pub(crate) proxy_blocks: FxHashMap<Uuid, ProxyBlockData>,
    pub(crate) symbols: FxHashMap<Uuid, SymbolData>,
    kinds: FxHashMap<Uuid, NodeKind>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Context::default()
    }

    /// Resolve a UUID to a typed node handle.
    pub fn lookup(&self, uuid: Uuid) -> Option<Node> {
        Some(match self.kinds.get(&uuid)? {
            NodeKind::Ir => Node::Ir(Ir::from_uuid(uuid)),
            NodeKind::Module => Node::Module(Module::from_uuid(uuid)),
            NodeKind::Section => Node::Section(Section::from_uuid(uuid)),
            NodeKind::ByteInterval => Node::ByteInterval(ByteInterval::from_uuid(uuid)),
            NodeKind::CodeBlock => Node::CodeBlock(CodeBlock::from_uuid(uuid)),
            NodeKind::DataBlock => Node::DataBlock(DataBlock::from_uuid(uuid)),
            NodeKind::ProxyBlock => Node::ProxyBlock(ProxyBlock::from_uuid(uuid)),
            NodeKind::Symbol => Node::Symbol(Symbol::from_uuid(uuid)),
        })
    }

    /// The kind of the node with this UUID, if it exists.
    pub fn kind(&self, uuid: Uuid) -> Option<NodeKind> {
        self.kinds.get(&uuid).copied()
    }

    /// Number of nodes owned by this context.
    pub fn node_count(&self) -> usize {
        self.kinds.len()
    }

    /// Mint a fresh UUID and register it under `kind`.
    pub(crate) fn register_new(&mut self, kind: NodeKind) -> Uuid {
        let uuid = Uuid::new_v4();
        debug_assert!(!self.kinds.contains_key(&uuid), "v4 UUID collision");
        self.kinds.insert(uuid, kind);
        uuid
    }

    /// Register an externally supplied UUID under `kind`.
    ///
    /// Loaders use this to rebuild graphs with their serialized identities.
    pub(crate) fn register(&mut self, uuid: Uuid, kind: NodeKind) -> Result<(), Error> {
        if self.kinds.contains_key(&uuid) {
            return Err(Error::DuplicateUuid(uuid));
        }
        self.kinds.insert(uuid, kind);
        Ok(())
    }

    // Data accessors. A handle is only obtainable from the context that
    // created it, so a missing entry is a precondition violation (a handle
    // used against a foreign context) and aborts.

    pub(crate) fn ir_data(&self, ir: Ir) -> &IrData {
        self.irs.get(&ir.uuid()).expect("IR not in this context")
    }

    pub(crate) fn ir_data_mut(&mut self, ir: Ir) -> &mut IrData {
        self.irs.get_mut(&ir.uuid()).expect("IR not in this context")
    }

    pub(crate) fn module_data(&self, module: Module) -> &ModuleData {
        self.modules
            .get(&module.uuid())
            .expect("module not in this context")
    }

    pub(crate) fn module_data_mut(&mut self, module: Module) -> &mut ModuleData {
        self.modules
            .get_mut(&module.uuid())
            .expect("module not in this context")
    }

    pub(crate) fn section_data(&self, section: Section) -> &SectionData {
        self.sections
            .get(&section.uuid())
            .expect("section not in this context")
    }

    pub(crate) fn section_data_mut(&mut self, section: Section) -> &mut SectionData {
        self.sections
            .get_mut(&section.uuid())
            .expect("section not in this context")
    }

    pub(crate) fn interval_data(&self, interval: ByteInterval) -> &ByteIntervalData {
        self.intervals
            .get(&interval.uuid())
            .expect("byte interval not in this context")
    }

    pub(crate) fn interval_data_mut(&mut self, interval: ByteInterval) -> &mut ByteIntervalData {
        self.intervals
            .get_mut(&interval.uuid())
            .expect("byte interval not in this context")
    }

    pub(crate) fn code_block_data(&self, block: CodeBlock) -> &CodeBlockData {
        self.code_blocks
            .get(&block.uuid())
            .expect("code block not in this context")
    }

    pub(crate) fn code_block_data_mut(&mut self, block: CodeBlock) -> &mut CodeBlockData {
        self.code_blocks
            .get_mut(&block.uuid())
            .expect("code block not in this context")
    }

    pub(crate) fn data_block_data(&self, block: DataBlock) -> &DataBlockData {
        self.data_blocks
            .get(&block.uuid())
            .expect("data block not in this context")
    }

    pub(crate) fn data_block_data_mut(&mut self, block: DataBlock) -> &mut DataBlockData {
        self.data_blocks
            .get_mut(&block.uuid())
            .expect("data block not in this context")
    }

    pub(crate) fn proxy_data(&self, proxy: ProxyBlock) -> &ProxyBlockData {
        self.proxy_blocks
            .get(&proxy.uuid())
            .expect("proxy block not in this context")
    }

    pub(crate) fn proxy_data_mut(&mut self, proxy: ProxyBlock) -> &mut ProxyBlockData {
        self.proxy_blocks
            .get_mut(&proxy.uuid())
            .expect("proxy block not in this context")
    }

    pub(crate) fn symbol_data(&self, symbol: Symbol) -> &SymbolData {
        self.symbols
            .get(&symbol.uuid())
            .expect("symbol not in this context")
    }

    pub(crate) fn symbol_data_mut(&mut self, symbol: Symbol) -> &mut SymbolData {
        self.symbols
            .get_mut(&symbol.uuid())
            .expect("symbol not in this context")
    }
}
