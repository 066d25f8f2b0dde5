//! Modules: per-binary containers of sections, symbols, and proxy blocks.
//!
//! A module keeps four views over its symbol set in lockstep (identity,
//! name, effective address, and referent) plus a name index and an
//! interval-address index over its sections' byte intervals. Every mutator
//! that touches an indexed field reports through the observer handlers at
//! the bottom of this file.

use crate::aux_data::{AuxData, AuxDataContainer};
use crate::block::Block;
use crate::interval_map::IntervalMap;
use crate::merge::MergeSorted;
use crate::node::NodeKind;
use crate::observer::assert_not_rejected;
use crate::section::{block_order_key, interval_order_key};
use crate::symbol::Referent;
use crate::symbolic_expression::SymbolicExpression;
use crate::{
    Addr, ByteInterval, ChangeStatus, CodeBlock, Context, DataBlock, Error, Ir, ProxyBlock,
    Section, Symbol,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// An executable file format.
///
/// Wire codes are stable: new formats may be appended but existing codes
/// are never renumbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FileFormat {
    /// Unknown or uninitialized.
    #[default]
    Undefined = 0,
    /// Common Object File Format.
    Coff = 1,
    /// Executable and Linkable Format.
    Elf = 2,
    /// Microsoft Portable Executable.
    Pe = 3,
    /// IDA Pro database, 32-bit.
    IdaProDb32 = 4,
    /// IDA Pro database, 64-bit.
    IdaProDb64 = 5,
    /// Extended COFF.
    Xcoff = 6,
    /// Mach object format.
    MachO = 7,
    /// Raw binary with no file format.
    Raw = 8,
}

impl FileFormat {
    /// The stable wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a stable wire code.
    pub fn from_code(code: u8) -> Option<FileFormat> {
        Some(match code {
            0 => FileFormat::Undefined,
            1 => FileFormat::Coff,
            2 => FileFormat::Elf,
            3 => FileFormat::Pe,
            4 => FileFormat::IdaProDb32,
            5 => FileFormat::IdaProDb64,
            6 => FileFormat::Xcoff,
            7 => FileFormat::MachO,
            8 => FileFormat::Raw,
            _ => return None,
        })
    }
}

/// An instruction set architecture.
///
/// Wire codes are stable: new ISAs may be appended but existing codes are
/// never renumbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Isa {
    /// Unknown or uninitialized.
    #[default]
    Undefined = 0,
    /// Intel Architecture, 32-bit.
    Ia32 = 1,
    /// PowerPC, 32-bit.
    Ppc32 = 2,
    /// x86-64.
    X64 = 3,
    /// ARM, 32-bit.
    Arm = 4,
    /// A valid ISA this library does not model further.
    ValidButUnsupported = 5,
    /// PowerPC, 64-bit.
    Ppc64 = 6,
    /// ARM, 64-bit.
    Arm64 = 7,
    /// MIPS, 32-bit.
    Mips32 = 8,
    /// MIPS, 64-bit.
    Mips64 = 9,
}

impl Isa {
    /// The stable wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a stable wire code.
    pub fn from_code(code: u8) -> Option<Isa> {
        Some(match code {
            0 => Isa::Undefined,
            1 => Isa::Ia32,
            2 => Isa::Ppc32,
            3 => Isa::X64,
            4 => Isa::Arm,
            5 => Isa::ValidButUnsupported,
            6 => Isa::Ppc64,
            7 => Isa::Arm64,
            8 => Isa::Mips32,
            9 => Isa::Mips64,
            _ => return None,
        })
    }
}

/// Endianness of a module's instructions and data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ByteOrder {
    /// Unknown or uninitialized.
    #[default]
    Undefined = 0,
    /// Most significant byte first.
    Big = 1,
    /// Least significant byte first.
    Little = 2,
}

impl ByteOrder {
    /// The stable wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a stable wire code.
    pub fn from_code(code: u8) -> Option<ByteOrder> {
        match code {
            0 => Some(ByteOrder::Undefined),
            1 => Some(ByteOrder::Big),
            2 => Some(ByteOrder::Little),
            _ => None,
        }
    }

    /// Whether `self` and `other` are the two opposite concrete orders.
    /// `Undefined` is opposite to nothing.
    pub fn is_opposite(self, other: ByteOrder) -> bool {
        matches!(
            (self, other),
            (ByteOrder::Big, ByteOrder::Little) | (ByteOrder::Little, ByteOrder::Big)
        )
    }
}

/// A single binary (library or executable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Module(Uuid);

#[derive(Debug)]
pub(crate) struct ModuleData {
    pub(crate) parent: Option<Ir>,
    pub(crate) name: String,
    pub(crate) binary_path: String,
    pub(crate) preferred_addr: Addr,
    pub(crate) rebase_delta: i64,
    pub(crate) file_format: FileFormat,
    pub(crate) isa: Isa,
    pub(crate) byte_order: ByteOrder,
    pub(crate) entry_point: Option<CodeBlock>,
    pub(crate) sections: BTreeSet<Section>,
    pub(crate) sections_by_name: BTreeMap<String, BTreeSet<Section>>,
    /// One entry per transitively owned addressed byte interval.
    pub(crate) interval_index: IntervalMap<ByteInterval>,
    pub(crate) symbols: FxHashSet<Symbol>,
    pub(crate) symbols_by_name: BTreeMap<String, BTreeSet<Symbol>>,
    /// Keyed by effective address; unaddressed symbols first.
    pub(crate) symbols_by_addr: BTreeMap<Option<Addr>, BTreeSet<Symbol>>,
    pub(crate) symbols_by_referent: FxHashMap<Uuid, BTreeSet<Symbol>>,
    pub(crate) proxy_blocks: FxHashSet<ProxyBlock>,
    pub(crate) aux_data: BTreeMap<String, AuxData>,
}

impl ModuleData {
    fn new(name: String) -> Self {
        ModuleData {
            parent: None,
            name,
            binary_path: String::new(),
            preferred_addr: Addr(0),
            rebase_delta: 0,
            file_format: FileFormat::Undefined,
            isa: Isa::Undefined,
            byte_order: ByteOrder::Undefined,
            entry_point: None,
            sections: BTreeSet::new(),
            sections_by_name: BTreeMap::new(),
            interval_index: IntervalMap::new(),
            symbols: FxHashSet::default(),
            symbols_by_name: BTreeMap::new(),
            symbols_by_addr: BTreeMap::new(),
            symbols_by_referent: FxHashMap::default(),
            proxy_blocks: FxHashSet::default(),
            aux_data: BTreeMap::new(),
        }
    }

    /// Move a symbol between effective-address keys.
    pub(crate) fn reindex_symbol_addr(
        &mut self,
        symbol: Symbol,
        old_key: Option<Addr>,
        new_key: Option<Addr>,
    ) {
        if let Some(set) = self.symbols_by_addr.get_mut(&old_key) {
            set.remove(&symbol);
            if set.is_empty() {
                self.symbols_by_addr.remove(&old_key);
            }
        }
        self.symbols_by_addr.entry(new_key).or_default().insert(symbol);
    }
}

impl Module {
    /// Create a parentless module.
    pub fn new(ctx: &mut Context, name: impl Into<String>) -> Module {
        let uuid = ctx.register_new(NodeKind::Module);
        ctx.modules.insert(uuid, ModuleData::new(name.into()));
        Module(uuid)
    }

    /// Create a module with a caller-chosen UUID.
    pub fn with_uuid(ctx: &mut Context, uuid: Uuid, name: impl Into<String>) -> Result<Module, Error> {
        ctx.register(uuid, NodeKind::Module)?;
        ctx.modules.insert(uuid, ModuleData::new(name.into()));
        Ok(Module(uuid))
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> Module {
        Module(uuid)
    }

    /// The module's UUID.
    pub fn uuid(self) -> Uuid {
        self.0
    }

    /// The IR that owns this module, if any.
    pub fn ir(self, ctx: &Context) -> Option<Ir> {
        ctx.module_data(self).parent
    }

    /// The module's name. Not necessarily unique within an IR.
    pub fn name(self, ctx: &Context) -> &str {
        &ctx.module_data(self).name
    }

    /// Rename the module, re-ordering it in its IR.
    pub fn set_name(self, ctx: &mut Context, name: impl Into<String>) -> ChangeStatus {
        let name = name.into();
        let (old, parent) = {
            let data = ctx.module_data_mut(self);
            if data.name == name {
                return ChangeStatus::NoChange;
            }
            let old = std::mem::replace(&mut data.name, name.clone());
            (old, data.parent)
        };
        if let Some(ir) = parent {
            let status = ctx.on_module_name_changed(ir, self, &old, &name);
            assert_not_rejected!(status);
        }
        ChangeStatus::Accepted
    }

    /// The path of the corresponding binary on disk. Informational only.
    pub fn binary_path(self, ctx: &Context) -> &str {
        &ctx.module_data(self).binary_path
    }

    /// Record where the corresponding binary lives on disk.
    pub fn set_binary_path(self, ctx: &mut Context, path: impl Into<String>) {
        ctx.module_data_mut(self).binary_path = path.into();
    }

    /// The preferred loading address.
    pub fn preferred_addr(self, ctx: &Context) -> Addr {
        ctx.module_data(self).preferred_addr
    }

    /// Set the preferred loading address.
    pub fn set_preferred_addr(self, ctx: &mut Context, addr: Addr) {
        ctx.module_data_mut(self).preferred_addr = addr;
    }

    /// Difference between the preferred address and where the image was
    /// actually loaded.
    pub fn rebase_delta(self, ctx: &Context) -> i64 {
        ctx.module_data(self).rebase_delta
    }

    /// Set the rebase delta.
    pub fn set_rebase_delta(self, ctx: &mut Context, delta: i64) {
        ctx.module_data_mut(self).rebase_delta = delta;
    }

    /// Whether the image was loaded away from its preferred address.
    pub fn is_relocated(self, ctx: &Context) -> bool {
        ctx.module_data(self).rebase_delta != 0
    }

    /// The binary's file format.
    pub fn file_format(self, ctx: &Context) -> FileFormat {
        ctx.module_data(self).file_format
    }

    /// Set the binary's file format.
    pub fn set_file_format(self, ctx: &mut Context, format: FileFormat) {
        ctx.module_data_mut(self).file_format = format;
    }

    /// The instruction set architecture.
    pub fn isa(self, ctx: &Context) -> Isa {
        ctx.module_data(self).isa
    }

    /// Set the instruction set architecture.
    pub fn set_isa(self, ctx: &mut Context, isa: Isa) {
        ctx.module_data_mut(self).isa = isa;
    }

    /// The byte order of instructions and data.
    pub fn byte_order(self, ctx: &Context) -> ByteOrder {
        ctx.module_data(self).byte_order
    }

    /// Set the byte order.
    pub fn set_byte_order(self, ctx: &mut Context, order: ByteOrder) {
        ctx.module_data_mut(self).byte_order = order;
    }

    /// The entry-point code block, if any.
    pub fn entry_point(self, ctx: &Context) -> Option<CodeBlock> {
        ctx.module_data(self).entry_point
    }

    /// Record the entry point as a non-owning reference.
    ///
    /// No parentage check is made; callers must ensure the block lies in
    /// this module.
    pub fn set_entry_point(self, ctx: &mut Context, block: Option<CodeBlock>) {
        ctx.module_data_mut(self).entry_point = block;
    }

    // ===== Proxy blocks =====

    /// Iterate owned proxy blocks in arbitrary order.
    pub fn proxy_blocks(self, ctx: &Context) -> impl Iterator<Item = ProxyBlock> + '_ {
        ctx.module_data(self).proxy_blocks.iter().copied()
    }

    /// Move a proxy block into this module.
    pub fn add_proxy_block(self, ctx: &mut Context, proxy: ProxyBlock) -> ChangeStatus {
        if ctx.proxy_data(proxy).parent == Some(self) {
            return ChangeStatus::NoChange;
        }
        if let Some(previous) = ctx.proxy_data(proxy).parent {
            let status = previous.remove_proxy_block(ctx, proxy);
            debug_assert!(status.is_accepted(), "detach from previous module failed");
        }
        ctx.proxy_data_mut(proxy).parent = Some(self);
        ctx.module_data_mut(self).proxy_blocks.insert(proxy);
        ChangeStatus::Accepted
    }

    /// Detach a proxy block. Returns `NoChange` when not owned here.
    pub fn remove_proxy_block(self, ctx: &mut Context, proxy: ProxyBlock) -> ChangeStatus {
        if ctx.proxy_data(proxy).parent != Some(self) {
            return ChangeStatus::NoChange;
        }
        ctx.module_data_mut(self).proxy_blocks.remove(&proxy);
        ctx.proxy_data_mut(proxy).parent = None;
        ChangeStatus::Accepted
    }

    // ===== Sections =====

    /// Iterate owned sections in (address, size, identity) order.
    pub fn sections(self, ctx: &Context) -> impl Iterator<Item = Section> + '_ {
        let mut sections: Vec<Section> = ctx.module_data(self).sections.iter().copied().collect();
        sections.sort_by_key(|s| (s.address(ctx), s.size(ctx), s.uuid()));
        sections.into_iter()
    }

    /// Iterate owned sections in (name, identity) order.
    pub fn sections_by_name(self, ctx: &Context) -> impl Iterator<Item = Section> + '_ {
        ctx.module_data(self)
            .sections_by_name
            .values()
            .flat_map(|set| set.iter().copied())
    }

    /// Move a section into this module, registering its intervals in the
    /// module's address index.
    pub fn add_section(self, ctx: &mut Context, section: Section) -> ChangeStatus {
        if ctx.section_data(section).parent == Some(self) {
            return ChangeStatus::NoChange;
        }
        if let Some(previous) = ctx.section_data(section).parent {
            let status = previous.remove_section(ctx, section);
            debug_assert!(status.is_accepted(), "detach from previous module failed");
        }
        ctx.section_data_mut(section).parent = Some(self);
        let name = ctx.section_data(section).name.clone();
        let ranges: Vec<(ByteInterval, crate::AddrRange)> = section
            .byte_intervals(ctx)
            .filter_map(|bi| bi.range(ctx).map(|r| (bi, r)))
            .collect();
        let data = ctx.module_data_mut(self);
        data.sections.insert(section);
        data.sections_by_name.entry(name).or_default().insert(section);
        for (interval, range) in ranges {
            data.interval_index.insert(range.lo, range.hi, interval);
        }
        ChangeStatus::Accepted
    }

    /// Detach a section. Returns `NoChange` when not owned here.
    pub fn remove_section(self, ctx: &mut Context, section: Section) -> ChangeStatus {
        if ctx.section_data(section).parent != Some(self) {
            return ChangeStatus::NoChange;
        }
        let name = ctx.section_data(section).name.clone();
        let ranges: Vec<(ByteInterval, crate::AddrRange)> = section
            .byte_intervals(ctx)
            .filter_map(|bi| bi.range(ctx).map(|r| (bi, r)))
            .collect();
        let data = ctx.module_data_mut(self);
        data.sections.remove(&section);
        if let Some(set) = data.sections_by_name.get_mut(&name) {
            set.remove(&section);
            if set.is_empty() {
                data.sections_by_name.remove(&name);
            }
        }
        for (interval, range) in ranges {
            data.interval_index.remove(range.lo, range.hi, interval);
        }
        ctx.section_data_mut(section).parent = None;
        ChangeStatus::Accepted
    }

    /// Sections with the given name, in identity order.
    pub fn find_sections(self, ctx: &Context, name: &str) -> Vec<Section> {
        ctx.module_data(self)
            .sections_by_name
            .get(name)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Sections with a byte interval whose range contains `addr`, in
    /// address order.
    pub fn find_sections_on(self, ctx: &Context, addr: Addr) -> Vec<Section> {
        let mut found: Vec<Section> = ctx
            .module_data(self)
            .interval_index
            .values_at(addr)
            .filter_map(|bi| bi.section(ctx))
            .collect();
        found.sort_by_key(|s| (s.address(ctx), s.size(ctx), s.uuid()));
        found.dedup();
        found
    }

    /// Sections whose lowest address is exactly `addr`.
    pub fn find_sections_at(self, ctx: &Context, addr: Addr) -> Vec<Section> {
        self.find_sections_between(ctx, addr, addr.wrapping_add(1))
    }

    /// Sections whose lowest address lies in `[lo, hi)`, in address order.
    pub fn find_sections_between(self, ctx: &Context, lo: Addr, hi: Addr) -> Vec<Section> {
        if lo >= hi {
            return Vec::new();
        }
        let mut found: Vec<Section> = ctx
            .module_data(self)
            .sections
            .iter()
            .copied()
            .filter(|s| matches!(s.address(ctx), Some(a) if lo <= a && a < hi))
            .collect();
        found.sort_by_key(|s| (s.address(ctx), s.size(ctx), s.uuid()));
        found
    }

    // ===== Byte intervals =====

    /// Iterate every transitively owned interval in address order;
    /// unaddressed intervals appear first per section stream.
    pub fn byte_intervals(self, ctx: &Context) -> impl Iterator<Item = ByteInterval> + '_ {
        let streams: Vec<_> = ctx
            .module_data(self)
            .sections
            .iter()
            .map(|s| s.byte_intervals(ctx).collect::<Vec<_>>().into_iter())
            .collect();
        MergeSorted::new(streams, move |a: &ByteInterval, b: &ByteInterval| {
            interval_order_key(ctx, *a).cmp(&interval_order_key(ctx, *b))
        })
    }

    /// Intervals whose range contains `addr`, in address order.
    pub fn find_byte_intervals_on(self, ctx: &Context, addr: Addr) -> Vec<ByteInterval> {
        let mut found: Vec<ByteInterval> = ctx
            .module_data(self)
            .interval_index
            .values_at(addr)
            .collect();
        found.sort_by_key(|bi| interval_order_key(ctx, *bi));
        found
    }

    /// Intervals that start exactly at `addr`.
    pub fn find_byte_intervals_at(self, ctx: &Context, addr: Addr) -> Vec<ByteInterval> {
        let mut found: Vec<ByteInterval> = ctx
            .module_data(self)
            .interval_index
            .values_at(addr)
            .filter(|bi| bi.address(ctx) == Some(addr))
            .collect();
        found.sort_by_key(|bi| interval_order_key(ctx, *bi));
        found
    }

    /// Intervals whose start lies in `[lo, hi)`, in address order.
    pub fn find_byte_intervals_between(self, ctx: &Context, lo: Addr, hi: Addr) -> Vec<ByteInterval> {
        let mut found: Vec<ByteInterval> = ctx
            .module_data(self)
            .interval_index
            .values_overlapping(lo, hi)
            .into_iter()
            .filter(|bi| matches!(bi.address(ctx), Some(a) if lo <= a && a < hi))
            .collect();
        found.sort_by_key(|bi| interval_order_key(ctx, *bi));
        found
    }

    // ===== Blocks =====

    /// Iterate every transitively owned block in address order; blocks of
    /// unaddressed intervals appear in an unspecified but stable order.
    pub fn blocks(self, ctx: &Context) -> impl Iterator<Item = Block> + '_ {
        let streams: Vec<_> = ctx
            .module_data(self)
            .sections
            .iter()
            .map(|s| s.blocks(ctx).collect::<Vec<_>>().into_iter())
            .collect();
        MergeSorted::new(streams, move |a: &Block, b: &Block| {
            block_order_key(ctx, *a).cmp(&block_order_key(ctx, *b))
        })
    }

    /// Iterate every transitively owned code block in address order.
    pub fn code_blocks(self, ctx: &Context) -> impl Iterator<Item = CodeBlock> + '_ {
        self.blocks(ctx).filter_map(Block::as_code_block)
    }

    /// Iterate every transitively owned data block in address order.
    pub fn data_blocks(self, ctx: &Context) -> impl Iterator<Item = DataBlock> + '_ {
        self.blocks(ctx).filter_map(Block::as_data_block)
    }

    /// Blocks whose derived range contains `addr`, in address order.
    pub fn find_blocks_on(self, ctx: &Context, addr: Addr) -> Vec<Block> {
        let sections: Vec<Section> = ctx.module_data(self).sections.iter().copied().collect();
        let mut found = Vec::new();
        for section in sections {
            found.extend(section.find_blocks_on(ctx, addr));
        }
        found.sort_by_key(|b| block_order_key(ctx, *b));
        found
    }

    /// Blocks that start exactly at `addr`, in address order.
    pub fn find_blocks_at(self, ctx: &Context, addr: Addr) -> Vec<Block> {
        let sections: Vec<Section> = ctx.module_data(self).sections.iter().copied().collect();
        let mut found = Vec::new();
        for section in sections {
            found.extend(section.find_blocks_at(ctx, addr));
        }
        found.sort_by_key(|b| block_order_key(ctx, *b));
        found
    }

    /// Blocks whose start lies in `[lo, hi)`, in address order.
    pub fn find_blocks_between(self, ctx: &Context, lo: Addr, hi: Addr) -> Vec<Block> {
        let sections: Vec<Section> = ctx.module_data(self).sections.iter().copied().collect();
        let mut found = Vec::new();
        for section in sections {
            found.extend(section.find_blocks_between(ctx, lo, hi));
        }
        found.sort_by_key(|b| block_order_key(ctx, *b));
        found
    }

    /// Code blocks whose derived range contains `addr`.
    pub fn find_code_blocks_on(self, ctx: &Context, addr: Addr) -> Vec<CodeBlock> {
        self.find_blocks_on(ctx, addr)
            .into_iter()
            .filter_map(Block::as_code_block)
            .collect()
    }

    /// Code blocks that start exactly at `addr`.
    pub fn find_code_blocks_at(self, ctx: &Context, addr: Addr) -> Vec<CodeBlock> {
        self.find_blocks_at(ctx, addr)
            .into_iter()
            .filter_map(Block::as_code_block)
            .collect()
    }

    /// Code blocks whose start lies in `[lo, hi)`.
    pub fn find_code_blocks_between(self, ctx: &Context, lo: Addr, hi: Addr) -> Vec<CodeBlock> {
        self.find_blocks_between(ctx, lo, hi)
            .into_iter()
            .filter_map(Block::as_code_block)
            .collect()
    }

    /// Data blocks whose derived range contains `addr`.
    pub fn find_data_blocks_on(self, ctx: &Context, addr: Addr) -> Vec<DataBlock> {
        self.find_blocks_on(ctx, addr)
            .into_iter()
            .filter_map(Block::as_data_block)
            .collect()
    }

    /// Data blocks that start exactly at `addr`.
    pub fn find_data_blocks_at(self, ctx: &Context, addr: Addr) -> Vec<DataBlock> {
        self.find_blocks_at(ctx, addr)
            .into_iter()
            .filter_map(Block::as_data_block)
            .collect()
    }

    /// Data blocks whose start lies in `[lo, hi)`.
    pub fn find_data_blocks_between(self, ctx: &Context, lo: Addr, hi: Addr) -> Vec<DataBlock> {
        self.find_blocks_between(ctx, lo, hi)
            .into_iter()
            .filter_map(Block::as_data_block)
            .collect()
    }

    /// Symbolic expressions recorded at address `addr`.
    pub fn find_symbolic_expressions_at(
        self,
        ctx: &Context,
        addr: Addr,
    ) -> Vec<(ByteInterval, u64, SymbolicExpression)> {
        self.find_symbolic_expressions_between(ctx, addr, addr.wrapping_add(1))
    }

    /// Symbolic expressions recorded at addresses in `[lo, hi)`.
    pub fn find_symbolic_expressions_between(
        self,
        ctx: &Context,
        lo: Addr,
        hi: Addr,
    ) -> Vec<(ByteInterval, u64, SymbolicExpression)> {
        let sections: Vec<Section> = ctx.module_data(self).sections.iter().copied().collect();
        let mut found = Vec::new();
        for section in sections {
            found.extend(section.find_symbolic_expressions_between(ctx, lo, hi));
        }
        found.sort_by_key(|(bi, offset, _)| {
            (
                bi.address(ctx).map(|a| a.wrapping_add(*offset)),
                bi.uuid(),
                *offset,
            )
        });
        found
    }

    // ===== Symbols =====

    /// Iterate owned symbols in arbitrary order.
    pub fn symbols(self, ctx: &Context) -> impl Iterator<Item = Symbol> + '_ {
        ctx.module_data(self).symbols.iter().copied()
    }

    /// Iterate owned symbols in (name, identity) order.
    pub fn symbols_by_name(self, ctx: &Context) -> impl Iterator<Item = Symbol> + '_ {
        ctx.module_data(self)
            .symbols_by_name
            .values()
            .flat_map(|set| set.iter().copied())
    }

    /// Iterate owned symbols in effective-address order; symbols without an
    /// address come first.
    pub fn symbols_by_addr(self, ctx: &Context) -> impl Iterator<Item = Symbol> + '_ {
        ctx.module_data(self)
            .symbols_by_addr
            .values()
            .flat_map(|set| set.iter().copied())
    }

    /// Whether `symbol` is owned by this module.
    pub fn contains_symbol(self, ctx: &Context, symbol: Symbol) -> bool {
        ctx.module_data(self).symbols.contains(&symbol)
    }

    /// Move a symbol into this module, removing it from any previous owner
    /// and registering it in all four symbol indices.
    pub fn add_symbol(self, ctx: &mut Context, symbol: Symbol) -> ChangeStatus {
        if ctx.symbol_data(symbol).parent == Some(self) {
            return ChangeStatus::NoChange;
        }
        if let Some(previous) = ctx.symbol_data(symbol).parent {
            let status = previous.remove_symbol(ctx, symbol);
            debug_assert!(status.is_accepted(), "detach from previous module failed");
        }
        ctx.symbol_data_mut(symbol).parent = Some(self);
        let name = ctx.symbol_data(symbol).name.clone();
        let key = symbol.address(ctx);
        let referent = ctx.symbol_data(symbol).payload.referent_uuid();
        let data = ctx.module_data_mut(self);
        data.symbols.insert(symbol);
        data.symbols_by_name.entry(name).or_default().insert(symbol);
        data.symbols_by_addr.entry(key).or_default().insert(symbol);
        if let Some(target) = referent {
            data.symbols_by_referent.entry(target).or_default().insert(symbol);
        }
        ChangeStatus::Accepted
    }

    /// Detach a symbol and drop it from every index. Returns `NoChange`
    /// when not owned here.
    pub fn remove_symbol(self, ctx: &mut Context, symbol: Symbol) -> ChangeStatus {
        if ctx.symbol_data(symbol).parent != Some(self) {
            return ChangeStatus::NoChange;
        }
        let name = ctx.symbol_data(symbol).name.clone();
        let key = symbol.address(ctx);
        let referent = ctx.symbol_data(symbol).payload.referent_uuid();
        let data = ctx.module_data_mut(self);
        data.symbols.remove(&symbol);
        if let Some(set) = data.symbols_by_name.get_mut(&name) {
            set.remove(&symbol);
            if set.is_empty() {
                data.symbols_by_name.remove(&name);
            }
        }
        if let Some(set) = data.symbols_by_addr.get_mut(&key) {
            set.remove(&symbol);
            if set.is_empty() {
                data.symbols_by_addr.remove(&key);
            }
        }
        if let Some(target) = referent {
            if let Some(set) = data.symbols_by_referent.get_mut(&target) {
                set.remove(&symbol);
                if set.is_empty() {
                    data.symbols_by_referent.remove(&target);
                }
            }
        }
        ctx.symbol_data_mut(symbol).parent = None;
        ChangeStatus::Accepted
    }

    /// Symbols with the given name, in identity order.
    pub fn find_symbols(self, ctx: &Context, name: &str) -> Vec<Symbol> {
        ctx.module_data(self)
            .symbols_by_name
            .get(name)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Symbols whose effective address is exactly `addr`.
    pub fn find_symbols_at(self, ctx: &Context, addr: Addr) -> Vec<Symbol> {
        ctx.module_data(self)
            .symbols_by_addr
            .get(&Some(addr))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Symbols whose effective address lies in `[lo, hi)`, in address
    /// order.
    pub fn find_symbols_between(self, ctx: &Context, lo: Addr, hi: Addr) -> Vec<Symbol> {
        if lo >= hi {
            return Vec::new();
        }
        ctx.module_data(self)
            .symbols_by_addr
            .range(Some(lo)..Some(hi))
            .flat_map(|(_, set)| set.iter().copied())
            .collect()
    }

    /// Symbols whose referent is `referent`, in identity order.
    pub fn find_symbols_by_referent(self, ctx: &Context, referent: Referent) -> Vec<Symbol> {
        ctx.module_data(self)
            .symbols_by_referent
            .get(&referent.uuid())
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl AuxDataContainer for Module {
    fn aux_data_map(self, ctx: &Context) -> &BTreeMap<String, AuxData> {
        &ctx.module_data(self).aux_data
    }

    fn aux_data_map_mut(self, ctx: &mut Context) -> &mut BTreeMap<String, AuxData> {
        &mut ctx.module_data_mut(self).aux_data
    }
}

// Observer handlers: repair this module's indices when a child reports a
// change.
impl Context {
    pub(crate) fn on_section_name_changed(
        &mut self,
        module: Module,
        section: Section,
        old: &str,
        new: &str,
    ) -> ChangeStatus {
        let data = self.module_data_mut(module);
        if let Some(set) = data.sections_by_name.get_mut(old) {
            set.remove(&section);
            if set.is_empty() {
                data.sections_by_name.remove(old);
            }
        }
        data.sections_by_name
            .entry(new.to_string())
            .or_default()
            .insert(section);
        ChangeStatus::Accepted
    }

    /// A transitively owned interval's address range went from `old_range`
    /// to `new_range` (either may be absent for unaddressed or empty
    /// intervals).
    pub(crate) fn on_section_intervals_changed(
        &mut self,
        module: Module,
        interval: ByteInterval,
        old_range: Option<crate::AddrRange>,
        new_range: Option<crate::AddrRange>,
    ) -> ChangeStatus {
        let data = self.module_data_mut(module);
        if let Some(r) = old_range {
            data.interval_index.remove(r.lo, r.hi, interval);
        }
        if let Some(r) = new_range {
            data.interval_index.insert(r.lo, r.hi, interval);
        }
        ChangeStatus::Accepted
    }

    pub(crate) fn on_symbol_name_changed(
        &mut self,
        module: Module,
        symbol: Symbol,
        old: &str,
        new: &str,
    ) -> ChangeStatus {
        let data = self.module_data_mut(module);
        if let Some(set) = data.symbols_by_name.get_mut(old) {
            set.remove(&symbol);
            if set.is_empty() {
                data.symbols_by_name.remove(old);
            }
        }
        data.symbols_by_name
            .entry(new.to_string())
            .or_default()
            .insert(symbol);
        ChangeStatus::Accepted
    }

    pub(crate) fn on_symbol_payload_changed(
        &mut self,
        module: Module,
        symbol: Symbol,
        old_key: Option<Addr>,
        new_key: Option<Addr>,
        old_referent: Option<Uuid>,
        new_referent: Option<Uuid>,
    ) -> ChangeStatus {
        let data = self.module_data_mut(module);
        if old_key != new_key {
            data.reindex_symbol_addr(symbol, old_key, new_key);
        }
        if old_referent != new_referent {
            if let Some(target) = old_referent {
                if let Some(set) = data.symbols_by_referent.get_mut(&target) {
                    set.remove(&symbol);
                    if set.is_empty() {
                        data.symbols_by_referent.remove(&target);
                    }
                }
            }
            if let Some(target) = new_referent {
                data.symbols_by_referent
                    .entry(target)
                    .or_default()
                    .insert(symbol);
            }
        }
        ChangeStatus::Accepted
    }
}
