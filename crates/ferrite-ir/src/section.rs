//! Sections: named, flagged, address-ordered sets of byte intervals.
//!
//! Each section keeps two interval maps in lockstep with its tree: one over
//! its byte intervals' `[addr, addr+size)` ranges and one over its blocks'
//! derived ranges (including any overhang past the owning interval's size).
//! The observer handlers at the bottom of this file repair both on child
//! changes and re-raise interval-range events to the owning module.

use crate::block::Block;
use crate::interval_map::IntervalMap;
use crate::merge::MergeSorted;
use crate::node::NodeKind;
use crate::observer::assert_not_rejected;
use crate::symbolic_expression::SymbolicExpression;
use crate::{
    Addr, AddrRange, ByteInterval, ChangeStatus, CodeBlock, Context, DataBlock, Error, Ir, Module,
};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Properties of a section.
///
/// Wire codes are stable: new flags may be appended but existing codes are
/// never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SectionFlag {
    /// The section's contents are readable at runtime.
    Readable = 1,
    /// The section's contents are writable at runtime.
    Writable = 2,
    /// The section's contents are executable.
    Executable = 3,
    /// The loader maps the section into memory.
    Loaded = 4,
    /// The section has initialized contents in the file.
    Initialized = 5,
    /// The section is thread-local storage.
    ThreadLocal = 6,
}

impl SectionFlag {
    /// All flags, in code order.
    pub const ALL: [SectionFlag; 6] = [
        SectionFlag::Readable,
        SectionFlag::Writable,
        SectionFlag::Executable,
        SectionFlag::Loaded,
        SectionFlag::Initialized,
        SectionFlag::ThreadLocal,
    ];

    /// The stable wire code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Decode a stable wire code.
    pub fn from_code(code: u32) -> Option<SectionFlag> {
        match code {
            1 => Some(SectionFlag::Readable),
            2 => Some(SectionFlag::Writable),
            3 => Some(SectionFlag::Executable),
            4 => Some(SectionFlag::Loaded),
            5 => Some(SectionFlag::Initialized),
            6 => Some(SectionFlag::ThreadLocal),
            _ => None,
        }
    }
}

/// A set of [`SectionFlag`]s packed into a bit mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionFlags(u32);

impl SectionFlags {
    /// The empty set.
    pub fn new() -> Self {
        SectionFlags(0)
    }

    /// Rebuild a set from its raw bit mask.
    pub fn from_bits(bits: u32) -> Self {
        SectionFlags(bits)
    }

    /// The raw bit mask.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Add a flag.
    pub fn insert(&mut self, flag: SectionFlag) {
        self.0 |= 1 << flag.code();
    }

    /// Remove a flag.
    pub fn remove(&mut self, flag: SectionFlag) {
        self.0 &= !(1 << flag.code());
    }

    /// Whether the set contains `flag`.
    pub fn contains(self, flag: SectionFlag) -> bool {
        self.0 & (1 << flag.code()) != 0
    }

    /// Iterate the flags present, in code order.
    pub fn iter(self) -> impl Iterator<Item = SectionFlag> {
        SectionFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains(*flag))
    }
}

/// A named section of a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Section(Uuid);

#[derive(Debug)]
pub(crate) struct SectionData {
    pub(crate) parent: Option<Module>,
    pub(crate) name: String,
    pub(crate) flags: SectionFlags,
    /// Intervals ordered by (address, identity); unaddressed first.
    pub(crate) intervals: BTreeSet<(Option<Addr>, ByteInterval)>,
    /// Interval ranges, for `find_byte_intervals_on`.
    pub(crate) interval_index: IntervalMap<ByteInterval>,
    /// Derived block ranges, for `find_blocks_on`.
    pub(crate) block_index: IntervalMap<Block>,
}

/// Sort key ordering byte intervals by (address, identity).
pub(crate) fn interval_order_key(ctx: &Context, interval: ByteInterval) -> (Option<Addr>, Uuid) {
    (interval.address(ctx), interval.uuid())
}

/// Sort key ordering blocks by (address, identity); unaddressed first.
pub(crate) fn block_order_key(ctx: &Context, block: Block) -> (Option<Addr>, Uuid) {
    (block.address(ctx), block.uuid())
}

/// The address range a block occupies, when its interval is addressed and
/// the block is nonempty.
fn block_range(ctx: &Context, block: Block) -> Option<AddrRange> {
    let addr = block.address(ctx)?;
    let range = AddrRange::with_size(addr, block.size(ctx));
    (!range.is_empty()).then_some(range)
}

impl Section {
    /// Create a parentless section.
    pub fn new(ctx: &mut Context, name: impl Into<String>) -> Section {
        let uuid = ctx.register_new(NodeKind::Section);
        ctx.sections.insert(
            uuid,
            SectionData {
                parent: None,
                name: name.into(),
                flags: SectionFlags::new(),
                intervals: BTreeSet::new(),
                interval_index: IntervalMap::new(),
                block_index: IntervalMap::new(),
            },
        );
        Section(uuid)
    }

    /// Create a section with a caller-chosen UUID.
    pub fn with_uuid(ctx: &mut Context, uuid: Uuid, name: impl Into<String>) -> Result<Section, Error> {
        ctx.register(uuid, NodeKind::Section)?;
        ctx.sections.insert(
            uuid,
            SectionData {
                parent: None,
                name: name.into(),
                flags: SectionFlags::new(),
                intervals: BTreeSet::new(),
                interval_index: IntervalMap::new(),
                block_index: IntervalMap::new(),
            },
        );
        Ok(Section(uuid))
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> Section {
        Section(uuid)
    }

    /// The section's UUID.
    pub fn uuid(self) -> Uuid {
        self.0
    }

    /// The module that owns this section, if any.
    pub fn module(self, ctx: &Context) -> Option<Module> {
        ctx.section_data(self).parent
    }

    /// The IR transitively owning this section, if any.
    pub fn ir(self, ctx: &Context) -> Option<Ir> {
        self.module(ctx)?.ir(ctx)
    }

    /// The section's name. Not necessarily unique within a module.
    pub fn name(self, ctx: &Context) -> &str {
        &ctx.section_data(self).name
    }

    /// Rename the section, re-indexing it in its module.
    pub fn set_name(self, ctx: &mut Context, name: impl Into<String>) -> ChangeStatus {
        let name = name.into();
        let (old, parent) = {
            let data = ctx.section_data_mut(self);
            if data.name == name {
                return ChangeStatus::NoChange;
            }
            let old = std::mem::replace(&mut data.name, name.clone());
            (old, data.parent)
        };
        if let Some(module) = parent {
            let status = ctx.on_section_name_changed(module, self, &old, &name);
            assert_not_rejected!(status);
        }
        ChangeStatus::Accepted
    }

    /// The section's flag set.
    pub fn flags(self, ctx: &Context) -> SectionFlags {
        ctx.section_data(self).flags
    }

    /// Add a flag.
    pub fn add_flag(self, ctx: &mut Context, flag: SectionFlag) {
        ctx.section_data_mut(self).flags.insert(flag);
    }

    /// Remove a flag.
    pub fn remove_flag(self, ctx: &mut Context, flag: SectionFlag) {
        ctx.section_data_mut(self).flags.remove(flag);
    }

    /// Whether the section carries `flag`.
    pub fn is_flag_set(self, ctx: &Context, flag: SectionFlag) -> bool {
        ctx.section_data(self).flags.contains(flag)
    }

    /// The lowest address of any addressed interval.
    pub fn address(self, ctx: &Context) -> Option<Addr> {
        ctx.section_data(self)
            .intervals
            .iter()
            .find_map(|(addr, _)| *addr)
    }

    /// The span from the lowest interval address to the highest interval
    /// end, when any interval is addressed.
    pub fn size(self, ctx: &Context) -> Option<u64> {
        let data = ctx.section_data(self);
        let mut bounds: Option<(Addr, Addr)> = None;
        for (addr, interval) in &data.intervals {
            let Some(lo) = *addr else { continue };
            let hi = lo.wrapping_add(interval.size(ctx));
            bounds = Some(match bounds {
                None => (lo, hi),
                Some((l, h)) => (l.min(lo), h.max(hi)),
            });
        }
        bounds.map(|(lo, hi)| hi - lo)
    }

    // ===== Byte intervals =====

    /// Iterate owned intervals in (address, identity) order; unaddressed
    /// intervals come first.
    pub fn byte_intervals(self, ctx: &Context) -> impl Iterator<Item = ByteInterval> + '_ {
        ctx.section_data(self).intervals.iter().map(|(_, bi)| *bi)
    }

    /// Move an interval into this section, detaching it from any previous
    /// owner.
    pub fn add_byte_interval(self, ctx: &mut Context, interval: ByteInterval) -> ChangeStatus {
        if ctx.interval_data(interval).parent == Some(self) {
            return ChangeStatus::NoChange;
        }
        if let Some(previous) = ctx.interval_data(interval).parent {
            let status = previous.remove_byte_interval(ctx, interval);
            debug_assert!(status.is_accepted(), "detach from previous section failed");
        }
        ctx.interval_data_mut(interval).parent = Some(self);
        self.attach_interval_indices(ctx, interval);
        ChangeStatus::Accepted
    }

    /// Detach an interval. Returns `NoChange` when the interval is not owned
    /// here.
    pub fn remove_byte_interval(self, ctx: &mut Context, interval: ByteInterval) -> ChangeStatus {
        if ctx.interval_data(interval).parent != Some(self) {
            return ChangeStatus::NoChange;
        }
        self.detach_interval_indices(ctx, interval);
        ctx.interval_data_mut(interval).parent = None;
        ChangeStatus::Accepted
    }

    /// Register `interval` and its blocks in this section's indices and
    /// re-raise the new range to the module.
    fn attach_interval_indices(self, ctx: &mut Context, interval: ByteInterval) {
        let addr = interval.address(ctx);
        let range = interval.range(ctx);
        let blocks: Vec<Block> = interval.blocks(ctx).collect();
        let block_ranges: Vec<(Block, AddrRange)> = blocks
            .iter()
            .filter_map(|b| block_range(ctx, *b).map(|r| (*b, r)))
            .collect();

        let data = ctx.section_data_mut(self);
        data.intervals.insert((addr, interval));
        if let Some(r) = range {
            data.interval_index.insert(r.lo, r.hi, interval);
        }
        for (block, r) in &block_ranges {
            data.block_index.insert(r.lo, r.hi, *block);
        }
        let parent = data.parent;
        if let (Some(module), Some(r)) = (parent, range) {
            let status = ctx.on_section_intervals_changed(module, interval, None, Some(r));
            assert_not_rejected!(status);
        }
    }

    /// Remove `interval` and its blocks from this section's indices and
    /// re-raise the dropped range to the module.
    fn detach_interval_indices(self, ctx: &mut Context, interval: ByteInterval) {
        let addr = interval.address(ctx);
        let range = interval.range(ctx);
        let blocks: Vec<Block> = interval.blocks(ctx).collect();
        let block_ranges: Vec<(Block, AddrRange)> = blocks
            .iter()
            .filter_map(|b| block_range(ctx, *b).map(|r| (*b, r)))
            .collect();

        let data = ctx.section_data_mut(self);
        data.intervals.remove(&(addr, interval));
        if let Some(r) = range {
            data.interval_index.remove(r.lo, r.hi, interval);
        }
        for (block, r) in &block_ranges {
            data.block_index.remove(r.lo, r.hi, *block);
        }
        let parent = data.parent;
        if let (Some(module), Some(r)) = (parent, range) {
            let status = ctx.on_section_intervals_changed(module, interval, Some(r), None);
            assert_not_rejected!(status);
        }
    }

    /// Intervals whose range contains `addr`, in address order.
    pub fn find_byte_intervals_on(self, ctx: &Context, addr: Addr) -> Vec<ByteInterval> {
        let mut found: Vec<ByteInterval> = ctx
            .section_data(self)
            .interval_index
            .values_at(addr)
            .collect();
        found.sort_by_key(|bi| interval_order_key(ctx, *bi));
        found
    }

    /// Intervals that start exactly at `addr`.
    pub fn find_byte_intervals_at(self, ctx: &Context, addr: Addr) -> Vec<ByteInterval> {
        self.find_byte_intervals_between(ctx, addr, addr.wrapping_add(1))
    }

    /// Intervals whose start lies in `[lo, hi)`, in address order.
    pub fn find_byte_intervals_between(self, ctx: &Context, lo: Addr, hi: Addr) -> Vec<ByteInterval> {
        if lo >= hi {
            return Vec::new();
        }
        ctx.section_data(self)
            .intervals
            .range((Some(lo), ByteInterval::from_uuid(Uuid::nil()))..)
            .take_while(|(addr, _)| matches!(addr, Some(a) if *a < hi))
            .map(|(_, bi)| *bi)
            .collect()
    }

    // ===== Blocks =====

    /// Iterate every owned block in address order; blocks of unaddressed
    /// intervals appear in an unspecified but stable order.
    pub fn blocks(self, ctx: &Context) -> impl Iterator<Item = Block> + '_ {
        let streams: Vec<_> = self
            .byte_intervals(ctx)
            .map(|bi| bi.blocks(ctx).collect::<Vec<_>>().into_iter())
            .collect();
        MergeSorted::new(streams, move |a: &Block, b: &Block| {
            block_order_key(ctx, *a).cmp(&block_order_key(ctx, *b))
        })
    }

    /// Iterate owned code blocks in address order.
    pub fn code_blocks(self, ctx: &Context) -> impl Iterator<Item = CodeBlock> + '_ {
        self.blocks(ctx).filter_map(Block::as_code_block)
    }

    /// Iterate owned data blocks in address order.
    pub fn data_blocks(self, ctx: &Context) -> impl Iterator<Item = DataBlock> + '_ {
        self.blocks(ctx).filter_map(Block::as_data_block)
    }

    /// Blocks whose derived range contains `addr`, in address order.
    pub fn find_blocks_on(self, ctx: &Context, addr: Addr) -> Vec<Block> {
        let mut found: Vec<Block> = ctx.section_data(self).block_index.values_at(addr).collect();
        found.sort_by_key(|b| block_order_key(ctx, *b));
        found
    }

    /// Blocks that start exactly at `addr`, in address order.
    pub fn find_blocks_at(self, ctx: &Context, addr: Addr) -> Vec<Block> {
        let mut found: Vec<Block> = ctx
            .section_data(self)
            .block_index
            .values_at(addr)
            .filter(|b| b.address(ctx) == Some(addr))
            .collect();
        found.sort_by_key(|b| block_order_key(ctx, *b));
        found
    }

    /// Blocks whose start lies in `[lo, hi)`, in address order.
    pub fn find_blocks_between(self, ctx: &Context, lo: Addr, hi: Addr) -> Vec<Block> {
        let mut found: Vec<Block> = ctx
            .section_data(self)
            .block_index
            .values_overlapping(lo, hi)
            .into_iter()
            .filter(|b| matches!(b.address(ctx), Some(a) if lo <= a && a < hi))
            .collect();
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

    // ===== Symbolic expressions =====

    /// Iterate every symbolic expression with its interval and offset, in
    /// interval order.
    pub fn symbolic_expressions(
        self,
        ctx: &Context,
    ) -> impl Iterator<Item = (ByteInterval, u64, &SymbolicExpression)> + '_ {
        self.byte_intervals(ctx).flat_map(move |bi| {
            bi.symbolic_expressions(ctx)
                .map(move |(offset, expr)| (bi, offset, expr))
        })
    }

    /// Symbolic expressions recorded at address `addr`.
    pub fn find_symbolic_expressions_at(
        self,
        ctx: &Context,
        addr: Addr,
    ) -> Vec<(ByteInterval, u64, SymbolicExpression)> {
        self.find_symbolic_expressions_between(ctx, addr, addr.wrapping_add(1))
    }

    /// Symbolic expressions recorded at addresses in `[lo, hi)`, in address
    /// order.
    pub fn find_symbolic_expressions_between(
        self,
        ctx: &Context,
        lo: Addr,
        hi: Addr,
    ) -> Vec<(ByteInterval, u64, SymbolicExpression)> {
        let mut found = Vec::new();
        if lo >= hi {
            return found;
        }
        for interval in ctx
            .section_data(self)
            .interval_index
            .values_overlapping(lo, hi)
        {
            let Some(base) = interval.address(ctx) else {
                continue;
            };
            for (offset, expr) in interval.symbolic_expressions(ctx) {
                let addr = base.wrapping_add(offset);
                if lo <= addr && addr < hi {
                    found.push((interval, offset, *expr));
                }
            }
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
}

// Observer handlers: repair this section's indices on child changes and
// re-raise range events to the owning module.
impl Context {
    pub(crate) fn on_interval_address_changed(
        &mut self,
        section: Section,
        interval: ByteInterval,
        old: Option<Addr>,
        new: Option<Addr>,
    ) -> ChangeStatus {
        let size = self.interval_data(interval).size;
        let blocks: Vec<(u64, Block, u64)> = self
            .interval_data(interval)
            .blocks
            .iter()
            .map(|(offset, block)| (*offset, *block, block.size(self)))
            .collect();

        let old_range = old.map(|a| AddrRange::with_size(a, size)).filter(|r| !r.is_empty());
        let new_range = new.map(|a| AddrRange::with_size(a, size)).filter(|r| !r.is_empty());

        let data = self.section_data_mut(section);
        data.intervals.remove(&(old, interval));
        data.intervals.insert((new, interval));
        if let Some(r) = old_range {
            data.interval_index.remove(r.lo, r.hi, interval);
        }
        if let Some(r) = new_range {
            data.interval_index.insert(r.lo, r.hi, interval);
        }
        for (offset, block, block_size) in &blocks {
            if *block_size == 0 {
                continue;
            }
            if let Some(base) = old {
                let lo = base.wrapping_add(*offset);
                data.block_index.remove(lo, lo.wrapping_add(*block_size), *block);
            }
            if let Some(base) = new {
                let lo = base.wrapping_add(*offset);
                data.block_index.insert(lo, lo.wrapping_add(*block_size), *block);
            }
        }
        let parent = data.parent;

        if let Some(module) = parent {
            if old_range.is_some() || new_range.is_some() {
                let status =
                    self.on_section_intervals_changed(module, interval, old_range, new_range);
                assert_not_rejected!(status);
            }
        }
        ChangeStatus::Accepted
    }

    pub(crate) fn on_interval_size_changed(
        &mut self,
        section: Section,
        interval: ByteInterval,
        old: u64,
        new: u64,
    ) -> ChangeStatus {
        let Some(addr) = self.interval_data(interval).address else {
            return ChangeStatus::Accepted;
        };
        let old_range = Some(AddrRange::with_size(addr, old)).filter(|r| !r.is_empty());
        let new_range = Some(AddrRange::with_size(addr, new)).filter(|r| !r.is_empty());

        let data = self.section_data_mut(section);
        if let Some(r) = old_range {
            data.interval_index.remove(r.lo, r.hi, interval);
        }
        if let Some(r) = new_range {
            data.interval_index.insert(r.lo, r.hi, interval);
        }
        let parent = data.parent;

        if let Some(module) = parent {
            let status = self.on_section_intervals_changed(module, interval, old_range, new_range);
            assert_not_rejected!(status);
        }
        ChangeStatus::Accepted
    }

    pub(crate) fn on_blocks_added(
        &mut self,
        section: Section,
        _interval: ByteInterval,
        block: Block,
    ) -> ChangeStatus {
        if let Some(r) = block_range(self, block) {
            self.section_data_mut(section)
                .block_index
                .insert(r.lo, r.hi, block);
        }
        ChangeStatus::Accepted
    }

    pub(crate) fn on_blocks_removed(
        &mut self,
        section: Section,
        _interval: ByteInterval,
        block: Block,
    ) -> ChangeStatus {
        if let Some(r) = block_range(self, block) {
            self.section_data_mut(section)
                .block_index
                .remove(r.lo, r.hi, block);
        }
        ChangeStatus::Accepted
    }

    pub(crate) fn on_block_size_changed(
        &mut self,
        section: Section,
        block: Block,
        old: u64,
        new: u64,
    ) -> ChangeStatus {
        let Some(addr) = block.address(self) else {
            return ChangeStatus::Accepted;
        };
        let data = self.section_data_mut(section);
        if old > 0 {
            data.block_index.remove(addr, addr.wrapping_add(old), block);
        }
        if new > 0 {
            data.block_index.insert(addr, addr.wrapping_add(new), block);
        }
        ChangeStatus::Accepted
    }
}
