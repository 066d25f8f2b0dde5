//! Byte intervals: contiguous regions of bytes, possibly unaddressed.
//!
//! A byte interval has a logical `size` backed by an initialized prefix of
//! at most that many bytes; reads past the prefix yield zeros. It owns the
//! code and data blocks placed at offsets within it and the symbolic
//! expressions keyed by offset. The address is optional: an unaddressed
//! interval makes every child unaddressed and contributes nothing to any
//! ancestor address index.

use crate::block::Block;
use crate::node::NodeKind;
use crate::observer::assert_not_rejected;
use crate::symbol::{capture_symbols_referencing, reindex_captured_symbols};
use crate::symbolic_expression::SymbolicExpression;
use crate::{Addr, AddrRange, ByteOrder, ChangeStatus, CodeBlock, Context, DataBlock, Error, Module, Section};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width integers readable from and writable to a byte interval.
pub trait Word: Copy + sealed::Sealed {
    /// Width in bytes.
    const WIDTH: usize;

    /// Assemble a value from native-order bytes.
    fn from_ne(bytes: &[u8]) -> Self;

    /// Write the value as native-order bytes.
    fn to_ne(self, out: &mut [u8]);
}

macro_rules! impl_word {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Word for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn from_ne(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_ne_bytes(buf)
                }

                fn to_ne(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }
            }
        )*
    };
}

impl_word!(u8, i8, u16, i16, u32, i32, u64, i64);

/// A contiguous region of bytes owning the blocks and symbolic expressions
/// within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteInterval(Uuid);

#[derive(Debug)]
pub(crate) struct ByteIntervalData {
    pub(crate) parent: Option<Section>,
    pub(crate) address: Option<Addr>,
    pub(crate) size: u64,
    /// Initialized prefix; `bytes.len() <= size`.
    pub(crate) bytes: Vec<u8>,
    /// Owned blocks, ordered by offset then identity. Offsets may repeat.
    pub(crate) blocks: BTreeSet<(u64, Block)>,
    pub(crate) symbolic_expressions: BTreeMap<u64, SymbolicExpression>,
}

impl ByteInterval {
    /// Create a parentless interval of `size` uninitialized bytes.
    pub fn new(ctx: &mut Context, address: Option<Addr>, size: u64) -> ByteInterval {
        let uuid = ctx.register_new(NodeKind::ByteInterval);
        ctx.intervals.insert(
            uuid,
            ByteIntervalData {
                parent: None,
                address,
                size,
                bytes: Vec::new(),
                blocks: BTreeSet::new(),
                symbolic_expressions: BTreeMap::new(),
            },
        );
        ByteInterval(uuid)
    }

    /// Create an interval whose size and initialized bytes are `contents`.
    pub fn with_contents(
        ctx: &mut Context,
        address: Option<Addr>,
        contents: Vec<u8>,
    ) -> ByteInterval {
        let interval = ByteInterval::new(ctx, address, contents.len() as u64);
        ctx.interval_data_mut(interval).bytes = contents;
        interval
    }

    /// Create an interval with a caller-chosen UUID.
    ///
    /// `contents` longer than `size` are truncated to it.
    pub fn with_uuid(
        ctx: &mut Context,
        uuid: Uuid,
        address: Option<Addr>,
        size: u64,
        mut contents: Vec<u8>,
    ) -> Result<ByteInterval, Error> {
        ctx.register(uuid, NodeKind::ByteInterval)?;
        if (contents.len() as u64) > size {
            contents.truncate(size as usize);
        }
        ctx.intervals.insert(
            uuid,
            ByteIntervalData {
                parent: None,
                address,
                size,
                bytes: contents,
                blocks: BTreeSet::new(),
                symbolic_expressions: BTreeMap::new(),
            },
        );
        Ok(ByteInterval(uuid))
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> ByteInterval {
        ByteInterval(uuid)
    }

    /// The interval's UUID.
    pub fn uuid(self) -> Uuid {
        self.0
    }

    /// The section that owns this interval, if any.
    pub fn section(self, ctx: &Context) -> Option<Section> {
        ctx.interval_data(self).parent
    }

    /// The module transitively owning this interval, if any.
    pub fn module(self, ctx: &Context) -> Option<Module> {
        self.section(ctx)?.module(ctx)
    }

    /// The interval's absolute address, if it has one.
    pub fn address(self, ctx: &Context) -> Option<Addr> {
        ctx.interval_data(self).address
    }

    /// The address range the interval occupies, when addressed and nonempty.
    pub fn range(self, ctx: &Context) -> Option<AddrRange> {
        let data = ctx.interval_data(self);
        let addr = data.address?;
        let range = AddrRange::with_size(addr, data.size);
        (!range.is_empty()).then_some(range)
    }

    /// Assign or clear the interval's address.
    ///
    /// Transitions in either direction re-index the interval, its blocks,
    /// and every symbol whose referent lies inside it.
    pub fn set_address(self, ctx: &mut Context, address: Option<Addr>) -> ChangeStatus {
        let data = ctx.interval_data(self);
        if data.address == address {
            return ChangeStatus::NoChange;
        }
        let old = data.address;
        let block_uuids: Vec<Uuid> = data.blocks.iter().map(|(_, b)| b.uuid()).collect();
        let captured = capture_symbols_referencing(ctx, &block_uuids);
        ctx.interval_data_mut(self).address = address;
        if let Some(section) = ctx.interval_data(self).parent {
            let status = ctx.on_interval_address_changed(section, self, old, address);
            assert_not_rejected!(status);
        }
        reindex_captured_symbols(ctx, captured);
        ChangeStatus::Accepted
    }

    /// The interval's logical size in bytes.
    pub fn size(self, ctx: &Context) -> u64 {
        ctx.interval_data(self).size
    }

    /// Resize the interval.
    ///
    /// Growing pads the logical size only; shrinking truncates the
    /// initialized prefix when the new size is smaller than it.
    pub fn set_size(self, ctx: &mut Context, size: u64) -> ChangeStatus {
        let (old, parent) = {
            let data = ctx.interval_data_mut(self);
            if data.size == size {
                return ChangeStatus::NoChange;
            }
            let old = std::mem::replace(&mut data.size, size);
            if (data.bytes.len() as u64) > size {
                data.bytes.truncate(size as usize);
            }
            (old, data.parent)
        };
        if let Some(section) = parent {
            let status = ctx.on_interval_size_changed(section, self, old, size);
            assert_not_rejected!(status);
        }
        ChangeStatus::Accepted
    }

    /// Length of the initialized prefix.
    pub fn initialized_size(self, ctx: &Context) -> u64 {
        ctx.interval_data(self).bytes.len() as u64
    }

    /// Grow (zero-filling) or shrink the initialized prefix. Capped at the
    /// logical size.
    pub fn set_initialized_size(self, ctx: &mut Context, size: u64) -> ChangeStatus {
        let data = ctx.interval_data_mut(self);
        let size = size.min(data.size);
        if data.bytes.len() as u64 == size {
            return ChangeStatus::NoChange;
        }
        data.bytes.resize(size as usize, 0);
        ChangeStatus::Accepted
    }

    /// The initialized prefix.
    pub fn initialized_bytes(self, ctx: &Context) -> &[u8] {
        &ctx.interval_data(self).bytes
    }

    /// Iterate `len` bytes starting at `offset`.
    ///
    /// Positions past the initialized prefix yield zero; the iteration is
    /// clipped at the logical size.
    pub fn bytes(self, ctx: &Context, offset: u64, len: u64) -> impl Iterator<Item = u8> + '_ {
        let data = ctx.interval_data(self);
        let end = offset.saturating_add(len).min(data.size);
        let start = offset.min(end);
        (start..end).map(move |i| data.bytes.get(i as usize).copied().unwrap_or(0))
    }

    /// Write bytes at `offset`, zero-filling any gap past the initialized
    /// prefix. Writes are clipped at the logical size.
    pub fn set_bytes(self, ctx: &mut Context, offset: u64, bytes: &[u8]) -> ChangeStatus {
        let data = ctx.interval_data_mut(self);
        let end = offset.saturating_add(bytes.len() as u64).min(data.size);
        if end <= offset {
            return ChangeStatus::NoChange;
        }
        let writable = (end - offset) as usize;
        if (data.bytes.len() as u64) < end {
            data.bytes.resize(end as usize, 0);
        }
        data.bytes[offset as usize..end as usize].copy_from_slice(&bytes[..writable]);
        ChangeStatus::Accepted
    }

    /// Read `count` fixed-width values starting at `offset`.
    ///
    /// Values are assembled from `T::WIDTH`-byte groups; a group is
    /// byte-reversed when `input` and `output` are opposite orders
    /// (`Undefined` reverses nothing). Bytes past the initialized prefix
    /// read as zero and groups past the logical size are zero-padded.
    pub fn read_words<'a, T: Word>(
        self,
        ctx: &'a Context,
        offset: u64,
        count: usize,
        input: ByteOrder,
        output: ByteOrder,
    ) -> impl Iterator<Item = T> + 'a {
        let reverse = input.is_opposite(output);
        (0..count).map(move |i| {
            let start = offset.wrapping_add((i * T::WIDTH) as u64);
            let mut buf = [0u8; 8];
            for (j, byte) in self.bytes(ctx, start, T::WIDTH as u64).enumerate() {
                buf[j] = byte;
            }
            if reverse {
                buf[..T::WIDTH].reverse();
            }
            T::from_ne(&buf[..T::WIDTH])
        })
    }

    /// Store one fixed-width value at `offset`, reversing bytes when the
    /// orders are opposite. Clipped at the logical size.
    pub fn write_word<T: Word>(
        self,
        ctx: &mut Context,
        offset: u64,
        value: T,
        input: ByteOrder,
        output: ByteOrder,
    ) -> ChangeStatus {
        let mut buf = [0u8; 8];
        value.to_ne(&mut buf[..T::WIDTH]);
        if input.is_opposite(output) {
            buf[..T::WIDTH].reverse();
        }
        self.set_bytes(ctx, offset, &buf[..T::WIDTH])
    }

    // ===== Blocks =====

    /// Iterate owned blocks in offset order, identity-breaking ties.
    pub fn blocks(self, ctx: &Context) -> impl Iterator<Item = Block> + '_ {
        ctx.interval_data(self).blocks.iter().map(|(_, b)| *b)
    }

    /// Iterate owned code blocks in offset order.
    pub fn code_blocks(self, ctx: &Context) -> impl Iterator<Item = CodeBlock> + '_ {
        self.blocks(ctx).filter_map(Block::as_code_block)
    }

    /// Iterate owned data blocks in offset order.
    pub fn data_blocks(self, ctx: &Context) -> impl Iterator<Item = DataBlock> + '_ {
        self.blocks(ctx).filter_map(Block::as_data_block)
    }

    /// Place a block at `offset`, moving it out of any previous interval.
    ///
    /// Multiple blocks may share an offset, and a block's extent may run
    /// past the interval's size.
    pub fn add_block(self, ctx: &mut Context, offset: u64, block: Block) -> ChangeStatus {
        if block.parent(ctx) == Some(self) && block.offset(ctx) == offset {
            return ChangeStatus::NoChange;
        }
        let captured = capture_symbols_referencing(ctx, &[block.uuid()]);
        if let Some(previous) = block.parent(ctx) {
            previous.detach_block(ctx, block);
        }
        block.set_parent(ctx, Some(self), offset);
        ctx.interval_data_mut(self).blocks.insert((offset, block));
        if let Some(section) = ctx.interval_data(self).parent {
            let status = ctx.on_blocks_added(section, self, block);
            assert_not_rejected!(status);
        }
        reindex_captured_symbols(ctx, captured);
        ChangeStatus::Accepted
    }

    /// Place a code block at `offset`.
    pub fn add_code_block(self, ctx: &mut Context, offset: u64, block: CodeBlock) -> ChangeStatus {
        self.add_block(ctx, offset, Block::Code(block))
    }

    /// Place a data block at `offset`.
    pub fn add_data_block(self, ctx: &mut Context, offset: u64, block: DataBlock) -> ChangeStatus {
        self.add_block(ctx, offset, Block::Data(block))
    }

    /// Detach a block. Returns `NoChange` when the block is not owned here.
    pub fn remove_block(self, ctx: &mut Context, block: Block) -> ChangeStatus {
        if block.parent(ctx) != Some(self) {
            return ChangeStatus::NoChange;
        }
        let captured = capture_symbols_referencing(ctx, &[block.uuid()]);
        self.detach_block(ctx, block);
        let offset = block.offset(ctx);
        block.set_parent(ctx, None, offset);
        reindex_captured_symbols(ctx, captured);
        ChangeStatus::Accepted
    }

    /// Unlink `block` from the block set and ancestor indices, leaving its
    /// parent field to the caller.
    fn detach_block(self, ctx: &mut Context, block: Block) {
        let offset = block.offset(ctx);
        ctx.interval_data_mut(self).blocks.remove(&(offset, block));
        if let Some(section) = ctx.interval_data(self).parent {
            let status = ctx.on_blocks_removed(section, self, block);
            assert_not_rejected!(status);
        }
    }

    // ===== Symbolic expressions =====

    /// Iterate symbolic expressions in offset order.
    pub fn symbolic_expressions(
        self,
        ctx: &Context,
    ) -> impl Iterator<Item = (u64, &SymbolicExpression)> + '_ {
        ctx.interval_data(self)
            .symbolic_expressions
            .iter()
            .map(|(offset, expr)| (*offset, expr))
    }

    /// The symbolic expression at `offset`, if any.
    pub fn symbolic_expression(self, ctx: &Context, offset: u64) -> Option<&SymbolicExpression> {
        ctx.interval_data(self).symbolic_expressions.get(&offset)
    }

    /// Record a symbolic expression at `offset`, replacing any existing one.
    pub fn set_symbolic_expression(
        self,
        ctx: &mut Context,
        offset: u64,
        expr: SymbolicExpression,
    ) -> ChangeStatus {
        let map = &mut ctx.interval_data_mut(self).symbolic_expressions;
        if map.get(&offset) == Some(&expr) {
            return ChangeStatus::NoChange;
        }
        map.insert(offset, expr);
        ChangeStatus::Accepted
    }

    /// Erase the symbolic expression at `offset`.
    pub fn remove_symbolic_expression(self, ctx: &mut Context, offset: u64) -> ChangeStatus {
        match ctx
            .interval_data_mut(self)
            .symbolic_expressions
            .remove(&offset)
        {
            Some(_) => ChangeStatus::Accepted,
            None => ChangeStatus::NoChange,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;

    #[test]
    fn test_bytes_zero_extend_past_initialized() {
        let mut ctx = Context::new();
        let bi = ByteInterval::new(&mut ctx, None, 8);
        bi.set_bytes(&mut ctx, 0, &[1, 2, 3]);
        assert_eq!(
            bi.bytes(&ctx, 0, 8).collect::<Vec<_>>(),
            vec![1, 2, 3, 0, 0, 0, 0, 0]
        );
        // Clipped at the logical size.
        assert_eq!(bi.bytes(&ctx, 6, 10).collect::<Vec<_>>(), vec![0, 0]);
    }

    #[test]
    fn test_shrink_truncates_initialized_prefix() {
        let mut ctx = Context::new();
        let bi = ByteInterval::with_contents(&mut ctx, None, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(bi.initialized_size(&ctx), 6);
        bi.set_size(&mut ctx, 3);
        assert_eq!(bi.initialized_size(&ctx), 3);
        assert_eq!(bi.initialized_bytes(&ctx), &[1, 2, 3]);
        // Growing back pads the logical size only.
        bi.set_size(&mut ctx, 6);
        assert_eq!(bi.initialized_size(&ctx), 3);
    }

    #[test]
    fn test_initialized_size_capped_at_size() {
        let mut ctx = Context::new();
        let bi = ByteInterval::new(&mut ctx, None, 4);
        bi.set_initialized_size(&mut ctx, 100);
        assert_eq!(bi.initialized_size(&ctx), 4);
        assert_eq!(bi.initialized_bytes(&ctx), &[0, 0, 0, 0]);
        bi.set_initialized_size(&mut ctx, 2);
        assert_eq!(bi.initialized_size(&ctx), 2);
    }

    #[test]
    fn test_read_words_endianness() {
        let mut ctx = Context::new();
        let bi = ByteInterval::with_contents(&mut ctx, None, vec![0x12, 0x34, 0x56, 0x78]);
        let values: Vec<u16> = bi
            .read_words(&ctx, 0, 2, ByteOrder::Little, ByteOrder::Little)
            .collect();
        assert_eq!(values, vec![u16::from_ne_bytes([0x12, 0x34]), u16::from_ne_bytes([0x56, 0x78])]);
        let swapped: Vec<u16> = bi
            .read_words(&ctx, 0, 2, ByteOrder::Big, ByteOrder::Little)
            .collect();
        assert_eq!(swapped, vec![u16::from_ne_bytes([0x34, 0x12]), u16::from_ne_bytes([0x78, 0x56])]);
    }

    #[test]
    fn test_write_word_reverses_on_store() {
        let mut ctx = Context::new();
        let bi = ByteInterval::new(&mut ctx, None, 4);
        bi.write_word::<u32>(
            &mut ctx,
            0,
            u32::from_ne_bytes([0x11, 0x22, 0x33, 0x44]),
            ByteOrder::Big,
            ByteOrder::Little,
        );
        assert_eq!(bi.initialized_bytes(&ctx), &[0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_blocks_ordered_by_offset() {
        let mut ctx = Context::new();
        let bi = ByteInterval::new(&mut ctx, None, 16);
        let a = CodeBlock::new(&mut ctx, 4);
        let b = DataBlock::new(&mut ctx, 4);
        let c = CodeBlock::new(&mut ctx, 4);
        bi.add_code_block(&mut ctx, 8, a);
        bi.add_data_block(&mut ctx, 0, b);
        bi.add_code_block(&mut ctx, 4, c);
        let offsets: Vec<u64> = bi.blocks(&ctx).map(|blk| blk.offset(&ctx)).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(bi.code_blocks(&ctx).count(), 2);
        assert_eq!(bi.data_blocks(&ctx).count(), 1);
    }

    #[test]
    fn test_block_move_between_intervals() {
        let mut ctx = Context::new();
        let first = ByteInterval::new(&mut ctx, None, 8);
        let second = ByteInterval::new(&mut ctx, None, 8);
        let block = CodeBlock::new(&mut ctx, 4);
        first.add_code_block(&mut ctx, 0, block);
        assert_eq!(second.add_code_block(&mut ctx, 2, block), ChangeStatus::Accepted);
        assert_eq!(block.byte_interval(&ctx), Some(second));
        assert_eq!(block.offset(&ctx), 2);
        assert_eq!(first.blocks(&ctx).count(), 0);
    }

    #[test]
    fn test_remove_block_not_owned_is_no_change() {
        let mut ctx = Context::new();
        let bi = ByteInterval::new(&mut ctx, None, 8);
        let stranger = CodeBlock::new(&mut ctx, 4);
        assert_eq!(
            bi.remove_block(&mut ctx, Block::Code(stranger)),
            ChangeStatus::NoChange
        );
    }

    #[test]
    fn test_symbolic_expression_replaces_at_offset() {
        let mut ctx = Context::new();
        let bi = ByteInterval::new(&mut ctx, None, 8);
        let s1 = Symbol::new(&mut ctx, "a");
        let s2 = Symbol::new(&mut ctx, "b");
        bi.set_symbolic_expression(&mut ctx, 4, SymbolicExpression::addr_const(s1, 0));
        bi.set_symbolic_expression(&mut ctx, 4, SymbolicExpression::addr_const(s2, 8));
        assert_eq!(bi.symbolic_expressions(&ctx).count(), 1);
        let expr = bi.symbolic_expression(&ctx, 4).copied();
        assert_eq!(expr, Some(SymbolicExpression::addr_const(s2, 8)));
        assert_eq!(bi.remove_symbolic_expression(&mut ctx, 4), ChangeStatus::Accepted);
        assert_eq!(bi.remove_symbolic_expression(&mut ctx, 4), ChangeStatus::NoChange);
    }
}
