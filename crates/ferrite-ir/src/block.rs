//! Code and data blocks.
//!
//! Blocks own no bytes; they mark a range of their byte interval as
//! instructions or data. Extent, offset, and address all derive from the
//! owning interval. A block may extend past its interval's initialized
//! region and even past its logical size; readers clip.

use crate::node::NodeKind;
use crate::observer::assert_not_rejected;
use crate::{Addr, ByteInterval, ChangeStatus, Context, Error, Module};
use uuid::Uuid;

/// Variations on decoding an ISA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DecodeMode {
    /// The ISA's default decode mode.
    #[default]
    Default = 0,
    /// Thumb mode for 32-bit ARM.
    Thumb = 1,
}

impl DecodeMode {
    /// The stable wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a stable wire code.
    pub fn from_code(code: u8) -> Option<DecodeMode> {
        match code {
            0 => Some(DecodeMode::Default),
            1 => Some(DecodeMode::Thumb),
            _ => None,
        }
    }
}

/// A basic block of instructions within a byte interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodeBlock(Uuid);

#[derive(Debug)]
pub(crate) struct CodeBlockData {
    pub(crate) parent: Option<ByteInterval>,
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) decode_mode: DecodeMode,
}

impl CodeBlock {
    /// Create a parentless code block of `size` bytes.
    pub fn new(ctx: &mut Context, size: u64) -> CodeBlock {
        let uuid = ctx.register_new(NodeKind::CodeBlock);
        ctx.code_blocks.insert(
            uuid,
            CodeBlockData {
                parent: None,
                offset: 0,
                size,
                decode_mode: DecodeMode::Default,
            },
        );
        CodeBlock(uuid)
    }

    /// Create a code block with a caller-chosen UUID and decode mode.
    pub fn with_uuid(
        ctx: &mut Context,
        uuid: Uuid,
        size: u64,
        decode_mode: DecodeMode,
    ) -> Result<CodeBlock, Error> {
        ctx.register(uuid, NodeKind::CodeBlock)?;
        ctx.code_blocks.insert(
            uuid,
            CodeBlockData {
                parent: None,
                offset: 0,
                size,
                decode_mode,
            },
        );
        Ok(CodeBlock(uuid))
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> CodeBlock {
        CodeBlock(uuid)
    }

    /// The block's UUID.
    pub fn uuid(self) -> Uuid {
        self.0
    }

    /// The byte interval that owns this block, if any.
    pub fn byte_interval(self, ctx: &Context) -> Option<ByteInterval> {
        ctx.code_block_data(self).parent
    }

    /// The module transitively owning this block, if any.
    pub fn module(self, ctx: &Context) -> Option<Module> {
        self.byte_interval(ctx)?.section(ctx)?.module(ctx)
    }

    /// The block's size in bytes.
    pub fn size(self, ctx: &Context) -> u64 {
        ctx.code_block_data(self).size
    }

    /// The block's offset from the start of its interval.
    ///
    /// Meaningful while the block is owned by an interval; zero otherwise.
    pub fn offset(self, ctx: &Context) -> u64 {
        ctx.code_block_data(self).offset
    }

    /// The block's address, when its interval has one.
    pub fn address(self, ctx: &Context) -> Option<Addr> {
        let data = ctx.code_block_data(self);
        let base = data.parent?.address(ctx)?;
        Some(base.wrapping_add(data.offset))
    }

    /// The decode mode for instructions in this block.
    pub fn decode_mode(self, ctx: &Context) -> DecodeMode {
        ctx.code_block_data(self).decode_mode
    }

    /// Set the decode mode.
    pub fn set_decode_mode(self, ctx: &mut Context, mode: DecodeMode) {
        ctx.code_block_data_mut(self).decode_mode = mode;
    }

    /// Resize the block.
    ///
    /// This changes only the block's extent; the interval's size, bytes, and
    /// symbolic expressions are untouched.
    pub fn set_size(self, ctx: &mut Context, size: u64) -> ChangeStatus {
        if ctx.code_block_data(self).size == size {
            return ChangeStatus::NoChange;
        }
        Block::Code(self).apply_size_change(ctx, size)
    }
}

/// A block of uninterpreted data within a byte interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataBlock(Uuid);

#[derive(Debug)]
pub(crate) struct DataBlockData {
    pub(crate) parent: Option<ByteInterval>,
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

impl DataBlock {
    /// Create a parentless data block of `size` bytes.
    pub fn new(ctx: &mut Context, size: u64) -> DataBlock {
        let uuid = ctx.register_new(NodeKind::DataBlock);
        ctx.data_blocks.insert(
            uuid,
            DataBlockData {
                parent: None,
                offset: 0,
                size,
            },
        );
        DataBlock(uuid)
    }

    /// Create a data block with a caller-chosen UUID.
    pub fn with_uuid(ctx: &mut Context, uuid: Uuid, size: u64) -> Result<DataBlock, Error> {
        ctx.register(uuid, NodeKind::DataBlock)?;
        ctx.data_blocks.insert(
            uuid,
            DataBlockData {
                parent: None,
                offset: 0,
                size,
            },
        );
        Ok(DataBlock(uuid))
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> DataBlock {
        DataBlock(uuid)
    }

    /// The block's UUID.
    pub fn uuid(self) -> Uuid {
        self.0
    }

    /// The byte interval that owns this block, if any.
    pub fn byte_interval(self, ctx: &Context) -> Option<ByteInterval> {
        ctx.data_block_data(self).parent
    }

    /// The module transitively owning this block, if any.
    pub fn module(self, ctx: &Context) -> Option<Module> {
        self.byte_interval(ctx)?.section(ctx)?.module(ctx)
    }

    /// The block's size in bytes.
    pub fn size(self, ctx: &Context) -> u64 {
        ctx.data_block_data(self).size
    }

    /// The block's offset from the start of its interval.
    ///
    /// Meaningful while the block is owned by an interval; zero otherwise.
    pub fn offset(self, ctx: &Context) -> u64 {
        ctx.data_block_data(self).offset
    }

    /// The block's address, when its interval has one.
    pub fn address(self, ctx: &Context) -> Option<Addr> {
        let data = ctx.data_block_data(self);
        let base = data.parent?.address(ctx)?;
        Some(base.wrapping_add(data.offset))
    }

    /// Resize the block.
    pub fn set_size(self, ctx: &mut Context, size: u64) -> ChangeStatus {
        if ctx.data_block_data(self).size == size {
            return ChangeStatus::NoChange;
        }
        Block::Data(self).apply_size_change(ctx, size)
    }
}

/// Either kind of byte-owning block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Block {
    /// A [`CodeBlock`].
    Code(CodeBlock),
    /// A [`DataBlock`].
    Data(DataBlock),
}

impl Block {
    /// The block's UUID.
    pub fn uuid(self) -> Uuid {
        match self {
            Block::Code(b) => b.uuid(),
            Block::Data(b) => b.uuid(),
        }
    }

    /// The code block, if this is one.
    pub fn as_code_block(self) -> Option<CodeBlock> {
        match self {
            Block::Code(b) => Some(b),
            Block::Data(_) => None,
        }
    }

    /// The data block, if this is one.
    pub fn as_data_block(self) -> Option<DataBlock> {
        match self {
            Block::Code(_) => None,
            Block::Data(b) => Some(b),
        }
    }

    /// The byte interval that owns this block, if any.
    pub fn byte_interval(self, ctx: &Context) -> Option<ByteInterval> {
        match self {
            Block::Code(b) => b.byte_interval(ctx),
            Block::Data(b) => b.byte_interval(ctx),
        }
    }

    /// The block's size in bytes.
    pub fn size(self, ctx: &Context) -> u64 {
        match self {
            Block::Code(b) => b.size(ctx),
            Block::Data(b) => b.size(ctx),
        }
    }

    /// The block's offset from the start of its interval.
    pub fn offset(self, ctx: &Context) -> u64 {
        match self {
            Block::Code(b) => b.offset(ctx),
            Block::Data(b) => b.offset(ctx),
        }
    }

    /// The block's address, when its interval has one.
    pub fn address(self, ctx: &Context) -> Option<Addr> {
        match self {
            Block::Code(b) => b.address(ctx),
            Block::Data(b) => b.address(ctx),
        }
    }

    pub(crate) fn parent(self, ctx: &Context) -> Option<ByteInterval> {
        self.byte_interval(ctx)
    }

    pub(crate) fn set_parent(self, ctx: &mut Context, parent: Option<ByteInterval>, offset: u64) {
        match self {
            Block::Code(b) => {
                let data = ctx.code_block_data_mut(b);
                data.parent = parent;
                data.offset = offset;
            }
            Block::Data(b) => {
                let data = ctx.data_block_data_mut(b);
                data.parent = parent;
                data.offset = offset;
            }
        }
    }

    /// Store a new size and run the observer chain for it.
    fn apply_size_change(self, ctx: &mut Context, size: u64) -> ChangeStatus {
        let captured = crate::symbol::capture_symbols_referencing(ctx, &[self.uuid()]);
        let old = match self {
            Block::Code(b) => {
                let data = ctx.code_block_data_mut(b);
                std::mem::replace(&mut data.size, size)
            }
            Block::Data(b) => {
                let data = ctx.data_block_data_mut(b);
                std::mem::replace(&mut data.size, size)
            }
        };
        if let Some(section) = self.parent(ctx).and_then(|bi| bi.section(ctx)) {
            let status = ctx.on_block_size_changed(section, self, old, size);
            assert_not_rejected!(status);
        }
        crate::symbol::reindex_captured_symbols(ctx, captured);
        ChangeStatus::Accepted
    }
}
