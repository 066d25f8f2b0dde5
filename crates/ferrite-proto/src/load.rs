//! Graph deserialization.
//!
//! Loading runs in two passes. The first pass constructs every node with
//! its serialized UUID and records the cross-references it cannot yet
//! resolve (entry points, symbol referents, symbolic-expression operands,
//! CFG endpoints). The second pass resolves them against the rebuilt UUID
//! registry; a reference that does not resolve to a node of the right kind
//! is dropped and reported as a warning, never an error.

use crate::save::{payload_tag, HEADER_LEN, MAGIC};
use crate::wire::{DecodeError, WireReader};
use ferrite_ir::{
    Addr, AuxData, AuxDataContainer, ByteInterval, CfgNode, Context, DataBlock, DecodeMode,
    FileFormat, Ir, Isa, Module, Node, ProxyBlock, Referent, Section, SectionFlags, SymAttributes,
    Symbol, SymbolPayload, SymbolicExpression, ByteOrder, CodeBlock, IR_VERSION,
};
use thiserror::Error;
use uuid::Uuid;

/// Errors that abort a load.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The input did not start with the Ferrite magic number.
    #[error("invalid magic number: expected FEIR, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// The input was written by a newer library version.
    #[error("unsupported version: {0} (current: {IR_VERSION})")]
    UnsupportedVersion(u32),

    /// The payload checksum did not match.
    #[error("checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The checksum recorded in the header.
        expected: u32,
        /// The checksum of the payload as read.
        actual: u32,
    },

    /// The payload bytes were malformed.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A serialized UUID collided with a node already in the context.
    #[error("graph error: {0}")]
    Graph(#[from] ferrite_ir::Error),
}

/// A cross-reference dropped during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadWarning {
    /// A module's entry point did not resolve to a code block.
    #[error("module {module} entry point {target} does not resolve to a code block")]
    UnresolvedEntryPoint {
        /// The module whose entry point was dropped.
        module: Uuid,
        /// The unresolvable target.
        target: Uuid,
    },

    /// A symbol's referent did not resolve to a block or proxy.
    #[error("symbol {symbol} referent {target} does not resolve to a block")]
    UnresolvedSymbolReferent {
        /// The symbol left without a referent payload.
        symbol: Uuid,
        /// The unresolvable target.
        target: Uuid,
    },

    /// A symbolic expression's operand did not resolve to a symbol.
    #[error("symbolic expression at {interval}+{offset} references unknown symbol {target}")]
    UnresolvedSymbolicExpression {
        /// The interval that recorded the expression.
        interval: Uuid,
        /// The expression's offset within the interval.
        offset: u64,
        /// The unresolvable operand.
        target: Uuid,
    },

    /// A CFG vertex did not resolve to a code or proxy block.
    #[error("CFG vertex {vertex} does not resolve to a code or proxy block")]
    UnresolvedCfgVertex {
        /// The unresolvable vertex.
        vertex: Uuid,
    },

    /// A CFG edge endpoint did not resolve.
    #[error("CFG edge {edge_source} -> {target} has an unresolvable endpoint")]
    UnresolvedCfgEdge {
        /// The edge's source.
        edge_source: Uuid,
        /// The edge's target.
        target: Uuid,
    },
}

/// A successfully loaded IR plus the cross-references dropped on the way.
#[derive(Debug)]
pub struct Loaded {
    /// The rebuilt IR.
    pub ir: Ir,
    /// Non-fatal resolution failures, in discovery order.
    pub warnings: Vec<LoadWarning>,
}

/// Raw symbolic expression awaiting symbol resolution.
enum PendingExpr {
    AddrConst { offset: i64, symbol: Uuid },
    AddrAddr { scale: i64, offset: i64, symbol1: Uuid, symbol2: Uuid },
    StackConst { offset: i64, symbol: Uuid },
}

struct PendingEdge {
    source: Uuid,
    target: Uuid,
    label: Option<(bool, bool, u8)>,
}

/// Cross-references collected during the construction pass.
#[derive(Default)]
struct Pending {
    entry_points: Vec<(Module, Uuid)>,
    referents: Vec<(Symbol, Uuid)>,
    exprs: Vec<(ByteInterval, u64, SymAttributes, PendingExpr)>,
    cfg_vertices: Vec<Uuid>,
    cfg_edges: Vec<PendingEdge>,
}

/// Decode an IR image into `ctx`.
pub fn load_ir(ctx: &mut Context, data: &[u8]) -> Result<Loaded, LoadError> {
    let mut reader = WireReader::new(data);

    let mut magic = [0u8; 4];
    magic.copy_from_slice(reader.read_bytes(4)?);
    if magic != MAGIC {
        return Err(LoadError::InvalidMagic(magic));
    }
    let version = reader.read_u32()?;
    if version > IR_VERSION {
        return Err(LoadError::UnsupportedVersion(version));
    }
    let _flags = reader.read_u32()?;
    let expected = reader.read_u32()?;
    let actual = crc32fast::hash(&data[HEADER_LEN.min(data.len())..]);
    if expected != actual {
        return Err(LoadError::ChecksumMismatch { expected, actual });
    }

    let mut pending = Pending::default();

    // Pass 1: construct the tree with serialized identities.
    let ir = Ir::with_uuid(ctx, reader.read_uuid()?)?;
    ir.set_version(ctx, version);
    decode_aux_data(&mut reader, ctx, ir)?;

    let module_count = reader.read_u32()?;
    for _ in 0..module_count {
        let module = decode_module(&mut reader, ctx, &mut pending)?;
        let status = ir.add_module(ctx, module);
        debug_assert!(status.is_accepted(), "freshly decoded module not inserted");
    }

    decode_cfg(&mut reader, &mut pending)?;

    // Pass 2: resolve cross-references; drop what does not resolve.
    let mut warnings = Vec::new();
    resolve(ctx, ir, pending, &mut warnings);

    Ok(Loaded { ir, warnings })
}

fn decode_module(
    reader: &mut WireReader<'_>,
    ctx: &mut Context,
    pending: &mut Pending,
) -> Result<Module, LoadError> {
    let uuid = reader.read_uuid()?;
    let name = reader.read_string()?;
    let module = Module::with_uuid(ctx, uuid, name)?;
    module.set_binary_path(ctx, reader.read_string()?);
    module.set_preferred_addr(ctx, Addr(reader.read_u64()?));
    module.set_rebase_delta(ctx, reader.read_i64()?);

    let at = reader.position();
    let format = reader.read_u8()?;
    module.set_file_format(
        ctx,
        FileFormat::from_code(format).ok_or(DecodeError::InvalidTag {
            what: "file format",
            value: format as u32,
            offset: at,
        })?,
    );
    let at = reader.position();
    let isa = reader.read_u8()?;
    module.set_isa(
        ctx,
        Isa::from_code(isa).ok_or(DecodeError::InvalidTag {
            what: "ISA",
            value: isa as u32,
            offset: at,
        })?,
    );
    let at = reader.position();
    let order = reader.read_u8()?;
    module.set_byte_order(
        ctx,
        ByteOrder::from_code(order).ok_or(DecodeError::InvalidTag {
            what: "byte order",
            value: order as u32,
            offset: at,
        })?,
    );

    if reader.read_bool()? {
        pending.entry_points.push((module, reader.read_uuid()?));
    }

    let section_count = reader.read_u32()?;
    for _ in 0..section_count {
        let section = decode_section(reader, ctx, pending)?;
        let status = module.add_section(ctx, section);
        debug_assert!(status.is_accepted(), "freshly decoded section not inserted");
    }

    let symbol_count = reader.read_u32()?;
    for _ in 0..symbol_count {
        let symbol = decode_symbol(reader, ctx, pending)?;
        let status = module.add_symbol(ctx, symbol);
        debug_assert!(status.is_accepted(), "freshly decoded symbol not inserted");
    }

    let proxy_count = reader.read_u32()?;
    for _ in 0..proxy_count {
        let proxy = ProxyBlock::with_uuid(ctx, reader.read_uuid()?)?;
        let status = module.add_proxy_block(ctx, proxy);
        debug_assert!(status.is_accepted(), "freshly decoded proxy not inserted");
    }

    decode_aux_data(reader, ctx, module)?;
    Ok(module)
}

fn decode_section(
    reader: &mut WireReader<'_>,
    ctx: &mut Context,
    pending: &mut Pending,
) -> Result<Section, LoadError> {
    let uuid = reader.read_uuid()?;
    let name = reader.read_string()?;
    let section = Section::with_uuid(ctx, uuid, name)?;
    let flags = SectionFlags::from_bits(reader.read_u32()?);
    for flag in flags.iter() {
        section.add_flag(ctx, flag);
    }

    let interval_count = reader.read_u32()?;
    for _ in 0..interval_count {
        let interval = decode_interval(reader, ctx, pending)?;
        let status = section.add_byte_interval(ctx, interval);
        debug_assert!(status.is_accepted(), "freshly decoded interval not inserted");
    }
    Ok(section)
}

fn decode_interval(
    reader: &mut WireReader<'_>,
    ctx: &mut Context,
    pending: &mut Pending,
) -> Result<ByteInterval, LoadError> {
    let uuid = reader.read_uuid()?;
    let address = reader.read_opt_u64()?.map(Addr);
    let size = reader.read_u64()?;
    let contents = reader.read_byte_run()?;
    let interval = ByteInterval::with_uuid(ctx, uuid, address, size, contents)?;

    let block_count = reader.read_u32()?;
    for _ in 0..block_count {
        let offset = reader.read_u64()?;
        let at = reader.position();
        let tag = reader.read_u8()?;
        match tag {
            payload_tag::BLOCK_CODE => {
                let block_uuid = reader.read_uuid()?;
                let block_size = reader.read_u64()?;
                let at = reader.position();
                let mode = reader.read_u8()?;
                let mode = DecodeMode::from_code(mode).ok_or(DecodeError::InvalidTag {
                    what: "decode mode",
                    value: mode as u32,
                    offset: at,
                })?;
                let block = CodeBlock::with_uuid(ctx, block_uuid, block_size, mode)?;
                interval.add_code_block(ctx, offset, block);
            }
            payload_tag::BLOCK_DATA => {
                let block_uuid = reader.read_uuid()?;
                let block_size = reader.read_u64()?;
                let block = DataBlock::with_uuid(ctx, block_uuid, block_size)?;
                interval.add_data_block(ctx, offset, block);
            }
            value => {
                return Err(DecodeError::InvalidTag {
                    what: "block kind",
                    value: value as u32,
                    offset: at,
                }
                .into())
            }
        }
    }

    let expr_count = reader.read_u32()?;
    for _ in 0..expr_count {
        let offset = reader.read_u64()?;
        let attributes = SymAttributes::from_bits(reader.read_u32()?);
        let at = reader.position();
        let tag = reader.read_u8()?;
        let expr = match tag {
            payload_tag::EXPR_ADDR_CONST => PendingExpr::AddrConst {
                offset: reader.read_i64()?,
                symbol: reader.read_uuid()?,
            },
            payload_tag::EXPR_ADDR_ADDR => PendingExpr::AddrAddr {
                scale: reader.read_i64()?,
                offset: reader.read_i64()?,
                symbol1: reader.read_uuid()?,
                symbol2: reader.read_uuid()?,
            },
            payload_tag::EXPR_STACK_CONST => PendingExpr::StackConst {
                offset: reader.read_i64()?,
                symbol: reader.read_uuid()?,
            },
            value => {
                return Err(DecodeError::InvalidTag {
                    what: "symbolic expression kind",
                    value: value as u32,
                    offset: at,
                }
                .into())
            }
        };
        pending.exprs.push((interval, offset, attributes, expr));
    }
    Ok(interval)
}

fn decode_symbol(
    reader: &mut WireReader<'_>,
    ctx: &mut Context,
    pending: &mut Pending,
) -> Result<Symbol, LoadError> {
    let uuid = reader.read_uuid()?;
    let name = reader.read_string()?;
    let at_end = reader.read_bool()?;
    let at = reader.position();
    let tag = reader.read_u8()?;
    let (payload, referent) = match tag {
        payload_tag::SYMBOL_NONE => (SymbolPayload::None, None),
        payload_tag::SYMBOL_ADDRESS => {
            (SymbolPayload::Address(Addr(reader.read_u64()?)), None)
        }
        payload_tag::SYMBOL_REFERENT => (SymbolPayload::None, Some(reader.read_uuid()?)),
        value => {
            return Err(DecodeError::InvalidTag {
                what: "symbol payload",
                value: value as u32,
                offset: at,
            }
            .into())
        }
    };
    let symbol = Symbol::with_uuid(ctx, uuid, name, at_end, payload)?;
    if let Some(target) = referent {
        pending.referents.push((symbol, target));
    }
    Ok(symbol)
}

fn decode_cfg(reader: &mut WireReader<'_>, pending: &mut Pending) -> Result<(), LoadError> {
    let vertex_count = reader.read_u32()?;
    for _ in 0..vertex_count {
        pending.cfg_vertices.push(reader.read_uuid()?);
    }
    let edge_count = reader.read_u32()?;
    for _ in 0..edge_count {
        let source = reader.read_uuid()?;
        let target = reader.read_uuid()?;
        let label = if reader.read_bool()? {
            let conditional = reader.read_bool()?;
            let direct = reader.read_bool()?;
            Some((conditional, direct, reader.read_u8()?))
        } else {
            None
        };
        pending.cfg_edges.push(PendingEdge { source, target, label });
    }
    Ok(())
}

fn decode_aux_data(
    reader: &mut WireReader<'_>,
    ctx: &mut Context,
    container: impl AuxDataContainer,
) -> Result<(), LoadError> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let name = reader.read_string()?;
        let type_name = reader.read_string()?;
        let data = reader.read_byte_run()?;
        container.set_aux_data(ctx, name, AuxData::new(type_name, data));
    }
    Ok(())
}

fn resolve(ctx: &mut Context, ir: Ir, pending: Pending, warnings: &mut Vec<LoadWarning>) {
    for (module, target) in pending.entry_points {
        match ctx.lookup(target) {
            Some(Node::CodeBlock(block)) => module.set_entry_point(ctx, Some(block)),
            _ => warnings.push(LoadWarning::UnresolvedEntryPoint {
                module: module.uuid(),
                target,
            }),
        }
    }

    for (symbol, target) in pending.referents {
        match ctx.lookup(target).and_then(Referent::from_node) {
            Some(referent) => {
                symbol.set_referent(ctx, referent);
            }
            None => warnings.push(LoadWarning::UnresolvedSymbolReferent {
                symbol: symbol.uuid(),
                target,
            }),
        }
    }

    for (interval, offset, attributes, expr) in pending.exprs {
        match resolve_expr(ctx, &expr) {
            Ok(kind) => {
                let mut resolved = kind;
                resolved.attributes = attributes;
                interval.set_symbolic_expression(ctx, offset, resolved);
            }
            Err(target) => warnings.push(LoadWarning::UnresolvedSymbolicExpression {
                interval: interval.uuid(),
                offset,
                target,
            }),
        }
    }

    for vertex in pending.cfg_vertices {
        match ctx.lookup(vertex).and_then(CfgNode::from_node) {
            Some(node) => {
                ir.cfg_mut(ctx).add_vertex(node);
            }
            None => warnings.push(LoadWarning::UnresolvedCfgVertex { vertex }),
        }
    }

    for edge in pending.cfg_edges {
        let source = ctx.lookup(edge.source).and_then(CfgNode::from_node);
        let target = ctx.lookup(edge.target).and_then(CfgNode::from_node);
        match (source, target) {
            (Some(source), Some(target)) => {
                let label = edge.label.and_then(|(conditional, direct, kind)| {
                    ferrite_ir::EdgeType::from_code(kind).map(|kind| ferrite_ir::EdgeLabel {
                        conditional,
                        direct,
                        kind,
                    })
                });
                ir.cfg_mut(ctx).add_edge(source, target, label);
            }
            _ => warnings.push(LoadWarning::UnresolvedCfgEdge {
                edge_source: edge.source,
                target: edge.target,
            }),
        }
    }
}

/// Resolve a pending expression's symbol operands, or return the first
/// operand that fails.
fn resolve_expr(ctx: &Context, expr: &PendingExpr) -> Result<SymbolicExpression, Uuid> {
    let resolve_symbol = |uuid: Uuid| match ctx.lookup(uuid) {
        Some(Node::Symbol(symbol)) => Ok(symbol),
        _ => Err(uuid),
    };
    Ok(match expr {
        PendingExpr::AddrConst { offset, symbol } => {
            SymbolicExpression::addr_const(resolve_symbol(*symbol)?, *offset)
        }
        PendingExpr::AddrAddr { scale, offset, symbol1, symbol2 } => SymbolicExpression::addr_addr(
            resolve_symbol(*symbol1)?,
            resolve_symbol(*symbol2)?,
            *scale,
            *offset,
        ),
        PendingExpr::StackConst { offset, symbol } => {
            SymbolicExpression::stack_const(resolve_symbol(*symbol)?, *offset)
        }
    })
}
