//! Graph serialization.
//!
//! Saving is a pre-order walk of the container tree. The output starts with
//! a fixed header (magic, version, flags, and a CRC32 of everything after
//! the header) followed by the IR message. Collections whose in-memory
//! order is arbitrary (symbols, proxy blocks, CFG vertices and edges) are
//! written sorted by UUID so equal graphs encode to equal bytes.

use crate::wire::WireWriter;
use ferrite_ir::{
    AuxData, AuxDataContainer, Block, ByteInterval, Cfg, Context, Ir, Module, Section, SymExprKind,
    Symbol, SymbolPayload, SymbolicExpression,
};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Magic number opening every Ferrite wire image.
pub const MAGIC: [u8; 4] = *b"FEIR";

/// Header length: magic, version, flags, checksum.
pub(crate) const HEADER_LEN: usize = 16;

pub(crate) mod payload_tag {
    pub const SYMBOL_NONE: u8 = 0;
    pub const SYMBOL_ADDRESS: u8 = 1;
    pub const SYMBOL_REFERENT: u8 = 2;

    pub const BLOCK_CODE: u8 = 0;
    pub const BLOCK_DATA: u8 = 1;

    pub const EXPR_ADDR_CONST: u8 = 0;
    pub const EXPR_ADDR_ADDR: u8 = 1;
    pub const EXPR_STACK_CONST: u8 = 2;
}

/// Encode an IR and everything it transitively owns.
pub fn save_ir(ctx: &Context, ir: Ir) -> Vec<u8> {
    let mut writer = WireWriter::new();
    writer.buffer.extend_from_slice(&MAGIC);
    writer.emit_u32(ir.version(ctx));
    writer.emit_u32(0); // flags, reserved
    let checksum_at = writer.offset();
    writer.emit_u32(0); // checksum placeholder

    writer.emit_uuid(ir.uuid());
    encode_aux_data(&mut writer, ir.aux_data_map(ctx));

    let modules: Vec<Module> = ir.modules(ctx).collect();
    writer.emit_u32(modules.len() as u32);
    for module in modules {
        encode_module(ctx, &mut writer, module);
    }

    encode_cfg(&mut writer, ir.cfg(ctx));

    let checksum = crc32fast::hash(&writer.buffer[HEADER_LEN..]);
    writer.patch_u32(checksum_at, checksum);
    writer.into_bytes()
}

fn encode_module(ctx: &Context, writer: &mut WireWriter, module: Module) {
    writer.emit_uuid(module.uuid());
    writer.emit_string(module.name(ctx));
    writer.emit_string(module.binary_path(ctx));
    writer.emit_u64(module.preferred_addr(ctx).value());
    writer.emit_i64(module.rebase_delta(ctx));
    writer.emit_u8(module.file_format(ctx).code());
    writer.emit_u8(module.isa(ctx).code());
    writer.emit_u8(module.byte_order(ctx).code());
    match module.entry_point(ctx) {
        Some(block) => {
            writer.emit_u8(1);
            writer.emit_uuid(block.uuid());
        }
        None => writer.emit_u8(0),
    }

    let sections: Vec<Section> = module.sections(ctx).collect();
    writer.emit_u32(sections.len() as u32);
    for section in sections {
        encode_section(ctx, writer, section);
    }

    let mut symbols: Vec<Symbol> = module.symbols(ctx).collect();
    symbols.sort_by_key(|symbol| symbol.uuid());
    writer.emit_u32(symbols.len() as u32);
    for symbol in symbols {
        encode_symbol(ctx, writer, symbol);
    }

    let mut proxies: Vec<Uuid> = module.proxy_blocks(ctx).map(|p| p.uuid()).collect();
    proxies.sort();
    writer.emit_u32(proxies.len() as u32);
    for uuid in proxies {
        writer.emit_uuid(uuid);
    }

    encode_aux_data(writer, module.aux_data_map(ctx));
}

fn encode_section(ctx: &Context, writer: &mut WireWriter, section: Section) {
    writer.emit_uuid(section.uuid());
    writer.emit_string(section.name(ctx));
    writer.emit_u32(section.flags(ctx).bits());

    let intervals: Vec<ByteInterval> = section.byte_intervals(ctx).collect();
    writer.emit_u32(intervals.len() as u32);
    for interval in intervals {
        encode_interval(ctx, writer, interval);
    }
}

fn encode_interval(ctx: &Context, writer: &mut WireWriter, interval: ByteInterval) {
    writer.emit_uuid(interval.uuid());
    writer.emit_opt_u64(interval.address(ctx).map(|a| a.value()));
    writer.emit_u64(interval.size(ctx));
    writer.emit_bytes(interval.initialized_bytes(ctx));

    let blocks: Vec<Block> = interval.blocks(ctx).collect();
    writer.emit_u32(blocks.len() as u32);
    for block in blocks {
        writer.emit_u64(block.offset(ctx));
        match block {
            Block::Code(code) => {
                writer.emit_u8(payload_tag::BLOCK_CODE);
                writer.emit_uuid(code.uuid());
                writer.emit_u64(code.size(ctx));
                writer.emit_u8(code.decode_mode(ctx).code());
            }
            Block::Data(data) => {
                writer.emit_u8(payload_tag::BLOCK_DATA);
                writer.emit_uuid(data.uuid());
                writer.emit_u64(data.size(ctx));
            }
        }
    }

    let exprs: Vec<(u64, SymbolicExpression)> = interval
        .symbolic_expressions(ctx)
        .map(|(offset, expr)| (offset, *expr))
        .collect();
    writer.emit_u32(exprs.len() as u32);
    for (offset, expr) in exprs {
        writer.emit_u64(offset);
        writer.emit_u32(expr.attributes.bits());
        match expr.kind {
            SymExprKind::SymAddrConst(e) => {
                writer.emit_u8(payload_tag::EXPR_ADDR_CONST);
                writer.emit_i64(e.offset);
                writer.emit_uuid(e.symbol.uuid());
            }
            SymExprKind::SymAddrAddr(e) => {
                writer.emit_u8(payload_tag::EXPR_ADDR_ADDR);
                writer.emit_i64(e.scale);
                writer.emit_i64(e.offset);
                writer.emit_uuid(e.symbol1.uuid());
                writer.emit_uuid(e.symbol2.uuid());
            }
            SymExprKind::SymStackConst(e) => {
                writer.emit_u8(payload_tag::EXPR_STACK_CONST);
                writer.emit_i64(e.offset);
                writer.emit_uuid(e.symbol.uuid());
            }
        }
    }
}

fn encode_symbol(ctx: &Context, writer: &mut WireWriter, symbol: Symbol) {
    writer.emit_uuid(symbol.uuid());
    writer.emit_string(symbol.name(ctx));
    writer.emit_bool(symbol.at_end(ctx));
    match symbol.payload(ctx) {
        SymbolPayload::None => writer.emit_u8(payload_tag::SYMBOL_NONE),
        SymbolPayload::Address(addr) => {
            writer.emit_u8(payload_tag::SYMBOL_ADDRESS);
            writer.emit_u64(addr.value());
        }
        SymbolPayload::Referent(referent) => {
            writer.emit_u8(payload_tag::SYMBOL_REFERENT);
            writer.emit_uuid(referent.uuid());
        }
    }
}

fn encode_cfg(writer: &mut WireWriter, cfg: &Cfg) {
    let mut vertices: Vec<Uuid> = cfg.vertices().map(|v| v.uuid()).collect();
    vertices.sort();
    writer.emit_u32(vertices.len() as u32);
    for uuid in vertices {
        writer.emit_uuid(uuid);
    }

    let mut edges: Vec<(Uuid, Uuid, Option<(bool, bool, u8)>)> = cfg
        .edges()
        .map(|edge| {
            (
                edge.source.uuid(),
                edge.target.uuid(),
                edge.label
                    .map(|label| (label.conditional, label.direct, label.kind.code())),
            )
        })
        .collect();
    edges.sort();
    writer.emit_u32(edges.len() as u32);
    for (source, target, label) in edges {
        writer.emit_uuid(source);
        writer.emit_uuid(target);
        match label {
            Some((conditional, direct, kind)) => {
                writer.emit_u8(1);
                writer.emit_bool(conditional);
                writer.emit_bool(direct);
                writer.emit_u8(kind);
            }
            None => writer.emit_u8(0),
        }
    }
}

fn encode_aux_data(writer: &mut WireWriter, map: &BTreeMap<String, AuxData>) {
    writer.emit_u32(map.len() as u32);
    for (name, aux) in map {
        writer.emit_string(name);
        writer.emit_string(aux.type_name());
        writer.emit_bytes(aux.data());
    }
}
