use ferrite_ir::{
    Addr, AuxData, AuxDataContainer, Block, ByteInterval, CodeBlock, Context, DataBlock, Ir,
    Module, Section,
};

/// Two sections with interleaved interval addresses, to exercise the merged
/// streams:
///   .text: [0x1000, 0x1008) and [0x3000, 0x3008)
///   .data: [0x2000, 0x2008)
/// Each interval holds one block covering its full extent.
fn interleaved(ctx: &mut Context) -> (Ir, Module, Vec<Block>) {
    let ir = Ir::new(ctx);
    let module = Module::new(ctx, "m");
    ir.add_module(ctx, module);

    let text = Section::new(ctx, ".text");
    let data = Section::new(ctx, ".data");
    module.add_section(ctx, text);
    module.add_section(ctx, data);

    let mut blocks = Vec::new();
    for (section, addr, is_code) in [
        (text, 0x1000u64, true),
        (data, 0x2000, false),
        (text, 0x3000, true),
    ] {
        let interval = ByteInterval::new(ctx, Some(Addr(addr)), 8);
        section.add_byte_interval(ctx, interval);
        let block = if is_code {
            Block::Code(CodeBlock::new(ctx, 8))
        } else {
            Block::Data(DataBlock::new(ctx, 8))
        };
        interval.add_block(ctx, 0, block);
        blocks.push(block);
    }
    (ir, module, blocks)
}

#[test]
fn test_module_blocks_merge_sections_in_address_order() {
    let mut ctx = Context::new();
    let (_, module, blocks) = interleaved(&mut ctx);

    let merged: Vec<Block> = module.blocks(&ctx).collect();
    assert_eq!(merged, blocks);
    let addrs: Vec<Option<Addr>> = merged.iter().map(|b| b.address(&ctx)).collect();
    assert_eq!(
        addrs,
        vec![Some(Addr(0x1000)), Some(Addr(0x2000)), Some(Addr(0x3000))]
    );
}

#[test]
fn test_code_and_data_streams_are_filtered_views() {
    let mut ctx = Context::new();
    let (_, module, blocks) = interleaved(&mut ctx);

    let code: Vec<Addr> = module
        .code_blocks(&ctx)
        .filter_map(|b| b.address(&ctx))
        .collect();
    assert_eq!(code, vec![Addr(0x1000), Addr(0x3000)]);
    let data: Vec<Addr> = module
        .data_blocks(&ctx)
        .filter_map(|b| b.address(&ctx))
        .collect();
    assert_eq!(data, vec![Addr(0x2000)]);
    assert_eq!(module.blocks(&ctx).count(), blocks.len());
}

#[test]
fn test_byte_intervals_merge_in_address_order() {
    let mut ctx = Context::new();
    let (_, module, _) = interleaved(&mut ctx);

    let addrs: Vec<Option<Addr>> = module
        .byte_intervals(&ctx)
        .map(|bi| bi.address(&ctx))
        .collect();
    assert_eq!(
        addrs,
        vec![Some(Addr(0x1000)), Some(Addr(0x2000)), Some(Addr(0x3000))]
    );
}

#[test]
fn test_each_block_appears_exactly_once() {
    let mut ctx = Context::new();
    let (_, module, _) = interleaved(&mut ctx);

    // Two blocks at one address must both appear, once each.
    let section = Section::new(&mut ctx, ".extra");
    module.add_section(&mut ctx, section);
    let interval = ByteInterval::new(&mut ctx, Some(Addr(0x1000)), 8);
    section.add_byte_interval(&mut ctx, interval);
    let twin_a = CodeBlock::new(&mut ctx, 4);
    let twin_b = CodeBlock::new(&mut ctx, 4);
    interval.add_code_block(&mut ctx, 0, twin_a);
    interval.add_code_block(&mut ctx, 0, twin_b);

    let mut merged: Vec<Block> = module.blocks(&ctx).collect();
    assert_eq!(merged.len(), 5);
    merged.sort();
    merged.dedup();
    assert_eq!(merged.len(), 5);
}

#[test]
fn test_sections_iterate_in_address_order() {
    let mut ctx = Context::new();
    let (_, module, _) = interleaved(&mut ctx);

    let names: Vec<String> = module
        .sections(&ctx)
        .map(|s| s.name(&ctx).to_string())
        .collect();
    // .text starts at 0x1000, .data at 0x2000.
    assert_eq!(names, vec![".text", ".data"]);

    let by_name: Vec<String> = module
        .sections_by_name(&ctx)
        .map(|s| s.name(&ctx).to_string())
        .collect();
    assert_eq!(by_name, vec![".data", ".text"]);
}

#[test]
fn test_ir_level_aggregates_merge_modules() {
    let mut ctx = Context::new();
    let (ir, _, _) = interleaved(&mut ctx);

    let other = Module::new(&mut ctx, "other");
    ir.add_module(&mut ctx, other);
    let section = Section::new(&mut ctx, ".text");
    other.add_section(&mut ctx, section);
    let interval = ByteInterval::new(&mut ctx, Some(Addr(0x1800)), 8);
    section.add_byte_interval(&mut ctx, interval);
    let block = CodeBlock::new(&mut ctx, 8);
    interval.add_code_block(&mut ctx, 0, block);

    let addrs: Vec<Option<Addr>> = ir.blocks(&ctx).map(|b| b.address(&ctx)).collect();
    assert_eq!(
        addrs,
        vec![
            Some(Addr(0x1000)),
            Some(Addr(0x1800)),
            Some(Addr(0x2000)),
            Some(Addr(0x3000))
        ]
    );

    assert_eq!(ir.find_code_blocks_on(&ctx, Addr(0x1804)), vec![block]);
    assert_eq!(ir.find_byte_intervals_on(&ctx, Addr(0x1804)), vec![interval]);
    assert_eq!(ir.find_sections_on(&ctx, Addr(0x1804)), vec![section]);
}

#[test]
fn test_aux_data_round_trips_through_container() {
    let mut ctx = Context::new();
    let ir = Ir::new(&mut ctx);
    let module = Module::new(&mut ctx, "m");
    ir.add_module(&mut ctx, module);

    ir.set_aux_data(
        &mut ctx,
        "comments",
        AuxData::new("mapping<Offset,string>", vec![1, 2, 3]),
    );
    module.set_aux_data(&mut ctx, "alignment", AuxData::new("mapping<UUID,uint64_t>", vec![8]));

    let aux = ir.aux_data(&ctx, "comments").expect("missing aux entry");
    assert_eq!(aux.type_name(), "mapping<Offset,string>");
    assert_eq!(aux.data(), &[1, 2, 3]);
    assert!(ir.aux_data(&ctx, "alignment").is_none());
    assert_eq!(module.aux_data_iter(&ctx).count(), 1);
    assert!(module.remove_aux_data(&mut ctx, "alignment"));
    assert!(!module.remove_aux_data(&mut ctx, "alignment"));
}

#[test]
fn test_symbolic_expression_address_queries() {
    let mut ctx = Context::new();
    let (_, module, _) = interleaved(&mut ctx);
    let sym = ferrite_ir::Symbol::new(&mut ctx, "target");
    module.add_symbol(&mut ctx, sym);

    let interval = module.find_byte_intervals_on(&ctx, Addr(0x2000))[0];
    interval.set_symbolic_expression(
        &mut ctx,
        4,
        ferrite_ir::SymbolicExpression::addr_const(sym, -2),
    );

    let hits = module.find_symbolic_expressions_at(&ctx, Addr(0x2004));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, interval);
    assert_eq!(hits[0].1, 4);
    assert!(module.find_symbolic_expressions_at(&ctx, Addr(0x2005)).is_empty());

    let ranged = module.find_symbolic_expressions_between(&ctx, Addr(0x2000), Addr(0x3000));
    assert_eq!(ranged.len(), 1);
}
