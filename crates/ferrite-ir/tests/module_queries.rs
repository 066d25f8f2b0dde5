use ferrite_ir::{
    Addr, Block, ByteInterval, ChangeStatus, CodeBlock, Context, DataBlock, Ir, Module, Section,
};

/// Build the common fixture: one module with a ".text" section holding a
/// 16-byte interval at 0x1000 and two 4-byte code blocks at offsets 0 and 8.
fn fixture(ctx: &mut Context) -> (Ir, Module, Section, ByteInterval, CodeBlock, CodeBlock) {
    let ir = Ir::new(ctx);
    let module = Module::new(ctx, "m");
    ir.add_module(ctx, module);
    let section = Section::new(ctx, ".text");
    module.add_section(ctx, section);
    let interval = ByteInterval::new(ctx, Some(Addr(0x1000)), 16);
    section.add_byte_interval(ctx, interval);
    let first = CodeBlock::new(ctx, 4);
    let second = CodeBlock::new(ctx, 4);
    interval.add_code_block(ctx, 0, first);
    interval.add_code_block(ctx, 8, second);
    (ir, module, section, interval, first, second)
}

#[test]
fn test_find_code_blocks_on_addresses() {
    let mut ctx = Context::new();
    let (_, module, _, _, first, second) = fixture(&mut ctx);

    assert_eq!(module.find_code_blocks_on(&ctx, Addr(0x1002)), vec![first]);
    assert_eq!(module.find_code_blocks_on(&ctx, Addr(0x1008)), vec![second]);
    // The gap between the blocks holds nothing.
    assert!(module.find_code_blocks_on(&ctx, Addr(0x1006)).is_empty());
    assert!(module.find_code_blocks_on(&ctx, Addr(0x100c)).is_empty());
}

#[test]
fn test_find_code_blocks_in_address_range() {
    let mut ctx = Context::new();
    let (_, module, _, _, first, second) = fixture(&mut ctx);

    let found = module.find_code_blocks_between(&ctx, Addr(0x1000), Addr(0x1010));
    assert_eq!(found, vec![first, second]);
    // The high endpoint is exclusive.
    let found = module.find_code_blocks_between(&ctx, Addr(0x1000), Addr(0x1008));
    assert_eq!(found, vec![first]);
    let found = module.find_code_blocks_between(&ctx, Addr(0x1001), Addr(0x1008));
    assert!(found.is_empty());
}

#[test]
fn test_unsetting_address_empties_queries_but_not_iteration() {
    let mut ctx = Context::new();
    let (_, module, _, interval, first, second) = fixture(&mut ctx);

    assert_eq!(interval.set_address(&mut ctx, None), ChangeStatus::Accepted);
    assert!(module.find_code_blocks_on(&ctx, Addr(0x1002)).is_empty());
    assert!(module.find_byte_intervals_on(&ctx, Addr(0x1000)).is_empty());
    assert!(module.find_sections_on(&ctx, Addr(0x1000)).is_empty());

    // Iteration still yields both blocks, and repeats its order.
    let blocks: Vec<CodeBlock> = module.code_blocks(&ctx).collect();
    assert_eq!(blocks.len(), 2);
    assert!(blocks.contains(&first) && blocks.contains(&second));
    let again: Vec<CodeBlock> = module.code_blocks(&ctx).collect();
    assert_eq!(blocks, again);

    assert_eq!(first.address(&ctx), None);
    assert_eq!(second.address(&ctx), None);
}

#[test]
fn test_moving_interval_moves_queries() {
    let mut ctx = Context::new();
    let (_, module, _, interval, _, second) = fixture(&mut ctx);

    assert_eq!(
        interval.set_address(&mut ctx, Some(Addr(0x2000))),
        ChangeStatus::Accepted
    );
    assert!(module.find_code_blocks_on(&ctx, Addr(0x1002)).is_empty());
    assert_eq!(module.find_code_blocks_on(&ctx, Addr(0x2008)), vec![second]);
    assert_eq!(second.address(&ctx), Some(Addr(0x2008)));
}

#[test]
fn test_growing_block_extends_coverage() {
    let mut ctx = Context::new();
    let (_, module, _, _, first, _) = fixture(&mut ctx);

    assert!(module.find_code_blocks_on(&ctx, Addr(0x1006)).is_empty());
    assert_eq!(first.set_size(&mut ctx, 8), ChangeStatus::Accepted);
    assert_eq!(module.find_code_blocks_on(&ctx, Addr(0x1006)), vec![first]);
    // Shrinking withdraws the coverage again.
    first.set_size(&mut ctx, 4);
    assert!(module.find_code_blocks_on(&ctx, Addr(0x1006)).is_empty());
}

#[test]
fn test_interval_queries() {
    let mut ctx = Context::new();
    let (_, module, section, interval, _, _) = fixture(&mut ctx);

    assert_eq!(module.find_byte_intervals_on(&ctx, Addr(0x100f)), vec![interval]);
    assert!(module.find_byte_intervals_on(&ctx, Addr(0x1010)).is_empty());
    assert_eq!(module.find_byte_intervals_at(&ctx, Addr(0x1000)), vec![interval]);
    assert!(module.find_byte_intervals_at(&ctx, Addr(0x1001)).is_empty());
    assert_eq!(
        module.find_byte_intervals_between(&ctx, Addr(0xfff), Addr(0x1001)),
        vec![interval]
    );

    assert_eq!(section.find_byte_intervals_on(&ctx, Addr(0x1003)), vec![interval]);
    assert_eq!(section.find_byte_intervals_at(&ctx, Addr(0x1000)), vec![interval]);
    assert!(section
        .find_byte_intervals_between(&ctx, Addr(0x1001), Addr(0x1010))
        .is_empty());
}

#[test]
fn test_section_queries() {
    let mut ctx = Context::new();
    let (_, module, section, _, _, _) = fixture(&mut ctx);

    assert_eq!(module.find_sections_on(&ctx, Addr(0x1004)), vec![section]);
    assert_eq!(module.find_sections_at(&ctx, Addr(0x1000)), vec![section]);
    assert!(module.find_sections_at(&ctx, Addr(0x1004)).is_empty());
    assert_eq!(module.find_sections(&ctx, ".text"), vec![section]);
    assert!(module.find_sections(&ctx, ".data").is_empty());
    assert_eq!(section.address(&ctx), Some(Addr(0x1000)));
    assert_eq!(section.size(&ctx), Some(16));
}

#[test]
fn test_every_address_in_interval_maps_back() {
    let mut ctx = Context::new();
    let (_, module, section, interval, _, _) = fixture(&mut ctx);

    for offset in 0..16u64 {
        let addr = Addr(0x1000) + offset;
        assert_eq!(module.find_sections_on(&ctx, addr), vec![section]);
        assert_eq!(module.find_byte_intervals_on(&ctx, addr), vec![interval]);
    }
    assert!(module.find_sections_on(&ctx, Addr(0xfff)).is_empty());
    assert!(module.find_sections_on(&ctx, Addr(0x1010)).is_empty());
}

#[test]
fn test_shrinking_interval_withdraws_index_entries() {
    let mut ctx = Context::new();
    let (_, module, _, interval, _, _) = fixture(&mut ctx);

    interval.set_size(&mut ctx, 4);
    assert!(module.find_byte_intervals_on(&ctx, Addr(0x1008)).is_empty());
    assert_eq!(module.find_byte_intervals_on(&ctx, Addr(0x1003)), vec![interval]);
    interval.set_size(&mut ctx, 32);
    assert_eq!(module.find_byte_intervals_on(&ctx, Addr(0x101f)), vec![interval]);
}

#[test]
fn test_removing_section_empties_module_queries() {
    let mut ctx = Context::new();
    let (_, module, section, _, _, _) = fixture(&mut ctx);

    assert_eq!(module.remove_section(&mut ctx, section), ChangeStatus::Accepted);
    assert!(module.find_code_blocks_on(&ctx, Addr(0x1002)).is_empty());
    assert!(module.find_sections_on(&ctx, Addr(0x1002)).is_empty());
    assert_eq!(section.module(&ctx), None);
    // Removing again reports no change.
    assert_eq!(module.remove_section(&mut ctx, section), ChangeStatus::NoChange);
}

#[test]
fn test_removing_block_withdraws_coverage() {
    let mut ctx = Context::new();
    let (_, module, _, interval, first, second) = fixture(&mut ctx);

    assert_eq!(
        interval.remove_block(&mut ctx, Block::Code(first)),
        ChangeStatus::Accepted
    );
    assert!(module.find_code_blocks_on(&ctx, Addr(0x1002)).is_empty());
    assert_eq!(module.find_code_blocks_on(&ctx, Addr(0x1008)), vec![second]);
    assert_eq!(first.byte_interval(&ctx), None);
}

#[test]
fn test_block_overhang_is_still_found() {
    let mut ctx = Context::new();
    let (_, module, _, interval, _, _) = fixture(&mut ctx);

    // A data block may run past its interval's size; readers clip, the
    // index does not.
    let stray = DataBlock::new(&mut ctx, 32);
    interval.add_data_block(&mut ctx, 12, stray);
    assert_eq!(module.find_data_blocks_on(&ctx, Addr(0x102a)), vec![stray]);
    assert_eq!(stray.address(&ctx), Some(Addr(0x100c)));
}

#[test]
fn test_mixed_block_query_orders_by_address() {
    let mut ctx = Context::new();
    let (_, module, _, interval, first, second) = fixture(&mut ctx);

    let data = DataBlock::new(&mut ctx, 4);
    interval.add_data_block(&mut ctx, 4, data);
    let found = module.find_blocks_between(&ctx, Addr(0x1000), Addr(0x1010));
    assert_eq!(
        found,
        vec![Block::Code(first), Block::Data(data), Block::Code(second)]
    );
}
