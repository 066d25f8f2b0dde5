use ferrite_ir::{
    Addr, ByteInterval, ChangeStatus, CodeBlock, Context, Ir, Module, ProxyBlock, Referent,
    Section, Symbol, SymbolPayload,
};

fn module_with_block(ctx: &mut Context) -> (Module, ByteInterval, CodeBlock) {
    let ir = Ir::new(ctx);
    let module = Module::new(ctx, "m");
    ir.add_module(ctx, module);
    let section = Section::new(ctx, ".text");
    module.add_section(ctx, section);
    let interval = ByteInterval::new(ctx, Some(Addr(0x1000)), 16);
    section.add_byte_interval(ctx, interval);
    let block = CodeBlock::new(ctx, 4);
    interval.add_code_block(ctx, 0, block);
    (module, interval, block)
}

#[test]
fn test_find_symbols_by_name_and_address() {
    let mut ctx = Context::new();
    let (module, _, _) = module_with_block(&mut ctx);
    let sym = Symbol::with_address(&mut ctx, "main", Addr(0x1000));
    module.add_symbol(&mut ctx, sym);

    assert_eq!(module.find_symbols(&ctx, "main"), vec![sym]);
    assert_eq!(module.find_symbols_at(&ctx, Addr(0x1000)), vec![sym]);
    assert!(module.find_symbols(&ctx, "other").is_empty());
    assert!(module.find_symbols_at(&ctx, Addr(0x1001)).is_empty());
}

#[test]
fn test_rename_reindexes() {
    let mut ctx = Context::new();
    let (module, _, _) = module_with_block(&mut ctx);
    let sym = Symbol::new(&mut ctx, "before");
    module.add_symbol(&mut ctx, sym);

    assert_eq!(sym.set_name(&mut ctx, "after"), ChangeStatus::Accepted);
    assert!(module.find_symbols(&ctx, "before").is_empty());
    assert_eq!(module.find_symbols(&ctx, "after"), vec![sym]);
}

#[test]
fn test_readdress_reindexes() {
    let mut ctx = Context::new();
    let (module, _, _) = module_with_block(&mut ctx);
    let sym = Symbol::with_address(&mut ctx, "s", Addr(0x1000));
    module.add_symbol(&mut ctx, sym);

    assert_eq!(sym.set_address(&mut ctx, Addr(0x2000)), ChangeStatus::Accepted);
    assert!(module.find_symbols_at(&ctx, Addr(0x1000)).is_empty());
    assert_eq!(module.find_symbols_at(&ctx, Addr(0x2000)), vec![sym]);
}

#[test]
fn test_referent_keeps_address_and_gains_referent_entry() {
    let mut ctx = Context::new();
    let (module, _, block) = module_with_block(&mut ctx);
    let sym = Symbol::with_address(&mut ctx, "s", Addr(0x1000));
    module.add_symbol(&mut ctx, sym);

    // The block also sits at 0x1000, so the derived address is unchanged.
    sym.set_referent(&mut ctx, Referent::Code(block));
    assert_eq!(module.find_symbols_at(&ctx, Addr(0x1000)), vec![sym]);
    assert_eq!(
        module.find_symbols_by_referent(&ctx, Referent::Code(block)),
        vec![sym]
    );
    assert_eq!(sym.address(&ctx), Some(Addr(0x1000)));
}

#[test]
fn test_at_end_adds_referent_size() {
    let mut ctx = Context::new();
    let (module, _, block) = module_with_block(&mut ctx);
    let sym = Symbol::with_referent(&mut ctx, "end", Referent::Code(block));
    module.add_symbol(&mut ctx, sym);

    assert_eq!(sym.address(&ctx), Some(Addr(0x1000)));
    assert_eq!(sym.set_at_end(&mut ctx, true), ChangeStatus::Accepted);
    assert_eq!(sym.address(&ctx), Some(Addr(0x1004)));
    assert_eq!(module.find_symbols_at(&ctx, Addr(0x1004)), vec![sym]);
    assert!(module.find_symbols_at(&ctx, Addr(0x1000)).is_empty());

    // Growing the referent moves the at-end address with it.
    block.set_size(&mut ctx, 8);
    assert_eq!(module.find_symbols_at(&ctx, Addr(0x1008)), vec![sym]);
}

#[test]
fn test_interval_readdress_reindexes_referent_symbols() {
    let mut ctx = Context::new();
    let (module, interval, block) = module_with_block(&mut ctx);
    let sym = Symbol::with_referent(&mut ctx, "f", Referent::Code(block));
    module.add_symbol(&mut ctx, sym);

    interval.set_address(&mut ctx, Some(Addr(0x4000)));
    assert!(module.find_symbols_at(&ctx, Addr(0x1000)).is_empty());
    assert_eq!(module.find_symbols_at(&ctx, Addr(0x4000)), vec![sym]);

    // Unsetting the address leaves the symbol without one.
    interval.set_address(&mut ctx, None);
    assert!(module.find_symbols_at(&ctx, Addr(0x4000)).is_empty());
    assert_eq!(sym.address(&ctx), None);
    assert_eq!(module.find_symbols(&ctx, "f"), vec![sym]);
}

#[test]
fn test_block_removal_reindexes_referent_symbols() {
    let mut ctx = Context::new();
    let (module, interval, block) = module_with_block(&mut ctx);
    let sym = Symbol::with_referent(&mut ctx, "f", Referent::Code(block));
    module.add_symbol(&mut ctx, sym);

    interval.remove_block(&mut ctx, ferrite_ir::Block::Code(block));
    assert!(module.find_symbols_at(&ctx, Addr(0x1000)).is_empty());
    assert_eq!(sym.address(&ctx), None);

    interval.add_code_block(&mut ctx, 8, block);
    assert_eq!(module.find_symbols_at(&ctx, Addr(0x1008)), vec![sym]);
}

#[test]
fn test_symbol_move_between_modules() {
    let mut ctx = Context::new();
    let ir = Ir::new(&mut ctx);
    let first = Module::new(&mut ctx, "first");
    let second = Module::new(&mut ctx, "second");
    ir.add_module(&mut ctx, first);
    ir.add_module(&mut ctx, second);
    let sym = Symbol::with_address(&mut ctx, "s", Addr(8));
    first.add_symbol(&mut ctx, sym);

    assert_eq!(second.add_symbol(&mut ctx, sym), ChangeStatus::Accepted);
    assert!(!first.contains_symbol(&ctx, sym));
    assert!(second.contains_symbol(&ctx, sym));
    assert!(first.find_symbols(&ctx, "s").is_empty());
    assert!(first.find_symbols_at(&ctx, Addr(8)).is_empty());
    assert_eq!(second.find_symbols(&ctx, "s"), vec![sym]);
    assert_eq!(second.find_symbols_at(&ctx, Addr(8)), vec![sym]);
    assert_eq!(sym.module(&ctx), Some(second));
}

#[test]
fn test_symbols_between_uses_half_open_range() {
    let mut ctx = Context::new();
    let (module, _, _) = module_with_block(&mut ctx);
    let low = Symbol::with_address(&mut ctx, "low", Addr(0x10));
    let mid = Symbol::with_address(&mut ctx, "mid", Addr(0x20));
    let high = Symbol::with_address(&mut ctx, "high", Addr(0x30));
    let unplaced = Symbol::new(&mut ctx, "unplaced");
    for sym in [low, mid, high, unplaced] {
        module.add_symbol(&mut ctx, sym);
    }

    assert_eq!(
        module.find_symbols_between(&ctx, Addr(0x10), Addr(0x30)),
        vec![low, mid]
    );
    assert_eq!(
        module.find_symbols_between(&ctx, Addr(0x11), Addr(0x31)),
        vec![mid, high]
    );
    assert!(module.find_symbols_between(&ctx, Addr(0x40), Addr(0x50)).is_empty());
}

#[test]
fn test_proxy_referent_symbol() {
    let mut ctx = Context::new();
    let (module, _, _) = module_with_block(&mut ctx);
    let proxy = ProxyBlock::new(&mut ctx);
    module.add_proxy_block(&mut ctx, proxy);
    let sym = Symbol::with_referent(&mut ctx, "ext", Referent::Proxy(proxy));
    module.add_symbol(&mut ctx, sym);

    assert_eq!(sym.address(&ctx), None);
    assert_eq!(
        module.find_symbols_by_referent(&ctx, Referent::Proxy(proxy)),
        vec![sym]
    );
    // At-end over a proxy still has no address to offset.
    sym.set_at_end(&mut ctx, true);
    assert_eq!(sym.address(&ctx), None);
}

#[test]
fn test_clearing_payload_removes_referent_entry() {
    let mut ctx = Context::new();
    let (module, _, block) = module_with_block(&mut ctx);
    let sym = Symbol::with_referent(&mut ctx, "s", Referent::Code(block));
    module.add_symbol(&mut ctx, sym);

    assert_eq!(
        sym.set_payload(&mut ctx, SymbolPayload::None),
        ChangeStatus::Accepted
    );
    assert!(module
        .find_symbols_by_referent(&ctx, Referent::Code(block))
        .is_empty());
    assert!(module.find_symbols_at(&ctx, Addr(0x1000)).is_empty());
}

#[test]
fn test_symbols_by_name_iteration_is_sorted() {
    let mut ctx = Context::new();
    let (module, _, _) = module_with_block(&mut ctx);
    for name in ["zeta", "alpha", "mid", "alpha"] {
        let sym = Symbol::new(&mut ctx, name);
        module.add_symbol(&mut ctx, sym);
    }
    let names: Vec<String> = module
        .symbols_by_name(&ctx)
        .map(|s| s.name(&ctx).to_string())
        .collect();
    assert_eq!(names, vec!["alpha", "alpha", "mid", "zeta"]);
}
