//! The IR: the root container of modules, CFG, and auxiliary data.

use crate::aux_data::{AuxData, AuxDataContainer};
use crate::block::Block;
use crate::cfg::Cfg;
use crate::node::{Node, NodeKind};
use crate::section::{block_order_key, interval_order_key};
use crate::{
    Addr, ByteInterval, ChangeStatus, CodeBlock, Context, DataBlock, Error, Module, Section, Symbol,
};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// The current in-memory representation version, written to and checked
/// against the wire format.
pub const IR_VERSION: u32 = 1;

/// A collection of modules over one set of binaries, with their shared CFG
/// and auxiliary data. The root of serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ir(Uuid);

#[derive(Debug)]
pub(crate) struct IrData {
    /// Modules ordered by (name, identity).
    pub(crate) modules: BTreeSet<(String, Module)>,
    pub(crate) version: u32,
    pub(crate) cfg: Cfg,
    pub(crate) aux_data: BTreeMap<String, AuxData>,
}

impl Ir {
    /// Create an empty IR at the current version.
    pub fn new(ctx: &mut Context) -> Ir {
        let uuid = ctx.register_new(NodeKind::Ir);
        ctx.irs.insert(
            uuid,
            IrData {
                modules: BTreeSet::new(),
                version: IR_VERSION,
                cfg: Cfg::new(),
                aux_data: BTreeMap::new(),
            },
        );
        Ir(uuid)
    }

    /// Create an empty IR with a caller-chosen UUID.
    pub fn with_uuid(ctx: &mut Context, uuid: Uuid) -> Result<Ir, Error> {
        ctx.register(uuid, NodeKind::Ir)?;
        ctx.irs.insert(
            uuid,
            IrData {
                modules: BTreeSet::new(),
                version: IR_VERSION,
                cfg: Cfg::new(),
                aux_data: BTreeMap::new(),
            },
        );
        Ok(Ir(uuid))
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> Ir {
        Ir(uuid)
    }

    /// The IR's UUID.
    pub fn uuid(self) -> Uuid {
        self.0
    }

    /// The representation version this IR was built at.
    pub fn version(self, ctx: &Context) -> u32 {
        ctx.ir_data(self).version
    }

    /// Override the representation version.
    pub fn set_version(self, ctx: &mut Context, version: u32) {
        ctx.ir_data_mut(self).version = version;
    }

    // ===== Modules =====

    /// Iterate owned modules in (name, identity) order.
    pub fn modules(self, ctx: &Context) -> impl Iterator<Item = Module> + '_ {
        ctx.ir_data(self).modules.iter().map(|(_, m)| *m)
    }

    /// Move a module into this IR.
    pub fn add_module(self, ctx: &mut Context, module: Module) -> ChangeStatus {
        if ctx.module_data(module).parent == Some(self) {
            return ChangeStatus::NoChange;
        }
        if let Some(previous) = ctx.module_data(module).parent {
            let status = previous.remove_module(ctx, module);
            debug_assert!(status.is_accepted(), "detach from previous IR failed");
        }
        ctx.module_data_mut(module).parent = Some(self);
        let name = ctx.module_data(module).name.clone();
        ctx.ir_data_mut(self).modules.insert((name, module));
        ChangeStatus::Accepted
    }

    /// Detach a module. Returns `NoChange` when not owned here.
    pub fn remove_module(self, ctx: &mut Context, module: Module) -> ChangeStatus {
        if ctx.module_data(module).parent != Some(self) {
            return ChangeStatus::NoChange;
        }
        let name = ctx.module_data(module).name.clone();
        ctx.ir_data_mut(self).modules.remove(&(name, module));
        ctx.module_data_mut(module).parent = None;
        ChangeStatus::Accepted
    }

    /// Modules with the given name, in identity order.
    pub fn find_modules(self, ctx: &Context, name: &str) -> Vec<Module> {
        ctx.ir_data(self)
            .modules
            .range((name.to_string(), Module::from_uuid(Uuid::nil()))..)
            .take_while(|(n, _)| n.as_str() == name)
            .map(|(_, m)| *m)
            .collect()
    }

    /// The owned module with the given UUID, if any.
    pub fn find_module(self, ctx: &Context, uuid: Uuid) -> Option<Module> {
        match ctx.lookup(uuid)? {
            Node::Module(module) if module.ir(ctx) == Some(self) => Some(module),
            _ => None,
        }
    }

    // ===== Aggregate queries =====

    /// Iterate every transitively owned block in address order, merged
    /// across modules.
    pub fn blocks(self, ctx: &Context) -> impl Iterator<Item = Block> + '_ {
        let streams: Vec<_> = self
            .modules(ctx)
            .map(|m| m.blocks(ctx).collect::<Vec<_>>().into_iter())
            .collect();
        crate::merge::MergeSorted::new(streams, move |a: &Block, b: &Block| {
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

    /// Sections of any module with a byte interval containing `addr`.
    pub fn find_sections_on(self, ctx: &Context, addr: Addr) -> Vec<Section> {
        let mut found = Vec::new();
        for module in self.modules(ctx) {
            found.extend(module.find_sections_on(ctx, addr));
        }
        found
    }

    /// Byte intervals of any module whose range contains `addr`, in
    /// address order.
    pub fn find_byte_intervals_on(self, ctx: &Context, addr: Addr) -> Vec<ByteInterval> {
        let mut found = Vec::new();
        for module in self.modules(ctx) {
            found.extend(module.find_byte_intervals_on(ctx, addr));
        }
        found.sort_by_key(|bi| interval_order_key(ctx, *bi));
        found
    }

    /// Blocks of any module whose derived range contains `addr`, in
    /// address order.
    pub fn find_blocks_on(self, ctx: &Context, addr: Addr) -> Vec<Block> {
        let mut found = Vec::new();
        for module in self.modules(ctx) {
            found.extend(module.find_blocks_on(ctx, addr));
        }
        found.sort_by_key(|b| block_order_key(ctx, *b));
        found
    }

    /// Code blocks of any module whose derived range contains `addr`.
    pub fn find_code_blocks_on(self, ctx: &Context, addr: Addr) -> Vec<CodeBlock> {
        self.find_blocks_on(ctx, addr)
            .into_iter()
            .filter_map(Block::as_code_block)
            .collect()
    }

    /// Data blocks of any module whose derived range contains `addr`.
    pub fn find_data_blocks_on(self, ctx: &Context, addr: Addr) -> Vec<DataBlock> {
        self.find_blocks_on(ctx, addr)
            .into_iter()
            .filter_map(Block::as_data_block)
            .collect()
    }

    /// Symbols of any module with the given name.
    pub fn find_symbols(self, ctx: &Context, name: &str) -> Vec<Symbol> {
        let mut found = Vec::new();
        for module in self.modules(ctx) {
            found.extend(module.find_symbols(ctx, name));
        }
        found
    }

    // ===== CFG =====

    /// The interprocedural control-flow graph.
    pub fn cfg(self, ctx: &Context) -> &Cfg {
        &ctx.ir_data(self).cfg
    }

    /// The CFG, mutably. Edits here touch no ancestor index.
    pub fn cfg_mut(self, ctx: &mut Context) -> &mut Cfg {
        &mut ctx.ir_data_mut(self).cfg
    }
}

impl AuxDataContainer for Ir {
    fn aux_data_map(self, ctx: &Context) -> &BTreeMap<String, AuxData> {
        &ctx.ir_data(self).aux_data
    }

    fn aux_data_map_mut(self, ctx: &mut Context) -> &mut BTreeMap<String, AuxData> {
        &mut ctx.ir_data_mut(self).aux_data
    }
}

impl Context {
    /// Re-key a module in its IR's name-ordered set after a rename.
    pub(crate) fn on_module_name_changed(
        &mut self,
        ir: Ir,
        module: Module,
        old: &str,
        new: &str,
    ) -> ChangeStatus {
        let data = self.ir_data_mut(ir);
        data.modules.remove(&(old.to_string(), module));
        data.modules.insert((new.to_string(), module));
        ChangeStatus::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modules_ordered_by_name() {
        let mut ctx = Context::new();
        let ir = Ir::new(&mut ctx);
        let zeta = Module::new(&mut ctx, "zeta");
        let alpha = Module::new(&mut ctx, "alpha");
        ir.add_module(&mut ctx, zeta);
        ir.add_module(&mut ctx, alpha);
        let names: Vec<String> = ir
            .modules(&ctx)
            .map(|m| m.name(&ctx).to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_rename_reorders_modules() {
        let mut ctx = Context::new();
        let ir = Ir::new(&mut ctx);
        let a = Module::new(&mut ctx, "a");
        let b = Module::new(&mut ctx, "b");
        ir.add_module(&mut ctx, a);
        ir.add_module(&mut ctx, b);
        let status = a.set_name(&mut ctx, "z");
        assert!(status.is_accepted());
        let ordered: Vec<Module> = ir.modules(&ctx).collect();
        assert_eq!(ordered, vec![b, a]);
        assert_eq!(ir.find_modules(&ctx, "z"), vec![a]);
        assert!(ir.find_modules(&ctx, "a").is_empty());
    }

    #[test]
    fn test_module_move_between_irs() {
        let mut ctx = Context::new();
        let first = Ir::new(&mut ctx);
        let second = Ir::new(&mut ctx);
        let module = Module::new(&mut ctx, "m");
        first.add_module(&mut ctx, module);
        assert_eq!(second.add_module(&mut ctx, module), ChangeStatus::Accepted);
        assert_eq!(module.ir(&ctx), Some(second));
        assert_eq!(first.modules(&ctx).count(), 0);
        assert_eq!(second.modules(&ctx).count(), 1);
    }

    #[test]
    fn test_find_module_by_uuid_scoped_to_ir() {
        let mut ctx = Context::new();
        let ir = Ir::new(&mut ctx);
        let other = Ir::new(&mut ctx);
        let module = Module::new(&mut ctx, "m");
        ir.add_module(&mut ctx, module);
        assert_eq!(ir.find_module(&ctx, module.uuid()), Some(module));
        assert_eq!(other.find_module(&ctx, module.uuid()), None);
    }
}
