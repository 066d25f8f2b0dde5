//! Symbols: named references to addresses or nodes.

use crate::node::{Node, NodeKind};
use crate::observer::assert_not_rejected;
use crate::{Addr, ChangeStatus, CodeBlock, Context, DataBlock, Error, Module, ProxyBlock};
use uuid::Uuid;

/// A node a symbol can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Referent {
    /// A [`CodeBlock`].
    Code(CodeBlock),
    /// A [`DataBlock`].
    Data(DataBlock),
    /// A [`ProxyBlock`].
    Proxy(ProxyBlock),
}

impl Referent {
    /// The referent's UUID.
    pub fn uuid(self) -> Uuid {
        match self {
            Referent::Code(b) => b.uuid(),
            Referent::Data(b) => b.uuid(),
            Referent::Proxy(b) => b.uuid(),
        }
    }

    /// The referent's address; proxy blocks and unaddressed intervals yield
    /// none.
    pub fn address(self, ctx: &Context) -> Option<Addr> {
        match self {
            Referent::Code(b) => b.address(ctx),
            Referent::Data(b) => b.address(ctx),
            Referent::Proxy(_) => None,
        }
    }

    /// The referent's size; proxy blocks have none and count as zero.
    pub fn size(self, ctx: &Context) -> u64 {
        match self {
            Referent::Code(b) => b.size(ctx),
            Referent::Data(b) => b.size(ctx),
            Referent::Proxy(_) => 0,
        }
    }

    /// View a generic node as a referent, when its kind allows.
    pub fn from_node(node: Node) -> Option<Referent> {
        match node {
            Node::CodeBlock(b) => Some(Referent::Code(b)),
            Node::DataBlock(b) => Some(Referent::Data(b)),
            Node::ProxyBlock(b) => Some(Referent::Proxy(b)),
            _ => None,
        }
    }
}

/// What a symbol denotes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SymbolPayload {
    /// The symbol denotes nothing yet.
    #[default]
    None,
    /// The symbol denotes a bare address.
    Address(Addr),
    /// The symbol denotes a node.
    Referent(Referent),
}

impl SymbolPayload {
    pub(crate) fn referent_uuid(self) -> Option<Uuid> {
        match self {
            SymbolPayload::Referent(r) => Some(r.uuid()),
            _ => None,
        }
    }
}

/// A named reference to an address or node, optionally taken at the
/// referent's end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Uuid);

#[derive(Debug)]
pub(crate) struct SymbolData {
    pub(crate) parent: Option<Module>,
    pub(crate) name: String,
    pub(crate) at_end: bool,
    pub(crate) payload: SymbolPayload,
}

impl Symbol {
    /// Create a parentless symbol with no payload.
    pub fn new(ctx: &mut Context, name: impl Into<String>) -> Symbol {
        let uuid = ctx.register_new(NodeKind::Symbol);
        ctx.symbols.insert(
            uuid,
            SymbolData {
                parent: None,
                name: name.into(),
                at_end: false,
                payload: SymbolPayload::None,
            },
        );
        Symbol(uuid)
    }

    /// Create a symbol denoting a bare address.
    pub fn with_address(ctx: &mut Context, name: impl Into<String>, address: Addr) -> Symbol {
        let symbol = Symbol::new(ctx, name);
        ctx.symbol_data_mut(symbol).payload = SymbolPayload::Address(address);
        symbol
    }

    /// Create a symbol denoting a node.
    pub fn with_referent(ctx: &mut Context, name: impl Into<String>, referent: Referent) -> Symbol {
        let symbol = Symbol::new(ctx, name);
        ctx.symbol_data_mut(symbol).payload = SymbolPayload::Referent(referent);
        symbol
    }

    /// Create a symbol with a caller-chosen UUID.
    pub fn with_uuid(
        ctx: &mut Context,
        uuid: Uuid,
        name: impl Into<String>,
        at_end: bool,
        payload: SymbolPayload,
    ) -> Result<Symbol, Error> {
        ctx.register(uuid, NodeKind::Symbol)?;
        ctx.symbols.insert(
            uuid,
            SymbolData {
                parent: None,
                name: name.into(),
                at_end,
                payload,
            },
        );
        Ok(Symbol(uuid))
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> Symbol {
        Symbol(uuid)
    }

    /// The symbol's UUID.
    pub fn uuid(self) -> Uuid {
        self.0
    }

    /// The module that owns this symbol, if any.
    pub fn module(self, ctx: &Context) -> Option<Module> {
        ctx.symbol_data(self).parent
    }

    /// The symbol's name.
    pub fn name(self, ctx: &Context) -> &str {
        &ctx.symbol_data(self).name
    }

    /// Rename the symbol, re-indexing it in its module.
    pub fn set_name(self, ctx: &mut Context, name: impl Into<String>) -> ChangeStatus {
        let name = name.into();
        let (old, parent) = {
            let data = ctx.symbol_data_mut(self);
            if data.name == name {
                return ChangeStatus::NoChange;
            }
            let old = std::mem::replace(&mut data.name, name.clone());
            (old, data.parent)
        };
        if let Some(module) = parent {
            let status = ctx.on_symbol_name_changed(module, self, &old, &name);
            assert_not_rejected!(status);
        }
        ChangeStatus::Accepted
    }

    /// Whether the symbol's address is taken at the end of its referent.
    pub fn at_end(self, ctx: &Context) -> bool {
        ctx.symbol_data(self).at_end
    }

    /// Set the at-end flag, re-indexing the symbol's effective address.
    pub fn set_at_end(self, ctx: &mut Context, at_end: bool) -> ChangeStatus {
        if ctx.symbol_data(self).at_end == at_end {
            return ChangeStatus::NoChange;
        }
        let old_key = self.address(ctx);
        ctx.symbol_data_mut(self).at_end = at_end;
        self.notify_payload_changed(ctx, old_key, None, None);
        ChangeStatus::Accepted
    }

    /// The symbol's payload.
    pub fn payload(self, ctx: &Context) -> SymbolPayload {
        ctx.symbol_data(self).payload
    }

    /// The symbol's referent, when the payload is one.
    pub fn referent(self, ctx: &Context) -> Option<Referent> {
        match ctx.symbol_data(self).payload {
            SymbolPayload::Referent(r) => Some(r),
            _ => None,
        }
    }

    /// Replace the payload, re-indexing address and referent views.
    pub fn set_payload(self, ctx: &mut Context, payload: SymbolPayload) -> ChangeStatus {
        let data = ctx.symbol_data(self);
        if data.payload == payload {
            return ChangeStatus::NoChange;
        }
        let old_key = self.address(ctx);
        let old_referent = data.payload.referent_uuid();
        ctx.symbol_data_mut(self).payload = payload;
        self.notify_payload_changed(ctx, old_key, old_referent, payload.referent_uuid());
        ChangeStatus::Accepted
    }

    /// Point the symbol at a bare address.
    pub fn set_address(self, ctx: &mut Context, address: Addr) -> ChangeStatus {
        self.set_payload(ctx, SymbolPayload::Address(address))
    }

    /// Point the symbol at a node.
    pub fn set_referent(self, ctx: &mut Context, referent: Referent) -> ChangeStatus {
        self.set_payload(ctx, SymbolPayload::Referent(referent))
    }

    /// The symbol's effective address.
    ///
    /// A bare-address payload yields that address. A referent payload yields
    /// the referent's address (none while its interval is unaddressed),
    /// plus the referent's size when the symbol is at-end. No payload yields
    /// none.
    pub fn address(self, ctx: &Context) -> Option<Addr> {
        let data = ctx.symbol_data(self);
        match data.payload {
            SymbolPayload::None => None,
            SymbolPayload::Address(addr) => Some(addr),
            SymbolPayload::Referent(r) => {
                let addr = r.address(ctx)?;
                Some(if data.at_end {
                    addr.wrapping_add(r.size(ctx))
                } else {
                    addr
                })
            }
        }
    }

    fn notify_payload_changed(
        self,
        ctx: &mut Context,
        old_key: Option<Addr>,
        old_referent: Option<Uuid>,
        new_referent: Option<Uuid>,
    ) {
        if let Some(module) = ctx.symbol_data(self).parent {
            let new_key = self.address(ctx);
            let status =
                ctx.on_symbol_payload_changed(module, self, old_key, new_key, old_referent, new_referent);
            assert_not_rejected!(status);
        }
    }
}

/// Snapshot the effective address of every symbol whose referent is one of
/// `referents`, across all modules in the context.
///
/// Call before a mutation that moves referents (interval re-addressing,
/// block insertion or removal, block resizing), then hand the snapshot to
/// [`reindex_captured_symbols`] once the mutation has been applied.
pub(crate) fn capture_symbols_referencing(
    ctx: &Context,
    referents: &[Uuid],
) -> Vec<(Symbol, Option<Addr>)> {
    let mut affected = Vec::new();
    for data in ctx.modules.values() {
        for uuid in referents {
            if let Some(symbols) = data.symbols_by_referent.get(uuid) {
                affected.extend(symbols.iter().copied());
            }
        }
    }
    affected
        .into_iter()
        .map(|symbol| (symbol, symbol.address(ctx)))
        .collect()
}

/// Re-key every captured symbol whose effective address changed.
pub(crate) fn reindex_captured_symbols(ctx: &mut Context, captured: Vec<(Symbol, Option<Addr>)>) {
    for (symbol, old_key) in captured {
        let new_key = symbol.address(ctx);
        if new_key == old_key {
            continue;
        }
        if let Some(module) = ctx.symbol_data(symbol).parent {
            ctx.module_data_mut(module)
                .reindex_symbol_addr(symbol, old_key, new_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_address_of_bare_payloads() {
        let mut ctx = Context::new();
        let none = Symbol::new(&mut ctx, "none");
        let addr = Symbol::with_address(&mut ctx, "addr", Addr(0x1000));
        assert_eq!(none.address(&ctx), None);
        assert_eq!(addr.address(&ctx), Some(Addr(0x1000)));
    }

    #[test]
    fn test_proxy_referent_has_no_address() {
        let mut ctx = Context::new();
        let proxy = ProxyBlock::new(&mut ctx);
        let sym = Symbol::with_referent(&mut ctx, "ext", Referent::Proxy(proxy));
        assert_eq!(sym.address(&ctx), None);
        assert_eq!(sym.referent(&ctx), Some(Referent::Proxy(proxy)));
    }

    #[test]
    fn test_set_name_detached() {
        let mut ctx = Context::new();
        let sym = Symbol::new(&mut ctx, "a");
        assert_eq!(sym.set_name(&mut ctx, "a"), ChangeStatus::NoChange);
        assert_eq!(sym.set_name(&mut ctx, "b"), ChangeStatus::Accepted);
        assert_eq!(sym.name(&ctx), "b");
    }

    #[test]
    fn test_payload_replacement() {
        let mut ctx = Context::new();
        let sym = Symbol::new(&mut ctx, "s");
        assert_eq!(sym.set_address(&mut ctx, Addr(4)), ChangeStatus::Accepted);
        assert_eq!(
            sym.set_payload(&mut ctx, SymbolPayload::Address(Addr(4))),
            ChangeStatus::NoChange
        );
        assert_eq!(sym.payload(&ctx), SymbolPayload::Address(Addr(4)));
    }
}
