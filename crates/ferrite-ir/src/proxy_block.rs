//! Proxy blocks: addressless stand-ins for external CFG targets.

use crate::node::NodeKind;
use crate::{Context, Error, Module};
use uuid::Uuid;

/// A block with no address and no size, used as the source or target of CFG
/// edges that leave the binary (external calls, unresolved jumps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyBlock(Uuid);

#[derive(Debug, Default)]
pub(crate) struct ProxyBlockData {
    pub(crate) parent: Option<Module>,
}

impl ProxyBlock {
    /// Create a parentless proxy block.
    pub fn new(ctx: &mut Context) -> ProxyBlock {
        let uuid = ctx.register_new(NodeKind::ProxyBlock);
        ctx.proxy_blocks.insert(uuid, ProxyBlockData::default());
        ProxyBlock(uuid)
    }

    /// Create a proxy block with a caller-chosen UUID.
    pub fn with_uuid(ctx: &mut Context, uuid: Uuid) -> Result<ProxyBlock, Error> {
        ctx.register(uuid, NodeKind::ProxyBlock)?;
        ctx.proxy_blocks.insert(uuid, ProxyBlockData::default());
        Ok(ProxyBlock(uuid))
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> ProxyBlock {
        ProxyBlock(uuid)
    }

    /// The block's UUID.
    pub fn uuid(self) -> Uuid {
        self.0
    }

    /// The module that owns this proxy block, if any.
    pub fn module(self, ctx: &Context) -> Option<Module> {
        ctx.proxy_data(self).parent
    }
}
