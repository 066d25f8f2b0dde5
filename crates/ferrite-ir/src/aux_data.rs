//! Auxiliary data: named, opaque, typed blobs.
//!
//! The IR and each module carry a map from name to [`AuxData`]. Payloads
//! are uninterpreted here; the `type_name` records the schema the producer
//! encoded them under so consumers can decide whether they understand the
//! bytes. Payloads survive serialization byte-identical.

use crate::Context;
use std::collections::BTreeMap;

/// An opaque typed blob attached to an IR or module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxData {
    type_name: String,
    data: Vec<u8>,
}

impl AuxData {
    /// Create a blob with the schema name its bytes were encoded under.
    pub fn new(type_name: impl Into<String>, data: Vec<u8>) -> Self {
        AuxData {
            type_name: type_name.into(),
            data,
        }
    }

    /// The producer's schema name for the payload.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The raw payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Nodes that carry an auxiliary data map ([`Ir`](crate::Ir) and
/// [`Module`](crate::Module)).
pub trait AuxDataContainer: Copy {
    /// The container's map, by shared reference.
    fn aux_data_map(self, ctx: &Context) -> &BTreeMap<String, AuxData>;

    /// The container's map, by mutable reference.
    fn aux_data_map_mut(self, ctx: &mut Context) -> &mut BTreeMap<String, AuxData>;

    /// Look up a blob by name.
    fn aux_data<'a>(self, ctx: &'a Context, name: &str) -> Option<&'a AuxData> {
        self.aux_data_map(ctx).get(name)
    }

    /// Attach a blob under `name`, replacing any existing entry.
    fn set_aux_data(self, ctx: &mut Context, name: impl Into<String>, data: AuxData) {
        self.aux_data_map_mut(ctx).insert(name.into(), data);
    }

    /// Detach the blob under `name`. Returns whether an entry existed.
    fn remove_aux_data(self, ctx: &mut Context, name: &str) -> bool {
        self.aux_data_map_mut(ctx).remove(name).is_some()
    }

    /// Iterate entries in name order.
    fn aux_data_iter(self, ctx: &Context) -> std::collections::btree_map::Iter<'_, String, AuxData> {
        self.aux_data_map(ctx).iter()
    }
}
