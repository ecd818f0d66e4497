// id.rs — Stable identifiers for patch entities
//
// Patch documents address blocks, slots, edges, buses and bus routes by
// string id. Newtypes keep the namespaces apart at compile time; ordering is
// plain lexicographic `String` ordering, which every deterministic pass
// (topological tie-breaks, publisher sorting, provider synthesis) relies on.
//
// Derived ids (default providers, auto-wired edges) are produced here and
// nowhere else, so re-running a pass always yields the same names.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a block instance within a patch.
    BlockId
);
string_id!(
    /// Identifier of a slot, unique within its owning block.
    SlotId
);
string_id!(
    /// Identifier of a port-to-port edge.
    EdgeId
);
string_id!(
    /// Identifier of a bus.
    BusId
);
string_id!(
    /// Identifier of a publisher or listener record.
    RouteId
);

/// Id of the hidden provider block backing `block.slot`'s default source.
pub fn default_provider_id(block: &BlockId, slot: &SlotId) -> BlockId {
    BlockId(format!("{}_default_{}", block, slot))
}

/// Id of the edge connecting a default provider to the input it backs.
pub fn default_provider_edge_id(provider: &BlockId) -> EdgeId {
    EdgeId(format!("{}_edge", provider))
}

/// Id of an edge proposed by the auto-wire resolver.
pub fn auto_edge_id(
    from_block: &BlockId,
    from_slot: &SlotId,
    to_block: &BlockId,
    to_slot: &SlotId,
) -> EdgeId {
    EdgeId(format!(
        "auto_{}.{}_{}.{}",
        from_block, from_slot, to_block, to_slot
    ))
}
