//! Entity trait: records with a stable identity.

use core::fmt::{Debug, Display};
use core::hash::Hash;

/// A record identified by its id rather than its contents.
///
/// Catalog records (products, warehouses) and ledger facts (movements) are
/// entities: two records with the same id are the same thing, even if the
/// catalog record has since been edited.
pub trait Entity {
    /// Lowercase kind name used in messages ("product", "warehouse", ...).
    const KIND: &'static str;

    type Id: Copy + Eq + Hash + Debug + Display;

    fn id(&self) -> &Self::Id;

    /// Same entity, regardless of field values.
    fn same_entity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
