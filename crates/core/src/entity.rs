//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Orders, carts and purchases are entities: two records with equal field
/// values are still different records when their identifiers differ.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
