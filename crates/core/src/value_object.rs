//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**. Two value objects with the same values
//! are the same value (`Money(10.00)` is `Money(10.00)` wherever it came from).

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by value. To "modify" one, build a
/// new one. Requires `Clone + PartialEq + Debug` so values can be copied around,
/// compared in assertions and logged.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
