//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new value with the changed fields (struct update syntax) and keep the
/// original untouched. Read models built by projections (audit entries, status
/// records) are value objects: set-union merging relies on value equality.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
