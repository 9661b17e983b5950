//! Ownership kinds and memory-operation ownership qualifiers.

use std::fmt;

/// Lifecycle discipline of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OwnershipKind {
    /// No ownership obligation. Every trivial value has this kind.
    #[default]
    None,
    /// The holder must consume the value exactly once.
    Owned,
    /// Borrowed for a scope; must not be consumed.
    Guaranteed,
    /// Unmanaged reference with no lifetime guarantee.
    Unowned,
}

impl OwnershipKind {
    /// Whether values of this kind carry a lifetime that must be ended.
    pub fn has_lifetime(self) -> bool {
        matches!(self, OwnershipKind::Owned | OwnershipKind::Guaranteed)
    }
}

impl fmt::Display for OwnershipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipKind::None => write!(f, "@none"),
            OwnershipKind::Owned => write!(f, "@owned"),
            OwnershipKind::Guaranteed => write!(f, "@guaranteed"),
            OwnershipKind::Unowned => write!(f, "@unowned"),
        }
    }
}

/// How a `load` treats the value left in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOwnershipQualifier {
    /// Ownership not tracked (lowered code).
    Unqualified,
    /// Move the value out of memory.
    Take,
    /// Copy the value, leaving memory initialized.
    Copy,
    /// Plain bitwise load of a trivial value.
    Trivial,
}

impl LoadOwnershipQualifier {
    /// Ownership kind of the loaded value.
    pub fn result_ownership(self) -> OwnershipKind {
        match self {
            LoadOwnershipQualifier::Take | LoadOwnershipQualifier::Copy => OwnershipKind::Owned,
            LoadOwnershipQualifier::Unqualified | LoadOwnershipQualifier::Trivial => {
                OwnershipKind::None
            }
        }
    }
}

impl fmt::Display for LoadOwnershipQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadOwnershipQualifier::Unqualified => Ok(()),
            LoadOwnershipQualifier::Take => write!(f, "[take] "),
            LoadOwnershipQualifier::Copy => write!(f, "[copy] "),
            LoadOwnershipQualifier::Trivial => write!(f, "[trivial] "),
        }
    }
}

/// How a `store` treats the stored value and the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOwnershipQualifier {
    /// Ownership not tracked (lowered code).
    Unqualified,
    /// Initialize uninitialized memory, consuming the source.
    Init,
    /// Destroy the old value, then initialize, consuming the source.
    Assign,
    /// Plain bitwise store of a trivial value.
    Trivial,
}

impl fmt::Display for StoreOwnershipQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOwnershipQualifier::Unqualified => Ok(()),
            StoreOwnershipQualifier::Init => write!(f, "[init] "),
            StoreOwnershipQualifier::Assign => write!(f, "[assign] "),
            StoreOwnershipQualifier::Trivial => write!(f, "[trivial] "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_display() {
        assert_eq!(OwnershipKind::None.to_string(), "@none");
        assert_eq!(OwnershipKind::Owned.to_string(), "@owned");
        assert_eq!(OwnershipKind::Guaranteed.to_string(), "@guaranteed");
        assert_eq!(OwnershipKind::Unowned.to_string(), "@unowned");
    }

    #[test]
    fn test_load_result_ownership() {
        assert_eq!(
            LoadOwnershipQualifier::Copy.result_ownership(),
            OwnershipKind::Owned
        );
        assert_eq!(
            LoadOwnershipQualifier::Take.result_ownership(),
            OwnershipKind::Owned
        );
        assert_eq!(
            LoadOwnershipQualifier::Trivial.result_ownership(),
            OwnershipKind::None
        );
    }

    #[test]
    fn test_lifetime_kinds() {
        assert!(OwnershipKind::Owned.has_lifetime());
        assert!(OwnershipKind::Guaranteed.has_lifetime());
        assert!(!OwnershipKind::None.has_lifetime());
        assert!(!OwnershipKind::Unowned.has_lifetime());
    }
}
