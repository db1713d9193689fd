//! Index newtypes for the node arena and its side tables.

use std::fmt;

macro_rules! graph_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create from a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Get the index as `usize` (for indexing into `Vec`s).
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

graph_index!(
    /// Node in a [`Body`](crate::Body) arena. Stable for the life of the body.
    NodeId
);
graph_index!(
    /// Label (block join point), numbered per body.
    LabelId
);
graph_index!(
    /// Compiler temporary, numbered per compilation unit and never reused.
    TempId
);
graph_index!(
    /// Protected region in a body's exception table.
    RegionId
);
graph_index!(
    /// Entry in a method's finally-function side table.
    FinallyId
);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%t{}", self.0)
    }
}

/// Convert a collection length to the next `u32` index.
///
/// # Panics
///
/// If the table already holds `u32::MAX` entries.
pub fn next_index(len: usize, what: &str) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("{what} exceeds u32::MAX entries"))
}
