//! A packed `Option<T>` for entity references, half the size of `Option<T>`
//! because it reuses a reserved sentinel value instead of a separate
//! discriminant.

use core::fmt;
use core::mem;

/// Types that reserve one value as a niche so `PackedOption<Self>` can avoid
/// a separate discriminant byte.
pub trait ReservedValue {
    /// The reserved value used to represent `None`.
    fn reserved_value() -> Self;
    /// Is `self` the reserved value?
    fn is_reserved_value(&self) -> bool;
}

/// Memory-efficient equivalent of `Option<T>` for `T: ReservedValue`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedOption<T: ReservedValue>(T);

impl<T: ReservedValue> PackedOption<T> {
    /// Is this `None`?
    pub fn is_none(&self) -> bool {
        self.0.is_reserved_value()
    }

    /// Is this `Some`?
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Expand into a full `Option`.
    pub fn expand(self) -> Option<T> {
        if self.is_none() {
            None
        } else {
            Some(self.0)
        }
    }

    /// Unwrap, panicking if this is `None`.
    pub fn unwrap(self) -> T {
        self.expand().expect("PackedOption is none")
    }
}

impl<T: ReservedValue> Default for PackedOption<T> {
    fn default() -> Self {
        Self(T::reserved_value())
    }
}

impl<T: ReservedValue> From<T> for PackedOption<T> {
    fn from(t: T) -> Self {
        debug_assert!(
            !t.is_reserved_value(),
            "cannot store the reserved value in a PackedOption"
        );
        Self(t)
    }
}

impl<T: ReservedValue> From<Option<T>> for PackedOption<T> {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(t) => t.into(),
            None => Self::default(),
        }
    }
}

impl<T: ReservedValue + fmt::Debug> fmt::Debug for PackedOption<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.expand() {
            Some(t) => write!(f, "Some({:?})", t),
            None => write!(f, "None"),
        }
    }
}

#[test]
fn size_matches_bare_value() {
    assert_eq!(
        mem::size_of::<PackedOption<u32>>(),
        mem::size_of::<u32>(),
        "PackedOption must not carry extra discriminant bytes"
    );
}

impl ReservedValue for u32 {
    fn reserved_value() -> Self {
        u32::MAX
    }
    fn is_reserved_value(&self) -> bool {
        *self == u32::MAX
    }
}
