//! Object-kind encoding shared by both sides
//!
//! - `kind >= 0`: numeric id of a registered host class
//! - `kind == -1`: unregistered host object, opaque to the foreign side
//! - `kind <= -2`: `-(tag) - 2`, a foreign object surfaced through wrapper `tag`

use crate::registry::ClassId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKind(pub i32);

impl ObjectKind {
    pub const OPAQUE: ObjectKind = ObjectKind(-1);

    #[inline]
    pub const fn registered(id: ClassId) -> Self {
        Self(id as i32)
    }

    #[inline]
    pub const fn wrapper(tag: u8) -> Self {
        Self(-(tag as i32) - 2)
    }

    #[inline]
    pub const fn class_id(self) -> Option<ClassId> {
        if self.0 >= 0 {
            Some(self.0 as ClassId)
        } else {
            None
        }
    }

    #[inline]
    pub const fn wrapper_tag(self) -> Option<u8> {
        if self.0 <= -2 {
            Some((-self.0 - 2) as u8)
        } else {
            None
        }
    }

    #[inline]
    pub const fn is_opaque(self) -> bool {
        self.0 == -1
    }
}

/// The fixed, ordered set of wrapper variants a foreign object can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WrapperKind {
    /// Any interpreter object
    Object = 0,
    /// Interpreter vector, with element access
    Vector = 1,
}

impl WrapperKind {
    pub const ALL: [WrapperKind; 2] = [Self::Object, Self::Vector];

    #[inline]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Object),
            1 => Some(Self::Vector),
            _ => None,
        }
    }

    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn object_kind(self) -> ObjectKind {
        ObjectKind::wrapper(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ranges() {
        assert_eq!(ObjectKind::registered(0).class_id(), Some(0));
        assert_eq!(ObjectKind::registered(7).wrapper_tag(), None);
        assert!(ObjectKind::OPAQUE.is_opaque());
        assert_eq!(ObjectKind::OPAQUE.class_id(), None);
        assert_eq!(ObjectKind::OPAQUE.wrapper_tag(), None);
        assert_eq!(ObjectKind::wrapper(0), ObjectKind(-2));
        assert_eq!(ObjectKind::wrapper(1), ObjectKind(-3));
    }

    #[test]
    fn test_wrapper_tags_invert() {
        for w in WrapperKind::ALL {
            assert_eq!(w.object_kind().wrapper_tag(), Some(w.tag()));
            assert_eq!(WrapperKind::from_tag(w.tag()), Some(w));
        }
        assert_eq!(WrapperKind::from_tag(2), None);
    }
}
