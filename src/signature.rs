//! Signature codec - compact parameter/return type strings
//!
//! Host alphabet: `d` double, `i` int, `b` bool, `s` char buffer,
//! `S` string, `o` object. The foreign runtime has a single numeric scalar,
//! so its view collapses `i` and `b` to `d`.

use crate::error::SignatureError;
use core::fmt;
use smallvec::SmallVec;

/// One position of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SigChar {
    Double = b'd',
    Int = b'i',
    Bool = b'b',
    Chars = b's',
    Str = b'S',
    Object = b'o',
}

impl SigChar {
    /// Every tag, in alphabet order
    pub const ALL: [SigChar; 6] = [
        Self::Double,
        Self::Int,
        Self::Bool,
        Self::Chars,
        Self::Str,
        Self::Object,
    ];

    #[inline]
    pub const fn tag(self) -> char {
        self as u8 as char
    }

    /// Exhaustive tag table; anything else is not part of the alphabet
    #[inline]
    pub const fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'd' => Some(Self::Double),
            'i' => Some(Self::Int),
            'b' => Some(Self::Bool),
            's' => Some(Self::Chars),
            'S' => Some(Self::Str),
            'o' => Some(Self::Object),
            _ => None,
        }
    }

    /// The foreign caller's view of this position
    #[inline]
    pub const fn to_foreign(self) -> Self {
        match self {
            Self::Int | Self::Bool => Self::Double,
            other => other,
        }
    }

    /// Human name for error messages
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Chars => "char buffer",
            Self::Str => "string",
            Self::Object => "object",
        }
    }
}

/// Declared kind of a host parameter
///
/// `Unsupported` stands for any host type with no alphabet mapping (wide
/// integers, arrays, ...). A member using one is never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Double,
    Int,
    Bool,
    CharArray,
    String,
    Object,
    Unsupported(&'static str),
}

impl ParamKind {
    #[inline]
    pub const fn sig_char(self) -> Option<SigChar> {
        match self {
            Self::Double => Some(SigChar::Double),
            Self::Int => Some(SigChar::Int),
            Self::Bool => Some(SigChar::Bool),
            Self::CharArray => Some(SigChar::Chars),
            Self::String => Some(SigChar::Str),
            Self::Object => Some(SigChar::Object),
            Self::Unsupported(_) => None,
        }
    }
}

/// Declared return kind of a host method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Double,
    Int,
    Bool,
    Void,
    Chars,
    Object,
    Unsupported,
}

impl ReturnKind {
    /// Internal tag (`\0` for unsupported)
    pub const fn tag(self) -> char {
        match self {
            Self::Double => 'd',
            Self::Int => 'i',
            Self::Bool => 'b',
            Self::Void => 'v',
            Self::Chars => 's',
            Self::Object => 'o',
            Self::Unsupported => '\0',
        }
    }

    /// Which foreign accessor surfaces this kind: `d`, `s` or `o`
    pub const fn foreign_type(self) -> Option<char> {
        match self {
            Self::Double | Self::Int | Self::Bool | Self::Void => Some('d'),
            Self::Chars => Some('s'),
            Self::Object => Some('o'),
            Self::Unsupported => None,
        }
    }

    #[inline]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Ordered parameter signature
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    chars: SmallVec<[SigChar; 8]>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chars(chars: &[SigChar]) -> Self {
        Self {
            chars: SmallVec::from_slice(chars),
        }
    }

    /// Parse signature text; rejects any character outside the alphabet
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        text.chars()
            .enumerate()
            .map(|(position, tag)| {
                SigChar::from_tag(tag).ok_or(SignatureError::UnknownTag { tag, position })
            })
            .collect::<Result<SmallVec<_>, _>>()
            .map(|chars| Self { chars })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    #[inline]
    pub fn chars(&self) -> &[SigChar] {
        &self.chars
    }

    /// Compare against signature text supplied by the foreign runtime
    pub fn matches(&self, text: &str) -> bool {
        self.chars.len() == text.len()
            && self.chars.iter().zip(text.chars()).all(|(c, t)| c.tag() == t)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.chars {
            write!(f, "{}", c.tag())?;
        }
        Ok(())
    }
}

/// Derive the host signature of a parameter list
///
/// Returns `None` when any parameter has no alphabet mapping, which marks
/// the member as unregistrable.
pub fn derive_host_signature(params: &[ParamKind]) -> Option<Signature> {
    params
        .iter()
        .map(|p| p.sig_char())
        .collect::<Option<SmallVec<_>>>()
        .map(|chars| Signature { chars })
}

/// Collapse a host signature to the foreign caller's view
pub fn to_foreign_signature(host: &Signature) -> Signature {
    Signature {
        chars: host.chars.iter().map(|c| c.to_foreign()).collect(),
    }
}

/// Pairs `(kept, shadowed)` of indices whose distinct host signatures
/// collapse to the same foreign signature. `kept` is always the earlier one.
pub fn foreign_collisions(host: &[Signature]) -> Vec<(usize, usize)> {
    let foreign: Vec<Signature> = host.iter().map(to_foreign_signature).collect();
    let mut pairs = Vec::new();
    for later in 0..host.len() {
        if let Some(first) = (0..later).find(|&earlier| foreign[earlier] == foreign[later]) {
            pairs.push((first, later));
        }
    }
    pairs
}
