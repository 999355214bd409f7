//! Argument marshalling - foreign positional data to host values
//!
//! Design: one pass over the signature, one fetch per position, stop at the
//! first failure. Positions are 1-based on the foreign side.

use crate::bridge::{ObjectBridge, Unwrapped};
use crate::error::ArgumentError;
use crate::foreign::{ArgSource, NumericHint, FAILURE_SENTINEL};
use crate::signature::{SigChar, Signature};
use crate::value::ArgumentValue;

/// Pulls an argument list out of an [`ArgSource`]
pub struct ArgumentMarshaller<'a> {
    objects: &'a ObjectBridge,
}

impl<'a> ArgumentMarshaller<'a> {
    pub fn new(objects: &'a ObjectBridge) -> Self {
        Self { objects }
    }

    /// Fetch every position of `signature` in order
    ///
    /// Either the whole list comes back or nothing does; positions after the
    /// first failure are not fetched.
    pub fn pull(&self, signature: &Signature, source: &dyn ArgSource) -> Result<Vec<ArgumentValue>, ArgumentError> {
        let mut values = Vec::with_capacity(signature.len());
        for (i, &c) in signature.chars().iter().enumerate() {
            values.push(self.pull_one(c, i + 1, source)?);
        }
        Ok(values)
    }

    #[inline]
    fn pull_one(&self, c: SigChar, position: usize, source: &dyn ArgSource) -> Result<ArgumentValue, ArgumentError> {
        let bad = || ArgumentError::BadArgument { position, expected: c };
        match c {
            SigChar::Double => {
                let d = source.double_arg(position, NumericHint::Real);
                if d == FAILURE_SENTINEL {
                    return Err(bad());
                }
                Ok(ArgumentValue::Double(d))
            }
            SigChar::Int | SigChar::Bool => {
                let d = source.double_arg(position, NumericHint::Integral);
                if d == FAILURE_SENTINEL {
                    return Err(bad());
                }
                Ok(if c == SigChar::Int {
                    ArgumentValue::Int(d as i32)
                } else {
                    ArgumentValue::Bool(d != 0.0)
                })
            }
            SigChar::Chars | SigChar::Str => source.string_arg(position).map(ArgumentValue::String).ok_or_else(bad),
            SigChar::Object => match self.objects.unwrap_incoming(source.object_arg(position)) {
                Unwrapped::Value(v) => Ok(v),
                Unwrapped::Failed => Err(bad()),
                Unwrapped::UnknownTag(tag) => Err(ArgumentError::UnknownWrapperTag { position, tag }),
            },
        }
    }
}
