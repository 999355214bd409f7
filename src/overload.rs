//! Overload resolution
//!
//! The common case is a single variant, which is taken without looking at
//! any signature. With more than one, the foreign runtime must supply the
//! collapsed signature of its actual arguments; the first variant in
//! registration order with that foreign signature wins. There is no
//! arity-only fallback.

use crate::error::ResolveError;
use crate::signature::Signature;

/// Anything selectable by foreign signature
pub trait Overload {
    fn foreign_signature(&self) -> &Signature;
}

/// Pick one variant from an overload set
pub fn resolve<'a, T: Overload + ?Sized>(
    candidates: &[&'a T],
    hint: Option<&str>,
) -> Result<&'a T, ResolveError> {
    match candidates {
        [] => Err(ResolveError::NoCandidates),
        [only] => Ok(*only),
        _ => {
            let Some(hint) = hint else {
                return Err(ResolveError::MissingHint {
                    candidates: describe(candidates),
                });
            };
            candidates
                .iter()
                .find(|c| c.foreign_signature().matches(hint))
                .copied()
                .ok_or_else(|| ResolveError::NoMatch {
                    hint: hint.to_string(),
                    candidates: describe(candidates),
                })
        }
    }
}

fn describe<T: Overload + ?Sized>(candidates: &[&T]) -> Vec<String> {
    candidates.iter().map(|c| c.foreign_signature().to_string()).collect()
}
