use anyhow::Result;

use crate::error::{user_facing_message, GenerationError};

/// A value produced by one tier of a primary/fallback pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<U> {
    pub value: U,
    pub target: String,
    pub primary_failure: Option<String>,
}

/// Runs `call` against `primary`; if it errors or `accept` rejects the result,
/// runs it once against `fallback`.
///
/// The primary failure is reported through `on_primary_failure` and otherwise
/// swallowed. A fallback error propagates unchanged; a fallback result that
/// `accept` rejects becomes [`GenerationError::Blocked`].
pub fn attempt_with_fallback<T, U>(
    primary: &str,
    fallback: &str,
    mut call: impl FnMut(&str) -> Result<T>,
    accept: impl Fn(T) -> Option<U>,
    on_primary_failure: impl FnOnce(&str),
) -> Result<Attempted<U>> {
    let primary_failure = match call(primary) {
        Ok(value) => match accept(value) {
            Some(value) => {
                return Ok(Attempted {
                    value,
                    target: primary.to_string(),
                    primary_failure: None,
                })
            }
            None => format!("{primary} returned no result"),
        },
        Err(err) => user_facing_message(&err),
    };
    on_primary_failure(&primary_failure);

    let value = call(fallback)?;
    let Some(value) = accept(value) else {
        return Err(GenerationError::Blocked.into());
    };
    Ok(Attempted {
        value,
        target: fallback.to_string(),
        primary_failure: Some(primary_failure),
    })
}
