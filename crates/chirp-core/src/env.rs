//! Environment variable utilities
//!
//! Typed lookups used by the config layer (`CHIRP_MODE`,
//! `CHIRP_CONSUMERS`). A variable that is unset or fails to parse is
//! treated the same as absent.

use std::str::FromStr;

/// Get environment variable parsed as `T`, or `None` if unset or invalid
///
/// # Examples
///
/// ```
/// use chirp_core::env_get_opt;
///
/// let consumers: Option<usize> = env_get_opt("__CHIRP_DOC_UNSET__");
/// assert!(consumers.is_none());
/// ```
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
