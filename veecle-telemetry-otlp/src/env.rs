//! Environment variable lookup for tuning knobs.

use std::time::Duration;

/// Reads the process environment.
pub(crate) fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Reads a non-negative integer, ignoring unset variables and warning about invalid ones.
pub(crate) fn read_usize(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<usize> {
    let raw = lookup(name)?;
    match raw.trim().parse::<usize>() {
        Ok(value) => Some(value),
        Err(error) => {
            log::warn!("ignoring environment variable {name}={raw:?}: {error}");
            None
        }
    }
}

/// Reads a duration given in milliseconds.
pub(crate) fn read_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<Duration> {
    read_usize(lookup, name).map(|millis| Duration::from_millis(millis as u64))
}
