//! Application toggle assignments.

use crate::accessor::DataAccessor;
use crate::models::ApplicationConfig;
use crate::observability::RequestContext;
use crate::{Error, Result};

/// Parses a `NAME=BOOL` assignment.
///
/// Accepts `true`/`false`, `on`/`off`, `yes`/`no` and `1`/`0`, in any case.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for a missing name or an unknown value.
pub fn parse_toggle(assignment: &str) -> Result<(String, bool)> {
    let invalid = || Error::InvalidInput(format!("expected NAME=BOOL, got {assignment:?}"));
    let (name, value) = assignment.split_once('=').ok_or_else(invalid)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid());
    }
    let value = match value.trim().to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => true,
        "false" | "off" | "no" | "0" => false,
        _ => return Err(invalid()),
    };
    Ok((name.to_string(), value))
}

/// Sets toggles on top of the stored configuration and saves the result.
///
/// A store without configuration starts from an empty one.
///
/// # Errors
///
/// Returns the load or save failure.
pub fn apply_toggles<A: DataAccessor + ?Sized>(
    accessor: &A,
    ctx: &RequestContext,
    assignments: &[(String, bool)],
) -> Result<ApplicationConfig> {
    let mut config = match accessor.get_app_config(ctx) {
        Ok(config) => config,
        Err(e) if e.is_not_found() => ApplicationConfig::default(),
        Err(e) => return Err(e),
    };
    for (name, value) in assignments {
        config.toggles.insert(name.clone(), *value);
    }
    accessor.save_app_config(ctx, &config)?;
    Ok(config)
}
