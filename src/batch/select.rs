//! Action selectors: `name`, `from..to`, `from..`, `..to` and `..`.

use crate::error::{Error, Result};

/// Expand `selectors` against the ordered action `names`.
///
/// No selectors selects every name. A plain name is passed through even if
/// unknown, since unknown names run as literal commands. Range endpoints
/// must be known names; a range whose start comes after its end is empty.
pub fn resolve_selectors<S: AsRef<str>>(names: &[String], selectors: &[S]) -> Result<Vec<String>> {
    if selectors.is_empty() {
        return Ok(names.to_vec());
    }
    let mut selected = Vec::new();
    for selector in selectors {
        selected.extend(resolve(names, selector.as_ref())?);
    }
    Ok(selected)
}

fn resolve(names: &[String], selector: &str) -> Result<Vec<String>> {
    let parts: Vec<&str> = selector.split("..").collect();
    match parts.as_slice() {
        [""] => Err(Error::selector(selector, "empty selector")),
        [name] => Ok(vec![name.to_string()]),
        [from, to] => {
            let start = if from.is_empty() {
                0
            } else {
                position(names, selector, from)?
            };
            let end = if to.is_empty() {
                names.len()
            } else {
                position(names, selector, to)? + 1
            };
            Ok(names.get(start..end).map(<[String]>::to_vec).unwrap_or_default())
        }
        _ => Err(Error::selector(selector, "more than one '..'")),
    }
}

fn position(names: &[String], selector: &str, name: &str) -> Result<usize> {
    names
        .iter()
        .position(|n| n == name)
        .ok_or_else(|| Error::selector(selector, format!("unknown action '{name}'")))
}
