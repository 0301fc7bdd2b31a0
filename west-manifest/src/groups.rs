//! Project groups and group filters.
//!
//! A group is a bare label attached to a project. A group filter is an
//! ordered list of signed tokens: `+g` enables group `g`, `-g` disables
//! it. Filters from several sources are concatenated and the *last*
//! sign mentioning a group wins; groups nobody mentions are enabled.

use std::collections::HashMap;

/// True if `token` is a valid group name: non-empty, no whitespace,
/// commas or colons, and no leading sign character.
pub fn is_group(token: &str) -> bool {
    !token.is_empty()
        && !token.starts_with('+')
        && !token.starts_with('-')
        && !token.chars().any(|c| c.is_whitespace() || c == ',' || c == ':')
}

/// True if `item` is a valid filter entry: a sign followed by a group.
pub fn is_filter_item(item: &str) -> bool {
    match item.strip_prefix('+').or_else(|| item.strip_prefix('-')) {
        Some(rest) => is_group(rest),
        None => false,
    }
}

/// Parses a comma-separated filter value, as stored in the
/// `manifest.group-filter` configuration key (e.g. `+foo,-bar`).
pub fn parse_filter_value(value: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    for raw in value.split(',') {
        let item = raw.trim();
        if item.is_empty() {
            continue;
        }
        if !is_filter_item(item) {
            return Err(format!("invalid group filter item \"{item}\""));
        }
        items.push(item.to_string());
    }
    Ok(items)
}

/// The effective sign for `group` under `filter` then `extras`; `+` if
/// nothing mentions it.
fn effective_sign(group: &str, filter: &[String], extras: &[String]) -> char {
    let mut sign = '+';
    for item in filter.iter().chain(extras.iter()) {
        if let Some(rest) = item.strip_prefix('+') {
            if rest == group {
                sign = '+';
            }
        } else if let Some(rest) = item.strip_prefix('-') {
            if rest == group {
                sign = '-';
            }
        }
    }
    sign
}

/// Whether a project with `groups` is active under `filter` + `extras`.
///
/// Groupless projects are always active; otherwise at least one group
/// must end up enabled.
pub fn is_active(groups: &[String], filter: &[String], extras: &[String]) -> bool {
    if groups.is_empty() {
        return true;
    }
    groups.iter().any(|g| effective_sign(g, filter, extras) == '+')
}

/// Reduces a concatenated filter list to its disabled groups, in first
/// mention order: the form exposed as a resolved manifest's
/// `group_filter`.
pub(crate) fn simplify(concatenated: &[Vec<String>]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut sign: HashMap<String, char> = HashMap::new();
    for filter in concatenated {
        for item in filter {
            let (s, group) = match item.strip_prefix('+') {
                Some(rest) => ('+', rest),
                None => match item.strip_prefix('-') {
                    Some(rest) => ('-', rest),
                    None => continue,
                },
            };
            if !sign.contains_key(group) {
                order.push(group.to_string());
            }
            sign.insert(group.to_string(), s);
        }
    }
    order
        .into_iter()
        .filter(|g| sign.get(g) == Some(&'-'))
        .map(|g| format!("-{g}"))
        .collect()
}
