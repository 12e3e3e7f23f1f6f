//! Device alias resolution
//!
//! Aliases map to wildcard path expressions of the form
//! `<pattern>[@<baud>]`. Resolution matches the pattern against
//! discovered endpoint paths and yields zero or more `DeviceInfo`
//! entries, ordered by alias then path.

use crate::device::DeviceInfo;

/// Baud applied when an alias omits the `@<baud>` suffix
pub const DEFAULT_BAUD: u32 = 250_000;

/// One configured alias entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// Logical name of the connection.
    pub name: String,
    /// Wildcard path pattern (`*` and `?` supported).
    pub pattern: String,
    /// Baud rate parsed from the `@<baud>` suffix, or the default.
    pub baud: u32,
}

impl Alias {
    /// Parse an alias expression `<pattern>[@<baud>]`
    pub fn parse(name: impl Into<String>, expression: &str) -> Self {
        let (pattern, baud) = match expression.rsplit_once('@') {
            Some((path, baud_str)) => match baud_str.parse::<u32>() {
                Ok(baud) => (path.to_string(), baud),
                // A '@' that is not followed by a number belongs to the path.
                Err(_) => (expression.to_string(), DEFAULT_BAUD),
            },
            None => (expression.to_string(), DEFAULT_BAUD),
        };
        Self {
            name: name.into(),
            pattern,
            baud,
        }
    }

    /// Check whether a discovered path matches this alias
    pub fn matches(&self, path: &str) -> bool {
        wildcard_match(&self.pattern, path)
    }
}

/// Match `pattern` against `text` with `*` (any run) and `?` (any one byte)
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // Iterative backtracking over the last '*' seen.
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Resolve aliases against discovered endpoint paths
///
/// Returns matches ordered by alias, then by path. An alias matching
/// several paths yields one entry per path.
pub fn resolve(aliases: &[Alias], paths: &[String]) -> Vec<DeviceInfo> {
    let mut sorted: Vec<&String> = paths.iter().collect();
    sorted.sort();

    let mut infos = Vec::new();
    for alias in aliases {
        for path in &sorted {
            if alias.matches(path) {
                infos.push(DeviceInfo::new(&alias.name, path.as_str(), alias.baud));
            }
        }
    }
    infos
}
