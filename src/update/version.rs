//! Application identity lines and version ordering.
//!
//! `GET /version` answers with a *version document*: one `name\tversion` line per
//! component joined with `\r\n`, the hosting application first. Only the first line takes
//! part in update decisions.

use crate::config::ConfigReader;
use crate::constants::keys;
use std::cmp::Ordering;
use std::fmt;

/// Name of this library in version documents.
pub const LIBRARY_NAME: &str = env!("CARGO_PKG_NAME");

/// Version of this library in version documents.
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `name` + `version` pair as exchanged on `/version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionIdentity {
    pub app_name: String,
    pub version: String,
}

impl VersionIdentity {
    pub fn new(app_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            version: version.into(),
        }
    }

    /// Identity of the hosting application (`AppName`, `Version`).
    pub fn from_config(config: &dyn ConfigReader) -> Self {
        Self::new(config.get_or_empty(keys::APP_NAME), config.get_or_empty(keys::VERSION))
    }

    /// Parse the first line of a version document.
    ///
    /// Returns `None` for an empty document or a line without a tab.
    pub fn parse_document(document: &str) -> Option<Self> {
        let first = document.lines().next()?.trim_end_matches('\r');
        let (name, version) = first.split_once('\t')?;
        Some(Self::new(name.trim(), version.trim()))
    }
}

impl fmt::Display for VersionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.app_name, self.version)
    }
}

/// Render the version document served on `/version`.
pub fn version_document(app: &VersionIdentity) -> String {
    let library = VersionIdentity::new(LIBRARY_NAME, LIBRARY_VERSION);
    format!("{app}\r\n{library}\r\n")
}

/// Compare two dotted version strings.
///
/// `None` sorts before any value and two `None`s are equal. Segments are split on `.`; a
/// missing segment counts as empty. All segments but the last compare as plain strings.
/// The last segment pair is trimmed and left-padded with `0` to a common width first, so
/// `"1.9" < "1.10"` and `"1.2" == "1.2.0"`. Leading segments are *not* padded: `"9.0"`
/// sorts after `"10.0"`.
pub fn compare_versions(left: Option<&str>, right: Option<&str>) -> Ordering {
    let (left, right) = match (left, right) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(l), Some(r)) => (l, r),
    };

    let left: Vec<&str> = left.split('.').collect();
    let right: Vec<&str> = right.split('.').collect();
    let count = left.len().max(right.len());

    for index in 0..count {
        let l = left.get(index).copied().unwrap_or("");
        let r = right.get(index).copied().unwrap_or("");

        let ordering = if index + 1 == count {
            compare_right_aligned(l, r)
        } else {
            l.cmp(r)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn compare_right_aligned(left: &str, right: &str) -> Ordering {
    let (left, right) = (left.trim(), right.trim());
    let width = left.len().max(right.len());
    format!("{left:0>width$}").cmp(&format!("{right:0>width$}"))
}
