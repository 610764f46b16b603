//! Database namespace convention
//!
//! Every database this crate manages lives under the `"webmarket."` prefix so it can
//! share an engine instance with unrelated databases. The transformation must stay
//! bit-exact with other webmarket clients reading the same browser profile: strip one
//! leading prefix if the caller already supplied it, then prepend the prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix prepended to every managed database name.
pub const NAMESPACE_PREFIX: &str = "webmarket.";

/// Database name used when the caller does not supply one.
pub const DEFAULT_DATABASE: &str = "webmarket";

/// Engine-facing name for a user-supplied database name.
///
/// ```rust
/// use webmarket_core::namespaced;
///
/// assert_eq!(namespaced("orders"), "webmarket.orders");
/// assert_eq!(namespaced("webmarket.orders"), "webmarket.orders");
/// ```
pub fn namespaced(name: &str) -> String {
    format!("{}{}", NAMESPACE_PREFIX, strip_prefix(name))
}

fn strip_prefix(name: &str) -> &str {
    name.strip_prefix(NAMESPACE_PREFIX).unwrap_or(name)
}

/// A database name as the caller sees it (prefix stripped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DatabaseName(String);

impl DatabaseName {
    /// Normalize a user-supplied name. A leading namespace prefix is dropped so that
    /// `"orders"` and `"webmarket.orders"` address the same database.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(strip_prefix(name.as_ref()).to_string())
    }

    /// Recover the caller-facing name from an engine-facing one.
    /// Returns `None` for databases outside the namespace.
    pub fn from_qualified(raw: &str) -> Option<Self> {
        raw.strip_prefix(NAMESPACE_PREFIX)
            .map(|name| Self(name.to_string()))
    }

    /// The name without prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name handed to the engine.
    pub fn qualified(&self) -> String {
        format!("{}{}", NAMESPACE_PREFIX, self.0)
    }
}

impl Default for DatabaseName {
    fn default() -> Self {
        Self(DEFAULT_DATABASE.to_string())
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DatabaseName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for DatabaseName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<DatabaseName> for String {
    fn from(name: DatabaseName) -> Self {
        name.0
    }
}
