use serde::{Deserialize, Serialize};

/// A selectable import template. `name` is the key used to match across pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFormat {
    pub name: String,
    pub href: String,
}

impl ImportFormat {
    /// A format known only by name, e.g. when its schema was supplied pre-fetched.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: String::new(),
        }
    }
}

/// The administration area reached after login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminPage {
    pub url: String,
}
