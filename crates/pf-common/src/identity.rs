//! Process-of-interest identity and matching.
//!
//! A [`ProcessIdentity`] names one application the deployment workflow cares
//! about (a close-list entry) or one live process discovered to match such an
//! entry. Identity is the executable base name compared case-insensitively;
//! everything else on the type is descriptive enrichment that never
//! participates in equality or hashing.
//!
//! Values are immutable: enrichment ("we now know the product name", "seen
//! again just now") produces a new value sharing the same identity key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// One process-of-interest, keyed by case-insensitive executable base name.
///
/// Two identities are equal iff their executable names are equal under
/// case-insensitive comparison. Description, product, publisher, icon and
/// observation timestamp are carried for display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessIdentity {
    /// Executable base name, as supplied (original casing preserved).
    executable_name: String,

    /// Friendly description shown to the user (e.g. "Microsoft Word").
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    /// Product name from the executable's version resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    product_name: Option<String>,

    /// Publisher/company name from the executable's version resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    publisher: Option<String>,

    /// Binary to extract a display icon from. Extraction is the UI's job.
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_path: Option<PathBuf>,

    /// When a live process matching this identity was last observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    last_observed_at: Option<DateTime<Utc>>,
}

impl ProcessIdentity {
    /// Create an identity from an executable base name (no extension, no path).
    pub fn new(executable_name: impl Into<String>) -> Self {
        ProcessIdentity {
            executable_name: executable_name.into(),
            description: None,
            product_name: None,
            publisher: None,
            icon_path: None,
            last_observed_at: None,
        }
    }

    /// The executable base name with its original casing.
    pub fn executable_name(&self) -> &str {
        &self.executable_name
    }

    /// Case-folded form of the executable name, usable as a map key.
    pub fn key(&self) -> String {
        self.executable_name.to_lowercase()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn product_name(&self) -> Option<&str> {
        self.product_name.as_deref()
    }

    pub fn publisher(&self) -> Option<&str> {
        self.publisher.as_deref()
    }

    pub fn icon_path(&self) -> Option<&PathBuf> {
        self.icon_path.as_ref()
    }

    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.last_observed_at
    }

    /// Display name: the description when present, otherwise the executable name.
    pub fn display_name(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.executable_name)
    }

    /// Case-insensitive exact match against a live executable base name.
    ///
    /// No wildcard or substring semantics; wildcard expansion, if a caller
    /// wants it, happens before identities are constructed.
    pub fn matches(&self, live_executable_name: &str) -> bool {
        names_match(&self.executable_name, live_executable_name)
    }

    /// New value with a friendly description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// New value with a product name.
    pub fn with_product_name(mut self, product_name: impl Into<String>) -> Self {
        self.product_name = Some(product_name.into());
        self
    }

    /// New value with a publisher name.
    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    /// New value with an icon source path.
    pub fn with_icon_path(mut self, icon_path: impl Into<PathBuf>) -> Self {
        self.icon_path = Some(icon_path.into());
        self
    }

    /// New value recording a live observation at `at`.
    pub fn with_observation(mut self, at: DateTime<Utc>) -> Self {
        self.last_observed_at = Some(at);
        self
    }
}

impl PartialEq for ProcessIdentity {
    fn eq(&self, other: &Self) -> bool {
        names_match(&self.executable_name, &other.executable_name)
    }
}

impl Eq for ProcessIdentity {}

impl Hash for ProcessIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Case-insensitive executable-name comparison (Unicode case folding).
pub fn names_match(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
        return true;
    }
    // Non-ASCII names need the full fold.
    a.to_lowercase() == b.to_lowercase()
}
