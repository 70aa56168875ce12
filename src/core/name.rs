//! Entity naming: singular/plural pairs and how two names are compared
//!
//! A name ending in `s` is taken as the plural and the singular drops that
//! `s` (`tarifas` -> `tarifa`). A name without it keeps the same text for
//! both forms.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy used when comparing two entity names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompareNames {
    /// Plural forms match, or failing that, singular forms match
    #[default]
    Optimistic,
    /// Both singular and plural forms must match
    Pessimistic,
}

/// Singular and plural forms identifying an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityName {
    pub singular: String,
    pub plural: String,
}

impl EntityName {
    pub fn new(singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            singular: singular.into(),
            plural: plural.into(),
        }
    }

    /// Derive both forms from a single name
    ///
    /// # Examples
    ///
    /// ```
    /// use entity_query::core::name::EntityName;
    ///
    /// assert_eq!(EntityName::resolve("users"), EntityName::new("user", "users"));
    /// assert_eq!(EntityName::resolve("user"), EntityName::new("user", "user"));
    /// assert_eq!(EntityName::resolve("pais"), EntityName::new("pai", "pais"));
    /// ```
    pub fn resolve(name: &str) -> Self {
        match name.strip_suffix('s') {
            Some(singular) => Self::new(singular, name),
            None => Self::new(name, name),
        }
    }

    /// Take a name as written, using it for both forms
    ///
    /// Used for foreign-key descriptors, which may name a singular ending in `s`.
    pub fn literal(name: &str) -> Self {
        Self::new(name, name)
    }

    /// Apply the same text transformation to both forms
    pub fn map(&self, f: impl Fn(&str) -> String) -> Self {
        Self::new(f(&self.singular), f(&self.plural))
    }

    /// Compare against another name using the given policy
    pub fn equals(&self, other: &EntityName, compare: CompareNames) -> bool {
        if self.plural.is_empty() || other.plural.is_empty() {
            return false;
        }
        match compare {
            CompareNames::Optimistic => {
                self.plural == other.plural || self.singular == other.singular
            }
            CompareNames::Pessimistic => {
                self.plural == other.plural && self.singular == other.singular
            }
        }
    }

    /// Compare against a bare string, taken literally
    pub fn matches(&self, other: &str, compare: CompareNames) -> bool {
        self.equals(&EntityName::literal(other), compare)
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.plural)
    }
}

/// Entity name as written in a schema: a bare string or both forms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameSpec {
    Plain(String),
    Pair(EntityName),
}

impl NameSpec {
    pub fn resolve(&self) -> EntityName {
        match self {
            NameSpec::Plain(name) => EntityName::resolve(name),
            NameSpec::Pair(name) => name.clone(),
        }
    }
}

impl Default for NameSpec {
    fn default() -> Self {
        NameSpec::Plain(String::new())
    }
}

impl From<&str> for NameSpec {
    fn from(name: &str) -> Self {
        NameSpec::Plain(name.to_string())
    }
}

impl From<EntityName> for NameSpec {
    fn from(name: EntityName) -> Self {
        NameSpec::Pair(name)
    }
}
