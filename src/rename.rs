use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Total mapping over `/`-delimited qualified names.
///
/// Implementations must be referentially transparent: the same input always
/// yields the same output, and names outside the mapping's domain come back
/// unchanged.
pub trait NameMapper {
    fn map_name<'a>(&self, name: &'a str) -> Cow<'a, str>;
}

impl<F> NameMapper for F
where
    F: Fn(&str) -> String,
{
    fn map_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        let mapped = self(name);
        if mapped == name {
            Cow::Borrowed(name)
        } else {
            Cow::Owned(mapped)
        }
    }
}

/// The identity mapping.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl NameMapper for Identity {
    fn map_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(name)
    }
}

/// Prefix-based rename rule.
///
/// With a marker, only names whose simple name starts with the marker are
/// renamed, and the marker is removed: `org/x/java/util/TList` with
/// `from = "org/x/java/"`, `to = "java/"`, `marker = 'T'` becomes
/// `java/util/List`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PrefixRule {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub marker: Option<char>,
}

impl PrefixRule {
    fn apply(&self, name: &str) -> Option<String> {
        let rest = name.strip_prefix(self.from.as_str())?;
        let Some(marker) = self.marker else {
            return Some(format!("{}{}", self.to, rest));
        };
        let (path, simple) = match rest.rfind('/') {
            Some(index) => rest.split_at(index + 1),
            None => ("", rest),
        };
        let simple = simple.strip_prefix(marker)?;
        if simple.is_empty() {
            return None;
        }
        Some(format!("{}{}{}", self.to, path, simple))
    }
}

/// Rename function built once from the configuration and shared read-only.
#[derive(Clone, Debug, Default)]
pub struct Renamer {
    names: BTreeMap<String, String>,
    prefixes: Vec<PrefixRule>,
}

impl Renamer {
    pub fn new(names: BTreeMap<String, String>, prefixes: Vec<PrefixRule>) -> Result<Self, ConfigError> {
        let renamer = Renamer { names, prefixes };
        renamer.check_acyclic()?;
        Ok(renamer)
    }

    pub fn is_identity(&self) -> bool {
        self.names.is_empty() && self.prefixes.is_empty()
    }

    // An output that would be renamed again breaks rename(rename(n)) == rename(n).
    fn check_acyclic(&self) -> Result<(), ConfigError> {
        for (from, to) in &self.names {
            if self.map_name(to) != to.as_str() {
                return Err(ConfigError::RenameCycle {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
        for rule in &self.prefixes {
            if let Some(key) = self.names.keys().find(|key| key.starts_with(rule.to.as_str())) {
                return Err(ConfigError::RenameCycle {
                    from: rule.from.clone(),
                    to: key.clone(),
                });
            }
            for other in &self.prefixes {
                if rule.to.starts_with(other.from.as_str()) || other.from.starts_with(rule.to.as_str())
                {
                    return Err(ConfigError::RenameCycle {
                        from: rule.from.clone(),
                        to: rule.to.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl NameMapper for Renamer {
    fn map_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if let Some(mapped) = self.names.get(name) {
            return Cow::Owned(mapped.clone());
        }
        for rule in &self.prefixes {
            if let Some(mapped) = rule.apply(name) {
                return Cow::Owned(mapped);
            }
        }
        Cow::Borrowed(name)
    }
}

/// Package path of a qualified name, or `None` for the unnamed package.
pub fn package_of(name: &str) -> Option<&str> {
    name.rfind('/').map(|index| &name[..index])
}
