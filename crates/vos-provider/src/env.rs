//! Per-call environment injection (§3, §4.3, §9 "Shell state as context").

use std::collections::HashMap;

/// A mapping from variable name to string, attached to an execution
/// context when invoking a provider's `Exec`.
///
/// Providers read these through [`Environment::get`]; writes performed
/// inside `Exec` are local to the call and never leak back to the caller's
/// copy (§3: "writes to the map inside `Exec` must not leak out").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn pwd(&self) -> &str {
        self.get("PWD").unwrap_or("/")
    }

    #[must_use]
    pub fn home(&self) -> &str {
        self.get("HOME").unwrap_or("/")
    }

    #[must_use]
    pub fn user(&self) -> &str {
        self.get("USER").unwrap_or("")
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.get("PATH").unwrap_or("")
    }

    /// Iterate over all variables, for `env`-style listing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
