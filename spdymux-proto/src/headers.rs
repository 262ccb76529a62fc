//! # Header Multimap
//!
//! Ordered mapping from header name to one or more values.
//!
//! Names are normalized to ASCII lower case on insertion, since SPDY
//! transmits header names in lower case. The first insertion of a name fixes
//! its position; later values for the same name are appended to that entry.

use core::fmt;

/// Ordered header multimap.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    /// Create an empty header map
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `name`, keeping any existing values.
    pub fn add(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = normalize(name.as_ref());
        match self.position(&name) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// Replace every value of `name` with a single value.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = normalize(name.as_ref());
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = vec![value.into()],
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// First value of `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// All values of `name`, in insertion order (empty if absent)
    pub fn get_all(&self, name: &str) -> &[String] {
        let name = normalize(name);
        self.position(&name)
            .map(|idx| self.entries[idx].1.as_slice())
            .unwrap_or(&[])
    }

    /// Check whether `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.position(&normalize(name)).is_some()
    }

    /// Remove `name`, returning its values
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let name = normalize(name);
        self.position(&name).map(|idx| self.entries.remove(idx).1)
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, values)` in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    fn position(&self, normalized: &str) -> Option<usize> {
        self.entries.iter().position(|(name, _)| name == normalized)
    }
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        headers.extend(iter);
        headers
    }
}

impl<K, V> Extend<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.add(name, value);
        }
    }
}
