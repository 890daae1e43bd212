//! Case-insensitive multi-value header map.
//!
//! Stores entries in insertion order with their original casing; all lookup
//! and removal compares names case-insensitively. This is the concrete form
//! of the header view a host adapter supplies for each exchange side.

/// Mutable header multi-map for one HTTP message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    entries: Vec<(String, String)>,
}

impl MessageHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a header map from raw pairs, filtering entries with an empty
    /// name. Hosts use this to adapt their native header container.
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .filter(|(name, _)| !name.trim().is_empty())
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(entry, _)| entry.eq_ignore_ascii_case(name))
    }

    /// First value for the name, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(entry, _)| entry.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All values for the name, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(entry, _)| entry.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Replaces every value for the name with a single entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries
            .retain(|(entry, _)| !entry.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// Appends a value without touching existing entries for the name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Removes all entries for the name; returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(entry, _)| !entry.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// Renames every entry matching `from` to `to`, keeping values and
    /// positions. Returns how many entries were renamed.
    pub fn rename(&mut self, from: &str, to: &str) -> usize {
        let mut renamed = 0;
        for (name, _) in self.entries.iter_mut() {
            if name.eq_ignore_ascii_case(from) {
                *name = to.to_string();
                renamed += 1;
            }
        }
        renamed
    }

    /// Sets the value only when the name is not already present.
    pub fn set_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, value.into()));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<'a> IntoIterator for &'a MessageHeaders {
    type Item = (&'a str, &'a str);
    type IntoIter = std::vec::IntoIter<(&'a str, &'a str)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}
