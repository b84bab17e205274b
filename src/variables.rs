//! Script variable store
//!
//! The manager publishes connection parameters and the active client id
//! here so that the surrounding interpreter can substitute them.

use std::collections::HashMap;

pub const CLIENT_USER: &str = "%OPTION_CLIENT_USER%";
pub const CLIENT_PASSWORD: &str = "%OPTION_CLIENT_PASSWORD%";
pub const CLIENT_HOST: &str = "%OPTION_CLIENT_HOST%";
pub const CLIENT_SOCKET: &str = "%OPTION_CLIENT_SOCKET%";
pub const CLIENT_SCHEMA: &str = "%OPTION_CLIENT_SCHEMA%";
pub const CLIENT_PORT: &str = "%OPTION_CLIENT_PORT%";
pub const SSL_MODE: &str = "%OPTION_SSL_MODE%";
pub const ACTIVE_CLIENT_ID: &str = "%ACTIVE_CLIENT_ID%";

/// Key-value sink written by the connection manager
pub trait VariableStore {
    fn set(&mut self, key: &str, value: String);
}

/// In-memory variable store
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every known key occurring in `text` with its value.
    ///
    /// Single left-to-right pass over `text`: substituted values are never
    /// scanned again. Where keys overlap at a position the longest wins.
    pub fn substitute(&self, text: &str) -> String {
        let mut keys: Vec<(&str, &str)> = self
            .values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(ch) = rest.chars().next() {
            match keys.iter().find(|(key, _)| rest.starts_with(key)) {
                Some((key, value)) => {
                    result.push_str(value);
                    rest = &rest[key.len()..];
                }
                None => {
                    result.push(ch);
                    rest = &rest[ch.len_utf8()..];
                }
            }
        }
        result
    }
}

impl VariableStore for Variables {
    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }
}
