//! Last-fetch-wins cache for remote listings.
//!
//! Writers replace a key's value wholesale; there is no expiry and no
//! partial update. Readers see an empty list for a key never written.

use std::{
  collections::HashMap,
  sync::{PoisonError, RwLock},
};

use serde_json::Value;

pub const SITES_KEY: &str = "nation_builder:sites";
pub const SITES_EVENTS_KEY: &str = "nation_builder:sites_events";
pub const RECRUITERS_KEY: &str = "nation_builder:recruiters";

pub trait Cache: Send + Sync {
  fn read(&self, key: &str) -> Option<Value>;

  fn write(&self, key: &str, value: Value);

  /// The cached list under `key`, or an empty list.
  fn read_list(&self, key: &str) -> Vec<Value> {
    match self.read(key) {
      Some(Value::Array(items)) => items,
      _ => Vec::new(),
    }
  }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
  entries: RwLock<HashMap<String, Value>>,
}

impl MemoryCache {
  pub fn new() -> Self { Self::default() }
}

impl Cache for MemoryCache {
  fn read(&self, key: &str) -> Option<Value> {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    entries.get(key).cloned()
  }

  fn write(&self, key: &str, value: Value) {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    entries.insert(key.to_string(), value);
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn absent_list_is_empty() {
    let cache = MemoryCache::new();
    assert!(cache.read(SITES_KEY).is_none());
    assert!(cache.read_list(SITES_KEY).is_empty());
  }

  #[test]
  fn writes_replace() {
    let cache = MemoryCache::new();
    cache.write(RECRUITERS_KEY, json!([["Smith", 1], ["Jones", 2]]));
    cache.write(RECRUITERS_KEY, json!([["Brown", 3]]));
    assert_eq!(cache.read_list(RECRUITERS_KEY), vec![json!(["Brown", 3])]);
  }
}
