//! Local resource state
//!
//! The host's view of managed resources. The orchestrator writes projections of
//! re-read remote state here and clears entries for resources that are gone.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resources indexed by `type:id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalState {
    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub resources: HashMap<String, ResourceState>,
}

impl Default for LocalState {
    fn default() -> Self {
        Self {
            updated_at: Utc::now(),
            resources: HashMap::new(),
        }
    }
}

impl LocalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(resource_type: &str, id: &str) -> String {
        format!("{resource_type}:{id}")
    }

    /// Add or replace a resource
    pub fn set_resource(&mut self, state: ResourceState) {
        let key = Self::key(&state.resource_type, &state.id);
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    pub fn remove_resource(&mut self, resource_type: &str, id: &str) -> Option<ResourceState> {
        let result = self.resources.remove(&Self::key(resource_type, id));
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_resource(&self, resource_type: &str, id: &str) -> Option<&ResourceState> {
        self.resources.get(&Self::key(resource_type, id))
    }

    /// Merge a fresh projection into the existing entry, keeping its creation time
    pub fn apply(&mut self, projected: ResourceState) -> &ResourceState {
        let key = Self::key(&projected.resource_type, &projected.id);
        self.updated_at = Utc::now();
        let entry = self
            .resources
            .entry(key)
            .and_modify(|existing| {
                existing.attributes = projected.attributes.clone();
                existing.updated_at = projected.updated_at;
            })
            .or_insert(projected);
        &*entry
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// State of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Composite resource id
    pub id: String,

    pub resource_type: String,

    /// Observed attributes
    pub attributes: HashMap<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Project an observed value into attributes
    ///
    /// Struct fields become attributes; any other value is stored under `value`.
    pub fn project<T: Serialize>(
        id: impl Into<String>,
        resource_type: impl Into<String>,
        observed: &T,
    ) -> Result<Self> {
        let mut state = Self::new(id, resource_type);
        match serde_json::to_value(observed)? {
            serde_json::Value::Object(fields) => state.attributes.extend(fields),
            other => {
                state.attributes.insert("value".to_string(), other);
            }
        }
        Ok(state)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Switch {
        instance_id: String,
        enabled: bool,
    }

    #[test]
    fn test_project_struct_fields() {
        let observed = Switch {
            instance_id: "vpcfw-1".to_string(),
            enabled: true,
        };
        let state = ResourceState::project("vpcfw-1#sw-2", "vpc_fw_switch", &observed).unwrap();

        assert_eq!(state.get_attribute::<bool>("enabled"), Some(true));
        assert_eq!(
            state.get_attribute::<String>("instance_id").as_deref(),
            Some("vpcfw-1")
        );
    }

    #[test]
    fn test_project_scalar() {
        let state = ResourceState::project("ins-1", "renewal", &42).unwrap();
        assert_eq!(state.get_attribute::<i64>("value"), Some(42));
    }

    #[test]
    fn test_set_and_remove() {
        let mut local = LocalState::new();
        local.set_resource(
            ResourceState::new("ins-1", "instance").with_attribute("ip", json!("10.0.0.1")),
        );
        assert_eq!(local.len(), 1);
        assert!(local.get_resource("instance", "ins-1").is_some());

        assert!(local.remove_resource("instance", "ins-1").is_some());
        assert!(local.remove_resource("instance", "ins-1").is_none());
        assert!(local.is_empty());
    }

    #[test]
    fn test_apply_keeps_created_at() {
        let mut local = LocalState::new();
        let first = ResourceState::new("ins-1", "instance").with_attribute("size", json!(10));
        let created_at = first.created_at;
        local.set_resource(first);

        let second = ResourceState::new("ins-1", "instance").with_attribute("size", json!(20));
        let applied = local.apply(second);

        assert_eq!(applied.created_at, created_at);
        assert_eq!(applied.get_attribute::<i64>("size"), Some(20));
    }

    #[test]
    fn test_state_serializes() {
        let mut local = LocalState::new();
        local.set_resource(ResourceState::new("ins-1", "instance"));
        let json = serde_json::to_string(&local).unwrap();
        let loaded: LocalState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.resources.len(), 1);
    }
}
