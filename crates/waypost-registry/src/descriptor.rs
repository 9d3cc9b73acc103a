//! Published service descriptor
//!
//! The unit stored in the directory and returned to callers. Serialized as
//! a flat record: strings, a string list and a string map.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use waypost_cache::CacheValue;
use waypost_core::constants::{
    DESCRIPTOR_METADATA_COUNT_MAX, INSTANCE_ID_LENGTH_BYTES_MAX, METADATA_MEMBER_ID_KEY,
    SERVICE_NAME_LENGTH_BYTES_MAX,
};

use crate::error::{RegistryError, RegistryResult};

/// One running service instance, as seen by the rest of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    /// Logical service identity
    pub service_name: String,
    /// Directory key, `service@host:port[@externalUrl]`
    pub instance_id: String,
    /// Cluster-internal address
    pub internal_base_url: String,
    /// Address reachable from outside the cluster
    #[serde(default)]
    pub external_base_url: Option<String>,
    /// Advertised features
    #[serde(default)]
    pub features: BTreeSet<String>,
    /// Auxiliary attributes, including the owning member tag
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    /// Check field invariants before publishing
    pub fn validate(&self) -> RegistryResult<()> {
        if self.instance_id.is_empty() {
            return Err(RegistryError::invalid_descriptor(
                &self.instance_id,
                "instance id cannot be empty",
            ));
        }
        if self.instance_id.len() > INSTANCE_ID_LENGTH_BYTES_MAX {
            return Err(RegistryError::invalid_descriptor(
                self.instance_id.chars().take(32).collect::<String>(),
                format!(
                    "instance id length {} exceeds limit {}",
                    self.instance_id.len(),
                    INSTANCE_ID_LENGTH_BYTES_MAX
                ),
            ));
        }
        if self.service_name.trim().is_empty() {
            return Err(RegistryError::invalid_descriptor(
                &self.instance_id,
                "service name cannot be empty",
            ));
        }
        if self.service_name.len() > SERVICE_NAME_LENGTH_BYTES_MAX {
            return Err(RegistryError::invalid_descriptor(
                &self.instance_id,
                format!(
                    "service name length {} exceeds limit {}",
                    self.service_name.len(),
                    SERVICE_NAME_LENGTH_BYTES_MAX
                ),
            ));
        }
        if self.metadata.len() > DESCRIPTOR_METADATA_COUNT_MAX {
            return Err(RegistryError::invalid_descriptor(
                &self.instance_id,
                format!(
                    "metadata count {} exceeds limit {}",
                    self.metadata.len(),
                    DESCRIPTOR_METADATA_COUNT_MAX
                ),
            ));
        }
        Ok(())
    }

    /// Member that published this entry
    pub fn owner(&self) -> Option<&str> {
        self.metadata.get(METADATA_MEMBER_ID_KEY).map(String::as_str)
    }

    /// Tag the entry with its owning member
    pub fn stamp_owner(&mut self, member_id: &str) {
        self.metadata
            .insert(METADATA_MEMBER_ID_KEY.to_string(), member_id.to_string());
    }

    /// Copy with `features` replaced
    pub fn with_features(mut self, features: BTreeSet<String>) -> Self {
        self.features = features;
        self
    }

    pub(crate) fn to_value(&self) -> RegistryResult<CacheValue> {
        Ok(CacheValue::encode(self)?)
    }

    pub(crate) fn from_value(value: CacheValue) -> RegistryResult<Self> {
        Ok(value.decode()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            service_name: "billing".into(),
            instance_id: "billing@10.0.0.5:8080".into(),
            internal_base_url: "http://10.0.0.5:8080".into(),
            external_base_url: None,
            features: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_valid_descriptor() {
        assert!(descriptor().validate().is_ok());
    }

    #[test]
    fn test_empty_service_name_rejected() {
        let mut d = descriptor();
        d.service_name = " ".into();
        assert!(matches!(
            d.validate(),
            Err(RegistryError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_oversized_instance_id_rejected() {
        let mut d = descriptor();
        d.instance_id = "x".repeat(INSTANCE_ID_LENGTH_BYTES_MAX + 1);
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_owner_tag() {
        let mut d = descriptor();
        assert_eq!(d.owner(), None);
        d.stamp_owner("m1");
        assert_eq!(d.owner(), Some("m1"));
    }

    #[test]
    fn test_wire_shape() {
        let mut d = descriptor();
        d.features.insert("export".into());
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["serviceName"], "billing");
        assert_eq!(json["features"], serde_json::json!(["export"]));
        assert!(json["externalBaseUrl"].is_null());

        let back = ServiceDescriptor::from_value(d.to_value().unwrap()).unwrap();
        assert_eq!(back, d);
    }
}
