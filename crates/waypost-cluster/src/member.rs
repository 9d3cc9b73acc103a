//! Member identification
//!
//! TigerStyle: Validated identifiers with explicit limits.

use std::fmt;

use serde::{Deserialize, Serialize};
use waypost_core::constants::MEMBER_ID_LENGTH_BYTES_MAX;
use waypost_core::io::RngProvider;

use crate::error::{ClusterError, ClusterResult};

/// Identity of one cluster member
///
/// Stable for the lifetime of the member, including across a restart.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberId(String);

impl MemberId {
    /// Create a new MemberId with validation
    ///
    /// # Errors
    /// Returns error if id is empty, too long, or contains characters other
    /// than alphanumerics, dashes, underscores and dots.
    pub fn new(id: impl Into<String>) -> ClusterResult<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(ClusterError::InvalidMemberId {
                id,
                reason: "member ID cannot be empty".into(),
            });
        }

        if id.len() > MEMBER_ID_LENGTH_BYTES_MAX {
            return Err(ClusterError::InvalidMemberId {
                reason: format!(
                    "member ID length {} exceeds limit {}",
                    id.len(),
                    MEMBER_ID_LENGTH_BYTES_MAX
                ),
                id,
            });
        }

        let valid = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            return Err(ClusterError::InvalidMemberId {
                id,
                reason: "member ID contains invalid characters".into(),
            });
        }

        Ok(Self(id))
    }

    /// Generate a random member id
    pub fn generate(rng: &dyn RngProvider) -> Self {
        let id = format!("member-{}", rng.gen_uuid());
        debug_assert!(id.len() <= MEMBER_ID_LENGTH_BYTES_MAX);
        Self(id)
    }

    /// Get the member ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MemberId {
    type Error = ClusterError;

    fn try_from(value: String) -> ClusterResult<Self> {
        Self::new(value)
    }
}

impl From<MemberId> for String {
    fn from(id: MemberId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::StdRngProvider;

    #[test]
    fn test_member_id_valid() {
        let id = MemberId::new("node-1.zone_a").unwrap();
        assert_eq!(id.as_str(), "node-1.zone_a");
        assert_eq!(id.to_string(), "node-1.zone_a");
    }

    #[test]
    fn test_member_id_empty() {
        assert!(matches!(
            MemberId::new(""),
            Err(ClusterError::InvalidMemberId { .. })
        ));
    }

    #[test]
    fn test_member_id_too_long() {
        let long = "m".repeat(MEMBER_ID_LENGTH_BYTES_MAX + 1);
        assert!(MemberId::new(long).is_err());
    }

    #[test]
    fn test_member_id_invalid_chars() {
        assert!(MemberId::new("node 1").is_err());
        assert!(MemberId::new("node/1").is_err());
    }

    #[test]
    fn test_generate_is_valid_and_deterministic() {
        let a = MemberId::generate(&StdRngProvider::with_seed(7));
        let b = MemberId::generate(&StdRngProvider::with_seed(7));
        assert_eq!(a, b);
        assert!(MemberId::new(a.as_str()).is_ok());
        assert_eq!(a.as_str().len(), "member-".len() + 36);

        let c = MemberId::generate(&StdRngProvider::with_seed(8));
        assert_ne!(a, c);
    }
}
