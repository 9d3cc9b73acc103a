//! TigerStyle constants for Waypost
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Descriptor Limits
// =============================================================================

/// Maximum length of a logical service name in bytes
pub const SERVICE_NAME_LENGTH_BYTES_MAX: usize = 128;

/// Maximum length of a feature name in bytes
pub const FEATURE_NAME_LENGTH_BYTES_MAX: usize = 128;

/// Maximum length of an instance ID in bytes (`service@host:port@externalUrl`)
pub const INSTANCE_ID_LENGTH_BYTES_MAX: usize = 1024;

/// Maximum number of metadata entries on a single descriptor
pub const DESCRIPTOR_METADATA_COUNT_MAX: usize = 256;

/// Service name used when none is configured
pub const SERVICE_NAME_UNKNOWN: &str = "unknown-service";

// =============================================================================
// Directory Metadata Keys
// =============================================================================

/// Metadata key binding a descriptor to the cluster member that published it
pub const METADATA_MEMBER_ID_KEY: &str = "registry.member-id";

/// Metadata key flagging a descriptor published from a container environment
pub const METADATA_CONTAINER_KEY: &str = "registry.container";

// =============================================================================
// Cache Limits
// =============================================================================

/// Default name of the shared directory map
pub const DIRECTORY_NAME_DEFAULT: &str = "service-registry";

/// Maximum length of a cache name in bytes
pub const CACHE_NAME_LENGTH_BYTES_MAX: usize = 256;

/// Maximum per-entry TTL in seconds (30 days)
pub const CACHE_TTL_SECONDS_MAX: u32 = 30 * 24 * 60 * 60;

// =============================================================================
// Cluster Limits
// =============================================================================

/// Maximum length of a cluster member ID in bytes
pub const MEMBER_ID_LENGTH_BYTES_MAX: usize = 128;

/// Default capacity of a member's event channel
pub const CLUSTER_EVENT_CHANNEL_CAPACITY_DEFAULT: usize = 256;

/// Maximum capacity of a member's event channel
pub const CLUSTER_EVENT_CHANNEL_CAPACITY_MAX: usize = 65_536;

/// Maximum number of members in a cluster
pub const CLUSTER_MEMBERS_COUNT_MAX: usize = 1000;

// Compile-time assertions for constant validity
const _: () = {
    assert!(INSTANCE_ID_LENGTH_BYTES_MAX > SERVICE_NAME_LENGTH_BYTES_MAX);
    assert!(CLUSTER_EVENT_CHANNEL_CAPACITY_DEFAULT <= CLUSTER_EVENT_CHANNEL_CAPACITY_MAX);
    assert!(CACHE_TTL_SECONDS_MAX > 0);
};
