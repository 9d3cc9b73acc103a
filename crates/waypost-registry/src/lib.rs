//! Waypost Registry
//!
//! Distributed service registry: each process publishes a self-descriptor
//! into a directory shared across the cluster, the directory is cleaned up
//! when members depart, and any process can resolve a live URL for a named
//! service or feature.
//!
//! # Overview
//!
//! - `ServiceInstance` / `ServiceDescriptor`: local runtime state and its
//!   published form
//! - `FeatureProvider`: source of currently-enabled features
//! - `Directory`: `instance_id -> ServiceDescriptor` over a shared map
//! - `SelfRegistration`: publishes and removes the local descriptor
//! - `MembershipReconciler`: purges orphans, republishes after restart/merge
//! - `LoadBalancer`: uniform random pick among candidate URLs
//! - `ServiceRegistry`: the public contract, `ClusterServiceRegistry` the
//!   implementation, `start_registry` the wiring

pub mod balancer;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod features;
pub mod instance;
pub mod publisher;
pub mod reconciler;
pub mod registry;

pub use balancer::LoadBalancer;
pub use descriptor::ServiceDescriptor;
pub use directory::Directory;
pub use error::{RegistryError, RegistryResult};
pub use features::{FeatureFlags, FeatureProvider, NoFeatures};
pub use instance::{NetworkBinding, SelfInstance, ServiceInstance};
pub use publisher::SelfRegistration;
pub use reconciler::{MembershipReconciler, ReconcileOutcome};
pub use registry::{start_registry, ClusterServiceRegistry, ServiceRegistry};
