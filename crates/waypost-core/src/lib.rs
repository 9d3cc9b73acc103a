//! Waypost Core
//!
//! Core types, errors, and constants for the Waypost service registry.
//!
//! # Overview
//!
//! Waypost lets independent service processes publish a self-descriptor into
//! a directory shared across a cluster, keeps that directory correct while
//! membership churns, and resolves live addresses for named services or
//! named features.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `SERVICE_NAME_LENGTH_BYTES_MAX`)
//! - Errors are returned, never panics

pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod telemetry;

pub use config::{
    CacheConfig, ClusterConfig, FeatureConfig, InstanceConfig, RegistryConfig, RegistryStrategy,
    WaypostConfig,
};
pub use constants::*;
pub use error::{Error, Result};
pub use io::{IoContext, RngProvider, StdRngProvider, TimeProvider, WallClockTime};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
