//! Core types and configuration for iotdash.
//!
//! This crate holds the pieces shared by every other iotdash crate: the
//! environment-driven [`DashboardConfig`], the core error type, and small
//! newtypes such as [`AwsRegion`] and [`ClientId`].

mod config;
mod error;
mod types;

pub use config::{DEFAULT_TOPICS, DashboardConfig};
pub use error::{DashboardError, DashboardResult};
pub use types::{AwsRegion, ClientId};
