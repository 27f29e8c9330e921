//! AWS Signature Version 4 connection URL signing for iotdash.
//!
//! The device gateway authenticates a WebSocket upgrade by checking a SigV4
//! signature carried in the query string of the connection URL. This crate
//! builds that URL from short-lived credentials.
//!
//! # Usage
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use iotdash_auth::{Credentials, presign};
//!
//! let credentials = Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
//! let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
//!
//! let url = presign(
//!     "example.amazonaws.com",
//!     "/mqtt",
//!     "us-east-1",
//!     "iotdevicegateway",
//!     &credentials,
//!     now,
//! )
//! .unwrap();
//! assert!(url.as_str().starts_with("wss://example.amazonaws.com/mqtt?X-Amz-Algorithm="));
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical request construction
//! - [`cognito`] - Credentials from a Cognito identity pool
//! - [`credentials`] - Credentials value and the [`CredentialSource`] trait
//! - [`error`] - Signing and credential error types
//! - [`presigned`] - Signed connection URL assembly
//! - [`sigv4`] - Signing key derivation and signature computation

pub mod canonical;
pub mod cognito;
pub mod credentials;
pub mod error;
pub mod presigned;
pub mod sigv4;

pub use cognito::CognitoCredentialSource;
pub use credentials::{CredentialSource, Credentials, StaticCredentialSource};
pub use error::{CredentialError, SigningError};
pub use presigned::{SignedUrl, build_signed_url, presign};
pub use sigv4::{SignatureResult, SigningKeyChain, hash_payload, sign};
