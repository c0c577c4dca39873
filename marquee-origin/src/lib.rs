//! Marquee Origin - Catalog HTTP Client
//!
//! [`HttpOriginClient`] implements [`marquee_core::OriginClient`] over
//! reqwest, with request pacing derived from the configured
//! requests-per-minute and error mapping onto `OriginError`.

pub mod client;
pub mod types;

pub use client::{CredentialStyle, HttpOriginClient};
pub use types::StatusBody;
