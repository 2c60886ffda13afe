//! Identity-provider descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering the token
//! endpoint, enabled grants (on-behalf-of and client credentials), client authentication
//! preference, and provider quirks. `strategy` defines [`ProviderStrategy`], the hook used to
//! decorate token requests and classify token-endpoint failures.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
