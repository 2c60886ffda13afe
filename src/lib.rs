//! Delegated-access gateway: exchange a caller's bearer token on-behalf-of the downstream API,
//! cache the result behind single-flight guards, validate resource locators before they leave
//! the process, and answer every failure with one problem+json envelope.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod correlation;
pub mod error;
pub mod exchange;
pub mod flows;
pub mod handler;
pub mod http;
pub mod id;
pub mod locator;
pub mod oauth;
pub mod obs;
pub mod problem;
pub mod provider;
pub mod server;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use axum;
pub use reqwest;
pub use url;
#[cfg(test)] use {http_body_util as _, httpmock as _, tower as _};
