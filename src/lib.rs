//! Keep a short-lived OAuth 2.0 access token fresh for any number of concurrent callers.
//!
//! The [`coordinator::Coordinator`] evaluates expiry against a shared
//! [`store::CredentialStore`], serializes refreshes behind an in-process guard plus a
//! [`lock::RefreshLock`], spends the refresh token through a [`transport::RefreshTransport`],
//! and lets callers that lose the race poll for the winner's result within a bounded budget.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
#[cfg(feature = "reqwest")] pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod lock;
pub mod obs;
pub mod store;
pub mod transport;

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::{Mutex as AsyncMutex, MutexGuardArc};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};

	/// Converts a signed [`Duration`] into the std flavor used by tokio timers; negative spans
	/// collapse to zero.
	pub fn std_duration(duration: Duration) -> std::time::Duration {
		std::time::Duration::try_from(duration).unwrap_or_default()
	}
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
