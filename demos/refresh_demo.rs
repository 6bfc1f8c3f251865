//! Serves a market-data request with credentials shared through files.
//!
//! 1. Export `STEWARD_CLIENT_ID`, `STEWARD_CLIENT_SECRET`, `STEWARD_TOKEN_URL` and
//!    `STEWARD_API_BASE_URL`.
//! 2. Seed `STEWARD_CREDENTIAL_FILE` (default `credential.json`) with a credential set obtained
//!    out of band.
//! 3. Run several copies of this demo at once; only one of them spends the refresh token.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
// self
use token_steward::{
	client::AuthorizedClient,
	config::CoordinatorConfig,
	coordinator::Coordinator,
	lock::FileLock,
	reqwest::Client as ReqwestClient,
	store::FileStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = CoordinatorConfig::from_env("STEWARD")?;
	let path = env::var("STEWARD_CREDENTIAL_FILE").unwrap_or_else(|_| "credential.json".into());
	let store = FileStore::open(&path)?;
	let lock = FileLock::new(format!("{path}.lock"));
	let http = ReqwestClient::new();
	let coordinator =
		Arc::new(Coordinator::from_config(&config, Arc::new(store), Arc::new(lock), http.clone()));
	let resolved = coordinator.resolve(coordinator.request()).await?;

	println!(
		"Token {} served from {:?}, expires at {:?}.",
		resolved.credential.access_token.fingerprint(),
		resolved.source,
		resolved.credential.expires_at,
	);

	let client = AuthorizedClient::from_config(coordinator, http, &config)?;
	let quotes = client.get("quotes", &[("symbols", "AAPL,MSFT")]).await?;

	println!("{quotes:#}");

	Ok(())
}
