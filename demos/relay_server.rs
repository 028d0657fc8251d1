//! Serves `/device-code-relay` and `/token-relay` so a browser page can reach providers that
//! do not allow cross-origin requests.
//!
//! Set `RELAY_ADDR` to change the listen address (default `127.0.0.1:8787`).

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use tokio::net::TcpListener;
// self
use schlussel_playground::{config::RelayConfig, relay::{self, ReqwestRelayGateway}};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let addr = std::env::var("RELAY_ADDR").unwrap_or_else(|_| "127.0.0.1:8787".into());
	let gateway = ReqwestRelayGateway::new(RelayConfig::default())?;
	let listener = TcpListener::bind(&addr).await?;

	println!("Relay listening on http://{}.", listener.local_addr()?);

	relay::serve(listener, Arc::new(gateway)).await?;

	Ok(())
}
