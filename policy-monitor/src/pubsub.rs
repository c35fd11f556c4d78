//! Salesforce Pub/Sub API access for the monitor.
//!
//! This module wraps the generated gRPC client with the authentication
//! metadata Salesforce expects and provides the flow-controlled fetch
//! request stream used by the subscription loop.
//!
//! # Example
//!
//! ```no_run
//! use policy_monitor::client;
//! use policy_monitor::pubsub;
//! use std::path::PathBuf;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let auth = client::Builder::new()
//!     .credentials_path(PathBuf::from("credentials.json"))
//!     .build()?
//!     .connect()
//!     .await?;
//!
//! let channel = pubsub::connect(pubsub::ENDPOINT).await?;
//! let mut pubsub_client = pubsub::Client::new(channel, auth)?;
//! # Ok(())
//! # }
//! ```

mod client;
mod flow;

pub use client::Client;
pub use client::Error as PubSubError;
pub use flow::{fetch_request_stream, FetchTemplate, Replay};

/// Re-export commonly used types from the generated gRPC client.
pub use salesforce_pubsub_v1::eventbus::{self, v1::*};

/// Constant for the Pub/Sub API endpoint.
pub use salesforce_pubsub_v1::eventbus::ENDPOINT;

/// Opens a TLS channel to a Pub/Sub endpoint using the platform trust roots.
pub async fn connect(
    endpoint: &'static str,
) -> Result<tonic::transport::Channel, tonic::transport::Error> {
    tonic::transport::Channel::from_static(endpoint)
        .tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())?
        .connect()
        .await
}
