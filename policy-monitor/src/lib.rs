//! Monitor for Salesforce enforced-policy events.
//!
//! This crate authenticates against Salesforce with the OAuth 2.0 JWT bearer
//! flow, opens a single long-lived Pub/Sub subscription over gRPC, pulls
//! fixed-size batches of events, decodes each event's Avro payload against
//! its lazily fetched schema, and logs policy-violation entries with
//! differentiated severity.
//!
//! # Examples
//!
//! ```no_run
//! use policy_monitor::client;
//! use policy_monitor::monitor::{Monitor, SubscriptionConfig};
//! use policy_monitor::pubsub::{self, Replay};
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
//! let context = pubsub::Client::new(channel, auth)?;
//!
//! let mut monitor = Monitor::new(
//!     context,
//!     SubscriptionConfig {
//!         topic: "/event/MobileEnforcedPolicyEvent".to_string(),
//!         batch_size: 100,
//!         replay: Replay::Latest,
//!         debug_all: false,
//!     },
//! );
//! monitor.run().await?;
//! # Ok(())
//! # }
//! ```

/// Default OAuth login URL for production orgs.
///
/// For sandbox orgs, use `https://test.salesforce.com`.
pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";

/// Default number of events requested per fetch.
pub const DEFAULT_BATCH_SIZE: i32 = 100;

/// Default connection timeout for OAuth2 authentication requests (15 seconds).
pub const DEFAULT_AUTH_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default request timeout for OAuth2 authentication requests (30 seconds).
pub const DEFAULT_AUTH_REQUEST_TIMEOUT_SECS: u64 = 30;

/// OAuth2 JWT bearer authentication and token management.
pub mod client;

/// Startup configuration, CLI flags and interactive prompts.
pub mod config;

/// Avro payload decoding and policy-result inspection.
pub mod decode;

/// The subscription loop.
pub mod monitor;

/// Salesforce Pub/Sub API access.
pub mod pubsub;
