//! The subscription loop.
//!
//! Pulls batches from a single long-lived subscription, decodes every event
//! against its lazily fetched schema, and logs policy violations with
//! differentiated severity.

use std::collections::HashMap;
use std::sync::Arc;

use apache_avro::Schema;
use colored::Colorize;
use salesforce_pubsub_v1::eventbus::v1::{ConsumerEvent, SchemaRequest};
use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::decode;
use crate::pubsub::{self, fetch_request_stream, FetchTemplate, Replay};

/// Errors that can terminate a subscription run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A Pub/Sub call failed.
    #[error(transparent)]
    PubSub(#[from] pubsub::PubSubError),
    /// The event stream reported an error.
    #[error("Event stream failed: {0}")]
    Stream(Box<tonic::Status>),
    /// An event payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] decode::Error),
}

/// Parameters of one subscription run.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Fully qualified topic name, e.g. `/event/MobileEnforcedPolicyEvent`.
    pub topic: String,
    /// Number of events to request at a time.
    pub batch_size: i32,
    /// Where the subscription resumes.
    pub replay: Replay,
    /// Log every decoded event, not only those with violations.
    pub debug_all: bool,
}

/// Consumes one subscription and logs policy violations.
pub struct Monitor {
    context: pubsub::Client,
    config: SubscriptionConfig,
    /// Schemas already fetched this run, by schema id.
    schemas: HashMap<String, Schema>,
    last_replay_id: Option<Vec<u8>>,
}

impl Monitor {
    /// Creates a monitor over a connected Pub/Sub client.
    pub fn new(context: pubsub::Client, config: SubscriptionConfig) -> Self {
        Self {
            context,
            config,
            schemas: HashMap::new(),
            last_replay_id: None,
        }
    }

    /// Hex form of the most recently observed replay id, for resuming a
    /// custom replay after shutdown.
    pub fn last_replay_id(&self) -> Option<String> {
        self.last_replay_id.as_ref().map(hex::encode)
    }

    /// Runs the subscription until the stream ends or fails.
    ///
    /// The flow-control gate starts with a single permit and gets one back
    /// per drained batch, so exactly one fetch request is outstanding at a
    /// time. Empty batches are keepalives and trigger no new request.
    pub async fn run(&mut self) -> Result<(), Error> {
        let gate = Arc::new(Semaphore::new(1));
        let template = FetchTemplate {
            topic_name: self.config.topic.clone(),
            num_requested: self.config.batch_size,
            replay: self.config.replay.clone(),
        };

        info!("Subscribing to {}", self.config.topic);
        let requests = fetch_request_stream(template, Arc::clone(&gate));
        let response = self.context.subscribe(requests).await?;
        let mut stream = response.into_inner();

        while let Some(batch) = stream.next().await {
            let batch = batch.map_err(|status| Error::Stream(Box::new(status)))?;
            if batch.events.is_empty() {
                info!("The subscription is active");
                continue;
            }

            gate.add_permits(1);
            info!("Number of events received: {}", batch.events.len());
            for event in &batch.events {
                self.process_event(event).await?;
            }
        }

        Ok(())
    }

    /// Decodes one event and logs its policy outcomes.
    async fn process_event(&mut self, event: &ConsumerEvent) -> Result<(), Error> {
        self.last_replay_id = Some(event.replay_id.clone());
        info!("Replay ID: {}", hex::encode(&event.replay_id));

        let Some(producer_event) = event.event.as_ref() else {
            warn!("Batch entry carried no event");
            return Ok(());
        };

        let schema = self.schema_for(&producer_event.schema_id).await?;
        let mut decoded = decode::decode_payload(schema, &producer_event.payload)?;

        let scan = match decode::scan_policy_results(&mut decoded) {
            Ok(scan) => scan,
            Err(source @ decode::Error::ParsePolicyResults { .. }) => {
                error!("Error parsing PolicyResults: {source}");
                None
            }
            Err(source) => return Err(source.into()),
        };

        let has_violations = scan
            .as_ref()
            .is_some_and(|scan| !scan.violations.is_empty());
        if let Some(scan) = &scan {
            for policy in &scan.violations {
                warn!(
                    "{}",
                    format!("*** Policy Violation ***\n{}", pretty(policy)).red()
                );
            }
            if has_violations {
                debug!(
                    "Violated Policies:\n{}",
                    pretty(&JsonValue::Array(scan.violations.clone()))
                );
            }
        }

        if self.config.debug_all || has_violations {
            info!("Received Event:\n{}", pretty(&decoded));
        }

        Ok(())
    }

    /// Fetches and memoizes the Avro schema for `schema_id`.
    async fn schema_for(&mut self, schema_id: &str) -> Result<&Schema, Error> {
        if !self.schemas.contains_key(schema_id) {
            let response = self
                .context
                .get_schema(SchemaRequest {
                    schema_id: schema_id.to_string(),
                })
                .await?;
            let info = response.into_inner();
            let schema = decode::parse_schema(&info.schema_json)?;
            self.schemas.insert(schema_id.to_string(), schema);
        }
        Ok(&self.schemas[schema_id])
    }
}

fn pretty(value: &JsonValue) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
