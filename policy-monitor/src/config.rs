//! Startup configuration: CLI flags with interactive completion.
//!
//! Every subscription parameter can be given as a flag; anything missing is
//! collected interactively at startup, the passphrase with hidden input.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dialoguer::{Input, Password, Select};

use crate::client::Credentials;
use crate::monitor::SubscriptionConfig;
use crate::pubsub::Replay;
use crate::{DEFAULT_BATCH_SIZE, DEFAULT_LOGIN_URL};

/// Errors that can occur while resolving the startup configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An interactive prompt failed.
    #[error("Prompt failed: {source}")]
    Prompt {
        #[source]
        source: dialoguer::Error,
    },
    /// The replay id is not valid hex.
    #[error("Invalid replay id (expected hex): {source}")]
    InvalidReplayId {
        #[source]
        source: hex::FromHexError,
    },
    /// The batch size must be positive.
    #[error("Batch size must be positive")]
    InvalidBatchSize,
}

/// Monitors a Salesforce Pub/Sub topic for enforced-policy violation events.
///
/// Values not supplied as flags are collected interactively at startup.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// JSON credentials file (prompts for credentials when omitted)
    #[arg(long, value_name = "FILE")]
    pub credentials: Option<PathBuf>,
    /// Subscription topic, e.g. /event/MobileEnforcedPolicyEvent
    #[arg(long)]
    pub topic: Option<String>,
    /// Number of events to retrieve at a time
    #[arg(long)]
    pub batch_size: Option<i32>,
    /// Where the subscription resumes
    #[arg(long, value_enum)]
    pub replay: Option<ReplayArg>,
    /// Replay id in hex, for --replay custom
    #[arg(long)]
    pub replay_id: Option<String>,
    /// Log every decoded event, not only policy violations
    #[arg(long)]
    pub debug_all: bool,
}

/// Replay preset choices on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplayArg {
    Latest,
    Earliest,
    Custom,
}

impl Args {
    /// Completes the subscription settings, prompting for anything missing.
    pub fn subscription(&self) -> Result<SubscriptionConfig, Error> {
        let topic = match &self.topic {
            Some(topic) => topic.clone(),
            None => prompt_text(
                "Enter the subscription topic (e.g. /event/MobileEnforcedPolicyEvent)",
            )?,
        };

        let batch_size = match self.batch_size {
            Some(batch_size) => batch_size,
            None => Input::<i32>::new()
                .with_prompt("Enter the number of events to retrieve at a time")
                .default(DEFAULT_BATCH_SIZE)
                .interact_text()
                .map_err(|source| Error::Prompt { source })?,
        };
        if batch_size <= 0 {
            return Err(Error::InvalidBatchSize);
        }

        Ok(SubscriptionConfig {
            topic,
            batch_size,
            replay: self.replay_mode()?,
            debug_all: self.debug_all,
        })
    }

    /// Resolves the replay mode, prompting when needed. The replay id is
    /// only asked for (or read from `--replay-id`) for the custom preset.
    fn replay_mode(&self) -> Result<Replay, Error> {
        let choice = match self.replay {
            Some(choice) => choice,
            None => {
                let options = [ReplayArg::Latest, ReplayArg::Earliest, ReplayArg::Custom];
                let index = Select::new()
                    .with_prompt("Where should the subscription resume")
                    .items(&["latest", "earliest", "custom"])
                    .default(0)
                    .interact()
                    .map_err(|source| Error::Prompt { source })?;
                options[index]
            }
        };

        match choice {
            ReplayArg::Latest => Ok(Replay::Latest),
            ReplayArg::Earliest => Ok(Replay::Earliest),
            ReplayArg::Custom => {
                let raw = match &self.replay_id {
                    Some(raw) => raw.clone(),
                    None => prompt_text(
                        "Enter the replay id (hex) of the last event you saw; you will \
                         receive all events after it",
                    )?,
                };
                parse_replay_id(&raw)
            }
        }
    }

    /// Collects credentials interactively. Not called when `--credentials`
    /// points at a file.
    pub fn prompt_credentials(&self) -> Result<Credentials, Error> {
        let consumer_key = prompt_text("Enter the consumer key")?;
        let tenant_id = prompt_text("Enter the organization ID")?;
        let username = prompt_text("Enter the username")?;
        let login_url = Input::<String>::new()
            .with_prompt("Enter the OAuth login URL")
            .default(DEFAULT_LOGIN_URL.to_string())
            .interact_text()
            .map_err(|source| Error::Prompt { source })?;
        let private_key_path = prompt_text("Enter the path to your private key (PEM file)")?;
        let passphrase = Password::new()
            .with_prompt("Enter the passphrase for the private key (empty for none)")
            .allow_empty_password(true)
            .interact()
            .map_err(|source| Error::Prompt { source })?;

        Ok(Credentials {
            consumer_key,
            username,
            login_url,
            tenant_id,
            private_key_path: PathBuf::from(private_key_path),
            private_key_passphrase: (!passphrase.is_empty()).then_some(passphrase),
        })
    }
}

fn prompt_text(prompt: &str) -> Result<String, Error> {
    Input::<String>::new()
        .with_prompt(prompt)
        .interact_text()
        .map_err(|source| Error::Prompt { source })
}

/// Parses a hex replay id into the raw bytes the API expects.
pub fn parse_replay_id(raw: &str) -> Result<Replay, Error> {
    let bytes = hex::decode(raw.trim()).map_err(|source| Error::InvalidReplayId { source })?;
    Ok(Replay::Custom(bytes))
}
