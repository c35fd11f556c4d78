//! Flow-controlled fetch request stream.
//!
//! A semaphore seeded with one permit gates emission of fetch requests, so
//! exactly one request is outstanding at a time. The subscription loop adds
//! a permit back once it has drained a batch; keepalive batches do not.

use std::sync::Arc;

use salesforce_pubsub_v1::eventbus::v1::{FetchRequest, ReplayPreset};
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;

/// Where a new subscription resumes in the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replay {
    /// Resume after the latest event at subscribe time.
    Latest,
    /// Resume from the earliest retained event.
    Earliest,
    /// Resume after the given replay id.
    Custom(Vec<u8>),
}

impl Replay {
    fn preset(&self) -> ReplayPreset {
        match self {
            Replay::Latest => ReplayPreset::Latest,
            Replay::Earliest => ReplayPreset::Earliest,
            Replay::Custom(_) => ReplayPreset::Custom,
        }
    }

    /// Replay id bytes to send. Only the custom preset carries one.
    fn replay_id(&self) -> Vec<u8> {
        match self {
            Replay::Custom(id) => id.clone(),
            _ => Vec::new(),
        }
    }
}

/// Parameters repeated in every fetch request of a subscription.
#[derive(Debug, Clone)]
pub struct FetchTemplate {
    /// Fully qualified topic name.
    pub topic_name: String,
    /// Number of events to request at a time.
    pub num_requested: i32,
    /// Where the subscription resumes.
    pub replay: Replay,
}

impl FetchTemplate {
    fn to_request(&self) -> FetchRequest {
        FetchRequest {
            topic_name: self.topic_name.clone(),
            replay_preset: self.replay.preset().into(),
            replay_id: self.replay.replay_id(),
            num_requested: self.num_requested,
            ..Default::default()
        }
    }
}

/// Yields one [`FetchRequest`] per permit acquired from `gate`.
///
/// Each emitted request consumes a permit; the consumer decides when the
/// next request may go out by adding a permit back. Closing the gate or
/// dropping the stream ends the feeder task.
pub fn fetch_request_stream(
    template: FetchTemplate,
    gate: Arc<Semaphore>,
) -> ReceiverStream<FetchRequest> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        loop {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => break,
            }
            if tx.send(template.to_request()).await.is_err() {
                break;
            }
        }
    });
    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {

    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn test_template(replay: Replay) -> FetchTemplate {
        FetchTemplate {
            topic_name: "/event/MobileEnforcedPolicyEvent".to_string(),
            num_requested: 50,
            replay,
        }
    }

    #[test]
    fn test_latest_request_has_no_replay_id() {
        let request = test_template(Replay::Latest).to_request();
        assert_eq!(request.topic_name, "/event/MobileEnforcedPolicyEvent");
        assert_eq!(request.replay_preset, ReplayPreset::Latest as i32);
        assert!(request.replay_id.is_empty());
        assert_eq!(request.num_requested, 50);
    }

    #[test]
    fn test_earliest_request_has_no_replay_id() {
        let request = test_template(Replay::Earliest).to_request();
        assert_eq!(request.replay_preset, ReplayPreset::Earliest as i32);
        assert!(request.replay_id.is_empty());
    }

    #[test]
    fn test_custom_request_carries_replay_id() {
        let request = test_template(Replay::Custom(vec![0xde, 0xad, 0xbe, 0xef])).to_request();
        assert_eq!(request.replay_preset, ReplayPreset::Custom as i32);
        assert_eq!(request.replay_id, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[tokio::test]
    async fn test_stream_emits_one_request_per_permit() {
        let gate = Arc::new(Semaphore::new(1));
        let mut stream = fetch_request_stream(test_template(Replay::Latest), Arc::clone(&gate));

        // Seeded with one permit, so exactly one request comes out.
        let first = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("first request should be emitted")
            .expect("stream should be open");
        assert_eq!(first.num_requested, 50);

        let starved = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(starved.is_err(), "no request without a permit");

        gate.add_permits(1);
        let second = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("second request should follow the new permit")
            .expect("stream should be open");
        assert_eq!(second.topic_name, first.topic_name);
    }

    #[tokio::test]
    async fn test_closing_the_gate_ends_the_stream() {
        let gate = Arc::new(Semaphore::new(0));
        let mut stream = fetch_request_stream(test_template(Replay::Latest), Arc::clone(&gate));

        gate.close();
        let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should end when the gate closes");
        assert!(end.is_none());
    }
}
