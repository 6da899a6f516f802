use crate::probe::ProbeResult;
use async_trait::async_trait;
use thiserror::Error;

pub const OFFLINE_TEXT: &str = "Server is Offline";
pub const OFFLINE_URL: &str = "https://dimension-studio.net";

#[derive(Debug, Error)]
#[error("presence update failed: {0}")]
pub struct PublishError(pub String);

/// What the bot shows next to its name. Derived from a single probe, nothing carried over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceState {
    Online(String),
    Offline(String),
}

impl PresenceState {
    pub fn text(&self) -> &str {
        match self {
            PresenceState::Online(text) | PresenceState::Offline(text) => text,
        }
    }

    /// Link attached to the activity, only shown while offline.
    pub fn url(&self) -> Option<&'static str> {
        match self {
            PresenceState::Online(_) => None,
            PresenceState::Offline(_) => Some(OFFLINE_URL),
        }
    }
}

impl From<ProbeResult> for PresenceState {
    fn from(result: ProbeResult) -> Self {
        match result {
            ProbeResult::Online { current, max } => {
                PresenceState::Online(format!("{current}/{max} players online"))
            }
            ProbeResult::Offline => PresenceState::Offline(OFFLINE_TEXT.to_string()),
        }
    }
}

/// The chat session's presence endpoint.
#[async_trait]
pub trait PresenceSink: Send + Sync {
    async fn set_presence(&self, state: &PresenceState) -> Result<(), PublishError>;
}

pub struct PresencePublisher {
    sink: Box<dyn PresenceSink>,
}

impl PresencePublisher {
    pub fn new(sink: impl PresenceSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Makes exactly one presence update, no retry.
    pub async fn publish(&self, result: ProbeResult) -> Result<PresenceState, PublishError> {
        let state = PresenceState::from(result);
        self.sink.set_presence(&state).await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<PresenceState>>>);

    #[async_trait]
    impl PresenceSink for Recorder {
        async fn set_presence(&self, state: &PresenceState) -> Result<(), PublishError> {
            self.0.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    struct RateLimited;

    #[async_trait]
    impl PresenceSink for RateLimited {
        async fn set_presence(&self, _state: &PresenceState) -> Result<(), PublishError> {
            Err(PublishError("rate limited".into()))
        }
    }

    #[test]
    fn online_text_has_no_pluralisation() {
        for (current, max, text) in [
            (5, 20, "5/20 players online"),
            (1, 1, "1/1 players online"),
            (0, 0, "0/0 players online"),
            (4_000_000_000, 10, "4000000000/10 players online"),
        ] {
            let state = PresenceState::from(ProbeResult::Online { current, max });
            assert!(matches!(state, PresenceState::Online(_)));
            assert_eq!(state.text(), text);
            assert_eq!(state.url(), None);
        }
    }

    #[test]
    fn offline_is_constant() {
        let state = PresenceState::from(ProbeResult::Offline);
        assert!(matches!(state, PresenceState::Offline(_)));
        assert_eq!(state.text(), "Server is Offline");
        assert_eq!(state.url(), Some("https://dimension-studio.net"));
    }

    #[tokio::test]
    async fn publish_makes_one_call() {
        let recorder = Recorder::default();
        let publisher = PresencePublisher::new(recorder.clone());
        let state = publisher
            .publish(ProbeResult::Online { current: 3, max: 10 })
            .await
            .unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), vec![state]);
    }

    #[tokio::test]
    async fn sink_failure_propagates() {
        let publisher = PresencePublisher::new(RateLimited);
        let err = publisher.publish(ProbeResult::Offline).await.unwrap_err();
        assert_eq!(err.to_string(), "presence update failed: rate limited");
    }
}
