use async_trait::async_trait;
use std::{io, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

/// Upper bound on a single status query so a stalled server cannot hold up the poller.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("malformed status json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerCounts {
    pub online: u32,
    pub max: u32,
}

/// Something that can ask a game server how many players it has.
#[async_trait]
pub trait ServerQuery: Send + Sync {
    async fn query(&self, host: &str, port: u16) -> Result<PlayerCounts, QueryError>;
}

/// Outcome of one poll. Every failure collapses into `Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Online { current: u32, max: u32 },
    Offline,
}

pub struct ServerProbe {
    query: Arc<dyn ServerQuery>,
    timeout: Duration,
}

impl ServerProbe {
    pub fn new(query: impl ServerQuery + 'static, timeout: Duration) -> Self {
        Self {
            query: Arc::new(query),
            timeout,
        }
    }

    pub async fn query(&self, host: &str, port: u16) -> ProbeResult {
        let outcome = tokio::time::timeout(self.timeout, self.query.query(host, port))
            .await
            .unwrap_or(Err(QueryError::Timeout(self.timeout)));
        match outcome {
            Ok(PlayerCounts { online, max }) => {
                info!("Server is online: {online}/{max} players");
                ProbeResult::Online {
                    current: online,
                    max,
                }
            }
            Err(e) => {
                warn!("Server is offline ({host}:{port}): {e}");
                ProbeResult::Offline
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(fn() -> Result<PlayerCounts, QueryError>);

    #[async_trait]
    impl ServerQuery for Fixed {
        async fn query(&self, _host: &str, _port: u16) -> Result<PlayerCounts, QueryError> {
            (self.0)()
        }
    }

    struct Hang;

    #[async_trait]
    impl ServerQuery for Hang {
        async fn query(&self, _host: &str, _port: u16) -> Result<PlayerCounts, QueryError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn counts_map_straight_through() {
        let probe = ServerProbe::new(
            Fixed(|| Ok(PlayerCounts { online: 5, max: 20 })),
            PROBE_TIMEOUT,
        );
        assert_eq!(
            probe.query("mc.local", 25565).await,
            ProbeResult::Online { current: 5, max: 20 }
        );
    }

    #[tokio::test]
    async fn every_failure_is_offline() {
        let failures: [fn() -> Result<PlayerCounts, QueryError>; 3] = [
            || Err(io::Error::from(io::ErrorKind::ConnectionRefused).into()),
            || Err(QueryError::Protocol("unexpected packet id 0x05".into())),
            || Err(serde_json::from_str::<serde_json::Value>("{").unwrap_err().into()),
        ];
        for fail in failures {
            let probe = ServerProbe::new(Fixed(fail), PROBE_TIMEOUT);
            assert_eq!(probe.query("mc.local", 25565).await, ProbeResult::Offline);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_query_times_out_as_offline() {
        let started = tokio::time::Instant::now();
        let probe = ServerProbe::new(Hang, PROBE_TIMEOUT);
        assert_eq!(probe.query("mc.local", 25565).await, ProbeResult::Offline);
        assert!(started.elapsed() >= PROBE_TIMEOUT);
    }
}
