use config::{ConfigError, ConfigStore};
use console::{banner, Console, Tone};
use discord::{BotSession, SessionError};
use std::{process::ExitCode, sync::Arc};
use thiserror::Error;
use tracing::error;
use tracing_subscriber::EnvFilter;
mod config;
mod console;
mod discord;
mod minecraft;
mod poller;
mod presence;
mod probe;

/// Everything that can end the process before or instead of a clean shutdown.
#[derive(Debug, Error)]
enum StartupError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("config loader did not finish: {0}")]
    Loader(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {e}");
    }

    let result = run().await;
    if let Err(e) = &result {
        error!("Failed to start bot: {e}");
        banner(Tone::Error, "Error", &format!("Failed to start bot: {e}"));
    }
    ExitCode::from(exit_status(&result))
}

fn exit_status(result: &Result<(), StartupError>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

async fn run() -> Result<(), StartupError> {
    let config = tokio::task::spawn_blocking(|| {
        ConfigStore::default().load(&mut Console::stdio())
    })
    .await??;
    let probe = Arc::new(probe::ServerProbe::new(
        minecraft::JavaServerPing::new(minecraft::SystemSrvResolver::new()),
        probe::PROBE_TIMEOUT,
    ));
    let session = BotSession::connect(&config, probe).await?;
    session.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise::serenity_prelude as serenity;

    #[test]
    fn clean_shutdown_exits_zero() {
        assert_eq!(exit_status(&Ok(())), 0);
    }

    #[test]
    fn startup_failures_exit_one() {
        let failures = [
            StartupError::from(ConfigError::SetupAborted("token")),
            StartupError::from(ConfigError::InvalidInput {
                field: "port",
                reason: "'abc' is not a port between 1 and 65535".into(),
            }),
            StartupError::from(SessionError::from(serenity::Error::Gateway(
                serenity::GatewayError::InvalidAuthentication,
            ))),
        ];
        for failure in failures {
            let message = failure.to_string();
            assert_eq!(exit_status(&Err(failure)), 1, "{message}");
        }
    }

    #[test]
    fn auth_failure_message_names_the_token() {
        let err = StartupError::from(SessionError::from(serenity::Error::Gateway(
            serenity::GatewayError::InvalidAuthentication,
        )));
        assert!(err.to_string().starts_with("authentication failed, check the bot token"));
    }
}
