use crate::{
    config::Config,
    poller::StatusPoller,
    presence::{PresencePublisher, PresenceSink, PresenceState, PublishError},
    probe::ServerProbe,
};
use async_trait::async_trait;
use poise::serenity_prelude::{self as serenity, ActivityData, OnlineStatus};
use std::{fmt::Display, future::Future, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

struct Data {
    probe: Arc<ServerProbe>,
    host: String,
    port: u16,
}
type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authentication failed, check the bot token: {0}")]
    Auth(serenity::Error),
    #[error("discord client error: {0}")]
    Client(serenity::Error),
}

impl From<serenity::Error> for SessionError {
    fn from(err: serenity::Error) -> Self {
        let bad_token = match &err {
            serenity::Error::Gateway(serenity::GatewayError::InvalidAuthentication) => true,
            serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) => {
                response.status_code.as_u16() == 401
            }
            _ => false,
        };
        if bad_token {
            SessionError::Auth(err)
        } else {
            SessionError::Client(err)
        }
    }
}

/// Presence updates sent over the gateway connection of a ready session.
pub struct GatewayPresence(serenity::Context);

#[async_trait]
impl PresenceSink for GatewayPresence {
    async fn set_presence(&self, state: &PresenceState) -> Result<(), PublishError> {
        let (activity, status) = match state {
            PresenceState::Online(text) => (ActivityData::watching(text), OnlineStatus::Online),
            PresenceState::Offline(text) => {
                let url = state.url().unwrap_or_default();
                let activity = ActivityData::streaming(text, url)
                    .map_err(|e| PublishError(format!("invalid activity url {url}: {e}")))?;
                (activity, OnlineStatus::Idle)
            }
        };
        self.0.set_presence(Some(activity), status);
        Ok(())
    }
}

/// The connected bot: a serenity client whose ready signal starts the poller.
pub struct BotSession {
    client: serenity::Client,
    poller: Arc<StatusPoller>,
}

impl BotSession {
    pub async fn connect(
        config: &Config,
        probe: Arc<ServerProbe>,
    ) -> Result<Self, SessionError> {
        let poller = Arc::new(StatusPoller::new(config, probe.clone()));
        let data = Data {
            probe,
            host: config.host.clone(),
            port: config.port,
        };

        let intents = serenity::GatewayIntents::non_privileged();
        let ready_poller = poller.clone();
        let framework = poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: vec![status()],
                ..Default::default()
            })
            .setup(move |ctx, ready, framework| {
                Box::pin(async move {
                    info!("Bot is ready! Logged in as {}", ready.user.name);
                    on_ready(&ready_poller, GatewayPresence(ctx.clone()), || {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                    })
                    .await;
                    Ok(data)
                })
            })
            .build();
        let client = serenity::ClientBuilder::new(&config.token, intents)
            .framework(framework)
            .await?;
        Ok(Self { client, poller })
    }

    /// Runs until the gateway fails or a stop signal arrives; the poller is stopped either way.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let shard_manager = self.client.shard_manager.clone();
        let shutdown = ShutdownSignal::install();
        let outcome = tokio::select! {
            res = self.client.start() => res.map_err(SessionError::from),
            signal = shutdown.recv() => {
                info!("Shutdown requested ({signal})");
                shard_manager.shutdown_all().await;
                Ok(())
            }
        };
        self.poller.stop().await;
        debug!("Status poller is {:?}", self.poller.state());
        outcome
    }
}

/// Ready hook: the poller starts first so a failed command registration only costs `/status`.
async fn on_ready<F, Fut, E>(
    poller: &StatusPoller,
    sink: impl PresenceSink + 'static,
    register: F,
) where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    poller.start(PresencePublisher::new(sink));
    if let Err(e) = register().await {
        warn!("Failed to register slash commands: {e}");
    }
}

/// SIGINT everywhere, plus SIGTERM on unix.
struct ShutdownSignal {
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl ShutdownSignal {
    fn install() -> Self {
        #[cfg(unix)]
        let terminate = {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    warn!("Failed to listen for SIGTERM: {e}");
                    None
                }
            }
        };
        Self {
            #[cfg(unix)]
            terminate,
        }
    }

    #[allow(unused_mut)]
    async fn recv(mut self) -> &'static str {
        #[cfg(unix)]
        {
            if let Some(terminate) = self.terminate.as_mut() {
                return tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                };
            }
        }
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    }
}

/// Checks the Minecraft server right now
#[poise::command(prefix_command, slash_command)]
async fn status(ctx: Context<'_>) -> Result<(), Error> {
    info!("status command called by {}", ctx.author().name);
    ctx.defer().await?;
    let data = ctx.data();
    let result = data.probe.query(&data.host, data.port).await;
    ctx.say(PresenceState::from(result).text()).await?;
    Ok(())
}
