mod session;
mod smtp_protocol;

pub use session::{normalize_line, LineOutcome, Session, SessionState, SmtpReply};
pub use smtp_protocol::SmtpProtocol;

use crate::config::Config;
use crate::stats::ConnectionCounter;
use acton_reactive::prelude::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, trace};
use std::fmt::Display;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Delay before accepting again after a failed accept.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Anything that hands out client connections.
#[async_trait]
pub trait ConnectionSource: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl ConnectionSource for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Per-connection behaviour shared by every session the listener spawns.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Hostname announced in the `220` banner.
    pub greeting_hostname: String,
    /// Log message body lines as well as commands.
    pub log_body: bool,
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        ConnectionSettings {
            greeting_hostname: config.greeting_hostname.clone(),
            log_body: config.log_body,
        }
    }
}

/// A started listener actor together with the address it is bound to.
pub struct SmtpListener {
    pub handle: ActorHandle,
    pub local_addr: SocketAddr,
}

// --- SmtpListenerActor ---

#[acton_actor]
pub struct SmtpListenerState;

impl SmtpListenerState {
    /// Binds the listen address and starts accepting connections.
    ///
    /// Binding happens before the actor starts, so an unusable address is
    /// returned as an error instead of leaving a listener that never serves.
    pub async fn create(
        runtime: &mut ActorRuntime,
        config: &Config,
        counter: ConnectionCounter,
    ) -> anyhow::Result<SmtpListener> {
        let addr = config.listen_address();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind SMTP listener to {}", addr))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read SMTP listener address")?;
        tracing::info!("SMTP server listening on {}", local_addr);

        let actor_config = ActorConfig::new(Ern::with_root("smtp-listener")?, None, None)?
            .with_restart_policy(RestartPolicy::Permanent);

        let mut builder = runtime.new_actor_with_config::<Self>(actor_config);

        let cancel = CancellationToken::new();
        let cancel_for_stop = cancel.clone();

        builder.before_stop(move |_| {
            cancel_for_stop.cancel();
            Reply::ready()
        });

        let handle = builder.start().await;

        let settings = Arc::new(ConnectionSettings::from(config));
        tokio::spawn(accept_loop(listener, settings, counter, cancel));

        Ok(SmtpListener { handle, local_addr })
    }
}

/// Accepts clients until `cancel` fires, spawning one task per connection.
///
/// A failed accept is logged and the loop keeps serving other clients.
async fn accept_loop<L: ConnectionSource>(
    mut source: L,
    settings: Arc<ConnectionSettings>,
    counter: ConnectionCounter,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            result = source.accept() => {
                match result {
                    Ok((stream, remote_addr)) => {
                        let total = counter.increment();
                        tracing::info!("New connection from: {} (total {})", remote_addr, total);
                        let settings = settings.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, remote_addr, &settings).await {
                                tracing::error!("Error handling SMTP connection from {}: {:#}", remote_addr, e);
                            }
                            tracing::info!("Closing connection to {}", remote_addr);
                        });
                    }
                    Err(e) => {
                        tracing::error!("Error accepting connection: {:?}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("SMTP listener shutting down gracefully");
                break;
            }
        }
    }
}

/// Runs one SMTP conversation to completion.
///
/// Returns `Ok` when the client quits or closes the connection, and `Err` on
/// any read or write failure. Either way the stream is dropped on return.
pub async fn handle_connection<S>(
    stream: S,
    remote: impl Display,
    settings: &ConnectionSettings,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut protocol = SmtpProtocol::new(BufReader::new(read_half), BufWriter::new(write_half));
    let mut session = Session::new();

    protocol.send_greeting(&settings.greeting_hostname).await?;

    loop {
        trace!("SMTP({:?}): Waiting for line...", session.state());
        let line = match protocol
            .read_line()
            .await
            .with_context(|| format!("Read from {} failed", remote))?
        {
            Some(line) => line,
            None => {
                info!("Connection closed by client {} (EOF). State: {:?}", remote, session.state());
                return Ok(());
            }
        };

        if !session.in_data() || settings.log_body {
            info!("{}: {:?}", remote, normalize_line(&line));
        }

        match session.handle_line(&line) {
            LineOutcome::Respond(reply) => {
                protocol.write_reply(reply.code, reply.message).await?;
            }
            LineOutcome::Consumed => {}
            LineOutcome::Close(reply) => {
                protocol.write_reply(reply.code, reply.message).await?;
                info!("Client {} quit.", remote);
                protocol.shutdown().await?;
                return Ok(());
            }
        }
    }
}
