//! Control socket server

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::daemon::IkeDaemon;
use crate::dispatcher::CommandDispatcher;
use crate::error::{BridgeError, ErrorCode};
use crate::events::{EventPublisher, Subscription};
use crate::protocol::{decode_value, encode_result, Command, CommandResult, FrameDecoder};

const READ_CHUNK: usize = 8192;

/// Queued for a connection's writer task
enum Outbound {
    Line(Vec<u8>),
    Attach(Subscription),
}

/// Listens on the control socket and serves clients
pub struct ControlServer<D: IkeDaemon> {
    socket_path: PathBuf,
    listener: UnixListener,
    dispatcher: Arc<CommandDispatcher<D>>,
    publisher: Arc<EventPublisher>,
    max_message_bytes: usize,
}

impl<D: IkeDaemon> ControlServer<D> {
    /// Bind the control socket
    ///
    /// A stale socket file is replaced. The socket is made readable and
    /// writable by owner and group.
    pub fn bind(
        socket_path: impl AsRef<Path>,
        dispatcher: Arc<CommandDispatcher<D>>,
        publisher: Arc<EventPublisher>,
        max_message_bytes: usize,
    ) -> Result<Self, BridgeError> {
        let socket_path = socket_path.as_ref().to_path_buf();

        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&socket_path)?;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(component = "server", path = %socket_path.display(), "Control socket listening");

        Ok(Self {
            socket_path,
            listener,
            dispatcher,
            publisher,
            max_message_bytes,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until the task is cancelled
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let peer_uid = stream.peer_cred().ok().map(|cred| cred.uid());
                    info!(component = "server", uid = ?peer_uid, "Client connected");

                    tokio::spawn(handle_connection(
                        stream,
                        Arc::clone(&self.dispatcher),
                        Arc::clone(&self.publisher),
                        self.max_message_bytes,
                    ));
                }
                Err(e) => {
                    error!(component = "server", error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = self.run() => {}
            _ = shutdown => {
                info!(component = "server", "Shutting down control socket");
            }
        }
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl<D: IkeDaemon> Drop for ControlServer<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serve one client
///
/// The reader only decodes. Commands are executed one at a time in arrival
/// order by a separate task, each inside its own spawned task, so a client
/// that hangs up is unsubscribed at once while its in-flight command still
/// runs to completion.
async fn handle_connection<D: IkeDaemon>(
    stream: UnixStream,
    dispatcher: Arc<CommandDispatcher<D>>,
    publisher: Arc<EventPublisher>,
    max_message_bytes: usize,
) {
    let (mut read_half, write_half) = stream.into_split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(write_half, out_rx));
    let (pending_tx, pending_rx) = mpsc::unbounded_channel();
    let executor = tokio::spawn(execute_in_order(dispatcher, pending_rx, out_tx));

    let mut decoder = FrameDecoder::new(max_message_bytes);
    let mut buf = vec![0u8; READ_CHUNK];
    let mut subscriber = None;

    'read: loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => {
                debug!(component = "server", "Client disconnected (EOF)");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(component = "server", error = %e, "Read error");
                break;
            }
        };
        decoder.extend(&buf[..n]);

        loop {
            let pending = match decoder.next_value() {
                Ok(None) => break,
                Ok(Some(value)) => match decode_value(value) {
                    Ok(Command::Subscribe) => {
                        if subscriber.is_none() {
                            let subscription = publisher.subscribe();
                            info!(component = "server", subscriber = %subscription.id, "Client subscribed");
                            subscriber = Some(subscription.id);
                            if pending_tx.send(Pending::Attach(subscription)).is_err() {
                                break 'read;
                            }
                        }
                        Pending::Ready(CommandResult::Ok)
                    }
                    Ok(command) => Pending::Dispatch(command),
                    Err(e) => Pending::Ready(CommandResult::from(&BridgeError::from(e))),
                },
                Err(e) => {
                    warn!(component = "server", error = %e, "Rejected request");
                    Pending::Ready(CommandResult::from(&BridgeError::from(e)))
                }
            };

            if pending_tx.send(pending).is_err() {
                break 'read;
            }
        }
    }

    if let Some(id) = subscriber {
        publisher.unsubscribe(id);
    }

    // Replies to commands sent before EOF are still delivered to clients
    // that only shut down their write side
    drop(pending_tx);
    let _ = executor.await;
    let _ = writer.await;
}

/// Work queued by the reader for a connection's executor
enum Pending {
    Dispatch(Command),
    Ready(CommandResult),
    Attach(Subscription),
}

/// Run queued commands one after another and hand the replies to the writer
async fn execute_in_order<D: IkeDaemon>(
    dispatcher: Arc<CommandDispatcher<D>>,
    mut pending_rx: mpsc::UnboundedReceiver<Pending>,
    out_tx: mpsc::UnboundedSender<Outbound>,
) {
    while let Some(pending) = pending_rx.recv().await {
        let outbound = match pending {
            Pending::Attach(subscription) => Outbound::Attach(subscription),
            Pending::Ready(result) => Outbound::Line(encode_result(&result)),
            Pending::Dispatch(command) => {
                let dispatcher = Arc::clone(&dispatcher);
                let result =
                    match tokio::spawn(async move { dispatcher.dispatch(command).await }).await {
                        Ok(result) => result,
                        Err(e) => {
                            error!(component = "server", error = %e, "Dispatch task failed");
                            CommandResult::fail(ErrorCode::Internal, "internal error")
                        }
                    };
                Outbound::Line(encode_result(&result))
            }
        };

        if out_tx.send(outbound).is_err() {
            debug!(component = "server", "Writer gone, dropping remaining replies");
            break;
        }
    }
}

/// Single writer for a connection's replies and events
async fn write_loop(mut writer: OwnedWriteHalf, mut out_rx: mpsc::UnboundedReceiver<Outbound>) {
    let mut subscription: Option<Subscription> = None;

    loop {
        let bytes: Arc<[u8]> = tokio::select! {
            // Replies go out before events that are already queued
            biased;

            outbound = out_rx.recv() => match outbound {
                Some(Outbound::Line(line)) => Arc::from(line),
                Some(Outbound::Attach(attached)) => {
                    subscription = Some(attached);
                    continue;
                }
                None => break,
            },

            event = next_event(&mut subscription) => match event {
                Some(event) => event,
                None => {
                    // Dropped by the publisher as stalled
                    debug!(component = "server", "Event stream closed");
                    subscription = None;
                    continue;
                }
            },
        };

        if let Err(e) = write_line(&mut writer, &bytes).await {
            debug!(component = "server", error = %e, "Write error");
            break;
        }
    }

    let _ = writer.shutdown().await;
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<Arc<[u8]>> {
    match subscription {
        Some(subscription) => subscription.receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.write_all(b"\n").await
}
