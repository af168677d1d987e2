use std::collections::VecDeque;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

use crate::codec::FrameCodec;
use crate::commands::Command;
use crate::config::Config;
use crate::connection::Connection;
use crate::dispatcher::{Dispatcher, Handle};
use crate::frame::{self, Frame};
use crate::store::Store;
use crate::Error;

/// Sets up logging, binds the configured address and serves until Ctrl-C.
pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
            shutdown.cancel();
        }
    });

    serve(listener, config, shutdown).await
}

/// Accepts connections on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let (dispatcher, handle) =
        Dispatcher::new(Store::new(), config.queue_capacity, shutdown.clone());
    let dispatcher = tokio::spawn(dispatcher.run());
    let codec = FrameCodec::new(config.max_frame_size);
    let max_pending = config.max_frame_size;

    info!("Server listening on {}", listener.local_addr()?);

    loop {
        let (socket, client_address) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };
        info!("Accepted connection from {:?}", client_address);

        let handle = handle.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let pending = Pending::new(max_pending);
            if let Err(e) =
                handle_connection(socket, client_address, codec, pending, handle, shutdown).await
            {
                error!("Connection failed: {}", e);
            }
        });
    }

    drop(handle);
    dispatcher.await?;

    info!("Server stopped");
    Ok(())
}

#[instrument(
    name = "connection",
    skip(stream, codec, pending, handle, shutdown),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    codec: FrameCodec,
    mut pending: Pending,
    handle: Handle,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let mut conn = Connection::with_codec(stream, codec);

    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", client_address.to_string());

    loop {
        let frame = match pending.pop() {
            Some(frame) => frame,
            None => {
                let read = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    read = conn.read_frame() => read,
                };
                match read {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => return reject(&mut conn, e).await,
                }
            }
        };
        debug!("Received frame from client: {}", frame);

        let cmd = match Command::try_from(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                conn.write_frame(Frame::Error(e.to_string())).await?;
                continue;
            }
        };

        let res = match cmd {
            Command::Blpop(_) => {
                let reply = handle.submit(cmd);
                tokio::pin!(reply);

                // Keep reading while blocked so that a client hanging up is noticed. Dropping the
                // pending reply lets the dispatcher know. Reading pauses once the queue is full.
                loop {
                    tokio::select! {
                        res = &mut reply => break res?,
                        read = conn.read_frame(), if !pending.is_full() => match read {
                            Ok(Some(frame)) => pending.push(frame),
                            Ok(None) => {
                                info!("Connection closed while blocked");
                                return Ok(());
                            }
                            Err(e) => return reject(&mut conn, e).await,
                        },
                    }
                }
            }
            cmd => handle.submit(cmd).await?,
        };

        debug!("Sending response to client: {}", res);
        conn.write_frame(res).await?;
    }

    info!("Connection closed");
    Ok(())
}

/// Frames read while a blocked pop is pending, bounded by their size on the wire.
struct Pending {
    frames: VecDeque<Frame>,
    bytes: usize,
    limit: usize,
}

impl Pending {
    fn new(limit: usize) -> Pending {
        Pending {
            frames: VecDeque::new(),
            bytes: 0,
            limit,
        }
    }

    fn push(&mut self, frame: Frame) {
        self.bytes += frame.encoded_len();
        self.frames.push_back(frame);
    }

    fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop_front()?;
        self.bytes -= frame.encoded_len();
        Some(frame)
    }

    fn is_full(&self) -> bool {
        self.bytes >= self.limit
    }
}

/// Reports a protocol error once before the connection is dropped.
async fn reject(conn: &mut Connection, e: frame::Error) -> Result<(), Error> {
    if !e.is_protocol() {
        return Err(e.into());
    }

    warn!("Closing connection: {}", e);
    conn.write_frame(Frame::Error(format!("ERR {e}"))).await?;
    Ok(())
}
