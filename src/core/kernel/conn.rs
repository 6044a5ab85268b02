use crate::core::config::{StreamConfig, DEFAULT_PONG_DEADLINE};
use crate::core::errors::StreamError;
use crate::core::kernel::frame::{Frame, FrameKind, FramePool};
use crate::core::kernel::transport::Transport;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, instrument, trace, warn};

/// Per-connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnConfig {
    /// Capacity of the channel handed out by `Conn::new_stream`.
    ///
    /// With the default of 1 a consumer that stops draining stalls the read
    /// loop, and with it the pong replies. Binance drops the socket once
    /// pongs are late by more than `pong_deadline`; raise the capacity when
    /// consumers can be slow.
    pub channel_capacity: usize,
    /// Assumed server tolerance for unanswered pings. Only used to warn when
    /// backpressure has blocked the read loop for longer than this.
    pub pong_deadline: Duration,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1,
            pong_deadline: DEFAULT_PONG_DEADLINE,
        }
    }
}

impl ConnConfig {
    /// Buffer up to `capacity` updates ahead of the consumer
    pub fn buffered(capacity: usize) -> Self {
        Self {
            channel_capacity: capacity.max(1),
            ..Self::default()
        }
    }

    pub fn with_pong_deadline(mut self, deadline: Duration) -> Self {
        self.pong_deadline = deadline;
        self
    }
}

impl From<&StreamConfig> for ConnConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            channel_capacity: config.channel_capacity.max(1),
            pong_deadline: config.pong_deadline,
        }
    }
}

/// Connection wrapper around one transport socket
///
/// Answers keepalive pings transparently and hands data payloads to exactly
/// one reader at a time: either a one-shot read or a spawned stream loop.
/// A second concurrent reader is refused with [`StreamError::ReaderBusy`].
///
/// Cloning is cheap and every clone refers to the same socket.
pub struct Conn<T: Transport> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    transport: Mutex<T>,
    reader_active: AtomicBool,
    closed: AtomicBool,
    close_signal: watch::Sender<bool>,
    error: OnceLock<StreamError>,
    frames: FramePool,
    config: ConnConfig,
}

/// Held by the active reader; releases the single-consumer gate on drop
struct ReaderGuard<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Drop for ReaderGuard<T> {
    fn drop(&mut self) {
        self.shared.reader_active.store(false, Ordering::Release);
    }
}

impl<T: Transport> Clone for Conn<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> fmt::Debug for Conn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("closed", &self.is_closed())
            .field("reading", &self.is_reading())
            .field("last_error", &self.shared.error.get())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Conn<T> {
    /// Bind a wrapper to an already open transport
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ConnConfig::default())
    }

    pub fn with_config(transport: T, config: ConnConfig) -> Self {
        let (close_signal, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                transport: Mutex::new(transport),
                reader_active: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                close_signal,
                error: OnceLock::new(),
                frames: FramePool::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ConnConfig {
        &self.shared.config
    }

    /// Error that terminated the connection, `None` while healthy or after
    /// an intentional close. Check it once a stream channel has closed.
    pub fn last_error(&self) -> Option<StreamError> {
        self.shared.error.get().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Whether a one-shot read or a stream loop currently owns the socket
    pub fn is_reading(&self) -> bool {
        self.shared.reader_active.load(Ordering::Acquire)
    }

    /// Wait for the next data frame and decode its JSON payload into `V`
    pub async fn read_value<V: DeserializeOwned>(&self) -> Result<V, StreamError> {
        self.read_with(|payload| Ok(serde_json::from_slice(payload)?))
            .await
    }

    /// Wait for the next data frame and hand its payload to `decode`
    ///
    /// Leading pings are answered with pongs before the data frame is
    /// returned. The payload borrow ends with `decode`; copy anything that
    /// must outlive it.
    #[instrument(skip_all)]
    pub async fn read_with<R, F>(&self, decode: F) -> Result<R, StreamError>
    where
        F: FnOnce(&[u8]) -> Result<R, StreamError>,
    {
        let _reader = self.acquire_reader()?;
        let mut frame = self.shared.frames.acquire();
        let mut closed = self.shared.close_signal.subscribe();

        if let Err(e) = self.shared.next_payload(&mut frame, &mut closed).await {
            self.shared.record(&e);
            return Err(e);
        }
        decode(frame.payload())
    }

    /// Spawn the read loop and forward every accepted payload on a channel
    ///
    /// `on_message` sees each data payload in arrival order and returns
    /// `Ok(Some(_))` to forward, `Ok(None)` to skip, or an error to stop the
    /// loop. The loop also stops on transport failure, on `close`/`shutdown`,
    /// or when the receiver is dropped. On exit the error (if any) is
    /// recorded for [`Conn::last_error`] and the channel is closed, in that
    /// order.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new_stream<U, F>(&self, on_message: F) -> Result<mpsc::Receiver<U>, StreamError>
    where
        U: Send + 'static,
        F: FnMut(&[u8]) -> Result<Option<U>, StreamError> + Send + 'static,
    {
        let reader = self.acquire_reader()?;
        let (tx, rx) = mpsc::channel(self.shared.config.channel_capacity);
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            shared.run_stream(reader, tx, on_message).await;
        });

        Ok(rx)
    }

    /// Drop the socket immediately. Idempotent.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<(), StreamError> {
        self.terminate(false).await
    }

    /// Close the socket with a close handshake. Idempotent; a no-op after `close`.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), StreamError> {
        self.terminate(true).await
    }

    async fn terminate(&self, graceful: bool) -> Result<(), StreamError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // wakes the active reader, which then releases the transport
        self.shared.close_signal.send_replace(true);

        let mut transport = self.shared.transport.lock().await;
        debug!(graceful, "closing connection");
        if graceful {
            transport.shutdown().await
        } else {
            transport.close().await
        }
    }

    fn acquire_reader(&self) -> Result<ReaderGuard<T>, StreamError> {
        if let Some(err) = self.shared.error.get() {
            return Err(err.clone());
        }
        if self.is_closed() {
            return Err(StreamError::ConnectionClosed);
        }

        self.shared
            .reader_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StreamError::ReaderBusy)?;

        Ok(ReaderGuard {
            shared: Arc::clone(&self.shared),
        })
    }
}

impl<T: Transport> Shared<T> {
    /// Keep the first terminal error; intentional closes are not errors.
    fn record(&self, err: &StreamError) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if self.error.set(err.clone()).is_ok() {
            warn!(error = %err, "connection terminated");
        }
    }

    /// Read until a data frame lands in `frame`, answering pings on the way
    async fn next_payload(
        &self,
        frame: &mut Frame,
        closed: &mut watch::Receiver<bool>,
    ) -> Result<(), StreamError> {
        let mut transport = tokio::select! {
            biased;
            () = wait_closed(closed) => return Err(StreamError::ConnectionClosed),
            transport = self.transport.lock() => transport,
        };

        loop {
            frame.reset();
            tokio::select! {
                biased;
                () = wait_closed(closed) => return Err(StreamError::ConnectionClosed),
                read = transport.read_frame(frame) => {
                    read?;
                }
            }

            match frame.kind() {
                FrameKind::Data => return Ok(()),
                FrameKind::Ping => {
                    frame.set_pong();
                    // a peer that stopped reading must not block close/shutdown
                    tokio::select! {
                        biased;
                        () = wait_closed(closed) => return Err(StreamError::ConnectionClosed),
                        written = transport.write_frame(frame) => {
                            written?;
                        }
                    }
                    trace!("answered keepalive ping");
                }
                FrameKind::Pong => trace!("ignoring unsolicited pong"),
                FrameKind::Close => {
                    debug!("peer sent close frame");
                    return Err(StreamError::ConnectionClosed);
                }
            }
        }
    }

    async fn run_stream<U, F>(&self, reader: ReaderGuard<T>, tx: mpsc::Sender<U>, mut on_message: F)
    where
        U: Send + 'static,
        F: FnMut(&[u8]) -> Result<Option<U>, StreamError> + Send + 'static,
    {
        let mut frame = self.frames.acquire();
        let mut closed = self.close_signal.subscribe();
        debug!("stream loop started");

        loop {
            let next = tokio::select! {
                biased;
                () = tx.closed() => {
                    debug!("update receiver dropped");
                    break;
                }
                next = self.next_payload(&mut frame, &mut closed) => next,
            };
            let result = match next {
                Ok(()) => on_message(frame.payload()),
                Err(e) => Err(e),
            };

            let update = match result {
                Ok(Some(update)) => update,
                Ok(None) => continue,
                Err(e) => {
                    self.record(&e);
                    break;
                }
            };

            if !self.forward(&tx, update, &mut closed).await {
                break;
            }
        }

        debug!("stream loop finished");
        drop(reader);
        drop(tx);
    }

    /// Hand one update to the consumer. Returns false when the loop should stop.
    async fn forward<U>(
        &self,
        tx: &mpsc::Sender<U>,
        update: U,
        closed: &mut watch::Receiver<bool>,
    ) -> bool {
        let send = tx.send(update);
        tokio::pin!(send);
        let mut warned = false;

        loop {
            tokio::select! {
                biased;
                () = wait_closed(closed) => return false,
                sent = &mut send => {
                    if sent.is_err() {
                        debug!("update receiver dropped");
                        return false;
                    }
                    return true;
                }
                () = tokio::time::sleep(self.config.pong_deadline), if !warned => {
                    warned = true;
                    warn!(
                        deadline = ?self.config.pong_deadline,
                        "slow consumer is blocking the read loop; keepalive pongs are delayed"
                    );
                }
            }
        }
    }
}

/// Resolves once `close`/`shutdown` has been called
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    // the sender lives as long as the connection, so an error cannot occur here
    let _ = closed.wait_for(|closed| *closed).await;
}
