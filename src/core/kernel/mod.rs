/// Stream kernel - transport-agnostic connection handling
///
/// The kernel owns everything between a raw websocket and a typed update
/// channel, and nothing exchange specific:
///
/// - `Transport`: the minimal socket surface (read/write frame, close, shutdown)
/// - `TungsteniteTransport`: the tokio-tungstenite implementation
/// - `Conn`: keepalive-aware reads, the single-consumer gate, the stream loop
///   and the terminal error slot
/// - `Frame` / `FramePool`: reusable frame buffers scoped to one read
///
/// # Example
/// ```rust,no_run
/// use binance_ws::core::kernel::{Conn, WsTransport};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), binance_ws::StreamError> {
/// let transport = WsTransport::connect(
///     "wss://stream.binance.com:9443/ws/ethbtc@trade",
///     Duration::from_secs(10),
/// )
/// .await?;
/// let conn = Conn::new(transport);
///
/// let trade: serde_json::Value = conn.read_value().await?;
/// println!("{}", trade);
/// conn.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub mod conn;
pub mod frame;
pub mod transport;

pub use conn::{Conn, ConnConfig};
pub use frame::{Frame, FrameKind, FramePool, PooledFrame};
pub use transport::{Transport, TungsteniteTransport, WsTransport};
