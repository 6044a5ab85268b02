use crate::core::errors::StreamError;
use crate::core::kernel::{Conn, Transport, WsTransport};
use crate::exchanges::binance::types::{
    AggTradeUpdate, AllBookTickerUpdate, AllMarketMiniTickerUpdate, AllMarketTickerUpdate,
    CombinedBookTickerUpdate, DepthLevelUpdate, DepthUpdate, IndivBookTickerUpdate,
    IndivMiniTickerUpdate, IndivTickerUpdate, KlinesUpdate, TradeUpdate,
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use tokio::sync::mpsc;
use tracing::instrument;

/// Market data stream bound to a single wire schema `U`
///
/// Every Binance market channel pushes one fixed JSON shape, so all of
/// them share this adapter and differ only in `U`. See the aliases below.
pub struct MarketStream<U, T: Transport = WsTransport> {
    conn: Conn<T>,
    _schema: PhantomData<fn() -> U>,
}

pub type Depth<T = WsTransport> = MarketStream<DepthUpdate, T>;
pub type DepthLevels<T = WsTransport> = MarketStream<DepthLevelUpdate, T>;
pub type Klines<T = WsTransport> = MarketStream<KlinesUpdate, T>;
pub type Trades<T = WsTransport> = MarketStream<TradeUpdate, T>;
pub type AggTrades<T = WsTransport> = MarketStream<AggTradeUpdate, T>;
pub type IndivTicker<T = WsTransport> = MarketStream<IndivTickerUpdate, T>;
pub type AllMarketTickers<T = WsTransport> = MarketStream<AllMarketTickerUpdate, T>;
pub type IndivMiniTicker<T = WsTransport> = MarketStream<IndivMiniTickerUpdate, T>;
pub type AllMarketMiniTickers<T = WsTransport> = MarketStream<AllMarketMiniTickerUpdate, T>;
pub type IndivBookTicker<T = WsTransport> = MarketStream<IndivBookTickerUpdate, T>;
pub type AllBookTickers<T = WsTransport> = MarketStream<AllBookTickerUpdate, T>;
pub type CombinedBookTickers<T = WsTransport> = MarketStream<CombinedBookTickerUpdate, T>;

impl<U, T> MarketStream<U, T>
where
    U: DeserializeOwned + Send + 'static,
    T: Transport,
{
    pub fn new(conn: Conn<T>) -> Self {
        Self {
            conn,
            _schema: PhantomData,
        }
    }

    /// Wait for the next update. Repeated calls return subsequent updates.
    pub async fn read(&self) -> Result<U, StreamError> {
        self.conn.read_value().await
    }

    /// Start forwarding every update on a channel
    ///
    /// The channel closes when the connection is closed or fails. A payload
    /// that does not decode as `U` ends the stream; check [`Self::last_error`]
    /// after the channel closes. Only one reader may be active per socket,
    /// so a second call while the first stream runs fails with
    /// [`StreamError::ReaderBusy`].
    #[instrument(skip(self), fields(schema = std::any::type_name::<U>()))]
    pub fn stream(&self) -> Result<mpsc::Receiver<U>, StreamError> {
        self.conn
            .new_stream(|payload| Ok(Some(serde_json::from_slice::<U>(payload)?)))
    }

    pub fn conn(&self) -> &Conn<T> {
        &self.conn
    }

    pub fn last_error(&self) -> Option<StreamError> {
        self.conn.last_error()
    }

    pub async fn close(&self) -> Result<(), StreamError> {
        self.conn.close().await
    }

    pub async fn shutdown(&self) -> Result<(), StreamError> {
        self.conn.shutdown().await
    }
}

impl<U, T: Transport> fmt::Debug for MarketStream<U, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketStream")
            .field("schema", &std::any::type_name::<U>())
            .field("conn", &self.conn)
            .finish()
    }
}
