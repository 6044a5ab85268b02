use crate::core::config::{StreamConfig, DEFAULT_CONNECT_TIMEOUT};
use crate::core::errors::StreamError;
use crate::core::kernel::{Conn, ConnConfig, WsTransport};
use crate::core::types::{DepthLevel, KlineInterval, UpdateSpeed};
use crate::exchanges::binance::account::AccountStream;
use crate::exchanges::binance::market_data::{
    AggTrades, AllBookTickers, AllMarketMiniTickers, AllMarketTickers, CombinedBookTickers, Depth,
    DepthLevels, IndivBookTicker, IndivMiniTicker, IndivTicker, Klines, MarketStream, Trades,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// Dials Binance websocket streams and binds them to typed adapters
#[derive(Debug, Clone)]
pub struct BinanceStreamClient {
    base_url: String,
    connect_timeout: Duration,
    conn_config: ConnConfig,
}

impl Default for BinanceStreamClient {
    fn default() -> Self {
        Self::from_config(&StreamConfig::read_only())
    }
}

impl BinanceStreamClient {
    /// Client for the public mainnet endpoint
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::with_base_url(config.resolved_ws_url())
            .with_conn_config(ConnConfig::from(config))
            .with_connect_timeout(config.connect_timeout)
    }

    /// Client for any compatible endpoint, e.g. `wss://stream.binance.com:9443`
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            conn_config: ConnConfig::default(),
        }
    }

    pub fn with_conn_config(mut self, config: ConnConfig) -> Self {
        self.conn_config = config;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a single raw stream, e.g. `bnbbtc@depth`
    pub fn raw_stream_url(&self, stream: &str) -> String {
        format!("{}/ws/{}", self.base_url, stream)
    }

    /// URL of a combined stream. Payloads arrive wrapped as `{"stream", "data"}`.
    pub fn combined_stream_url(&self, streams: &[String]) -> String {
        format!("{}/stream?streams={}", self.base_url, streams.join("/"))
    }

    /// Dial `url` and wrap the socket
    #[instrument(skip(self))]
    pub async fn connect(&self, url: &str) -> Result<Conn<WsTransport>, StreamError> {
        let transport = WsTransport::connect(url, self.connect_timeout).await?;
        debug!("stream connected");
        Ok(Conn::with_config(transport, self.conn_config.clone()))
    }

    async fn dial<U>(&self, stream: &str) -> Result<MarketStream<U>, StreamError>
    where
        U: DeserializeOwned + Send + 'static,
    {
        let conn = self.connect(&self.raw_stream_url(stream)).await?;
        Ok(MarketStream::new(conn))
    }

    /// Order book diffs
    pub async fn depth(&self, symbol: &str, speed: UpdateSpeed) -> Result<Depth, StreamError> {
        self.dial(&format!("{}@depth{}", symbol_token(symbol), speed.stream_suffix()))
            .await
    }

    /// Top `levels` bids and asks
    pub async fn depth_levels(
        &self,
        symbol: &str,
        levels: DepthLevel,
        speed: UpdateSpeed,
    ) -> Result<DepthLevels, StreamError> {
        self.dial(&format!(
            "{}@depth{}{}",
            symbol_token(symbol),
            levels.count(),
            speed.stream_suffix()
        ))
        .await
    }

    pub async fn klines(&self, symbol: &str, interval: KlineInterval) -> Result<Klines, StreamError> {
        self.dial(&format!("{}@kline_{}", symbol_token(symbol), interval))
            .await
    }

    pub async fn trades(&self, symbol: &str) -> Result<Trades, StreamError> {
        self.dial(&format!("{}@trade", symbol_token(symbol))).await
    }

    pub async fn agg_trades(&self, symbol: &str) -> Result<AggTrades, StreamError> {
        self.dial(&format!("{}@aggTrade", symbol_token(symbol))).await
    }

    pub async fn indiv_ticker(&self, symbol: &str) -> Result<IndivTicker, StreamError> {
        self.dial(&format!("{}@ticker", symbol_token(symbol))).await
    }

    pub async fn all_market_tickers(&self) -> Result<AllMarketTickers, StreamError> {
        self.dial("!ticker@arr").await
    }

    pub async fn indiv_mini_ticker(&self, symbol: &str) -> Result<IndivMiniTicker, StreamError> {
        self.dial(&format!("{}@miniTicker", symbol_token(symbol)))
            .await
    }

    pub async fn all_market_mini_tickers(&self) -> Result<AllMarketMiniTickers, StreamError> {
        self.dial("!miniTicker@arr").await
    }

    pub async fn indiv_book_ticker(&self, symbol: &str) -> Result<IndivBookTicker, StreamError> {
        self.dial(&format!("{}@bookTicker", symbol_token(symbol)))
            .await
    }

    pub async fn all_book_tickers(&self) -> Result<AllBookTickers, StreamError> {
        self.dial("!bookTicker").await
    }

    /// Book tickers of several symbols on one socket
    pub async fn combined_book_tickers(
        &self,
        symbols: &[&str],
    ) -> Result<CombinedBookTickers, StreamError> {
        if symbols.is_empty() {
            return Err(StreamError::InvalidParameters(
                "combined stream needs at least one symbol".to_string(),
            ));
        }
        let streams: Vec<String> = symbols
            .iter()
            .map(|symbol| format!("{}@bookTicker", symbol_token(symbol)))
            .collect();
        let conn = self.connect(&self.combined_stream_url(&streams)).await?;
        Ok(MarketStream::new(conn))
    }

    /// User data stream for `listen_key`, obtained through a
    /// [`ListenKeyProvider`](crate::exchanges::binance::rest::ListenKeyProvider)
    pub async fn account(&self, listen_key: &str) -> Result<AccountStream, StreamError> {
        if listen_key.is_empty() {
            return Err(StreamError::InvalidParameters(
                "listen key must not be empty".to_string(),
            ));
        }
        let conn = self.connect(&self.raw_stream_url(listen_key)).await?;
        Ok(AccountStream::new(conn))
    }
}

fn symbol_token(symbol: &str) -> String {
    symbol.to_lowercase()
}
