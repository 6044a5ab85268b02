pub mod account;
pub mod client;
pub mod market_data;
pub mod rest;
pub mod types;

// Re-export main types for easier importing
pub use account::{decode_account_event, AccountEvent, AccountStream};
pub use client::BinanceStreamClient;
pub use market_data::{
    AggTrades, AllBookTickers, AllMarketMiniTickers, AllMarketTickers, CombinedBookTickers, Depth,
    DepthLevels, IndivBookTicker, IndivMiniTicker, IndivTicker, Klines, MarketStream, Trades,
};
pub use rest::{BinanceListenKeyClient, ListenKeyProvider};
pub use types::{
    AccountBalance, AccountEventType, AccountUpdateEvent, AggTradeUpdate, AllBookTickerUpdate,
    AllMarketMiniTickerUpdate, AllMarketTickerUpdate, BalanceUpdateEvent,
    CombinedBookTickerUpdate, DepthLevelUpdate, DepthUpdate, EventEnvelope,
    IndivBookTickerUpdate, IndivMiniTickerUpdate, IndivTickerUpdate, Kline, KlinesUpdate,
    OcoOrderUpdateEvent, OcoOrderUpdateEventOrder, OrderUpdateEvent, PriceLevel, TradeUpdate,
};
