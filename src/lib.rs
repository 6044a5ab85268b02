pub mod core;
pub mod exchanges;

pub use crate::core::{
    config::{ConfigError, StreamConfig},
    errors::StreamError,
    kernel::{Conn, ConnConfig, Transport, WsTransport},
    types::*,
};
pub use exchanges::binance::{AccountEvent, AccountStream, BinanceStreamClient, MarketStream};
