mod common;

use binance_ws::exchanges::binance::market_data::MarketStream;
use binance_ws::exchanges::binance::{
    AggTradeUpdate, AllBookTickerUpdate, AllMarketMiniTickerUpdate, AllMarketTickerUpdate,
    CombinedBookTickerUpdate, DepthLevelUpdate, DepthUpdate, IndivBookTickerUpdate,
    IndivMiniTickerUpdate, IndivTickerUpdate, KlinesUpdate, TradeUpdate,
};
use binance_ws::StreamError;
use common::{depth_update_json, mock_conn, trade_json, MockTransport, TEST_TIMEOUT};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt::Debug;
use tokio::time::timeout;

/// Feed `payload` once through `read()` and once through `stream()`,
/// each behind a keepalive ping, and compare the results.
async fn assert_read_matches_stream<U>(payload: Value) -> U
where
    U: DeserializeOwned + Send + PartialEq + Debug + 'static,
{
    let (conn, handle) = mock_conn();
    let market = MarketStream::<U, MockTransport>::new(conn);

    handle.ping(b"1");
    handle.json(&payload);
    let read = timeout(TEST_TIMEOUT, market.read())
        .await
        .expect("read timed out")
        .expect("read failed");

    handle.ping(b"2");
    handle.json(&payload);
    let mut rx = market.stream().expect("stream should start");
    let streamed = timeout(TEST_TIMEOUT, rx.recv())
        .await
        .expect("stream timed out")
        .expect("stream closed early");

    assert_eq!(read, streamed);
    assert_eq!(handle.pongs().len(), 2);
    market.close().await.unwrap();
    read
}

fn ticker_json(symbol: &str) -> Value {
    json!({
        "e": "24hrTicker", "E": 123_456_789, "s": symbol,
        "p": "0.0015", "P": "250.00", "w": "0.0018", "x": "0.0009",
        "c": "0.0025", "Q": "10", "b": "0.0024", "B": "10", "a": "0.0026", "A": "100",
        "o": "0.0010", "h": "0.0025", "l": "0.0010", "v": "10000", "q": "18",
        "O": 0, "C": 86_400_000, "F": 0, "L": 18_150, "n": 18_151
    })
}

fn mini_ticker_json(symbol: &str) -> Value {
    json!({
        "e": "24hrMiniTicker", "E": 123_456_789, "s": symbol,
        "c": "0.0025", "o": "0.0010", "h": "0.0025", "l": "0.0010",
        "v": "10000", "q": "18"
    })
}

fn book_ticker_json(symbol: &str) -> Value {
    json!({
        "u": 400_900_217, "s": symbol,
        "b": "25.35190000", "B": "31.21000000",
        "a": "25.36520000", "A": "40.66000000"
    })
}

#[cfg(test)]
mod channel_kind_tests {
    use super::*;

    #[tokio::test]
    async fn test_depth() {
        let update: DepthUpdate = assert_read_matches_stream(depth_update_json()).await;
        assert_eq!(update.first_update_id, 157);
        assert_eq!(update.last_update_id, 160);
        assert_eq!(update.bids[0].price, "0.0024");
    }

    #[tokio::test]
    async fn test_depth_levels() {
        let payload = json!({
            "lastUpdateId": 160,
            "bids": [["0.0024", "10"], ["0.0023", "4"]],
            "asks": [["0.0026", "100"]]
        });
        let update: DepthLevelUpdate = assert_read_matches_stream(payload).await;
        assert_eq!(update.last_update_id, 160);
        assert_eq!(update.bids.len(), 2);
    }

    #[tokio::test]
    async fn test_klines() {
        let payload = json!({
            "e": "kline", "E": 123_456_789, "s": "BNBBTC",
            "k": {
                "t": 123_400_000, "T": 123_460_000, "s": "BNBBTC", "i": "1m",
                "f": 100, "L": 200, "o": "0.0010", "c": "0.0020", "h": "0.0025",
                "l": "0.0015", "v": "1000", "n": 100, "x": false, "q": "1.0000",
                "V": "500", "Q": "0.500", "B": "123456"
            }
        });
        let update: KlinesUpdate = assert_read_matches_stream(payload).await;
        assert_eq!(update.kline.interval, "1m");
        assert!(!update.kline.is_final);
    }

    #[tokio::test]
    async fn test_trades() {
        let update: TradeUpdate = assert_read_matches_stream(trade_json(12_345)).await;
        assert_eq!(update.trade_id, 12_345);
        assert!(update.is_buyer_maker);
    }

    #[tokio::test]
    async fn test_agg_trades() {
        let payload = json!({
            "e": "aggTrade", "E": 123_456_789, "s": "BNBBTC", "a": 12_345,
            "p": "0.001", "q": "100", "f": 100, "l": 105,
            "T": 123_456_785, "m": true, "M": true
        });
        let update: AggTradeUpdate = assert_read_matches_stream(payload).await;
        assert_eq!((update.first_trade_id, update.last_trade_id), (100, 105));
    }

    #[tokio::test]
    async fn test_tickers() {
        let single: IndivTickerUpdate = assert_read_matches_stream(ticker_json("BNBBTC")).await;
        assert_eq!(single.trade_count, 18_151);

        let all: AllMarketTickerUpdate =
            assert_read_matches_stream(json!([ticker_json("BNBBTC"), ticker_json("ETHBTC")]))
                .await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].symbol, "ETHBTC");
    }

    #[tokio::test]
    async fn test_mini_tickers() {
        let single: IndivMiniTickerUpdate =
            assert_read_matches_stream(mini_ticker_json("BNBBTC")).await;
        assert_eq!(single.close_price, "0.0025");

        let all: AllMarketMiniTickerUpdate = assert_read_matches_stream(json!([
            mini_ticker_json("BNBBTC"),
            mini_ticker_json("ETHBTC"),
            mini_ticker_json("LTCBTC")
        ]))
        .await;
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_book_tickers() {
        let single: IndivBookTickerUpdate =
            assert_read_matches_stream(book_ticker_json("BNBUSDT")).await;
        assert_eq!(single.bid_price, "25.35190000");

        let all: AllBookTickerUpdate = assert_read_matches_stream(book_ticker_json("ETHUSDT")).await;
        assert_eq!(all.symbol, "ETHUSDT");

        let combined: CombinedBookTickerUpdate = assert_read_matches_stream(json!({
            "stream": "bnbusdt@bookTicker",
            "data": book_ticker_json("BNBUSDT")
        }))
        .await;
        assert_eq!(combined.stream, "bnbusdt@bookTicker");
        assert_eq!(combined.data, single);
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_mismatch_ends_stream() {
        let (conn, handle) = mock_conn();
        let depth = MarketStream::<DepthUpdate, MockTransport>::new(conn);
        let mut rx = depth.stream().unwrap();

        handle.json(&depth_update_json());
        handle.json(&trade_json(1));

        assert!(timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().is_some());
        assert!(timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().is_none());
        assert!(matches!(
            depth.last_error(),
            Some(StreamError::DeserializationError(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_one_shot_read() {
        let (conn, handle) = mock_conn();
        let trades = MarketStream::<TradeUpdate, MockTransport>::new(conn);
        handle.data("\u{0}\u{1}garbage");

        let err = trades.read().await.unwrap_err();
        assert!(err.is_decode());
        assert!(trades.last_error().is_none());
    }

    #[tokio::test]
    async fn test_second_stream_refused() {
        let (conn, _handle) = mock_conn();
        let trades = MarketStream::<TradeUpdate, MockTransport>::new(conn);

        let _rx = trades.stream().unwrap();
        assert_eq!(trades.stream().unwrap_err(), StreamError::ReaderBusy);
    }

    #[tokio::test]
    async fn test_shutdown_closes_stream() {
        let (conn, handle) = mock_conn();
        let trades = MarketStream::<TradeUpdate, MockTransport>::new(conn);
        let mut rx = trades.stream().unwrap();

        trades.shutdown().await.unwrap();
        assert!(timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().is_none());
        assert!(handle.is_shut_down());
        assert!(trades.last_error().is_none());
    }
}
