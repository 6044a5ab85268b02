use binance_ws::{BinanceStreamClient, StreamConfig, UpdateSpeed};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Public market data needs no API key
    let config = StreamConfig::read_only().channel_capacity(16);
    let client = BinanceStreamClient::from_config(&config);

    println!("Connecting to {}...", client.raw_stream_url("btcusdt@depth@100ms"));
    let depth = client.depth("BTCUSDT", UpdateSpeed::Millis100).await?;
    let mut updates = depth.stream()?;

    for _ in 0..5 {
        match updates.recv().await {
            Some(update) => println!(
                "{} U={} u={} bids={} asks={}",
                update.symbol,
                update.first_update_id,
                update.last_update_id,
                update.bids.len(),
                update.asks.len()
            ),
            None => break,
        }
    }

    depth.shutdown().await?;

    match depth.last_error() {
        Some(e) => println!("Stream ended with error: {}", e),
        None => println!("Stream closed cleanly"),
    }

    Ok(())
}
