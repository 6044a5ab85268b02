//! Shared helpers for the stream tests: a scripted in-memory transport and
//! a handful of Binance payload fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use binance_ws::core::kernel::{Frame, FrameKind, Transport};
use binance_ws::{Conn, ConnConfig, StreamError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type Inbound = Result<Frame, StreamError>;

#[derive(Debug, Default)]
struct MockState {
    written: Vec<Frame>,
    closed: bool,
    shut_down: bool,
    fail_writes: bool,
    stall_writes: bool,
}

/// Transport fed by a test through its `MockHandle`
///
/// Reads block until the test pushes a frame; dropping every handle reads
/// as end of stream.
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    state: Arc<Mutex<MockState>>,
}

/// Test side of a `MockTransport`
#[derive(Clone)]
pub struct MockHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    state: Arc<Mutex<MockState>>,
}

pub fn mock_transport() -> (MockTransport, MockHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(MockState::default()));
    (
        MockTransport {
            inbound: rx,
            state: Arc::clone(&state),
        },
        MockHandle { inbound: tx, state },
    )
}

/// Connection over a fresh mock transport
pub fn mock_conn() -> (Conn<MockTransport>, MockHandle) {
    let (transport, handle) = mock_transport();
    (Conn::new(transport), handle)
}

pub fn mock_conn_with(config: ConnConfig) -> (Conn<MockTransport>, MockHandle) {
    let (transport, handle) = mock_transport();
    (Conn::with_config(transport, config), handle)
}

impl MockTransport {
    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read_frame(&mut self, frame: &mut Frame) -> Result<usize, StreamError> {
        if self.state().closed {
            return Err(StreamError::ConnectionClosed);
        }
        match self.inbound.recv().await {
            Some(Ok(next)) => {
                frame.set(next.kind(), next.payload());
                Ok(next.payload().len())
            }
            Some(Err(e)) => Err(e),
            None => Err(StreamError::ConnectionClosed),
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<usize, StreamError> {
        let stalled = {
            let mut state = self.state();
            if state.closed || state.fail_writes {
                return Err(StreamError::NetworkError("broken pipe".to_string()));
            }
            if !state.stall_writes {
                state.written.push(frame.clone());
            }
            state.stall_writes
        };
        if stalled {
            // a peer that stopped reading: the send buffer never drains
            std::future::pending::<()>().await;
        }
        Ok(frame.payload().len())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.state().closed = true;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), StreamError> {
        let mut state = self.state();
        state.shut_down = true;
        state.closed = true;
        Ok(())
    }
}

impl MockHandle {
    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, frame: Frame) {
        let _ = self.inbound.send(Ok(frame));
    }

    pub fn data(&self, payload: &str) {
        self.push(Frame::data(payload.as_bytes().to_vec()));
    }

    pub fn json(&self, value: &serde_json::Value) {
        self.data(&value.to_string());
    }

    pub fn ping(&self, payload: &[u8]) {
        self.push(Frame::ping(payload.to_vec()));
    }

    pub fn pings(&self, count: usize) {
        for i in 0..count {
            self.ping(format!("ping-{}", i).as_bytes());
        }
    }

    pub fn close_frame(&self) {
        self.push(Frame::close());
    }

    pub fn fail(&self, err: StreamError) {
        let _ = self.inbound.send(Err(err));
    }

    pub fn fail_writes(&self) {
        self.state().fail_writes = true;
    }

    pub fn stall_writes(&self) {
        self.state().stall_writes = true;
    }

    pub fn written(&self) -> Vec<Frame> {
        self.state().written.clone()
    }

    pub fn pongs(&self) -> Vec<Frame> {
        self.written()
            .into_iter()
            .filter(|frame| frame.kind() == FrameKind::Pong)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }
}

// Fixtures, shaped like the payloads Binance pushes

pub fn depth_update_json() -> serde_json::Value {
    serde_json::json!({
        "e": "depthUpdate",
        "E": 1_672_515_782_136_u64,
        "s": "BNBBTC",
        "U": 157,
        "u": 160,
        "b": [["0.0024", "10"]],
        "a": [["0.0026", "100"]]
    })
}

pub fn trade_json(trade_id: u64) -> serde_json::Value {
    serde_json::json!({
        "e": "trade",
        "E": 1_672_515_782_136_u64,
        "s": "BNBBTC",
        "t": trade_id,
        "p": "0.001",
        "q": "100",
        "T": 1_672_515_782_136_u64,
        "m": true,
        "M": true
    })
}

pub fn balance_update_json(asset: &str, delta: &str) -> serde_json::Value {
    serde_json::json!({
        "e": "balanceUpdate",
        "E": 1_573_200_697_110_u64,
        "a": asset,
        "d": delta,
        "T": 1_573_200_697_068_u64
    })
}

pub fn account_update_json() -> serde_json::Value {
    serde_json::json!({
        "e": "outboundAccountPosition",
        "E": 1_564_034_571_105_u64,
        "u": 1_564_034_571_073_u64,
        "B": [
            {"a": "ETH", "f": "10000.000000", "l": "0.000000"},
            {"a": "BTC", "f": "0.5", "l": "0.1"}
        ]
    })
}

pub fn order_update_json(order_id: u64, trade_id: i64) -> serde_json::Value {
    serde_json::json!({
        "e": "executionReport",
        "E": 1_499_405_658_658_u64,
        "s": "ETHBTC",
        "c": "mUvoqJxFIILMdfAW5iGSOW",
        "S": "BUY",
        "o": "LIMIT",
        "f": "GTC",
        "q": "1.00000000",
        "p": "0.10264410",
        "P": "0.00000000",
        "F": "0.00000000",
        "g": -1,
        "C": "",
        "x": "NEW",
        "X": "NEW",
        "r": "NONE",
        "i": order_id,
        "l": "0.00000000",
        "z": "0.00000000",
        "L": "0.00000000",
        "n": "0",
        "N": null,
        "T": 1_499_405_658_657_u64,
        "t": trade_id,
        "I": 8_641_984,
        "w": true,
        "m": false,
        "M": false,
        "O": 1_499_405_658_657_u64,
        "Z": "0.00000000",
        "Y": "0.00000000",
        "Q": "0.00000000"
    })
}

pub fn oco_update_json(order_list_id: i64) -> serde_json::Value {
    serde_json::json!({
        "e": "listStatus",
        "E": 1_564_035_303_637_u64,
        "s": "ETHBTC",
        "g": order_list_id,
        "c": "OCO",
        "l": "EXEC_STARTED",
        "L": "EXECUTING",
        "r": "NONE",
        "C": "F4QN4G8DlFATFlIUQ0cjdD",
        "T": 1_564_035_303_625_u64,
        "O": [
            {"s": "ETHBTC", "i": 17, "c": "AJYsMjErWJesZvqlJCTUgL"},
            {"s": "ETHBTC", "i": 18, "c": "bfYPSQdLoqAJeNrOr9adzq"}
        ]
    })
}
