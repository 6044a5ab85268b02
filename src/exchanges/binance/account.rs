use crate::core::errors::StreamError;
use crate::core::kernel::{Conn, Transport, WsTransport};
use crate::exchanges::binance::types::{
    AccountEventType, AccountUpdateEvent, BalanceUpdateEvent, EventEnvelope, OcoOrderUpdateEvent,
    OrderUpdateEvent,
};
use serde::de::DeserializeOwned;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{instrument, trace};

/// One classified message from the user data stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    AccountUpdate(AccountUpdateEvent),
    BalanceUpdate(BalanceUpdateEvent),
    OrderUpdate(OrderUpdateEvent),
    OcoOrderUpdate(OcoOrderUpdateEvent),
    /// Message with a tag this crate does not model, kept as the original bytes
    Unknown {
        event_type: String,
        payload: Vec<u8>,
    },
}

impl AccountEvent {
    /// Discriminator the event was classified by
    pub fn event_type(&self) -> AccountEventType {
        match self {
            Self::AccountUpdate(_) => AccountEventType::OutboundAccountPosition,
            Self::BalanceUpdate(_) => AccountEventType::BalanceUpdate,
            Self::OrderUpdate(_) => AccountEventType::ExecutionReport,
            Self::OcoOrderUpdate(_) => AccountEventType::ListStatus,
            Self::Unknown { event_type, .. } => AccountEventType::Unknown(event_type.clone()),
        }
    }
}

/// Classify one user data payload by its `e` field and decode the full record
///
/// Unknown tags are not an error: the payload is copied out unchanged.
pub fn decode_account_event(payload: &[u8]) -> Result<AccountEvent, StreamError> {
    let envelope: EventEnvelope = serde_json::from_slice(payload)?;
    decode_event(envelope.event_type, payload)
}

fn decode_event(event_type: AccountEventType, payload: &[u8]) -> Result<AccountEvent, StreamError> {
    let event = match event_type {
        AccountEventType::OutboundAccountPosition => {
            AccountEvent::AccountUpdate(serde_json::from_slice(payload)?)
        }
        AccountEventType::BalanceUpdate => {
            AccountEvent::BalanceUpdate(serde_json::from_slice(payload)?)
        }
        AccountEventType::ExecutionReport => {
            AccountEvent::OrderUpdate(serde_json::from_slice(payload)?)
        }
        AccountEventType::ListStatus => {
            AccountEvent::OcoOrderUpdate(serde_json::from_slice(payload)?)
        }
        AccountEventType::Unknown(tag) => AccountEvent::Unknown {
            event_type: tag,
            payload: payload.to_vec(),
        },
    };
    Ok(event)
}

/// User data stream opened with a listen key
///
/// Offers a one-shot [`read`](Self::read) and several continuous streams.
/// All of them read from the same socket, so only one may be active at a
/// time; the per-kind streams drop every message of another kind.
pub struct AccountStream<T: Transport = WsTransport> {
    conn: Conn<T>,
}

impl<T: Transport> fmt::Debug for AccountStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountStream")
            .field("conn", &self.conn)
            .finish()
    }
}

impl<T: Transport> AccountStream<T> {
    pub fn new(conn: Conn<T>) -> Self {
        Self { conn }
    }

    /// Wait for the next user data message and classify it
    #[instrument(skip(self))]
    pub async fn read(&self) -> Result<AccountEvent, StreamError> {
        let event = self.conn.read_with(decode_account_event).await?;
        trace!(event_type = %event.event_type(), "account event");
        Ok(event)
    }

    /// `balanceUpdate` events only
    pub fn balances_stream(&self) -> Result<mpsc::Receiver<BalanceUpdateEvent>, StreamError> {
        self.kind_stream(AccountEventType::BalanceUpdate)
    }

    /// `outboundAccountPosition` events only
    pub fn account_stream(&self) -> Result<mpsc::Receiver<AccountUpdateEvent>, StreamError> {
        self.kind_stream(AccountEventType::OutboundAccountPosition)
    }

    /// `executionReport` events only
    pub fn orders_stream(&self) -> Result<mpsc::Receiver<OrderUpdateEvent>, StreamError> {
        self.kind_stream(AccountEventType::ExecutionReport)
    }

    /// `listStatus` events only
    pub fn oco_orders_stream(&self) -> Result<mpsc::Receiver<OcoOrderUpdateEvent>, StreamError> {
        self.kind_stream(AccountEventType::ListStatus)
    }

    /// Every message, classified, including unknown tags
    pub fn events_stream(&self) -> Result<mpsc::Receiver<AccountEvent>, StreamError> {
        self.conn
            .new_stream(|payload| decode_account_event(payload).map(Some))
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

    #[instrument(skip_all, fields(event_type = %target))]
    fn kind_stream<E>(&self, target: AccountEventType) -> Result<mpsc::Receiver<E>, StreamError>
    where
        E: DeserializeOwned + Send + 'static,
    {
        self.conn.new_stream(move |payload| {
            let envelope: EventEnvelope = serde_json::from_slice(payload)?;
            if envelope.event_type != target {
                trace!(event_type = %envelope.event_type, "skipping account event");
                return Ok(None);
            }
            Ok(Some(serde_json::from_slice::<E>(payload)?))
        })
    }
}
