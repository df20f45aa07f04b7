// 11.0: every state change the engine makes is also appended here. bounded audit trail,
// oldest events drop off once max_events is reached.

use crate::order::{Order, OrderStatus, Trade};
use crate::transfer::{TransferResponse, TransferType};
use crate::types::{Asset, MarketId, OrderId, PartyId, Price, Side, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Market lifecycle
    MarketCreated(MarketCreatedEvent),
    MarketSettled(MarketSettledEvent),

    // Orders and trades
    OrderUpdated(OrderEvent),
    Trade(Trade),

    // Money
    Deposit(DepositEvent),
    Transfer(TransferEvent),
    Distressed(DistressedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCreatedEvent {
    pub market_id: MarketId,
    pub name: String,
    pub asset: Asset,
    pub insurance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSettledEvent {
    pub market_id: MarketId,
    pub transfers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub market_id: MarketId,
    pub order_id: OrderId,
    pub party_id: PartyId,
    pub side: Side,
    pub price: Option<Price>,
    pub remaining: u64,
    pub status: OrderStatus,
}

impl From<&Order> for OrderEvent {
    fn from(order: &Order) -> Self {
        Self {
            market_id: order.market_id.clone(),
            order_id: order.id.clone(),
            party_id: order.party_id.clone(),
            side: order.side,
            price: order.price,
            remaining: order.remaining,
            status: order.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub party_id: PartyId,
    pub asset: Asset,
    pub amount: u64,
    pub new_balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub market_id: MarketId,
    pub owner: PartyId,
    pub transfer_type: TransferType,
    pub requested: u64,
    pub moved: u64,
}

impl TransferEvent {
    pub fn new(market_id: &MarketId, response: &TransferResponse) -> Self {
        Self {
            market_id: market_id.clone(),
            owner: response.owner.clone(),
            transfer_type: response.transfer_type,
            requested: response.requested,
            moved: response.moved(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistressedEvent {
    pub market_id: MarketId,
    pub party_id: PartyId,
    pub margin_balance: u64,
    pub general_balance: u64,
    pub required: u64,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            max_events,
        }
    }

    pub fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.push(Event {
            id,
            timestamp,
            payload,
        });

        if self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(0..drain_count);
        }
        id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn set_max_events(&mut self, max_events: usize) {
        self.max_events = max_events;
        if self.events.len() > max_events {
            let drain_count = self.events.len() - max_events;
            self.events.drain(0..drain_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(amount: u64) -> EventPayload {
        EventPayload::Deposit(DepositEvent {
            party_id: PartyId::from("p"),
            asset: Asset::from("USD"),
            amount,
            new_balance: amount,
        })
    }

    #[test]
    fn log_is_bounded_and_keeps_newest() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.emit(Timestamp::from_secs(i), deposit(i as u64));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.events()[0].id, EventId(3));
        assert_eq!(log.recent(1)[0].id, EventId(5));
        assert_eq!(log.recent(10).len(), 3);
    }

    #[test]
    fn shrinking_capacity_drops_oldest() {
        let mut log = EventLog::new(10);
        for i in 0..4 {
            log.emit(Timestamp::from_secs(i), deposit(1));
        }
        log.set_max_events(2);
        assert_eq!(log.events().first().map(|e| e.id), Some(EventId(3)));
    }

    #[test]
    fn event_serializes() {
        let mut log = EventLog::new(10);
        log.emit(Timestamp::from_secs(1), deposit(7));
        let json = serde_json::to_string(&log.events()[0]).unwrap();
        assert!(json.contains("Deposit"));
    }
}
