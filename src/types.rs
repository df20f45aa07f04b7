// 1.0: all the primitives live here. ids, sides, prices, timestamps, assets.
// ids are string newtypes: every replica must derive the exact same keys from the same inputs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// 40 hex chars, see [`MarketId::derive`].
    MarketId
);
string_id!(PartyId);
string_id!(OrderId);
string_id!(
    /// Collateral account key, see `collateral::account_id`.
    AccountId
);
string_id!(
    /// Settlement asset symbol, e.g. "BTC" or "VUSD".
    Asset
);

impl MarketId {
    // 1.1: hex(sha256(payload || le(seq)))[..20 bytes]. payload is the serialized market config.
    pub fn derive(payload: &[u8], seq: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        hasher.update(seq.to_le_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..20]))
    }
}

// Buy = bids, lifts asks. Sell = asks, hits bids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

// 1.2: price in integer ticks of the settlement asset. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(u64);

impl Price {
    #[must_use]
    pub fn new(value: u64) -> Option<Self> {
        if value > 0 {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: u64) -> Self {
        debug_assert!(value > 0);
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.3: chain time in unix nanoseconds. only ever advanced by the caller, never read from a clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_nanos(ns: i64) -> Self {
        Self(ns)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let secs = self.0.div_euclid(1_000_000_000);
        let nanos = self.0.rem_euclid(1_000_000_000) as u32;
        chrono::DateTime::from_timestamp(secs, nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ns", self.0),
        }
    }
}

// 1.4: "V{block:010}-{seq:010}". seq restarts at 1 on every new block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderIdGenerator {
    block: u64,
    seq: u64,
}

impl OrderIdGenerator {
    pub fn new(block: u64) -> Self {
        Self { block, seq: 0 }
    }

    pub fn next_id(&mut self) -> OrderId {
        self.seq += 1;
        OrderId(format!("V{:010}-{:010}", self.block, self.seq))
    }

    pub fn new_block(&mut self) {
        self.block += 1;
        self.seq = 0;
    }

    pub fn block(&self) -> u64 {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_are_zero_padded_and_monotonic() {
        let mut ids = OrderIdGenerator::new(7);
        assert_eq!(ids.next_id().as_str(), "V0000000007-0000000001");
        assert_eq!(ids.next_id().as_str(), "V0000000007-0000000002");

        ids.new_block();
        let next = ids.next_id();
        assert_eq!(next.as_str(), "V0000000008-0000000001");
        assert!(next > OrderId::from("V0000000007-0000000002"));
    }

    #[test]
    fn market_id_is_reproducible() {
        let a = MarketId::derive(b"{\"name\":\"ETH/DEC\"}", 1);
        let b = MarketId::derive(b"{\"name\":\"ETH/DEC\"}", 1);
        let c = MarketId::derive(b"{\"name\":\"ETH/DEC\"}", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 40);
    }

    #[test]
    fn price_rejects_zero() {
        assert!(Price::new(0).is_none());
        assert_eq!(Price::new(101).map(|p| p.value()), Some(101));
    }

    #[test]
    fn side_sign_and_opposite() {
        assert_eq!(Side::Buy.sign(), 1);
        assert_eq!(Side::Sell.sign(), -1);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn timestamp_display_uses_rfc3339() {
        let ts = Timestamp::from_secs(0);
        assert_eq!(ts.to_string(), "1970-01-01T00:00:00+00:00");
    }
}
