// 3.1 matching/level.rs: one price, a queue of resting orders in arrival order, cached volume.

use super::MatchingAlgorithm;
use crate::order::Order;
use crate::types::{OrderId, Price};
use std::collections::VecDeque;

/// A resting order after it was hit, together with the size taken from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelFill {
    pub resting: Order,
    pub price: Price,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    orders: VecDeque<Order>,
    volume: u64,
}

impl PriceLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            volume: 0,
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn volume(&self) -> u64 {
        self.volume
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| &o.id == id)
    }

    pub fn add_order(&mut self, order: Order) {
        debug_assert_eq!(order.price, Some(self.price));
        self.volume += order.remaining;
        self.orders.push_back(order);
    }

    pub fn remove_order(&mut self, id: &OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| &o.id == id)?;
        let order = self.orders.remove(pos)?;
        self.volume -= order.remaining;
        Some(order)
    }

    /// Apply `update` to a resting order without moving it in the queue.
    pub fn amend_in_place<F>(&mut self, id: &OrderId, update: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let order = self.orders.iter_mut().find(|o| &o.id == id)?;
        let before = order.remaining;
        update(order);
        let after = order.remaining;
        let snapshot = order.clone();
        self.volume = self.volume - before + after;
        Some(snapshot)
    }

    /// Fill the aggressor against this level. Orders fully consumed leave the queue.
    pub fn fill(&mut self, aggressor: &mut Order, algorithm: MatchingAlgorithm) -> Vec<LevelFill> {
        if aggressor.remaining == 0 || self.is_empty() {
            return Vec::new();
        }
        // taking the whole level is the same under both algorithms
        if algorithm == MatchingAlgorithm::Fifo || aggressor.remaining >= self.volume {
            return self.fill_fifo(aggressor);
        }
        self.fill_pro_rata(aggressor)
    }

    fn fill_fifo(&mut self, aggressor: &mut Order) -> Vec<LevelFill> {
        let mut fills = Vec::new();
        while aggressor.remaining > 0 {
            let Some(front) = self.orders.front_mut() else {
                break;
            };
            let size = aggressor.remaining.min(front.remaining);
            front.fill(size);
            aggressor.fill(size);
            self.volume -= size;
            fills.push(LevelFill {
                resting: front.clone(),
                price: self.price,
                size,
            });
            if front.is_filled() {
                self.orders.pop_front();
            }
        }
        fills
    }

    // share_i = floor(S * v_i / V), leftover units handed out from the front of the queue.
    fn fill_pro_rata(&mut self, aggressor: &mut Order) -> Vec<LevelFill> {
        let total = self.volume as u128;
        let wanted = aggressor.remaining;
        let mut shares: Vec<u64> = self
            .orders
            .iter()
            .map(|o| ((wanted as u128 * o.remaining as u128) / total) as u64)
            .collect();

        let mut leftover = wanted - shares.iter().sum::<u64>();
        for (share, order) in shares.iter_mut().zip(self.orders.iter()) {
            if leftover == 0 {
                break;
            }
            let extra = leftover.min(order.remaining - *share);
            *share += extra;
            leftover -= extra;
        }

        let mut fills = Vec::new();
        for (order, size) in self.orders.iter_mut().zip(shares) {
            if size == 0 {
                continue;
            }
            order.fill(size);
            aggressor.fill(size);
            self.volume -= size;
            fills.push(LevelFill {
                resting: order.clone(),
                price: self.price,
                size,
            });
        }
        self.orders.retain(|o| !o.is_filled());
        fills
    }
}
