//! Margin levels for one position.
//!
//! Maintenance is what closing the position out right now would cost plus a
//! risk buffer on the notional:
//!
//! ```text
//! maintenance = ceil(max(0, slippage) * closeable_volume + |size| * factor * mark)
//! ```
//!
//! The other three levels scale maintenance and are floored.

use super::model::RiskFactor;
use super::RiskError;
use crate::matching::MatchingEngine;
use crate::types::{Price, Side};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingFactors {
    pub search: Decimal,
    pub initial: Decimal,
    pub release: Decimal,
}

impl Default for ScalingFactors {
    fn default() -> Self {
        Self {
            search: dec!(1.1),
            initial: dec!(1.2),
            release: dec!(1.4),
        }
    }
}

impl ScalingFactors {
    pub fn validate(&self) -> Result<(), RiskError> {
        let ordered = self.release >= self.initial
            && self.initial > self.search
            && self.search >= Decimal::ONE;
        if !ordered {
            return Err(RiskError::InvalidScalingFactors {
                search: self.search,
                initial: self.initial,
                release: self.release,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginLevels {
    pub maintenance: u64,
    pub search: u64,
    pub initial: u64,
    pub release: u64,
}

pub fn margin_levels(
    size: i64,
    mark: Price,
    book: &dyn MatchingEngine,
    factor: &RiskFactor,
    scaling: &ScalingFactors,
) -> Result<MarginLevels, RiskError> {
    if size == 0 {
        return Ok(MarginLevels::default());
    }

    let volume = size.unsigned_abs();
    let mark_value = mark.value() as i128;
    // a long exits by hitting bids, a short by lifting asks
    let (exit_side, rf) = if size > 0 {
        (Side::Buy, factor.long)
    } else {
        (Side::Sell, factor.short)
    };

    let closeout_pnl: u128 = match book.closeout_price(volume, exit_side) {
        Some(exit) => {
            let exit_value = exit.price.value() as i128;
            let slippage = if size > 0 {
                mark_value - exit_value
            } else {
                exit_value - mark_value
            };
            slippage.max(0) as u128 * exit.volume as u128
        }
        None => 0,
    };

    let buffer = Decimal::from(volume)
        .checked_mul(rf)
        .and_then(|v| v.checked_mul(Decimal::from(mark.value())))
        .ok_or(RiskError::MarginOverflow)?;
    let closeout = Decimal::from_u128(closeout_pnl).ok_or(RiskError::MarginOverflow)?;
    let maintenance_dec = closeout
        .checked_add(buffer)
        .ok_or(RiskError::MarginOverflow)?
        .ceil();

    let maintenance = maintenance_dec.to_u64().ok_or(RiskError::MarginOverflow)?;
    let scaled = |f: Decimal| {
        maintenance_dec
            .checked_mul(f)
            .and_then(|v| v.floor().to_u64())
            .ok_or(RiskError::MarginOverflow)
    };

    Ok(MarginLevels {
        maintenance,
        search: scaled(scaling.search)?,
        initial: scaled(scaling.initial)?,
        release: scaled(scaling.release)?,
    })
}
