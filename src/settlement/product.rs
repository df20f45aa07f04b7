// 6.1 settlement/product.rs: the instrument being settled. cash-settled futures for now.

use super::SettlementError;
use crate::transfer::FinancialAmount;
use crate::types::{Asset, Price, Timestamp};
use serde::{Deserialize, Serialize};

/// Supplied by the instrument layer. Must be a pure function of its inputs.
pub trait Product: std::fmt::Debug + Send {
    /// Value owed to a holder of `size` entered at `entry_price`. Negative means the holder pays.
    fn settle(&self, entry_price: Price, size: i64) -> Result<FinancialAmount, SettlementError>;
    fn asset(&self) -> &Asset;
    fn set_settlement_price(&mut self, price: Price);
}

/// (final - entry) * size, paid in the settlement asset at maturity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Future {
    pub asset: Asset,
    pub maturity: Timestamp,
    pub settlement_price: Option<Price>,
}

impl Future {
    pub fn new(asset: Asset, maturity: Timestamp) -> Self {
        Self {
            asset,
            maturity,
            settlement_price: None,
        }
    }

    pub fn with_settlement_price(mut self, price: Price) -> Self {
        self.settlement_price = Some(price);
        self
    }
}

impl Product for Future {
    fn settle(&self, entry_price: Price, size: i64) -> Result<FinancialAmount, SettlementError> {
        let final_price = self
            .settlement_price
            .ok_or(SettlementError::SettlementPriceMissing)?;
        let per_unit = final_price.value() as i128 - entry_price.value() as i128;
        let amount = i64::try_from(per_unit * size as i128)
            .map_err(|_| SettlementError::AmountOverflow)?;
        Ok(FinancialAmount::new(self.asset.clone(), amount))
    }

    fn asset(&self) -> &Asset {
        &self.asset
    }

    /// Final price pushed by the oracle layer.
    fn set_settlement_price(&mut self, price: Price) {
        self.settlement_price = Some(price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn future_pays_price_difference_times_size() {
        let fut = Future::new(Asset::from("USD"), Timestamp::from_secs(100))
            .with_settlement_price(Price::new_unchecked(120));

        let long = fut.settle(Price::new_unchecked(100), 3).unwrap();
        assert_eq!(long.amount, 60);

        let short = fut.settle(Price::new_unchecked(100), -3).unwrap();
        assert_eq!(short.amount, -60);
    }

    #[test]
    fn future_without_final_price_refuses_to_settle() {
        let fut = Future::new(Asset::from("USD"), Timestamp::from_secs(100));
        assert_eq!(
            fut.settle(Price::new_unchecked(100), 1),
            Err(SettlementError::SettlementPriceMissing)
        );
    }
}
