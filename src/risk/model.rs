//! Risk models produce the per-side fraction of notional a position must hold
//! as maintenance margin. Factors are computed once per model and cached by the
//! risk engine until the model is reconfigured.

use super::RiskError;
use crate::types::Asset;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub long: Decimal,
    pub short: Decimal,
}

pub trait Model: std::fmt::Debug + Send {
    fn risk_factor(&self, asset: &Asset) -> Result<RiskFactor, RiskError>;
}

/// Fixed factors, same for every asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleModel {
    pub long: Decimal,
    pub short: Decimal,
}

impl Default for SimpleModel {
    fn default() -> Self {
        Self {
            long: dec!(0.15),
            short: dec!(0.25),
        }
    }
}

impl Model for SimpleModel {
    fn risk_factor(&self, _asset: &Asset) -> Result<RiskFactor, RiskError> {
        if self.long < Decimal::ZERO || self.short < Decimal::ZERO {
            return Err(RiskError::InvalidModelParameters {
                reason: "simple factors must be non-negative".to_string(),
            });
        }
        Ok(RiskFactor {
            long: self.long,
            short: self.short,
        })
    }
}

/// Log-normal forward model over horizon `tau` (in years).
///
/// long  = 1 - exp((mu - sigma^2/2) * tau - z * sigma * sqrt(tau))
/// short = exp((mu - sigma^2/2) * tau + z * sigma * sqrt(tau)) - 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogNormalModel {
    pub tau: Decimal,
    pub mu: Decimal,
    pub sigma: Decimal,
    /// Quantile of the standard normal the margin must cover.
    pub z: Decimal,
}

impl LogNormalModel {
    fn invalid(reason: &str) -> RiskError {
        RiskError::InvalidModelParameters {
            reason: reason.to_string(),
        }
    }
}

impl Model for LogNormalModel {
    fn risk_factor(&self, _asset: &Asset) -> Result<RiskFactor, RiskError> {
        if self.tau <= Decimal::ZERO {
            return Err(Self::invalid("tau must be positive"));
        }
        if self.sigma < Decimal::ZERO || self.z < Decimal::ZERO {
            return Err(Self::invalid("sigma and z must be non-negative"));
        }

        let sqrt_tau = self.tau.sqrt().ok_or_else(|| Self::invalid("sqrt(tau) undefined"))?;
        let drift = (self.mu - self.sigma * self.sigma / dec!(2)) * self.tau;
        let shock = self.z * self.sigma * sqrt_tau;

        let down = (drift - shock)
            .checked_exp()
            .ok_or_else(|| Self::invalid("exp overflow"))?;
        let up = (drift + shock)
            .checked_exp()
            .ok_or_else(|| Self::invalid("exp overflow"))?;

        let long = Decimal::ONE - down;
        let short = up - Decimal::ONE;
        if long < Decimal::ZERO || short < Decimal::ZERO {
            return Err(Self::invalid("drift dominates volatility, factor would be negative"));
        }
        Ok(RiskFactor { long, short })
    }
}

/// Serializable selector for the model a market runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskModelConfig {
    Simple(SimpleModel),
    LogNormal(LogNormalModel),
}

impl Default for RiskModelConfig {
    fn default() -> Self {
        RiskModelConfig::Simple(SimpleModel::default())
    }
}

impl RiskModelConfig {
    pub fn build(&self) -> Result<Box<dyn Model>, RiskError> {
        let model: Box<dyn Model> = match *self {
            RiskModelConfig::Simple(m) => Box::new(m),
            RiskModelConfig::LogNormal(m) => Box::new(m),
        };
        // reject bad parameters up front rather than on the first margin pass
        model.risk_factor(&Asset::from(""))?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_defaults() {
        let f = SimpleModel::default().risk_factor(&Asset::from("USD")).unwrap();
        assert_eq!(f.long, dec!(0.15));
        assert_eq!(f.short, dec!(0.25));
    }

    #[test]
    fn log_normal_factors() {
        let model = LogNormalModel {
            tau: dec!(1),
            mu: dec!(0),
            sigma: dec!(0.1),
            z: dec!(2),
        };
        let f = model.risk_factor(&Asset::from("USD")).unwrap();
        // 1 - e^-0.205 and e^0.195 - 1
        assert!(f.long > dec!(0.1853) && f.long < dec!(0.1854), "{}", f.long);
        assert!(f.short > dec!(0.2153) && f.short < dec!(0.2154), "{}", f.short);
        assert!(f.short > f.long);
    }

    #[test]
    fn log_normal_without_volatility_needs_nothing() {
        let model = LogNormalModel {
            tau: dec!(0.25),
            mu: dec!(0),
            sigma: dec!(0),
            z: dec!(3),
        };
        let f = model.risk_factor(&Asset::from("USD")).unwrap();
        assert_eq!(f.long, Decimal::ZERO);
        assert_eq!(f.short, Decimal::ZERO);
    }

    #[test]
    fn log_normal_rejects_bad_horizon() {
        let cfg = RiskModelConfig::LogNormal(LogNormalModel {
            tau: dec!(0),
            mu: dec!(0),
            sigma: dec!(0.5),
            z: dec!(2),
        });
        assert!(matches!(cfg.build(), Err(RiskError::InvalidModelParameters { .. })));
    }
}
