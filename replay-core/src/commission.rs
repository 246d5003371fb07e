//! C2: commission models — pure, deterministic quantity -> fee functions.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Capability: `fee = commission.calculate(quantity)`.
pub trait Commission: Send + Sync {
    fn calculate(&self, quantity: Decimal) -> Decimal;

    /// Largest (unrounded, possibly fractional) `q >= 0` such that
    /// `q * price + self.calculate(q) <= balance`.
    ///
    /// `calculate` is non-decreasing and piecewise-linear in quantity for
    /// every model this crate ships, so `q * price + calculate(q)` is itself
    /// non-decreasing in `q` and the feasible set is a single interval
    /// `[0, q_max]` — each concrete model below solves for `q_max` in closed
    /// form. The default here is a decimal bisection kept only as a fallback
    /// for a hypothetical third-party `Commission` impl with no known
    /// closed form; neither shipped model uses it.
    fn max_affordable_quantity(&self, balance: Decimal, price: Decimal) -> Decimal {
        if price <= Decimal::ZERO || balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let mut lo = Decimal::ZERO;
        let mut hi = balance / price;
        let fits = |q: Decimal| q * price + self.calculate(q) <= balance;
        if !fits(hi) {
            // Linear shrink: only reached by a non-shipped Commission impl.
            let mut step = hi / Decimal::from(1000);
            if step <= Decimal::ZERO {
                step = Decimal::new(1, 6);
            }
            while hi > Decimal::ZERO && !fits(hi) {
                hi -= step;
            }
        }
        for _ in 0..64 {
            let mid = (lo + hi) / Decimal::from(2);
            if fits(mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }
}

/// Always zero, regardless of quantity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroCommission;

impl Commission for ZeroCommission {
    fn calculate(&self, _quantity: Decimal) -> Decimal {
        Decimal::ZERO
    }

    /// No fee term, so the constraint collapses to `q * price <= balance`.
    fn max_affordable_quantity(&self, balance: Decimal, price: Decimal) -> Decimal {
        if price <= Decimal::ZERO || balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        balance / price
    }
}

/// Interactive-broker-style tiered model: a fixed per-share rate, with a
/// minimum fee per order and a cap expressed as a fraction of notional.
///
/// This exact table is implementation-fixed per spec.md §4.2 ("exact table
/// is implementation-fixed but MUST be pure and deterministic"); the figures
/// below ($0.0035/share, $0.35 minimum, 1% notional cap) are this crate's
/// concrete choice, recorded in DESIGN.md.
#[derive(Debug, Clone, Copy)]
pub struct TieredBrokerCommission {
    pub per_share: Decimal,
    pub minimum: Decimal,
    pub cap_fraction_of_notional: Decimal,
}

impl Default for TieredBrokerCommission {
    fn default() -> Self {
        Self {
            per_share: dec!(0.0035),
            minimum: dec!(0.35),
            cap_fraction_of_notional: dec!(0.01),
        }
    }
}

impl TieredBrokerCommission {
    /// Fee for a given quantity at a given execution price — needed because
    /// the notional cap is price-dependent. `Commission::calculate` alone
    /// (quantity only) cannot express the cap; callers that have a price
    /// should prefer this method. `calculate` falls back to the uncapped
    /// per-share fee, floored at the minimum.
    pub fn calculate_with_price(&self, quantity: Decimal, price: Decimal) -> Decimal {
        let uncapped = (self.per_share * quantity).max(self.minimum);
        let notional = quantity * price;
        let cap = notional * self.cap_fraction_of_notional;
        if cap > Decimal::ZERO {
            uncapped.min(cap).max(Decimal::ZERO)
        } else {
            uncapped
        }
    }
}

impl Commission for TieredBrokerCommission {
    fn calculate(&self, quantity: Decimal) -> Decimal {
        (self.per_share * quantity).max(self.minimum)
    }

    /// `calculate(q) = max(per_share * q, minimum)` is flat at `minimum` up
    /// to the breakpoint `q0 = minimum / per_share`, then linear above it.
    /// `q*price + calculate(q)` is therefore flat-then-linear too, so the
    /// feasible root sits in exactly one of the two regimes:
    ///
    /// - flat regime (`q <= q0`):   `q*price + minimum <= balance`
    ///                               => `q <= (balance - minimum) / price`
    /// - linear regime (`q > q0`):  `q*price + per_share*q <= balance`
    ///                               => `q <= balance / (price + per_share)`
    ///
    /// Whichever candidate lands on the correct side of `q0` is the answer;
    /// no search is needed.
    fn max_affordable_quantity(&self, balance: Decimal, price: Decimal) -> Decimal {
        if price <= Decimal::ZERO || balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        if self.per_share <= Decimal::ZERO {
            // Fee is a flat `minimum` for any positive quantity.
            return ((balance - self.minimum) / price).max(Decimal::ZERO);
        }
        let breakpoint = self.minimum / self.per_share;
        let flat_candidate = (balance - self.minimum) / price;
        if flat_candidate <= breakpoint {
            return flat_candidate.max(Decimal::ZERO);
        }
        (balance / (price + self.per_share)).max(Decimal::ZERO)
    }
}

/// `config.broker` selector. Unknown values fall back to `InteractiveBroker`
/// per spec.md §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    InteractiveBroker,
    Zero,
}

impl Default for BrokerKind {
    fn default() -> Self {
        BrokerKind::InteractiveBroker
    }
}

impl BrokerKind {
    pub fn from_config_str(s: &str) -> Self {
        match s {
            "zero" => BrokerKind::Zero,
            _ => BrokerKind::InteractiveBroker,
        }
    }

    pub fn build(self) -> Box<dyn Commission> {
        match self {
            BrokerKind::Zero => Box::new(ZeroCommission),
            BrokerKind::InteractiveBroker => Box::new(TieredBrokerCommission::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_commission_is_always_zero() {
        assert_eq!(ZeroCommission.calculate(dec!(1_000_000)), Decimal::ZERO);
    }

    #[test]
    fn tiered_commission_floors_at_minimum() {
        let c = TieredBrokerCommission::default();
        assert_eq!(c.calculate(dec!(1)), dec!(0.35));
    }

    #[test]
    fn tiered_commission_scales_per_share_above_minimum() {
        let c = TieredBrokerCommission::default();
        // 1000 shares * 0.0035 = 3.50, above the 0.35 minimum
        assert_eq!(c.calculate(dec!(1000)), dec!(3.5));
    }

    #[test]
    fn tiered_commission_caps_at_notional_fraction() {
        let c = TieredBrokerCommission::default();
        // 1 share @ $1: uncapped fee is the $0.35 minimum, but 1% of $1
        // notional is $0.01 — the cap binds.
        let fee = c.calculate_with_price(dec!(1), dec!(1));
        assert_eq!(fee, dec!(0.01));
    }

    #[test]
    fn unknown_broker_falls_back_to_interactive_broker() {
        assert_eq!(
            BrokerKind::from_config_str("nonsense"),
            BrokerKind::InteractiveBroker
        );
    }
}
