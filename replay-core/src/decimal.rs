//! C1: decimal rounding utilities and max-quantity search.
//!
//! Monetary and P&L arithmetic is done entirely in `rust_decimal::Decimal`
//! to avoid the binary-float drift that would otherwise show up as
//! off-by-a-cent failures when closing positions (spec.md §4.1).

use crate::commission::Commission;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round `value` to `precision` fractional digits using round-half-to-even
/// (banker's rounding), as spec.md §4.1 requires for quantities.
pub fn round_precision(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::MidpointNearestEven)
}

/// Largest quantity `q` (rounded down to `precision`) such that
/// `q * price + commission(q) <= balance`.
///
/// The unrounded root is obtained in closed form from
/// [`Commission::max_affordable_quantity`] — both shipped broker models
/// (§4.2) solve it directly rather than searching. This function only
/// rounds that root down to `precision` and re-checks the constraint, since
/// rounding can only move `q` in a direction that keeps it feasible when
/// the cost function is non-decreasing in quantity, which holds for every
/// model here.
pub fn calculate_max_quantity(
    balance: Decimal,
    price: Decimal,
    commission: &dyn Commission,
    precision: u32,
) -> Decimal {
    if price <= Decimal::ZERO || balance <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let root = commission.max_affordable_quantity(balance, price);
    let mut q = round_down(root.max(Decimal::ZERO), precision);

    // Rounding is exact arithmetic on the closed-form root, but guard against
    // representable-precision edge cases (e.g. a root that rounds up to a
    // value whose own fee no longer fits) by stepping down until it holds.
    let step = Decimal::new(1, precision);
    while q > Decimal::ZERO && q * price + commission.calculate(q) > balance {
        q -= step;
    }

    q
}

fn round_down(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::ToZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::{Commission, TieredBrokerCommission, ZeroCommission};
    use rust_decimal_macros::dec;

    #[test]
    fn round_half_to_even_rounds_to_nearest_even() {
        assert_eq!(round_precision(dec!(1.25), 1), dec!(1.2));
        assert_eq!(round_precision(dec!(1.35), 1), dec!(1.4));
        assert_eq!(round_precision(dec!(1.05), 1), dec!(1.0));
    }

    #[test]
    fn max_quantity_with_zero_commission() {
        let q = calculate_max_quantity(dec!(1000), dec!(50), &ZeroCommission, 0);
        assert_eq!(q, dec!(20));
    }

    #[test]
    fn max_quantity_respects_precision() {
        let q = calculate_max_quantity(dec!(1000), dec!(33), &ZeroCommission, 1);
        assert!(q * dec!(33) <= dec!(1000));
        assert_eq!(q.scale(), 1);
    }

    #[test]
    fn max_quantity_zero_balance_is_zero() {
        let q = calculate_max_quantity(dec!(0), dec!(50), &ZeroCommission, 0);
        assert_eq!(q, Decimal::ZERO);
    }

    // Small order: the flat-minimum-fee regime binds (q well below the
    // per_share/minimum breakpoint of 100 shares).
    #[test]
    fn max_quantity_tiered_commission_flat_regime() {
        let c = TieredBrokerCommission::default();
        let q = calculate_max_quantity(dec!(1000), dec!(50), &c, 0);
        assert!(q * dec!(50) + c.calculate(q) <= dec!(1000));
        assert!((q + Decimal::ONE) * dec!(50) + c.calculate(q + Decimal::ONE) > dec!(1000));
    }

    // Large order: the linear per-share regime binds (q well above the
    // breakpoint).
    #[test]
    fn max_quantity_tiered_commission_linear_regime() {
        let c = TieredBrokerCommission::default();
        let q = calculate_max_quantity(dec!(100_000), dec!(100), &c, 0);
        assert!(q > dec!(100)); // past the per_share/minimum breakpoint
        assert!(q * dec!(100) + c.calculate(q) <= dec!(100_000));
        assert!((q + Decimal::ONE) * dec!(100) + c.calculate(q + Decimal::ONE) > dec!(100_000));
    }
}
