// Amount and stop-loss/take-profit quantization
//
// Pure functions over rust_decimal, no I/O. Percentages are in percent units
// (5 means 5%).

use rust_decimal::Decimal;

use crate::error::SizingError;
use crate::models::{MarketRules, Position, Side};

/// Which protective level a price has crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StopHit,
    TakeHit,
}

/// Absolute protective prices for a new position
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StopTake {
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

fn check_step(step: Decimal) -> Result<(), SizingError> {
    if step <= Decimal::ZERO {
        return Err(SizingError::InvalidStep(step));
    }
    Ok(())
}

/// Number of whole steps in `value`, rounded by `round`
fn steps(
    value: Decimal,
    step: Decimal,
    round: fn(&Decimal) -> Decimal,
    what: &'static str,
) -> Result<Decimal, SizingError> {
    check_step(step)?;
    let count = value.checked_div(step).ok_or(SizingError::Overflow(what))?;
    round(&count)
        .checked_mul(step)
        .ok_or(SizingError::Overflow(what))
}

/// Round `value` down to a multiple of `step`
pub fn round_down(value: Decimal, step: Decimal) -> Result<Decimal, SizingError> {
    steps(value, step, Decimal::floor, "price")
}

/// Round `value` up to a multiple of `step`
pub fn round_up(value: Decimal, step: Decimal) -> Result<Decimal, SizingError> {
    steps(value, step, Decimal::ceil, "price")
}

/// Truncate `requested` toward zero to the amount step and enforce the minimum
///
/// Idempotent: an amount that is already a multiple of `step` comes back unchanged.
pub fn quantize_amount(
    requested: Decimal,
    step: Decimal,
    minimum: Decimal,
) -> Result<Decimal, SizingError> {
    let amount = steps(requested, step, Decimal::trunc, "amount")?.normalize();

    if amount < minimum || amount <= Decimal::ZERO {
        return Err(SizingError::BelowMinimum { amount, minimum });
    }

    Ok(amount)
}

/// Convert percentage stop-loss/take-profit into exchange-legal prices
///
/// Long: stop rounds down, take rounds up. Short: stop rounds up, take rounds
/// down. Quantization therefore never hands the trader a better stop or a
/// closer take than the nominal percentage. A zero percentage disables that leg.
pub fn compute_stop_take(
    entry_price: Decimal,
    side: Side,
    stop_pct: Decimal,
    take_pct: Decimal,
    price_step: Decimal,
) -> Result<StopTake, SizingError> {
    check_step(price_step)?;
    if entry_price <= Decimal::ZERO {
        return Err(SizingError::MissingPrice);
    }

    let stop_loss = if stop_pct > Decimal::ZERO {
        Some(match side {
            Side::Long => round_down(scale(entry_price, stop_pct, false)?, price_step)?,
            Side::Short => round_up(scale(entry_price, stop_pct, true)?, price_step)?,
        })
    } else {
        None
    };

    let take_profit = if take_pct > Decimal::ZERO {
        Some(match side {
            Side::Long => round_up(scale(entry_price, take_pct, true)?, price_step)?,
            Side::Short => round_down(scale(entry_price, take_pct, false)?, price_step)?,
        })
    } else {
        None
    };

    for level in [stop_loss, take_profit].into_iter().flatten() {
        if level <= Decimal::ZERO {
            return Err(SizingError::NonPositiveLevel(level));
        }
    }

    Ok(StopTake {
        stop_loss,
        take_profit,
    })
}

/// `price * (1 ± pct/100)`
fn scale(price: Decimal, pct: Decimal, up: bool) -> Result<Decimal, SizingError> {
    let frac = pct
        .checked_div(Decimal::ONE_HUNDRED)
        .ok_or(SizingError::Overflow("percentage"))?;
    let factor = if up {
        Decimal::ONE.checked_add(frac)
    } else {
        Decimal::ONE.checked_sub(frac)
    };
    factor
        .and_then(|f| price.checked_mul(f))
        .ok_or(SizingError::Overflow("price level"))
}

/// Check whether the current price crossed the position's stop or take level
///
/// The stop is evaluated first.
pub fn check_trigger(position: &Position, current_price: Decimal) -> Option<Trigger> {
    let stop_hit = position.stop_loss.is_some_and(|stop| match position.side {
        Side::Long => current_price <= stop,
        Side::Short => current_price >= stop,
    });
    if stop_hit {
        return Some(Trigger::StopHit);
    }

    let take_hit = position.take_profit.is_some_and(|take| match position.side {
        Side::Long => current_price >= take,
        Side::Short => current_price <= take,
    });
    if take_hit {
        return Some(Trigger::TakeHit);
    }

    None
}

/// Unrealized PnL in percent of entry price (unleveraged)
pub fn unrealized_pnl_pct(position: &Position, current_price: Decimal) -> Option<Decimal> {
    if position.entry_price <= Decimal::ZERO {
        return None;
    }

    let diff = match position.side {
        Side::Long => current_price - position.entry_price,
        Side::Short => position.entry_price - current_price,
    };

    diff.checked_div(position.entry_price)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// Sizer bound to one market's trading rules
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    rules: MarketRules,
}

impl PositionSizer {
    /// Validate the market rules and build a sizer
    pub fn new(rules: MarketRules) -> Result<Self, SizingError> {
        check_step(rules.price_step)?;
        check_step(rules.amount_step)?;
        Ok(Self { rules })
    }

    pub fn quantize_amount(&self, requested: Decimal) -> Result<Decimal, SizingError> {
        quantize_amount(requested, self.rules.amount_step, self.rules.min_amount)
    }

    pub fn stop_take(
        &self,
        entry_price: Decimal,
        side: Side,
        stop_pct: Decimal,
        take_pct: Decimal,
    ) -> Result<StopTake, SizingError> {
        compute_stop_take(entry_price, side, stop_pct, take_pct, self.rules.price_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn position(side: Side, stop: Option<&str>, take: Option<&str>) -> Position {
        Position {
            symbol: "XRP_USDT".to_string(),
            side,
            size: d("100"),
            entry_price: d("0.50"),
            stop_loss: stop.map(d),
            take_profit: take.map(d),
            order_id: "1".to_string(),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn test_long_stop_take_scenario() {
        let st = compute_stop_take(d("100.00"), Side::Long, d("5"), d("10"), d("0.01")).unwrap();
        assert_eq!(st.stop_loss, Some(d("95.00")));
        assert_eq!(st.take_profit, Some(d("110.00")));
    }

    #[test]
    fn test_short_stop_take_scenario() {
        let st =
            compute_stop_take(d("0.5000"), Side::Short, d("5"), d("10"), d("0.0001")).unwrap();
        assert_eq!(st.stop_loss, Some(d("0.5250")));
        assert_eq!(st.take_profit, Some(d("0.4500")));
    }

    #[test]
    fn test_rounding_biases_against_trader() {
        // 0.5123 * 0.95 = 0.486685, 0.5123 * 1.1 = 0.56353
        let long = compute_stop_take(d("0.5123"), Side::Long, d("5"), d("10"), d("0.001")).unwrap();
        assert_eq!(long.stop_loss, Some(d("0.486")));
        assert_eq!(long.take_profit, Some(d("0.564")));

        // 0.5123 * 1.05 = 0.537915, 0.5123 * 0.9 = 0.46107
        let short =
            compute_stop_take(d("0.5123"), Side::Short, d("5"), d("10"), d("0.001")).unwrap();
        assert_eq!(short.stop_loss, Some(d("0.538")));
        assert_eq!(short.take_profit, Some(d("0.461")));
    }

    #[test]
    fn test_stop_never_more_favorable_than_nominal() {
        let entries = ["0.3333", "1.2345", "99.99", "12345.678", "0.00071"];
        let pcts = ["0.05", "1", "2.5", "7.77", "33"];
        let steps = ["0.0001", "0.01", "0.5", "1"];

        for entry in entries {
            for pct in pcts {
                for step in steps {
                    let (entry, pct, step) = (d(entry), d(pct), d(step));
                    let frac = pct / Decimal::ONE_HUNDRED;

                    let long = compute_stop_take(entry, Side::Long, pct, pct, step).unwrap();
                    assert!(long.stop_loss.unwrap() <= entry * (Decimal::ONE - frac));
                    assert!(long.take_profit.unwrap() >= entry * (Decimal::ONE + frac));

                    let short = compute_stop_take(entry, Side::Short, pct, pct, step).unwrap();
                    assert!(short.stop_loss.unwrap() >= entry * (Decimal::ONE + frac));
                    assert!(short.take_profit.unwrap() <= entry * (Decimal::ONE - frac));
                }
            }
        }
    }

    #[test]
    fn test_zero_pct_disables_leg() {
        let st = compute_stop_take(d("100"), Side::Long, d("0"), d("10"), d("0.01")).unwrap();
        assert_eq!(st.stop_loss, None);
        assert_eq!(st.take_profit, Some(d("110")));

        let none = compute_stop_take(d("100"), Side::Short, d("0"), d("0"), d("0.01")).unwrap();
        assert_eq!(none, StopTake::default());
    }

    #[test]
    fn test_stop_take_requires_price_and_step() {
        assert_eq!(
            compute_stop_take(d("0"), Side::Long, d("5"), d("10"), d("0.01")),
            Err(SizingError::MissingPrice)
        );
        assert!(matches!(
            compute_stop_take(d("100"), Side::Long, d("5"), d("10"), d("0")),
            Err(SizingError::InvalidStep(_))
        ));
    }

    #[test]
    fn test_quantize_amount_truncates() {
        assert_eq!(quantize_amount(d("100.789"), d("0.1"), d("1")).unwrap(), d("100.7"));
        assert_eq!(quantize_amount(d("57"), d("10"), d("10")).unwrap(), d("50"));
    }

    #[test]
    fn test_quantize_amount_idempotent() {
        for (requested, step) in [("100.789", "0.1"), ("3.14159", "0.001"), ("57", "10")] {
            let once = quantize_amount(d(requested), d(step), d("0.001")).unwrap();
            let twice = quantize_amount(once, d(step), d("0.001")).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_quantize_amount_below_minimum() {
        let err = quantize_amount(d("0.95"), d("0.1"), d("1")).unwrap_err();
        assert_eq!(
            err,
            SizingError::BelowMinimum {
                amount: d("0.9"),
                minimum: d("1")
            }
        );
        assert!(quantize_amount(d("0.04"), d("0.1"), d("0")).is_err());
    }

    #[test]
    fn test_check_trigger_long() {
        let pos = position(Side::Long, Some("0.45"), Some("0.60"));
        assert_eq!(check_trigger(&pos, d("0.44")), Some(Trigger::StopHit));
        assert_eq!(check_trigger(&pos, d("0.45")), Some(Trigger::StopHit));
        assert_eq!(check_trigger(&pos, d("0.50")), None);
        assert_eq!(check_trigger(&pos, d("0.60")), Some(Trigger::TakeHit));
    }

    #[test]
    fn test_check_trigger_short() {
        let pos = position(Side::Short, Some("0.55"), Some("0.40"));
        assert_eq!(check_trigger(&pos, d("0.56")), Some(Trigger::StopHit));
        assert_eq!(check_trigger(&pos, d("0.45")), None);
        assert_eq!(check_trigger(&pos, d("0.39")), Some(Trigger::TakeHit));
    }

    #[test]
    fn test_check_trigger_stop_wins_when_both_hold() {
        // Degenerate levels where both conditions are true at once
        let pos = position(Side::Long, Some("0.60"), Some("0.40"));
        assert_eq!(check_trigger(&pos, d("0.50")), Some(Trigger::StopHit));
    }

    #[test]
    fn test_check_trigger_without_levels() {
        let pos = position(Side::Long, None, None);
        assert_eq!(check_trigger(&pos, d("0.01")), None);
        assert_eq!(check_trigger(&pos, d("100")), None);
    }

    #[test]
    fn test_unrealized_pnl_pct() {
        let long = position(Side::Long, None, None);
        assert_eq!(unrealized_pnl_pct(&long, d("0.55")), Some(d("10")));

        let short = position(Side::Short, None, None);
        assert_eq!(unrealized_pnl_pct(&short, d("0.55")), Some(d("-10")));

        let zero_entry = Position {
            entry_price: Decimal::ZERO,
            ..long
        };
        assert_eq!(unrealized_pnl_pct(&zero_entry, d("0.55")), None);
    }

    #[test]
    fn test_huge_amount_is_an_error_not_a_panic() {
        let huge = d("10000000000000000000000000");
        assert_eq!(
            quantize_amount(huge, d("0.0001"), d("1")),
            Err(SizingError::Overflow("amount"))
        );
        assert!(round_down(Decimal::MAX, d("0.5")).is_err());
    }

    #[test]
    fn test_huge_percentage_is_an_error_not_a_panic() {
        let pct = d("70000000000000000000000000000");
        assert!(matches!(
            compute_stop_take(d("0.5"), Side::Long, d("5"), pct, d("0.0001")),
            Err(SizingError::Overflow(_))
        ));
    }

    #[test]
    fn test_short_take_at_or_below_zero_rejected() {
        assert_eq!(
            compute_stop_take(d("0.5"), Side::Short, d("5"), d("100"), d("0.0001")),
            Err(SizingError::NonPositiveLevel(d("0")))
        );
        assert!(matches!(
            compute_stop_take(d("0.5"), Side::Short, d("5"), d("150"), d("0.0001")),
            Err(SizingError::NonPositiveLevel(_))
        ));
    }

    #[test]
    fn test_sizer_rejects_bad_rules() {
        let rules = MarketRules {
            price_step: d("0.0001"),
            amount_step: Decimal::ZERO,
            min_amount: d("1"),
        };
        assert!(PositionSizer::new(rules).is_err());
    }
}
