use sigex_types::{Direction, Signal};

/// Entry price adjusted for slippage+fee. `slippage`/`fee` are
/// percentages (e.g. `0.1` means 0.1%).
pub fn adjusted_open(direction: Direction, price_open: f64, slippage: f64, fee: f64) -> f64 {
    price_open * (1.0 + direction.sign() * (slippage + fee) / 100.0)
}

/// Exit price adjusted for slippage+fee.
pub fn adjusted_close(direction: Direction, price_close: f64, slippage: f64, fee: f64) -> f64 {
    price_close * (1.0 - direction.sign() * (slippage + fee) / 100.0)
}

/// Cost-adjusted PnL percentage for one open/close pair.
pub fn pnl_percent(
    direction: Direction,
    price_open: f64,
    price_close: f64,
    slippage: f64,
    fee: f64,
) -> f64 {
    let open_adj = adjusted_open(direction, price_open, slippage, fee);
    let close_adj = adjusted_close(direction, price_close, slippage, fee);
    (close_adj - open_adj) / open_adj * 100.0 * direction.sign()
}

/// Raw (cost-unadjusted) percentage move from entry, signed so a favorable
/// move is always positive regardless of direction. Used for partial-level
/// milestone bucketing and the breakeven threshold check,
/// which key off market movement rather than realized economics.
pub fn raw_move_percent(direction: Direction, price_open: f64, price_close: f64) -> f64 {
    (price_close - price_open) / price_open * 100.0 * direction.sign()
}

/// Weighted realized PnL across a signal's partial-close log plus whatever
/// percent remains open, priced at `final_price`. Called both to
/// compute the PnL reported on an actual close, and to project an
/// unrealized PnL for an `Active` tick result (in which case `final_price`
/// is the current VWAP, not a real exit).
pub fn weighted_realized_pnl(signal: &Signal, final_price: f64, slippage: f64, fee: f64) -> f64 {
    let mut acc = 0.0;
    for entry in &signal.partial_log {
        let slice_pnl = pnl_percent(
            signal.direction,
            signal.price_open,
            entry.price,
            slippage,
            fee,
        );
        acc += entry.percent / 100.0 * slice_pnl;
    }
    let remaining = (100.0 - signal.total_closed()).max(0.0);
    let final_pnl = pnl_percent(
        signal.direction,
        signal.price_open,
        final_price,
        slippage,
        fee,
    );
    acc += remaining / 100.0 * final_pnl;
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigex_types::{PartialKind, SignalContext, SignalDto};

    fn long_signal(entry: f64) -> Signal {
        let ctx = SignalContext::new("BTCUSDT", "trend", "paper", "", "default");
        let dto = SignalDto {
            direction: Direction::Long,
            price_open: None,
            price_take_profit: entry * 1.04,
            price_stop_loss: entry * 0.98,
            minute_estimated_time: 60,
            note: None,
            id: None,
        };
        Signal::new(ctx, &dto, Utc::now(), entry)
    }

    #[test]
    fn immediate_long_hits_take_profit_scenario() {
        // entry 50000, TP 52000, 0.1% slip + 0.1% fee per side -> ~+3.6%
        // after the haircut on a raw +4% move.
        let pnl = pnl_percent(Direction::Long, 50000.0, 52000.0, 0.1, 0.1);
        assert!((pnl - 3.6).abs() < 0.1, "pnl was {pnl}");
    }

    #[test]
    fn short_profits_on_price_drop() {
        let pnl = pnl_percent(Direction::Short, 50000.0, 48000.0, 0.1, 0.1);
        assert!(pnl > 0.0, "pnl was {pnl}");
    }

    #[test]
    fn zero_cost_round_trip_matches_raw_move() {
        let pnl = pnl_percent(Direction::Long, 100.0, 110.0, 0.0, 0.0);
        assert!((pnl - 10.0).abs() < 1e-9);
    }

    #[test]
    fn raw_move_ignores_costs() {
        let raw = raw_move_percent(Direction::Long, 50000.0, 55000.0);
        assert!((raw - 10.0).abs() < 1e-9);
    }

    #[test]
    fn raw_move_is_negative_against_a_long() {
        let raw = raw_move_percent(Direction::Long, 100.0, 95.0);
        assert!((raw + 5.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_pnl_with_no_partials_equals_single_close() {
        let signal = long_signal(50000.0);
        let weighted = weighted_realized_pnl(&signal, 52000.0, 0.1, 0.1);
        let direct = pnl_percent(Direction::Long, 50000.0, 52000.0, 0.1, 0.1);
        assert!((weighted - direct).abs() < 1e-9);
    }

    #[test]
    fn weighted_pnl_blends_partial_and_remaining_legs() {
        let mut signal = long_signal(50000.0);
        signal
            .append_partial(PartialKind::Profit, 50.0, 53000.0)
            .unwrap();
        let weighted = weighted_realized_pnl(&signal, 55000.0, 0.1, 0.1);
        let leg_a = pnl_percent(Direction::Long, 50000.0, 53000.0, 0.1, 0.1) * 0.5;
        let leg_b = pnl_percent(Direction::Long, 50000.0, 55000.0, 0.1, 0.1) * 0.5;
        assert!((weighted - (leg_a + leg_b)).abs() < 1e-9);
    }
}
