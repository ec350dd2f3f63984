use sigex_types::{Direction, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingKind {
    StopLoss,
    TakeProfit,
}

/// Why a trailing SL/TP update was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingRejection {
    /// Not first call, and the candidate level does not improve protection
    /// (SL) or conservatism (TP) over the current effective level.
    NotMoreProtective,
    /// The candidate has already been crossed by `currentPrice`.
    PriceIntrusion,
    /// The candidate would sit at or past entry — breakeven has its own API.
    CrossesEntry,
}

impl std::fmt::Display for TrailingRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            TrailingRejection::NotMoreProtective => {
                "candidate does not improve on the current effective level"
            }
            TrailingRejection::PriceIntrusion => {
                "candidate has already been crossed by the current price"
            }
            TrailingRejection::CrossesEntry => "candidate would sit at or past entry",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for TrailingRejection {}

/// Candidate level for a percent-shift, always computed relative to the
/// *original* SL/TP distance.
///
/// `percent_shift` is a signed delta, in percentage points, of that original
/// distance expressed as a percent of the entry price — e.g. an original
/// distance of 10% of entry with `percent_shift = -5` tightens the distance
/// to 5% of entry. This is the reading that matches the worked example
/// (entry=100, original SL=90, `trailingStop(-5)` -> effective SL=95): a
/// literal percent-of-original-distance multiplier
/// (`distance * (1 + shift/100)`) does not reproduce that result, so the
/// effective-level monotonicity rule (protect more / be more conservative)
/// is treated as authoritative and this additive-percentage-point reading
/// is the one implemented; see DESIGN.md.
fn candidate_level(signal: &Signal, kind: TrailingKind, percent_shift: f64) -> Option<f64> {
    let entry = signal.price_open;
    let (original_level, sign_long_favorable) = match kind {
        TrailingKind::StopLoss => (signal.original_stop_loss, -1.0),
        TrailingKind::TakeProfit => (signal.original_take_profit, 1.0),
    };
    let original_distance_percent = ((original_level - entry).abs() / entry) * 100.0;
    let new_distance_percent = original_distance_percent + percent_shift;
    if new_distance_percent <= 0.0 {
        return None;
    }
    let delta = entry * new_distance_percent / 100.0;
    let directional_sign = sign_long_favorable * signal.direction.sign();
    Some(entry + directional_sign * delta)
}

/// Applies a trailing SL/TP shift to `signal`, enforcing the monotonicity,
/// price-intrusion, and entry-crossing invariants. On success,
/// mutates `signal`'s trailing field and returns the new effective level.
pub fn apply_trailing(
    signal: &mut Signal,
    kind: TrailingKind,
    percent_shift: f64,
    current_price: f64,
) -> Result<f64, TrailingRejection> {
    let candidate =
        candidate_level(signal, kind, percent_shift).ok_or(TrailingRejection::CrossesEntry)?;

    let intruded = match (kind, signal.direction) {
        (TrailingKind::StopLoss, Direction::Long) => candidate >= current_price,
        (TrailingKind::StopLoss, Direction::Short) => candidate <= current_price,
        (TrailingKind::TakeProfit, Direction::Long) => candidate <= current_price,
        (TrailingKind::TakeProfit, Direction::Short) => candidate >= current_price,
    };
    if intruded {
        return Err(TrailingRejection::PriceIntrusion);
    }

    let existing = match kind {
        TrailingKind::StopLoss => signal.trailing_stop_loss,
        TrailingKind::TakeProfit => signal.trailing_take_profit,
    };

    if let Some(current_effective) = existing {
        let improves = match (kind, signal.direction) {
            (TrailingKind::StopLoss, Direction::Long) => candidate > current_effective,
            (TrailingKind::StopLoss, Direction::Short) => candidate < current_effective,
            (TrailingKind::TakeProfit, Direction::Long) => candidate < current_effective,
            (TrailingKind::TakeProfit, Direction::Short) => candidate > current_effective,
        };
        if !improves {
            return Err(TrailingRejection::NotMoreProtective);
        }
    }

    match kind {
        TrailingKind::StopLoss => signal.trailing_stop_loss = Some(candidate),
        TrailingKind::TakeProfit => signal.trailing_take_profit = Some(candidate),
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigex_types::{SignalContext, SignalDto};

    fn long_signal(entry: f64, sl: f64, tp: f64) -> Signal {
        let ctx = SignalContext::new("BTCUSDT", "trend", "paper", "", "default");
        let dto = SignalDto {
            direction: Direction::Long,
            price_open: None,
            price_take_profit: tp,
            price_stop_loss: sl,
            minute_estimated_time: 60,
            note: None,
            id: None,
        };
        Signal::new(ctx, &dto, Utc::now(), entry)
    }

    /// A larger absolute tighten absorbs a smaller one, and vice versa.
    #[test]
    fn trailing_sl_absorption_scenario() {
        let mut s = long_signal(100.0, 90.0, 999.0);

        let level = apply_trailing(&mut s, TrailingKind::StopLoss, -5.0, 102.0).unwrap();
        assert!((level - 95.0).abs() < 1e-9);

        let rejected = apply_trailing(&mut s, TrailingKind::StopLoss, -3.0, 102.0);
        assert_eq!(rejected, Err(TrailingRejection::NotMoreProtective));
        assert!((s.effective_stop_loss() - 95.0).abs() < 1e-9);

        let level = apply_trailing(&mut s, TrailingKind::StopLoss, -7.0, 102.0).unwrap();
        assert!((level - 97.0).abs() < 1e-9);
    }

    #[test]
    fn first_call_always_accepted() {
        let mut s = long_signal(100.0, 90.0, 120.0);
        assert!(apply_trailing(&mut s, TrailingKind::StopLoss, -1.0, 150.0).is_ok());
    }

    #[test]
    fn price_intrusion_rejected() {
        let mut s = long_signal(100.0, 90.0, 120.0);
        // candidate would be 99 (distance shrunk to 1%), but price already at 98.
        let result = apply_trailing(&mut s, TrailingKind::StopLoss, -9.0, 98.0);
        assert_eq!(result, Err(TrailingRejection::PriceIntrusion));
    }

    #[test]
    fn shift_that_reaches_entry_is_rejected() {
        let mut s = long_signal(100.0, 90.0, 120.0);
        // original distance 10%, shift of -10 would zero the distance out.
        let result = apply_trailing(&mut s, TrailingKind::StopLoss, -10.0, 150.0);
        assert_eq!(result, Err(TrailingRejection::CrossesEntry));
    }

    #[test]
    fn short_sl_monotonicity_is_mirrored() {
        let ctx = SignalContext::new("BTCUSDT", "trend", "paper", "", "default");
        let dto = SignalDto {
            direction: Direction::Short,
            price_open: None,
            price_take_profit: 80.0,
            price_stop_loss: 110.0,
            minute_estimated_time: 60,
            note: None,
            id: None,
        };
        let mut s = Signal::new(ctx, &dto, Utc::now(), 100.0);
        let level = apply_trailing(&mut s, TrailingKind::StopLoss, -5.0, 98.0).unwrap();
        assert!((level - 105.0).abs() < 1e-9);
        // tightening further (more negative shift) is a smaller SL for a short
        let level = apply_trailing(&mut s, TrailingKind::StopLoss, -7.0, 98.0).unwrap();
        assert!((level - 103.0).abs() < 1e-9);
    }

    #[test]
    fn trailing_tp_monotonicity_for_long() {
        let mut s = long_signal(100.0, 90.0, 120.0);
        // original TP distance is 20%; shift -5 tightens it to 15%.
        let level = apply_trailing(&mut s, TrailingKind::TakeProfit, -5.0, 110.0).unwrap();
        assert!((level - 115.0).abs() < 1e-9);
        // a less-conservative shift is rejected.
        let result = apply_trailing(&mut s, TrailingKind::TakeProfit, -2.0, 110.0);
        assert_eq!(result, Err(TrailingRejection::NotMoreProtective));
    }
}
