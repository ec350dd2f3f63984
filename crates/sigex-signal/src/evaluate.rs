use sigex_types::{Direction, Signal};

/// `true` once `current_price` has reached or passed the effective take
/// profit level.
pub fn tp_crossed(signal: &Signal, current_price: f64) -> bool {
    let level = signal.effective_take_profit();
    match signal.direction {
        Direction::Long => current_price >= level,
        Direction::Short => current_price <= level,
    }
}

/// `true` once `current_price` has reached or passed the effective stop
/// loss level.
pub fn sl_crossed(signal: &Signal, current_price: f64) -> bool {
    let level = signal.effective_stop_loss();
    match signal.direction {
        Direction::Long => current_price <= level,
        Direction::Short => current_price >= level,
    }
}

/// `true` once a scheduled signal's entry price has been reached by VWAP —
/// the same price notion the pending-signal TP/SL checks and the
/// pre-activation SL-reject check use, so every price comparison on a
/// signal agrees on what "price" means.
pub fn entry_reached(signal: &Signal, current_price: f64) -> bool {
    match signal.direction {
        Direction::Long => current_price <= signal.price_open,
        Direction::Short => current_price >= signal.price_open,
    }
}

/// Progress toward the take-profit target, as a percent in `[0, 100+]`,
/// used for the `Active` tick result's `progress_percent` field.
/// Measures distance traveled from entry toward TP relative to the total
/// entry-to-TP distance; can exceed 100 if price has overshot TP without
/// yet being observed as crossed (not expected in practice since tp_crossed
/// is checked first, but the formula is kept monotonic rather than clamped
/// so callers can tell overshoot apart from exact completion).
pub fn progress_percent(signal: &Signal, current_price: f64) -> f64 {
    let entry = signal.price_open;
    let target = signal.effective_take_profit();
    let total_distance = (target - entry).abs();
    if total_distance <= 0.0 {
        return 0.0;
    }
    let traveled = (current_price - entry) * signal.direction.sign();
    (traveled / total_distance * 100.0).max(0.0)
}
