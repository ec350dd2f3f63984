use sigex_types::{Direction, PartialCloseError, PartialKind, Signal};

/// Why `partial_profit`/`partial_loss` refused a close. Distinct
/// from [`PartialCloseError`] (which only knows about the signal's own
/// percent-accounting invariant): this layer adds the lifecycle and
/// price-direction checks that need the machine's view of the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialCloseRejection {
    /// Signal is still `Scheduled`, not yet `Opened`.
    StillScheduled,
    /// `price` is not favorable (profit) or adverse (loss) relative to entry.
    WrongDirection,
    Accounting(PartialCloseError),
}

impl std::fmt::Display for PartialCloseRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartialCloseRejection::StillScheduled => {
                write!(f, "signal has not activated yet")
            }
            PartialCloseRejection::WrongDirection => {
                write!(
                    f,
                    "price is not in the required direction for this partial close"
                )
            }
            PartialCloseRejection::Accounting(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PartialCloseRejection {}

impl From<PartialCloseError> for PartialCloseRejection {
    fn from(e: PartialCloseError) -> Self {
        PartialCloseRejection::Accounting(e)
    }
}

fn is_favorable(direction: Direction, price_open: f64, price: f64) -> bool {
    match direction {
        Direction::Long => price > price_open,
        Direction::Short => price < price_open,
    }
}

/// Validates and records one partial close. `kind` selects whether
/// `price` must sit beyond entry favorably (`Profit`) or adversely (`Loss`);
/// the percent-range and total-closed invariants are delegated to
/// `Signal::append_partial`.
pub fn apply_partial_close(
    signal: &mut Signal,
    kind: PartialKind,
    percent: f64,
    price: f64,
) -> Result<(), PartialCloseRejection> {
    if signal.is_scheduled {
        return Err(PartialCloseRejection::StillScheduled);
    }

    let favorable = is_favorable(signal.direction, signal.price_open, price);
    let direction_ok = match kind {
        PartialKind::Profit => favorable,
        PartialKind::Loss => !favorable,
    };
    if !direction_ok {
        return Err(PartialCloseRejection::WrongDirection);
    }

    signal.append_partial(kind, percent, price)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigex_types::{SignalContext, SignalDto};

    fn opened_long(entry: f64) -> Signal {
        let ctx = SignalContext::new("BTCUSDT", "trend", "paper", "", "default");
        let dto = SignalDto {
            direction: Direction::Long,
            price_open: None,
            price_take_profit: entry * 1.1,
            price_stop_loss: entry * 0.9,
            minute_estimated_time: 60,
            note: None,
            id: None,
        };
        Signal::new(ctx, &dto, Utc::now(), entry)
    }

    fn scheduled_long(entry: f64) -> Signal {
        let ctx = SignalContext::new("BTCUSDT", "trend", "paper", "", "default");
        let dto = SignalDto {
            direction: Direction::Long,
            price_open: Some(entry),
            price_take_profit: entry * 1.1,
            price_stop_loss: entry * 0.9,
            minute_estimated_time: 60,
            note: None,
            id: None,
        };
        Signal::new(ctx, &dto, Utc::now(), entry)
    }

    #[test]
    fn rejects_while_scheduled() {
        let mut s = scheduled_long(100.0);
        let result = apply_partial_close(&mut s, PartialKind::Profit, 20.0, 105.0);
        assert_eq!(result, Err(PartialCloseRejection::StillScheduled));
    }

    #[test]
    fn profit_requires_favorable_price() {
        let mut s = opened_long(100.0);
        let result = apply_partial_close(&mut s, PartialKind::Profit, 20.0, 95.0);
        assert_eq!(result, Err(PartialCloseRejection::WrongDirection));
    }

    #[test]
    fn loss_requires_adverse_price() {
        let mut s = opened_long(100.0);
        let result = apply_partial_close(&mut s, PartialKind::Loss, 20.0, 105.0);
        assert_eq!(result, Err(PartialCloseRejection::WrongDirection));
    }

    #[test]
    fn accepted_partial_is_recorded() {
        let mut s = opened_long(100.0);
        apply_partial_close(&mut s, PartialKind::Profit, 25.0, 110.0).unwrap();
        assert_eq!(s.tp_closed(), 25.0);
        assert_eq!(s.partial_log.len(), 1);
    }

    #[test]
    fn accounting_error_propagates() {
        let mut s = opened_long(100.0);
        apply_partial_close(&mut s, PartialKind::Profit, 80.0, 110.0).unwrap();
        let result = apply_partial_close(&mut s, PartialKind::Profit, 30.0, 111.0);
        assert_eq!(
            result,
            Err(PartialCloseRejection::Accounting(
                PartialCloseError::ExceedsTotal
            ))
        );
    }
}
