use sigex_config::SignalConfig;
use sigex_types::{Direction, SignalDto};

/// Why a `SignalDto` returned by `getSignal` was rejected before a
/// `SignalMachine` is allowed to act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtoValidationError {
    NonFinitePrice,
    NonPositivePrice,
    WrongSideTakeProfit,
    WrongSideStopLoss,
    TakeProfitDistanceTooSmall,
    StopLossDistanceOutOfRange,
    InvalidLifetime,
}

impl std::fmt::Display for DtoValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            DtoValidationError::NonFinitePrice => "price is not finite",
            DtoValidationError::NonPositivePrice => "price is not positive",
            DtoValidationError::WrongSideTakeProfit => {
                "take-profit is not on the profitable side of the entry"
            }
            DtoValidationError::WrongSideStopLoss => {
                "stop-loss is not on the protective side of the entry"
            }
            DtoValidationError::TakeProfitDistanceTooSmall => {
                "take-profit distance is below the configured minimum"
            }
            DtoValidationError::StopLossDistanceOutOfRange => {
                "stop-loss distance is outside the configured bounds"
            }
            DtoValidationError::InvalidLifetime => {
                "minuteEstimatedTime is zero or exceeds the configured maximum"
            }
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for DtoValidationError {}

/// Validates a `SignalDto` against the configured distance/lifetime bounds,
/// relative to `reference_price` — the price the position would actually
/// open at: the DTO's own `price_open` hint for a scheduled signal, or the
/// current VWAP for an immediate one. The caller resolves which applies;
/// this function only knows "the price this signal is measured against".
pub fn validate_dto(
    dto: &SignalDto,
    reference_price: f64,
    cfg: &SignalConfig,
) -> Result<(), DtoValidationError> {
    for price in [dto.price_take_profit, dto.price_stop_loss, reference_price] {
        if !price.is_finite() {
            return Err(DtoValidationError::NonFinitePrice);
        }
        if price <= 0.0 {
            return Err(DtoValidationError::NonPositivePrice);
        }
    }
    if let Some(price_open) = dto.price_open {
        if !price_open.is_finite() {
            return Err(DtoValidationError::NonFinitePrice);
        }
        if price_open <= 0.0 {
            return Err(DtoValidationError::NonPositivePrice);
        }
    }

    if dto.minute_estimated_time == 0 || dto.minute_estimated_time > cfg.max_signal_lifetime_minutes
    {
        return Err(DtoValidationError::InvalidLifetime);
    }

    match dto.direction {
        Direction::Long => {
            if dto.price_take_profit <= reference_price {
                return Err(DtoValidationError::WrongSideTakeProfit);
            }
            if dto.price_stop_loss >= reference_price {
                return Err(DtoValidationError::WrongSideStopLoss);
            }
        }
        Direction::Short => {
            if dto.price_take_profit >= reference_price {
                return Err(DtoValidationError::WrongSideTakeProfit);
            }
            if dto.price_stop_loss <= reference_price {
                return Err(DtoValidationError::WrongSideStopLoss);
            }
        }
    }

    let tp_distance_percent =
        ((dto.price_take_profit - reference_price) / reference_price).abs() * 100.0;
    if tp_distance_percent < cfg.min_takeprofit_distance_percent {
        return Err(DtoValidationError::TakeProfitDistanceTooSmall);
    }

    let sl_distance_percent =
        ((reference_price - dto.price_stop_loss) / reference_price).abs() * 100.0;
    if sl_distance_percent < cfg.min_stoploss_distance_percent
        || sl_distance_percent > cfg.max_stoploss_distance_percent
    {
        return Err(DtoValidationError::StopLossDistanceOutOfRange);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_dto() -> SignalDto {
        SignalDto {
            direction: Direction::Long,
            price_open: None,
            price_take_profit: 52000.0,
            price_stop_loss: 49000.0,
            minute_estimated_time: 60,
            note: None,
            id: None,
        }
    }

    #[test]
    fn well_formed_long_passes() {
        let cfg = SignalConfig::default();
        assert!(validate_dto(&long_dto(), 50000.0, &cfg).is_ok());
    }

    #[test]
    fn take_profit_on_wrong_side_rejected() {
        let cfg = SignalConfig::default();
        let mut dto = long_dto();
        dto.price_take_profit = 49500.0;
        assert_eq!(
            validate_dto(&dto, 50000.0, &cfg),
            Err(DtoValidationError::WrongSideTakeProfit)
        );
    }

    #[test]
    fn zero_lifetime_rejected() {
        let cfg = SignalConfig::default();
        let mut dto = long_dto();
        dto.minute_estimated_time = 0;
        assert_eq!(
            validate_dto(&dto, 50000.0, &cfg),
            Err(DtoValidationError::InvalidLifetime)
        );
    }

    #[test]
    fn stop_loss_distance_too_wide_rejected() {
        let cfg = SignalConfig::default();
        let mut dto = long_dto();
        dto.price_stop_loss = 30000.0;
        assert_eq!(
            validate_dto(&dto, 50000.0, &cfg),
            Err(DtoValidationError::StopLossDistanceOutOfRange)
        );
    }

    #[test]
    fn nonfinite_price_rejected() {
        let cfg = SignalConfig::default();
        let mut dto = long_dto();
        dto.price_take_profit = f64::NAN;
        assert_eq!(
            validate_dto(&dto, 50000.0, &cfg),
            Err(DtoValidationError::NonFinitePrice)
        );
    }

    #[test]
    fn short_signal_validated_against_reference() {
        let cfg = SignalConfig::default();
        let dto = SignalDto {
            direction: Direction::Short,
            price_open: None,
            price_take_profit: 48000.0,
            price_stop_loss: 51000.0,
            minute_estimated_time: 60,
            note: None,
            id: None,
        };
        assert!(validate_dto(&dto, 50000.0, &cfg).is_ok());
    }
}
