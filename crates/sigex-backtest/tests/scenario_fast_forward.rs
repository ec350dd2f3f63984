use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures_util::{pin_mut, StreamExt};

use sigex_backtest::Backtest;
use sigex_bus::EventBus;
use sigex_config::SignalConfig;
use sigex_exchange::PaperExchange;
use sigex_testkit::{seed_flat_history, ScriptedStrategy};
use sigex_types::{
    Candle, CloseReason, Direction, Frame, FrameInterval, SignalContext, SignalDto, TickResult,
};

const MINUTE_MS: i64 = 60_000;

fn candle(ts_ms: i64, price: f64) -> Candle {
    Candle {
        timestamp_ms: ts_ms,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: 1.0,
    }
}

fn dto(direction: Direction, take_profit: f64, stop_loss: f64) -> SignalDto {
    SignalDto {
        direction,
        price_open: None,
        price_take_profit: take_profit,
        price_stop_loss: stop_loss,
        minute_estimated_time: 120,
        note: None,
        id: None,
    }
}

/// An immediate long whose take-profit is crossed a few minutes into the
/// walk: the orchestrator should fast-forward straight to the `Closed`
/// result and skip the outer frame past the close rather than re-evaluating
/// every intervening minute.
#[tokio::test]
async fn immediate_long_fast_forwards_to_take_profit_and_skips_ahead() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let base = start.timestamp_millis();

    let exchange = Arc::new(PaperExchange::new());
    seed_flat_history(&exchange, "BTCUSDT", base, MINUTE_MS, 50_000.0);
    // Opens at minute 0 around 50_000, ramps straight through the 52_000
    // take-profit by minute 10, then keeps climbing for the rest of the day
    // so a non-skipping walker would keep re-evaluating long after close.
    for i in 0..1440i64 {
        let price = if i < 10 {
            50_000.0 + (i as f64) * 400.0
        } else {
            54_000.0
        };
        exchange.push("BTCUSDT", candle(base + i * MINUTE_MS, price));
    }

    let frame = Frame::new(
        "daily",
        FrameInterval::OneMinute,
        start,
        start + chrono::Duration::days(1),
    );
    let context = SignalContext::new("BTCUSDT", "trend", "paper", "daily", "default");
    let strategy = Arc::new(ScriptedStrategy::one_shot(dto(
        Direction::Long,
        52_000.0,
        48_000.0,
    )));
    let bus = EventBus::new();

    let backtest = Backtest::new(
        context,
        frame,
        SignalConfig::default(),
        exchange,
        strategy,
        vec![],
        bus,
    );

    let (stream, _cancel) = backtest.background();
    pin_mut!(stream);

    let mut closes = Vec::new();
    while let Some(result) = stream.next().await {
        closes.push(result);
    }

    assert_eq!(
        closes.len(),
        1,
        "expected exactly one terminal result, got {closes:?}"
    );
    match &closes[0] {
        TickResult::Closed { reason, .. } => assert_eq!(*reason, CloseReason::TakeProfit),
        other => panic!("expected Closed, got {other:?}"),
    }
}

/// A strategy that never proposes anything should walk the whole frame and
/// yield nothing.
#[tokio::test]
async fn idle_strategy_yields_no_terminal_results() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let base = start.timestamp_millis();

    let exchange = Arc::new(PaperExchange::new());
    seed_flat_history(&exchange, "BTCUSDT", base, MINUTE_MS, 50_000.0);
    for i in 0..120i64 {
        exchange.push("BTCUSDT", candle(base + i * MINUTE_MS, 50_000.0));
    }

    let frame = Frame::new(
        "short",
        FrameInterval::OneMinute,
        start,
        start + chrono::Duration::hours(2),
    );
    let context = SignalContext::new("BTCUSDT", "trend", "paper", "short", "default");
    let strategy = Arc::new(ScriptedStrategy::new(std::iter::repeat(None).take(200)));
    let bus = EventBus::new();

    let backtest = Backtest::new(
        context,
        frame,
        SignalConfig::default(),
        exchange,
        strategy,
        vec![],
        bus,
    );

    let (stream, _cancel) = backtest.background();
    pin_mut!(stream);

    let mut closes = Vec::new();
    while let Some(result) = stream.next().await {
        closes.push(result);
    }
    assert!(closes.is_empty());
}
