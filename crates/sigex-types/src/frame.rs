use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Step size between generated timestamps. A fixed
/// enumeration rather than a free-form duration: every interval a backtest
/// frame walks at is one the exchange adapter's candle API also understands
/// (`"1m"`, `"1h"`,...), so the two stay in lockstep by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameInterval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    FourHours,
    OneDay,
}

impl FrameInterval {
    pub fn step(&self) -> ChronoDuration {
        match self {
            FrameInterval::OneMinute => ChronoDuration::minutes(1),
            FrameInterval::FiveMinutes => ChronoDuration::minutes(5),
            FrameInterval::FifteenMinutes => ChronoDuration::minutes(15),
            FrameInterval::OneHour => ChronoDuration::hours(1),
            FrameInterval::FourHours => ChronoDuration::hours(4),
            FrameInterval::OneDay => ChronoDuration::days(1),
        }
    }

    /// The candle-interval string an `Exchange` call expects for this step.
    pub fn as_candle_interval(&self) -> &'static str {
        match self {
            FrameInterval::OneMinute => "1m",
            FrameInterval::FiveMinutes => "5m",
            FrameInterval::FifteenMinutes => "15m",
            FrameInterval::OneHour => "1h",
            FrameInterval::FourHours => "4h",
            FrameInterval::OneDay => "1d",
        }
    }
}

/// The finite, ordered timestamp sequence a backtest walks.
/// Restartable by construction: [`Frame::get_timeframe`] is a pure function
/// of `interval`/`start`/`end`, so calling it again after a full walk
/// reproduces the identical sequence rather than resuming a stateful cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub interval: FrameInterval,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Frame {
    pub fn new(
        name: impl Into<String>,
        interval: FrameInterval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Frame {
            name: name.into(),
            interval,
            start,
            end,
        }
    }

    /// Generates the full, ordered timeframe from `{interval, start, end}`
    ///. Empty if `end < start`.
    pub fn get_timeframe(&self) -> Vec<DateTime<Utc>> {
        if self.end < self.start {
            return Vec::new();
        }
        let step = self.interval.step();
        let mut out = Vec::new();
        let mut cursor = self.start;
        while cursor <= self.end {
            out.push(cursor);
            cursor += step;
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}
