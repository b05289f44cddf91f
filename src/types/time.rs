//! Two-part precision timestamps.
//!
//! A [`TimeValue`] carries whole and fractional seconds as separate doubles so
//! that sub-microsecond resolution survives at epoch-scale magnitudes. Every
//! arithmetic operation returns a new value; nothing is mutated in place once it
//! has been handed to another owner.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::PortError;

/// Source of a timestamp.
///
/// Wire codes match the `tcmode` field of the time value record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum TimeCodeMode {
    /// No time code
    Off,
    /// Derived from the host system clock
    Cpu,
    Ztc,
    Sdn,
    Sms,
    Dtl,
    Irb,
    Sdds,
}

impl TimeCodeMode {
    /// Wire code of this mode.
    pub const fn code(self) -> i16 {
        match self {
            TimeCodeMode::Off => 0,
            TimeCodeMode::Cpu => 1,
            TimeCodeMode::Ztc => 2,
            TimeCodeMode::Sdn => 3,
            TimeCodeMode::Sms => 4,
            TimeCodeMode::Dtl => 5,
            TimeCodeMode::Irb => 6,
            TimeCodeMode::Sdds => 7,
        }
    }
}

impl TryFrom<i16> for TimeCodeMode {
    type Error = PortError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => TimeCodeMode::Off,
            1 => TimeCodeMode::Cpu,
            2 => TimeCodeMode::Ztc,
            3 => TimeCodeMode::Sdn,
            4 => TimeCodeMode::Sms,
            5 => TimeCodeMode::Dtl,
            6 => TimeCodeMode::Irb,
            7 => TimeCodeMode::Sdds,
            _ => return Err(PortError::InvalidTimeCode { field: "tcmode", code }),
        })
    }
}

impl From<TimeCodeMode> for i16 {
    fn from(mode: TimeCodeMode) -> Self {
        mode.code()
    }
}

/// Validity of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum TimeCodeStatus {
    Invalid,
    Valid,
}

impl TryFrom<i16> for TimeCodeStatus {
    type Error = PortError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TimeCodeStatus::Invalid),
            1 => Ok(TimeCodeStatus::Valid),
            _ => Err(PortError::InvalidTimeCode { field: "tcstatus", code }),
        }
    }
}

impl From<TimeCodeStatus> for i16 {
    fn from(status: TimeCodeStatus) -> Self {
        match status {
            TimeCodeStatus::Invalid => 0,
            TimeCodeStatus::Valid => 1,
        }
    }
}

/// Precision timestamp attached to every packet and burst.
///
/// `whole_seconds` counts seconds since the Unix epoch and `fractional_seconds`
/// holds the sub-second remainder. After [`normalize`](TimeValue::normalize) the
/// fractional part lies in `[0.0, 1.0)` and the whole part is integral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct TimeValue {
    pub mode: TimeCodeMode,
    pub status: TimeCodeStatus,
    /// Source-specific bias (fractional sample offset)
    pub offset: f64,
    pub whole_seconds: f64,
    pub fractional_seconds: f64,
}

impl TimeValue {
    /// Create a timestamp from explicit parts.
    ///
    /// If either part is negative the current wall-clock time is used instead.
    /// The result is tagged valid and is not normalized.
    pub fn create(whole: f64, fractional: f64, mode: TimeCodeMode) -> Self {
        let (whole_seconds, fractional_seconds) = if whole < 0.0 || fractional < 0.0 {
            wall_clock_parts(SystemTime::now())
        } else {
            (whole, fractional)
        };

        Self {
            mode,
            status: TimeCodeStatus::Valid,
            offset: 0.0,
            whole_seconds,
            fractional_seconds,
        }
    }

    /// Timestamp for the current system time.
    pub fn now() -> Self {
        Self::create(-1.0, -1.0, TimeCodeMode::Cpu)
    }

    /// Placeholder for a packet that carries no meaningful time.
    pub fn not_set() -> Self {
        Self {
            mode: TimeCodeMode::Off,
            status: TimeCodeStatus::Invalid,
            offset: 0.0,
            whole_seconds: 0.0,
            fractional_seconds: 0.0,
        }
    }

    /// Timestamp for an arbitrary system time, tagged as CPU-derived.
    pub fn from_system_time(time: SystemTime) -> Self {
        let (whole, fractional) = wall_clock_parts(time);
        Self::create(whole, fractional, TimeCodeMode::Cpu)
    }

    pub fn is_valid(&self) -> bool {
        self.status == TimeCodeStatus::Valid
    }

    /// Return the normalized form of this timestamp.
    ///
    /// Any fraction held in `whole_seconds` moves into `fractional_seconds`, then
    /// whole-second overflow (or a negative fraction) is carried back. Applying it
    /// to an already normalized value returns the same value.
    pub fn normalize(&self) -> Self {
        let mut whole = self.whole_seconds;
        let mut fractional = self.fractional_seconds;

        let whole_fraction = whole.fract();
        whole = whole.trunc();
        fractional += whole_fraction;

        let carry = fractional.trunc();
        whole += carry;
        fractional -= carry;

        if fractional < 0.0 {
            fractional += 1.0;
            whole -= 1.0;
        }
        // 1.0 - epsilon can round up to exactly 1.0
        if fractional >= 1.0 {
            fractional -= 1.0;
            whole += 1.0;
        }

        Self { whole_seconds: whole, fractional_seconds: fractional, ..*self }
    }

    /// Timestamp of the sample `num_samples` after this one, `sample_delta`
    /// seconds apart.
    pub fn add_sample_offset(&self, num_samples: usize, sample_delta: f64) -> Self {
        let offset = num_samples as f64 * sample_delta;
        let mut result = *self;
        result.whole_seconds += offset.trunc();
        result.fractional_seconds += offset % 1.0;
        if result.fractional_seconds >= 1.0 {
            result.whole_seconds += 1.0;
            result.fractional_seconds -= 1.0;
        }
        result.normalize()
    }

    /// Advance by `seconds`, which may be negative.
    pub fn increment(&self, seconds: f64) -> Self {
        let whole = seconds.trunc();
        let fractional = seconds - whole;
        Self {
            whole_seconds: self.whole_seconds + whole,
            fractional_seconds: self.fractional_seconds + fractional,
            ..*self
        }
        .normalize()
    }

    /// Move back by `seconds`; same as `increment(-seconds)`.
    pub fn decrement(&self, seconds: f64) -> Self {
        self.increment(-seconds)
    }

    /// Three-way comparison returning -1, 0 or 1.
    ///
    /// Whole seconds are the primary key, fractional seconds break ties.
    pub fn compare(&self, other: &TimeValue) -> i32 {
        match self.ordering(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    /// Total order on the time fields; mode, status and offset are ignored.
    pub fn ordering(&self, other: &TimeValue) -> Ordering {
        cmp_seconds(self.whole_seconds, other.whole_seconds)
            .then_with(|| cmp_seconds(self.fractional_seconds, other.fractional_seconds))
    }

    /// Seconds from `other` to `self` as a single double.
    ///
    /// Not normalized; the magnitude may well exceed one second.
    pub fn difference(&self, other: &TimeValue) -> f64 {
        (self.whole_seconds - other.whole_seconds)
            + (self.fractional_seconds - other.fractional_seconds)
    }

    /// Seconds elapsed between this timestamp and the current system time.
    pub fn elapsed(&self) -> f64 {
        TimeValue::now().difference(self)
    }
}

impl Default for TimeValue {
    fn default() -> Self {
        Self::not_set()
    }
}

/// Renders `YYYY:MM:DD::HH:MM:SS.ffffff` in UTC.
///
/// Calendar conversion only sees the whole seconds; the microseconds come from the
/// fractional part directly so they are not lost to the calendar type.
impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let normalized = self.normalize();
        let mut seconds = normalized.whole_seconds as i64;
        let mut micros = (normalized.fractional_seconds * 1e6).round() as i64;
        if micros >= 1_000_000 {
            seconds += 1;
            micros -= 1_000_000;
        }

        match DateTime::from_timestamp(seconds, 0) {
            Some(datetime) => {
                write!(f, "{}.{:06}", datetime.format("%Y:%m:%d::%H:%M:%S"), micros)
            }
            None => write!(f, "{}.{:06}", seconds, micros),
        }
    }
}

impl Add<f64> for TimeValue {
    type Output = TimeValue;

    fn add(self, seconds: f64) -> TimeValue {
        self.increment(seconds)
    }
}

impl AddAssign<f64> for TimeValue {
    fn add_assign(&mut self, seconds: f64) {
        *self = self.increment(seconds);
    }
}

impl Sub<f64> for TimeValue {
    type Output = TimeValue;

    fn sub(self, seconds: f64) -> TimeValue {
        self.decrement(seconds)
    }
}

impl SubAssign<f64> for TimeValue {
    fn sub_assign(&mut self, seconds: f64) {
        *self = self.decrement(seconds);
    }
}

impl Sub for TimeValue {
    type Output = f64;

    fn sub(self, other: TimeValue) -> f64 {
        self.difference(&other)
    }
}

// -0.0 and 0.0 compare equal; NaN still lands somewhere deterministic
fn cmp_seconds(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

fn wall_clock_parts(time: SystemTime) -> (f64, f64) {
    // Times before the epoch are clamped rather than reported as negative
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    (since_epoch.as_secs() as f64, f64::from(since_epoch.subsec_nanos()) / 1e9)
}
