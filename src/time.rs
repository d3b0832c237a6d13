//! Rational time values
//!
//! A [`TimePoint`] is `value / rate` seconds. Equality, ordering and hashing
//! are exact rational operations: `24/24` and `48/48` are the same time, and
//! `1001/30000` never compares equal to `1/30`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// A point in time, `value / rate` seconds
///
/// A rate of zero marks the invalid sentinel ("no specific time").
#[derive(Clone, Copy)]
pub struct TimePoint {
    value: i64,
    rate: i64,
}

impl TimePoint {
    /// The invalid sentinel
    pub const INVALID: TimePoint = TimePoint { value: 0, rate: 0 };

    /// Create a time of `value` ticks at `rate` ticks per second.
    ///
    /// A negative rate is folded into the value; a zero rate, or a negative
    /// one that cannot be folded, yields [`TimePoint::INVALID`].
    pub fn new(value: i64, rate: i64) -> Self {
        match rate.cmp(&0) {
            Ordering::Equal => Self::INVALID,
            Ordering::Greater => Self { value, rate },
            Ordering::Less => match (value.checked_neg(), rate.checked_neg()) {
                (Some(value), Some(rate)) => Self { value, rate },
                _ => Self::INVALID,
            },
        }
    }

    /// Nearest tick at `rate` for a time in seconds
    pub fn from_seconds(seconds: f64, rate: i64) -> Self {
        if !seconds.is_finite() {
            return Self::INVALID;
        }
        Self::new((seconds * rate as f64).round() as i64, rate)
    }

    /// Time from microseconds
    pub fn from_micros(us: i64) -> Self {
        Self::new(us, 1_000_000)
    }

    pub fn is_valid(&self) -> bool {
        self.rate > 0
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn rate(&self) -> i64 {
        self.rate
    }

    /// Time in seconds (lossy)
    pub fn seconds(&self) -> f64 {
        if !self.is_valid() {
            return f64::NAN;
        }
        self.value as f64 / self.rate as f64
    }

    /// Time in microseconds, rounded toward negative infinity
    pub fn to_micros(&self) -> i64 {
        if !self.is_valid() {
            return 0;
        }
        let us = (self.value as i128 * 1_000_000).div_euclid(self.rate as i128);
        us as i64
    }

    /// Whole seconds, rounded toward negative infinity
    pub fn floor_seconds(&self) -> i64 {
        if !self.is_valid() {
            return 0;
        }
        self.value.div_euclid(self.rate)
    }

    /// The same time re-expressed at `rate`, rounded toward negative infinity
    pub fn rescaled_to(&self, rate: i64) -> Self {
        if !self.is_valid() || rate <= 0 {
            return Self::INVALID;
        }
        let value = (self.value as i128 * rate as i128).div_euclid(self.rate as i128);
        i64::try_from(value).map_or(Self::INVALID, |value| Self::new(value, rate))
    }

    /// Offset by `ticks` at this time's own rate; invalid on overflow
    pub fn offset(&self, ticks: i64) -> Self {
        if !self.is_valid() {
            return Self::INVALID;
        }
        self.value
            .checked_add(ticks)
            .map_or(Self::INVALID, |value| Self::new(value, self.rate))
    }

    /// Lowest-terms `(value, rate)`; identical for all equal times
    pub fn reduced(&self) -> (i64, i64) {
        if !self.is_valid() {
            return (0, 0);
        }
        let g = gcd(self.value as i128, self.rate as i128).max(1);
        ((self.value as i128 / g) as i64, (self.rate as i128 / g) as i64)
    }

    /// Combine two valid times at their least common rate
    fn combine(self, other: Self, op: impl Fn(i128, i128) -> i128) -> Self {
        if !self.is_valid() || !other.is_valid() {
            return Self::INVALID;
        }
        let (a, b) = (self.rate as i128, other.rate as i128);
        let rate = a / gcd(a, b) * b;
        let value = op(self.value as i128 * (rate / a), other.value as i128 * (rate / b));
        match (i64::try_from(value), i64::try_from(rate)) {
            (Ok(value), Ok(rate)) => Self::new(value, rate),
            _ => Self::INVALID,
        }
    }
}

impl Default for TimePoint {
    fn default() -> Self {
        Self::INVALID
    }
}

impl PartialEq for TimePoint {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_valid(), other.is_valid()) {
            (true, true) => {
                self.value as i128 * other.rate as i128 == other.value as i128 * self.rate as i128
            }
            (false, false) => true,
            _ => false,
        }
    }
}

impl Eq for TimePoint {}

impl Hash for TimePoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reduced().hash(state);
    }
}

impl PartialOrd for TimePoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimePoint {
    /// Invalid times sort before every valid time
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_valid(), other.is_valid()) {
            (true, true) => (self.value as i128 * other.rate as i128)
                .cmp(&(other.value as i128 * self.rate as i128)),
            (false, false) => Ordering::Equal,
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
        }
    }
}

impl Add for TimePoint {
    type Output = TimePoint;

    fn add(self, rhs: Self) -> Self::Output {
        self.combine(rhs, |a, b| a + b)
    }
}

impl Sub for TimePoint {
    type Output = TimePoint;

    fn sub(self, rhs: Self) -> Self::Output {
        self.combine(rhs, |a, b| a - b)
    }
}

impl fmt::Debug for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimePoint({})", self)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}/{}", self.value, self.rate)
        } else {
            f.write_str("invalid")
        }
    }
}

/// A half-open span `[start, start + duration)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TimeRange {
    start: TimePoint,
    duration: TimePoint,
}

impl TimeRange {
    pub fn new(start: TimePoint, duration: TimePoint) -> Self {
        Self { start, duration }
    }

    /// Range covering `[start, end)`
    pub fn from_start_end(start: TimePoint, end: TimePoint) -> Self {
        Self {
            start,
            duration: end - start,
        }
    }

    /// One-second range starting at whole second `seconds`
    pub fn whole_second(seconds: i64) -> Self {
        Self::new(TimePoint::new(seconds, 1), TimePoint::new(1, 1))
    }

    pub fn is_valid(&self) -> bool {
        self.start.is_valid() && self.duration.is_valid()
    }

    pub fn start(&self) -> TimePoint {
        self.start
    }

    pub fn duration(&self) -> TimePoint {
        self.duration
    }

    /// Exclusive end
    pub fn end(&self) -> TimePoint {
        self.start + self.duration
    }

    pub fn contains(&self, time: TimePoint) -> bool {
        self.is_valid() && time.is_valid() && time >= self.start && time < self.end()
    }

    /// Clamp `time` into the range; the last valid point is one tick of the
    /// range's start rate before the end.
    pub fn clamp(&self, time: TimePoint) -> TimePoint {
        if !self.is_valid() || !time.is_valid() {
            return time;
        }
        let last = self.end().rescaled_to(self.start.rate()).offset(-1);
        if time < self.start {
            self.start
        } else if time > last {
            last.max(self.start)
        } else {
            time
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.start, self.duration)
    }
}
