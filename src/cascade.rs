// Resolution cascade: one base buffer fed every sample, three derived buffers each
// averaging the base tail under their own time gate (never derived-from-derived).

use std::num::NonZeroUsize;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::{Datasets, Report, Sample, Spec};
use crate::ring_buffer::RingBuffer;

/// 15m: 10s -> 15 * 60 / 10 = 90 points
pub const BASE_CAPACITY: usize = 90;
/// 1h: 30s -> 60 * 60 / 30 = 120 points
pub const ONE_HOUR_INTERVAL: Duration = Duration::from_secs(30);
pub const ONE_HOUR_CAPACITY: usize = 120;
/// 3h: 2m -> 3 * 60 * 60 / 120 = 90 points
pub const THREE_HOURS_INTERVAL: Duration = Duration::from_secs(2 * 60);
pub const THREE_HOURS_CAPACITY: usize = 90;
/// 4 weeks: 5m -> 4 * 7 * 24 * 60 * 60 / 300 = 8064 points
pub const LIFETIME_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_LIFETIME_CAPACITY: usize = 8064;
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CascadeError {
    #[error("base interval must be > 0")]
    ZeroBaseInterval,

    #[error("{level}: capacity must be > 0")]
    ZeroCapacity { level: &'static str },

    #[error("{level}: interval {interval:?} is not a whole multiple of the base interval {base:?}")]
    FractionalSpan {
        level: &'static str,
        interval: Duration,
        base: Duration,
    },
}

/// Interval and capacity of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelConfig {
    pub interval: Duration,
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeConfig {
    pub base: LevelConfig,
    pub one_hour: LevelConfig,
    pub three_hours: LevelConfig,
    pub lifetime: LevelConfig,
}

impl CascadeConfig {
    /// Reference layout (10s base, spans 3/12/30) with a tunable long-horizon capacity.
    /// The base interval stays fixed whatever the sampling cadence.
    pub fn with_lifetime_capacity(lifetime_capacity: usize) -> Self {
        Self {
            base: LevelConfig {
                interval: DEFAULT_BASE_INTERVAL,
                capacity: BASE_CAPACITY,
            },
            one_hour: LevelConfig {
                interval: ONE_HOUR_INTERVAL,
                capacity: ONE_HOUR_CAPACITY,
            },
            three_hours: LevelConfig {
                interval: THREE_HOURS_INTERVAL,
                capacity: THREE_HOURS_CAPACITY,
            },
            lifetime: LevelConfig {
                interval: LIFETIME_INTERVAL,
                capacity: lifetime_capacity,
            },
        }
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self::with_lifetime_capacity(DEFAULT_LIFETIME_CAPACITY)
    }
}

/// A level that passed validation.
struct CheckedLevel {
    level: &'static str,
    capacity: NonZeroUsize,
    interval: Duration,
    span: usize,
}

impl CascadeConfig {
    /// Checks every level and derives the spans. A span larger than the base capacity is
    /// accepted; `RingBuffer::has_last` keeps such a level empty.
    fn check(&self) -> Result<[CheckedLevel; 4], CascadeError> {
        if self.base.interval.is_zero() {
            return Err(CascadeError::ZeroBaseInterval);
        }
        Ok([
            self.check_level("15m", &self.base, false)?,
            self.check_level("1h", &self.one_hour, true)?,
            self.check_level("3h", &self.three_hours, true)?,
            self.check_level("lifetime", &self.lifetime, true)?,
        ])
    }

    fn check_level(
        &self,
        level: &'static str,
        config: &LevelConfig,
        derived: bool,
    ) -> Result<CheckedLevel, CascadeError> {
        let capacity =
            NonZeroUsize::new(config.capacity).ok_or(CascadeError::ZeroCapacity { level })?;
        let mut span = 0;
        if derived {
            let base_nanos = self.base.interval.as_nanos();
            let nanos = config.interval.as_nanos();
            if nanos == 0 || nanos % base_nanos != 0 {
                return Err(CascadeError::FractionalSpan {
                    level,
                    interval: config.interval,
                    base: self.base.interval,
                });
            }
            span = (nanos / base_nanos) as usize;
        }
        Ok(CheckedLevel {
            level,
            capacity,
            interval: config.interval,
            span,
        })
    }

    pub fn validate(&self) -> Result<(), CascadeError> {
        self.check().map(|_| ())
    }
}

impl CheckedLevel {
    fn into_buffer(self) -> RingBuffer<Sample> {
        debug!(
            level = self.level,
            span = self.span,
            capacity = self.capacity.get(),
            "level configured"
        );
        RingBuffer::new(self.capacity, self.interval, self.span)
    }
}

/// Owns the four resolution levels and the static [`Spec`] embedded in every report.
#[derive(Debug, Clone)]
pub struct Cascade {
    spec: Spec,
    base: RingBuffer<Sample>,
    one_hour: RingBuffer<Sample>,
    three_hours: RingBuffer<Sample>,
    lifetime: RingBuffer<Sample>,
}

impl Cascade {
    pub fn new(config: &CascadeConfig, spec: Spec) -> Result<Self, CascadeError> {
        let [base, one_hour, three_hours, lifetime] = config.check()?;
        let base = base.into_buffer();
        let one_hour = one_hour.into_buffer();
        let three_hours = three_hours.into_buffer();
        let lifetime = lifetime.into_buffer();
        info!(
            lifetime_capacity = config.lifetime.capacity,
            base_interval_secs = config.base.interval.as_secs_f64(),
            "new metrics cascade"
        );
        Ok(Self {
            spec,
            base,
            one_hour,
            three_hours,
            lifetime,
        })
    }

    pub fn add(&mut self, sample: Sample) {
        self.add_at(sample, Instant::now());
    }

    /// Appends to the base level unconditionally, then updates each derived level whose span
    /// is available in the base level and whose own interval has elapsed.
    pub fn add_at(&mut self, sample: Sample, now: Instant) {
        self.base.add_at(sample, now);
        let base = &self.base;
        for level in [
            &mut self.one_hour,
            &mut self.three_hours,
            &mut self.lifetime,
        ] {
            if base.has_last(level.span())
                && level.is_due_at(level.interval(), now)
                && let Some(aggregate) = base.last_average(level.span())
            {
                level.add_at(aggregate, now);
            }
        }
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn base(&self) -> &RingBuffer<Sample> {
        &self.base
    }

    pub fn one_hour(&self) -> &RingBuffer<Sample> {
        &self.one_hour
    }

    pub fn three_hours(&self) -> &RingBuffer<Sample> {
        &self.three_hours
    }

    pub fn lifetime(&self) -> &RingBuffer<Sample> {
        &self.lifetime
    }

    /// Current contents of every level, oldest first, plus the [`Spec`]. Read-only.
    pub fn snapshot(&self) -> Report {
        Report {
            spec: self.spec.clone(),
            datasets: Datasets {
                fifteen_minutes: self.base.last_available(),
                one_hour: self.one_hour.last_available(),
                three_hours: self.three_hours.last_available(),
                lifetime: self.lifetime.last_available(),
            },
        }
    }
}
