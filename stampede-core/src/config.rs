use crate::duration::HumanDuration;
use crate::error::ConfigError;
use crate::threshold::{Threshold, ThresholdExpr};
use crate::{
    DEFAULT_GRACEFUL_RAMP_DOWN, DEFAULT_GRACEFUL_STOP, DEFAULT_TIME_UNIT, MAX_PROFILE_SPAN,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// A ramping stage: move the VU target linearly to `target` over `duration`.
///
/// A zero `duration` jumps straight to `target`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde_as(as = "HumanDuration")]
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrivalRate {
    /// Iterations started per `time_unit`.
    pub rate: u32,
    #[serde_as(as = "HumanDuration")]
    #[serde(default = "default_time_unit")]
    pub time_unit: Duration,
    #[serde_as(as = "HumanDuration")]
    pub duration: Duration,
    pub pre_allocated: u32,
    pub max_concurrency: u32,
}

impl ArrivalRate {
    /// Offset of the `n`th scheduled start from the beginning of the profile.
    pub fn nth_start(&self, n: u64) -> Duration {
        if self.rate == 0 {
            return Duration::ZERO;
        }
        let nanos = u128::from(n).saturating_mul(self.time_unit.as_nanos());
        from_nanos(nanos / u128::from(self.rate))
    }

    /// Number of iteration starts scheduled strictly before the end of the duration.
    pub fn requested(&self) -> u64 {
        let unit = self.time_unit.as_nanos();
        if self.rate == 0 || unit == 0 {
            return 0;
        }
        let scheduled = self.duration.as_nanos().saturating_mul(u128::from(self.rate));
        u64::try_from(scheduled.div_ceil(unit)).unwrap_or(u64::MAX)
    }
}

fn from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}

/// How VU iterations are admitted over the life of one profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum LoadProfile {
    RampingVus {
        #[serde(default)]
        start_vus: u32,
        stages: Vec<Stage>,
    },
    ConstantArrivalRate(ArrivalRate),
}

impl LoadProfile {
    pub fn ramping(stages: Vec<Stage>) -> Self {
        Self::RampingVus {
            start_vus: 0,
            stages,
        }
    }

    /// Time during which new iterations may be admitted.
    pub fn duration(&self) -> Duration {
        match self {
            Self::RampingVus { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |total, s| total.saturating_add(s.duration)),
            Self::ConstantArrivalRate(rate) => rate.duration,
        }
    }
}

/// A named load profile and its timing around the shared test clock.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(flatten)]
    pub profile: LoadProfile,
    #[serde_as(as = "HumanDuration")]
    #[serde(default)]
    pub start_offset: Duration,
    #[serde_as(as = "HumanDuration")]
    #[serde(default = "default_graceful_stop")]
    pub graceful_stop: Duration,
    #[serde_as(as = "HumanDuration")]
    #[serde(default = "default_graceful_ramp_down")]
    pub graceful_ramp_down: Duration,
}

impl ProfileConfig {
    pub fn new(name: &str, profile: LoadProfile) -> Self {
        Self {
            name: name.to_string(),
            profile,
            start_offset: Duration::ZERO,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            graceful_ramp_down: DEFAULT_GRACEFUL_RAMP_DOWN,
        }
    }

    pub fn start_offset(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn graceful_ramp_down(mut self, graceful_ramp_down: Duration) -> Self {
        self.graceful_ramp_down = graceful_ramp_down;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let grace = self.graceful_stop.max(self.graceful_ramp_down);
        if self.end_offset().saturating_add(grace) > MAX_PROFILE_SPAN {
            return Err(ConfigError::TooLong(self.name.clone()));
        }

        match &self.profile {
            LoadProfile::RampingVus { stages, .. } if stages.is_empty() => {
                Err(ConfigError::EmptyStages(self.name.clone()))
            }
            LoadProfile::RampingVus { .. } => Ok(()),
            LoadProfile::ConstantArrivalRate(rate) => {
                if rate.time_unit.is_zero() {
                    return Err(ConfigError::ZeroTimeUnit(self.name.clone()));
                }
                if rate.max_concurrency < rate.pre_allocated {
                    return Err(ConfigError::ConcurrencyBounds {
                        name: self.name.clone(),
                        pre_allocated: rate.pre_allocated,
                        max: rate.max_concurrency,
                    });
                }
                Ok(())
            }
        }
    }

    /// Offset at which admission ends for this profile.
    pub fn end_offset(&self) -> Duration {
        self.start_offset.saturating_add(self.profile.duration())
    }
}

/// The declarative part of a test run: profiles and thresholds.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub name: String,
    pub profiles: Vec<ProfileConfig>,
    #[serde_as(as = "BTreeMap<_, Vec<DisplayFromStr>>")]
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<ThresholdExpr>>,
}

impl TestConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TestConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_profiles(&self.profiles)
    }

    pub fn thresholds(&self) -> Vec<Threshold> {
        self.thresholds
            .iter()
            .flat_map(|(metric, exprs)| {
                exprs.iter().map(|expr| Threshold {
                    metric: metric.clone(),
                    expr: *expr,
                })
            })
            .collect()
    }
}

pub fn validate_profiles(profiles: &[ProfileConfig]) -> Result<(), ConfigError> {
    if profiles.is_empty() {
        return Err(ConfigError::NoProfiles);
    }

    let mut seen = HashSet::new();
    for profile in profiles {
        if !seen.insert(profile.name.as_str()) {
            return Err(ConfigError::DuplicateProfile(profile.name.clone()));
        }
        profile.validate()?;
    }

    Ok(())
}

fn default_time_unit() -> Duration {
    DEFAULT_TIME_UNIT
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}

fn default_graceful_ramp_down() -> Duration {
    DEFAULT_GRACEFUL_RAMP_DOWN
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(rate: u32, time_unit: Duration, duration: Duration) -> ArrivalRate {
        ArrivalRate {
            rate,
            time_unit,
            duration,
            pre_allocated: 1,
            max_concurrency: 1,
        }
    }

    #[test]
    fn requested_counts_every_scheduled_start() {
        let rate = arrival(10, Duration::from_secs(60), Duration::from_secs(300));
        assert_eq!(rate.nth_start(1), Duration::from_secs(6));
        assert_eq!(rate.requested(), 50);

        let rate = arrival(3, Duration::from_secs(1), Duration::from_millis(1500));
        // Starts at 0, 333ms, 666ms, 1000ms, 1333ms
        assert_eq!(rate.requested(), 5);

        let rate = arrival(0, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(rate.requested(), 0);
    }

    #[test]
    fn uneven_periods_never_add_a_start() {
        let rate = arrival(3, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(rate.requested(), 3);

        let rate = arrival(7, Duration::from_secs(60), Duration::from_secs(60));
        assert_eq!(rate.requested(), 7);
    }

    #[test]
    fn starts_are_evenly_spaced() {
        let rate = arrival(3, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(rate.nth_start(0), Duration::ZERO);
        assert_eq!(rate.nth_start(1), Duration::from_nanos(333_333_333));
        assert_eq!(rate.nth_start(2), Duration::from_nanos(666_666_666));
        assert_eq!(rate.nth_start(3), Duration::from_secs(1));
    }

    #[test]
    fn rejects_overlong_profiles() {
        let json = r#"{
            "profiles": [{ "name": "r", "executor": "ramping-vus", "stages": [{"duration": 1e30, "target": 1}] }]
        }"#;
        assert!(matches!(
            TestConfig::from_json(json),
            Err(ConfigError::Parse(_))
        ));

        let stages = vec![
            Stage::new(Duration::MAX, 1),
            Stage::new(Duration::from_secs(1), 0),
        ];
        let profile = ProfileConfig::new("r", LoadProfile::ramping(stages));
        assert_eq!(profile.end_offset(), Duration::MAX);
        assert_eq!(
            profile.validate(),
            Err(ConfigError::TooLong("r".to_string()))
        );
    }

    #[test]
    fn parses_json_profiles() {
        let json = r#"{
            "name": "survey",
            "profiles": [
                {
                    "name": "off_peak_load",
                    "executor": "constant-arrival-rate",
                    "rate": 10,
                    "time_unit": "1m",
                    "duration": "5m",
                    "pre_allocated": 2,
                    "max_concurrency": 10
                },
                {
                    "name": "ramp",
                    "executor": "ramping-vus",
                    "start_offset": "5m",
                    "stages": [
                        { "duration": "2m", "target": 200 },
                        { "duration": "1m", "target": 0 }
                    ]
                }
            ],
            "thresholds": { "survey_details_duration": ["avg<200", "p(95) < 400"] }
        }"#;

        let config = TestConfig::from_json(json).unwrap();
        assert_eq!(config.profiles.len(), 2);

        let off_peak = &config.profiles[0];
        assert_eq!(off_peak.start_offset, Duration::ZERO);
        assert_eq!(off_peak.graceful_stop, DEFAULT_GRACEFUL_STOP);
        assert_eq!(
            off_peak.profile,
            LoadProfile::ConstantArrivalRate(ArrivalRate {
                rate: 10,
                time_unit: Duration::from_secs(60),
                duration: Duration::from_secs(300),
                pre_allocated: 2,
                max_concurrency: 10,
            })
        );

        let ramp = &config.profiles[1];
        assert_eq!(ramp.start_offset, Duration::from_secs(300));
        assert_eq!(ramp.profile.duration(), Duration::from_secs(180));
        assert_eq!(ramp.end_offset(), Duration::from_secs(480));

        assert_eq!(config.thresholds().len(), 2);
    }

    #[test]
    fn rejects_invalid_concurrency_bounds() {
        let profile = ProfileConfig::new(
            "bad",
            LoadProfile::ConstantArrivalRate(ArrivalRate {
                rate: 1,
                time_unit: Duration::from_secs(1),
                duration: Duration::from_secs(1),
                pre_allocated: 5,
                max_concurrency: 2,
            }),
        );
        assert_eq!(
            profile.validate(),
            Err(ConfigError::ConcurrencyBounds {
                name: "bad".to_string(),
                pre_allocated: 5,
                max: 2
            })
        );
    }

    #[test]
    fn rejects_empty_and_duplicate_profiles() {
        assert_eq!(validate_profiles(&[]), Err(ConfigError::NoProfiles));

        let empty = ProfileConfig::new("empty", LoadProfile::ramping(vec![]));
        assert_eq!(
            validate_profiles(&[empty]),
            Err(ConfigError::EmptyStages("empty".to_string()))
        );

        let a = ProfileConfig::new(
            "a",
            LoadProfile::ramping(vec![Stage::new(Duration::from_secs(1), 1)]),
        );
        assert_eq!(
            validate_profiles(&[a.clone(), a]),
            Err(ConfigError::DuplicateProfile("a".to_string()))
        );
    }

    #[test]
    fn rejects_bad_threshold_in_config() {
        let json = r#"{
            "profiles": [{ "name": "r", "executor": "ramping-vus", "stages": [{"duration": "1s", "target": 1}] }],
            "thresholds": { "x": ["avg<<2"] }
        }"#;
        assert!(matches!(
            TestConfig::from_json(json),
            Err(ConfigError::Parse(_))
        ));
    }
}
