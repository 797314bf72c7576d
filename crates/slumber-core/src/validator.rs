//! Awake validator.
//!
//! Scores a time range for wake-like activity from heart-rate and step
//! evidence. Lower scores mean more likely asleep; scores at or above
//! [`ValidatorConfig::awake_threshold`] are treated as awake.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{HeartRateSample, StepSample};

/// Score returned when heart-rate evidence is too sparse to judge.
pub const INCONCLUSIVE_SCORE: u8 = 3;

/// Highest possible score.
pub const MAX_SCORE: u8 = 7;

/// Thresholds for awake scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Ranges longer than this (minutes) are subject to the density check.
    /// Default: 30.
    pub sparse_span_min: f64,

    /// Minimum heart-rate samples per hour over long ranges. Default: 2.
    pub min_hr_samples_per_hour: f64,

    /// Average heart rate above this suggests wakefulness. Default: 70.
    pub avg_hr_bpm: f64,

    /// Peak heart rate above this suggests wakefulness. Default: 85.
    pub max_hr_bpm: f64,

    /// A step sample above this count is significant. Default: 2.
    pub significant_step_count: f64,

    /// Significant step samples per hour above this suggest wakefulness.
    /// Default: 1.
    pub significant_steps_per_hour: f64,

    /// Total steps per hour above this suggest wakefulness. Default: 20.
    pub steps_per_hour: f64,

    /// Scores at or above this are awake. Default: 3.
    pub awake_threshold: u8,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            sparse_span_min: 30.0,
            min_hr_samples_per_hour: 2.0,
            avg_hr_bpm: 70.0,
            max_hr_bpm: 85.0,
            significant_step_count: 2.0,
            significant_steps_per_hour: 1.0,
            steps_per_hour: 20.0,
            awake_threshold: INCONCLUSIVE_SCORE,
        }
    }
}

impl ValidatorConfig {
    pub const fn is_awake(&self, score: u8) -> bool {
        score >= self.awake_threshold
    }

    /// Whether the evidence rules the range awake. Sparse evidence is always
    /// awake, whatever the threshold.
    pub fn judges_awake(&self, evidence: &AwakeEvidence) -> bool {
        match evidence {
            AwakeEvidence::Sparse { .. } => true,
            AwakeEvidence::Observed { .. } => self.is_awake(evidence.score(self)),
        }
    }
}

/// Evidence gathered over one range.
#[derive(Debug, Clone, PartialEq)]
pub enum AwakeEvidence {
    /// Heart-rate density below the minimum over a long range.
    Sparse { span_min: f64, hr_samples: usize },
    /// Enough evidence to score.
    Observed {
        span_min: f64,
        avg_hr: Option<f64>,
        max_hr: Option<f64>,
        steps_per_hour: f64,
        significant_steps_per_hour: f64,
    },
}

impl AwakeEvidence {
    /// Collapses the evidence into a score in `[0, 7]`.
    pub fn score(&self, config: &ValidatorConfig) -> u8 {
        match self {
            Self::Sparse { .. } => INCONCLUSIVE_SCORE,
            Self::Observed {
                avg_hr,
                max_hr,
                steps_per_hour,
                significant_steps_per_hour,
                ..
            } => {
                let mut score = 0;
                if avg_hr.is_some_and(|hr| hr > config.avg_hr_bpm) {
                    score += 2;
                }
                if max_hr.is_some_and(|hr| hr > config.max_hr_bpm) {
                    score += 1;
                }
                if *significant_steps_per_hour > config.significant_steps_per_hour {
                    score += 2;
                }
                if *steps_per_hour > config.steps_per_hour {
                    score += 2;
                }
                score
            }
        }
    }
}

/// Gathers evidence over `[start, end)`. Sample order does not matter.
#[allow(clippy::cast_precision_loss)]
pub fn gather(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    hr_samples: &[HeartRateSample],
    step_samples: &[StepSample],
    config: &ValidatorConfig,
) -> AwakeEvidence {
    let in_range = |instant: DateTime<Utc>| start <= instant && instant < end;
    let span_min = if end > start {
        (end - start).num_seconds() as f64 / 60.0
    } else {
        0.0
    };
    let hours = span_min / 60.0;

    let heart_rates: Vec<f64> = hr_samples
        .iter()
        .filter(|sample| in_range(sample.instant))
        .map(|sample| sample.value)
        .collect();

    if span_min > config.sparse_span_min
        && (heart_rates.len() as f64) < config.min_hr_samples_per_hour * hours
    {
        return AwakeEvidence::Sparse {
            span_min,
            hr_samples: heart_rates.len(),
        };
    }

    let (avg_hr, max_hr) = if heart_rates.is_empty() {
        (None, None)
    } else {
        let sum: f64 = heart_rates.iter().sum();
        let max = heart_rates.iter().copied().fold(f64::MIN, f64::max);
        (Some(sum / heart_rates.len() as f64), Some(max))
    };

    let (total_steps, significant) = step_samples
        .iter()
        .filter(|sample| in_range(sample.instant))
        .fold((0.0, 0_usize), |(total, significant), sample| {
            let is_significant = sample.value > config.significant_step_count;
            (total + sample.value, significant + usize::from(is_significant))
        });

    let per_hour = |value: f64| if hours > 0.0 { value / hours } else { 0.0 };

    AwakeEvidence::Observed {
        span_min,
        avg_hr,
        max_hr,
        steps_per_hour: per_hour(total_steps),
        significant_steps_per_hour: per_hour(significant as f64),
    }
}

/// Scores `[start, end)` for awake-likelihood, in `[0, 7]`.
pub fn score(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    hr_samples: &[HeartRateSample],
    step_samples: &[StepSample],
    config: &ValidatorConfig,
) -> u8 {
    gather(start, end, hr_samples, step_samples, config).score(config)
}
