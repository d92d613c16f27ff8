//! Difficulty levels and the adaptive adjustment rule.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Question difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Self::Easy, Self::Medium, Self::Hard];

    /// One level harder, capped at Hard.
    pub fn harder(self) -> Self {
        match self {
            Self::Easy => Self::Medium,
            Self::Medium | Self::Hard => Self::Hard,
        }
    }

    /// One level easier, floored at Easy.
    pub fn easier(self) -> Self {
        match self {
            Self::Hard => Self::Medium,
            Self::Medium | Self::Easy => Self::Easy,
        }
    }

    /// Ordinal used to measure distance between levels.
    pub fn level(self) -> u8 {
        match self {
            Self::Easy => 0,
            Self::Medium => 1,
            Self::Hard => 2,
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Difficulty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(ConfigError::InvalidValue {
                key: "difficulty".to_string(),
                message: format!("unknown difficulty '{other}'"),
            }),
        }
    }
}

/// Score thresholds that move difficulty after each evaluated turn.
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyPolicy {
    /// Aggregate at or above this raises difficulty one level.
    pub raise_at: f64,
    /// Aggregate at or below this lowers difficulty one level.
    pub lower_at: f64,
}

impl Default for DifficultyPolicy {
    fn default() -> Self {
        Self {
            raise_at: 7.5,
            lower_at: 4.0,
        }
    }
}

impl DifficultyPolicy {
    /// Difficulty for the next question. Never moves more than one level.
    pub fn next(&self, current: Difficulty, aggregate: f64) -> Difficulty {
        if aggregate >= self.raise_at {
            current.harder()
        } else if aggregate <= self.lower_at {
            current.easier()
        } else {
            current
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lower_at < self.raise_at) {
            return Err(ConfigError::InvalidValue {
                key: "difficulty".to_string(),
                message: format!(
                    "lower_at ({}) must be below raise_at ({})",
                    self.lower_at, self.raise_at
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_medium_8_3_6() {
        let policy = DifficultyPolicy::default();
        let mut trail = vec![Difficulty::Medium];
        for score in [8.0, 3.0, 6.0] {
            let next = policy.next(*trail.last().unwrap(), score);
            trail.push(next);
        }
        assert_eq!(
            trail,
            vec![
                Difficulty::Medium,
                Difficulty::Hard,
                Difficulty::Medium,
                Difficulty::Medium
            ]
        );
    }

    #[test]
    fn boundaries_are_inclusive() {
        let policy = DifficultyPolicy::default();
        assert_eq!(policy.next(Difficulty::Medium, 7.5), Difficulty::Hard);
        assert_eq!(policy.next(Difficulty::Medium, 7.49), Difficulty::Medium);
        assert_eq!(policy.next(Difficulty::Medium, 4.0), Difficulty::Easy);
        assert_eq!(policy.next(Difficulty::Medium, 4.01), Difficulty::Medium);
    }

    #[test]
    fn capped_and_floored() {
        let policy = DifficultyPolicy::default();
        assert_eq!(policy.next(Difficulty::Hard, 10.0), Difficulty::Hard);
        assert_eq!(policy.next(Difficulty::Easy, 0.0), Difficulty::Easy);
    }

    #[test]
    fn never_moves_more_than_one_level() {
        let policy = DifficultyPolicy::default();
        let mut current = Difficulty::Easy;
        // Deterministic sweep over scores in [0, 10].
        for i in 0..500u32 {
            let score = f64::from((i * 37) % 101) / 10.0;
            let next = policy.next(current, score);
            assert!(current.level().abs_diff(next.level()) <= 1);
            current = next;
        }
    }

    #[test]
    fn parse_difficulty() {
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("brutal".parse::<Difficulty>().is_err());
    }
}
