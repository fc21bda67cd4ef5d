//! Run configuration.
//!
//! A run is described by a [`RunConfig`], a sum type over the supported
//! algorithm families. Each variant carries only the parameters meaningful to
//! it, and the variant is resolved once when a run starts.
//!
//! [`RunConfig::request_body`] renders the configuration in the shape the
//! remote run-request interface expects; [`SavedConfig`](super::saved::SavedConfig)
//! is the flat save/load format.

use std::{fmt, str::FromStr};

use rand::{
    Rng,
    distr::{Distribution, StandardUniform},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

use super::grid::GridLayout;

/// Configuration error, detected before a run starts.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[display("{name} must be a finite number")]
    NotFinite { name: &'static str },
    #[display("grid cell ({x}, {y}) lies outside the {width}x{height} grid")]
    CellOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[display("unknown algorithm `{_0}`")]
    UnknownAlgorithm(#[error(not(source))] String),
    #[display("parameter `{name}` is invalid: {reason}")]
    InvalidParameter { name: String, reason: String },
}

/// Supported algorithm identifiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[display("bandit")]
    Bandit,
    #[serde(rename = "qlearning")]
    #[display("qlearning")]
    QLearning,
    #[display("sarsa")]
    Sarsa,
    #[display("td_lambda")]
    TdLambda,
    #[display("reinforce")]
    Reinforce,
    #[display("a2c")]
    A2c,
    #[display("trpo")]
    Trpo,
    #[display("ppo")]
    Ppo,
}

impl Algorithm {
    pub const ALL: [Self; 8] = [
        Self::Bandit,
        Self::QLearning,
        Self::Sarsa,
        Self::TdLambda,
        Self::Reinforce,
        Self::A2c,
        Self::Trpo,
        Self::Ppo,
    ];

    /// Whether the producer publishes a per-episode value table.
    #[must_use]
    pub const fn is_value_based(self) -> bool {
        matches!(self, Self::QLearning | Self::Sarsa | Self::TdLambda)
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.to_string() == s)
            .ok_or_else(|| ConfigError::UnknownAlgorithm(s.to_owned()))
    }
}

/// Where a run's steps are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum Execution {
    /// In this process, one step per timer tick.
    Local,
    /// By the remote backend, delivered over a stream.
    Remote,
}

/// Seed for deterministic bandit runs.
///
/// A 128-bit seed, serialized as a 32-character hex string. The same seed
/// reproduces the same hidden arm values and the same exploration choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSeed(pub(crate) [u8; 16]);

impl RunSeed {
    #[must_use]
    pub fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for RunSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", u128::from_be_bytes(self.0))
    }
}

impl FromStr for RunSeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(format!(
                "invalid hex: expected 32 characters, got {}",
                s.len()
            ));
        }
        let num = u128::from_str_radix(s, 16).map_err(|e| format!("invalid hex: {s} ({e})"))?;
        Ok(Self::from_u128(num))
    }
}

impl Serialize for RunSeed {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RunSeed {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        hex_str.parse().map_err(serde::de::Error::custom)
    }
}

impl Distribution<RunSeed> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> RunSeed {
        let mut seed = [0; 16];
        rng.fill(&mut seed);
        RunSeed(seed)
    }
}

/// Noise added to an arm's hidden value when it is pulled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardNoise {
    None,
    Uniform { half_width: f64 },
    Gaussian { std_dev: f64 },
}

impl Default for RewardNoise {
    fn default() -> Self {
        Self::Uniform { half_width: 0.25 }
    }
}

impl RewardNoise {
    fn validate(self) -> Result<(), ConfigError> {
        match self {
            Self::None => Ok(()),
            Self::Uniform { half_width: v } | Self::Gaussian { std_dev: v } => {
                check_range("reward noise", v, 0.0, f64::MAX)
            }
        }
    }
}

/// Epsilon-greedy multi-armed bandit.
#[derive(Debug, Clone, PartialEq)]
pub struct BanditConfig {
    pub n_arms: usize,
    pub n_episodes: u32,
    pub epsilon: f64,
    pub initial_q: f64,
    pub noise: RewardNoise,
    pub seed: Option<RunSeed>,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            n_arms: 5,
            n_episodes: 200,
            epsilon: 0.1,
            initial_q: 0.0,
            noise: RewardNoise::default(),
            seed: None,
        }
    }
}

impl BanditConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_count("n_arms", self.n_arms, 2, 20)?;
        check_count("n_episodes", self.n_episodes as usize, 10, 10_000)?;
        check_range("epsilon", self.epsilon, 0.0, 1.0)?;
        if !self.initial_q.is_finite() {
            return Err(ConfigError::NotFinite { name: "initial_q" });
        }
        self.noise.validate()
    }
}

/// Tabular grid learners (Q-learning, SARSA).
#[derive(Debug, Clone, PartialEq)]
pub struct TabularConfig {
    pub grid: GridLayout,
    pub n_episodes: u32,
    pub alpha: f64,
    pub gamma: f64,
    pub epsilon: f64,
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            grid: GridLayout::default(),
            n_episodes: 200,
            alpha: 0.1,
            gamma: 0.95,
            epsilon: 0.1,
        }
    }
}

impl TabularConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        check_count("n_episodes", self.n_episodes as usize, 10, 5000)?;
        check_range("alpha", self.alpha, 0.0, 1.0)?;
        check_range("gamma", self.gamma, 0.0, 1.0)?;
        check_range("epsilon", self.epsilon, 0.0, 1.0)
    }

    fn body(&self) -> Value {
        json!({
            "grid_width": self.grid.width,
            "grid_height": self.grid.height,
            "grid": self.grid.cells,
            "n_episodes": self.n_episodes,
            "alpha": self.alpha,
            "gamma": self.gamma,
            "epsilon": self.epsilon,
        })
    }
}

/// TD(λ) with eligibility traces.
#[derive(Debug, Clone, PartialEq)]
pub struct TdLambdaConfig {
    pub tabular: TabularConfig,
    pub lambda: f64,
}

impl Default for TdLambdaConfig {
    fn default() -> Self {
        Self {
            tabular: TabularConfig::default(),
            lambda: 0.8,
        }
    }
}

/// Shared policy-gradient parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyGradientConfig {
    pub grid: GridLayout,
    pub n_episodes: u32,
    pub learning_rate: f64,
    pub gamma: f64,
}

impl Default for PolicyGradientConfig {
    fn default() -> Self {
        Self {
            grid: GridLayout::default(),
            n_episodes: 200,
            learning_rate: 0.001,
            gamma: 0.99,
        }
    }
}

impl PolicyGradientConfig {
    fn validate(&self, max_episodes: usize) -> Result<(), ConfigError> {
        self.grid.validate()?;
        check_count("n_episodes", self.n_episodes as usize, 10, max_episodes)?;
        check_range("learning_rate", self.learning_rate, 0.0001, 0.01)?;
        check_range("gamma", self.gamma, 0.0, 1.0)
    }

    fn body(&self) -> Value {
        json!({
            "grid_width": self.grid.width,
            "grid_height": self.grid.height,
            "grid": self.grid.cells,
            "n_episodes": self.n_episodes,
            "learning_rate": self.learning_rate,
            "gamma": self.gamma,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct A2cConfig {
    pub base: PolicyGradientConfig,
    pub entropy_coef: f64,
    pub value_coef: f64,
}

impl Default for A2cConfig {
    fn default() -> Self {
        Self {
            base: PolicyGradientConfig::default(),
            entropy_coef: 0.01,
            value_coef: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrpoConfig {
    pub base: PolicyGradientConfig,
    pub max_kl: f64,
}

impl Default for TrpoConfig {
    fn default() -> Self {
        Self {
            base: PolicyGradientConfig::default(),
            max_kl: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PpoConfig {
    pub base: PolicyGradientConfig,
    pub clip_ratio: f64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            base: PolicyGradientConfig {
                learning_rate: 0.0003,
                ..PolicyGradientConfig::default()
            },
            clip_ratio: 0.2,
        }
    }
}

/// Configuration of one run, resolved to a single algorithm family.
#[derive(Debug, Clone, PartialEq)]
pub enum RunConfig {
    Bandit(BanditConfig),
    QLearning(TabularConfig),
    Sarsa(TabularConfig),
    TdLambda(TdLambdaConfig),
    Reinforce(PolicyGradientConfig),
    A2c(A2cConfig),
    Trpo(TrpoConfig),
    Ppo(PpoConfig),
}

impl RunConfig {
    /// Returns the default configuration for `algorithm`.
    #[must_use]
    pub fn default_for(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Bandit => Self::Bandit(BanditConfig::default()),
            Algorithm::QLearning => Self::QLearning(TabularConfig::default()),
            Algorithm::Sarsa => Self::Sarsa(TabularConfig::default()),
            Algorithm::TdLambda => Self::TdLambda(TdLambdaConfig::default()),
            Algorithm::Reinforce => Self::Reinforce(PolicyGradientConfig::default()),
            Algorithm::A2c => Self::A2c(A2cConfig::default()),
            Algorithm::Trpo => Self::Trpo(TrpoConfig::default()),
            Algorithm::Ppo => Self::Ppo(PpoConfig::default()),
        }
    }

    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        match self {
            Self::Bandit(_) => Algorithm::Bandit,
            Self::QLearning(_) => Algorithm::QLearning,
            Self::Sarsa(_) => Algorithm::Sarsa,
            Self::TdLambda(_) => Algorithm::TdLambda,
            Self::Reinforce(_) => Algorithm::Reinforce,
            Self::A2c(_) => Algorithm::A2c,
            Self::Trpo(_) => Algorithm::Trpo,
            Self::Ppo(_) => Algorithm::Ppo,
        }
    }

    /// Bandits run in-process; every grid family runs on the backend.
    #[must_use]
    pub const fn execution(&self) -> Execution {
        match self {
            Self::Bandit(_) => Execution::Local,
            _ => Execution::Remote,
        }
    }

    #[must_use]
    pub const fn planned_episodes(&self) -> u32 {
        match self {
            Self::Bandit(c) => c.n_episodes,
            Self::QLearning(c) | Self::Sarsa(c) => c.n_episodes,
            Self::TdLambda(c) => c.tabular.n_episodes,
            Self::Reinforce(c) => c.n_episodes,
            Self::A2c(c) => c.base.n_episodes,
            Self::Trpo(c) => c.base.n_episodes,
            Self::Ppo(c) => c.base.n_episodes,
        }
    }

    /// Returns the grid layout, or `None` for bandits.
    #[must_use]
    pub const fn grid(&self) -> Option<&GridLayout> {
        match self {
            Self::Bandit(_) => None,
            Self::QLearning(c) | Self::Sarsa(c) => Some(&c.grid),
            Self::TdLambda(c) => Some(&c.tabular.grid),
            Self::Reinforce(c) => Some(&c.grid),
            Self::A2c(c) => Some(&c.base.grid),
            Self::Trpo(c) => Some(&c.base.grid),
            Self::Ppo(c) => Some(&c.base.grid),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Bandit(c) => c.validate(),
            Self::QLearning(c) | Self::Sarsa(c) => c.validate(),
            Self::TdLambda(c) => {
                c.tabular.validate()?;
                check_range("lambda", c.lambda, 0.0, 1.0)
            }
            Self::Reinforce(c) => c.validate(3000),
            Self::A2c(c) => {
                c.base.validate(3000)?;
                check_range("entropy_coef", c.entropy_coef, 0.0, 0.1)?;
                check_range("value_coef", c.value_coef, 0.1, 1.0)
            }
            Self::Trpo(c) => {
                c.base.validate(2000)?;
                check_range("max_kl", c.max_kl, 0.001, 0.1)
            }
            Self::Ppo(c) => {
                c.base.validate(2000)?;
                check_range("clip_ratio", c.clip_ratio, 0.1, 0.5)
            }
        }
    }

    /// Renders the `config` object of a run request.
    #[must_use]
    pub fn request_body(&self) -> Value {
        let mut body = match self {
            Self::Bandit(c) => json!({
                "n_arms": c.n_arms,
                "n_episodes": c.n_episodes,
                "epsilon": c.epsilon,
                "initial_q": c.initial_q,
            }),
            Self::QLearning(c) | Self::Sarsa(c) => c.body(),
            Self::TdLambda(c) => c.tabular.body(),
            Self::Reinforce(c) => c.body(),
            Self::A2c(c) => c.base.body(),
            Self::Trpo(c) => c.base.body(),
            Self::Ppo(c) => c.base.body(),
        };
        let extra = match self {
            Self::TdLambda(c) => Some(("lambda_", c.lambda)),
            Self::A2c(c) => {
                body["value_coef"] = json!(c.value_coef);
                Some(("entropy_coef", c.entropy_coef))
            }
            Self::Trpo(c) => Some(("max_kl", c.max_kl)),
            Self::Ppo(c) => Some(("clip_ratio", c.clip_ratio)),
            _ => None,
        };
        if let Some((key, value)) = extra {
            body[key] = json!(value);
        }
        body
    }
}

/// A validated request for the remote run-request interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRequest {
    pub algorithm: Algorithm,
    pub config: Value,
}

impl From<&RunConfig> for RunRequest {
    fn from(config: &RunConfig) -> Self {
        Self {
            algorithm: config.algorithm(),
            config: config.request_body(),
        }
    }
}

pub(crate) fn check_range(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if value.is_nan() {
        return Err(ConfigError::NotFinite { name });
    }
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[expect(clippy::cast_precision_loss)]
fn check_count(name: &'static str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange {
            name,
            value: value as f64,
            min: min as f64,
            max: max as f64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::{CellKind, GridCell};

    #[test]
    fn test_defaults_are_valid() {
        for algorithm in Algorithm::ALL {
            let config = RunConfig::default_for(algorithm);
            assert_eq!(config.algorithm(), algorithm);
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_algorithm_ids_roundtrip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.to_string().parse::<Algorithm>().unwrap(), algorithm);
            let json = serde_json::to_string(&algorithm).unwrap();
            assert_eq!(json, format!("\"{algorithm}\""));
        }
        assert!(matches!(
            "dqn".parse::<Algorithm>(),
            Err(ConfigError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_bandit_ranges() {
        let mut config = BanditConfig {
            n_arms: 1,
            ..BanditConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "n_arms", .. })
        ));
        config.n_arms = 3;
        config.epsilon = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "epsilon", .. })
        ));
        config.epsilon = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotFinite { name: "epsilon" })
        ));
    }

    #[test]
    fn test_policy_gradient_episode_caps_differ() {
        let mut reinforce = PolicyGradientConfig {
            n_episodes: 2500,
            ..PolicyGradientConfig::default()
        };
        assert!(RunConfig::Reinforce(reinforce.clone()).validate().is_ok());
        reinforce.n_episodes += 1;
        let ppo = PpoConfig {
            base: reinforce,
            clip_ratio: 0.2,
        };
        assert!(RunConfig::Ppo(ppo).validate().is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let config = RunConfig::TdLambda(TdLambdaConfig {
            tabular: TabularConfig {
                grid: GridLayout::empty(6, 4).with_cell(GridCell::new(5, 3, CellKind::Goal, 5.0)),
                ..TabularConfig::default()
            },
            lambda: 0.5,
        });
        let request = RunRequest::from(&config);
        assert_eq!(request.algorithm, Algorithm::TdLambda);
        assert_eq!(request.config["grid_width"], 6);
        assert_eq!(request.config["grid_height"], 4);
        assert_eq!(request.config["lambda_"], 0.5);
        assert_eq!(request.config["grid"][0]["type"], "goal");

        let a2c = RunConfig::A2c(A2cConfig::default()).request_body();
        assert_eq!(a2c["value_coef"], 0.5);
        assert_eq!(a2c["entropy_coef"], 0.01);
    }

    #[test]
    fn test_execution_by_family() {
        assert!(RunConfig::default_for(Algorithm::Bandit).execution().is_local());
        assert!(RunConfig::default_for(Algorithm::Sarsa).execution().is_remote());
    }

    #[test]
    fn test_seed_hex_format() {
        let seed = RunSeed::from_u128(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210);
        let json = serde_json::to_string(&seed).unwrap();
        assert_eq!(json, "\"0123456789abcdeffedcba9876543210\"");
        let back: RunSeed = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seed);
        assert!(serde_json::from_str::<RunSeed>("\"abc\"").is_err());
    }
}
