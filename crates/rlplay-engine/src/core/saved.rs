use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::{
    config::{
        A2cConfig, Algorithm, BanditConfig, ConfigError, PolicyGradientConfig, PpoConfig,
        RewardNoise, RunConfig, TabularConfig, TdLambdaConfig, TrpoConfig,
    },
    grid::GridLayout,
};

/// Flat save/load format of a run configuration.
///
/// Holds the algorithm id, the full parameter map and the grid layout. It
/// never contains recorded steps.
///
/// ```
/// use rlplay_engine::{Algorithm, RunConfig, SavedConfig};
///
/// let config = RunConfig::default_for(Algorithm::Sarsa);
/// let saved = SavedConfig::from_run_config(&config);
/// assert_eq!(saved.parameters["alpha"], 0.1);
/// assert_eq!(saved.to_run_config().unwrap(), config);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedConfig {
    pub algorithm: Algorithm,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub grid: GridLayout,
}

const GRID_KEYS: [&str; 3] = ["grid", "grid_width", "grid_height"];

impl SavedConfig {
    #[must_use]
    pub fn from_run_config(config: &RunConfig) -> Self {
        let mut parameters = match config.request_body() {
            Value::Object(map) => map
                .into_iter()
                .filter(|(key, _)| !GRID_KEYS.contains(&key.as_str()))
                .collect::<BTreeMap<_, _>>(),
            _ => BTreeMap::new(),
        };
        if let RunConfig::Bandit(bandit) = config {
            parameters.insert("noise".to_owned(), serde_json::json!(bandit.noise));
            if let Some(seed) = bandit.seed {
                parameters.insert("seed".to_owned(), Value::String(seed.to_string()));
            }
        }
        Self {
            algorithm: config.algorithm(),
            parameters,
            grid: config.grid().cloned().unwrap_or_default(),
        }
    }

    /// Rebuilds and validates the run configuration.
    ///
    /// Missing parameters take the algorithm's defaults; parameters of the
    /// wrong type are rejected.
    pub fn to_run_config(&self) -> Result<RunConfig, ConfigError> {
        let params = Params(&self.parameters);
        let tabular = |d: TabularConfig| -> Result<TabularConfig, ConfigError> {
            Ok(TabularConfig {
                grid: self.grid.clone(),
                n_episodes: params.get("n_episodes", d.n_episodes)?,
                alpha: params.get("alpha", d.alpha)?,
                gamma: params.get("gamma", d.gamma)?,
                epsilon: params.get("epsilon", d.epsilon)?,
            })
        };
        let policy = |d: PolicyGradientConfig| -> Result<PolicyGradientConfig, ConfigError> {
            Ok(PolicyGradientConfig {
                grid: self.grid.clone(),
                n_episodes: params.get("n_episodes", d.n_episodes)?,
                learning_rate: params.get("learning_rate", d.learning_rate)?,
                gamma: params.get("gamma", d.gamma)?,
            })
        };

        let config = match self.algorithm {
            Algorithm::Bandit => {
                let d = BanditConfig::default();
                RunConfig::Bandit(BanditConfig {
                    n_arms: params.get("n_arms", d.n_arms)?,
                    n_episodes: params.get("n_episodes", d.n_episodes)?,
                    epsilon: params.get("epsilon", d.epsilon)?,
                    initial_q: params.get("initial_q", d.initial_q)?,
                    noise: params.get::<RewardNoise>("noise", d.noise)?,
                    seed: params.get("seed", d.seed)?,
                })
            }
            Algorithm::QLearning => RunConfig::QLearning(tabular(TabularConfig::default())?),
            Algorithm::Sarsa => RunConfig::Sarsa(tabular(TabularConfig::default())?),
            Algorithm::TdLambda => {
                let d = TdLambdaConfig::default();
                RunConfig::TdLambda(TdLambdaConfig {
                    lambda: params.get("lambda_", d.lambda)?,
                    tabular: tabular(d.tabular)?,
                })
            }
            Algorithm::Reinforce => RunConfig::Reinforce(policy(PolicyGradientConfig::default())?),
            Algorithm::A2c => {
                let d = A2cConfig::default();
                RunConfig::A2c(A2cConfig {
                    entropy_coef: params.get("entropy_coef", d.entropy_coef)?,
                    value_coef: params.get("value_coef", d.value_coef)?,
                    base: policy(d.base)?,
                })
            }
            Algorithm::Trpo => {
                let d = TrpoConfig::default();
                RunConfig::Trpo(TrpoConfig {
                    max_kl: params.get("max_kl", d.max_kl)?,
                    base: policy(d.base)?,
                })
            }
            Algorithm::Ppo => {
                let d = PpoConfig::default();
                RunConfig::Ppo(PpoConfig {
                    clip_ratio: params.get("clip_ratio", d.clip_ratio)?,
                    base: policy(d.base)?,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }
}

struct Params<'a>(&'a BTreeMap<String, Value>);

impl Params<'_> {
    fn get<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|e| ConfigError::InvalidParameter {
                    name: name.to_owned(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
