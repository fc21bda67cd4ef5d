use std::time::Duration;

use rand::{Rng as _, SeedableRng as _};
use rand_distr::{Distribution as _, Normal};
use rand_pcg::Pcg32;
use rlplay_stats::running::CumulativeRate;
use serde::Serialize;

use crate::core::{AgentState, ArmStats, BanditConfig, RewardNoise, RunSeed, StepRecord, argmax};

/// Range the hidden arm values are drawn from.
pub const TRUE_VALUE_RANGE: std::ops::Range<f64> = -0.5..1.5;

const FAST_TICK: Duration = Duration::from_millis(10);
const SLOW_TICK: Duration = Duration::from_millis(30);

/// One point of the sampled aggregate history of a bandit run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSample {
    pub episode: u32,
    pub mean_estimate: f64,
    pub optimal_rate: f64,
}

/// What [`BanditStepper::reconfigure`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum Reconfigured {
    /// Only in-place parameters changed; counters are kept.
    InPlace,
    /// The learner was rebuilt from scratch.
    Reinitialized,
}

/// Epsilon-greedy bandit learner, advanced one pull at a time.
///
/// Hidden arm values are drawn once from [`TRUE_VALUE_RANGE`] and held for
/// the lifetime of the stepper. Every random draw comes from a [`Pcg32`]
/// seeded by the run seed, so a seed reproduces the whole run.
#[derive(Debug, Clone)]
pub struct BanditStepper {
    config: BanditConfig,
    seed: RunSeed,
    rng: Pcg32,
    true_values: Vec<f64>,
    optimal_arm: usize,
    estimates: Vec<f64>,
    counts: Vec<u32>,
    optimal_rate: CumulativeRate,
    next_episode: u32,
    history: Vec<RateSample>,
}

impl BanditStepper {
    /// Creates a stepper with freshly drawn hidden values.
    ///
    /// Uses `config.seed` when present, otherwise a random seed.
    #[must_use]
    pub fn new(config: BanditConfig) -> Self {
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = Pcg32::from_seed(seed.0);
        let true_values = (0..config.n_arms)
            .map(|_| rng.random_range(TRUE_VALUE_RANGE))
            .collect();
        Self::build(config, seed, rng, true_values)
    }

    /// Creates a stepper with the given hidden values (one per arm).
    ///
    /// `config.n_arms` is overridden by `true_values.len()`.
    #[must_use]
    pub fn with_true_values(mut config: BanditConfig, true_values: Vec<f64>) -> Self {
        config.n_arms = true_values.len();
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let rng = Pcg32::from_seed(seed.0);
        Self::build(config, seed, rng, true_values)
    }

    fn build(config: BanditConfig, seed: RunSeed, rng: Pcg32, true_values: Vec<f64>) -> Self {
        let optimal_arm = argmax(&true_values).unwrap_or(0);
        let n_arms = true_values.len();
        Self {
            estimates: vec![config.initial_q; n_arms],
            counts: vec![0; n_arms],
            config,
            seed,
            rng,
            true_values,
            optimal_arm,
            optimal_rate: CumulativeRate::new(),
            next_episode: 0,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &BanditConfig {
        &self.config
    }

    #[must_use]
    pub const fn seed(&self) -> RunSeed {
        self.seed
    }

    #[must_use]
    pub fn true_values(&self) -> &[f64] {
        &self.true_values
    }

    #[must_use]
    pub const fn optimal_arm(&self) -> usize {
        self.optimal_arm
    }

    #[must_use]
    pub fn estimates(&self) -> &[f64] {
        &self.estimates
    }

    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    #[must_use]
    pub fn optimal_rate(&self) -> f64 {
        self.optimal_rate.rate()
    }

    #[must_use]
    pub fn history(&self) -> &[RateSample] {
        &self.history
    }

    #[must_use]
    pub const fn episodes_done(&self) -> u32 {
        self.next_episode
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.next_episode >= self.config.n_episodes
    }

    /// Delay between two pulls: long runs tick faster.
    #[must_use]
    pub const fn tick_delay(&self) -> Duration {
        if self.config.n_episodes > 500 {
            FAST_TICK
        } else {
            SLOW_TICK
        }
    }

    /// Pulls one arm and returns the resulting record, or `None` once the
    /// planned number of episodes has been produced.
    pub fn step(&mut self) -> Option<StepRecord> {
        if self.is_finished() {
            return None;
        }
        let episode = self.next_episode;
        let arm = self.select_arm();
        let reward = self.true_values[arm] + self.sample_noise();

        self.counts[arm] += 1;
        let q = &mut self.estimates[arm];
        *q += (reward - *q) / f64::from(self.counts[arm]);

        let is_optimal = arm == self.optimal_arm;
        self.optimal_rate.push(is_optimal);
        self.next_episode += 1;
        self.sample_history(episode);

        let stats = ArmStats {
            estimates: self.estimates.clone(),
            counts: self.counts.clone(),
            optimal_arm: self.optimal_arm,
            optimal_rate: Some(self.optimal_rate.rate()),
        };
        Some(
            StepRecord::new(episode, reward, AgentState::Arm(arm), arm)
                .with_optimal(is_optimal)
                .with_arm_stats(stats),
        )
    }

    /// Applies a new configuration to a running learner.
    ///
    /// Changing the arm count, the seed or the initial estimate rebuilds the
    /// learner (new hidden values, zeroed counters). Epsilon, noise and the
    /// episode budget are applied in place.
    pub fn reconfigure(&mut self, config: BanditConfig) -> Reconfigured {
        if self.requires_rebuild(&config) {
            tracing::debug!(n_arms = config.n_arms, "reinitializing bandit learner");
            *self = Self::new(config);
            return Reconfigured::Reinitialized;
        }
        self.config.epsilon = config.epsilon;
        self.config.noise = config.noise;
        self.config.n_episodes = config.n_episodes;
        Reconfigured::InPlace
    }

    /// Whether applying `config` would discard the learner's state.
    #[must_use]
    pub fn requires_rebuild(&self, config: &BanditConfig) -> bool {
        config.n_arms != self.config.n_arms
            || config.seed.is_some_and(|seed| seed != self.seed)
            || config.initial_q.to_bits() != self.config.initial_q.to_bits()
    }

    fn select_arm(&mut self) -> usize {
        let explore = self.rng.random::<f64>() < self.config.epsilon;
        if explore {
            return self.rng.random_range(0..self.true_values.len());
        }
        // arms never pulled count as +inf so each one is tried once first
        self.counts
            .iter()
            .position(|&c| c == 0)
            .or_else(|| argmax(&self.estimates))
            .unwrap_or(0)
    }

    fn sample_noise(&mut self) -> f64 {
        match self.config.noise {
            RewardNoise::None => 0.0,
            RewardNoise::Uniform { half_width } if half_width > 0.0 => {
                self.rng.random_range(-half_width..=half_width)
            }
            RewardNoise::Uniform { .. } => 0.0,
            RewardNoise::Gaussian { std_dev } => {
                Normal::new(0.0, std_dev).map_or(0.0, |normal| normal.sample(&mut self.rng))
            }
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn sample_history(&mut self, episode: u32) {
        let interval = (self.config.n_episodes / 100).max(1);
        if episode % interval != 0 && !self.is_finished() {
            return;
        }
        let mean_estimate = if self.estimates.is_empty() {
            0.0
        } else {
            self.estimates.iter().sum::<f64>() / self.estimates.len() as f64
        };
        self.history.push(RateSample {
            episode,
            mean_estimate,
            optimal_rate: self.optimal_rate.rate(),
        });
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn noiseless(n_episodes: u32, epsilon: f64) -> BanditConfig {
        BanditConfig {
            n_episodes,
            epsilon,
            noise: RewardNoise::None,
            seed: Some(RunSeed::from_u128(7)),
            ..BanditConfig::default()
        }
    }

    #[test]
    fn test_untried_arms_are_pulled_first() {
        let mut stepper =
            BanditStepper::with_true_values(noiseless(50, 0.0), vec![0.1, 0.3, 0.9, 0.2, 0.5]);
        let actions = (0..50)
            .map_while(|_| stepper.step())
            .map(|r| r.action)
            .collect::<Vec<_>>();
        assert_eq!(actions.len(), 50);
        assert_eq!(&actions[..5], &[0, 1, 2, 3, 4]);
        assert!(actions[5..].iter().all(|&a| a == 2));
        assert!(stepper.is_finished());
        assert_eq!(stepper.step(), None);
    }

    #[test]
    fn test_estimates_are_incremental_means() {
        let config = BanditConfig {
            noise: RewardNoise::Uniform { half_width: 0.25 },
            ..noiseless(200, 0.3)
        };
        let mut stepper = BanditStepper::with_true_values(config, vec![0.0, 1.0, 0.5]);
        let mut sums = [0.0; 3];
        while let Some(record) = stepper.step() {
            sums[record.action] += record.reward;
            let AgentState::Arm(arm) = record.agent_state else {
                panic!("bandit records carry an arm");
            };
            assert_eq!(arm, record.action);
        }
        for arm in 0..3 {
            let count = stepper.counts()[arm];
            if count > 0 {
                let mean = sums[arm] / f64::from(count);
                assert!((stepper.estimates()[arm] - mean).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_same_seed_same_run() {
        let config = BanditConfig {
            seed: Some(RunSeed::from_u128(0xdead_beef)),
            ..BanditConfig::default()
        };
        let mut a = BanditStepper::new(config.clone());
        let mut b = BanditStepper::new(config);
        assert_eq!(a.true_values(), b.true_values());
        for _ in 0..100 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn test_true_values_in_range() {
        let stepper = BanditStepper::new(BanditConfig {
            n_arms: 20,
            ..BanditConfig::default()
        });
        assert_eq!(stepper.true_values().len(), 20);
        assert!(stepper.true_values().iter().all(|v| TRUE_VALUE_RANGE.contains(v)));
    }

    #[test]
    fn test_tick_delay_depends_on_length() {
        let short = BanditStepper::new(noiseless(500, 0.1));
        let long = BanditStepper::new(noiseless(501, 0.1));
        assert_eq!(short.tick_delay(), Duration::from_millis(30));
        assert_eq!(long.tick_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_history_is_sampled() {
        let mut stepper = BanditStepper::new(noiseless(1000, 0.1));
        while stepper.step().is_some() {}
        let history = stepper.history();
        // every 10th episode plus the final one
        assert_eq!(history.len(), 101);
        assert_eq!(history[1].episode, 10);
        assert_eq!(history.last().map(|s| s.episode), Some(999));
    }

    #[test]
    fn test_reconfigure_arm_count_rebuilds() {
        let mut stepper = BanditStepper::new(noiseless(100, 0.1));
        for _ in 0..10 {
            stepper.step();
        }
        let outcome = stepper.reconfigure(BanditConfig {
            n_arms: 3,
            ..noiseless(100, 0.1)
        });
        assert!(outcome.is_reinitialized());
        assert_eq!(stepper.counts(), &[0, 0, 0]);
        assert_eq!(stepper.estimates().len(), 3);
        assert_eq!(stepper.episodes_done(), 0);
    }

    #[test]
    fn test_reconfigure_epsilon_in_place() {
        let mut stepper = BanditStepper::new(noiseless(100, 0.1));
        for _ in 0..10 {
            stepper.step();
        }
        assert!(stepper.reconfigure(noiseless(100, 0.5)).is_in_place());
        assert_eq!(stepper.episodes_done(), 10);
        assert!((stepper.config().epsilon - 0.5).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn prop_greedy_without_noise(
            values in prop::collection::vec(-0.5f64..1.5, 2..10),
            seed in any::<u128>(),
        ) {
            let config = BanditConfig {
                seed: Some(RunSeed::from_u128(seed)),
                ..noiseless(1000, 0.0)
            };
            let mut stepper = BanditStepper::with_true_values(config, values);
            for _ in 0..1000 {
                let counts = stepper.counts().to_vec();
                let estimates = stepper.estimates().to_vec();
                let expected = counts
                    .iter()
                    .position(|&c| c == 0)
                    .or_else(|| argmax(&estimates))
                    .unwrap();
                let record = stepper.step().unwrap();
                prop_assert_eq!(record.action, expected);
            }
        }
    }
}
