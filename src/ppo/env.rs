//! Multi-agent environment interface - gym-like contract consumed by the training loop

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// State vector observed by one agent
pub type Observation = Vec<f32>;

/// Step result from the environment, indexed by agent
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation per agent
    pub observations: Vec<Observation>,
    /// Reward per agent
    pub rewards: Vec<f32>,
    /// Environment-reported done flag per agent
    pub dones: Vec<bool>,
    /// Auxiliary numeric information
    pub info: BTreeMap<String, f32>,
}

/// Environment driven by the training loop. Agent identifiers are the
/// indices `0..num_agents()` of every per-agent vector.
pub trait MultiAgentEnv {
    fn num_agents(&self) -> usize;

    /// Start a new episode and return the first observations
    fn reset(&mut self) -> Vec<Observation>;

    /// Apply one action per agent
    fn step(&mut self, actions: &[usize]) -> StepResult;
}

/// Contextual bandit: each agent sees `[x, 1.0]` with `x` uniform in
/// `[-1, 1)` and earns 1 for action 1 when `x > 0`, for action 0 otherwise.
#[derive(Debug, Clone)]
pub struct SignMatchingEnv {
    num_agents: usize,
    rng: StdRng,
    signals: Vec<f32>,
}

impl SignMatchingEnv {
    pub const NUM_STATE: usize = 2;
    pub const NUM_ACTION: usize = 2;

    pub fn new(num_agents: usize, seed: u64) -> Self {
        Self {
            num_agents,
            rng: StdRng::seed_from_u64(seed),
            signals: vec![0.0; num_agents],
        }
    }

    fn draw(&mut self) -> Vec<Observation> {
        for signal in &mut self.signals {
            *signal = self.rng.random_range(-1.0..1.0);
        }
        self.signals.iter().map(|&x| vec![x, 1.0]).collect()
    }
}

impl MultiAgentEnv for SignMatchingEnv {
    fn num_agents(&self) -> usize {
        self.num_agents
    }

    fn reset(&mut self) -> Vec<Observation> {
        self.draw()
    }

    fn step(&mut self, actions: &[usize]) -> StepResult {
        let rewards: Vec<f32> = self
            .signals
            .iter()
            .zip(actions)
            .map(|(&x, &action)| {
                let wanted = usize::from(x > 0.0);
                if action == wanted { 1.0 } else { 0.0 }
            })
            .collect();

        let mut info = BTreeMap::new();
        info.insert(
            "matched".to_string(),
            rewards.iter().sum::<f32>() / self.num_agents.max(1) as f32,
        );

        StepResult {
            observations: self.draw(),
            rewards,
            dones: vec![false; self.num_agents],
            info,
        }
    }
}
