//! Policy evaluation rollouts

use std::collections::BTreeMap;

use burn::tensor::backend::AutodiffBackend;

use super::agent::PPO;
use super::env::MultiAgentEnv;
use crate::error::{Error, Result};

/// Runs a policy evaluation and reports tagged results
pub trait Evaluator<B: AutodiffBackend> {
    fn evaluate(&mut self, agent: &PPO<B>, time_step: usize) -> Result<BTreeMap<String, f32>>;
}

/// Evaluation metrics accumulated over one or more test rollouts
#[derive(Debug, Clone, Default)]
pub struct EvaluationMetrics {
    /// Number of evaluation rollouts
    pub num_rollouts: usize,
    /// Environment steps across all rollouts
    pub total_steps: usize,
    /// Reward per agent across all rollouts
    pub agent_returns: Vec<f32>,
}

impl EvaluationMetrics {
    pub fn new(nb_agents: usize) -> Self {
        Self {
            num_rollouts: 0,
            total_steps: 0,
            agent_returns: vec![0.0; nb_agents],
        }
    }

    pub fn record_step(&mut self, rewards: &[f32]) {
        for (total, reward) in self.agent_returns.iter_mut().zip(rewards) {
            *total += reward;
        }
        self.total_steps += 1;
    }

    /// Mean return per agent and rollout
    pub fn mean_return(&self) -> f32 {
        if self.num_rollouts == 0 || self.agent_returns.is_empty() {
            0.0
        } else {
            self.agent_returns.iter().sum::<f32>()
                / (self.agent_returns.len() * self.num_rollouts) as f32
        }
    }

    /// Mean reward per agent and step
    pub fn mean_reward(&self) -> f32 {
        if self.total_steps == 0 || self.agent_returns.is_empty() {
            0.0
        } else {
            self.agent_returns.iter().sum::<f32>()
                / (self.agent_returns.len() * self.total_steps) as f32
        }
    }
}

/// Greedy rollouts of a fixed length on a dedicated environment
pub struct RolloutEvaluator<E: MultiAgentEnv> {
    env: E,
    nb_test_steps: usize,
}

impl<E: MultiAgentEnv> RolloutEvaluator<E> {
    pub fn new(env: E, nb_test_steps: usize) -> Self {
        Self { env, nb_test_steps }
    }

    /// Run one rollout and return its metrics
    pub fn rollout<B: AutodiffBackend>(&mut self, agent: &PPO<B>) -> Result<EvaluationMetrics> {
        let nb_agents = self.env.num_agents();
        if nb_agents != agent.nb_agents() {
            return Err(Error::AgentCountMismatch {
                expected: agent.nb_agents(),
                found: nb_agents,
            });
        }

        let mut metrics = EvaluationMetrics::new(nb_agents);
        let mut obs = self.env.reset();

        for _ in 0..self.nb_test_steps {
            let actions = agent.greedy_actions(&obs)?;
            let result = self.env.step(&actions);
            metrics.record_step(&result.rewards);
            obs = result.observations;
        }
        metrics.num_rollouts = 1;

        Ok(metrics)
    }
}

impl<B: AutodiffBackend, E: MultiAgentEnv> Evaluator<B> for RolloutEvaluator<E> {
    fn evaluate(&mut self, agent: &PPO<B>, time_step: usize) -> Result<BTreeMap<String, f32>> {
        let metrics = self.rollout(agent)?;

        tracing::info!(
            "Training step - {} - Mean test return: {:.3}",
            time_step,
            metrics.mean_return()
        );

        let mut logged = BTreeMap::new();
        logged.insert("test/mean_return".to_string(), metrics.mean_return());
        logged.insert("test/mean_reward".to_string(), metrics.mean_reward());
        logged.insert("Training steps".to_string(), time_step as f32);
        Ok(logged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppo::config::PPOConfig;
    use crate::ppo::env::SignMatchingEnv;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_evaluation_metrics() {
        let mut metrics = EvaluationMetrics::new(2);
        metrics.record_step(&[1.0, 0.0]);
        metrics.record_step(&[1.0, 1.0]);
        metrics.num_rollouts = 1;

        assert!((metrics.mean_return() - 1.5).abs() < 1e-6);
        assert!((metrics.mean_reward() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_rollout_evaluator_reports_results() {
        let agent = PPO::<TestBackend>::new(
            Default::default(),
            PPOConfig::new().with_actor_layers(vec![4]).with_critic_layers(vec![4]),
            SignMatchingEnv::NUM_STATE,
            SignMatchingEnv::NUM_ACTION,
            2,
            3,
        )
        .unwrap();
        let mut evaluator = RolloutEvaluator::new(SignMatchingEnv::new(2, 5), 10);

        let logged = evaluator.evaluate(&agent, 42).unwrap();
        let mean_return = logged["test/mean_return"];
        assert!((0.0..=10.0).contains(&mean_return));
        assert!((logged["Training steps"] - 42.0).abs() < 1e-6);
        assert!(agent.buffer().is_empty());
    }

    #[test]
    fn test_rollout_evaluator_rejects_agent_mismatch() {
        let agent = PPO::<TestBackend>::new(
            Default::default(),
            PPOConfig::new().with_actor_layers(vec![4]).with_critic_layers(vec![4]),
            SignMatchingEnv::NUM_STATE,
            SignMatchingEnv::NUM_ACTION,
            2,
            3,
        )
        .unwrap();
        let mut evaluator = RolloutEvaluator::new(SignMatchingEnv::new(3, 5), 10);
        assert!(evaluator.rollout(&agent).is_err());
    }
}
