//! PPO trainable - action selection, transition buffering and the clipped-surrogate update

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::buffer::{Transition, TransitionBuffer};
use super::config::PPOConfig;
use super::env::Observation;
use super::grad::clip_grad_norm;
use super::network::{Actor, Critic};
use super::returns::ReturnEstimator;
use crate::error::{Error, Result};

/// Averages over the minibatches of one update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateStats {
    pub actor_loss: f32,
    pub critic_loss: f32,
    /// Mean raw probability ratio
    pub ratio: f32,
    /// Mean ratio after clipping
    pub clipped_ratio: f32,
    /// Mean actor gradient norm before clipping
    pub grad_norm: f32,
    /// Number of optimizer steps taken
    pub minibatches: usize,
}

/// Actions and their probabilities from the latest `select_actions` call
#[derive(Debug, Clone)]
struct ActionCache {
    actions: Vec<usize>,
    probs: Vec<f32>,
}

/// Multi-agent PPO with independent actor and critic optimizers
pub struct PPO<B: AutodiffBackend> {
    actor: Actor<B>,
    critic: Critic<B>,
    actor_optimizer: OptimizerAdaptor<Adam, Actor<B>, B>,
    critic_optimizer: OptimizerAdaptor<Adam, Critic<B>, B>,
    config: PPOConfig,
    estimator: ReturnEstimator,
    buffer: TransitionBuffer,
    last_actions: Option<ActionCache>,
    training_step: usize,
    num_action: usize,
    rng: StdRng,
    device: B::Device,
}

impl<B: AutodiffBackend> PPO<B> {
    pub fn new(
        device: B::Device,
        config: PPOConfig,
        num_state: usize,
        num_action: usize,
        nb_agents: usize,
        seed: u64,
    ) -> Result<Self> {
        config.validate()?;
        B::seed(seed);

        let actor = Actor::new(&device, num_state, num_action, &config.actor_layers);
        let critic = Critic::new(&device, num_state, &config.critic_layers);

        let actor_optimizer = AdamConfig::new().init();
        let critic_optimizer = AdamConfig::new().init();

        tracing::info!(
            "ppo_update_time: {}, max_grad_norm: {}, clip_param: {}, gamma: {}, batch_size: {}, lr_actor: {}, lr_critic: {}",
            config.ppo_update_time,
            config.max_grad_norm,
            config.clip_param,
            config.gamma,
            config.batch_size,
            config.lr_actor,
            config.lr_critic
        );

        Ok(Self {
            actor,
            critic,
            actor_optimizer,
            critic_optimizer,
            estimator: ReturnEstimator::new(config.gamma, config.zero_eoepisode_return),
            config,
            buffer: TransitionBuffer::new(nb_agents),
            last_actions: None,
            training_step: 0,
            num_action,
            rng: StdRng::seed_from_u64(seed),
            device,
        })
    }

    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    pub fn buffer(&self) -> &TransitionBuffer {
        &self.buffer
    }

    pub fn actor(&self) -> &Actor<B> {
        &self.actor
    }

    pub fn nb_agents(&self) -> usize {
        self.buffer.nb_agents()
    }

    /// Number of minibatch optimizer steps taken since construction
    pub fn training_step(&self) -> usize {
        self.training_step
    }

    /// Sample one action per agent and cache it, with its probability,
    /// for the next `store_transition`
    pub fn select_actions(&mut self, observations: &[Observation]) -> Result<Vec<usize>> {
        self.check_agents(observations.len())?;

        let probs = self.action_distribution(observations);
        let mut actions = Vec::with_capacity(observations.len());
        let mut chosen = Vec::with_capacity(observations.len());

        for row in probs.chunks(self.num_action) {
            let action = WeightedIndex::new(row)?.sample(&mut self.rng);
            actions.push(action);
            chosen.push(row[action]);
        }

        self.last_actions = Some(ActionCache {
            actions: actions.clone(),
            probs: chosen,
        });

        Ok(actions)
    }

    /// Most probable action per agent; leaves the action cache untouched
    pub fn greedy_actions(&self, observations: &[Observation]) -> Result<Vec<usize>> {
        self.check_agents(observations.len())?;

        let probs = self.action_distribution(observations);
        Ok(probs
            .chunks(self.num_action)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &p)| {
                        if p > best.1 { (i, p) } else { best }
                    })
                    .0
            })
            .collect())
    }

    /// Critic estimates for a batch of states, without gradient tracking
    pub fn values(&self, states: &[Observation]) -> Vec<f32> {
        if states.is_empty() {
            return Vec::new();
        }
        let states = matrix::<B::InnerBackend>(states.concat(), states.len(), &self.device);
        to_vec(self.critic.valid().forward(states))
    }

    /// Append one transition per agent using the cached actions of the
    /// preceding `select_actions` call, consuming that cache
    pub fn store_transition(
        &mut self,
        observations: &[Observation],
        next_observations: &[Observation],
        rewards: &[f32],
        done: bool,
    ) -> Result<()> {
        self.check_agents(observations.len())?;
        self.check_agents(next_observations.len())?;
        self.check_agents(rewards.len())?;

        let cache = self.last_actions.take().ok_or(Error::NoCachedActions)?;

        for agent in 0..self.nb_agents() {
            self.buffer.push(
                agent,
                Transition {
                    state: observations[agent].clone(),
                    action: cache.actions[agent],
                    action_prob: cache.probs[agent],
                    reward: rewards[agent],
                    next_state: next_observations[agent].clone(),
                    done,
                },
            );
        }

        Ok(())
    }

    pub fn reset_buffer(&mut self) {
        self.buffer.reset();
    }

    /// Run the PPO update over the buffered transitions of all agents.
    ///
    /// Returns `None` without touching any state when the reference agent
    /// has fewer than `batch_size` transitions.
    pub fn update(&mut self, time_step: usize) -> Option<UpdateStats> {
        if self.buffer.len() < self.config.batch_size {
            return None;
        }

        // Agent-major working sequence
        let (states, next_states, actions, old_probs, rewards, dones) = {
            let sequence: Vec<&Transition> = self.buffer.sequential().collect();
            (
                sequence.iter().map(|t| t.state.clone()).collect::<Vec<_>>(),
                sequence.iter().map(|t| t.next_state.clone()).collect::<Vec<_>>(),
                sequence.iter().map(|t| t.action as i64).collect::<Vec<_>>(),
                sequence.iter().map(|t| t.action_prob).collect::<Vec<_>>(),
                sequence.iter().map(|t| t.reward).collect::<Vec<_>>(),
                sequence.iter().map(|t| t.done).collect::<Vec<_>>(),
            )
        };
        let n = rewards.len();

        let next_values = self.values(&next_states);
        let returns = self.estimator.returns(&rewards, &dones, &next_values);

        let states = matrix::<B>(states.concat(), n, &self.device);
        let actions = Tensor::<B, 1, Int>::from_ints(actions.as_slice(), &self.device);
        let old_probs = Tensor::<B, 1>::from_floats(old_probs.as_slice(), &self.device);
        let returns = Tensor::<B, 1>::from_floats(returns.as_slice(), &self.device);

        tracing::info!("The agent is updating....");

        let batch_size = self.config.batch_size;
        let clip = self.config.clip_param;
        let max_grad_norm = self.config.max_grad_norm;
        let mut indices: Vec<usize> = (0..n).collect();
        let mut totals = UpdateStats::default();

        for _ in 0..self.config.ppo_update_time {
            indices.shuffle(&mut self.rng);

            for batch in indices.chunks_exact(batch_size) {
                if self.training_step % 1000 == 0 {
                    tracing::info!(
                        "Time step: {}, train {} times",
                        time_step,
                        self.training_step
                    );
                }

                let index: Vec<i64> = batch.iter().map(|&i| i as i64).collect();
                let index = Tensor::<B, 1, Int>::from_ints(index.as_slice(), &self.device);

                let batch_states = states.clone().select(0, index.clone());
                let batch_returns = returns.clone().select(0, index.clone());
                let batch_actions = actions.clone().select(0, index.clone());
                let batch_old_probs = old_probs.clone().select(0, index);

                let values = self.critic.forward(batch_states.clone());
                let advantage = (batch_returns.clone() - values.clone()).detach();

                // Ratio of raw probabilities under the new and the acting policy
                let new_probs = self.actor.action_probs(batch_states, batch_actions);
                let ratio = new_probs / batch_old_probs;
                let clipped = clip_ratio(ratio.clone(), clip);

                let surr1 = ratio.clone() * advantage.clone();
                let surr2 = clipped.clone() * advantage;
                let actor_loss = -surr1.min_pair(surr2).mean();

                let grads = actor_loss.backward();
                let mut grads = GradientsParams::from_grads(grads, &self.actor);
                let grad_norm = clip_grad_norm(&self.actor, &mut grads, max_grad_norm);
                self.actor =
                    self.actor_optimizer
                        .step(self.config.lr_actor, self.actor.clone(), grads);

                let critic_loss = (batch_returns - values).powf_scalar(2.0).mean();

                let grads = critic_loss.backward();
                let mut grads = GradientsParams::from_grads(grads, &self.critic);
                clip_grad_norm(&self.critic, &mut grads, max_grad_norm);
                self.critic =
                    self.critic_optimizer
                        .step(self.config.lr_critic, self.critic.clone(), grads);

                totals.actor_loss += scalar(actor_loss);
                totals.critic_loss += scalar(critic_loss);
                totals.ratio += scalar(ratio.mean());
                totals.clipped_ratio += scalar(clipped.mean());
                totals.grad_norm += grad_norm;
                totals.minibatches += 1;

                self.training_step += 1;
            }
        }

        self.reset_buffer();

        let count = totals.minibatches.max(1) as f32;
        let stats = UpdateStats {
            actor_loss: totals.actor_loss / count,
            critic_loss: totals.critic_loss / count,
            ratio: totals.ratio / count,
            clipped_ratio: totals.clipped_ratio / count,
            grad_norm: totals.grad_norm / count,
            minibatches: totals.minibatches,
        };

        tracing::debug!(
            "Update at time step {}: actor_loss={:.4}, critic_loss={:.4}, ratio={:.4}, clipped_ratio={:.4}, grad_norm={:.4}, minibatches={}",
            time_step,
            stats.actor_loss,
            stats.critic_loss,
            stats.ratio,
            stats.clipped_ratio,
            stats.grad_norm,
            stats.minibatches
        );

        Some(stats)
    }

    /// Write the actor parameters to `actor<time_step>.pth`, or `actor.pth`
    /// when no (or a zero) time step is given, creating `dir` if needed
    pub fn save(&self, dir: impl AsRef<Path>, time_step: Option<usize>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let file_name = match time_step {
            Some(t) if t != 0 => format!("actor{t}.pth"),
            _ => "actor.pth".to_string(),
        };
        let path = dir.join(file_name);

        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
        let bytes = Recorder::<B>::record(&recorder, self.actor.clone().into_record(), ())
            .map_err(|e| Error::Record(format!("{e:?}")))?;
        fs::write(&path, bytes)?;

        tracing::info!("Saved actor to {}", path.display());
        Ok(path)
    }

    /// Probabilities for every agent, flattened [nb_agents * num_action]
    fn action_distribution(&self, observations: &[Observation]) -> Vec<f32> {
        if observations.is_empty() {
            return Vec::new();
        }
        let states = matrix::<B::InnerBackend>(
            observations.concat(),
            observations.len(),
            &self.device,
        );
        to_vec(self.actor.valid().forward(states))
    }

    fn check_agents(&self, found: usize) -> Result<()> {
        let expected = self.nb_agents();
        if found != expected {
            return Err(Error::AgentCountMismatch { expected, found });
        }
        Ok(())
    }
}

/// Bound the probability ratio to `[1 - clip, 1 + clip]`
fn clip_ratio<B: Backend>(ratio: Tensor<B, 1>, clip: f32) -> Tensor<B, 1> {
    ratio.clamp(1.0 - clip, 1.0 + clip)
}

fn matrix<B: Backend>(flat: Vec<f32>, rows: usize, device: &B::Device) -> Tensor<B, 2> {
    let cols = flat.len() / rows;
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows, cols])
}

fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    to_vec(tensor).first().copied().unwrap_or(f32::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn small_config() -> PPOConfig {
        PPOConfig::new()
            .with_actor_layers(vec![8])
            .with_critic_layers(vec![8])
            .with_batch_size(4)
            .with_ppo_update_time(3)
    }

    fn agent(config: PPOConfig, nb_agents: usize) -> PPO<TestBackend> {
        PPO::new(Default::default(), config, 2, 2, nb_agents, 1).unwrap()
    }

    fn observations(nb_agents: usize, step: usize) -> Vec<Observation> {
        (0..nb_agents)
            .map(|a| vec![(a + step) as f32 * 0.1, 1.0])
            .collect()
    }

    fn feed(ppo: &mut PPO<TestBackend>, steps: usize, done_every: usize) {
        let nb_agents = ppo.nb_agents();
        for step in 0..steps {
            let obs = observations(nb_agents, step);
            let next = observations(nb_agents, step + 1);
            ppo.select_actions(&obs).unwrap();
            let rewards = vec![1.0; nb_agents];
            ppo.store_transition(&obs, &next, &rewards, step % done_every == done_every - 1)
                .unwrap();
        }
    }

    #[test]
    fn test_new_agent_is_empty() {
        let ppo = agent(small_config(), 3);
        assert_eq!(ppo.nb_agents(), 3);
        assert!(ppo.buffer().is_empty());
        assert_eq!(ppo.training_step(), 0);
    }

    #[test]
    fn test_stored_action_matches_selected_action() {
        let mut ppo = agent(small_config(), 2);

        for step in 0..5 {
            let obs = observations(2, step);
            let actions = ppo.select_actions(&obs).unwrap();
            ppo.store_transition(&obs, &observations(2, step + 1), &[0.5, -0.5], false)
                .unwrap();

            for (agent, &action) in actions.iter().enumerate() {
                let stored = &ppo.buffer().agent(agent)[step];
                assert_eq!(stored.action, action);
                assert!(stored.action_prob > 0.0 && stored.action_prob <= 1.0);
                assert_eq!(stored.state, obs[agent]);
            }
        }
        assert_eq!(ppo.buffer().agent(0).len(), 5);
        assert_eq!(ppo.buffer().agent(1).len(), 5);
    }

    #[test]
    fn test_store_without_select_fails() {
        let mut ppo = agent(small_config(), 2);
        let obs = observations(2, 0);
        let result = ppo.store_transition(&obs, &obs, &[0.0, 0.0], false);
        assert!(matches!(result, Err(Error::NoCachedActions)));

        ppo.select_actions(&obs).unwrap();
        ppo.store_transition(&obs, &obs, &[0.0, 0.0], false).unwrap();
        let result = ppo.store_transition(&obs, &obs, &[0.0, 0.0], false);
        assert!(matches!(result, Err(Error::NoCachedActions)));
        assert_eq!(ppo.buffer().len(), 1);
    }

    #[test]
    fn test_agent_count_mismatch() {
        let mut ppo = agent(small_config(), 2);
        let result = ppo.select_actions(&observations(3, 0));
        assert!(matches!(
            result,
            Err(Error::AgentCountMismatch {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn test_greedy_actions_keep_cache_empty() {
        let mut ppo = agent(small_config(), 2);
        let obs = observations(2, 0);
        let actions = ppo.greedy_actions(&obs).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|&a| a < 2));

        let result = ppo.store_transition(&obs, &obs, &[0.0, 0.0], false);
        assert!(matches!(result, Err(Error::NoCachedActions)));
    }

    #[test]
    fn test_reset_buffer_empties_all_agents() {
        let mut ppo = agent(small_config(), 3);
        feed(&mut ppo, 2, 2);
        assert_eq!(ppo.buffer().total_len(), 6);

        ppo.reset_buffer();
        for agent in 0..3 {
            assert!(ppo.buffer().agent(agent).is_empty());
        }
    }

    #[test]
    fn test_underfull_update_is_noop() {
        let mut ppo = agent(small_config(), 2);
        feed(&mut ppo, 3, 3);

        assert!(ppo.update(0).is_none());
        assert_eq!(ppo.training_step(), 0);
        assert_eq!(ppo.buffer().agent(0).len(), 3);
        assert_eq!(ppo.buffer().agent(1).len(), 3);
    }

    #[test]
    fn test_update_step_count_and_buffer_reset() {
        let mut ppo = agent(small_config(), 2);
        feed(&mut ppo, 4, 4);

        let stats = ppo.update(3).unwrap();
        assert_eq!(ppo.training_step(), 3 * (8 / 4));
        assert_eq!(stats.minibatches, 6);
        assert!(ppo.buffer().agent(0).is_empty());
        assert!(ppo.buffer().agent(1).is_empty());
        assert!(stats.actor_loss.is_finite());
        assert!(stats.critic_loss.is_finite());
        assert!(stats.grad_norm.is_finite());
        assert!(stats.grad_norm >= 0.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let zero_batch = small_config().with_batch_size(0);
        assert!(matches!(
            PPO::<TestBackend>::new(Default::default(), zero_batch, 2, 2, 2, 1),
            Err(Error::InvalidConfig(_))
        ));

        let zero_epochs = small_config().with_ppo_update_time(0);
        assert!(matches!(
            PPO::<TestBackend>::new(Default::default(), zero_epochs, 2, 2, 2, 1),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_update_drops_partial_minibatch() {
        let mut ppo = agent(small_config(), 2);
        feed(&mut ppo, 5, 5);

        ppo.update(4).unwrap();
        // 10 transitions, minibatches of 4: two full ones per epoch
        assert_eq!(ppo.training_step(), 3 * 2);
    }

    #[test]
    fn test_update_changes_policy() {
        let mut ppo = agent(small_config(), 2);
        let reference_obs = observations(2, 0);
        let before = ppo.action_distribution(&reference_obs);

        feed(&mut ppo, 4, 2);
        ppo.update(3).unwrap();

        let after = ppo.action_distribution(&reference_obs);
        assert_ne!(before, after);
    }

    #[test]
    fn test_clipped_ratio_bounds() {
        let device = Default::default();
        let clip = 0.2;
        let ratio = Tensor::<NdArray<f32>, 1>::from_floats(
            [0.0f32, 0.5, 0.79, 1.0, 1.21, 3.0, 1e6].as_slice(),
            &device,
        );

        let clipped = to_vec(clip_ratio(ratio, clip));
        for value in clipped {
            assert!(value >= 1.0 - clip - 1e-6);
            assert!(value <= 1.0 + clip + 1e-6);
        }
    }

    #[test]
    fn test_save_file_names_and_parameters_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("actors");
        let ppo = agent(small_config(), 2);
        let reference_obs = observations(2, 0);
        let before = ppo.action_distribution(&reference_obs);

        let final_path = ppo.save(&target, None).unwrap();
        assert_eq!(final_path, target.join("actor.pth"));
        assert!(final_path.is_file());

        let step_path = ppo.save(&target, Some(500)).unwrap();
        assert_eq!(step_path, target.join("actor500.pth"));
        assert!(step_path.is_file());
        assert!(fs::metadata(&step_path).unwrap().len() > 0);

        assert_eq!(ppo.save(&target, Some(0)).unwrap(), target.join("actor.pth"));

        assert_eq!(before, ppo.action_distribution(&reference_obs));
    }
}
