//! Training loop scheduler - times rollout collection against the update,
//! logging, evaluation and checkpoint cadences

use std::path::PathBuf;

use burn::tensor::backend::AutodiffBackend;
use time::OffsetDateTime;
use time::macros::format_description;

use super::agent::PPO;
use super::env::MultiAgentEnv;
use super::eval::Evaluator;
use super::metrics::{MetricsSink, TrainingMetrics};
use crate::error::{Error, Result};

/// Scheduling configuration
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Total number of global time steps
    pub nb_time_steps: usize,
    /// Number of training episodes (the scheduler's own episode period)
    pub nb_tr_episodes: usize,
    /// Number of update opportunities
    pub nb_tr_epochs: usize,
    /// Number of train-metric flushes
    pub nb_tr_logs: usize,
    /// Number of evaluation rollouts
    pub nb_test_logs: usize,
    /// Number of intermediate actor checkpoints
    pub nb_inter_saving_actor: usize,
    /// Checkpoint name; no checkpoints are written when unset
    pub save_actor_name: Option<String>,
    /// Root directory of checkpoint runs
    pub save_dir: PathBuf,
    /// Seed of the training environment
    pub env_seed: u64,
    /// Run evaluation rollouts
    pub evaluate: bool,
    /// Forward train metrics to the sink
    pub log_metrics: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            nb_time_steps: 1_000_000,
            nb_tr_episodes: 100,
            nb_tr_epochs: 1000,
            nb_tr_logs: 100,
            nb_test_logs: 100,
            nb_inter_saving_actor: 9,
            save_actor_name: None,
            save_dir: PathBuf::from("actors"),
            env_seed: 1,
            evaluate: true,
            log_metrics: true,
        }
    }
}

/// Fixed periods derived from a [`ScheduleConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Periods {
    pub episode: usize,
    pub epoch: usize,
    pub train_log: usize,
    pub test_log: usize,
    pub saving: usize,
}

impl ScheduleConfig {
    /// Derive the loop periods, rejecting any that would be zero
    pub fn periods(&self) -> Result<Periods> {
        let period = |name: &str, count: usize| -> Result<usize> {
            match self.nb_time_steps.checked_div(count) {
                Some(p) if p > 0 => Ok(p),
                _ => Err(Error::InvalidConfig(format!(
                    "{name}={count} leaves an empty period for nb_time_steps={}",
                    self.nb_time_steps
                ))),
            }
        };

        Ok(Periods {
            episode: period("nb_tr_episodes", self.nb_tr_episodes)?,
            epoch: period("nb_tr_epochs", self.nb_tr_epochs)?,
            train_log: period("nb_tr_logs", self.nb_tr_logs)?,
            test_log: period("nb_test_logs", self.nb_test_logs)?,
            saving: period("nb_inter_saving_actor + 1", self.nb_inter_saving_actor + 1)?,
        })
    }
}

/// Outcome of a completed training run
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub time_steps: usize,
    pub updates: usize,
    pub training_step: usize,
    /// Final actor snapshot, when checkpointing is enabled
    pub final_actor: Option<PathBuf>,
}

/// Single-threaded driver of one PPO instance against one environment
pub struct TrainingLoop<B: AutodiffBackend, E: MultiAgentEnv> {
    agent: PPO<B>,
    env: E,
    schedule: ScheduleConfig,
    metrics: TrainingMetrics,
    sink: Box<dyn MetricsSink>,
    evaluator: Option<Box<dyn Evaluator<B>>>,
}

impl<B: AutodiffBackend, E: MultiAgentEnv> TrainingLoop<B, E> {
    pub fn new(
        agent: PPO<B>,
        env: E,
        schedule: ScheduleConfig,
        sink: Box<dyn MetricsSink>,
    ) -> Self {
        let metrics = TrainingMetrics::new(agent.nb_agents(), 100);
        Self {
            agent,
            env,
            schedule,
            metrics,
            sink,
            evaluator: None,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator<B>>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn agent(&self) -> &PPO<B> {
        &self.agent
    }

    pub fn into_agent(self) -> PPO<B> {
        self.agent
    }

    /// Directory of this run's checkpoints, `<save_dir>/<name><timestamp>`
    fn run_dir(&self) -> Result<Option<PathBuf>> {
        let Some(name) = &self.schedule.save_actor_name else {
            return Ok(None);
        };
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now.format(format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))?;
        Ok(Some(self.schedule.save_dir.join(format!("{name}{stamp}"))))
    }

    /// Run the training loop
    pub fn run(&mut self) -> Result<TrainingSummary> {
        let periods = self.schedule.periods()?;
        let run_dir = self.run_dir()?;
        let batch_size = self.agent.config().batch_size;
        let mut updates = 0;

        tracing::info!(
            "Starting training for {} time steps ({:?})",
            self.schedule.nb_time_steps,
            periods
        );

        let mut obs = self.env.reset();

        for t in 0..self.schedule.nb_time_steps {
            let actions = self.agent.select_actions(&obs)?;
            let result = self.env.step(&actions);

            // Episode boundaries follow the schedule, not the environment
            let done = t % periods.episode == periods.episode - 1;

            self.agent
                .store_transition(&obs, &result.observations, &result.rewards, done)?;
            self.metrics
                .record_step(&result.rewards, &result.dones, &result.info);

            obs = result.observations;

            if done {
                tracing::info!("New episode at time {}", t);
                obs = self.env.reset();
            }

            if t % periods.epoch == periods.epoch - 1 && self.agent.buffer().len() >= batch_size {
                tracing::info!("Updating agent at time {}", t);
                if let Some(stats) = self.agent.update(t) {
                    self.metrics.record_update(&stats);
                    updates += 1;
                }
            }

            if t % periods.train_log == periods.train_log - 1 {
                let logged = self.metrics.flush(t);
                if self.schedule.log_metrics {
                    self.sink.log(t, &logged);
                }
                self.metrics.reset();
            }

            if self.schedule.evaluate && t % periods.test_log == periods.test_log - 1 {
                if let Some(evaluator) = self.evaluator.as_mut() {
                    tracing::info!("Testing at time {}", t);
                    let logged = evaluator.evaluate(&self.agent, t)?;
                    self.sink.log(t, &logged);
                }
            }

            if let Some(dir) = &run_dir {
                if t % periods.saving == 0 && t != 0 {
                    self.agent.save(dir, Some(t))?;
                }
            }
        }

        let final_actor = match &run_dir {
            Some(dir) => Some(self.agent.save(dir, None)?),
            None => None,
        };
        self.sink.close();

        tracing::info!("Training complete!");

        Ok(TrainingSummary {
            time_steps: self.schedule.nb_time_steps,
            updates,
            training_step: self.agent.training_step(),
            final_actor,
        })
    }
}
