//! Training metrics and logging sinks

use std::collections::{BTreeMap, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::agent::UpdateStats;

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Statistics gathered between two train-log flushes
#[derive(Debug)]
pub struct TrainingMetrics {
    /// Reward accumulated per agent over the current period
    reward_sums: Vec<f32>,
    /// Environment steps in the current period
    steps: usize,
    /// Environment-reported done flags in the current period
    env_dones: usize,
    /// Numeric info entries summed over the current period
    info_sums: BTreeMap<String, f32>,
    /// Losses and ratios of recent updates
    pub actor_loss: MovingAverage,
    pub critic_loss: MovingAverage,
    pub ratio: MovingAverage,
    pub clipped_ratio: MovingAverage,
    pub grad_norm: MovingAverage,
    /// Updates since construction
    pub updates: usize,
    /// Environment steps since construction
    pub total_timesteps: usize,
    start_time: Instant,
}

impl TrainingMetrics {
    pub fn new(nb_agents: usize, window_size: usize) -> Self {
        Self {
            reward_sums: vec![0.0; nb_agents],
            steps: 0,
            env_dones: 0,
            info_sums: BTreeMap::new(),
            actor_loss: MovingAverage::new(window_size),
            critic_loss: MovingAverage::new(window_size),
            ratio: MovingAverage::new(window_size),
            clipped_ratio: MovingAverage::new(window_size),
            grad_norm: MovingAverage::new(window_size),
            updates: 0,
            total_timesteps: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one environment step
    pub fn record_step(&mut self, rewards: &[f32], dones: &[bool], info: &BTreeMap<String, f32>) {
        for (sum, reward) in self.reward_sums.iter_mut().zip(rewards) {
            *sum += reward;
        }
        self.env_dones += dones.iter().filter(|&&done| done).count();
        for (key, value) in info {
            *self.info_sums.entry(key.clone()).or_insert(0.0) += value;
        }
        self.steps += 1;
        self.total_timesteps += 1;
    }

    /// Record the outcome of one policy update
    pub fn record_update(&mut self, stats: &UpdateStats) {
        self.actor_loss.push(stats.actor_loss);
        self.critic_loss.push(stats.critic_loss);
        self.ratio.push(stats.ratio);
        self.clipped_ratio.push(stats.clipped_ratio);
        self.grad_norm.push(stats.grad_norm);
        self.updates += 1;
    }

    /// Timesteps per second since construction
    pub fn timesteps_per_second(&self) -> f64 {
        let duration = self.start_time.elapsed().as_secs_f64();
        if duration > 0.0 {
            self.total_timesteps as f64 / duration
        } else {
            0.0
        }
    }

    /// Period averages, tagged by metric name
    pub fn flush(&self, time_step: usize) -> BTreeMap<String, f32> {
        let mut logged = BTreeMap::new();
        let steps = self.steps.max(1) as f32;
        let agents = self.reward_sums.len().max(1) as f32;

        logged.insert("time_step".to_string(), time_step as f32);
        logged.insert(
            "train/mean_reward".to_string(),
            self.reward_sums.iter().sum::<f32>() / (steps * agents),
        );
        for (agent, sum) in self.reward_sums.iter().enumerate() {
            logged.insert(format!("train/agent_{agent}/mean_reward"), sum / steps);
        }
        logged.insert("train/env_dones".to_string(), self.env_dones as f32);
        for (key, sum) in &self.info_sums {
            logged.insert(format!("info/{key}"), sum / steps);
        }

        if !self.actor_loss.is_empty() {
            logged.insert("losses/actor".to_string(), self.actor_loss.average());
            logged.insert("losses/critic".to_string(), self.critic_loss.average());
            logged.insert("ppo/ratio".to_string(), self.ratio.average());
            logged.insert("ppo/clipped_ratio".to_string(), self.clipped_ratio.average());
            logged.insert("ppo/grad_norm".to_string(), self.grad_norm.average());
        }
        logged.insert("ppo/updates".to_string(), self.updates as f32);
        logged.insert(
            "performance/sps".to_string(),
            self.timesteps_per_second() as f32,
        );

        logged
    }

    /// Clear the per-period accumulators
    pub fn reset(&mut self) {
        self.reward_sums.iter_mut().for_each(|sum| *sum = 0.0);
        self.steps = 0;
        self.env_dones = 0;
        self.info_sums.clear();
    }
}

/// Destination of flushed training and evaluation metrics
pub trait MetricsSink {
    fn log(&mut self, time_step: usize, metrics: &BTreeMap<String, f32>);

    /// Flush and close the sink
    fn close(&mut self) {}
}

/// Emits metrics as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn log(&mut self, time_step: usize, metrics: &BTreeMap<String, f32>) {
        tracing::info!("Metrics at time step {}", time_step);
        for (tag, value) in metrics {
            tracing::info!("  {}={:.4}", tag, value);
        }
    }
}

/// File-based logger writing one `step,value` CSV per metric tag
pub struct CsvLogger {
    log_dir: PathBuf,
}

impl CsvLogger {
    pub fn new(log_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::create_dir_all(&log_dir)?;

        Ok(Self {
            log_dir: log_dir.as_ref().to_path_buf(),
        })
    }

    /// Path of the CSV file backing `tag`
    pub fn path_for(&self, tag: &str) -> PathBuf {
        self.log_dir.join(format!("{}.csv", tag.replace('/', "_")))
    }

    /// Append a scalar value
    pub fn log_scalar(&mut self, tag: &str, value: f32, step: usize) -> std::io::Result<()> {
        let csv_path = self.path_for(tag);
        let file_exists = csv_path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)?;

        if !file_exists {
            writeln!(file, "step,value")?;
        }
        writeln!(file, "{},{}", step, value)
    }
}

impl MetricsSink for CsvLogger {
    fn log(&mut self, time_step: usize, metrics: &BTreeMap<String, f32>) {
        for (tag, value) in metrics {
            if let Err(e) = self.log_scalar(tag, *value, time_step) {
                tracing::warn!("Failed to log {}: {}", tag, e);
            }
        }
    }

    fn close(&mut self) {
        tracing::info!("Metric logs saved to {}", self.log_dir.display());
    }
}
