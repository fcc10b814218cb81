//! Multi-agent PPO trainable.
//!
//! A single PPO instance owns a shared actor and critic, buffers the
//! transitions of every agent, and learns with the clipped surrogate
//! objective. The [`ppo::train::TrainingLoop`] drives rollout collection
//! against the update, logging, evaluation and checkpoint cadences.

pub mod error;
pub mod ppo;

pub use error::{Error, Result};
pub use ppo::{
    Actor, Critic, CsvLogger, EvaluationMetrics, Evaluator, MetricsSink, MultiAgentEnv,
    Observation, PPO, PPOConfig, RolloutEvaluator, ReturnEstimator, ScheduleConfig,
    SignMatchingEnv, StepResult, TracingSink, TrainingLoop, TrainingMetrics, TrainingSummary,
    Transition, TransitionBuffer, UpdateStats,
};
