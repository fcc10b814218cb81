//! Proximal Policy Optimization for a group of agents sharing one policy
//!
//! Every agent acts with the same actor; their transitions are buffered
//! separately and concatenated agent-major when the policy is updated.
//!
//! # Architecture
//!
//! ```text
//! TrainingLoop (one iteration per global time step)
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PPO::select_actions                                        │
//! │  - Actor: state → categorical probabilities                 │
//! │  - Caches sampled action + probability per agent            │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  MultiAgentEnv::step  →  PPO::store_transition              │
//! │  - One Transition per agent, appended in lockstep           │
//! └─────────────────────────────────────────────────────────────┘
//!     │ (every epoch period, buffer ≥ batch_size)
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PPO::update                                                │
//! │  - ReturnEstimator: discounted returns, critic bootstrap    │
//! │  - ppo_update_time epochs of shuffled minibatches           │
//! │  - Independent actor / critic optimizer steps               │
//! │  - Joint gradient-norm clip per network                     │
//! │  - Buffer reset                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod buffer;
pub mod config;
pub mod env;
pub mod eval;
pub mod grad;
pub mod metrics;
pub mod network;
pub mod returns;
pub mod train;

pub use agent::{PPO, UpdateStats};
pub use buffer::{Transition, TransitionBuffer};
pub use config::PPOConfig;
pub use env::{MultiAgentEnv, Observation, SignMatchingEnv, StepResult};
pub use eval::{EvaluationMetrics, Evaluator, RolloutEvaluator};
pub use grad::clip_grad_norm;
pub use metrics::{CsvLogger, MetricsSink, MovingAverage, TracingSink, TrainingMetrics};
pub use network::{Actor, Critic};
pub use returns::ReturnEstimator;
pub use train::{ScheduleConfig, TrainingLoop, TrainingSummary};
