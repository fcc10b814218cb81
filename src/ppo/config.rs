//! PPO hyper-parameters

use burn::prelude::*;

use crate::error::Error;

/// Configuration for the PPO trainable
#[derive(Debug, Config)]
pub struct PPOConfig {
    /// Hidden layer widths of the actor network
    #[config(default = "vec![100, 100]")]
    pub actor_layers: Vec<usize>,
    /// Hidden layer widths of the critic network
    #[config(default = "vec![100, 100]")]
    pub critic_layers: Vec<usize>,
    /// Discount factor for the reward
    #[config(default = 0.99)]
    pub gamma: f32,
    /// Learning rate of the critic optimizer
    #[config(default = 3e-3)]
    pub lr_critic: f64,
    /// Learning rate of the actor optimizer
    #[config(default = 3e-3)]
    pub lr_actor: f64,
    /// Clipping parameter of the surrogate objective
    #[config(default = 0.2)]
    pub clip_param: f32,
    /// Gradient norm bound applied to both networks
    #[config(default = 0.5)]
    pub max_grad_norm: f32,
    /// Number of epochs over the buffer per update
    #[config(default = 10)]
    pub ppo_update_time: usize,
    /// Minibatch size, also the minimum per-agent buffer length for an update
    #[config(default = 256)]
    pub batch_size: usize,
    /// Bootstrap end-of-episode transitions with 0 instead of the critic
    #[config(default = false)]
    pub zero_eoepisode_return: bool,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PPOConfig {
    /// Reject settings under which an update could not run
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if self.ppo_update_time == 0 {
            return Err(Error::InvalidConfig(
                "ppo_update_time must be positive".into(),
            ));
        }
        if self.max_grad_norm.is_nan() || self.max_grad_norm <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "max_grad_norm must be positive, got {}",
                self.max_grad_norm
            )));
        }
        Ok(())
    }
}
