//! Discounted episodic returns with critic bootstrapping
//!
//! The scan runs over the agent-major concatenation of all agents'
//! buffers. A running return `R` is only restarted at transitions flagged
//! `done` (and at the very last transition), so it carries across the
//! boundary between two agents whenever the earlier agent's final
//! transition is not `done`.

/// Monte-Carlo-with-bootstrap return estimator
#[derive(Debug, Clone, Copy)]
pub struct ReturnEstimator {
    /// Discount factor
    pub gamma: f32,
    /// Restart from 0 instead of the critic at `done` transitions
    pub zero_eoepisode_return: bool,
}

impl ReturnEstimator {
    pub fn new(gamma: f32, zero_eoepisode_return: bool) -> Self {
        Self {
            gamma,
            zero_eoepisode_return,
        }
    }

    /// Compute `Gt` for every index by scanning from the last index to the first
    ///
    /// `next_values[i]` is the critic's estimate of `next_state[i]`; it is
    /// read only where the return is bootstrapped.
    ///
    /// # Panics
    ///
    /// If the three slices differ in length.
    pub fn returns(&self, rewards: &[f32], dones: &[bool], next_values: &[f32]) -> Vec<f32> {
        let n = rewards.len();
        assert_eq!(dones.len(), n);
        assert_eq!(next_values.len(), n);

        let mut returns = vec![0.0; n];
        let mut running = 0.0;

        for i in (0..n).rev() {
            if dones[i] {
                running = if self.zero_eoepisode_return {
                    0.0
                } else {
                    next_values[i]
                };
            } else if i == n - 1 {
                // Truncated rollout: nothing to carry over yet
                running = next_values[i];
            }

            running = rewards[i] + self.gamma * running;
            returns[i] = running;
        }

        returns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-5, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_single_terminal_with_zero_return() {
        let estimator = ReturnEstimator::new(0.99, true);
        let returns = estimator.returns(&[3.5], &[true], &[100.0]);
        assert_close(&returns, &[3.5]);
    }

    #[test]
    fn test_terminal_bootstraps_from_critic() {
        let estimator = ReturnEstimator::new(0.5, false);
        let returns = estimator.returns(&[1.0], &[true], &[4.0]);
        assert_close(&returns, &[3.0]);
    }

    #[test]
    fn test_three_step_episode() {
        let estimator = ReturnEstimator::new(0.9, true);
        let returns = estimator.returns(&[1.0, 1.0, 1.0], &[false, false, true], &[7.0, 7.0, 7.0]);
        assert_close(&returns, &[2.71, 1.9, 1.0]);
    }

    #[test]
    fn test_non_terminal_chain_recursion() {
        let gamma = 0.95;
        let reward = 0.3;
        let estimator = ReturnEstimator::new(gamma, false);
        let rewards = vec![reward; 6];
        let dones = vec![false; 6];
        let next_values = vec![2.0; 6];

        let returns = estimator.returns(&rewards, &dones, &next_values);
        assert!((returns[5] - (reward + gamma * 2.0)).abs() < 1e-5);
        for i in 0..5 {
            assert!((returns[i] - (reward + gamma * returns[i + 1])).abs() < 1e-5);
        }
    }

    #[test]
    fn test_done_restarts_running_return() {
        let estimator = ReturnEstimator::new(0.5, true);
        let returns = estimator.returns(
            &[1.0, 2.0, 4.0, 8.0],
            &[false, true, false, true],
            &[0.0; 4],
        );
        assert_close(&returns, &[2.0, 2.0, 8.0, 8.0]);
    }

    #[test]
    fn test_return_carries_across_agent_boundary() {
        // Agent 0: [1, 1] without done, agent 1: [2, 2] ending in done
        let estimator = ReturnEstimator::new(0.5, true);
        let returns = estimator.returns(
            &[1.0, 1.0, 2.0, 2.0],
            &[false, false, false, true],
            &[9.0; 4],
        );
        // Agent 0's last transition absorbs agent 1's first return (3.0)
        assert_close(&returns, &[2.25, 2.5, 3.0, 2.0]);
    }

    #[test]
    fn test_empty_sequence() {
        let estimator = ReturnEstimator::new(0.99, false);
        assert!(estimator.returns(&[], &[], &[]).is_empty());
    }
}
