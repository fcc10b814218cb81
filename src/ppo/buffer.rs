//! Per-agent transition storage

/// A single interaction record of one agent
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: usize,
    /// Probability (not log-probability) the acting policy gave `action`
    pub action_prob: f32,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub done: bool,
}

/// Ordered transitions for each agent `0..nb_agents`, in interaction order
///
/// Under correct use every agent's sequence has the same length.
#[derive(Debug, Clone)]
pub struct TransitionBuffer {
    agents: Vec<Vec<Transition>>,
}

impl TransitionBuffer {
    pub fn new(nb_agents: usize) -> Self {
        Self {
            agents: vec![Vec::new(); nb_agents],
        }
    }

    pub fn nb_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn push(&mut self, agent: usize, transition: Transition) {
        self.agents[agent].push(transition);
    }

    /// Transitions of one agent
    pub fn agent(&self, agent: usize) -> &[Transition] {
        &self.agents[agent]
    }

    /// Length of the reference agent's sequence (agent 0)
    pub fn len(&self) -> usize {
        self.agents.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of transitions over all agents
    pub fn total_len(&self) -> usize {
        self.agents.iter().map(Vec::len).sum()
    }

    /// All transitions, agent-major: agent 0 first, then agent 1, ...
    pub fn sequential(&self) -> impl Iterator<Item = &Transition> {
        self.agents.iter().flatten()
    }

    /// Empties every agent's sequence
    pub fn reset(&mut self) {
        for transitions in &mut self.agents {
            *transitions = Vec::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(reward: f32) -> Transition {
        Transition {
            state: vec![0.0; 2],
            action: 1,
            action_prob: 0.5,
            reward,
            next_state: vec![1.0; 2],
            done: false,
        }
    }

    #[test]
    fn test_buffer_push_and_reset() {
        let mut buffer = TransitionBuffer::new(3);
        assert!(buffer.is_empty());

        for agent in 0..3 {
            buffer.push(agent, transition(agent as f32));
        }
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.total_len(), 3);

        buffer.reset();
        for agent in 0..3 {
            assert!(buffer.agent(agent).is_empty());
        }
        assert_eq!(buffer.nb_agents(), 3);
    }

    #[test]
    fn test_sequential_is_agent_major() {
        let mut buffer = TransitionBuffer::new(2);
        for step in 0..2 {
            buffer.push(0, transition(step as f32));
            buffer.push(1, transition(10.0 + step as f32));
        }

        let rewards: Vec<f32> = buffer.sequential().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![0.0, 1.0, 10.0, 11.0]);
    }
}
