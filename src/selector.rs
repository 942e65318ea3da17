//! Epsilon-greedy action choice over the actions the host allows.

use crate::action::{ACTION_COUNT, ActionMask, Cooldowns, EnemyAction, valid_actions};
use crate::agent::{Agent, AgentInput, TickOutcome};
use crate::config::{DrlConfig, EmptyMaskFallback};
use crate::network::forward_pass;
use crate::params::Parameters;
use crate::removal::Lifecycle;
use crate::replay_buffer::Transition;
use crate::utils::has_non_finite;
use rand::Rng;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ActionSelector {
    input_size: usize,
    epsilon_decay: f32,
    epsilon_floor: f32,
    decision_duration: f32,
    max_agent_steps: u32,
    fallback: EmptyMaskFallback,
}

impl ActionSelector {
    pub fn new(cfg: &DrlConfig) -> Self {
        Self {
            input_size: cfg.input_size,
            epsilon_decay: cfg.epsilon_decay,
            epsilon_floor: cfg.epsilon_floor,
            decision_duration: cfg.decision_duration,
            max_agent_steps: cfg.max_agent_steps,
            fallback: cfg.empty_mask_fallback,
        }
    }

    /// Pick an action from `q`.
    ///
    /// With probability `epsilon` (or when nothing is allowed) the pick is
    /// random; otherwise it is the best allowed action, lowest index on ties.
    /// When mask and cooldowns allow nothing the configured fallback applies.
    pub fn choose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        epsilon: f32,
        q: &[f32],
        mask: &ActionMask,
        cooldowns: &Cooldowns,
    ) -> EnemyAction {
        let valid = valid_actions(mask, cooldowns);
        let explore = rng.gen_range(0.0f32..1.0) < epsilon;

        if valid.is_empty() {
            return match self.fallback {
                EmptyMaskFallback::UniformAll => EnemyAction::ALL[rng.gen_range(0..ACTION_COUNT)],
                EmptyMaskFallback::Stay => EnemyAction::Stay,
            };
        }
        if explore {
            return valid[rng.gen_range(0..valid.len())];
        }
        if has_non_finite(q) {
            warn!("Q contains NaN/Inf in action selection, falling back to a random valid action");
            return valid[rng.gen_range(0..valid.len())];
        }
        greedy(q, &valid)
    }

    /// Run one agent for one tick against the online parameters.
    ///
    /// Busy or departing agents are left alone, and so is an agent whose
    /// observations do not fit the network. Otherwise the agent decides,
    /// and the returned transition is what the caller appends to the buffer.
    pub fn decide(&self, agent: &mut Agent, input: &AgentInput, online: &Parameters) -> (TickOutcome, Option<Transition>) {
        agent.add_reward(input.reward);
        if agent.is_busy() || agent.lifecycle() != Lifecycle::Active {
            return (agent.outcome(None), None);
        }
        if input.observation.len() != self.input_size || input.previous_observation.len() != self.input_size {
            warn!(
                agent = agent.id().0,
                expected = self.input_size,
                observation = input.observation.len(),
                previous = input.previous_observation.len(),
                "observation length does not match the network, skipping decision"
            );
            return (agent.outcome(None), None);
        }

        let q = forward_pass(online, input.observation.features());
        let epsilon = agent.epsilon();
        let action = self.choose(agent.rng_mut(), epsilon, &q, &input.mask, &input.cooldowns);

        let reward = agent.commit_decision(
            action,
            self.epsilon_decay,
            self.epsilon_floor,
            self.decision_duration,
            self.max_agent_steps,
        );
        let transition = Transition {
            state: input.previous_observation.clone(),
            action,
            reward,
            next_state: input.observation.clone(),
            done: false,
        };
        (agent.outcome(Some(action)), Some(transition))
    }
}

/// Best allowed action by Q value; the earliest one wins a tie.
/// `valid` must be non-empty and in index order.
pub(crate) fn greedy(q: &[f32], valid: &[EnemyAction]) -> EnemyAction {
    let mut best = valid[0];
    for &a in &valid[1..] {
        if q[a.index()] > q[best.index()] {
            best = a;
        }
    }
    best
}
