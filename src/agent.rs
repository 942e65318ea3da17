use crate::action::{ActionMask, Cooldowns, EnemyAction};
use crate::observation::Observation;
use crate::removal::Lifecycle;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

/// What the host hands over for one agent on one tick.
#[derive(Debug, Clone)]
pub struct AgentInput {
    pub observation: Observation,          // state now
    pub previous_observation: Observation, // state recorded by the host for the last step
    pub mask: ActionMask,
    pub cooldowns: Cooldowns,
    pub reward: f32,                       // reward earned since the previous tick
}

/// What the engine hands back for one agent on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub busy: bool,
    pub action: Option<EnemyAction>, // set only when a new decision was made
    pub epsilon: f32,
}

/// Per-agent learning state. Everything here is private to the agent, so
/// agents can be driven in parallel against the shared network.
#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    epsilon: f32,
    rng: StdRng,
    accumulated_reward: f32,
    busy: bool,
    action_timer: f32,
    chosen_action: Option<EnemyAction>,
    steps: u32,
    lifecycle: Lifecycle,
}

impl Agent {
    pub fn new(id: AgentId, epsilon: f32, seed: u64) -> Self {
        Self {
            id,
            epsilon,
            rng: StdRng::seed_from_u64(seed),
            accumulated_reward: 0.0,
            busy: false,
            action_timer: 0.0,
            chosen_action: None,
            steps: 0,
            lifecycle: Lifecycle::Active,
        }
    }

    pub fn id(&self) -> AgentId { self.id }
    pub fn epsilon(&self) -> f32 { self.epsilon }
    pub fn is_busy(&self) -> bool { self.busy }
    pub fn accumulated_reward(&self) -> f32 { self.accumulated_reward }
    pub fn chosen_action(&self) -> Option<EnemyAction> { self.chosen_action }
    pub fn steps(&self) -> u32 { self.steps }
    pub fn lifecycle(&self) -> Lifecycle { self.lifecycle }

    pub fn add_reward(&mut self, reward: f32) {
        self.accumulated_reward += reward;
    }

    /// Let the host hold an agent (stunned, animating) or release it early.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
        if !busy {
            self.action_timer = 0.0;
        }
    }

    /// Count the current action down by `dt`; the agent frees up when it runs out.
    pub fn advance(&mut self, dt: f32) {
        if !self.busy {
            return;
        }
        self.action_timer -= dt;
        if self.action_timer <= 0.0 {
            self.action_timer = 0.0;
            self.busy = false;
        }
    }

    /// Request removal. Only an active agent can be marked; later calls are no-ops.
    pub fn mark_for_removal(&mut self) {
        if self.lifecycle == Lifecycle::Active {
            self.lifecycle = Lifecycle::PendingRemoval;
        }
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Book-keeping after a decision: hand back the reward collected since
    /// the last one, decay epsilon and start the busy timer.
    pub(crate) fn commit_decision(
        &mut self,
        action: EnemyAction,
        epsilon_decay: f32,
        epsilon_floor: f32,
        duration: f32,
        max_steps: u32,
    ) -> f32 {
        let reward = std::mem::take(&mut self.accumulated_reward);
        self.chosen_action = Some(action);
        self.steps = (self.steps + 1).min(max_steps);
        self.epsilon = (self.epsilon - epsilon_decay).max(epsilon_floor);
        self.busy = true;
        self.action_timer = duration;
        reward
    }

    pub(crate) fn outcome(&self, action: Option<EnemyAction>) -> TickOutcome {
        TickOutcome { busy: self.busy, action, epsilon: self.epsilon }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_resets_reward_and_decays_epsilon() {
        let mut agent = Agent::new(AgentId(1), 0.5, 0);
        agent.add_reward(1.5);
        agent.add_reward(-0.5);
        let r = agent.commit_decision(EnemyAction::Dash, 0.001, 0.01, 1.0, 100);
        assert_eq!(r, 1.0);
        assert_eq!(agent.accumulated_reward(), 0.0);
        assert!((agent.epsilon() - 0.499).abs() < 1e-6);
        assert!(agent.is_busy());
        assert_eq!(agent.chosen_action(), Some(EnemyAction::Dash));
    }

    #[test]
    fn epsilon_and_steps_saturate() {
        let mut agent = Agent::new(AgentId(2), 0.015, 0);
        for _ in 0..150 {
            agent.commit_decision(EnemyAction::Stay, 0.001, 0.01, 1.0, 100);
        }
        assert_eq!(agent.epsilon(), 0.01);
        assert_eq!(agent.steps(), 100);
    }

    #[test]
    fn busy_clears_after_decision_duration() {
        let mut agent = Agent::new(AgentId(3), 1.0, 0);
        agent.commit_decision(EnemyAction::Forward, 0.001, 0.01, 1.0, 100);
        agent.advance(0.4);
        assert!(agent.is_busy());
        agent.advance(0.6);
        assert!(!agent.is_busy());
    }

    #[test]
    fn removal_mark_is_one_way() {
        let mut agent = Agent::new(AgentId(4), 1.0, 0);
        agent.mark_for_removal();
        assert_eq!(agent.lifecycle(), Lifecycle::PendingRemoval);
        agent.set_lifecycle(Lifecycle::Removed);
        agent.mark_for_removal();
        assert_eq!(agent.lifecycle(), Lifecycle::Removed);
    }
}
