use serde::{Deserialize, Serialize};

/// Number of discrete enemy actions, and therefore of network outputs.
pub const ACTION_COUNT: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnemyAction {
    Forward = 0,
    Backward = 1,
    StepRight = 2,
    StepLeft = 3,
    Dash = 4,
    Block = 5,
    Heal = 6,
    Jump = 7,
    Stay = 8,
}

impl EnemyAction {
    pub const ALL: [EnemyAction; ACTION_COUNT] = [
        EnemyAction::Forward,
        EnemyAction::Backward,
        EnemyAction::StepRight,
        EnemyAction::StepLeft,
        EnemyAction::Dash,
        EnemyAction::Block,
        EnemyAction::Heal,
        EnemyAction::Jump,
        EnemyAction::Stay,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<EnemyAction> {
        Self::ALL.get(i).copied()
    }

    /// Actions that additionally need their cooldown timer to have run out.
    pub fn is_gated(self) -> bool {
        matches!(
            self,
            EnemyAction::Dash | EnemyAction::Block | EnemyAction::Heal | EnemyAction::Jump | EnemyAction::Stay
        )
    }
}

/// Which actions the host currently allows, one flag per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionMask {
    pub forward: bool,
    pub backward: bool,
    pub step_right: bool,
    pub step_left: bool,
    pub dash: bool,
    pub block: bool,
    pub heal: bool,
    pub jump: bool,
    pub stay: bool,
}

impl ActionMask {
    pub fn all() -> Self {
        Self {
            forward: true,
            backward: true,
            step_right: true,
            step_left: true,
            dash: true,
            block: true,
            heal: true,
            jump: true,
            stay: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn allows(&self, action: EnemyAction) -> bool {
        match action {
            EnemyAction::Forward => self.forward,
            EnemyAction::Backward => self.backward,
            EnemyAction::StepRight => self.step_right,
            EnemyAction::StepLeft => self.step_left,
            EnemyAction::Dash => self.dash,
            EnemyAction::Block => self.block,
            EnemyAction::Heal => self.heal,
            EnemyAction::Jump => self.jump,
            EnemyAction::Stay => self.stay,
        }
    }

    /// Builder-style toggle, handy for hosts and tests.
    pub fn with(mut self, action: EnemyAction, allowed: bool) -> Self {
        let flag = match action {
            EnemyAction::Forward => &mut self.forward,
            EnemyAction::Backward => &mut self.backward,
            EnemyAction::StepRight => &mut self.step_right,
            EnemyAction::StepLeft => &mut self.step_left,
            EnemyAction::Dash => &mut self.dash,
            EnemyAction::Block => &mut self.block,
            EnemyAction::Heal => &mut self.heal,
            EnemyAction::Jump => &mut self.jump,
            EnemyAction::Stay => &mut self.stay,
        };
        *flag = allowed;
        self
    }
}

/// Remaining cooldown of each gated action. A timer at or below zero is ready.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cooldowns {
    pub dash: f32,
    pub block: f32,
    pub heal: f32,
    pub jump: f32,
    pub stay: f32,
}

impl Cooldowns {
    /// Timer for a gated action; `None` for actions without a cooldown.
    pub fn timer(&self, action: EnemyAction) -> Option<f32> {
        match action {
            EnemyAction::Dash => Some(self.dash),
            EnemyAction::Block => Some(self.block),
            EnemyAction::Heal => Some(self.heal),
            EnemyAction::Jump => Some(self.jump),
            EnemyAction::Stay => Some(self.stay),
            _ => None,
        }
    }

    pub fn is_ready(&self, action: EnemyAction) -> bool {
        self.timer(action).is_none_or(|t| t <= 0.0)
    }

    /// Count every timer down by `dt`.
    pub fn tick(&mut self, dt: f32) {
        for t in [&mut self.dash, &mut self.block, &mut self.heal, &mut self.jump, &mut self.stay] {
            *t -= dt;
        }
    }
}

/// Actions allowed by both the mask and the cooldowns, in index order.
pub fn valid_actions(mask: &ActionMask, cooldowns: &Cooldowns) -> Vec<EnemyAction> {
    EnemyAction::ALL
        .into_iter()
        .filter(|&a| mask.allows(a) && (!a.is_gated() || cooldowns.is_ready(a)))
        .collect()
}
