//! Hyperparameters for the engine: network shape, policy, replay and trainer.

use crate::action::ACTION_COUNT;
use crate::error::{DrlError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Which parameter update the trainer applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRule {
    /// Clip at `gradient_clip`, clip each weight gradient, L2 weight decay.
    Regularized,
    /// Earlier rule: clip at `legacy_gradient_clip`, plain SGD.
    Legacy,
}

/// Multiplicand used for the input-weight gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputGradient {
    /// The input feature feeding the weight (true backprop).
    Feature,
    /// `input_weights[i]`, as the shipped game did. Kept for reproducing old runs.
    WeightValue,
}

/// What the selector does when no action is allowed by mask and cooldowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyMaskFallback {
    /// Uniform over all nine actions, ignoring the mask.
    UniformAll,
    /// Always `EnemyAction::Stay`.
    Stay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrlConfig {
    pub input_size: usize,              // observation length
    pub hidden_size: usize,             // hidden width
    pub discount_factor: f32,           // gamma
    pub learning_rate: f32,             // SGD step
    pub epsilon_initial: f32,           // starting epsilon for new agents
    pub epsilon_decay: f32,             // linear decrement per decision
    pub epsilon_floor: f32,             // epsilon never goes below this
    pub minibatch_size: usize,          // also the minimum buffer length for training
    pub train_interval: u64,            // train every N ticks
    pub buffer_high_water: usize,       // sync target + clear buffer at this length
    pub gradient_clip: f32,             // clip for the regularized rule
    pub legacy_gradient_clip: f32,      // clip for the legacy rule
    pub weight_decay: f32,              // L2 coefficient
    pub loss_ema_decay: f32,            // smoothing of the secondary loss signal
    pub proximity_feature: usize,       // observation index of the distance feature
    pub proximity_threshold: f32,       // only sample states at or below this distance
    pub decision_duration: f32,         // how long an agent stays busy after deciding
    pub max_agent_steps: u32,           // per-agent decision counter saturates here
    pub update_rule: UpdateRule,
    pub input_gradient: InputGradient,
    pub terminal_bootstrap: bool,       // drop the bootstrap term on done transitions
    pub empty_mask_fallback: EmptyMaskFallback,
    pub init_weight_scale: f32,         // half-width of the uniform init range
    pub seed: u64,                      // trainer RNG seed; agents derive theirs from it
}

impl Default for DrlConfig {
    fn default() -> Self {
        Self {
            input_size: 8,
            hidden_size: 16,
            discount_factor: 0.9,
            learning_rate: 0.01,
            epsilon_initial: 1.0,
            epsilon_decay: 0.001,
            epsilon_floor: 0.01,
            minibatch_size: 32,
            train_interval: 30,
            buffer_high_water: 512,
            gradient_clip: 1.0,
            legacy_gradient_clip: 0.5,
            weight_decay: 1e-4,
            loss_ema_decay: 0.99,
            proximity_feature: 0,
            proximity_threshold: 0.5,
            decision_duration: 1.0,
            max_agent_steps: 100,
            update_rule: UpdateRule::Regularized,
            input_gradient: InputGradient::Feature,
            terminal_bootstrap: false,
            empty_mask_fallback: EmptyMaskFallback::UniformAll,
            init_weight_scale: 0.5,
            seed: 123,
        }
    }
}

impl DrlConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Clip threshold of the active update rule.
    pub fn active_clip(&self) -> f32 {
        match self.update_rule {
            UpdateRule::Regularized => self.gradient_clip,
            UpdateRule::Legacy => self.legacy_gradient_clip,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(DrlError::InvalidConfig(msg));
        if self.input_size == 0 || self.hidden_size == 0 {
            return bad(format!(
                "network sizes must be non-zero (input={}, hidden={})",
                self.input_size, self.hidden_size
            ));
        }
        if self.proximity_feature >= self.input_size {
            return bad(format!(
                "proximity_feature {} is outside an observation of {} features",
                self.proximity_feature, self.input_size
            ));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return bad(format!("discount_factor {} must lie in [0, 1]", self.discount_factor));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return bad(format!("learning_rate {} must be positive", self.learning_rate));
        }
        if !(self.epsilon_floor >= 0.0 && self.epsilon_floor <= self.epsilon_initial && self.epsilon_initial <= 1.0) {
            return bad(format!(
                "epsilon range [{}, {}] must lie within [0, 1]",
                self.epsilon_floor, self.epsilon_initial
            ));
        }
        if self.epsilon_decay < 0.0 {
            return bad(format!("epsilon_decay {} must not be negative", self.epsilon_decay));
        }
        if self.minibatch_size == 0 || self.train_interval == 0 {
            return bad("minibatch_size and train_interval must be non-zero".to_string());
        }
        if self.buffer_high_water < self.minibatch_size {
            return bad(format!(
                "buffer_high_water {} is below minibatch_size {}",
                self.buffer_high_water, self.minibatch_size
            ));
        }
        if !(self.gradient_clip > 0.0) || !(self.legacy_gradient_clip > 0.0) {
            return bad("gradient clip thresholds must be positive".to_string());
        }
        if self.weight_decay < 0.0 || !(0.0..1.0).contains(&self.loss_ema_decay) {
            return bad("weight_decay must be >= 0 and loss_ema_decay in [0, 1)".to_string());
        }
        if !(self.init_weight_scale > 0.0) {
            return bad(format!("init_weight_scale {} must be positive", self.init_weight_scale));
        }
        Ok(())
    }

    /// Number of network outputs, fixed by the action set.
    pub fn output_size(&self) -> usize {
        ACTION_COUNT
    }
}
