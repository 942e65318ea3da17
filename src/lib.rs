//! On-line deep Q learning for enemy agents.
//!
//! A small sigmoid network scores the nine enemy actions, an epsilon-greedy
//! selector picks among the actions the host allows, decisions land in a
//! replay buffer, and a trainer periodically fits the network to sampled
//! experience against a lagged target copy.

pub mod action;
pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod network;
pub mod observation;
pub mod params;
pub mod removal;
pub mod replay_buffer;
pub mod selector;
pub mod trainer;
pub mod utils;

pub use action::{ACTION_COUNT, ActionMask, Cooldowns, EnemyAction};
pub use agent::{Agent, AgentId, AgentInput, TickOutcome};
pub use config::{DrlConfig, EmptyMaskFallback, InputGradient, UpdateRule};
pub use engine::Engine;
pub use error::DrlError;
pub use observation::Observation;
pub use params::{NetworkShape, Parameters, SharedNetwork};
pub use removal::{Despawner, Lifecycle};
pub use replay_buffer::{ReplayBuffer, Transition};
pub use trainer::{LossMetric, TickReport, Trainer, TrainerStats};
