//! Per-tick driver: parallel action selection for every agent, then training.

use crate::agent::{Agent, AgentId, AgentInput, TickOutcome};
use crate::config::DrlConfig;
use crate::error::{DrlError, Result};
use crate::params::{NetworkShape, Parameters, SharedNetwork};
use crate::removal::{self, Despawner};
use crate::replay_buffer::{ReplayBuffer, Transition};
use crate::selector::ActionSelector;
use crate::trainer::{LossMetric, TickReport, Trainer, TrainerStats};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{info, trace, warn};

pub struct Engine {
    cfg: DrlConfig,
    network: SharedNetwork,
    replay: ReplayBuffer,
    selector: ActionSelector,
    trainer: Trainer,
    next_agent_id: u32,
    ticks: u64,
}

impl Engine {
    /// Engine with seeded random initial weights.
    pub fn new(cfg: DrlConfig) -> Result<Self> {
        cfg.validate()?;
        let mut rng = StdRng::seed_from_u64(cfg.seed ^ 0xA5A5_5A5A);
        let online = Parameters::random(shape_of(&cfg), &mut rng, cfg.init_weight_scale);
        Self::with_parameters(cfg, online)
    }

    /// Engine starting from explicit weights; the target starts as a copy.
    pub fn with_parameters(cfg: DrlConfig, online: Parameters) -> Result<Self> {
        let network = SharedNetwork::new(online);
        Self::with_network(cfg, network)
    }

    pub fn with_network(cfg: DrlConfig, network: SharedNetwork) -> Result<Self> {
        cfg.validate()?;
        let expected = shape_of(&cfg);
        if network.shape() != expected {
            return Err(DrlError::InvalidConfig(format!(
                "network shape {:?} does not match configured {:?}",
                network.shape(),
                expected
            )));
        }
        network.check_lengths()?;
        info!(
            input = expected.input_size,
            hidden = expected.hidden_size,
            output = expected.output_size,
            "engine ready"
        );
        Ok(Self {
            selector: ActionSelector::new(&cfg),
            trainer: Trainer::new(&cfg),
            replay: ReplayBuffer::with_capacity(cfg.buffer_high_water),
            network,
            cfg,
            next_agent_id: 0,
            ticks: 0,
        })
    }

    /// New agent with the configured starting epsilon and its own RNG stream.
    pub fn spawn_agent(&mut self) -> Agent {
        let id = AgentId(self.next_agent_id);
        self.next_agent_id += 1;
        let seed = self.cfg.seed.wrapping_add(0x9E37_79B9_7F4A_7C15u64.wrapping_mul(id.0 as u64 + 1));
        Agent::new(id, self.cfg.epsilon_initial, seed)
    }

    /// Advance every agent by `dt`, let the idle ones decide, record their
    /// transitions in agent order, then run the trainer.
    ///
    /// `inputs[i]` belongs to `agents[i]`.
    /// Agents without a matching input only have their timers advanced.
    pub fn tick(&mut self, agents: &mut [Agent], inputs: &[AgentInput], dt: f32) -> (Vec<TickOutcome>, TickReport) {
        if agents.len() != inputs.len() {
            warn!(agents = agents.len(), inputs = inputs.len(), "agent and input counts differ, unmatched agents skip this tick");
        }
        let paired = agents.len().min(inputs.len());
        let (with_input, without_input) = agents.split_at_mut(paired);

        let selector = &self.selector;
        let online = self.network.online();
        let mut results: Vec<(TickOutcome, Option<Transition>)> = with_input
            .par_iter_mut()
            .zip(inputs[..paired].par_iter())
            .map(|(agent, input)| {
                agent.advance(dt);
                selector.decide(agent, input, online)
            })
            .collect();
        for agent in without_input {
            agent.advance(dt);
            results.push((agent.outcome(None), None));
        }

        let mut outcomes = Vec::with_capacity(results.len());
        let mut decided = 0usize;
        for (outcome, transition) in results {
            if let Some(tr) = transition {
                self.replay.push(tr);
                decided += 1;
            }
            outcomes.push(outcome);
        }

        let report = self.trainer.tick(&mut self.network, &mut self.replay);
        self.ticks += 1;
        trace!(tick = self.ticks, decided, buffer_len = self.replay.len(), "tick done");
        (outcomes, report)
    }

    /// Hand agents marked for removal to the host.
    pub fn sweep_removed<D: Despawner + ?Sized>(&self, agents: &mut [Agent], host: &mut D) -> usize {
        removal::sweep(agents, host)
    }

    pub fn config(&self) -> &DrlConfig { &self.cfg }
    pub fn network(&self) -> &SharedNetwork { &self.network }
    pub fn replay_len(&self) -> usize { self.replay.len() }
    pub fn loss_metric(&self) -> LossMetric { self.trainer.loss_metric() }
    pub fn trainer_stats(&self) -> TrainerStats { self.trainer.stats() }
    pub fn ticks(&self) -> u64 { self.ticks }

    /// Tear the engine down and keep the learned network.
    pub fn into_network(self) -> SharedNetwork {
        self.network
    }
}

fn shape_of(cfg: &DrlConfig) -> NetworkShape {
    NetworkShape::new(cfg.input_size, cfg.hidden_size, cfg.output_size())
}
