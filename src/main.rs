//! Headless demo host: a handful of enemies chase a circling player on a
//! unit arena while the engine learns which actions close the distance.

use anyhow::Result;
use enemy_drl::{
    ActionMask, Agent, AgentId, AgentInput, Cooldowns, Despawner, DrlConfig, EnemyAction, Engine, Observation, log,
};
use tracing::info;

const ENEMIES: usize = 8;
const TICKS: u64 = 6_000;
const DT: f32 = 0.25;
const SPEED: f32 = 0.02;

#[derive(Clone, Copy)]
struct Body {
    x: f32,
    y: f32,
    health: f32,
}

struct Arena {
    player: Body,
    enemies: Vec<Body>,
    cooldowns: Vec<Cooldowns>,
    previous: Vec<Observation>,
    time: f32,
}

impl Arena {
    fn new(n: usize) -> Self {
        let enemies: Vec<Body> = (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * std::f32::consts::TAU;
                Body { x: 0.5 + 0.45 * a.cos(), y: 0.5 + 0.45 * a.sin(), health: 1.0 }
            })
            .collect();
        let mut arena = Self {
            player: Body { x: 0.5, y: 0.5, health: 1.0 },
            enemies,
            cooldowns: vec![Cooldowns::default(); n],
            previous: Vec::with_capacity(n),
            time: 0.0,
        };
        arena.previous = (0..n).map(|i| arena.observe(i)).collect();
        arena
    }

    /// distance first: the trainer samples on it
    fn observe(&self, i: usize) -> Observation {
        let e = self.enemies[i];
        let dx = self.player.x - e.x;
        let dy = self.player.y - e.y;
        let cd = self.cooldowns[i];
        Observation::new(vec![
            (dx * dx + dy * dy).sqrt(),
            dx,
            dy,
            e.health,
            self.player.health,
            cd.dash.max(0.0),
            cd.heal.max(0.0),
            cd.block.max(0.0),
        ])
    }

    fn mask(&self, i: usize) -> ActionMask {
        let e = self.enemies[i];
        ActionMask::all()
            .with(EnemyAction::Heal, e.health < 1.0)
            .with(EnemyAction::Forward, e.x < 0.98 && e.y < 0.98)
            .with(EnemyAction::Backward, e.x > 0.02 && e.y > 0.02)
    }

    /// Apply an action, returning the reward it earned.
    fn act(&mut self, i: usize, action: EnemyAction) -> f32 {
        let before = self.observe(i).features()[0];
        let e = &mut self.enemies[i];
        let dx = self.player.x - e.x;
        let dy = self.player.y - e.y;
        let len = (dx * dx + dy * dy).sqrt().max(1e-4);
        let (ux, uy) = (dx / len, dy / len);
        let cd = &mut self.cooldowns[i];
        match action {
            EnemyAction::Forward => { e.x += ux * SPEED; e.y += uy * SPEED; }
            EnemyAction::Backward => { e.x -= ux * SPEED; e.y -= uy * SPEED; }
            EnemyAction::StepRight => { e.x += uy * SPEED; e.y -= ux * SPEED; }
            EnemyAction::StepLeft => { e.x -= uy * SPEED; e.y += ux * SPEED; }
            EnemyAction::Dash => { e.x += ux * SPEED * 3.0; e.y += uy * SPEED * 3.0; cd.dash = 2.0; }
            EnemyAction::Block => cd.block = 1.5,
            EnemyAction::Heal => { e.health = (e.health + 0.2).min(1.0); cd.heal = 4.0; }
            EnemyAction::Jump => cd.jump = 1.0,
            EnemyAction::Stay => cd.stay = 0.5,
        }
        e.x = e.x.clamp(0.0, 1.0);
        e.y = e.y.clamp(0.0, 1.0);
        let after = self.observe(i).features()[0];
        (before - after) * 10.0 - 0.01
    }

    fn step_world(&mut self, dt: f32) {
        self.time += dt;
        self.player.x = 0.5 + 0.3 * (self.time * 0.2).cos();
        self.player.y = 0.5 + 0.3 * (self.time * 0.2).sin();
        for (e, cd) in self.enemies.iter_mut().zip(&mut self.cooldowns) {
            cd.tick(dt);
            e.health = (e.health - 0.002).max(0.0);
        }
    }
}

struct Graveyard(Vec<AgentId>);

impl Despawner for Graveyard {
    fn despawn(&mut self, id: AgentId) {
        if !self.0.contains(&id) {
            self.0.push(id);
        }
    }
}

fn main() -> Result<()> {
    log::init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => DrlConfig::from_file(&path)?,
        None => DrlConfig::default(),
    };
    let mut engine = Engine::new(cfg)?;
    let mut agents: Vec<Agent> = (0..ENEMIES).map(|_| engine.spawn_agent()).collect();
    let mut arena = Arena::new(ENEMIES);
    let mut graveyard = Graveyard(Vec::new());
    let mut rewards = vec![0.0f32; ENEMIES];

    for tick in 1..=TICKS {
        arena.step_world(DT);
        let inputs: Vec<AgentInput> = (0..ENEMIES)
            .map(|i| AgentInput {
                observation: arena.observe(i),
                previous_observation: arena.previous[i].clone(),
                mask: arena.mask(i),
                cooldowns: arena.cooldowns[i],
                reward: std::mem::take(&mut rewards[i]),
            })
            .collect();

        let (outcomes, report) = engine.tick(&mut agents, &inputs, DT);

        for (i, outcome) in outcomes.iter().enumerate() {
            if let Some(action) = outcome.action {
                arena.previous[i] = inputs[i].observation.clone();
                rewards[i] += arena.act(i, action);
            }
            if arena.enemies[i].health <= 0.0 {
                agents[i].mark_for_removal();
            }
        }
        engine.sweep_removed(&mut agents, &mut graveyard);

        if let Some(training) = report.training {
            let loss = engine.loss_metric();
            info!(tick, batch = training.batch_len, loss = loss.value, epsilon = agents[0].epsilon(), "trained");
        }
    }

    let stats = engine.trainer_stats();
    info!(
        passes = stats.passes,
        samples = stats.samples_trained,
        skipped = stats.samples_skipped,
        syncs = stats.target_syncs,
        ema_loss = stats.ema_loss,
        removed = graveyard.0.len(),
        "done"
    );
    Ok(())
}
