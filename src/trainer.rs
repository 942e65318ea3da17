//! Off-policy Q learning from the replay buffer: minibatch sampling,
//! TD targets from the target network, hand-written backprop with clipping
//! and weight decay, and the hard target sync at the buffer high-water mark.

use crate::config::{DrlConfig, InputGradient, UpdateRule};
use crate::log;
use crate::network::{forward_pass, forward_pass_with_intermediate};
use crate::params::{Parameters, SharedNetwork};
use crate::replay_buffer::{ReplayBuffer, Transition, near};
use crate::utils::{clip_in_place, has_non_finite, max_value, round2, vec_stats};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

/// Latest training loss as the host sees it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LossMetric {
    pub value: f32,                          // rounded to 2 decimals
    pub updated_at: Option<DateTime<Utc>>,   // None until the first training pass
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrainerStats {
    pub ema_loss: f32,
    pub cumulative_loss: f32,
    pub passes: u64,
    pub samples_trained: u64,
    pub samples_skipped: u64,
    pub target_syncs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub batch_len: usize,
    pub trained: usize,
    pub skipped: usize,
    pub total_loss: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickReport {
    pub training: Option<TrainingReport>,
    pub synced: bool,
}

/// Error signals at the output and hidden layers for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub output: Vec<f32>,
    pub hidden: Vec<f32>,
}

/// Forward results for one transition, before any update.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub hidden: Vec<f32>,
    pub q_values: Vec<f32>,
    pub target_q: f32,
    pub targets: Vec<f32>,
}

pub struct Trainer {
    cfg: DrlConfig,
    rng: StdRng,
    step_counter: u64,
    loss: LossMetric,
    stats: TrainerStats,
}

impl Trainer {
    pub fn new(cfg: &DrlConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            rng: StdRng::seed_from_u64(cfg.seed),
            step_counter: 0,
            loss: LossMetric::default(),
            stats: TrainerStats::default(),
        }
    }

    pub fn loss_metric(&self) -> LossMetric { self.loss }
    pub fn stats(&self) -> TrainerStats { self.stats }
    pub fn step_counter(&self) -> u64 { self.step_counter }

    /// Once per tick, after every agent has decided.
    ///
    /// Trains every `train_interval` ticks when the buffer holds at least a
    /// minibatch, then, independently, syncs the target network and empties
    /// the buffer once it reaches the high-water mark.
    pub fn tick(&mut self, network: &mut SharedNetwork, replay: &mut ReplayBuffer) -> TickReport {
        self.step_counter += 1;
        let mut report = TickReport::default();

        if self.step_counter % self.cfg.train_interval == 0 && replay.is_ready(self.cfg.minibatch_size) {
            report.training = Some(self.train_pass(network, replay));
        }

        if replay.len() >= self.cfg.buffer_high_water {
            network.sync_target();
            info!(buffer_len = replay.len(), syncs = self.stats.target_syncs + 1, "target network synced, replay buffer cleared");
            replay.clear();
            self.step_counter = 0;
            self.stats.target_syncs += 1;
            report.synced = true;
        }
        report
    }

    /// One minibatch of updates on the online parameters.
    pub fn train_pass(&mut self, network: &mut SharedNetwork, replay: &ReplayBuffer) -> TrainingReport {
        let accept = near(self.cfg.proximity_feature, self.cfg.proximity_threshold);
        let batch = replay.sample(&mut self.rng, self.cfg.minibatch_size, accept);
        let batch_len = batch.len();

        let mut losses = Vec::with_capacity(batch_len);
        let mut skipped = 0;
        for tr in batch {
            match self.train_sample(network, tr, batch_len) {
                Some(loss) => losses.push(loss),
                None => skipped += 1,
            }
        }
        let trained = losses.len();
        let total_loss: f32 = losses.iter().sum();

        self.stats.passes += 1;
        self.stats.samples_trained += trained as u64;
        self.stats.samples_skipped += skipped as u64;

        if batch_len == 0 {
            debug!(buffer_len = replay.len(), "no transition close enough to train on");
        } else {
            self.record_loss(total_loss);
            let per_sample = vec_stats(&losses);
            debug!(
                batch_len,
                trained,
                skipped,
                min = per_sample.min,
                max = per_sample.max,
                mean = per_sample.mean,
                "per-sample loss"
            );
        }

        let step = self.stats.passes;
        log::scalar(step, "loss", total_loss);
        log::scalar(step, "loss_ema", self.stats.ema_loss);
        log::scalar(step, "batch_len", batch_len as f32);

        TrainingReport { batch_len, trained, skipped, total_loss }
    }

    fn record_loss(&mut self, total_loss: f32) {
        let d = self.cfg.loss_ema_decay;
        self.stats.cumulative_loss += total_loss;
        self.stats.ema_loss = d * self.stats.ema_loss + (1.0 - d) * total_loss;
        self.loss = LossMetric { value: round2(total_loss), updated_at: Some(Utc::now()) };
    }

    /// Update the online parameters from one transition. Returns its share of
    /// the batch loss, or `None` when the transition does not fit the network
    /// or something went non-finite, in which case the update is dropped.
    fn train_sample(&self, network: &mut SharedNetwork, tr: &Transition, batch_len: usize) -> Option<f32> {
        let input_size = network.shape().input_size;
        if tr.state.len() != input_size || tr.next_state.len() != input_size {
            warn!(
                expected = input_size,
                state = tr.state.len(),
                next_state = tr.next_state.len(),
                "transition does not fit the network, skipping this sample"
            );
            return None;
        }
        let eval = evaluate(network, tr, self.cfg.discount_factor, self.cfg.terminal_bootstrap);
        if has_non_finite(&eval.q_values) || !eval.target_q.is_finite() {
            warn!(action = ?tr.action, "NaN/Inf in Q values during training, skipping this sample");
            return None;
        }

        let grads = compute_gradients(network.online(), &eval.hidden, &eval.q_values, &eval.targets, self.cfg.active_clip());
        if has_non_finite(&grads.output) || has_non_finite(&grads.hidden) {
            warn!(action = ?tr.action, "non-finite gradients, skipping this sample");
            return None;
        }

        let mut staged = network.online().clone();
        apply_update(&mut staged, tr.state.features(), &eval.hidden, &grads, &self.cfg);
        if staged.non_finite_any() {
            warn!(action = ?tr.action, "update would make parameters non-finite, skipping this sample");
            return None;
        }
        *network.online_mut() = staged;

        Some(sample_loss(&eval.q_values, &eval.targets, batch_len))
    }
}

/// Online forward pass on the state with its hidden layer, target forward
/// pass on the next state, and the regression target built from them.
pub fn evaluate(network: &SharedNetwork, tr: &Transition, gamma: f32, terminal_bootstrap: bool) -> Evaluation {
    let (hidden, q_values) = forward_pass_with_intermediate(network.online(), tr.state.features());
    let next_q = forward_pass(network.target(), tr.next_state.features());
    let target_q = td_target(tr.reward, &next_q, gamma, tr.done && terminal_bootstrap);
    let targets = target_vector(&q_values, tr.action.index(), target_q);
    Evaluation { hidden, q_values, target_q, targets }
}

/// `reward + gamma * max(next_q)`, or just `reward` for a terminal step.
pub fn td_target(reward: f32, next_q: &[f32], gamma: f32, terminal: bool) -> f32 {
    if terminal {
        reward
    } else {
        reward + gamma * max_value(next_q)
    }
}

/// Copy of `q` with only the taken action replaced by its TD target.
pub fn target_vector(q: &[f32], action: usize, target_q: f32) -> Vec<f32> {
    let mut t = q.to_vec();
    t[action] = target_q;
    t
}

/// Backprop the squared error through the linear output and the sigmoid
/// hidden layer. Both signals are clipped to `[-clip, clip]`.
pub fn compute_gradients(params: &Parameters, hidden: &[f32], q: &[f32], targets: &[f32], clip: f32) -> Gradients {
    let hidden_size = params.shape().hidden_size;

    let mut output: Vec<f32> = q.iter().zip(targets).map(|(o, t)| o - t).collect();

    let mut hidden_grad: Vec<f32> = (0..hidden_size)
        .map(|j| {
            let error: f32 = output
                .iter()
                .enumerate()
                .map(|(k, g)| g * params.hidden_weights[k * hidden_size + j])
                .sum();
            error * hidden[j] * (1.0 - hidden[j])
        })
        .collect();

    clip_in_place(&mut output, clip);
    clip_in_place(&mut hidden_grad, clip);
    Gradients { output, hidden: hidden_grad }
}

/// SGD step on `params` with the configured rule.
pub fn apply_update(params: &mut Parameters, input: &[f32], hidden: &[f32], grads: &Gradients, cfg: &DrlConfig) {
    let shape = params.shape();
    let lr = cfg.learning_rate;
    let (clip, decay) = match cfg.update_rule {
        UpdateRule::Regularized => (Some(cfg.gradient_clip), cfg.weight_decay),
        UpdateRule::Legacy => (None, 0.0),
    };
    let bound = |g: f32| match clip {
        Some(c) => g.clamp(-c, c),
        None => g,
    };

    for j in 0..shape.hidden_size {
        for i in 0..shape.input_size {
            // WeightValue reads the live array, so rows after the first see
            // the already-updated first row.
            let x = match cfg.input_gradient {
                InputGradient::Feature => input[i],
                InputGradient::WeightValue => params.input_weights[i],
            };
            let idx = j * shape.input_size + i;
            let g = bound(grads.hidden[j] * x);
            params.input_weights[idx] -= lr * (g + decay * params.input_weights[idx]);
        }
    }

    for k in 0..shape.output_size {
        for j in 0..shape.hidden_size {
            let idx = k * shape.hidden_size + j;
            let g = bound(grads.output[k] * hidden[j]);
            params.hidden_weights[idx] -= lr * (g + decay * params.hidden_weights[idx]);
        }
    }

    for (b, g) in params.output_biases.iter_mut().zip(&grads.output) {
        *b -= lr * g;
    }
    for (b, g) in params.hidden_biases.iter_mut().zip(&grads.hidden) {
        *b -= lr * g;
    }
}

/// Squared error over all outputs, averaged over the batch.
pub fn sample_loss(q: &[f32], targets: &[f32], batch_len: usize) -> f32 {
    let sq: f32 = q.iter().zip(targets).map(|(o, t)| (o - t) * (o - t)).sum();
    sq / batch_len.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ACTION_COUNT, EnemyAction};
    use crate::observation::Observation;
    use crate::params::NetworkShape;

    fn cfg() -> DrlConfig {
        DrlConfig { input_size: 4, hidden_size: 4, ..DrlConfig::default() }
    }

    fn shape() -> NetworkShape {
        NetworkShape::new(4, 4, ACTION_COUNT)
    }

    fn transition(distance: f32, action: EnemyAction, reward: f32) -> Transition {
        Transition {
            state: Observation::new(vec![distance, 0.5, -0.5, 1.0]),
            action,
            reward,
            next_state: Observation::new(vec![distance, 0.1, 0.2, 0.3]),
            done: false,
        }
    }

    #[test]
    fn td_target_bootstraps_from_max_next_q() {
        let next_q = [0.0, 2.0, -1.0, 1.5, 0.0, 0.0, 0.0, 0.0, 0.0];
        let t = td_target(1.0, &next_q, 0.9, false);
        assert!((t - 2.8).abs() < 1e-6);
        assert_eq!(td_target(1.0, &next_q, 0.9, true), 1.0);
    }

    #[test]
    fn single_transition_target_only_touches_taken_action() {
        // online: zero weights, output = biases; target: max next Q is 2.0
        let mut online = Parameters::uniform(shape(), 0.0, 0.0);
        online.output_biases = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
        let mut target = Parameters::uniform(shape(), 0.0, 0.0);
        target.output_biases[6] = 2.0;
        let net = SharedNetwork::from_parts(online, target).unwrap();

        let tr = transition(0.2, EnemyAction::Block, 1.0);
        let eval = evaluate(&net, &tr, 0.9, false);

        assert!((eval.target_q - 2.8).abs() < 1e-6);
        for k in 0..ACTION_COUNT {
            if k == EnemyAction::Block.index() {
                assert_eq!(eval.targets[k], eval.target_q);
            } else {
                assert_eq!(eval.targets[k], eval.q_values[k]);
            }
        }
    }

    #[test]
    fn done_flag_is_ignored_unless_terminal_bootstrap_is_on() {
        let mut target = Parameters::uniform(shape(), 0.0, 0.0);
        target.output_biases[0] = 3.0;
        let net = SharedNetwork::from_parts(Parameters::uniform(shape(), 0.0, 0.0), target).unwrap();
        let mut tr = transition(0.2, EnemyAction::Forward, 1.0);
        tr.done = true;

        assert!((evaluate(&net, &tr, 0.5, false).target_q - 2.5).abs() < 1e-6);
        assert_eq!(evaluate(&net, &tr, 0.5, true).target_q, 1.0);
    }

    #[test]
    fn gradients_are_clipped_for_huge_errors() {
        let params = Parameters::uniform(shape(), 50.0, 0.0);
        let hidden = vec![0.5; 4];
        let q = vec![1e6; ACTION_COUNT];
        let mut targets = q.clone();
        targets[2] = -1e6;
        targets[5] = 1e7;

        for clip in [1.0, 0.5] {
            let g = compute_gradients(&params, &hidden, &q, &targets, clip);
            assert!(g.output.iter().chain(&g.hidden).all(|v| (-clip..=clip).contains(v)));
            assert_eq!(g.output[2], clip);
            assert_eq!(g.output[5], -clip);
        }
    }

    #[test]
    fn update_moves_taken_action_toward_target() {
        let mut rng = StdRng::seed_from_u64(21);
        let online = Parameters::random(shape(), &mut rng, 0.5);
        let mut net = SharedNetwork::new(online);
        let tr = transition(0.1, EnemyAction::Heal, 5.0);
        let c = cfg();

        let before = evaluate(&net, &tr, c.discount_factor, false);
        let err_before = (before.q_values[6] - before.target_q).abs();

        let trainer = Trainer::new(&c);
        for _ in 0..20 {
            assert!(trainer.train_sample(&mut net, &tr, 1).is_some());
        }
        // target network untouched by gradient steps
        let after = evaluate(&net, &tr, c.discount_factor, false);
        assert_eq!(after.target_q, before.target_q);
        assert!((after.q_values[6] - after.target_q).abs() < err_before);
    }

    #[test]
    fn weight_value_mode_differs_from_feature_mode() {
        let mut rng = StdRng::seed_from_u64(5);
        let base = Parameters::random(shape(), &mut rng, 0.5);
        let hidden = vec![0.3, 0.6, 0.2, 0.9];
        let grads = Gradients { output: vec![0.1; ACTION_COUNT], hidden: vec![0.2, -0.1, 0.05, 0.3] };
        let input = [1.0, 2.0, 3.0, 4.0];

        let mut a = base.clone();
        apply_update(&mut a, &input, &hidden, &grads, &cfg());
        let mut b = base.clone();
        apply_update(&mut b, &input, &hidden, &grads, &DrlConfig { input_gradient: InputGradient::WeightValue, ..cfg() });

        assert_ne!(a.input_weights, b.input_weights);
        assert_eq!(a.hidden_weights, b.hidden_weights);
        assert_eq!(a.output_biases, b.output_biases);

        // feature mode: w -= lr * (clip(g_j * x_i) + decay * w)
        let c = cfg();
        let (i, j) = (2, 3);
        let w0 = base.input_weights[j * 4 + i];
        let g = (grads.hidden[j] * input[i]).clamp(-1.0, 1.0);
        let expected = w0 - c.learning_rate * (g + c.weight_decay * w0);
        assert!((a.input_weights[j * 4 + i] - expected).abs() < 1e-7);
    }

    #[test]
    fn weight_value_mode_reads_the_live_first_row() {
        let c = DrlConfig { input_gradient: InputGradient::WeightValue, learning_rate: 0.5, ..cfg() };
        let mut base = Parameters::uniform(shape(), 0.0, 0.0);
        base.input_weights = (0..16).map(|n| 0.1 * (n as f32 + 1.0)).collect();
        let grads = Gradients { output: vec![0.0; ACTION_COUNT], hidden: vec![0.4, 0.0, 2.0, 0.0] };

        let mut p = base.clone();
        apply_update(&mut p, &[9.0; 4], &[0.0; 4], &grads, &c);

        let step = |w: f32, g: f32, x: f32| w - c.learning_rate * ((g * x).clamp(-1.0, 1.0) + c.weight_decay * w);

        // row 0, input 1: multiplies by its own value before the update
        let w01 = base.input_weights[1];
        let updated01 = step(w01, 0.4, w01);
        assert!((p.input_weights[1] - updated01).abs() < 1e-7);
        assert!((p.input_weights[1] - 0.159_99).abs() < 1e-5);

        // row 2, input 1: multiplies by the already updated input_weights[1]
        let w21 = base.input_weights[2 * 4 + 1];
        let expected = step(w21, 2.0, updated01);
        assert!((p.input_weights[2 * 4 + 1] - expected).abs() < 1e-7);
        assert!((expected - step(w21, 2.0, w01)).abs() > 1e-3);
        assert!((expected - step(w21, 2.0, w21)).abs() > 1e-3);

        // the input features play no part in this mode
        let mut q = base.clone();
        apply_update(&mut q, &[-3.0; 4], &[0.0; 4], &grads, &c);
        assert_eq!(p.input_weights, q.input_weights);
    }

    #[test]
    fn mismatched_transition_is_skipped() {
        let mut net = SharedNetwork::new(Parameters::uniform(shape(), 0.1, 0.0));
        let before = net.online().clone();
        let mut tr = transition(0.1, EnemyAction::Forward, 1.0);
        tr.next_state = Observation::new(vec![0.1, 0.2]);

        let trainer = Trainer::new(&cfg());
        assert!(trainer.train_sample(&mut net, &tr, 1).is_none());
        assert_eq!(net.online(), &before);
    }

    #[test]
    fn legacy_rule_has_no_weight_decay() {
        let base = Parameters::uniform(shape(), 0.4, 0.0);
        let grads = Gradients { output: vec![0.0; ACTION_COUNT], hidden: vec![0.0; 4] };
        let mut p = base.clone();
        apply_update(&mut p, &[0.0; 4], &[0.0; 4], &grads, &DrlConfig { update_rule: UpdateRule::Legacy, ..cfg() });
        assert_eq!(p, base);

        let mut p = base.clone();
        apply_update(&mut p, &[0.0; 4], &[0.0; 4], &grads, &cfg());
        assert!(p.input_weights.iter().all(|&w| w < 0.4));
    }

    #[test]
    fn non_finite_sample_is_skipped_without_touching_parameters() {
        let mut online = Parameters::uniform(shape(), 0.1, 0.0);
        online.output_biases[0] = f32::NAN;
        let mut net = SharedNetwork::new(online);
        let before = net.online().clone();

        let trainer = Trainer::new(&cfg());
        let tr = transition(0.1, EnemyAction::Forward, 1.0);
        assert!(trainer.train_sample(&mut net, &tr, 1).is_none());
        assert_eq!(net.online().input_weights, before.input_weights);
        assert_eq!(net.online().hidden_weights, before.hidden_weights);
    }

    #[test]
    fn trains_on_interval_and_syncs_at_high_water() {
        let c = DrlConfig { buffer_high_water: 64, ..cfg() };
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = SharedNetwork::new(Parameters::random(shape(), &mut rng, 0.5));
        let mut replay = ReplayBuffer::new();
        let mut trainer = Trainer::new(&c);

        for i in 0..40 {
            replay.push(transition(0.1, EnemyAction::ALL[i % ACTION_COUNT], 1.0));
        }
        for tick in 1..=29 {
            let r = trainer.tick(&mut net, &mut replay);
            assert!(r.training.is_none(), "tick {tick} should not train");
        }
        let r = trainer.tick(&mut net, &mut replay);
        let training = r.training.expect("tick 30 trains");
        assert_eq!(training.batch_len, 32);
        assert!(!r.synced);
        assert_ne!(net.online(), net.target());

        let loss = trainer.loss_metric();
        assert!(loss.value >= 0.0);
        assert_eq!(loss.value, round2(loss.value));
        assert!(loss.updated_at.is_some());

        for i in 0..24 {
            replay.push(transition(0.9, EnemyAction::ALL[i % ACTION_COUNT], 0.0));
        }
        let r = trainer.tick(&mut net, &mut replay);
        assert!(r.synced);
        assert!(replay.is_empty());
        assert_eq!(net.online(), net.target());
        assert_eq!(trainer.step_counter(), 0);
        assert_eq!(trainer.stats().target_syncs, 1);
    }

    #[test]
    fn far_states_are_never_sampled() {
        let c = cfg();
        let mut net = SharedNetwork::new(Parameters::uniform(shape(), 0.1, 0.0));
        let mut replay = ReplayBuffer::new();
        for _ in 0..40 {
            replay.push(transition(0.8, EnemyAction::Stay, 1.0));
        }
        let mut trainer = Trainer::new(&c);
        let report = trainer.train_pass(&mut net, &replay);
        assert_eq!(report.batch_len, 0);
        assert_eq!(net.online(), net.target());
        assert_eq!(trainer.loss_metric().updated_at, None);
    }
}
