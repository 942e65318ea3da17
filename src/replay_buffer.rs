use crate::action::EnemyAction;
use crate::observation::Observation;
use rand::Rng;
use rand::seq::SliceRandom;

/// One decision: the state it was taken from, what was done, the reward
/// collected since the previous decision and the state seen now.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Observation,
    pub action: EnemyAction,
    pub reward: f32,
    pub next_state: Observation,
    pub done: bool,
}

/// Append-only experience store. It is never evicted entry by entry; the
/// trainer clears it wholesale when it reaches the high-water mark.
#[derive(Debug, Default)]
pub struct ReplayBuffer {
    buffer: Vec<Transition>,
}

impl ReplayBuffer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, transition: Transition) {
        self.buffer.push(transition);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Holds at least `batch_size` transitions.
    pub fn is_ready(&self, batch_size: usize) -> bool {
        self.buffer.len() >= batch_size
    }

    /// Drop every stored transition. Capacity is kept for the next round.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Draw up to `min(len, batch_size)` distinct transitions whose state
    /// passes `accept`.
    ///
    /// The whole index range is shuffled once and scanned in that order, so
    /// nothing is drawn twice and the batch comes back short when too few
    /// transitions qualify.
    pub fn sample<R, F>(&self, rng: &mut R, batch_size: usize, mut accept: F) -> Vec<&Transition>
    where
        R: Rng + ?Sized,
        F: FnMut(&Transition) -> bool,
    {
        let want = batch_size.min(self.buffer.len());
        let mut order: Vec<usize> = (0..self.buffer.len()).collect();
        order.shuffle(rng);

        let mut batch = Vec::with_capacity(want);
        for i in order {
            if batch.len() >= want {
                break;
            }
            let tr = &self.buffer[i];
            if accept(tr) {
                batch.push(tr);
            }
        }
        batch
    }
}

/// Sampling predicate: keep states where the distance feature at `feature`
/// is at most `threshold`. States without that feature are rejected.
pub fn near(feature: usize, threshold: f32) -> impl Fn(&Transition) -> bool {
    move |tr| tr.state.get(feature).is_some_and(|d| d <= threshold)
}
