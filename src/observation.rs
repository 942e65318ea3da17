use serde::{Deserialize, Serialize};

/// Feature vector describing one agent's view of the game at a tick.
///
/// Cloning takes a full copy, so a transition holding an `Observation`
/// never shares storage with the host's live buffer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation(Vec<f32>);

impl Observation {
    pub fn new(features: Vec<f32>) -> Self {
        Self(features)
    }

    pub fn features(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<f32> {
        self.0.get(i).copied()
    }
}

impl From<Vec<f32>> for Observation {
    fn from(v: Vec<f32>) -> Self {
        Self(v)
    }
}

impl From<&[f32]> for Observation {
    fn from(v: &[f32]) -> Self {
        Self(v.to_vec())
    }
}
