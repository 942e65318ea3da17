//! Weight and bias storage for the single-hidden-layer Q network, and the
//! online/target pair the engine shares between selector and trainer.
//!
//! Layout is row-major by destination neuron:
//! `input_weights[j * input_size + i]` connects input `i` to hidden `j`,
//! `hidden_weights[k * hidden_size + j]` connects hidden `j` to output `k`.

use crate::error::{DrlError, Result};
use crate::utils::has_non_finite;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkShape {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
}

impl NetworkShape {
    pub fn new(input_size: usize, hidden_size: usize, output_size: usize) -> Self {
        Self { input_size, hidden_size, output_size }
    }

    pub fn input_weight_count(&self) -> usize {
        self.input_size * self.hidden_size
    }

    pub fn hidden_weight_count(&self) -> usize {
        self.hidden_size * self.output_size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    shape: NetworkShape,
    pub input_weights: Vec<f32>,
    pub hidden_weights: Vec<f32>,
    pub hidden_biases: Vec<f32>,
    pub output_biases: Vec<f32>,
}

impl Parameters {
    /// Wrap explicit initial arrays, checking every length against `shape`.
    pub fn new(
        shape: NetworkShape,
        input_weights: Vec<f32>,
        hidden_weights: Vec<f32>,
        hidden_biases: Vec<f32>,
        output_biases: Vec<f32>,
    ) -> Result<Self> {
        let params = Self { shape, input_weights, hidden_weights, hidden_biases, output_biases };
        params.check_lengths()?;
        Ok(params)
    }

    /// The arrays are public, so their lengths can drift from the shape
    /// after construction. Anything that stores parameters re-checks here.
    pub fn check_lengths(&self) -> Result<()> {
        let shape = self.shape;
        check_len("input_weights", shape.input_weight_count(), self.input_weights.len())?;
        check_len("hidden_weights", shape.hidden_weight_count(), self.hidden_weights.len())?;
        check_len("hidden_biases", shape.hidden_size, self.hidden_biases.len())?;
        check_len("output_biases", shape.output_size, self.output_biases.len())
    }

    /// Every weight set to `weight`, every bias to `bias`.
    pub fn uniform(shape: NetworkShape, weight: f32, bias: f32) -> Self {
        Self {
            shape,
            input_weights: vec![weight; shape.input_weight_count()],
            hidden_weights: vec![weight; shape.hidden_weight_count()],
            hidden_biases: vec![bias; shape.hidden_size],
            output_biases: vec![bias; shape.output_size],
        }
    }

    /// Weights drawn uniformly from `[-scale, scale)`, biases start at zero.
    pub fn random<R: Rng + ?Sized>(shape: NetworkShape, rng: &mut R, scale: f32) -> Self {
        let mut draw = |n: usize| -> Vec<f32> { (0..n).map(|_| rng.gen_range(-scale..scale)).collect() };
        let input_weights = draw(shape.input_weight_count());
        let hidden_weights = draw(shape.hidden_weight_count());
        Self {
            shape,
            input_weights,
            hidden_weights,
            hidden_biases: vec![0.0; shape.hidden_size],
            output_biases: vec![0.0; shape.output_size],
        }
    }

    pub fn shape(&self) -> NetworkShape {
        self.shape
    }

    /// Element-wise copy of all four arrays from `other`. Shapes must match.
    pub fn copy_from(&mut self, other: &Parameters) {
        debug_assert_eq!(self.shape, other.shape);
        self.input_weights.copy_from_slice(&other.input_weights);
        self.hidden_weights.copy_from_slice(&other.hidden_weights);
        self.hidden_biases.copy_from_slice(&other.hidden_biases);
        self.output_biases.copy_from_slice(&other.output_biases);
    }

    pub fn non_finite_any(&self) -> bool {
        has_non_finite(&self.input_weights)
            || has_non_finite(&self.hidden_weights)
            || has_non_finite(&self.hidden_biases)
            || has_non_finite(&self.output_biases)
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(DrlError::ShapeMismatch { what, expected, actual })
    }
}

/// The online network, updated by the trainer, and its lagged target copy.
///
/// There is exactly one of these per engine. Selection borrows it shared,
/// training borrows it exclusively, so the two phases cannot overlap.
#[derive(Debug, Clone)]
pub struct SharedNetwork {
    online: Parameters,
    target: Parameters,
}

impl SharedNetwork {
    /// Target starts as a copy of `online`.
    pub fn new(online: Parameters) -> Self {
        let target = online.clone();
        Self { online, target }
    }

    /// Build from two explicit sets. Arrays that do not match their shape,
    /// or online and target shapes that differ, are rejected.
    pub fn from_parts(online: Parameters, target: Parameters) -> Result<Self> {
        online.check_lengths()?;
        target.check_lengths()?;
        let s = online.shape();
        let t = target.shape();
        if s != t {
            return Err(DrlError::InvalidConfig(format!("online shape {s:?} differs from target shape {t:?}")));
        }
        Ok(Self { online, target })
    }

    pub fn shape(&self) -> NetworkShape {
        self.online.shape()
    }

    pub fn online(&self) -> &Parameters {
        &self.online
    }

    pub fn target(&self) -> &Parameters {
        &self.target
    }

    pub(crate) fn online_mut(&mut self) -> &mut Parameters {
        &mut self.online
    }

    /// Hard sync: target becomes an exact copy of online.
    pub fn sync_target(&mut self) {
        self.target.copy_from(&self.online);
    }

    /// Both sets still match their shape.
    pub fn check_lengths(&self) -> Result<()> {
        self.online.check_lengths()?;
        self.target.check_lengths()
    }

    /// Give back both parameter sets.
    pub fn into_parts(self) -> (Parameters, Parameters) {
        (self.online, self.target)
    }
}
