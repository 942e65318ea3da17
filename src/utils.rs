// Small numeric helpers shared by the selector and the trainer.

pub fn has_non_finite(xs: &[f32]) -> bool {
    xs.iter().any(|&v| !v.is_finite())
}

/// Largest element, or `f32::NEG_INFINITY` for an empty slice.
pub fn max_value(xs: &[f32]) -> f32 {
    xs.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

/// Clamp every element into `[-limit, limit]`.
pub fn clip_in_place(xs: &mut [f32], limit: f32) {
    for v in xs {
        *v = v.clamp(-limit, limit);
    }
}

/// Round to two decimal places, the precision the loss is reported at.
pub fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

/// Spread of a batch of per-sample values, for the debug log.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// All zeros for an empty slice.
pub fn vec_stats(xs: &[f32]) -> Stats {
    if xs.is_empty() {
        return Stats::default();
    }
    let (min, max, sum) = xs
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY, 0.0f32), |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + v));
    Stats { min, max, mean: sum / xs.len() as f32 }
}
