//! Forward pass of the Q network: sigmoid hidden layer, linear output.
//! Pure functions of the parameters and the input.

use crate::params::Parameters;

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Q value of every action for `input`.
pub fn forward_pass(params: &Parameters, input: &[f32]) -> Vec<f32> {
    let hidden = hidden_layer(params, input);
    output_layer(params, &hidden)
}

/// Like [`forward_pass`] but also hands back the hidden activations, which
/// the backward pass needs. Returns `(hidden, q_values)`.
pub fn forward_pass_with_intermediate(params: &Parameters, input: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let hidden = hidden_layer(params, input);
    let q = output_layer(params, &hidden);
    (hidden, q)
}

fn hidden_layer(params: &Parameters, input: &[f32]) -> Vec<f32> {
    let shape = params.shape();
    debug_assert_eq!(input.len(), shape.input_size, "observation length does not match the network");

    (0..shape.hidden_size)
        .map(|j| {
            let row = &params.input_weights[j * shape.input_size..(j + 1) * shape.input_size];
            let sum: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
            sigmoid(sum + params.hidden_biases[j])
        })
        .collect()
}

fn output_layer(params: &Parameters, hidden: &[f32]) -> Vec<f32> {
    let shape = params.shape();
    (0..shape.output_size)
        .map(|k| {
            let row = &params.hidden_weights[k * shape.hidden_size..(k + 1) * shape.hidden_size];
            let sum: f32 = row.iter().zip(hidden).map(|(w, h)| w * h).sum();
            sum + params.output_biases[k]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::NetworkShape;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn uniform_weights_give_known_hidden_activations() {
        let params = Parameters::uniform(NetworkShape::new(4, 4, 9), 0.1, 0.0);
        let (hidden, q) = forward_pass_with_intermediate(&params, &[0.5, 0.5, 0.5, 0.5]);

        let expected = sigmoid(4.0 * 0.5 * 0.1);
        assert_eq!(expected, sigmoid(0.2));
        assert_eq!(hidden, vec![expected; 4]);

        // linear output: four identical hidden units times 0.1
        let expected_q = 4.0 * expected * 0.1;
        for v in q {
            assert!((v - expected_q).abs() < 1e-6);
        }
    }

    #[test]
    fn forward_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(99);
        let params = Parameters::random(NetworkShape::new(6, 10, 9), &mut rng, 1.0);
        let input = [0.3, -1.2, 0.0, 4.5, 0.01, -0.7];
        let a = forward_pass(&params, &input);
        let b = forward_pass(&params, &input);
        assert_eq!(a, b);
        assert_eq!(a.len(), 9);

        let (_, c) = forward_pass_with_intermediate(&params, &input);
        assert_eq!(a, c);
    }

    #[test]
    fn output_has_no_activation() {
        let mut params = Parameters::uniform(NetworkShape::new(2, 3, 9), 0.0, 0.0);
        params.output_biases[4] = -7.5;
        let q = forward_pass(&params, &[1.0, 1.0]);
        assert_eq!(q[4], -7.5);
        assert_eq!(q[0], 0.0);
    }
}
