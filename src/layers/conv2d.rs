use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::layers::LayerGrads;
use crate::math::tensor::{he_weights, xavier_weights, Tensor};

/// 2-D convolution with stride 1 and "same" zero padding.
///
/// Weights are laid out as `[out_channels][in_channels][k][k]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
    pub activator: ActivationFunction,
    #[serde(skip)]
    input: Tensor,
    #[serde(skip)]
    pre_activation: Tensor, // z = W*x + b, needed for the activation derivative
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Conv2d {
        assert!(kernel_size % 2 == 1, "same padding needs an odd kernel size");
        let len = out_channels * in_channels * kernel_size * kernel_size;
        let fan_in = in_channels * kernel_size * kernel_size;
        let weights = if activation.prefers_he_init() {
            he_weights(len, fan_in, rng)
        } else {
            xavier_weights(len, fan_in, rng)
        };

        Conv2d {
            in_channels,
            out_channels,
            kernel_size,
            weights,
            biases: vec![0.0; out_channels],
            activator: activation,
            input: Tensor::default(),
            pre_activation: Tensor::default(),
        }
    }

    #[inline]
    fn weight_index(&self, o: usize, i: usize, ky: usize, kx: usize) -> usize {
        ((o * self.in_channels + i) * self.kernel_size + ky) * self.kernel_size + kx
    }

    /// Forward pass; caches the input and pre-activation for `backward`.
    pub fn forward(&mut self, input: &Tensor) -> Tensor {
        assert_eq!(
            input.channels, self.in_channels,
            "Conv2d expected {} input channels, got {}",
            self.in_channels, input.channels
        );
        let (h, w) = (input.height, input.width);
        let k = self.kernel_size;
        let pad = (k / 2) as isize;
        let mut z = Tensor::zeros(self.out_channels, h, w);

        for o in 0..self.out_channels {
            for y in 0..h {
                for x in 0..w {
                    let mut sum = self.biases[o];
                    for i in 0..self.in_channels {
                        for ky in 0..k {
                            let iy = y as isize + ky as isize - pad;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            for kx in 0..k {
                                let ix = x as isize + kx as isize - pad;
                                if ix < 0 || ix >= w as isize {
                                    continue;
                                }
                                sum += self.weights[self.weight_index(o, i, ky, kx)]
                                    * input.get(i, iy as usize, ix as usize);
                            }
                        }
                    }
                    z.set(o, y, x, sum);
                }
            }
        }

        let a = z.map(|v| self.activator.function(v));
        self.input = input.clone();
        self.pre_activation = z;
        a
    }

    /// Backward pass. `grad_output` is ∂L/∂a for this layer's output.
    /// Returns ∂L/∂input together with the parameter gradients.
    pub fn backward(&self, grad_output: &Tensor) -> (Tensor, LayerGrads) {
        // δ = ∂L/∂a ⊙ σ'(z)
        let delta = grad_output.zip_map(&self.pre_activation, |g, z| g * self.activator.derivative(z));
        let input = &self.input;
        let (h, w) = (input.height, input.width);
        let k = self.kernel_size;
        let pad = (k / 2) as isize;

        let mut grad_input = Tensor::zeros(self.in_channels, h, w);
        let mut weights_grad = vec![0.0; self.weights.len()];
        let mut biases_grad = vec![0.0; self.out_channels];

        for o in 0..self.out_channels {
            for y in 0..h {
                for x in 0..w {
                    let d = delta.get(o, y, x);
                    if d == 0.0 {
                        continue;
                    }
                    biases_grad[o] += d;
                    for i in 0..self.in_channels {
                        for ky in 0..k {
                            let iy = y as isize + ky as isize - pad;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            for kx in 0..k {
                                let ix = x as isize + kx as isize - pad;
                                if ix < 0 || ix >= w as isize {
                                    continue;
                                }
                                let wi = self.weight_index(o, i, ky, kx);
                                let (iy, ix) = (iy as usize, ix as usize);
                                weights_grad[wi] += d * input.get(i, iy, ix);
                                let gi = grad_input.offset(i, iy, ix);
                                grad_input.data[gi] += self.weights[wi] * d;
                            }
                        }
                    }
                }
            }
        }

        (grad_input, LayerGrads { weights: weights_grad, biases: biases_grad })
    }

    pub(crate) fn push_params<'a>(&'a self, out: &mut Vec<&'a Vec<f64>>) {
        out.push(&self.weights);
        out.push(&self.biases);
    }

    pub(crate) fn push_params_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Vec<f64>>) {
        out.push(&mut self.weights);
        out.push(&mut self.biases);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sum_loss(layer: &mut Conv2d, input: &Tensor) -> f64 {
        layer.forward(input).data.iter().map(|v| v * v).sum::<f64>() * 0.5
    }

    #[test]
    fn identity_kernel_copies_input() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut conv = Conv2d::new(1, 1, 3, ActivationFunction::Identity, &mut rng);
        conv.weights = vec![0.0; 9];
        conv.weights[4] = 1.0;
        let input = Tensor::from_data(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(conv.forward(&input), input);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut conv = Conv2d::new(2, 3, 3, ActivationFunction::Tanh, &mut rng);
        conv.biases = vec![0.1, -0.2, 0.05];
        let input = Tensor::from_data(2, 3, 3, (0..18).map(|v| (v as f64 * 0.37).sin()).collect());

        // L = 0.5 * Σ a², so ∂L/∂a = a.
        let out = conv.forward(&input);
        let (grad_input, grads) = conv.backward(&out);

        let h = 1e-6;
        for wi in [0, 5, 17, 40, 53] {
            let mut plus = conv.clone();
            plus.weights[wi] += h;
            let mut minus = conv.clone();
            minus.weights[wi] -= h;
            let numeric = (sum_loss(&mut plus, &input) - sum_loss(&mut minus, &input)) / (2.0 * h);
            assert!((numeric - grads.weights[wi]).abs() < 1e-5, "weight {wi}");
        }
        for b in 0..3 {
            let mut plus = conv.clone();
            plus.biases[b] += h;
            let mut minus = conv.clone();
            minus.biases[b] -= h;
            let numeric = (sum_loss(&mut plus, &input) - sum_loss(&mut minus, &input)) / (2.0 * h);
            assert!((numeric - grads.biases[b]).abs() < 1e-5, "bias {b}");
        }
        for xi in [0, 4, 9, 13] {
            let mut plus = input.clone();
            plus.data[xi] += h;
            let mut minus = input.clone();
            minus.data[xi] -= h;
            let mut probe = conv.clone();
            let numeric = (sum_loss(&mut probe, &plus) - sum_loss(&mut probe, &minus)) / (2.0 * h);
            assert!((numeric - grad_input.data[xi]).abs() < 1e-5, "input {xi}");
        }
    }
}
