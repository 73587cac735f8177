use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::layers::LayerGrads;
use crate::math::tensor::{xavier_weights, Tensor};

const KERNEL: usize = 2;

/// Learned 2× up-sampling: transposed convolution with a 2×2 kernel and
/// stride 2. Each output cell receives exactly one kernel tap, so the
/// kernels never overlap.
///
/// Weights are laid out as `[in_channels][out_channels][2][2]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvTranspose2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
    #[serde(skip)]
    input: Tensor,
}

impl ConvTranspose2d {
    pub fn new<R: Rng + ?Sized>(in_channels: usize, out_channels: usize, rng: &mut R) -> ConvTranspose2d {
        let len = in_channels * out_channels * KERNEL * KERNEL;
        ConvTranspose2d {
            in_channels,
            out_channels,
            weights: xavier_weights(len, in_channels, rng),
            biases: vec![0.0; out_channels],
            input: Tensor::default(),
        }
    }

    #[inline]
    fn weight_index(&self, i: usize, o: usize, ky: usize, kx: usize) -> usize {
        ((i * self.out_channels + o) * KERNEL + ky) * KERNEL + kx
    }

    pub fn forward(&mut self, input: &Tensor) -> Tensor {
        assert_eq!(
            input.channels, self.in_channels,
            "ConvTranspose2d expected {} input channels, got {}",
            self.in_channels, input.channels
        );
        let (h, w) = (input.height, input.width);
        let mut out = Tensor::zeros(self.out_channels, h * KERNEL, w * KERNEL);

        for o in 0..self.out_channels {
            for y in 0..h {
                for x in 0..w {
                    for ky in 0..KERNEL {
                        for kx in 0..KERNEL {
                            let mut sum = self.biases[o];
                            for i in 0..self.in_channels {
                                sum += self.weights[self.weight_index(i, o, ky, kx)] * input.get(i, y, x);
                            }
                            out.set(o, KERNEL * y + ky, KERNEL * x + kx, sum);
                        }
                    }
                }
            }
        }

        self.input = input.clone();
        out
    }

    pub fn backward(&self, grad_output: &Tensor) -> (Tensor, LayerGrads) {
        let input = &self.input;
        let (h, w) = (input.height, input.width);
        let mut grad_input = Tensor::zeros(self.in_channels, h, w);
        let mut weights_grad = vec![0.0; self.weights.len()];
        let mut biases_grad = vec![0.0; self.out_channels];

        for o in 0..self.out_channels {
            for y in 0..h {
                for x in 0..w {
                    for ky in 0..KERNEL {
                        for kx in 0..KERNEL {
                            let g = grad_output.get(o, KERNEL * y + ky, KERNEL * x + kx);
                            biases_grad[o] += g;
                            for i in 0..self.in_channels {
                                let wi = self.weight_index(i, o, ky, kx);
                                weights_grad[wi] += g * input.get(i, y, x);
                                let gi = grad_input.offset(i, y, x);
                                grad_input.data[gi] += self.weights[wi] * g;
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

    #[test]
    fn doubles_spatial_size() {
        let mut up = ConvTranspose2d::new(3, 2, &mut StdRng::seed_from_u64(1));
        let out = up.forward(&Tensor::zeros(3, 4, 5));
        assert_eq!(out.shape(), (2, 8, 10));
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut up = ConvTranspose2d::new(2, 2, &mut StdRng::seed_from_u64(11));
        up.biases = vec![0.3, -0.1];
        let input = Tensor::from_data(2, 2, 2, vec![0.5, -1.0, 0.25, 2.0, -0.3, 0.8, 1.1, -0.6]);
        let loss = |layer: &mut ConvTranspose2d, x: &Tensor| {
            layer.forward(x).data.iter().map(|v| v * v).sum::<f64>() * 0.5
        };

        let out = up.forward(&input);
        let (grad_input, grads) = up.backward(&out);

        let h = 1e-6;
        for wi in 0..up.weights.len() {
            let mut plus = up.clone();
            plus.weights[wi] += h;
            let mut minus = up.clone();
            minus.weights[wi] -= h;
            let numeric = (loss(&mut plus, &input) - loss(&mut minus, &input)) / (2.0 * h);
            assert!((numeric - grads.weights[wi]).abs() < 1e-5, "weight {wi}");
        }
        for xi in 0..input.len() {
            let mut plus = input.clone();
            plus.data[xi] += h;
            let mut minus = input.clone();
            minus.data[xi] -= h;
            let mut probe = up.clone();
            let numeric = (loss(&mut probe, &plus) - loss(&mut probe, &minus)) / (2.0 * h);
            assert!((numeric - grad_input.data[xi]).abs() < 1e-5, "input {xi}");
        }
    }
}
