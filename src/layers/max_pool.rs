use serde::{Deserialize, Serialize};

use crate::math::tensor::Tensor;

/// 2×2 max pooling with stride 2. Input height and width must be even.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaxPool2d {
    #[serde(skip)]
    input_shape: (usize, usize, usize),
    #[serde(skip)]
    argmax: Vec<usize>, // flat input offset of the winner for every output cell
}

impl MaxPool2d {
    pub fn new() -> MaxPool2d {
        MaxPool2d::default()
    }

    pub fn forward(&mut self, input: &Tensor) -> Tensor {
        assert!(
            input.height % 2 == 0 && input.width % 2 == 0,
            "MaxPool2d needs even spatial dims, got {}x{}",
            input.height,
            input.width
        );
        let (oh, ow) = (input.height / 2, input.width / 2);
        let mut out = Tensor::zeros(input.channels, oh, ow);
        let mut argmax = Vec::with_capacity(out.len());

        for c in 0..input.channels {
            for y in 0..oh {
                for x in 0..ow {
                    let mut best = input.offset(c, 2 * y, 2 * x);
                    for (dy, dx) in [(0, 1), (1, 0), (1, 1)] {
                        let candidate = input.offset(c, 2 * y + dy, 2 * x + dx);
                        if input.data[candidate] > input.data[best] {
                            best = candidate;
                        }
                    }
                    out.set(c, y, x, input.data[best]);
                    argmax.push(best);
                }
            }
        }

        self.input_shape = input.shape();
        self.argmax = argmax;
        out
    }

    /// Routes each output gradient back to the input cell that won the max.
    pub fn backward(&self, grad_output: &Tensor) -> Tensor {
        let (c, h, w) = self.input_shape;
        let mut grad_input = Tensor::zeros(c, h, w);
        for (g, &src) in grad_output.data.iter().zip(self.argmax.iter()) {
            grad_input.data[src] += g;
        }
        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_window_maximum_and_routes_gradient() {
        let input = Tensor::from_data(
            1,
            2,
            4,
            vec![1.0, 5.0, 2.0, 0.0, 3.0, 4.0, 9.0, 8.0],
        );
        let mut pool = MaxPool2d::new();
        let out = pool.forward(&input);
        assert_eq!(out.shape(), (1, 1, 2));
        assert_eq!(out.data, vec![5.0, 9.0]);

        let grad = pool.backward(&Tensor::from_data(1, 1, 2, vec![1.0, 2.0]));
        assert_eq!(grad.data, vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0]);
    }
}
