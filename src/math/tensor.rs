use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::{Add, Sub};

/// Dense 3-D tensor stored channel-major (C, H, W) in a flat buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(channels: usize, height: usize, width: usize) -> Tensor {
        Tensor {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    pub fn from_data(channels: usize, height: usize, width: usize, data: Vec<f64>) -> Tensor {
        assert_eq!(
            data.len(),
            channels * height * width,
            "Tensor data length does not match shape ({}, {}, {})",
            channels,
            height,
            width
        );
        Tensor { channels, height, width, data }
    }

    /// Shape as (channels, height, width).
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn offset(&self, c: usize, y: usize, x: usize) -> usize {
        (c * self.height + y) * self.width + x
    }

    #[inline]
    pub fn get(&self, c: usize, y: usize, x: usize) -> f64 {
        self.data[self.offset(c, y, x)]
    }

    #[inline]
    pub fn set(&mut self, c: usize, y: usize, x: usize, value: f64) {
        let i = self.offset(c, y, x);
        self.data[i] = value;
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            channels: self.channels,
            height: self.height,
            width: self.width,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Element-wise combination of two same-shape tensors.
    pub fn zip_map<F>(&self, other: &Tensor, functor: F) -> Tensor
    where
        F: Fn(f64, f64) -> f64,
    {
        assert_eq!(self.shape(), other.shape(), "Tensors are of incorrect sizes");
        Tensor {
            channels: self.channels,
            height: self.height,
            width: self.width,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| functor(a, b))
                .collect(),
        }
    }

    /// Stacks `b` after `a` along the channel axis.
    pub fn concat_channels(a: &Tensor, b: &Tensor) -> Tensor {
        assert_eq!(
            (a.height, a.width),
            (b.height, b.width),
            "Cannot concatenate tensors with different spatial sizes"
        );
        let mut data = Vec::with_capacity(a.len() + b.len());
        data.extend_from_slice(&a.data);
        data.extend_from_slice(&b.data);
        Tensor {
            channels: a.channels + b.channels,
            height: a.height,
            width: a.width,
            data,
        }
    }

    /// Inverse of `concat_channels`: the first `at` channels and the rest.
    pub fn split_channels(&self, at: usize) -> (Tensor, Tensor) {
        assert!(at <= self.channels, "split point beyond channel count");
        let plane = self.height * self.width;
        let (head, tail) = self.data.split_at(at * plane);
        (
            Tensor::from_data(at, self.height, self.width, head.to_vec()),
            Tensor::from_data(self.channels - at, self.height, self.width, tail.to_vec()),
        )
    }

    /// Mirrors every channel left to right.
    pub fn flip_horizontal(&self) -> Tensor {
        let mut res = Tensor::zeros(self.channels, self.height, self.width);
        for c in 0..self.channels {
            for y in 0..self.height {
                for x in 0..self.width {
                    res.set(c, y, self.width - 1 - x, self.get(c, y, x));
                }
            }
        }
        res
    }

    /// Mirrors every channel top to bottom.
    pub fn flip_vertical(&self) -> Tensor {
        let mut res = Tensor::zeros(self.channels, self.height, self.width);
        for c in 0..self.channels {
            for y in 0..self.height {
                for x in 0..self.width {
                    res.set(c, self.height - 1 - y, x, self.get(c, y, x));
                }
            }
        }
        res
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { channels: 0, height: 0, width: 0, data: vec![] }
    }
}

impl Add for Tensor {
    type Output = Tensor;

    fn add(self, rhs: Self) -> Self::Output {
        self.zip_map(&rhs, |a, b| a + b)
    }
}

impl Sub for Tensor {
    type Output = Tensor;

    fn sub(self, rhs: Self) -> Self::Output {
        self.zip_map(&rhs, |a, b| a - b)
    }
}

/// Samples a single value from N(0, 1) using the Box-Muller transform.
fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Both uniforms live in (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// He initialization: `len` samples from N(0, sqrt(2 / fan_in)).
///
/// Recommended before ReLU-family activations, which zero roughly half of
/// their inputs.
pub fn he_weights<R: Rng + ?Sized>(len: usize, fan_in: usize, rng: &mut R) -> Vec<f64> {
    let std_dev = (2.0 / fan_in.max(1) as f64).sqrt();
    (0..len).map(|_| sample_standard_normal(rng) * std_dev).collect()
}

/// Xavier (Glorot) initialization: `len` samples from N(0, sqrt(1 / fan_in)).
///
/// Recommended before Sigmoid/Tanh/Identity layers.
pub fn xavier_weights<R: Rng + ?Sized>(len: usize, fan_in: usize, rng: &mut R) -> Vec<f64> {
    let std_dev = (1.0 / fan_in.max(1) as f64).sqrt();
    (0..len).map(|_| sample_standard_normal(rng) * std_dev).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn concat_then_split_restores_parts() {
        let a = Tensor::from_data(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = Tensor::from_data(2, 2, 2, (0..8).map(|v| v as f64).collect());
        let merged = Tensor::concat_channels(&a, &b);
        assert_eq!(merged.shape(), (3, 2, 2));
        assert_eq!(merged.get(1, 0, 0), 0.0);
        let (left, right) = merged.split_channels(1);
        assert_eq!(left, a);
        assert_eq!(right, b);
    }

    #[test]
    fn flips_mirror_the_right_axis() {
        let t = Tensor::from_data(1, 2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.flip_horizontal().data, vec![3.0, 2.0, 1.0, 6.0, 5.0, 4.0]);
        assert_eq!(t.flip_vertical().data, vec![4.0, 5.0, 6.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn he_weights_are_seeded_and_scaled() {
        let a = he_weights(4000, 8, &mut StdRng::seed_from_u64(3));
        let b = he_weights(4000, 8, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
        let var = a.iter().map(|x| x * x).sum::<f64>() / a.len() as f64;
        assert!((var - 0.25).abs() < 0.05, "variance {var}");
    }

    #[test]
    #[should_panic]
    fn from_data_rejects_wrong_length() {
        Tensor::from_data(1, 2, 2, vec![0.0; 3]);
    }
}
