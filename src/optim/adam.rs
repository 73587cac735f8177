use crate::network::gradients::Gradients;
use crate::optim::optimizer::Optimizer;

/// Adam with bias correction folded into the step size:
///
///   m ← β1·m + (1-β1)·g
///   v ← β2·v + (1-β2)·g²
///   lr_t = lr · √(1-β2ᵗ) / (1-β1ᵗ)
///   p ← p - lr_t · m / (√v + ε)
///
/// Moment buffers are allocated on the first step.
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: u64,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Adam {
        Adam { learning_rate, beta1, beta2, epsilon, t: 0, m: Vec::new(), v: Vec::new() }
    }

    /// Number of updates applied so far.
    pub fn iterations(&self) -> u64 {
        self.t
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: Vec<&mut Vec<f64>>, grads: &Gradients) {
        assert_eq!(params.len(), grads.params.len(), "parameter/gradient count mismatch");
        if self.m.len() != grads.params.len() {
            self.m = grads.params.iter().map(|g| vec![0.0; g.len()]).collect();
            self.v = self.m.clone();
        }

        self.t += 1;
        let t = self.t as i32;
        let lr_t = self.learning_rate * (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t));

        for (slot, (param, grad)) in params.into_iter().zip(grads.params.iter()).enumerate() {
            let m = &mut self.m[slot];
            let v = &mut self.v[slot];
            for i in 0..param.len() {
                let g = grad[i];
                m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g;
                v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g * g;
                param[i] -= lr_t * m[i] / (v[i].sqrt() + self.epsilon);
            }
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn name(&self) -> &'static str {
        "adam"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::optimizer::OptimizerKind;

    #[test]
    fn first_step_moves_by_learning_rate() {
        // With bias correction the first update is ≈ lr · sign(g).
        let mut w = vec![0.0, 0.0];
        let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-7);
        adam.step(vec![&mut w], &Gradients { params: vec![vec![3.0, -0.2]] });
        assert!((w[0] + 0.01).abs() < 1e-6);
        assert!((w[1] - 0.01).abs() < 1e-6);
        assert_eq!(adam.iterations(), 1);
    }

    #[test]
    fn minimises_a_quadratic() {
        let mut w = vec![5.0];
        let mut opt = OptimizerKind::default().with_learning_rate(0.1).build();
        for _ in 0..500 {
            let g = Gradients { params: vec![vec![2.0 * (w[0] - 1.5)]] };
            opt.step(vec![&mut w], &g);
        }
        assert!((w[0] - 1.5).abs() < 1e-2, "ended at {}", w[0]);
        assert_eq!(opt.name(), "adam");
    }
}
