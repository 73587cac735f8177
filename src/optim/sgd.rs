use crate::network::gradients::Gradients;
use crate::optim::optimizer::Optimizer;

/// Plain gradient descent: p ← p - lr·g
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: Vec<&mut Vec<f64>>, grads: &Gradients) {
        assert_eq!(params.len(), grads.params.len(), "parameter/gradient count mismatch");
        for (param, grad) in params.into_iter().zip(grads.params.iter()) {
            for (p, g) in param.iter_mut().zip(grad.iter()) {
                *p -= self.learning_rate * g;
            }
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn name(&self) -> &'static str {
        "sgd"
    }
}
