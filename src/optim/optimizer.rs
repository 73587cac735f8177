use serde::{Deserialize, Serialize};

use crate::network::gradients::Gradients;
use crate::optim::adam::Adam;
use crate::optim::sgd::Sgd;

/// Updates parameter buffers in place from averaged gradients.
///
/// `params` and `grads.params` share one order (see `UNet::parameters_mut`).
pub trait Optimizer {
    fn step(&mut self, params: Vec<&mut Vec<f64>>, grads: &Gradients);

    fn learning_rate(&self) -> f64;

    fn name(&self) -> &'static str;
}

/// Serializable optimizer choice; `build()` turns it into a live optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd {
        learning_rate: f64,
    },
    Adam {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
    },
}

impl Default for OptimizerKind {
    /// Adam with the usual defaults (lr 1e-3, β1 0.9, β2 0.999, ε 1e-7).
    fn default() -> Self {
        OptimizerKind::Adam {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

impl OptimizerKind {
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerKind::Sgd { learning_rate } => Box::new(Sgd::new(learning_rate)),
            OptimizerKind::Adam { learning_rate, beta1, beta2, epsilon } => {
                Box::new(Adam::new(learning_rate, beta1, beta2, epsilon))
            }
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match *self {
            OptimizerKind::Sgd { learning_rate } | OptimizerKind::Adam { learning_rate, .. } => learning_rate,
        }
    }

    /// Short lowercase name, as written in config files.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Sgd { .. } => "sgd",
            OptimizerKind::Adam { .. } => "adam",
        }
    }

    /// Same optimizer family with a different learning rate.
    pub fn with_learning_rate(&self, lr: f64) -> OptimizerKind {
        let mut kind = self.clone();
        match &mut kind {
            OptimizerKind::Sgd { learning_rate } | OptimizerKind::Adam { learning_rate, .. } => *learning_rate = lr,
        }
        kind
    }
}
