/// Gradients for every parameter buffer of a network, in the same order as
/// `UNet::parameters()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub params: Vec<Vec<f64>>,
}

impl Gradients {
    /// Zeroed buffers matching the given parameter lengths.
    pub fn zeros(lengths: &[usize]) -> Gradients {
        Gradients {
            params: lengths.iter().map(|&n| vec![0.0; n]).collect(),
        }
    }

    /// Adds `other` element-wise; used to sum per-sample gradients in a batch.
    pub fn accumulate(&mut self, other: &Gradients) {
        assert_eq!(self.params.len(), other.params.len(), "Gradient sets differ in length");
        for (acc, g) in self.params.iter_mut().zip(other.params.iter()) {
            assert_eq!(acc.len(), g.len(), "Gradient buffers differ in length");
            for (a, b) in acc.iter_mut().zip(g.iter()) {
                *a += b;
            }
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for buf in &mut self.params {
            for v in buf.iter_mut() {
                *v *= factor;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_then_scale_averages() {
        let mut acc = Gradients::zeros(&[2, 1]);
        acc.accumulate(&Gradients { params: vec![vec![1.0, 2.0], vec![4.0]] });
        acc.accumulate(&Gradients { params: vec![vec![3.0, 0.0], vec![-2.0]] });
        acc.scale(0.5);
        assert_eq!(acc.params, vec![vec![2.0, 1.0], vec![1.0]]);
    }
}
