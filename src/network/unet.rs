use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, SegError};
use crate::layers::{Conv2d, ConvTranspose2d, LayerGrads, MaxPool2d};
use crate::math::tensor::Tensor;
use crate::network::gradients::Gradients;
use crate::network::metadata::{ModelMetadata, SavedModel, SavedModelRef};
use crate::network::spec::UNetConfig;

/// Two 3×3 convolutions back to back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvBlock {
    pub first: Conv2d,
    pub second: Conv2d,
}

impl ConvBlock {
    fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> ConvBlock {
        ConvBlock {
            first: Conv2d::new(in_channels, out_channels, 3, activation, rng),
            second: Conv2d::new(out_channels, out_channels, 3, activation, rng),
        }
    }

    pub fn out_channels(&self) -> usize {
        self.second.out_channels
    }

    fn forward(&mut self, input: &Tensor) -> Tensor {
        let x = self.first.forward(input);
        self.second.forward(&x)
    }

    fn backward(&self, grad_output: &Tensor) -> (Tensor, [LayerGrads; 2]) {
        let (g, second) = self.second.backward(grad_output);
        let (g, first) = self.first.backward(&g);
        (g, [first, second])
    }

    fn push_params<'a>(&'a self, out: &mut Vec<&'a Vec<f64>>) {
        self.first.push_params(out);
        self.second.push_params(out);
    }

    fn push_params_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Vec<f64>>) {
        self.first.push_params_mut(out);
        self.second.push_params_mut(out);
    }
}

/// Up-sampling followed by a conv block over `[skip, upsampled]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderBlock {
    pub up: ConvTranspose2d,
    pub block: ConvBlock,
}

/// U-Net: a contracting path of conv blocks and max pools, a bottleneck,
/// and an expanding path that concatenates the matching encoder features
/// before each conv block. A 1×1 sigmoid convolution produces the mask.
///
/// `decoders[0]` is the deepest decoder and pairs with `encoders[depth - 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UNet {
    pub config: UNetConfig,
    pub encoders: Vec<ConvBlock>,
    pub pools: Vec<MaxPool2d>,
    pub bottleneck: ConvBlock,
    pub decoders: Vec<DecoderBlock>,
    pub head: Conv2d,
}

impl UNet {
    /// Builds a freshly initialised network from a config that already
    /// passed `UNetConfig::validate()`.
    pub(crate) fn new<R: Rng + ?Sized>(config: UNetConfig, rng: &mut R) -> UNet {
        let (_, _, in_channels) = config
            .input_size
            .expect("validated config has an input size");
        let act = config.activation;
        let depth = config.depth;

        let mut encoders = Vec::with_capacity(depth);
        let mut channels = in_channels;
        for level in 0..depth {
            let filters = config.filters_at(level);
            encoders.push(ConvBlock::new(channels, filters, act, rng));
            channels = filters;
        }
        let pools = (0..depth).map(|_| MaxPool2d::new()).collect();

        let bottleneck_filters = config.filters_at(depth);
        let bottleneck = ConvBlock::new(channels, bottleneck_filters, act, rng);
        channels = bottleneck_filters;

        let mut decoders = Vec::with_capacity(depth);
        for level in (0..depth).rev() {
            let filters = config.filters_at(level);
            let up = ConvTranspose2d::new(channels, filters, rng);
            let block = ConvBlock::new(2 * filters, filters, act, rng);
            decoders.push(DecoderBlock { up, block });
            channels = filters;
        }

        let head = Conv2d::new(channels, config.out_channels, 1, ActivationFunction::Sigmoid, rng);

        UNet { config, encoders, pools, bottleneck, decoders, head }
    }

    pub fn depth(&self) -> usize {
        self.encoders.len()
    }

    /// Forward pass; every layer caches what its backward pass needs.
    pub fn forward(&mut self, input: &Tensor) -> Tensor {
        let mut skips = Vec::with_capacity(self.depth());
        let mut x = input.clone();
        for (block, pool) in self.encoders.iter_mut().zip(self.pools.iter_mut()) {
            let features = block.forward(&x);
            x = pool.forward(&features);
            skips.push(features);
        }

        x = self.bottleneck.forward(&x);

        for (decoder, skip) in self.decoders.iter_mut().zip(skips.iter().rev()) {
            let up = decoder.up.forward(&x);
            let merged = Tensor::concat_channels(skip, &up);
            x = decoder.block.forward(&merged);
        }

        self.head.forward(&x)
    }

    /// Inference alias for `forward`.
    pub fn predict(&mut self, input: &Tensor) -> Tensor {
        self.forward(input)
    }

    /// Backward pass for the most recent `forward` call.
    ///
    /// `grad_output` is ∂L/∂output. The returned buffers follow the order
    /// of `parameters()`.
    pub fn backward(&self, grad_output: &Tensor) -> Gradients {
        let depth = self.depth();
        let (mut grad, head_grads) = self.head.backward(grad_output);

        // Indexed by encoder level.
        let mut skip_grads: Vec<Tensor> = vec![Tensor::default(); depth];
        let mut decoder_grads = Vec::with_capacity(depth);
        for (j, decoder) in self.decoders.iter().enumerate().rev() {
            let level = depth - 1 - j;
            let (g_merged, block_grads) = decoder.block.backward(&grad);
            let (g_skip, g_up) = g_merged.split_channels(self.encoders[level].out_channels());
            skip_grads[level] = g_skip;
            let (g_x, up_grads) = decoder.up.backward(&g_up);
            grad = g_x;
            decoder_grads.push((up_grads, block_grads));
        }
        decoder_grads.reverse();

        let (g, bottleneck_grads) = self.bottleneck.backward(&grad);
        grad = g;

        let mut encoder_grads = Vec::with_capacity(depth);
        for level in (0..depth).rev() {
            let g_features = self.pools[level].backward(&grad) + std::mem::take(&mut skip_grads[level]);
            let (g_in, block_grads) = self.encoders[level].backward(&g_features);
            grad = g_in;
            encoder_grads.push(block_grads);
        }
        encoder_grads.reverse();

        let mut params = Vec::new();
        let mut push = |g: LayerGrads| {
            params.push(g.weights);
            params.push(g.biases);
        };
        for block in encoder_grads {
            block.into_iter().for_each(&mut push);
        }
        bottleneck_grads.into_iter().for_each(&mut push);
        for (up, block) in decoder_grads {
            push(up);
            block.into_iter().for_each(&mut push);
        }
        push(head_grads);

        Gradients { params }
    }

    /// Parameter buffers in a fixed order: encoders, bottleneck, decoders
    /// (up-conv then block), head. Weights precede biases in every layer.
    pub fn parameters(&self) -> Vec<&Vec<f64>> {
        let mut out = Vec::new();
        for block in &self.encoders {
            block.push_params(&mut out);
        }
        self.bottleneck.push_params(&mut out);
        for decoder in &self.decoders {
            decoder.up.push_params(&mut out);
            decoder.block.push_params(&mut out);
        }
        self.head.push_params(&mut out);
        out
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f64>> {
        let mut out = Vec::new();
        for block in &mut self.encoders {
            block.push_params_mut(&mut out);
        }
        self.bottleneck.push_params_mut(&mut out);
        for decoder in &mut self.decoders {
            decoder.up.push_params_mut(&mut out);
            decoder.block.push_params_mut(&mut out);
        }
        self.head.push_params_mut(&mut out);
        out
    }

    pub fn parameter_lengths(&self) -> Vec<usize> {
        self.parameters().iter().map(|p| p.len()).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_lengths().iter().sum()
    }

    /// Zeroed gradient buffers shaped like this network's parameters.
    pub fn zero_gradients(&self) -> Gradients {
        Gradients::zeros(&self.parameter_lengths())
    }

    /// Writes the network and `metadata` as pretty-printed JSON.
    ///
    /// The file is written next to `path` with a `.tmp` suffix and renamed
    /// over it, so an existing checkpoint survives a failed write.
    pub fn save_json(&self, path: impl AsRef<Path>, metadata: &ModelMetadata) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SegError::io(parent, e))?;
        }
        let tmp = temp_path(path);
        let file = std::fs::File::create(&tmp).map_err(|e| SegError::io(&tmp, e))?;
        let mut writer = std::io::BufWriter::new(file);
        let written = serde_json::to_writer_pretty(&mut writer, &SavedModelRef { metadata, model: self })
            .map_err(SegError::from)
            .and_then(|_| writer.flush().map_err(|e| SegError::io(&tmp, e)));
        drop(writer);
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        std::fs::rename(&tmp, path).map_err(|e| SegError::io(path, e))?;
        Ok(())
    }

    /// Reads a checkpoint previously written by `save_json`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<SavedModel> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| SegError::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        let saved: SavedModel = serde_json::from_reader(reader)?;
        if saved.model.pools.len() != saved.model.encoders.len()
            || saved.model.decoders.len() != saved.model.encoders.len()
        {
            return Err(SegError::Shape(format!(
                "checkpoint {} has inconsistent encoder/decoder counts",
                path.display()
            )));
        }
        Ok(saved)
    }
}

/// Sibling of `path` with `.tmp` appended to the file name.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_net(depth: usize) -> UNet {
        UNetConfig {
            input_size: Some((4, 4, 2)),
            out_channels: 1,
            depth,
            base_filters: 2,
            activation: ActivationFunction::Tanh,
            init_seed: Some(5),
        }
        .collect()
        .unwrap()
    }

    fn sample_input() -> Tensor {
        Tensor::from_data(2, 4, 4, (0..32).map(|v| ((v * 7 % 13) as f64 / 13.0) - 0.4).collect())
    }

    fn half_square(net: &mut UNet, input: &Tensor) -> f64 {
        net.forward(input).data.iter().map(|v| v * v).sum::<f64>() * 0.5
    }

    #[test]
    fn output_matches_input_resolution() {
        let mut net = tiny_net(2);
        let out = net.forward(&sample_input());
        assert_eq!(out.shape(), (1, 4, 4));
        assert!(out.data.iter().all(|&p| p > 0.0 && p < 1.0));
    }

    #[test]
    fn gradient_layout_matches_parameters() {
        let mut net = tiny_net(2);
        let out = net.forward(&sample_input());
        let grads = net.backward(&out);
        assert_eq!(
            grads.params.iter().map(|g| g.len()).collect::<Vec<_>>(),
            net.parameter_lengths()
        );
        // 2 encoders + bottleneck = 6 convs, 2 decoders = 2 up + 4 convs, 1 head.
        assert_eq!(grads.params.len(), 2 * (6 + 2 + 4 + 1));
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut net = tiny_net(1);
        let input = sample_input();
        let out = net.forward(&input);
        let grads = net.backward(&out);

        let h = 1e-6;
        let mut rng = StdRng::seed_from_u64(9);
        for p in 0..grads.params.len() {
            let len = grads.params[p].len();
            for _ in 0..2 {
                let i = rng.gen_range(0..len);
                let mut plus = net.clone();
                plus.parameters_mut()[p][i] += h;
                let mut minus = net.clone();
                minus.parameters_mut()[p][i] -= h;
                let numeric = (half_square(&mut plus, &input) - half_square(&mut minus, &input)) / (2.0 * h);
                let analytic = grads.params[p][i];
                assert!(
                    (numeric - analytic).abs() < 1e-5 * (1.0 + numeric.abs()),
                    "param {p}[{i}]: numeric {numeric} vs analytic {analytic}"
                );
            }
        }
    }

    #[test]
    fn checkpoint_round_trip_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("unet.json");
        let mut net = tiny_net(2);
        let input = sample_input();
        let before = net.predict(&input);

        let meta = ModelMetadata {
            epoch: Some(3),
            monitor: Some("val_jaccard_index".into()),
            monitor_value: Some(0.5),
            ..ModelMetadata::default()
        };
        net.save_json(&path, &meta).unwrap();
        let mut saved = UNet::load_json(&path).unwrap();
        assert_eq!(saved.metadata, meta);
        let after = saved.model.predict(&input);
        for (a, b) in before.data.iter().zip(after.data.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn failed_save_keeps_the_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unet.json");
        let net = tiny_net(1);
        let first = ModelMetadata { epoch: Some(1), ..ModelMetadata::default() };
        net.save_json(&path, &first).unwrap();

        let second = ModelMetadata { epoch: Some(2), ..ModelMetadata::default() };
        net.save_json(&path, &second).unwrap();
        assert_eq!(UNet::load_json(&path).unwrap().metadata, second);
        assert!(!temp_path(&path).exists());

        // A directory in the way of the temporary file makes the write fail.
        std::fs::create_dir(temp_path(&path)).unwrap();
        let third = ModelMetadata { epoch: Some(3), ..ModelMetadata::default() };
        assert!(net.save_json(&path, &third).is_err());
        assert_eq!(UNet::load_json(&path).unwrap().metadata, second);
    }
}
