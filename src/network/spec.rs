use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, SegError};
use crate::network::unet::UNet;

/// Serializable description of a U-Net architecture.
///
/// `input_size` is `(height, width, channels)`. It is usually left unset and
/// filled in by the trainer from the first training batch, after which
/// `collect()` builds the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UNetConfig {
    #[serde(default)]
    pub input_size: Option<(usize, usize, usize)>,
    /// Channels of the sigmoid output map (1 for binary masks).
    pub out_channels: usize,
    /// Number of down-sampling stages.
    pub depth: usize,
    /// Filters at the first level; doubled at every stage down.
    pub base_filters: usize,
    /// Activation used inside every conv block.
    pub activation: ActivationFunction,
    /// Seed for weight initialization; `None` draws from entropy.
    #[serde(default)]
    pub init_seed: Option<u64>,
}

impl Default for UNetConfig {
    fn default() -> Self {
        UNetConfig {
            input_size: None,
            out_channels: 1,
            depth: 4,
            base_filters: 16,
            activation: ActivationFunction::ReLU,
            init_seed: None,
        }
    }
}

impl UNetConfig {
    /// Filters produced by the conv block at `level` (0 = full resolution).
    pub fn filters_at(&self, level: usize) -> usize {
        self.base_filters << level
    }

    /// Height and width must be divisible by this for the skips to line up.
    pub fn spatial_multiple(&self) -> usize {
        1 << self.depth
    }

    pub fn validate(&self) -> Result<()> {
        let (h, w, c) = self
            .input_size
            .ok_or_else(|| SegError::Config("UNetConfig.input_size must be set before collect()".into()))?;
        if h == 0 || w == 0 || c == 0 {
            return Err(SegError::Config(format!("input size ({h}, {w}, {c}) has a zero dimension")));
        }
        if self.out_channels == 0 || self.base_filters == 0 {
            return Err(SegError::Config("out_channels and base_filters must be at least 1".into()));
        }
        if self.depth > 8 {
            return Err(SegError::Config(format!("depth {} is too deep", self.depth)));
        }
        let m = self.spatial_multiple();
        if h % m != 0 || w % m != 0 {
            return Err(SegError::Config(format!(
                "input {h}x{w} is not divisible by 2^depth = {m}"
            )));
        }
        Ok(())
    }

    /// Builds the network described by this config.
    pub fn collect(&self) -> Result<UNet> {
        self.validate()?;
        let mut rng = match self.init_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(UNet::new(self.clone(), &mut rng))
    }

    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| SegError::io(path, e))?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: &str) -> Result<UNetConfig> {
        let file = std::fs::File::open(path).map_err(|e| SegError::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_requires_input_size() {
        let cfg = UNetConfig::default();
        assert!(matches!(cfg.collect(), Err(SegError::Config(_))));
    }

    #[test]
    fn collect_rejects_indivisible_sizes() {
        let cfg = UNetConfig {
            input_size: Some((12, 16, 3)),
            depth: 3,
            ..UNetConfig::default()
        };
        assert!(cfg.collect().is_err());
    }

    #[test]
    fn filters_double_per_level() {
        let cfg = UNetConfig { base_filters: 4, ..UNetConfig::default() };
        assert_eq!(
            (0..4).map(|l| cfg.filters_at(l)).collect::<Vec<_>>(),
            vec![4, 8, 16, 32]
        );
    }

    #[test]
    fn json_round_trip_keeps_activation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unet_config.json");
        let path = path.to_str().unwrap();
        let cfg = UNetConfig {
            activation: ActivationFunction::LeakyReLU { alpha: 0.2 },
            input_size: Some((32, 32, 3)),
            ..UNetConfig::default()
        };
        cfg.save_json(path).unwrap();
        assert_eq!(UNetConfig::load_json(path).unwrap(), cfg);
    }
}
