use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegError};
use crate::train::checkpoint::CheckpointMode;

/// Values logged at the end of one epoch, keyed like the history.
pub type EpochLogs = BTreeMap<String, f64>;

/// Record of training: one value per completed epoch for every logged key
/// (`loss`, `jaccard_index`, `dice_coef` and their `val_` twins).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// 1-based epoch numbers, parallel to every series in `history`.
    pub epoch: Vec<usize>,
    pub history: BTreeMap<String, Vec<f64>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, epoch: usize, logs: &EpochLogs) {
        self.epoch.push(epoch);
        for (key, value) in logs {
            self.history.entry(key.clone()).or_default().push(*value);
        }
    }

    pub fn len(&self) -> usize {
        self.epoch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epoch.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.history.keys().map(|k| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.history.get(key).map(|v| v.as_slice())
    }

    pub fn last(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.last().copied())
    }

    /// Best `(epoch, value)` of `key` under `mode`; `Auto` resolves as the
    /// checkpoint does. Non-finite values are skipped.
    pub fn best(&self, key: &str, mode: CheckpointMode) -> Option<(usize, f64)> {
        let maximize = mode.resolve(key) == CheckpointMode::Max;
        self.get(key)?
            .iter()
            .zip(self.epoch.iter())
            .filter(|(v, _)| v.is_finite())
            .fold(None, |best: Option<(usize, f64)>, (&v, &e)| match best {
                Some((_, b)) if (maximize && v <= b) || (!maximize && v >= b) => best,
                _ => Some((e, v)),
            })
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(|e| SegError::io(path, e))?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<History> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| SegError::io(path, e))?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logs(pairs: &[(&str, f64)]) -> EpochLogs {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn records_series_per_key() {
        let mut h = History::new();
        h.record(1, &logs(&[("loss", 0.9), ("val_jaccard_index", 0.2)]));
        h.record(2, &logs(&[("loss", 0.7), ("val_jaccard_index", 0.4)]));
        h.record(3, &logs(&[("loss", 0.8), ("val_jaccard_index", 0.3)]));
        assert_eq!(h.len(), 3);
        assert_eq!(h.get("loss"), Some(&[0.9, 0.7, 0.8][..]));
        assert_eq!(h.last("val_jaccard_index"), Some(0.3));
        assert_eq!(h.best("val_jaccard_index", CheckpointMode::Max), Some((2, 0.4)));
        assert_eq!(h.best("loss", CheckpointMode::Auto), Some((2, 0.7)));
        assert_eq!(h.best("missing", CheckpointMode::Max), None);
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut h = History::new();
        h.record(1, &logs(&[("loss", 0.5), ("dice_coef", 0.6)]));
        h.save_json(&path).unwrap();
        assert_eq!(History::load_json(&path).unwrap(), h);
    }
}
