//! Cascade split schemes.
//!
//! Splits are fractions of the shadowed depth range `far`, strictly increasing,
//! with the last one always `1.0`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the camera depth range is divided between cascades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    Uniform,
    #[serde(alias = "log")]
    Logarithmic,
    /// Blend of uniform and logarithmic splits.
    #[default]
    Practical,
    /// Splits come from a user callback.
    Custom,
}

/// User split scheme: `(cascades, near, far) -> splits`.
pub type CustomSplitFn = Box<dyn Fn(usize, f32, f32) -> Vec<f32> + Send + Sync>;

/// `(near + (far - near) * i / n) / far` for `i` in `1..n`, then `1`.
pub fn uniform_splits(cascades: usize, near: f32, far: f32) -> Vec<f32> {
    (1..cascades)
        .map(|i| (near + (far - near) * i as f32 / cascades as f32) / far)
        .chain(std::iter::once(1.0))
        .collect()
}

/// `near * (far / near)^(i / n) / far` for `i` in `1..n`, then `1`.
pub fn logarithmic_splits(cascades: usize, near: f32, far: f32) -> Vec<f32> {
    (1..cascades)
        .map(|i| near * (far / near).powf(i as f32 / cascades as f32) / far)
        .chain(std::iter::once(1.0))
        .collect()
}

/// Uniform splits blended towards logarithmic ones by `lambda`.
pub fn practical_splits(cascades: usize, near: f32, far: f32, lambda: f32) -> Vec<f32> {
    let uniform = uniform_splits(cascades, near, far);
    let logarithmic = logarithmic_splits(cascades, near, far);
    let mut splits: Vec<f32> = uniform
        .iter()
        .zip(&logarithmic)
        .take(cascades.saturating_sub(1))
        .map(|(u, l)| u + (l - u) * lambda)
        .collect();
    splits.push(1.0);
    splits
}

/// Check that `splits` holds `cascades` strictly increasing fractions in
/// `(0, 1]` ending at `1`.
pub fn validate_splits(splits: &[f32], cascades: usize) -> Result<(), ConfigError> {
    if splits.len() != cascades {
        return Err(ConfigError::InvalidSplits(format!(
            "expected {cascades} splits, got {}",
            splits.len()
        )));
    }
    let mut previous = 0.0;
    for &split in splits {
        if !(split > previous && split <= 1.0) {
            return Err(ConfigError::InvalidSplits(format!(
                "{splits:?} is not strictly increasing in (0, 1]"
            )));
        }
        previous = split;
    }
    if splits.last() != Some(&1.0) {
        return Err(ConfigError::InvalidSplits(format!(
            "{splits:?} does not end at 1"
        )));
    }
    Ok(())
}

/// Computes cascade splits for a split mode.
pub struct CascadeSplitter {
    mode: SplitMode,
    lambda: f32,
    custom: Option<CustomSplitFn>,
}

impl fmt::Debug for CascadeSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CascadeSplitter")
            .field("mode", &self.mode)
            .field("lambda", &self.lambda)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl CascadeSplitter {
    /// Fails with [`ConfigError::MissingCustomSplit`] if `mode` is
    /// [`SplitMode::Custom`] and no callback is given.
    pub fn new(
        mode: SplitMode,
        lambda: f32,
        custom: Option<CustomSplitFn>,
    ) -> Result<Self, ConfigError> {
        if mode == SplitMode::Custom && custom.is_none() {
            return Err(ConfigError::MissingCustomSplit);
        }
        Ok(Self {
            mode,
            lambda,
            custom,
        })
    }

    pub fn mode(&self) -> SplitMode {
        self.mode
    }

    /// Switch to a built-in mode, or to `Custom` if a callback is already set.
    pub fn set_mode(&mut self, mode: SplitMode) -> Result<(), ConfigError> {
        if mode == SplitMode::Custom && self.custom.is_none() {
            return Err(ConfigError::MissingCustomSplit);
        }
        self.mode = mode;
        Ok(())
    }

    pub fn set_custom(&mut self, custom: CustomSplitFn) {
        self.custom = Some(custom);
        self.mode = SplitMode::Custom;
    }

    pub fn compute(&self, cascades: usize, near: f32, far: f32) -> Result<Vec<f32>, ConfigError> {
        if !(near > 0.0 && far > near && far.is_finite()) {
            return Err(ConfigError::InvalidDepthRange { near, far });
        }
        let splits = match (self.mode, &self.custom) {
            (SplitMode::Uniform, _) => uniform_splits(cascades, near, far),
            (SplitMode::Logarithmic, _) => logarithmic_splits(cascades, near, far),
            (SplitMode::Practical, _) => practical_splits(cascades, near, far, self.lambda),
            (SplitMode::Custom, Some(custom)) => {
                let splits = custom(cascades, near, far);
                if let Err(err) = validate_splits(&splits, cascades) {
                    tracing::warn!("Custom cascade splits rejected: {}", err);
                    return Err(err);
                }
                splits
            }
            (SplitMode::Custom, None) => return Err(ConfigError::MissingCustomSplit),
        };
        tracing::debug!("Cascade splits ({:?}): {:?}", self.mode, splits);
        Ok(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(splits: &[f32], cascades: usize) {
        assert!(validate_splits(splits, cascades).is_ok(), "{splits:?}");
    }

    #[test]
    fn test_uniform_three_cascades() {
        let splits = uniform_splits(3, 0.1, 100.0);
        let expected = [0.333, 0.667, 1.0];
        for (split, expected) in splits.iter().zip(expected) {
            assert!((split - expected).abs() < 2e-3, "{splits:?}");
        }
    }

    #[test]
    fn test_logarithmic_and_practical_three_cascades() {
        // far / near = 1000, so each cascade covers a factor of 10.
        let logarithmic = logarithmic_splits(3, 0.1, 100.0);
        for (split, expected) in logarithmic.iter().zip([0.01, 0.1, 1.0]) {
            assert!((split - expected).abs() < 1e-5, "{logarithmic:?}");
        }

        let practical = practical_splits(3, 0.1, 100.0, 0.5);
        for (split, expected) in practical.iter().zip([0.172, 0.3835, 1.0]) {
            assert!((split - expected).abs() < 1e-4, "{practical:?}");
        }
    }

    #[test]
    fn test_all_modes_strictly_increasing() {
        for cascades in 1..=8 {
            for (near, far) in [(0.1, 100.0), (1.0, 1000.0), (0.5, 2.0)] {
                assert_valid(&uniform_splits(cascades, near, far), cascades);
                assert_valid(&logarithmic_splits(cascades, near, far), cascades);
                assert_valid(&practical_splits(cascades, near, far, 0.5), cascades);
            }
        }
    }

    #[test]
    fn test_practical_endpoints() {
        for cascades in 1..=6 {
            let uniform = uniform_splits(cascades, 0.1, 500.0);
            let logarithmic = logarithmic_splits(cascades, 0.1, 500.0);
            let zero = practical_splits(cascades, 0.1, 500.0, 0.0);
            let one = practical_splits(cascades, 0.1, 500.0, 1.0);
            for i in 0..cascades {
                assert!((zero[i] - uniform[i]).abs() < 1e-6);
                assert!((one[i] - logarithmic[i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_single_cascade() {
        assert_eq!(uniform_splits(1, 0.1, 100.0), vec![1.0]);
        assert_eq!(practical_splits(1, 0.1, 100.0, 0.5), vec![1.0]);
    }

    #[test]
    fn test_custom_requires_callback() {
        assert!(matches!(
            CascadeSplitter::new(SplitMode::Custom, 0.5, None),
            Err(ConfigError::MissingCustomSplit)
        ));

        let mut splitter = CascadeSplitter::new(SplitMode::Uniform, 0.5, None).unwrap();
        assert_eq!(
            splitter.set_mode(SplitMode::Custom),
            Err(ConfigError::MissingCustomSplit)
        );
        assert_eq!(splitter.mode(), SplitMode::Uniform);
    }

    #[test]
    fn test_custom_output_validated() {
        let splitter = CascadeSplitter::new(
            SplitMode::Custom,
            0.5,
            Some(Box::new(|n: usize, _: f32, _: f32| {
                (1..=n).map(|i| i as f32 / n as f32).collect()
            })),
        )
        .unwrap();
        let splits = splitter.compute(4, 0.1, 100.0).unwrap();
        assert_eq!(splits, vec![0.25, 0.5, 0.75, 1.0]);

        let broken = CascadeSplitter::new(
            SplitMode::Custom,
            0.5,
            Some(Box::new(|_: usize, _: f32, _: f32| vec![0.5, 0.4, 1.0])),
        )
        .unwrap();
        assert!(matches!(
            broken.compute(3, 0.1, 100.0),
            Err(ConfigError::InvalidSplits(_))
        ));
        assert!(matches!(
            broken.compute(2, 0.1, 100.0),
            Err(ConfigError::InvalidSplits(_))
        ));
    }

    #[test]
    fn test_invalid_depth_range() {
        let splitter = CascadeSplitter::new(SplitMode::Practical, 0.5, None).unwrap();
        assert!(matches!(
            splitter.compute(3, 0.0, 100.0),
            Err(ConfigError::InvalidDepthRange { .. })
        ));
        assert!(matches!(
            splitter.compute(3, 10.0, 5.0),
            Err(ConfigError::InvalidDepthRange { .. })
        ));
    }
}
