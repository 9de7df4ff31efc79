use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub denoise: DenoiseConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Model input as `[width, height]`.
    pub size: [u32; 2],
    #[serde(default)]
    pub resize_method: ResizeMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenoiseConfig {
    pub enabled: bool,
    pub window: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizationConfig {
    #[serde(default)]
    pub mode: NormalizationMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMethod {
    Nearest,
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

/// Input conventions of the common pretrained backbones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// RGB to BGR, then per-channel ImageNet mean subtraction on the 0..255 scale.
    #[default]
    Caffe,
    /// Scale to 0..1, then ImageNet mean/std per RGB channel.
    Torch,
    /// Scale to -1..1.
    Tf,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: [224, 224],
            resize_method: ResizeMethod::default(),
        }
    }
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 3,
        }
    }
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            image: ImageConfig::default(),
            denoise: DenoiseConfig::default(),
            normalization: NormalizationConfig::default(),
        }
    }
}

impl From<ResizeMethod> for FilterType {
    fn from(method: ResizeMethod) -> Self {
        match method {
            ResizeMethod::Nearest => FilterType::Nearest,
            ResizeMethod::Triangle => FilterType::Triangle,
            ResizeMethod::CatmullRom => FilterType::CatmullRom,
            ResizeMethod::Gaussian => FilterType::Gaussian,
            ResizeMethod::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl PreprocessingConfig {
    /// Reads the YAML file if one is given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, serde_yaml::Error> {
        let config: PreprocessingConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), serde_yaml::Error> {
        use serde::de::Error;

        let [width, height] = self.image.size;
        if width == 0 || height == 0 {
            return Err(serde_yaml::Error::custom("image.size must be non-zero"));
        }
        if self.denoise.window == 0 || self.denoise.window % 2 == 0 {
            return Err(serde_yaml::Error::custom("denoise.window must be odd"));
        }
        Ok(())
    }

    /// Shape of the tensor the normalizer emits: `[1, height, width, 3]`.
    pub fn tensor_shape(&self) -> [usize; 4] {
        let [width, height] = self.image.size;
        [1, height as usize, width as usize, 3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let config = PreprocessingConfig::from_yaml(
            r#"
image:
  size: [256, 128]
  resize_method: lanczos3
denoise:
  enabled: false
  window: 5
normalization:
  mode: torch
"#,
        )
        .unwrap();
        assert_eq!(config.image.size, [256, 128]);
        assert_eq!(config.image.resize_method, ResizeMethod::Lanczos3);
        assert!(!config.denoise.enabled);
        assert_eq!(config.normalization.mode, NormalizationMode::Torch);
        assert_eq!(config.tensor_shape(), [1, 128, 256, 3]);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = PreprocessingConfig::from_yaml("image:\n  size: [224, 224]\n").unwrap();
        assert_eq!(config, PreprocessingConfig::default());
    }

    #[test]
    fn rejects_even_window() {
        let err = PreprocessingConfig::from_yaml("denoise:\n  enabled: true\n  window: 4\n");
        assert!(err.is_err());
    }

    #[test]
    fn no_path_means_defaults() {
        let config = PreprocessingConfig::load(None).unwrap();
        assert_eq!(config.tensor_shape(), [1, 224, 224, 3]);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/preprocessing.yaml");
        let config = PreprocessingConfig::load(Some(&path)).unwrap();
        assert_eq!(config, PreprocessingConfig::default());
    }
}
