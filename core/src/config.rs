//! JSON configuration schema. Deserialized by
//! the `cli` crate's launcher and handed to [`crate::pipeline::launcher`].
//! Field names use `serde(rename_all = "kebab-case")` so Rust code keeps
//! ordinary `snake_case` fields while accepting the wire format's own
//! kebab-case keys via `serde` rename attributes.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkType {
    File,
    Screen,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    H264,
    H265,
}

/// One entry of `input-streams[]`: a source file and which codec to
/// assemble it as.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InputStreamConfig {
    pub path: PathBuf,
    pub codec: CodecKind,
    #[serde(default)]
    pub mem_bank: u32,
}

/// `kernel.config.*`, one file per
/// detector/classifier model.
#[derive(Debug, Clone, Deserialize)]
pub struct DpuModelConfig {
    pub kernel: KernelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KernelConfig {
    pub config: DpuModelKernelConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DpuModelKernelConfig {
    pub model_path: PathBuf,
    pub model_name: String,
    pub model_format: crate::external::ModelFormat,
    pub model_class: String,
    pub batch_size: usize,
    #[serde(default, rename = "vitis-ai-preprocess")]
    pub vitis_ai_preprocess: bool,
    #[serde(default, rename = "performance-test")]
    pub performance_test: bool,
    #[serde(rename = "max-objects")]
    pub max_objects: usize,
    #[serde(default, rename = "seg-out-format")]
    pub seg_out_format: Option<String>,
    #[serde(default, rename = "segoutfactor")]
    pub seg_out_factor: Option<f32>,
    #[serde(default, rename = "float-feature")]
    pub float_feature: bool,
    #[serde(default, rename = "filter-labels")]
    pub filter_labels: Vec<String>,
}

impl<'de> Deserialize<'de> for crate::external::ModelFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "RGB" => Ok(crate::external::ModelFormat::Rgb),
            "BGR" => Ok(crate::external::ModelFormat::Bgr),
            "GRAY8" => Ok(crate::external::ModelFormat::Gray8),
            other => Err(serde::de::Error::custom(format!(
                "unknown model-format {other:?}, expected one of RGB, BGR, GRAY8"
            ))),
        }
    }
}

/// The JSON master config file, one per process invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub yolov3_config_path: PathBuf,
    pub resnet18_carmake_config_path: PathBuf,
    pub resnet18_cartype_config_path: PathBuf,
    pub resnet18_carcolor_config_path: PathBuf,
    pub metaconvert_config_path: PathBuf,
    pub xclbin_location: PathBuf,
    #[serde(default)]
    pub dev_idx: u32,
    pub sink_type: SinkType,
    #[serde(default)]
    pub additional_decoder_buffers: usize,
    #[serde(default)]
    pub batch_timeout: u64,
    #[serde(default = "default_fps_display_interval")]
    pub fps_display_interval: u64,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    pub input_streams: Vec<InputStreamConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fps_display_interval() -> u64 {
    5
}

fn default_repeat_count() -> u32 {
    1
}

impl PipelineConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_config_parses_minimal_json() {
        let json = r#"{
            "yolov3-config-path": "yolov3.json",
            "resnet18-carmake-config-path": "carmake.json",
            "resnet18-cartype-config-path": "cartype.json",
            "resnet18-carcolor-config-path": "carcolor.json",
            "metaconvert-config-path": "metaconvert.json",
            "xclbin-location": "dpu.xclbin",
            "sink-type": "null",
            "input-streams": [
                { "path": "stream0.h264", "codec": "h264" }
            ]
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.fps_display_interval, 5);
        assert_eq!(config.repeat_count, 1);
        assert_eq!(config.input_streams.len(), 1);
        assert_eq!(config.input_streams[0].codec, CodecKind::H264);
    }

    #[test]
    fn dpu_model_config_parses_kernel_config_block() {
        let json = r#"{
            "kernel": {
                "config": {
                    "model-path": "/models/yolov3.xmodel",
                    "model-name": "yolov3",
                    "model-format": "BGR",
                    "model-class": "YOLOV3",
                    "batch-size": 4,
                    "max-objects": 50,
                    "filter-labels": ["car", "person"]
                }
            }
        }"#;
        let config: DpuModelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kernel.config.batch_size, 4);
        assert_eq!(config.kernel.config.filter_labels, vec!["car", "person"]);
        assert!(!config.kernel.config.vitis_ai_preprocess);
    }
}
