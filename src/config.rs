use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::CooldownPolicy;
use crate::depth::DEPTH_INPUT_SIZE;
use crate::detect::{
    BoxCoordinates, LabelTable, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD,
};
use crate::ingest::SyntheticConfig;
use crate::pipeline::{AdmissionIntervals, PipelineSettings};

const DEFAULT_DETECTOR_INPUT_SIZE: usize = 640;
const DEFAULT_LABELS: &str = "coco";
const DEFAULT_MIN_INTERVAL_MS: u64 = 700;
const DEFAULT_MIN_INTERVAL_FAST_MS: u64 = 300;
const DEFAULT_VERY_CLOSE_COOLDOWN_MS: u64 = 1500;
const DEFAULT_COOLDOWN_MS: u64 = 3000;
const DEFAULT_CAMERA_URL: &str = "stub://front_camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct PerceptionConfigFile {
    detector: Option<DetectorConfigFile>,
    depth: Option<DepthConfigFile>,
    scheduler: Option<SchedulerConfigFile>,
    alerts: Option<AlertsConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    input_size: Option<usize>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    class_aware_nms: Option<bool>,
    box_coordinates: Option<BoxCoordinates>,
    labels: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DepthConfigFile {
    model_path: Option<PathBuf>,
    enabled: Option<bool>,
    input_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SchedulerConfigFile {
    min_interval_ms: Option<u64>,
    min_interval_fast_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertsConfigFile {
    very_close_cooldown_ms: Option<u64>,
    cooldown_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Where the detector's class names come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    Coco,
    Obstacle,
    File(PathBuf),
}

impl LabelSource {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "coco" => Self::Coco,
            "obstacle" => Self::Obstacle,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerceptionConfig {
    pub detector: DetectorSettings,
    pub depth: DepthSettings,
    pub intervals: AdmissionIntervals,
    pub cooldowns: CooldownPolicy,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub input_size: usize,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub class_aware_nms: bool,
    pub box_coordinates: BoxCoordinates,
    pub labels: LabelSource,
}

#[derive(Debug, Clone)]
pub struct DepthSettings {
    pub model_path: Option<PathBuf>,
    pub enabled: bool,
    pub input_size: usize,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        // Every field of the empty file falls back to its default.
        Self::from_file(PerceptionConfigFile::default())
    }
}

impl PerceptionConfig {
    /// Defaults, then the file named by `PERCEPTION_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PERCEPTION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PerceptionConfigFile) -> Self {
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            model_path: detector_file.model_path,
            input_size: detector_file
                .input_size
                .unwrap_or(DEFAULT_DETECTOR_INPUT_SIZE),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            iou_threshold: detector_file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            class_aware_nms: detector_file.class_aware_nms.unwrap_or(false),
            box_coordinates: detector_file.box_coordinates.unwrap_or_default(),
            labels: LabelSource::parse(
                detector_file.labels.as_deref().unwrap_or(DEFAULT_LABELS),
            ),
        };

        let depth_file = file.depth.unwrap_or_default();
        let depth = DepthSettings {
            model_path: depth_file.model_path,
            enabled: depth_file.enabled.unwrap_or(true),
            input_size: depth_file.input_size.unwrap_or(DEPTH_INPUT_SIZE),
        };

        let scheduler = file.scheduler.unwrap_or_default();
        let intervals = AdmissionIntervals {
            with_depth: Duration::from_millis(
                scheduler.min_interval_ms.unwrap_or(DEFAULT_MIN_INTERVAL_MS),
            ),
            without_depth: Duration::from_millis(
                scheduler
                    .min_interval_fast_ms
                    .unwrap_or(DEFAULT_MIN_INTERVAL_FAST_MS),
            ),
        };

        let alerts = file.alerts.unwrap_or_default();
        let cooldowns = CooldownPolicy {
            very_close: Duration::from_millis(
                alerts
                    .very_close_cooldown_ms
                    .unwrap_or(DEFAULT_VERY_CLOSE_COOLDOWN_MS),
            ),
            default: Duration::from_millis(alerts.cooldown_ms.unwrap_or(DEFAULT_COOLDOWN_MS)),
        };

        let camera = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };

        Self {
            detector,
            depth,
            intervals,
            cooldowns,
            camera,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("PERCEPTION_DETECTOR_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("PERCEPTION_DEPTH_MODEL") {
            if !path.trim().is_empty() {
                self.depth.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(enabled) = std::env::var("PERCEPTION_DEPTH_ENABLED") {
            self.depth.enabled = parse_bool(&enabled).ok_or_else(|| {
                anyhow!("PERCEPTION_DEPTH_ENABLED must be true/false, 1/0 or yes/no")
            })?;
        }
        if let Ok(labels) = std::env::var("PERCEPTION_LABELS") {
            if !labels.trim().is_empty() {
                self.detector.labels = LabelSource::parse(&labels);
            }
        }
        if let Ok(confidence) = std::env::var("PERCEPTION_CONFIDENCE") {
            self.detector.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("PERCEPTION_CONFIDENCE must be a number"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        check_unit_interval("detector.confidence_threshold", self.detector.confidence_threshold)?;
        check_unit_interval("detector.iou_threshold", self.detector.iou_threshold)?;
        if self.detector.input_size == 0 || self.depth.input_size == 0 {
            return Err(anyhow!("network input sizes must be greater than zero"));
        }
        if self.intervals.with_depth.is_zero() || self.intervals.without_depth.is_zero() {
            return Err(anyhow!("scheduler intervals must be greater than zero"));
        }
        if self.intervals.with_depth < self.intervals.without_depth {
            return Err(anyhow!(
                "scheduler.min_interval_ms must not be shorter than scheduler.min_interval_fast_ms"
            ));
        }
        if self.cooldowns.very_close.is_zero() || self.cooldowns.default.is_zero() {
            return Err(anyhow!("alert cooldowns must be greater than zero"));
        }
        if let LabelSource::File(path) = &self.detector.labels {
            if !path.is_file() {
                return Err(anyhow!("label file {} does not exist", path.display()));
            }
        }
        Ok(())
    }

    pub fn label_table(&self) -> Result<LabelTable> {
        match &self.detector.labels {
            LabelSource::Coco => Ok(LabelTable::coco()),
            LabelSource::Obstacle => Ok(LabelTable::obstacle()),
            LabelSource::File(path) => LabelTable::from_file(path),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            confidence_threshold: self.detector.confidence_threshold,
            box_coordinates: self.detector.box_coordinates,
            iou_threshold: self.detector.iou_threshold,
            class_aware_nms: self.detector.class_aware_nms,
        }
    }

    pub fn detector_input_shape(&self) -> [usize; 4] {
        [1, self.detector.input_size, self.detector.input_size, 3]
    }

    pub fn depth_input_shape(&self) -> [usize; 4] {
        [1, self.depth.input_size, self.depth.input_size, 3]
    }

    pub fn source_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            url: self.camera.url.clone(),
            width: self.camera.width,
            height: self.camera.height,
            ..SyntheticConfig::default()
        }
    }
}

fn read_config_file(path: &Path) -> Result<PerceptionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(anyhow!("{} must be in (0, 1], got {}", name, value))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
