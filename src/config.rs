use crate::utils::error::DetectError;
use crate::Result;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Hard upload ceiling shared by the transport and the image loader.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,

    /// ONNX detection model file
    pub model_path: PathBuf,

    /// Worker threads
    pub workers: usize,

    /// Development mode
    pub dev_mode: bool,

    /// Deployment environment name reported by the debug endpoint
    pub environment: String,

    pub onnx_config: OnnxConfig,

    pub server_config: ServerConfig,

    pub detection_config: DetectionConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU threads per session
    pub intra_threads: usize,

    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Request timeout in seconds
    pub request_timeout: u64,

    /// Maximum request body in bytes (multipart framing included)
    pub max_request_size: usize,

    /// Maximum accepted image size in bytes
    pub max_upload_size: usize,

    /// Add a `source` tag to successful detection responses
    pub expose_source: bool,
}

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Predictions scoring below this are dropped by the model
    pub min_score: f32,

    /// Upper bound on predictions returned per image
    pub max_detections: usize,

    /// Canonical frame the uploaded image is fitted into
    pub max_width: u32,
    pub max_height: u32,

    /// Quality of the canonical JPEG re-encode
    pub jpeg_quality: u8,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            max_detections: 20,
            max_width: 640,
            max_height: 480,
            jpeg_quality: 90,
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        model_path: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1),
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            max_request_size: MAX_UPLOAD_BYTES + 64 * 1024,
            max_upload_size: MAX_UPLOAD_BYTES,
            expose_source: false,
        };

        let config = Self {
            bind_addr,
            model_path: PathBuf::from(model_path),
            workers,
            dev_mode,
            environment: "development".to_string(),
            onnx_config,
            server_config,
            detection_config: DetectionConfig::default(),
        };
        config.socket_addr()?;

        Ok(config)
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_expose_source(mut self, expose: bool) -> Self {
        self.server_config.expose_source = expose;
        self
    }

    pub fn with_detection(mut self, detection: DetectionConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&detection.min_score) {
            return Err(DetectError::Config(format!(
                "min_score must be within [0, 1], got {}",
                detection.min_score
            )));
        }
        if detection.max_detections == 0 {
            return Err(DetectError::Config(
                "max_detections must be at least 1".to_string(),
            ));
        }
        if detection.max_width == 0 || detection.max_height == 0 {
            return Err(DetectError::Config(format!(
                "Invalid canonical frame {}x{}",
                detection.max_width, detection.max_height
            )));
        }
        self.detection_config = detection;
        Ok(self)
    }

    /// Parse the bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr.parse().map_err(|e| {
            DetectError::Config(format!("Invalid bind address {}: {}", self.bind_addr, e))
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let cpu_cores = num_cpus::get();
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            model_path: PathBuf::from("models/ssd_mobilenet_v1.onnx"),
            workers: cpu_cores,
            dev_mode: false,
            environment: "development".to_string(),
            onnx_config: OnnxConfig {
                intra_threads: (cpu_cores * 3 / 4).max(1),
                optimization_level: 3,
            },
            server_config: ServerConfig {
                request_timeout: 60,
                max_request_size: MAX_UPLOAD_BYTES + 64 * 1024,
                max_upload_size: MAX_UPLOAD_BYTES,
                expose_source: false,
            },
            detection_config: DetectionConfig::default(),
        }
    }
}
