pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Identity used as `sender` on the bus and for self-message suppression.
pub const DEFAULT_IDENTITY: &str = "faceinator";
pub const APP_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

pub const CONTROL_TOPIC: &str = "alch/faceinator";
pub const STATUS_TOPIC: &str = "alch";
pub const GAME_TOPIC: &str = "alch/game";

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
/// Pixels added on every side of a detected face before cropping.
pub const DEFAULT_PADDING: i32 = 20;
/// Laplacian variance at or below which a face counts as blurry.
pub const DEFAULT_BLUR_THRESHOLD: f64 = 100.0;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

pub const FALLBACK_DESCRIPTION: &str = "a mysterious alchemist";

/// Pace of an image directory replayed in place of a camera.
pub const DRY_RUN_FPS: u32 = 10;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
