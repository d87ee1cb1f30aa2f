use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::constants::{DRY_RUN_FPS, IMAGE_EXTENSIONS};
use crate::shared::frame::Frame;

/// Replays the still images of a directory, in file-name order, as a camera feed.
///
/// Useful for rehearsing a booth without a camera attached. Like a camera it
/// delivers frames at a steady rate and never runs dry: after the last image
/// the sequence starts over.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    interval: Duration,
    last_frame: Option<Instant>,
    served: usize,
}

impl ImageSequenceSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Vec::new(),
            interval: frame_interval(DRY_RUN_FPS),
            last_frame: None,
            served: 0,
        }
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.interval = frame_interval(fps);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn wait_for_next_tick(&mut self) {
        if let Some(last) = self.last_frame {
            let due = last + self.interval;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(format!("no images found in {}", self.dir.display()).into());
        }
        log::info!("Replaying {} images from {}", files.len(), self.dir.display());
        self.files = files;
        self.last_frame = None;
        self.served = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        if self.files.is_empty() {
            return Err("image sequence is not open".into());
        }
        self.wait_for_next_tick();
        let path = &self.files[self.served % self.files.len()];
        let rgb = image::open(path)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        let frame = Frame::new(rgb.into_raw(), width, height, 3, self.served);
        self.served += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        self.files.clear();
        self.last_frame = None;
        self.served = 0;
    }
}
