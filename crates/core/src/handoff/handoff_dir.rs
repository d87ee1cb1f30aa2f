//! Flag files shared by a capture process and a generation process.
//!
//! Both sides poll; a missing or unreadable file always means "not ready".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::capture::domain::face_capture::FaceCapture;
use crate::generation::domain::generation_job::GenerationJob;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

pub const NUM_PLAYERS_FILE: &str = "numPlayers.txt";
pub const SCANNING_COMPLETE_FILE: &str = "scanningComplete.txt";
pub const DONE_FILE: &str = "done.txt";
/// Round id of the faces currently in the directory, `0` when none.
pub const ROUND_FILE: &str = "round.txt";
/// Round id the generation process last finished.
pub const DONE_ROUND_FILE: &str = "doneRound.txt";

pub fn face_file_name(index: usize) -> String {
    format!("face_{index}.jpg")
}

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot encode face {index}: {reason}")]
    Encode { index: usize, reason: String },
}

#[derive(Clone, Debug)]
pub struct HandoffDir {
    root: PathBuf,
}

impl HandoffDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the directory if needed.
    pub fn create(&self) -> Result<(), HandoffError> {
        fs::create_dir_all(&self.root).map_err(|source| HandoffError::Io {
            path: self.root.clone(),
            source,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn read_text(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.path(name))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Writes beside the target and renames, so a reader never sees half a file.
    fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<(), HandoffError> {
        let path = self.path(name);
        let temp = self.path(&format!("{name}.tmp"));
        fs::write(&temp, bytes)
            .and_then(|_| fs::rename(&temp, &path))
            .map_err(|source| HandoffError::Io { path, source })
    }

    fn read_flag(&self, name: &str) -> bool {
        self.read_text(name).as_deref() == Some("1")
    }

    fn write_flag(&self, name: &str, set: bool) -> Result<(), HandoffError> {
        self.write_bytes(name, if set { b"1" } else { b"0" })
    }

    pub fn player_count(&self) -> Option<u32> {
        self.read_text(NUM_PLAYERS_FILE)?.parse().ok()
    }

    pub fn set_player_count(&self, count: u32) -> Result<(), HandoffError> {
        self.write_bytes(NUM_PLAYERS_FILE, count.to_string().as_bytes())
    }

    pub fn scanning_complete(&self) -> bool {
        self.read_flag(SCANNING_COMPLETE_FILE)
    }

    pub fn set_scanning_complete(&self, set: bool) -> Result<(), HandoffError> {
        self.write_flag(SCANNING_COMPLETE_FILE, set)
    }

    pub fn done(&self) -> bool {
        self.read_flag(DONE_FILE)
    }

    pub fn set_done(&self, set: bool) -> Result<(), HandoffError> {
        self.write_flag(DONE_FILE, set)
    }

    fn read_u64(&self, name: &str) -> Option<u64> {
        self.read_text(name)?.parse().ok()
    }

    pub fn round(&self) -> Option<u64> {
        self.read_u64(ROUND_FILE)
    }

    pub fn set_round(&self, round: u64) -> Result<(), HandoffError> {
        self.write_bytes(ROUND_FILE, round.to_string().as_bytes())
    }

    pub fn done_round(&self) -> Option<u64> {
        self.read_u64(DONE_ROUND_FILE)
    }

    /// Marks `round` as generated: the round id first, then `done=1`.
    pub fn mark_done(&self, round: u64) -> Result<(), HandoffError> {
        self.write_bytes(DONE_ROUND_FILE, round.to_string().as_bytes())?;
        self.set_done(true)
    }

    /// Puts every flag, the player count and the round id back to `0`.
    ///
    /// The round id goes first so a generation run still in flight sees its
    /// round withdrawn before the flags change.
    pub fn reset_flags(&self) -> Result<(), HandoffError> {
        self.set_round(0)?;
        self.set_scanning_complete(false)?;
        self.set_done(false)?;
        self.set_player_count(0)
    }

    pub fn write_faces(&self, faces: &[FaceCapture]) -> Result<(), HandoffError> {
        for face in faces {
            let bytes = face.jpeg_bytes().map_err(|e| HandoffError::Encode {
                index: face.index,
                reason: e.to_string(),
            })?;
            self.write_bytes(&face_file_name(face.index), &bytes)?;
        }
        Ok(())
    }

    /// Rebuilds a job from `round.txt`, `numPlayers.txt` and the face files.
    ///
    /// Returns `None` while any of them is missing or unreadable. Detection
    /// metadata does not survive the hand-off: each box spans its whole crop.
    pub fn load_job(&self) -> Option<GenerationJob> {
        let round = self.round().filter(|&r| r > 0)?;
        let count = self.player_count()? as usize;
        if count == 0 {
            return None;
        }

        let mut faces = Vec::with_capacity(count);
        for index in 0..count {
            let path = self.path(&face_file_name(index));
            let img = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    log::debug!("{} not ready: {e}", path.display());
                    return None;
                }
            };
            let (w, h) = img.dimensions();
            faces.push(FaceCapture {
                index,
                image: Frame::new(img.into_raw(), w, h, 3, index),
                bounding_box: Region::new(0, 0, w as i32, h as i32),
                confidence: 0.0,
                sharpness: None,
            });
        }
        Some(GenerationJob { round, faces })
    }
}
