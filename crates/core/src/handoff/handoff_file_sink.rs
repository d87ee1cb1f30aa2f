use crate::generation::domain::generation_job::GenerationJob;
use crate::handoff::handoff_dir::HandoffDir;
use crate::pipeline::session_sink::SessionSink;

/// Hands a round to a separate generation process through the handoff
/// directory: crops first, then the player count and round id, then
/// `scanningComplete=1`.
pub struct HandoffFileSink {
    dir: HandoffDir,
}

impl HandoffFileSink {
    pub fn new(dir: HandoffDir) -> Self {
        Self { dir }
    }
}

impl SessionSink for HandoffFileSink {
    fn submit(&mut self, job: GenerationJob) -> Result<(), Box<dyn std::error::Error>> {
        self.dir.write_faces(&job.faces)?;
        self.dir.set_player_count(job.faces.len() as u32)?;
        self.dir.set_round(job.round)?;
        self.dir.set_done(false)?;
        self.dir.set_scanning_complete(true)?;
        log::info!(
            "Round {} written to {}",
            job.round,
            self.dir.root().display()
        );
        Ok(())
    }
}
