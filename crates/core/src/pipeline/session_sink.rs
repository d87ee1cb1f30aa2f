use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::generation::domain::generation_job::GenerationJob;

/// Where the capture loop hands a quality-checked round.
pub trait SessionSink: Send {
    fn submit(&mut self, job: GenerationJob) -> Result<(), Box<dyn std::error::Error>>;
}

/// In-process hand-off to a generation worker thread.
pub struct ChannelSessionSink {
    tx: Sender<GenerationJob>,
}

impl ChannelSessionSink {
    pub fn new(tx: Sender<GenerationJob>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiver a generation worker should drain.
    pub fn pair() -> (Self, Receiver<GenerationJob>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }
}

impl SessionSink for ChannelSessionSink {
    fn submit(&mut self, job: GenerationJob) -> Result<(), Box<dyn std::error::Error>> {
        self.tx
            .send(job)
            .map_err(|_| "generation worker has stopped".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_arrive_in_order() {
        let (mut sink, rx) = ChannelSessionSink::pair();
        sink.submit(GenerationJob { round: 1, faces: vec![] }).unwrap();
        sink.submit(GenerationJob { round: 2, faces: vec![] }).unwrap();

        let rounds: Vec<u64> = rx.try_iter().map(|j| j.round).collect();
        assert_eq!(rounds, vec![1, 2]);
    }

    #[test]
    fn test_submit_fails_when_worker_is_gone() {
        let (mut sink, rx) = ChannelSessionSink::pair();
        drop(rx);
        assert!(sink.submit(GenerationJob { round: 1, faces: vec![] }).is_err());
    }
}
