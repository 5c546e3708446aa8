//! Capture-encode pipeline
//!
//! Pairs one frame source with one encoder. The host drives it: every
//! [`Pipeline::tick`] pulls a frame and pushes it through the encoder, and
//! [`Pipeline::finish`] drains the encoder at the end.

use std::time::Instant;
use tracing::{debug, info};

use crate::capture::FrameSource;
use crate::encode::Encoder;

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, no frame pulled yet
    Idle,
    /// Processing frames
    Running,
    /// Finished; further ticks are ignored
    Stopped,
}

/// Capture-encode pipeline
pub struct Pipeline<S, E> {
    source: S,
    encoder: E,
    state: PipelineState,
    frames_processed: u64,
    start_time: Option<Instant>,
}

impl<S: FrameSource, E: Encoder> Pipeline<S, E> {
    /// Create a pipeline from a source and an encoder
    pub fn new(source: S, encoder: E) -> Self {
        Self {
            source,
            encoder,
            state: PipelineState::Idle,
            frames_processed: 0,
            start_time: None,
        }
    }

    /// Capture one frame and encode it
    pub fn tick(&mut self) {
        match self.state {
            PipelineState::Stopped => return,
            PipelineState::Idle => {
                info!("Pipeline started");
                self.state = PipelineState::Running;
                self.start_time = Some(Instant::now());
            }
            PipelineState::Running => {}
        }

        let frame = self.source.frame();
        self.encoder.encode(&frame);
        self.frames_processed += 1;
    }

    /// Flush the encoder and stop
    pub fn finish(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        debug!("Finishing pipeline after {} frames", self.frames_processed);
        self.encoder.flush();
        self.state = PipelineState::Stopped;
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Check if the pipeline is running
    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    /// Get the number of frames processed
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Get pipeline statistics
    pub fn stats(&self) -> PipelineStats {
        let elapsed = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        PipelineStats {
            state: self.state,
            frames_processed: self.frames_processed,
            actual_fps: if elapsed > 0.0 {
                self.frames_processed as f64 / elapsed
            } else {
                0.0
            },
            elapsed_seconds: elapsed,
        }
    }
}

/// Pipeline statistics
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Current state
    pub state: PipelineState,
    /// Number of frames processed
    pub frames_processed: u64,
    /// Actual measured FPS
    pub actual_fps: f64,
    /// Elapsed time in seconds
    pub elapsed_seconds: f64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}: {} frames in {:.1}s ({:.1} fps)",
            self.state, self.frames_processed, self.elapsed_seconds, self.actual_fps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FixedDisplay, NullCapturer};
    use crate::frame::Frame;
    use crate::geometry::FrameSize;

    #[derive(Default)]
    struct CountingEncoder {
        sizes: Vec<FrameSize>,
        flushes: usize,
    }

    impl Encoder for CountingEncoder {
        fn encode(&mut self, frame: &Frame<'_>) {
            self.sizes.push(frame.size);
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    #[test]
    fn test_tick_and_finish() {
        let source = NullCapturer::new(FixedDisplay::new(FrameSize::new(640, 480)));
        let mut pipeline = Pipeline::new(source, CountingEncoder::default());
        assert_eq!(pipeline.state(), PipelineState::Idle);

        for _ in 0..3 {
            pipeline.tick();
        }
        assert!(pipeline.is_running());
        assert_eq!(pipeline.frames_processed(), 3);
        assert_eq!(pipeline.encoder().sizes, vec![FrameSize::new(640, 480); 3]);

        pipeline.finish();
        pipeline.finish();
        pipeline.tick();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(pipeline.encoder().flushes, 1);
        assert_eq!(pipeline.frames_processed(), 3);
    }
}
