//! Capture backend that only ever produces blank frames

use tracing::trace;

use super::{DisplayMetrics, FrameSource};
use crate::frame::{BlankFrame, Frame};

/// Blank-frame backend
///
/// Needs no OS resources; used as a fallback and as a test double.
pub struct NullCapturer {
    display: Box<dyn DisplayMetrics>,
    blank: BlankFrame,
}

impl NullCapturer {
    /// Create a null capturer sized by `display`
    pub fn new(display: impl DisplayMetrics + 'static) -> Self {
        Self {
            display: Box::new(display),
            blank: BlankFrame::new(),
        }
    }
}

impl FrameSource for NullCapturer {
    fn frame(&mut self) -> Frame<'_> {
        trace!("Obtaining null frame");
        let size = self.display.screen_size();
        self.blank.frame(size)
    }
}
