//! Cursor overlay shared by the capture backends
//!
//! Drawing the pointer is best-effort: a failed query or draw is logged and
//! the frame goes out without a cursor.

use tracing::{trace, warn};

use crate::error::Result;
use crate::geometry::FramePos;

/// A visible cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor<S> {
    /// Platform cursor shape handle
    pub shape: S,
    /// Pointer position in screen coordinates
    pub position: FramePos,
    /// Hotspot offset within the cursor image
    pub hotspot: FramePos,
}

impl<S> Cursor<S> {
    /// Top-left corner where the cursor image goes
    pub fn origin(&self) -> FramePos {
        self.position - self.hotspot
    }
}

/// Read-only cursor query plus drawing onto a capture canvas
pub trait CursorApi {
    /// Cursor shape handle
    type Shape;
    /// Surface the cursor is drawn onto (e.g. a device context)
    type Canvas;

    /// Current cursor, or `None` when it is hidden
    fn query_cursor(&self) -> Result<Option<Cursor<Self::Shape>>>;

    /// Draw `shape` with its top-left corner at `origin`
    fn draw_cursor(&self, canvas: &Self::Canvas, shape: &Self::Shape, origin: FramePos)
        -> Result<()>;
}

/// Draw the current cursor onto `canvas`
///
/// Returns true if a cursor was drawn.
pub fn overlay_cursor<A: CursorApi + ?Sized>(api: &A, canvas: &A::Canvas) -> bool {
    trace!("Obtaining cursor image");

    let cursor = match api.query_cursor() {
        Ok(Some(cursor)) => cursor,
        Ok(None) => return false,
        Err(e) => {
            warn!("Could not query cursor: {}", e);
            return false;
        }
    };

    match api.draw_cursor(canvas, &cursor.shape, cursor.origin()) {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not draw cursor: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeskstreamError;
    use std::cell::RefCell;

    struct Pointer {
        cursor: Result<Option<Cursor<u8>>>,
        draw_fails: bool,
        drawn: RefCell<Vec<FramePos>>,
    }

    impl CursorApi for Pointer {
        type Shape = u8;
        type Canvas = ();

        fn query_cursor(&self) -> Result<Option<Cursor<u8>>> {
            match &self.cursor {
                Ok(cursor) => Ok(cursor.clone()),
                Err(e) => Err(DeskstreamError::capture(e.to_string())),
            }
        }

        fn draw_cursor(&self, _canvas: &(), _shape: &u8, origin: FramePos) -> Result<()> {
            if self.draw_fails {
                return Err(DeskstreamError::capture("draw failed"));
            }
            self.drawn.borrow_mut().push(origin);
            Ok(())
        }
    }

    fn pointer(cursor: Result<Option<Cursor<u8>>>, draw_fails: bool) -> Pointer {
        Pointer {
            cursor,
            draw_fails,
            drawn: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn test_draws_at_position_minus_hotspot() {
        let api = pointer(
            Ok(Some(Cursor {
                shape: 1,
                position: FramePos::new(100, 50),
                hotspot: FramePos::new(4, 2),
            })),
            false,
        );
        assert!(overlay_cursor(&api, &()));
        assert_eq!(*api.drawn.borrow(), vec![FramePos::new(96, 48)]);
    }

    #[test]
    fn test_hidden_cursor_skipped() {
        let api = pointer(Ok(None), false);
        assert!(!overlay_cursor(&api, &()));
        assert!(api.drawn.borrow().is_empty());
    }

    #[test]
    fn test_failures_are_not_fatal() {
        let api = pointer(Err(DeskstreamError::capture("no cursor info")), false);
        assert!(!overlay_cursor(&api, &()));

        let api = pointer(
            Ok(Some(Cursor {
                shape: 1,
                position: FramePos::new(0, 0),
                hotspot: FramePos::new(0, 0),
            })),
            true,
        );
        assert!(!overlay_cursor(&api, &()));
    }
}
