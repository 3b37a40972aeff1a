//! Contracts for the mirrored device.
//!
//! The agent never talks to the operating system directly. It sees the
//! screen through a [`ScreenCapture`] and moves the pointer through an
//! [`Actuator`]. Both are expected to be thin wrappers around OS-level I/O,
//! and both own their own timeout policy, if any.

use std::fmt::{self, Display};
use std::pin::Pin;

use mirror_agent_model::ImageSource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A point on the captured screen, in pixels from its top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CursorPosition {
    /// Horizontal offset from the left edge.
    pub x: i32,
    /// Vertical offset from the top edge.
    pub y: i32,
}

impl CursorPosition {
    /// Creates a new position.
    #[inline]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Display for CursorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A snapshot of the screen together with where the cursor was.
#[derive(Clone, Debug, PartialEq)]
pub struct Screenshot {
    /// The encoded image.
    pub image: ImageSource,
    /// The cursor position at capture time.
    pub cursor: CursorPosition,
}

/// A direction the cursor can be moved in.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
#[schemars(inline)]
pub enum Direction {
    /// Towards the top edge.
    Up,
    /// Towards the bottom edge.
    Down,
    /// Towards the left edge.
    Left,
    /// Towards the right edge.
    Right,
}

impl Direction {
    /// Returns the `(dx, dy)` offset for moving `distance` pixels in this
    /// direction, with `y` growing downwards.
    #[inline]
    pub fn offset(self, distance: u32) -> (i64, i64) {
        let distance = i64::from(distance);
        match self {
            Direction::Up => (0, -distance),
            Direction::Down => (0, distance),
            Direction::Left => (-distance, 0),
            Direction::Right => (distance, 0),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        };
        f.write_str(name)
    }
}

/// An error reported by a device adapter.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DeviceError {
    reason: String,
}

impl DeviceError {
    /// Creates an error with a human-readable reason.
    #[inline]
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the reason of this error.
    #[inline]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Produces screenshots of the mirrored device.
///
/// Capturing must be safe to repeat. A failed capture is reported as an
/// error, never as a partial or corrupt image.
pub trait ScreenCapture: Send + Sync + 'static {
    /// Captures the screen and the current cursor position.
    ///
    /// This method must return a future that is fully independent of
    /// `self`.
    fn capture(
        &self,
    ) -> impl Future<Output = Result<Screenshot, DeviceError>> + Send + 'static;
}

/// Moves and clicks the cursor on the mirrored device.
///
/// Each call completes only when the effect has been applied, and resolves
/// to a human-readable outcome that is reported back to the model.
pub trait Actuator: Send + Sync + 'static {
    /// Moves the cursor by `distance` pixels in `direction`.
    fn move_cursor(
        &self,
        direction: Direction,
        distance: u32,
    ) -> impl Future<Output = Result<String, DeviceError>> + Send + 'static;

    /// Clicks at the current cursor position.
    fn click(
        &self,
    ) -> impl Future<Output = Result<String, DeviceError>> + Send + 'static;
}

pub(crate) type DeviceFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, DeviceError>> + Send>>;

pub(crate) trait ScreenCaptureObject: Send + Sync + 'static {
    fn capture(&self) -> DeviceFuture<Screenshot>;
}

pub(crate) trait ActuatorObject: Send + Sync + 'static {
    fn move_cursor(
        &self,
        direction: Direction,
        distance: u32,
    ) -> DeviceFuture<String>;

    fn click(&self) -> DeviceFuture<String>;
}

pub(crate) struct AnyDevice<T>(pub T);

impl<T: ScreenCapture> ScreenCaptureObject for AnyDevice<T> {
    #[inline]
    fn capture(&self) -> DeviceFuture<Screenshot> {
        Box::pin(self.0.capture())
    }
}

impl<T: Actuator> ActuatorObject for AnyDevice<T> {
    #[inline]
    fn move_cursor(
        &self,
        direction: Direction,
        distance: u32,
    ) -> DeviceFuture<String> {
        Box::pin(self.0.move_cursor(direction, distance))
    }

    #[inline]
    fn click(&self) -> DeviceFuture<String> {
        Box::pin(self.0.click())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_offset() {
        assert_eq!(Direction::Up.offset(10), (0, -10));
        assert_eq!(Direction::Down.offset(10), (0, 10));
        assert_eq!(Direction::Left.offset(3), (-3, 0));
        assert_eq!(Direction::Right.offset(50), (50, 0));
    }

    #[test]
    fn test_display() {
        assert_eq!(CursorPosition::new(60, 10).to_string(), "(60, 10)");
        assert_eq!(Direction::Right.to_string(), "right");
        let direction: Direction = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(direction, Direction::Left);
    }
}
