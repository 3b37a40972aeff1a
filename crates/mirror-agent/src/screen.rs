//! Device adapters for an iPhone mirrored on a Mac.
//!
//! The screen is captured with `screencapture` and the cursor is driven
//! with [cliclick](https://github.com/BlueM/cliclick), which must be on
//! `PATH`. Both need the Screen Recording and Accessibility permissions.
//!
//! Screenshots and cursor positions share one frame: points relative to
//! the top-left corner of the captured region. The cursor is drawn onto
//! every screenshot as a red circle with crosshairs.

use std::env;
use std::ffi::OsStr;
use std::fmt::{self, Display};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use mirror_agent_core::device::{
    Actuator, CursorPosition, DeviceError, Direction, ScreenCapture,
    Screenshot,
};
use mirror_agent_model::{ImageFormat, ImageSource};
use tokio::fs;
use tokio::process::Command;
use tokio::task;

const SCREENCAPTURE: &str = "screencapture";
const CLICLICK: &str = "cliclick";

const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MARKER_RADIUS: i32 = 12;
const CROSSHAIR_LENGTH: i32 = 18;
const JPEG_QUALITY: u8 = 85;

static NEXT_CAPTURE_ID: AtomicU64 = AtomicU64::new(0);

/// A rectangle of the display to capture, in points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRegion {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width, always positive.
    pub width: u32,
    /// Height, always positive.
    pub height: u32,
}

impl Display for CaptureRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for CaptureRegion {
    type Err = String;

    /// Parses a region written as `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split(',').map(str::trim).collect();
        let &[x, y, width, height] = parts.as_slice() else {
            return Err(format!("expected x,y,width,height, got {s:?}"));
        };
        let coord = |value: &str| {
            value
                .parse::<i32>()
                .map_err(|err| format!("invalid coordinate {value:?}: {err}"))
        };
        let extent = |value: &str| match value.parse::<u32>() {
            Ok(0) => Err("region must not be empty".to_owned()),
            Ok(extent) => Ok(extent),
            Err(err) => Err(format!("invalid extent {value:?}: {err}")),
        };
        Ok(Self {
            x: coord(x)?,
            y: coord(y)?,
            width: extent(width)?,
            height: extent(height)?,
        })
    }
}

/// Captures the Mac display and drives its cursor.
///
/// Implements both [`ScreenCapture`] and [`Actuator`], so the same value
/// (or a clone of it) is handed to the agent for both roles.
#[derive(Clone, Debug, Default)]
pub struct MacScreen {
    region: Option<CaptureRegion>,
}

impl MacScreen {
    /// Creates an adapter that captures the whole display.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts captures to a region, typically the mirroring window.
    #[inline]
    pub fn with_region(mut self, region: Option<CaptureRegion>) -> Self {
        self.region = region;
        self
    }
}

impl ScreenCapture for MacScreen {
    fn capture(
        &self,
    ) -> impl Future<Output = Result<Screenshot, DeviceError>> + Send + 'static
    {
        let region = self.region;
        async move {
            let path = temp_capture_path();
            let bytes = capture_image(&path, region).await;
            // The file may be left behind even when capturing failed.
            fs::remove_file(&path).await.ok();

            let bytes = bytes?;
            let cursor = to_region(cursor_position().await?, region);
            let bytes =
                task::spawn_blocking(move || annotate(&bytes, region, cursor))
                    .await
                    .map_err(|err| {
                        DeviceError::new(format!(
                            "failed to annotate the screenshot: {err}"
                        ))
                    })??;

            trace!("captured {} bytes, cursor at {cursor}", bytes.len());
            let image = ImageSource {
                format: ImageFormat::Jpeg,
                data: BASE64.encode(&bytes),
            };
            Ok(Screenshot { image, cursor })
        }
    }
}

impl Actuator for MacScreen {
    fn move_cursor(
        &self,
        direction: Direction,
        distance: u32,
    ) -> impl Future<Output = Result<String, DeviceError>> + Send + 'static
    {
        async move {
            run(CLICLICK, [move_argument(direction, distance)]).await?;
            Ok(format!("Moved {direction} by {distance}"))
        }
    }

    fn click(
        &self,
    ) -> impl Future<Output = Result<String, DeviceError>> + Send + 'static
    {
        async move {
            run(CLICLICK, ["c:."]).await?;
            Ok("Clicked".to_owned())
        }
    }
}

fn temp_capture_path() -> PathBuf {
    let id = NEXT_CAPTURE_ID.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!("mirror-agent-{}-{id}.jpg", process::id()))
}

async fn capture_image(
    path: &Path,
    region: Option<CaptureRegion>,
) -> Result<Vec<u8>, DeviceError> {
    let mut args = vec!["-x".to_owned(), "-t".to_owned(), "jpg".to_owned()];
    if let Some(region) = region {
        args.push("-R".to_owned());
        args.push(region.to_string());
    }
    args.push(path.display().to_string());
    run(SCREENCAPTURE, args).await?;

    let bytes = fs::read(path).await.map_err(|err| {
        DeviceError::new(format!("failed to read the screenshot: {err}"))
    })?;
    // Without the Screen Recording permission the file is left empty.
    if bytes.is_empty() {
        return Err(DeviceError::new("the screenshot is empty"));
    }
    Ok(bytes)
}

/// Converts a display position into the frame of the captured region.
#[inline]
fn to_region(
    cursor: CursorPosition,
    region: Option<CaptureRegion>,
) -> CursorPosition {
    match region {
        Some(region) => {
            CursorPosition::new(cursor.x - region.x, cursor.y - region.y)
        }
        None => cursor,
    }
}

/// Scales the screenshot to the region's size in points, draws the cursor
/// marker at `cursor` and encodes the result as JPEG.
fn annotate(
    bytes: &[u8],
    region: Option<CaptureRegion>,
    cursor: CursorPosition,
) -> Result<Vec<u8>, DeviceError> {
    let mut canvas = image::load_from_memory(bytes)
        .map_err(|err| {
            DeviceError::new(format!("failed to decode the screenshot: {err}"))
        })?
        .to_rgb8();

    // Retina displays are captured at more pixels than points.
    if let Some(region) = region {
        if canvas.dimensions() != (region.width, region.height) {
            canvas = imageops::resize(
                &canvas,
                region.width,
                region.height,
                FilterType::Triangle,
            );
        }
    }
    draw_marker(&mut canvas, cursor);

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .map_err(|err| {
            DeviceError::new(format!("failed to encode the screenshot: {err}"))
        })?;
    Ok(buf)
}

fn draw_marker(canvas: &mut RgbImage, cursor: CursorPosition) {
    let CursorPosition { x, y } = cursor;
    for offset in -1..=1 {
        draw_hollow_circle_mut(
            canvas,
            (x, y),
            MARKER_RADIUS + offset,
            MARKER_COLOR,
        );
        let (fx, fy) = ((x + offset) as f32, (y + offset) as f32);
        let len = CROSSHAIR_LENGTH as f32;
        draw_line_segment_mut(
            canvas,
            (x as f32 - len, fy),
            (x as f32 + len, fy),
            MARKER_COLOR,
        );
        draw_line_segment_mut(
            canvas,
            (fx, y as f32 - len),
            (fx, y as f32 + len),
            MARKER_COLOR,
        );
    }
}

async fn cursor_position() -> Result<CursorPosition, DeviceError> {
    let output = run(CLICLICK, ["p:."]).await?;
    parse_position(&output).ok_or_else(|| {
        DeviceError::new(format!("unexpected cursor position {output:?}"))
    })
}

/// Parses the `x,y` pair at the end of cliclick's output.
fn parse_position(output: &str) -> Option<CursorPosition> {
    let pair = output
        .trim()
        .rsplit(|c: char| c.is_whitespace() || c == ':')
        .next()?;
    let (x, y) = pair.split_once(',')?;
    Some(CursorPosition::new(
        x.trim().parse().ok()?,
        y.trim().parse().ok()?,
    ))
}

/// Builds a relative move command, such as `m:+50,+0`.
#[inline]
fn move_argument(direction: Direction, distance: u32) -> String {
    let (dx, dy) = direction.offset(distance);
    format!("m:{dx:+},{dy:+}")
}

async fn run<I, S>(program: &str, args: I) -> Result<String, DeviceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| {
            DeviceError::new(format!("failed to run {program}: {err}"))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeviceError::new(format!(
            "{program} failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        let region: CaptureRegion = "10, 20,300,650".parse().unwrap();
        assert_eq!(
            region,
            CaptureRegion {
                x: 10,
                y: 20,
                width: 300,
                height: 650,
            }
        );
        assert_eq!(region.to_string(), "10,20,300,650");

        let region: CaptureRegion = "-1440,0,320,700".parse().unwrap();
        assert_eq!(region.x, -1440);

        assert!("10,20,300".parse::<CaptureRegion>().is_err());
        assert!("10,20,0,650".parse::<CaptureRegion>().is_err());
        assert!("a,20,300,650".parse::<CaptureRegion>().is_err());
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(
            parse_position("512,384\n"),
            Some(CursorPosition::new(512, 384))
        );
        assert_eq!(
            parse_position("Current mouse position: 12,34"),
            Some(CursorPosition::new(12, 34))
        );
        assert_eq!(parse_position(""), None);
        assert_eq!(parse_position("12;34"), None);
    }

    #[test]
    fn test_move_argument() {
        assert_eq!(move_argument(Direction::Right, 50), "m:+50,+0");
        assert_eq!(move_argument(Direction::Up, 12), "m:+0,-12");
        assert_eq!(move_argument(Direction::Left, 3), "m:-3,+0");
        assert_eq!(move_argument(Direction::Down, 7), "m:+0,+7");
    }

    #[test]
    fn test_cursor_in_region_frame() {
        let region: CaptureRegion = "0,25,320,690".parse().unwrap();
        assert_eq!(
            to_region(CursorPosition::new(100, 400), Some(region)),
            CursorPosition::new(100, 375)
        );
        assert_eq!(
            to_region(CursorPosition::new(100, 400), None),
            CursorPosition::new(100, 400)
        );
    }

    fn encode_blank(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([255, 255, 255]),
        ))
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
        buf
    }

    #[test]
    fn test_annotate_draws_marker() {
        let bytes = encode_blank(80, 60);
        let annotated =
            annotate(&bytes, None, CursorPosition::new(40, 30)).unwrap();
        let image = image::load_from_memory(&annotated).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (80, 60));

        let Rgb([r, g, _]) = *image.get_pixel(40, 30);
        assert!(r > 150 && g < 120, "center is not red: {r}, {g}");
        let Rgb([r, g, b]) = *image.get_pixel(2, 2);
        assert!(r > 200 && g > 200 && b > 200, "corner is not white");
    }

    #[test]
    fn test_annotate_scales_to_region() {
        let bytes = encode_blank(160, 120);
        let region = CaptureRegion {
            x: 10,
            y: 10,
            width: 80,
            height: 60,
        };
        let annotated =
            annotate(&bytes, Some(region), CursorPosition::new(5, 5)).unwrap();
        let image = image::load_from_memory(&annotated).unwrap();
        assert_eq!((image.width(), image.height()), (80, 60));

        let result =
            annotate(b"not an image", None, CursorPosition::new(0, 0));
        assert!(result.is_err());
    }

    #[test]
    fn test_temp_paths_are_unique() {
        assert_ne!(temp_capture_path(), temp_capture_path());
    }
}
