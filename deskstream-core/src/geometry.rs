//! Frame geometry value types
//!
//! Sizes, positions, scale specifications and frame rates, together with the
//! pure transforms used to negotiate the encode size from the capture size.

use serde::{Deserialize, Serialize};
use std::ops::Sub;

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameSize {
    /// Create a new size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Apply a scale specification
    ///
    /// Ratios truncate toward zero and saturate at `u32::MAX`; an absolute
    /// scale replaces the size.
    pub fn scaled(&self, scale: &FrameScale) -> Self {
        match *scale {
            FrameScale::Ratio { num, den } if den > 0 => {
                let apply = |dim: u32| {
                    (dim as u64 * num as u64 / den as u64).min(u32::MAX as u64) as u32
                };
                Self {
                    width: apply(self.width),
                    height: apply(self.height),
                }
            }
            FrameScale::Ratio { .. } | FrameScale::None => *self,
            FrameScale::Absolute(size) => size,
        }
    }

    /// Round both dimensions down to a multiple of `align`
    ///
    /// `align` is rounded up to the next power of two first.
    pub fn aligned(&self, align: u32) -> Self {
        let mask = match align.max(1).checked_next_power_of_two() {
            Some(step) => step - 1,
            None => u32::MAX,
        };
        Self {
            width: self.width & !mask,
            height: self.height & !mask,
        }
    }

    /// Clamp to the `[min, max]` box
    ///
    /// The clamp is all-or-nothing: if either dimension is below `min` the
    /// result is exactly `min`, if either exceeds `max` it is exactly `max`.
    pub fn bounded(&self, min: FrameSize, max: FrameSize) -> Self {
        if self.width < min.width || self.height < min.height {
            return min;
        }
        if self.width > max.width || self.height > max.height {
            return max;
        }
        *self
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for FrameSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("Invalid size '{}', expected WxH", s))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| format!("Invalid width in '{}'", s))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| format!("Invalid height in '{}'", s))?;
        Ok(Self { width, height })
    }
}

/// Signed placement on a surface
///
/// A negative coordinate counts from the far edge, see [`FramePos::anchored`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FramePos {
    pub x: i32,
    pub y: i32,
}

impl FramePos {
    /// Create a new position
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Resolve far-edge coordinates for an `inner` box placed within `outer`
    pub fn anchored(&self, outer: FrameSize, inner: FrameSize) -> Self {
        let resolve = |coord: i32, outer: u32, inner: u32| {
            if coord < 0 {
                outer as i32 - inner as i32 + coord
            } else {
                coord
            }
        };
        Self {
            x: resolve(self.x, outer.width, inner.width),
            y: resolve(self.y, outer.height, inner.height),
        }
    }
}

impl Sub for FramePos {
    type Output = FramePos;

    fn sub(self, rhs: FramePos) -> FramePos {
        FramePos {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// How the capture size is turned into the encode size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameScale {
    /// Keep the capture size
    #[default]
    None,
    /// Multiply both dimensions by `num / den`
    Ratio { num: u32, den: u32 },
    /// Replace the size outright
    Absolute(FrameSize),
}

impl FrameScale {
    /// Build a scale from raw parts
    ///
    /// A ratio is used if either of its parts is set, otherwise an absolute
    /// size if either dimension is set, otherwise no scaling.
    pub fn from_parts(num: u32, den: u32, width: u32, height: u32) -> Self {
        if num > 0 || den > 0 {
            Self::Ratio { num, den }
        } else if width > 0 || height > 0 {
            Self::Absolute(FrameSize::new(width, height))
        } else {
            Self::None
        }
    }
}

impl std::fmt::Display for FrameScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Ratio { num, den } => write!(f, "{}/{}", num, den),
            Self::Absolute(size) => write!(f, "{}", size),
        }
    }
}

impl std::str::FromStr for FrameScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(Self::None);
        }
        if let Some((n, d)) = s.split_once('/') {
            let num: u32 = n.trim().parse().unwrap_or(0);
            let den: u32 = d.trim().parse().unwrap_or(0);
            if num == 0 || den == 0 {
                return Err(format!("Invalid scale '{}' in format N/D", s));
            }
            return Ok(Self::Ratio { num, den });
        }
        if s.contains(['x', 'X']) {
            let size: FrameSize = s
                .parse()
                .map_err(|_| format!("Invalid scale '{}' in format WxH", s))?;
            if size.is_empty() {
                return Err(format!("Invalid scale '{}' in format WxH", s));
            }
            return Ok(Self::Absolute(size));
        }
        Err(format!("Invalid scale '{}', expected N/D or WxH", s))
    }
}

impl Serialize for FrameScale {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameScale {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Highest supported capture rate in frames per second
pub const MAX_FPS: u32 = 50;

/// Rational frame rate, 1 to 50 fps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    /// Create a validated frame rate reduced to lowest terms
    pub fn new(num: u32, den: u32) -> Result<Self, String> {
        if num == 0 || den == 0 || num < den || num as u64 > MAX_FPS as u64 * den as u64 {
            return Err(format!(
                "Invalid frame rate {}/{}, must be between 1 and {} fps",
                num, den, MAX_FPS
            ));
        }
        let divisor = gcd(num, den);
        Ok(Self {
            num: num / divisor,
            den: den / divisor,
        })
    }

    /// Create a whole-number frame rate
    pub fn fps(fps: u32) -> Result<Self, String> {
        Self::new(fps, 1)
    }

    /// Numerator
    pub fn num(&self) -> u32 {
        self.num
    }

    /// Denominator
    pub fn den(&self) -> u32 {
        self.den
    }

    /// Time between frames
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(1_000_000_000u64 * self.den as u64 / self.num as u64)
    }

    /// Frames per second as a float, for display
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 5, den: 1 }
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl std::str::FromStr for FrameRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (n, d) = s.split_once('/').unwrap_or((s, "1"));
        let num = n
            .trim()
            .parse()
            .map_err(|_| format!("Invalid frame rate '{}'", s))?;
        let den = d
            .trim()
            .parse()
            .map_err(|_| format!("Invalid frame rate '{}'", s))?;
        Self::new(num, den)
    }
}

impl Serialize for FrameRate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameRate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Whole(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Whole(fps) => FrameRate::fps(fps),
            Raw::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: FrameSize = FrameSize::new(320, 200);
    const MAX: FrameSize = FrameSize::new(1920, 1080);

    #[test]
    fn test_bounded_inside_is_identity() {
        for size in [MIN, MAX, FrameSize::new(1280, 720), FrameSize::new(320, 1080)] {
            assert_eq!(size.bounded(MIN, MAX), size);
        }
    }

    #[test]
    fn test_bounded_clamps_whole_box() {
        // One small axis is enough to snap both fields to the minimum
        assert_eq!(FrameSize::new(1900, 100).bounded(MIN, MAX), MIN);
        assert_eq!(FrameSize::new(100, 1000).bounded(MIN, MAX), MIN);
        assert_eq!(FrameSize::new(2560, 400).bounded(MIN, MAX), MAX);
        assert_eq!(FrameSize::new(400, 1440).bounded(MIN, MAX), MAX);
    }

    #[test]
    fn test_aligned_rounds_down_to_power_of_two() {
        assert_eq!(FrameSize::new(1933, 1087).aligned(4), FrameSize::new(1932, 1084));
        assert_eq!(FrameSize::new(1280, 720).aligned(4), FrameSize::new(1280, 720));
        // 3 behaves as 4, 5 behaves as 8
        assert_eq!(FrameSize::new(1933, 1087).aligned(3), FrameSize::new(1932, 1084));
        assert_eq!(FrameSize::new(1933, 1087).aligned(5), FrameSize::new(1928, 1080));
        assert_eq!(FrameSize::new(7, 9).aligned(0), FrameSize::new(7, 9));
    }

    #[test]
    fn test_aligned_never_grows() {
        for align in 1..=64u32 {
            let step = align.next_power_of_two();
            for (w, h) in [(1, 1), (17, 33), (1366, 768), (1933, 1087), (4095, 2161)] {
                let size = FrameSize::new(w, h).aligned(align);
                assert!(size.width <= w && size.height <= h);
                assert_eq!(size.width % step, 0);
                assert_eq!(size.height % step, 0);
            }
        }
    }

    #[test]
    fn test_scaled() {
        let size = FrameSize::new(1920, 1080);
        assert_eq!(size.scaled(&FrameScale::None), size);
        assert_eq!(
            size.scaled(&FrameScale::Ratio { num: 1, den: 2 }),
            FrameSize::new(960, 540)
        );
        assert_eq!(
            FrameSize::new(1366, 768).scaled(&FrameScale::Ratio { num: 2, den: 3 }),
            FrameSize::new(910, 512)
        );
        assert_eq!(
            size.scaled(&FrameScale::Absolute(FrameSize::new(800, 600))),
            FrameSize::new(800, 600)
        );
    }

    #[test]
    fn test_scaled_saturates_huge_ratios() {
        let huge = FrameScale::Ratio {
            num: u32::MAX,
            den: 1,
        };
        let size = FrameSize::new(1920, 1080).scaled(&huge);
        assert_eq!(size, FrameSize::new(u32::MAX, u32::MAX));
        assert_eq!(size.bounded(MIN, MAX), MAX);
    }

    #[test]
    fn test_from_parts_prefers_ratio() {
        assert_eq!(
            FrameScale::from_parts(0, 0, 640, 480),
            FrameScale::Absolute(FrameSize::new(640, 480))
        );
        assert_eq!(
            FrameScale::from_parts(1, 2, 640, 480),
            FrameScale::Ratio { num: 1, den: 2 }
        );
        assert_eq!(FrameScale::from_parts(0, 0, 0, 0), FrameScale::None);
        for (w, h) in [(1, 1), (3840, 2160), (333, 777)] {
            let scale = FrameScale::from_parts(0, 0, 640, 480);
            assert_eq!(FrameSize::new(w, h).scaled(&scale), FrameSize::new(640, 480));
        }
    }

    #[test]
    fn test_scale_parsing() {
        assert_eq!("1/2".parse(), Ok(FrameScale::Ratio { num: 1, den: 2 }));
        assert_eq!(
            "1280x720".parse(),
            Ok(FrameScale::Absolute(FrameSize::new(1280, 720)))
        );
        assert_eq!("none".parse(), Ok(FrameScale::None));
        assert!("0/2".parse::<FrameScale>().is_err());
        assert!("0x720".parse::<FrameScale>().is_err());
        assert!("half".parse::<FrameScale>().is_err());
    }

    #[test]
    fn test_frame_rate_validation() {
        assert!(FrameRate::new(1, 1).is_ok());
        assert!(FrameRate::new(50, 1).is_ok());
        assert!(FrameRate::new(51, 1).is_err());
        assert!(FrameRate::new(1, 2).is_err());
        assert!(FrameRate::new(0, 1).is_err());
        assert!(FrameRate::new(5, 0).is_err());

        let rate = FrameRate::new(30, 2).unwrap();
        assert_eq!((rate.num(), rate.den()), (15, 1));
        let rate: FrameRate = "30000/1001".parse().unwrap();
        assert_eq!((rate.num(), rate.den()), (30000, 1001));
    }

    #[test]
    fn test_anchored() {
        let outer = FrameSize::new(1920, 1080);
        let inner = FrameSize::new(200, 100);
        assert_eq!(FramePos::new(12, 12).anchored(outer, inner), FramePos::new(12, 12));
        assert_eq!(
            FramePos::new(-12, -12).anchored(outer, inner),
            FramePos::new(1708, 968)
        );
    }
}
