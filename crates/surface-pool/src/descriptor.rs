//! Surface descriptors: what every surface in a given pool looks like.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pixel layout of a pooled surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SurfaceFormat {
    /// 32-bit BGRA with alpha.
    B8G8R8A8,
    /// 32-bit BGR with an unused padding byte.
    B8G8R8X8,
    /// 32-bit RGBA with alpha.
    R8G8B8A8,
    /// 32-bit RGB with an unused padding byte.
    R8G8B8X8,
    /// 16-bit packed RGB.
    R5G6B5,
    /// 8-bit alpha mask.
    A8,
}

impl SurfaceFormat {
    /// Bytes occupied by a single pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::B8G8R8A8 | Self::B8G8R8X8 | Self::R8G8B8A8 | Self::R8G8B8X8 => 4,
            Self::R5G6B5 => 2,
            Self::A8 => 1,
        }
    }

    /// Whether the format carries an alpha channel.
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::B8G8R8A8 | Self::R8G8B8A8 | Self::A8)
    }
}

impl std::fmt::Display for SurfaceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::B8G8R8A8 => "B8G8R8A8",
            Self::B8G8R8X8 => "B8G8R8X8",
            Self::R8G8B8A8 => "R8G8B8A8",
            Self::R8G8B8X8 => "R8G8B8X8",
            Self::R5G6B5 => "R5G6B5",
            Self::A8 => "A8",
        };
        f.write_str(name)
    }
}

/// Integer pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurfaceSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl SurfaceSize {
    /// Create a size from width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Immutable description shared by every surface of one pool.
///
/// Pools are keyed by descriptor: two requests with the same format and
/// size are served from the same pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurfaceDescriptor {
    /// Pixel format.
    pub format: SurfaceFormat,
    /// Pixel dimensions.
    pub size: SurfaceSize,
}

impl SurfaceDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub const fn new(format: SurfaceFormat, size: SurfaceSize) -> Self {
        Self { format, size }
    }

    /// Bytes a tightly packed surface of this shape occupies.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.size.width as usize * self.size.height as usize * self.format.bytes_per_pixel()
    }
}

impl std::fmt::Display for SurfaceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.format, self.size)
    }
}
