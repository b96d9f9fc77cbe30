//! The image entity.
//!
//! Pixels are an [`image::DynamicImage`]; everything else is the per-image
//! state the options read and write: virtual canvas (`page`), colors synced
//! from settings, animation timing, free-form properties and artifacts.

use crate::color::Color;
use crate::keywords::{
    Channels, Colorspace, Compose, Compression, Dispose, Endian, Filter, Gravity, Interlace,
    Interpolate, Orientation, Units,
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Largest channel value. Pixels are 8 bits per channel.
pub const QUANTUM_RANGE: f64 = 255.0;

/// Virtual canvas geometry: the canvas size and this image's offset on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub width: u32,
    pub height: u32,
    pub x: i64,
    pub y: i64,
}

impl Page {
    pub fn is_unset(&self) -> bool {
        *self == Page::default()
    }
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}{:+}{:+}", self.width, self.height, self.x, self.y)
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    pub pixels: DynamicImage,
    /// Format tag, e.g. `PNG`, `JPEG`, `XC`, `NULL`.
    pub magick: String,
    pub filename: String,
    pub scene: usize,
    pub page: Page,
    /// Set when the image was pinged: dimensions are known but `pixels` is a
    /// placeholder.
    pub ping: bool,
    pub background: Color,
    pub border_color: Color,
    pub matte_color: Color,
    pub transparent_color: Color,
    pub colorspace: Colorspace,
    pub compose: Compose,
    pub compression: Compression,
    pub gravity: Gravity,
    pub interlace: Interlace,
    pub endian: Endian,
    pub orientation: Orientation,
    pub units: Units,
    pub dispose: Dispose,
    pub filter: Filter,
    pub interpolate: Interpolate,
    pub channels: Channels,
    pub depth: u32,
    pub quality: Option<u32>,
    pub density: Option<(f64, f64)>,
    pub delay: u64,
    pub ticks_per_second: u64,
    pub iterations: u64,
    /// Color match tolerance as a `0.0..=1.0` fraction.
    pub fuzz: f64,
    pub taint: bool,
    pub properties: BTreeMap<String, String>,
    pub artifacts: BTreeMap<String, String>,
}

impl Image {
    pub fn new(pixels: DynamicImage) -> Self {
        Self {
            pixels,
            magick: String::new(),
            filename: String::new(),
            scene: 0,
            page: Page::default(),
            ping: false,
            background: Color::WHITE,
            border_color: Color::rgb(0xdf, 0xdf, 0xdf),
            matte_color: Color::rgb(0xbd, 0xbd, 0xbd),
            transparent_color: Color::TRANSPARENT,
            colorspace: Colorspace::default(),
            compose: Compose::default(),
            compression: Compression::default(),
            gravity: Gravity::default(),
            interlace: Interlace::default(),
            endian: Endian::default(),
            orientation: Orientation::default(),
            units: Units::default(),
            dispose: Dispose::default(),
            filter: Filter::default(),
            interpolate: Interpolate::default(),
            channels: Channels::default(),
            depth: 8,
            quality: None,
            density: None,
            delay: 0,
            ticks_per_second: 100,
            iterations: 0,
            fuzz: 0.0,
            taint: false,
            properties: BTreeMap::new(),
            artifacts: BTreeMap::new(),
        }
    }

    /// A `width`x`height` canvas filled with `color`.
    pub fn canvas(width: u32, height: u32, color: Color) -> Self {
        let pixels = RgbaImage::from_pixel(width.max(1), height.max(1), color.to_rgba());
        let mut image = Self::new(DynamicImage::ImageRgba8(pixels));
        image.background = color;
        image
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// The `NULL:` separator image used by `-layers composite`.
    pub fn is_null(&self) -> bool {
        self.magick.eq_ignore_ascii_case("NULL")
    }

    /// Same metadata, new pixels. Marks the result tainted.
    pub fn with_pixels(&self, pixels: DynamicImage) -> Self {
        Self {
            pixels,
            magick: self.magick.clone(),
            filename: self.filename.clone(),
            scene: self.scene,
            page: self.page,
            ping: false,
            background: self.background,
            border_color: self.border_color,
            matte_color: self.matte_color,
            transparent_color: self.transparent_color,
            colorspace: self.colorspace,
            compose: self.compose,
            compression: self.compression,
            gravity: self.gravity,
            interlace: self.interlace,
            endian: self.endian,
            orientation: self.orientation,
            units: self.units,
            dispose: self.dispose,
            filter: self.filter,
            interpolate: self.interpolate,
            channels: self.channels,
            depth: self.depth,
            quality: self.quality,
            density: self.density,
            delay: self.delay,
            ticks_per_second: self.ticks_per_second,
            iterations: self.iterations,
            fuzz: self.fuzz,
            taint: true,
            properties: self.properties.clone(),
            artifacts: self.artifacts.clone(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<String>) {
        self.properties.insert(key.to_string(), value.into());
    }

    /// SHA-256 of the pixel data, hex encoded. Identical pixels give
    /// identical signatures regardless of metadata.
    pub fn signature(&self) -> String {
        let rgba = self.pixels.to_rgba8();
        let mut hasher = Sha256::new();
        hasher.update(rgba.width().to_le_bytes());
        hasher.update(rgba.height().to_le_bytes());
        hasher.update(rgba.as_raw());
        format!("{:x}", hasher.finalize())
    }

    /// Drop profiles, comments and other non-pixel metadata (`-strip`).
    pub fn strip(&mut self) {
        self.properties.clear();
        self.artifacts.retain(|key, _| !key.starts_with("profile:"));
    }

    /// Filename extension, lowercased.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}
