//! The three persistent settings structures and the per-image sync step.
//!
//! [`ImageInfo`] holds image-creation and codec defaults. Besides its typed
//! fields it keeps the raw string of every setting applied (`options`), which
//! is where [`DrawInfo`] and [`QuantizeInfo`] are rebuilt from when a `}`
//! restores an older `ImageInfo`, and where the sync step reads the values it
//! copies onto each image before an operator runs.

use crate::color::{Color, parse_color};
use crate::geometry::{GeometryFlags, parse_geometry, parse_region};
use crate::image::{Image, Page};
use crate::keywords::{
    Channels, Colorspace, Compose, Compression, Direction, Dispose, Dither, Endian, Filter,
    Gravity, ImageType, Interlace, Interpolate, Orientation, Stretch, Style, Units, VirtualPixel,
    parse_weight,
};
use std::collections::BTreeMap;

pub const DEFAULT_BACKGROUND: Color = Color::WHITE;
pub const DEFAULT_BORDER_COLOR: Color = Color::rgb(0xdf, 0xdf, 0xdf);
pub const DEFAULT_MATTE_COLOR: Color = Color::rgb(0xbd, 0xbd, 0xbd);
pub const DEFAULT_POINTSIZE: f64 = 12.0;

// ============================================================================
// ImageInfo
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    options: BTreeMap<String, String>,
    pub adjoin: bool,
    pub antialias: bool,
    pub authenticate: Option<String>,
    pub background: Color,
    pub border_color: Color,
    pub matte_color: Color,
    pub transparent_color: Color,
    pub channels: Channels,
    pub colorspace: Colorspace,
    pub compression: Compression,
    pub debug: bool,
    pub density: Option<String>,
    pub depth: Option<u32>,
    pub dither: bool,
    pub endian: Endian,
    pub extract: Option<String>,
    pub font: Option<String>,
    /// Color match tolerance, `0.0..=1.0`.
    pub fuzz: f64,
    pub image_type: ImageType,
    pub interlace: Interlace,
    pub monitor: bool,
    pub orientation: Orientation,
    pub page: Option<String>,
    pub ping: bool,
    pub pointsize: f64,
    pub quality: Option<u32>,
    pub quiet: bool,
    pub sampling_factor: Option<String>,
    pub scene: usize,
    pub number_scenes: usize,
    pub size: Option<String>,
    pub synchronize: bool,
    pub texture: Option<String>,
    pub units: Units,
    pub verbose: bool,
    pub view: Option<String>,
    pub virtual_pixel: VirtualPixel,
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            options: BTreeMap::new(),
            adjoin: true,
            antialias: true,
            authenticate: None,
            background: DEFAULT_BACKGROUND,
            border_color: DEFAULT_BORDER_COLOR,
            matte_color: DEFAULT_MATTE_COLOR,
            transparent_color: Color::TRANSPARENT,
            channels: Channels::default(),
            colorspace: Colorspace::default(),
            compression: Compression::default(),
            debug: false,
            density: None,
            depth: None,
            dither: true,
            endian: Endian::default(),
            extract: None,
            font: None,
            fuzz: 0.0,
            image_type: ImageType::default(),
            interlace: Interlace::default(),
            monitor: false,
            orientation: Orientation::default(),
            page: None,
            ping: false,
            pointsize: DEFAULT_POINTSIZE,
            quality: None,
            quiet: false,
            sampling_factor: None,
            scene: 0,
            number_scenes: 0,
            size: None,
            synchronize: false,
            texture: None,
            units: Units::default(),
            verbose: false,
            view: None,
            virtual_pixel: VirtualPixel::default(),
        }
    }
}

impl ImageInfo {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn has_option(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    pub fn set_option(&mut self, key: &str, value: impl Into<String>) {
        self.options.insert(key.to_string(), value.into());
    }

    pub fn remove_option(&mut self, key: &str) -> Option<String> {
        self.options.remove(key)
    }

    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse an option through `FromStr`, ignoring values that do not parse.
    pub fn option_as<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.option(key).and_then(|v| v.parse().ok())
    }

    /// `-size` as integer dimensions, if set.
    pub fn size_dimensions(&self) -> Option<(u32, u32)> {
        let region = parse_region(self.size.as_deref()?).ok()?;
        let width = region.width?;
        let height = region.height.unwrap_or(width);
        Some((width as u32, height as u32))
    }
}

/// `-fuzz` amounts: `10%` or an absolute 8-bit distance.
pub fn parse_fuzz(text: &str) -> Option<f64> {
    let text = text.trim();
    let fraction = match text.strip_suffix('%') {
        Some(p) => p.parse::<f64>().ok()? / 100.0,
        None => text.parse::<f64>().ok()? / 255.0,
    };
    Some(fraction.clamp(0.0, 1.0))
}

// ============================================================================
// DrawInfo
// ============================================================================

/// Annotation and drawing defaults.
#[derive(Debug, Clone)]
pub struct DrawInfo {
    pub affine: [f64; 6],
    pub antialias: bool,
    pub text_antialias: bool,
    pub border_color: Color,
    pub compose: Compose,
    pub direction: Direction,
    pub encoding: Option<String>,
    pub family: Option<String>,
    pub fill: Color,
    /// Set when `-fill` named an image instead of a color.
    pub fill_pattern: Option<Image>,
    pub font: Option<String>,
    pub gravity: Gravity,
    pub interline_spacing: f64,
    pub interword_spacing: f64,
    pub kerning: f64,
    pub pointsize: f64,
    pub render: bool,
    pub stretch: Stretch,
    pub stroke: Color,
    pub stroke_pattern: Option<Image>,
    pub stroke_width: f64,
    pub style: Style,
    pub undercolor: Color,
    pub weight: u32,
}

pub const IDENTITY_AFFINE: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

impl Default for DrawInfo {
    fn default() -> Self {
        Self {
            affine: IDENTITY_AFFINE,
            antialias: true,
            text_antialias: true,
            border_color: DEFAULT_BORDER_COLOR,
            compose: Compose::Over,
            direction: Direction::default(),
            encoding: None,
            family: None,
            fill: Color::BLACK,
            fill_pattern: None,
            font: None,
            gravity: Gravity::default(),
            interline_spacing: 0.0,
            interword_spacing: 0.0,
            kerning: 0.0,
            pointsize: DEFAULT_POINTSIZE,
            render: true,
            stretch: Stretch::default(),
            stroke: Color::TRANSPARENT,
            stroke_pattern: None,
            stroke_width: 1.0,
            style: Style::default(),
            undercolor: Color::TRANSPARENT,
            weight: 400,
        }
    }
}

impl DrawInfo {
    /// Derive drawing defaults from an `ImageInfo`.
    ///
    /// Pattern images are not part of `ImageInfo`, so a `-fill` that named an
    /// image leaves `fill_pattern` empty here.
    pub fn from_image_info(info: &ImageInfo) -> Self {
        let mut draw = DrawInfo {
            antialias: info.antialias,
            text_antialias: info.antialias,
            border_color: info.border_color,
            font: info.font.clone(),
            pointsize: info.pointsize,
            ..DrawInfo::default()
        };
        if let Some(affine) = info.option("affine").and_then(parse_affine) {
            draw.affine = affine;
        }
        if let Some(v) = info.option_as("compose") {
            draw.compose = v;
        }
        if let Some(v) = info.option_as("direction") {
            draw.direction = v;
        }
        draw.encoding = info.option("encoding").map(str::to_string);
        draw.family = info.option("family").map(str::to_string);
        if let Some(c) = info.option("fill").and_then(|v| parse_color(v).ok()) {
            draw.fill = c;
        }
        if let Some(v) = info.option_as("gravity") {
            draw.gravity = v;
        }
        if let Some(v) = info.option_as("interline-spacing") {
            draw.interline_spacing = v;
        }
        if let Some(v) = info.option_as("interword-spacing") {
            draw.interword_spacing = v;
        }
        if let Some(v) = info.option_as("kerning") {
            draw.kerning = v;
        }
        if let Some(v) = info.option_as("stretch") {
            draw.stretch = v;
        }
        if let Some(c) = info.option("stroke").and_then(|v| parse_color(v).ok()) {
            draw.stroke = c;
        }
        if let Some(v) = info.option_as("strokewidth") {
            draw.stroke_width = v;
        }
        if let Some(v) = info.option_as("style") {
            draw.style = v;
        }
        if let Some(c) = info.option("undercolor").and_then(|v| parse_color(v).ok()) {
            draw.undercolor = c;
        }
        if let Some(w) = info.option("weight").and_then(|v| parse_weight(v, 400)) {
            draw.weight = w;
        }
        draw
    }
}

/// Six comma or space separated numbers: `sx,rx,ry,sy,tx,ty`.
pub fn parse_affine(text: &str) -> Option<[f64; 6]> {
    let values: Vec<f64> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect::<Option<_>>()?;
    values.try_into().ok()
}

// ============================================================================
// QuantizeInfo
// ============================================================================

/// Color-reduction defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizeInfo {
    pub number_colors: usize,
    pub tree_depth: usize,
    pub dither: bool,
    pub dither_method: Dither,
    pub colorspace: Option<Colorspace>,
    pub measure_error: bool,
}

impl Default for QuantizeInfo {
    fn default() -> Self {
        Self {
            number_colors: 256,
            tree_depth: 0,
            dither: true,
            dither_method: Dither::default(),
            colorspace: None,
            measure_error: false,
        }
    }
}

impl QuantizeInfo {
    pub fn from_image_info(info: &ImageInfo) -> Self {
        let mut quantize = QuantizeInfo {
            dither: info.dither,
            measure_error: info.verbose,
            ..QuantizeInfo::default()
        };
        if let Some(method) = info.option_as::<Dither>("dither") {
            quantize.dither_method = method;
            quantize.dither = method != Dither::None;
        }
        quantize.colorspace = info.option_as("quantize");
        if let Some(depth) = info.option_as("treedepth") {
            quantize.tree_depth = depth;
        }
        quantize
    }
}

// ============================================================================
// Per-image sync
// ============================================================================

/// Copy the current settings onto `image` so per-image attributes reflect the
/// latest global defaults. Runs before every simple and list operator.
pub fn sync_image_settings(info: &ImageInfo, image: &mut Image) {
    image.background = info.background;
    image.border_color = info.border_color;
    image.matte_color = info.matte_color;
    image.transparent_color = info.transparent_color;
    image.channels = info.channels;
    image.fuzz = info.fuzz;
    if info.compression != Compression::Undefined {
        image.compression = info.compression;
    }
    if info.endian != Endian::Undefined {
        image.endian = info.endian;
    }
    if info.interlace != Interlace::Undefined {
        image.interlace = info.interlace;
    }
    if info.orientation != Orientation::Undefined {
        image.orientation = info.orientation;
    }
    if info.units != Units::Undefined {
        image.units = info.units;
    }
    if let Some(depth) = info.depth {
        image.depth = depth;
    }
    if let Some(quality) = info.quality {
        image.quality = Some(quality);
    }
    if let Some(density) = info.density.as_deref().and_then(parse_density) {
        image.density = Some(density);
    }
    if let Some(page) = info.page.as_deref().and_then(parse_page) {
        image.page = page;
    }
    if let Some(v) = info.option_as::<Compose>("compose") {
        image.compose = v;
    }
    if let Some(v) = info.option_as::<Gravity>("gravity") {
        image.gravity = v;
    }
    if let Some(v) = info.option_as::<Dispose>("dispose") {
        image.dispose = v;
    }
    if let Some(v) = info.option_as::<Filter>("filter") {
        image.filter = v;
    }
    if let Some(v) = info.option_as::<Interpolate>("interpolate") {
        image.interpolate = v;
    }
    if let Some(v) = info.option_as::<u64>("loop") {
        image.iterations = v;
    }
    if let Some(delay) = info.option("delay").and_then(|d| parse_geometry(d).ok()) {
        image.delay = delay.rho.max(0.0) as u64;
        if delay.has(GeometryFlags::SIGMA) && delay.sigma > 0.0 {
            image.ticks_per_second = delay.sigma as u64;
        }
    }
}

/// `-density 72` or `-density 72x96`.
pub fn parse_density(text: &str) -> Option<(f64, f64)> {
    let g = parse_geometry(text).ok()?;
    Some((g.rho, g.sigma_or(g.rho)))
}

/// A canonical `WxH` / `WxH+X+Y` page string.
pub fn parse_page(text: &str) -> Option<Page> {
    let region = parse_region(text).ok()?;
    Some(Page {
        width: region.width.unwrap_or(0.0) as u32,
        height: region.height.or(region.width).unwrap_or(0.0) as u32,
        x: region.x,
        y: region.y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_info_defaults() {
        let info = ImageInfo::default();
        assert!(info.adjoin);
        assert_eq!(info.background, Color::WHITE);
        assert_eq!(info.border_color, Color::rgb(0xdf, 0xdf, 0xdf));
        assert_eq!(info.matte_color, Color::rgb(0xbd, 0xbd, 0xbd));
        assert!(info.option("anything").is_none());
    }

    #[test]
    fn clone_is_independent() {
        let mut outer = ImageInfo::default();
        outer.set_option("gravity", "North");
        let mut inner = outer.clone();
        inner.set_option("gravity", "South");
        inner.adjoin = false;
        assert_eq!(outer.option("gravity"), Some("North"));
        assert!(outer.adjoin);
    }

    #[test]
    fn draw_info_rebuilds_from_options() {
        let mut info = ImageInfo::default();
        info.set_option("fill", "red");
        info.set_option("stroke", "#00f");
        info.set_option("strokewidth", "3");
        info.set_option("gravity", "Center");
        info.set_option("weight", "bold");
        info.pointsize = 20.0;
        let draw = DrawInfo::from_image_info(&info);
        assert_eq!(draw.fill, Color::rgb(255, 0, 0));
        assert_eq!(draw.stroke, Color::rgb(0, 0, 255));
        assert_eq!(draw.stroke_width, 3.0);
        assert_eq!(draw.gravity, Gravity::Center);
        assert_eq!(draw.weight, 700);
        assert_eq!(draw.pointsize, 20.0);
    }

    #[test]
    fn quantize_info_rebuilds_from_options() {
        let mut info = ImageInfo::default();
        info.set_option("dither", "None");
        info.set_option("treedepth", "4");
        let q = QuantizeInfo::from_image_info(&info);
        assert!(!q.dither);
        assert_eq!(q.tree_depth, 4);
    }

    #[test]
    fn sync_copies_settings_to_image() {
        let mut info = ImageInfo::default();
        info.background = Color::rgb(1, 2, 3);
        info.depth = Some(16);
        info.page = Some("100x50+5+6".into());
        info.set_option("delay", "20x50");
        info.set_option("gravity", "East");
        let mut image = Image::canvas(2, 2, Color::WHITE);
        sync_image_settings(&info, &mut image);
        assert_eq!(image.background, Color::rgb(1, 2, 3));
        assert_eq!(image.depth, 16);
        assert_eq!(
            image.page,
            Page {
                width: 100,
                height: 50,
                x: 5,
                y: 6
            }
        );
        assert_eq!(image.delay, 20);
        assert_eq!(image.ticks_per_second, 50);
        assert_eq!(image.gravity, Gravity::East);
    }

    #[test]
    fn fuzz_forms() {
        assert_eq!(parse_fuzz("10%"), Some(0.1));
        assert_eq!(parse_fuzz("255"), Some(1.0));
        assert_eq!(parse_fuzz("x"), None);
    }

    #[test]
    fn affine_needs_six_values() {
        assert_eq!(parse_affine("1,0,0,1,5,6"), Some([1.0, 0.0, 0.0, 1.0, 5.0, 6.0]));
        assert_eq!(parse_affine("1 0 0 1"), None);
    }
}
