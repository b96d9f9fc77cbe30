//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, BMP) | `image::ImageReader` |
//! | Decode animated GIF | `image::codecs::gif::GifDecoder` frames |
//! | Directory reads | `walkdir`, sorted by file name |
//! | Resize family | `image::imageops` filters |
//! | Blur / sharpen / edge | `DynamicImage::blur`, `unsharpen`, `filter3x3` |
//! | Per-pixel maps (level, gamma, evaluate...) | local helpers over `RgbaImage` |
//! | Sequence ops (evaluate-sequence, morph, remap) | `rayon` over rows |
//! | Encode | `image` encoders, `GifEncoder` for multi-frame GIF |
//!
//! Operations without a pure Rust implementation here (text rendering,
//! distortions, FFT...) return [`BackendError::Unsupported`].

use super::backend::{BackendError, FormatInfo, ImageBackend, Outcome};
use super::calculations::{Rect, layer_bounds};
use super::params::{
    BlurKind, ListTransform, ReadParams, ResizeMethod, SparsePoint, Transform, WriteParams,
};
use crate::color::{Color, parse_color};
use crate::image::{Image, Page};
use crate::keywords::{
    AlphaChannel, Channels, Colorspace, Compose, EvaluateOp, Filter, ImageType, LayerMethod,
    SparseColorMethod, StatisticType,
};
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{
    AnimationDecoder, Delay, DynamicImage, Frame, ImageFormat, ImageReader, Rgba, RgbaImage,
};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Extensions whose coders are compiled in.
const FORMAT_CANDIDATES: &[(&str, ImageFormat, &str)] = &[
    ("jpg", ImageFormat::Jpeg, "Joint Photographic Experts Group"),
    ("jpeg", ImageFormat::Jpeg, "Joint Photographic Experts Group"),
    ("png", ImageFormat::Png, "Portable Network Graphics"),
    ("tif", ImageFormat::Tiff, "Tagged Image File Format"),
    ("tiff", ImageFormat::Tiff, "Tagged Image File Format"),
    ("webp", ImageFormat::WebP, "WebP"),
    ("gif", ImageFormat::Gif, "CompuServe Graphics Interchange Format"),
    ("bmp", ImageFormat::Bmp, "Microsoft Windows bitmap"),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    FORMAT_CANDIDATES
        .iter()
        .filter(|(_, fmt, _)| fmt.reading_enabled())
        .map(|(ext, _, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported(what: &str) -> BackendError {
    BackendError::Unsupported(what.to_string())
}

fn failed(what: impl std::fmt::Display) -> BackendError {
    BackendError::ProcessingFailed(what.to_string())
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| supported_input_extensions().contains(&e.to_ascii_lowercase().as_str()))
}

// =============================================================================
// Reading
// =============================================================================

/// Pseudo image sources: `xc:color`, `canvas:color`, `null:`.
fn read_pseudo(params: &ReadParams) -> Option<Result<Image, BackendError>> {
    let (prefix, rest) = params.source.split_once(':')?;
    let prefix = prefix.to_ascii_lowercase();
    match prefix.as_str() {
        "xc" | "canvas" => {
            let color = if rest.is_empty() {
                Ok(params.background)
            } else {
                parse_color(rest).map_err(failed)
            };
            Some(color.map(|color| {
                let (w, h) = params.size.unwrap_or((1, 1));
                let mut image = Image::canvas(w, h, color);
                image.magick = "XC".into();
                image.filename = params.source.clone();
                image
            }))
        }
        "null" => {
            let mut image = Image::canvas(1, 1, Color::TRANSPARENT);
            image.magick = "NULL".into();
            image.filename = params.source.clone();
            Some(Ok(image))
        }
        _ => None,
    }
}

fn format_name(path: &Path) -> String {
    ImageFormat::from_path(path)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("unknown")
        .to_ascii_uppercase()
}

fn tagged(pixels: DynamicImage, path: &Path) -> Image {
    let mut image = Image::new(pixels);
    image.magick = format_name(path);
    image.filename = path.to_string_lossy().into_owned();
    image
}

/// Decode every frame of a file. Pings only read the header.
fn read_file(path: &Path, ping: bool) -> Result<Vec<Image>, BackendError> {
    if ping {
        let (w, h) = image::image_dimensions(path).map_err(|e| {
            failed(format!("Failed to read dimensions of {}: {e}", path.display()))
        })?;
        let mut image = tagged(DynamicImage::new_luma8(w, h), path);
        image.ping = true;
        return Ok(vec![image]);
    }

    if ImageFormat::from_path(path).ok() == Some(ImageFormat::Gif) {
        let file = std::fs::File::open(path)?;
        let decoder = GifDecoder::new(BufReader::new(file))
            .map_err(|e| failed(format!("Failed to decode {}: {e}", path.display())))?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| failed(format!("Failed to decode {}: {e}", path.display())))?;
        return Ok(frames
            .into_iter()
            .enumerate()
            .map(|(scene, frame)| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let (left, top) = (frame.left(), frame.top());
                let mut image = tagged(DynamicImage::ImageRgba8(frame.into_buffer()), path);
                image.scene = scene;
                // centiseconds at the default 100 ticks per second
                image.delay = (numer as u64 / denom.max(1) as u64) / 10;
                image.page.x = left as i64;
                image.page.y = top as i64;
                image
            })
            .collect());
    }

    let pixels = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| failed(format!("Failed to decode {}: {e}", path.display())))?;
    Ok(vec![tagged(pixels, path)])
}

/// Every supported file under `dir`, in path order.
fn read_directory(dir: &Path, ping: bool) -> Result<Vec<Image>, BackendError> {
    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && has_supported_extension(e.path()))
    {
        images.extend(read_file(entry.path(), ping)?);
    }
    Ok(images)
}

// =============================================================================
// Writing
// =============================================================================

fn output_format(destination: &str) -> Result<ImageFormat, BackendError> {
    ImageFormat::from_path(destination)
        .map_err(|_| failed(format!("Unsupported output format: {destination}")))
}

/// `out.png` → `out-3.png` for the 4th image of a non-adjoined write.
fn numbered(destination: &str, index: usize) -> String {
    let path = Path::new(destination);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}-{index}.{ext}"),
        None => format!("{stem}-{index}"),
    };
    path.with_file_name(name).to_string_lossy().into_owned()
}

fn save_one(image: &Image, destination: &str, quality: Option<u32>) -> Result<(), BackendError> {
    let format = output_format(destination)?;
    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(destination)?;
            let writer = std::io::BufWriter::new(file);
            let q = quality.or(image.quality).unwrap_or(92).clamp(1, 100) as u8;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, q);
            DynamicImage::ImageRgb8(image.pixels.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|e| failed(format!("JPEG encode failed: {e}")))
        }
        other => image
            .pixels
            .save_with_format(destination, other)
            .map_err(|e| failed(format!("Failed to write {destination}: {e}"))),
    }
}

fn save_gif(images: &[Image], destination: &str) -> Result<(), BackendError> {
    let file = std::fs::File::create(destination)?;
    let mut encoder = GifEncoder::new(std::io::BufWriter::new(file));
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| failed(format!("GIF encode failed: {e}")))?;
    let frames = images.iter().map(|image| {
        let ms = (image.delay * 1000 / image.ticks_per_second.max(1)) as u32;
        Frame::from_parts(
            image.pixels.to_rgba8(),
            image.page.x.max(0) as u32,
            image.page.y.max(0) as u32,
            Delay::from_numer_denom_ms(ms, 1),
        )
    });
    encoder
        .encode_frames(frames)
        .map_err(|e| failed(format!("GIF encode failed: {e}")))
}

// =============================================================================
// Pixel helpers
// =============================================================================

/// Channels a per-pixel map touches: the selection, without alpha unless
/// alpha was asked for explicitly.
fn value_channels(image: &Image) -> Vec<usize> {
    if image.channels == Channels::ALL {
        vec![0, 1, 2]
    } else {
        image.channels.indexes()
    }
}

/// Apply `f` to every selected channel value.
fn map_values(image: &Image, f: impl Fn(f64) -> f64 + Sync) -> Image {
    let channels = value_channels(image);
    let mut rgba = image.pixels.to_rgba8();
    let lut: Vec<u8> = (0..=255u8)
        .map(|v| (f(v as f64 / 255.0) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    for px in rgba.pixels_mut() {
        for &c in &channels {
            px.0[c] = lut[px.0[c] as usize];
        }
    }
    image.with_pixels(DynamicImage::ImageRgba8(rgba))
}

/// Apply `f` to every pixel.
fn map_pixels(image: &Image, f: impl Fn(Rgba<u8>) -> Rgba<u8>) -> Image {
    let mut rgba = image.pixels.to_rgba8();
    for px in rgba.pixels_mut() {
        *px = f(*px);
    }
    image.with_pixels(DynamicImage::ImageRgba8(rgba))
}

/// Linear map of `black..white` (quantum units) onto the full range.
fn level(image: &Image, black: f64, white: f64, gamma: f64, invert: bool) -> Image {
    let (b, w) = (black / 255.0, white / 255.0);
    let span = (w - b).abs().max(f64::EPSILON);
    let gamma = if gamma <= 0.0 { 1.0 } else { gamma };
    map_values(image, |v| {
        if invert {
            b + v.powf(gamma) * (w - b)
        } else {
            ((v - b) / span).clamp(0.0, 1.0).powf(1.0 / gamma)
        }
    })
}

fn luma(px: Rgba<u8>) -> f64 {
    0.2126 * px.0[0] as f64 + 0.7152 * px.0[1] as f64 + 0.0722 * px.0[2] as f64
}

/// Darkest and brightest luma values after discarding `black` and `white`
/// pixel counts from each end of the histogram.
fn histogram_bounds(image: &Image, black: f64, white: f64) -> (f64, f64) {
    let rgba = image.pixels.to_rgba8();
    let mut histogram = [0u64; 256];
    for px in rgba.pixels() {
        histogram[luma(*px).round() as usize] += 1;
    }
    let mut low = 0usize;
    let mut seen = 0u64;
    while low < 255 && (seen + histogram[low]) as f64 <= black {
        seen += histogram[low];
        low += 1;
    }
    let mut high = 255usize;
    seen = 0;
    while high > low && (seen + histogram[high]) as f64 <= white {
        seen += histogram[high];
        high -= 1;
    }
    (low as f64, high as f64)
}

fn channel_bounds(image: &Image) -> (f64, f64) {
    let channels = value_channels(image);
    let rgba = image.pixels.to_rgba8();
    let mut min = 255u8;
    let mut max = 0u8;
    for px in rgba.pixels() {
        for &c in &channels {
            min = min.min(px.0[c]);
            max = max.max(px.0[c]);
        }
    }
    (min as f64, max as f64)
}

fn to_filter(filter: Filter) -> FilterType {
    match filter {
        Filter::Point | Filter::Box => FilterType::Nearest,
        Filter::Triangle | Filter::Hermite => FilterType::Triangle,
        Filter::Catrom | Filter::Cubic | Filter::Mitchell => FilterType::CatmullRom,
        Filter::Gaussian | Filter::Quadratic => FilterType::Gaussian,
        _ => FilterType::Lanczos3,
    }
}

fn rgb_to_hsl(px: Rgba<u8>) -> (f64, f64, f64) {
    let [r, g, b, _] = px.0.map(|v| v as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let sector = if max == r {
        ((g - b) / d).rem_euclid(6.0)
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (sector / 6.0, s, l)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64, alpha: u8) -> Rgba<u8> {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h.rem_euclid(1.0) * 6.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let q = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([q(r), q(g), q(b), alpha])
}

fn evaluate(op: EvaluateOp, v: f64, arg: f64) -> f64 {
    match op {
        EvaluateOp::Add => v + arg,
        EvaluateOp::Subtract => v - arg,
        EvaluateOp::Multiply => v * arg,
        EvaluateOp::Divide => {
            if arg == 0.0 {
                v
            } else {
                v / arg
            }
        }
        EvaluateOp::Abs => (v + arg).abs(),
        EvaluateOp::Max => v.max(arg),
        EvaluateOp::Min => v.min(arg),
        EvaluateOp::Set => arg,
        EvaluateOp::Pow => v.powf(arg / 255.0),
        EvaluateOp::And => ((v as u32) & (arg as u32)) as f64,
        EvaluateOp::Or => ((v as u32) | (arg as u32)) as f64,
        EvaluateOp::Xor => ((v as u32) ^ (arg as u32)) as f64,
        EvaluateOp::Mean | EvaluateOp::Median => (v + arg) / 2.0,
    }
}

/// Blend one source pixel over a destination pixel.
fn compose_pixel(op: Compose, dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let d = dst.0.map(|v| v as f64 / 255.0);
    let s = src.0.map(|v| v as f64 / 255.0);
    let channel = |f: fn(f64, f64) -> f64| {
        let mut out = [0.0; 4];
        for i in 0..3 {
            out[i] = f(s[i], d[i]);
        }
        out[3] = s[3] + d[3] * (1.0 - s[3]);
        out
    };
    let out = match op {
        Compose::Copy => s,
        Compose::Dst => d,
        Compose::Clear => [0.0; 4],
        Compose::Multiply => channel(|s, d| s * d),
        Compose::Screen => channel(|s, d| s + d - s * d),
        Compose::Plus => channel(|s, d| (s + d).min(1.0)),
        Compose::Minus => channel(|s, d| (d - s).max(0.0)),
        Compose::Difference => channel(|s, d| (s - d).abs()),
        Compose::Darken => channel(f64::min),
        Compose::Lighten => channel(f64::max),
        Compose::DstOver => over(d, s),
        _ => over(s, d),
    };
    Rgba(out.map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8))
}

fn over(top: [f64; 4], bottom: [f64; 4]) -> [f64; 4] {
    let a = top[3] + bottom[3] * (1.0 - top[3]);
    if a <= 0.0 {
        return [0.0; 4];
    }
    let mut out = [0.0; 4];
    for i in 0..3 {
        out[i] = (top[i] * top[3] + bottom[i] * bottom[3] * (1.0 - top[3])) / a;
    }
    out[3] = a;
    out
}

/// Draw `src` onto `dst` at an offset with a compose operator.
fn composite_onto(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, op: Compose) {
    let (dw, dh) = (dst.width() as i64, dst.height() as i64);
    for (sx, sy, px) in src.enumerate_pixels() {
        let (tx, ty) = (x + sx as i64, y + sy as i64);
        if tx < 0 || ty < 0 || tx >= dw || ty >= dh {
            continue;
        }
        let target = dst.get_pixel_mut(tx as u32, ty as u32);
        *target = compose_pixel(op, *target, *px);
    }
}

/// Bounding box of pixels that differ from the top-left corner color.
fn trim_bounds(image: &Image, fuzz: f64) -> Option<Rect> {
    let rgba = image.pixels.to_rgba8();
    let corner = Color::from_rgba(*rgba.get_pixel(0, 0));
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0u32, 0u32);
    for (x, y, px) in rgba.enumerate_pixels() {
        if !Color::from_rgba(*px).matches(&corner, fuzz) {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }
    (x0 != u32::MAX).then(|| Rect::new(x0 as i64, y0 as i64, x1 - x0 + 1, y1 - y0 + 1))
}

fn palette_of(image: &Image) -> Vec<Rgba<u8>> {
    let mut seen = HashSet::new();
    image
        .pixels
        .to_rgba8()
        .pixels()
        .filter(|px| seen.insert(px.0))
        .copied()
        .collect()
}

/// The `limit` most frequent colors across all images.
fn shared_palette(images: &[Image], limit: usize) -> Vec<Rgba<u8>> {
    let mut counts: HashMap<[u8; 4], usize> = HashMap::new();
    for image in images {
        for px in image.pixels.to_rgba8().pixels() {
            *counts.entry(px.0).or_default() += 1;
        }
    }
    let mut ranked: Vec<([u8; 4], usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(limit.max(1)).map(|(c, _)| Rgba(c)).collect()
}

/// Map every pixel to its nearest palette entry.
fn remap_to(image: &Image, palette: &[Rgba<u8>]) -> Image {
    if palette.is_empty() {
        return image.clone();
    }
    let mut rgba = image.pixels.to_rgba8();
    let width = rgba.width() as usize;
    rgba.par_chunks_mut(width * 4).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let color = Color::rgba(px[0], px[1], px[2], px[3]);
            if let Some(best) = palette
                .iter()
                .min_by(|a, b| {
                    color
                        .distance(&Color::from_rgba(**a))
                        .total_cmp(&color.distance(&Color::from_rgba(**b)))
                })
            {
                px.copy_from_slice(&best.0);
            }
        }
    });
    image.with_pixels(DynamicImage::ImageRgba8(rgba))
}

fn rotate_any(image: &Image, degrees: f64, background: Color) -> Image {
    let normalized = degrees.rem_euclid(360.0);
    match normalized {
        d if d == 0.0 => return image.clone(),
        d if d == 90.0 => return image.with_pixels(image.pixels.rotate90()),
        d if d == 180.0 => return image.with_pixels(image.pixels.rotate180()),
        d if d == 270.0 => return image.with_pixels(image.pixels.rotate270()),
        _ => {}
    }
    let src = image.pixels.to_rgba8();
    let (w, h) = (src.width() as f64, src.height() as f64);
    let (sin, cos) = normalized.to_radians().sin_cos();
    let out_w = (w * cos.abs() + h * sin.abs()).ceil() as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).ceil() as u32;
    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ox, oy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);
    let out = RgbaImage::from_fn(out_w.max(1), out_h.max(1), |x, y| {
        let dx = x as f64 + 0.5 - ox;
        let dy = y as f64 + 0.5 - oy;
        let sx = dx * cos + dy * sin + cx;
        let sy = -dx * sin + dy * cos + cy;
        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            background.to_rgba()
        }
    });
    image.with_pixels(DynamicImage::ImageRgba8(out))
}

fn sparse_color(
    image: &Image,
    method: SparseColorMethod,
    channels: Channels,
    points: &[SparsePoint],
) -> Image {
    let mut rgba = image.pixels.to_rgba8();
    let selected = channels.indexes();
    for (x, y, px) in rgba.enumerate_pixels_mut() {
        let (fx, fy) = (x as f64, y as f64);
        let values = match method {
            SparseColorMethod::Voronoi => points
                .iter()
                .min_by(|a, b| {
                    let da = (a.x - fx).powi(2) + (a.y - fy).powi(2);
                    let db = (b.x - fx).powi(2) + (b.y - fy).powi(2);
                    da.total_cmp(&db)
                })
                .map(|p| p.values)
                .unwrap_or_default(),
            _ => {
                let mut sum = [0.0; 4];
                let mut total = 0.0;
                for p in points {
                    let d2 = (p.x - fx).powi(2) + (p.y - fy).powi(2);
                    if d2 == 0.0 {
                        sum = p.values;
                        total = 1.0;
                        break;
                    }
                    let weight = 1.0 / d2;
                    for (s, v) in sum.iter_mut().zip(p.values) {
                        *s += v * weight;
                    }
                    total += weight;
                }
                sum.map(|s| s / total.max(f64::EPSILON))
            }
        };
        for (slot, &c) in selected.iter().enumerate() {
            px.0[c] = (values[slot] * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    image.with_pixels(DynamicImage::ImageRgba8(rgba))
}

/// Replace each pixel by a statistic of its `width`x`height` neighbourhood.
/// Edges clamp to the nearest pixel.
fn neighbourhood(image: &Image, kind: StatisticType, width: u32, height: u32) -> Option<Image> {
    let reduce: fn(&mut [u8]) -> u8 = match kind {
        StatisticType::Minimum => |v| v.iter().copied().min().unwrap_or(0),
        StatisticType::Maximum => |v| v.iter().copied().max().unwrap_or(0),
        StatisticType::Mean => |v| {
            let sum: u32 = v.iter().map(|&c| c as u32).sum();
            (sum as f64 / v.len().max(1) as f64).round() as u8
        },
        StatisticType::Median => |v| {
            v.sort_unstable();
            v[v.len() / 2]
        },
        _ => return None,
    };
    let src = image.pixels.to_rgba8();
    let (w, h) = src.dimensions();
    let (rx, ry) = ((width.max(1) / 2) as i64, (height.max(1) / 2) as i64);
    let rows: Vec<Vec<Rgba<u8>>> = (0..h)
        .into_par_iter()
        .map(|y| {
            let mut window = Vec::with_capacity(((2 * rx + 1) * (2 * ry + 1)) as usize);
            (0..w)
                .map(|x| {
                    let mut out = *src.get_pixel(x, y);
                    for c in 0..3 {
                        window.clear();
                        for dy in -ry..=ry {
                            for dx in -rx..=rx {
                                let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                                let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                                window.push(src.get_pixel(sx, sy).0[c]);
                            }
                        }
                        out.0[c] = reduce(&mut window);
                    }
                    out
                })
                .collect()
        })
        .collect();
    let out = RgbaImage::from_fn(w, h, |x, y| rows[y as usize][x as usize]);
    Some(image.with_pixels(DynamicImage::ImageRgba8(out)))
}

// =============================================================================
// Per-image transforms
// =============================================================================

fn apply_transform(image: &Image, op: &Transform) -> Result<Outcome, BackendError> {
    use Outcome::{Mutated, Replaced, Split, Unchanged};
    let px = &image.pixels;
    let outcome = match op {
        Transform::Alpha(mode) => match mode {
            AlphaChannel::On | AlphaChannel::Set | AlphaChannel::Activate => {
                Mutated(image.with_pixels(DynamicImage::ImageRgba8(px.to_rgba8())))
            }
            AlphaChannel::Off | AlphaChannel::Deactivate | AlphaChannel::Remove => {
                Mutated(image.with_pixels(DynamicImage::ImageRgb8(px.to_rgb8())))
            }
            AlphaChannel::Opaque => Mutated(map_pixels(image, |mut p| {
                p.0[3] = 255;
                p
            })),
            AlphaChannel::Transparent => Mutated(map_pixels(image, |mut p| {
                p.0[3] = 0;
                p
            })),
            AlphaChannel::Extract => Mutated(map_pixels(image, |p| Rgba([p.0[3], p.0[3], p.0[3], 255]))),
            _ => Unchanged,
        },
        Transform::AutoGamma => {
            let rgba = px.to_rgba8();
            let n = (rgba.width() * rgba.height()).max(1) as f64;
            let mean = rgba.pixels().map(|p| luma(*p)).sum::<f64>() / n / 255.0;
            if mean <= 0.0 || mean >= 1.0 {
                Unchanged
            } else {
                let gamma = 0.5_f64.ln() / mean.ln();
                Mutated(map_values(image, |v| v.powf(gamma)))
            }
        }
        Transform::AutoLevel | Transform::Normalize => {
            let (min, max) = channel_bounds(image);
            Mutated(level(image, min, max, 1.0, false))
        }
        Transform::BlackThreshold(t) => {
            Mutated(map_values(image, |v| if v * 255.0 < *t { 0.0 } else { v }))
        }
        Transform::WhiteThreshold(t) => {
            Mutated(map_values(image, |v| if v * 255.0 > *t { 1.0 } else { v }))
        }
        Transform::Blur { kind, sigma, .. } => match kind {
            BlurKind::Adaptive => return Err(unsupported("adaptive-blur")),
            _ => Mutated(image.with_pixels(px.blur(sigma.max(0.1) as f32))),
        },
        Transform::Border {
            width,
            height,
            color,
            compose,
        } => {
            let mut canvas = RgbaImage::from_pixel(
                image.width() + 2 * width,
                image.height() + 2 * height,
                color.to_rgba(),
            );
            composite_onto(&mut canvas, &px.to_rgba8(), *width as i64, *height as i64, *compose);
            Replaced(image.with_pixels(DynamicImage::ImageRgba8(canvas)))
        }
        Transform::BrightnessContrast {
            brightness,
            contrast,
        } => {
            let b = brightness / 100.0;
            let slope = ((contrast / 100.0 + 1.0) * std::f64::consts::FRAC_PI_4).tan();
            Mutated(map_values(image, |v| (v - 0.5) * slope + 0.5 + b))
        }
        Transform::Chop(rect) => {
            let rgba = px.to_rgba8();
            let x_cut = rect.x.max(0) as u32..(rect.x.max(0) as u32 + rect.width);
            let y_cut = rect.y.max(0) as u32..(rect.y.max(0) as u32 + rect.height);
            let cols: Vec<u32> = (0..rgba.width()).filter(|x| !x_cut.contains(x)).collect();
            let rows: Vec<u32> = (0..rgba.height()).filter(|y| !y_cut.contains(y)).collect();
            if cols.is_empty() || rows.is_empty() {
                return Err(failed("geometry does not contain image"));
            }
            let out = RgbaImage::from_fn(cols.len() as u32, rows.len() as u32, |x, y| {
                *rgba.get_pixel(cols[x as usize], rows[y as usize])
            });
            Replaced(image.with_pixels(DynamicImage::ImageRgba8(out)))
        }
        Transform::Clamp => Unchanged,
        Transform::Colorspace(space) => {
            let mut out = if *space == Colorspace::Gray {
                image.with_pixels(px.grayscale())
            } else {
                image.clone()
            };
            out.colorspace = *space;
            Mutated(out)
        }
        Transform::Contrast { sharpen } => {
            Mutated(image.with_pixels(px.adjust_contrast(if *sharpen { 10.0 } else { -10.0 })))
        }
        Transform::ContrastStretch { black, white } | Transform::LinearStretch { black, white } => {
            let (low, high) = histogram_bounds(image, *black, *white);
            Mutated(level(image, low, high, 1.0, false))
        }
        Transform::Crop(regions) => {
            let mut tiles: Vec<Image> = regions
                .iter()
                .map(|r| {
                    let mut tile =
                        image.with_pixels(px.crop_imm(r.x as u32, r.y as u32, r.width, r.height));
                    tile.page = Page {
                        width: image.page.width.max(image.width()),
                        height: image.page.height.max(image.height()),
                        x: image.page.x + r.x,
                        y: image.page.y + r.y,
                    };
                    tile
                })
                .collect();
            match tiles.len() {
                0 => return Err(failed("geometry does not contain image")),
                1 => Replaced(tiles.remove(0)),
                _ => Split(tiles),
            }
        }
        Transform::Edge { .. } => Mutated(image.with_pixels(
            px.filter3x3(&[-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0]),
        )),
        Transform::Emboss { .. } => Mutated(image.with_pixels(
            px.filter3x3(&[-2.0, -1.0, 0.0, -1.0, 1.0, 1.0, 0.0, 1.0, 2.0]),
        )),
        Transform::Equalize => {
            let rgba = px.to_rgba8();
            let n = (rgba.width() * rgba.height()).max(1) as f64;
            let channels = value_channels(image);
            let mut out = rgba.clone();
            for &c in &channels {
                let mut histogram = [0u64; 256];
                for p in rgba.pixels() {
                    histogram[p.0[c] as usize] += 1;
                }
                let mut cdf = [0u8; 256];
                let mut running = 0u64;
                for (v, count) in histogram.iter().enumerate() {
                    running += count;
                    cdf[v] = (running as f64 / n * 255.0).round() as u8;
                }
                for p in out.pixels_mut() {
                    p.0[c] = cdf[p.0[c] as usize];
                }
            }
            Mutated(image.with_pixels(DynamicImage::ImageRgba8(out)))
        }
        Transform::Evaluate { op, value } => {
            let (op, value) = (*op, *value);
            Mutated(map_values(image, move |v| evaluate(op, v * 255.0, value) / 255.0))
        }
        Transform::Extent {
            width,
            height,
            x,
            y,
            background,
        } => {
            let mut canvas = RgbaImage::from_pixel(*width, *height, background.to_rgba());
            composite_onto(&mut canvas, &px.to_rgba8(), -x, -y, Compose::Over);
            Replaced(image.with_pixels(DynamicImage::ImageRgba8(canvas)))
        }
        Transform::Flip => Mutated(image.with_pixels(px.flipv())),
        Transform::Flop => Mutated(image.with_pixels(px.fliph())),
        Transform::Transpose => Mutated(image.with_pixels(px.rotate90().fliph())),
        Transform::Transverse => Mutated(image.with_pixels(px.rotate270().fliph())),
        Transform::Floodfill {
            x,
            y,
            target,
            fill,
            fuzz,
            invert,
        } => {
            let mut rgba = px.to_rgba8();
            let (w, h) = rgba.dimensions();
            if *x < 0 || *y < 0 || *x >= w as i64 || *y >= h as i64 {
                return Ok(Unchanged);
            }
            let mut visited = vec![false; (w * h) as usize];
            let mut stack = vec![(*x as u32, *y as u32)];
            while let Some((cx, cy)) = stack.pop() {
                let idx = (cy * w + cx) as usize;
                if visited[idx] {
                    continue;
                }
                visited[idx] = true;
                let here = Color::from_rgba(*rgba.get_pixel(cx, cy));
                if here.matches(target, *fuzz) == *invert {
                    continue;
                }
                rgba.put_pixel(cx, cy, fill.to_rgba());
                if cx > 0 {
                    stack.push((cx - 1, cy));
                }
                if cy > 0 {
                    stack.push((cx, cy - 1));
                }
                if cx + 1 < w {
                    stack.push((cx + 1, cy));
                }
                if cy + 1 < h {
                    stack.push((cx, cy + 1));
                }
            }
            Mutated(image.with_pixels(DynamicImage::ImageRgba8(rgba)))
        }
        Transform::Gamma(g) => {
            let g = if *g <= 0.0 { 1.0 } else { *g };
            Mutated(map_values(image, |v| v.powf(1.0 / g)))
        }
        Transform::Level {
            black,
            white,
            gamma,
            invert,
        } => Mutated(level(image, *black, *white, *gamma, *invert)),
        Transform::Modulate {
            brightness,
            saturation,
            hue,
        } => Mutated(map_pixels(image, |p| {
            let (h, s, l) = rgb_to_hsl(p);
            hsl_to_rgb(
                h + (hue - 100.0) / 200.0,
                (s * saturation / 100.0).clamp(0.0, 1.0),
                (l * brightness / 100.0).clamp(0.0, 1.0),
                p.0[3],
            )
        })),
        Transform::Negate { spare_alpha } => {
            let mut pixels = px.clone();
            pixels.invert();
            let mut out = image.with_pixels(pixels);
            if !spare_alpha && image.channels.contains(Channels::ALPHA) && image.channels != Channels::ALL {
                out = map_pixels(&out, |mut p| {
                    p.0[3] = 255 - p.0[3];
                    p
                });
            }
            Mutated(out)
        }
        Transform::Opaque {
            target,
            fill,
            fuzz,
            invert,
        } => Mutated(map_pixels(image, |p| {
            if Color::from_rgba(p).matches(target, *fuzz) != *invert {
                fill.to_rgba()
            } else {
                p
            }
        })),
        Transform::Transparent {
            target,
            fuzz,
            invert,
        } => Mutated(map_pixels(image, |mut p| {
            if Color::from_rgba(p).matches(target, *fuzz) != *invert {
                p.0[3] = 0;
            }
            p
        })),
        Transform::Posterize(levels) => {
            let steps = (*levels).max(2) as f64 - 1.0;
            Mutated(map_values(image, move |v| (v * steps).round() / steps))
        }
        Transform::Quantize { colors, .. } => {
            let steps = ((*colors).max(2) as f64).cbrt().ceil().max(2.0) - 1.0;
            Mutated(map_values(image, move |v| (v * steps).round() / steps))
        }
        Transform::Raise {
            width,
            height,
            raise,
        } => {
            let (w, h) = image.dimensions();
            let mut rgba = px.to_rgba8();
            let (light, dark) = if *raise { (1.25, 0.75) } else { (0.75, 1.25) };
            for (x, y, p) in rgba.enumerate_pixels_mut() {
                let factor = if x < *width || y < *height {
                    light
                } else if x + width >= w || y + height >= h {
                    dark
                } else {
                    continue;
                };
                for c in 0..3 {
                    p.0[c] = (p.0[c] as f64 * factor).clamp(0.0, 255.0) as u8;
                }
            }
            Mutated(image.with_pixels(DynamicImage::ImageRgba8(rgba)))
        }
        Transform::Remap { reference, .. } => Mutated(remap_to(image, &palette_of(reference))),
        Transform::Resize {
            width,
            height,
            method,
        } => {
            let pixels = match method {
                ResizeMethod::Resize(filter) => px.resize_exact(*width, *height, to_filter(*filter)),
                ResizeMethod::Sample => px.resize_exact(*width, *height, FilterType::Nearest),
                ResizeMethod::Scale | ResizeMethod::Adaptive => {
                    px.resize_exact(*width, *height, FilterType::Triangle)
                }
                ResizeMethod::Interpolative => {
                    px.resize_exact(*width, *height, FilterType::CatmullRom)
                }
                ResizeMethod::Thumbnail => px.thumbnail_exact(*width, *height),
                ResizeMethod::LiquidRescale => return Err(unsupported("liquid-rescale")),
            };
            let mut out = image.with_pixels(pixels);
            if matches!(method, ResizeMethod::Thumbnail) {
                out.strip();
            }
            Replaced(out)
        }
        Transform::Roll { x, y } => {
            let rgba = px.to_rgba8();
            let (w, h) = (rgba.width() as i64, rgba.height() as i64);
            let out = RgbaImage::from_fn(w as u32, h as u32, |tx, ty| {
                let sx = (tx as i64 - x).rem_euclid(w) as u32;
                let sy = (ty as i64 - y).rem_euclid(h) as u32;
                *rgba.get_pixel(sx, sy)
            });
            Mutated(image.with_pixels(DynamicImage::ImageRgba8(out)))
        }
        Transform::Rotate {
            degrees,
            background,
        } => Replaced(rotate_any(image, *degrees, *background)),
        Transform::Separate(channels) => Split(
            channels
                .indexes()
                .into_iter()
                .map(|c| {
                    let mut out =
                        map_pixels(image, |p| Rgba([p.0[c], p.0[c], p.0[c], 255]));
                    out.colorspace = Colorspace::Gray;
                    out
                })
                .collect(),
        ),
        Transform::SepiaTone(threshold) => {
            let t = *threshold;
            Mutated(map_pixels(image, move |p| {
                let i = luma(p);
                let r = if i > t { 255.0 } else { i + 255.0 - t };
                let g = if i > 7.0 * t / 6.0 { 255.0 } else { i + 255.0 - 7.0 * t / 6.0 };
                let b = if i < t / 6.0 { 0.0 } else { i - t / 6.0 };
                Rgba([r.clamp(0.0, 255.0) as u8, g.clamp(0.0, 255.0) as u8, b.clamp(0.0, 255.0) as u8, p.0[3]])
            }))
        }
        Transform::Sharpen {
            sigma, adaptive, ..
        } => {
            if *adaptive {
                return Err(unsupported("adaptive-sharpen"));
            }
            Mutated(image.with_pixels(px.unsharpen(sigma.max(0.1) as f32, 0)))
        }
        Transform::Unsharp {
            sigma, threshold, ..
        } => Mutated(image.with_pixels(px.unsharpen(sigma.max(0.1) as f32, *threshold as i32))),
        Transform::Shave { width, height } => {
            let (w, h) = image.dimensions();
            if 2 * width >= w || 2 * height >= h {
                return Err(failed("geometry does not contain image"));
            }
            Replaced(image.with_pixels(px.crop_imm(*width, *height, w - 2 * width, h - 2 * height)))
        }
        Transform::SigmoidalContrast {
            sharpen,
            contrast,
            midpoint,
        } => {
            let (a, b) = (contrast.max(f64::EPSILON), midpoint / 255.0);
            let sig = move |x: f64| 1.0 / (1.0 + (a * (b - x)).exp());
            let (lo, hi) = (sig(0.0), sig(1.0));
            let sharpen = *sharpen;
            Mutated(map_values(image, move |v| {
                if sharpen {
                    (sig(v) - lo) / (hi - lo)
                } else {
                    let y = v * (hi - lo) + lo;
                    b - (1.0 / y - 1.0).max(f64::EPSILON).ln() / a
                }
            }))
        }
        Transform::Solarize(t) => {
            Mutated(map_values(image, |v| if v * 255.0 > *t { 1.0 - v } else { v }))
        }
        Transform::SparseColor {
            method,
            channels,
            points,
        } => Mutated(sparse_color(image, *method, *channels, points)),
        Transform::Splice { region, background } => {
            let (w, h) = image.dimensions();
            let (rx, ry) = (region.x.clamp(0, w as i64) as u32, region.y.clamp(0, h as i64) as u32);
            let rgba = px.to_rgba8();
            let out = RgbaImage::from_fn(w + region.width, h + region.height, |x, y| {
                let in_cols = x >= rx && x < rx + region.width;
                let in_rows = y >= ry && y < ry + region.height;
                if in_cols || in_rows {
                    return background.to_rgba();
                }
                let sx = if x >= rx + region.width { x - region.width } else { x };
                let sy = if y >= ry + region.height { y - region.height } else { y };
                *rgba.get_pixel(sx, sy)
            });
            Replaced(image.with_pixels(DynamicImage::ImageRgba8(out)))
        }
        Transform::Threshold(t) => Mutated(map_pixels(image, |p| {
            let v = if luma(p) > *t { 255 } else { 0 };
            Rgba([v, v, v, p.0[3]])
        })),
        Transform::Trim { fuzz } => match trim_bounds(image, *fuzz) {
            Some(r) => {
                let mut out =
                    image.with_pixels(px.crop_imm(r.x as u32, r.y as u32, r.width, r.height));
                out.page = Page {
                    width: image.page.width.max(image.width()),
                    height: image.page.height.max(image.height()),
                    x: image.page.x + r.x,
                    y: image.page.y + r.y,
                };
                Replaced(out)
            }
            None => Unchanged,
        },
        Transform::Type(kind) => match kind {
            ImageType::Grayscale => Mutated(image.with_pixels(DynamicImage::ImageLuma8(px.to_luma8()))),
            ImageType::GrayscaleAlpha => {
                Mutated(image.with_pixels(DynamicImage::ImageLumaA8(px.to_luma_alpha8())))
            }
            ImageType::Bilevel => Mutated(map_pixels(image, |p| {
                let v = if luma(p) > 127.5 { 255 } else { 0 };
                Rgba([v, v, v, 255])
            })),
            ImageType::TrueColor => Mutated(image.with_pixels(DynamicImage::ImageRgb8(px.to_rgb8()))),
            ImageType::TrueColorAlpha => {
                Mutated(image.with_pixels(DynamicImage::ImageRgba8(px.to_rgba8())))
            }
            _ => Unchanged,
        },
        Transform::UniqueColors => {
            let palette = palette_of(image);
            let out = RgbaImage::from_fn(palette.len().max(1) as u32, 1, |x, _| {
                palette.get(x as usize).copied().unwrap_or(Rgba([0, 0, 0, 0]))
            });
            Replaced(image.with_pixels(DynamicImage::ImageRgba8(out)))
        }
        Transform::Despeckle | Transform::Enhance => {
            Mutated(image.with_pixels(px.blur(0.5)))
        }
        Transform::BlueShift(factor) => Mutated(map_pixels(image, |p| {
            let [r, g, b] = [p.0[0], p.0[1], p.0[2]].map(|v| v as f64);
            let lo = r.min(g).min(b);
            let hi = r.max(g).max(b);
            let shift = |v: f64| {
                let v = 0.5 * (v + factor * lo);
                (0.5 * (v + factor * hi)).round().clamp(0.0, 255.0) as u8
            };
            Rgba([shift(r), shift(g), shift(b), p.0[3]])
        })),
        Transform::Colorize { blend, fill } => {
            let target = fill.to_rgba();
            Mutated(map_pixels(image, |mut p| {
                for c in 0..3 {
                    let t = (blend[c] / 100.0).clamp(0.0, 1.0);
                    p.0[c] = (p.0[c] as f64 * (1.0 - t) + target.0[c] as f64 * t).round() as u8;
                }
                p
            }))
        }
        Transform::Tint { amount, fill } => {
            let target = fill.to_rgba();
            let weight = (amount / 100.0).clamp(0.0, 1.0);
            Mutated(map_pixels(image, |mut p| {
                // Midtones take the most tint; black and white stay put.
                let l = luma(p) / 255.0;
                let t = weight * (1.0 - (2.0 * l - 1.0).powi(2));
                for c in 0..3 {
                    let v = p.0[c] as f64;
                    p.0[c] = (v + (target.0[c] as f64 - 127.5) * t).round().clamp(0.0, 255.0) as u8;
                }
                p
            }))
        }
        Transform::LevelColors {
            black,
            white,
            invert,
        } => {
            let (lo, hi) = (black.to_rgba(), white.to_rgba());
            Mutated(map_pixels(image, |mut p| {
                for c in 0..3 {
                    let (b, w) = (lo.0[c] as f64, hi.0[c] as f64);
                    let v = p.0[c] as f64;
                    let out = if *invert {
                        b + v / 255.0 * (w - b)
                    } else {
                        (v - b) / (w - b).abs().max(f64::EPSILON) * 255.0
                    };
                    p.0[c] = out.round().clamp(0.0, 255.0) as u8;
                }
                p
            }))
        }
        Transform::Frame {
            width,
            height,
            outer_bevel,
            inner_bevel,
            color,
            compose,
        } => {
            let (w, h) = (image.width() + 2 * width, image.height() + 2 * height);
            let base = color.to_rgba();
            let shade = |p: Rgba<u8>, f: f64| {
                Rgba([
                    (p.0[0] as f64 * f).min(255.0) as u8,
                    (p.0[1] as f64 * f).min(255.0) as u8,
                    (p.0[2] as f64 * f).min(255.0) as u8,
                    p.0[3],
                ])
            };
            let outer = (*outer_bevel).max(0) as u32;
            let inner = (*inner_bevel).max(0) as u32;
            let mut canvas = RgbaImage::from_fn(w, h, |x, y| {
                let edge = x.min(y).min(w - 1 - x).min(h - 1 - y);
                let lit = x < w - 1 - x && y < h - 1 - y;
                if edge < outer {
                    shade(base, if lit { 1.3 } else { 0.7 })
                } else if edge + inner >= (*width).min(*height) && inner > 0 {
                    shade(base, if lit { 0.7 } else { 1.3 })
                } else {
                    base
                }
            });
            composite_onto(&mut canvas, &px.to_rgba8(), *width as i64, *height as i64, *compose);
            Replaced(image.with_pixels(DynamicImage::ImageRgba8(canvas)))
        }
        Transform::Statistic {
            kind,
            width,
            height,
        } => match neighbourhood(image, *kind, *width, *height) {
            Some(out) => Mutated(out),
            None => return Err(unsupported(kind.as_str())),
        },
        other => return Err(unsupported(other.name())),
    };
    Ok(outcome)
}

// =============================================================================
// List transforms
// =============================================================================

fn append(images: &[Image], vertical: bool, gap: i64) -> Image {
    let first = &images[0];
    let count = images.len() as i64;
    let (w, h) = images.iter().fold((0i64, 0i64), |(w, h), i| {
        let (iw, ih) = (i.width() as i64, i.height() as i64);
        if vertical { (w.max(iw), h + ih) } else { (w + iw, h.max(ih)) }
    });
    let (w, h) = if vertical {
        (w, (h + gap * (count - 1)).max(1))
    } else {
        ((w + gap * (count - 1)).max(1), h)
    };
    let mut canvas = RgbaImage::from_pixel(w as u32, h as u32, first.background.to_rgba());
    let mut cursor = 0i64;
    for image in images {
        let (x, y) = if vertical { (0, cursor) } else { (cursor, 0) };
        composite_onto(&mut canvas, &image.pixels.to_rgba8(), x, y, Compose::Over);
        cursor += if vertical { image.height() as i64 } else { image.width() as i64 } + gap;
    }
    let mut out = first.with_pixels(DynamicImage::ImageRgba8(canvas));
    out.page = Page::default();
    out
}

/// Compose layers onto one canvas at their page offsets.
fn flatten(images: &[Image], method: LayerMethod) -> Image {
    let first = &images[0];
    let layers: Vec<(Page, (u32, u32))> = images.iter().map(|i| (i.page, i.dimensions())).collect();
    let bounds = match method {
        LayerMethod::Flatten => {
            let (w, h) = if first.page.width > 0 && first.page.height > 0 {
                (first.page.width, first.page.height)
            } else {
                first.dimensions()
            };
            Rect::new(0, 0, w, h)
        }
        LayerMethod::Mosaic => {
            let b = layer_bounds(&layers);
            let (right, bottom) = (b.x + b.width as i64, b.y + b.height as i64);
            Rect::new(0, 0, right.max(1) as u32, bottom.max(1) as u32)
        }
        _ => layer_bounds(&layers),
    };
    let mut canvas =
        RgbaImage::from_pixel(bounds.width.max(1), bounds.height.max(1), first.background.to_rgba());
    for image in images {
        composite_onto(
            &mut canvas,
            &image.pixels.to_rgba8(),
            image.page.x - bounds.x,
            image.page.y - bounds.y,
            image.compose,
        );
    }
    let mut out = first.with_pixels(DynamicImage::ImageRgba8(canvas));
    out.page = Page {
        width: bounds.width,
        height: bounds.height,
        x: bounds.x,
        y: bounds.y,
    };
    out
}

fn coalesce(images: &[Image]) -> Vec<Image> {
    let first = &images[0];
    let (w, h) = if first.page.width > 0 && first.page.height > 0 {
        (first.page.width, first.page.height)
    } else {
        first.dimensions()
    };
    let mut canvas = RgbaImage::from_pixel(w, h, Color::TRANSPARENT.to_rgba());
    images
        .iter()
        .map(|image| {
            composite_onto(&mut canvas, &image.pixels.to_rgba8(), image.page.x, image.page.y, Compose::Over);
            let mut frame = image.with_pixels(DynamicImage::ImageRgba8(canvas.clone()));
            frame.page = Page {
                width: w,
                height: h,
                x: 0,
                y: 0,
            };
            frame
        })
        .collect()
}

fn evaluate_sequence(images: &[Image], op: EvaluateOp) -> Image {
    let first = &images[0];
    let (w, h) = first.dimensions();
    let frames: Vec<RgbaImage> = images
        .iter()
        .map(|i| i.pixels.resize_exact(w, h, FilterType::Nearest).to_rgba8())
        .collect();
    let mut out = RgbaImage::new(w, h);
    out.par_chunks_mut(w as usize * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w as usize {
                for c in 0..4 {
                    let values: Vec<f64> = frames
                        .iter()
                        .map(|f| f.get_pixel(x as u32, y as u32).0[c] as f64)
                        .collect();
                    let v = match op {
                        EvaluateOp::Mean => values.iter().sum::<f64>() / values.len() as f64,
                        EvaluateOp::Median => {
                            let mut sorted = values.clone();
                            sorted.sort_by(f64::total_cmp);
                            sorted[sorted.len() / 2]
                        }
                        _ => values[1..]
                            .iter()
                            .fold(values[0], |acc, v| evaluate(op, acc, *v)),
                    };
                    row[x * 4 + c] = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        });
    first.with_pixels(DynamicImage::ImageRgba8(out))
}

fn morph(images: &[Image], frames: usize) -> Vec<Image> {
    let mut out = Vec::new();
    for pair in images.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        out.push(a.clone());
        let tweens: Vec<Image> = (1..=frames)
            .into_par_iter()
            .map(|step| {
                let t = step as f64 / (frames + 1) as f64;
                let w = (a.width() as f64 * (1.0 - t) + b.width() as f64 * t).round() as u32;
                let h = (a.height() as f64 * (1.0 - t) + b.height() as f64 * t).round() as u32;
                let pa = a.pixels.resize_exact(w, h, FilterType::Triangle).to_rgba8();
                let pb = b.pixels.resize_exact(w, h, FilterType::Triangle).to_rgba8();
                let blended = RgbaImage::from_fn(w.max(1), h.max(1), |x, y| {
                    let (qa, qb) = (pa.get_pixel(x, y).0, pb.get_pixel(x, y).0);
                    Rgba(std::array::from_fn(|c| {
                        (qa[c] as f64 * (1.0 - t) + qb[c] as f64 * t).round() as u8
                    }))
                });
                a.with_pixels(DynamicImage::ImageRgba8(blended))
            })
            .collect();
        out.extend(tweens);
    }
    out.extend(images.last().cloned());
    out
}

fn clut(image: &Image, table: &Image) -> Image {
    let lut = table.pixels.to_rgba8();
    let (w, h) = lut.dimensions();
    let along_width = w >= h;
    let span = if along_width { w - 1 } else { h - 1 };
    let channels = value_channels(image);
    let mut rgba = image.pixels.to_rgba8();
    for p in rgba.pixels_mut() {
        for &c in &channels {
            let pos = (p.0[c] as u32 * span + 127) / 255;
            let entry = if along_width { lut.get_pixel(pos, 0) } else { lut.get_pixel(0, pos) };
            p.0[c] = entry.0[c];
        }
    }
    image.with_pixels(DynamicImage::ImageRgba8(rgba))
}

fn combine(images: &[Image], space: Colorspace) -> Image {
    let first = &images[0];
    let (w, h) = first.dimensions();
    let planes: Vec<RgbaImage> = images
        .iter()
        .take(4)
        .map(|i| i.pixels.resize_exact(w, h, FilterType::Nearest).to_rgba8())
        .collect();
    let out = RgbaImage::from_fn(w, h, |x, y| {
        let mut px = [0, 0, 0, 255];
        for (c, plane) in planes.iter().enumerate() {
            px[c] = plane.get_pixel(x, y).0[0];
        }
        Rgba(px)
    });
    let mut image = first.with_pixels(DynamicImage::ImageRgba8(out));
    image.colorspace = space;
    image
}

fn apply_list_transform(images: &[Image], op: &ListTransform) -> Result<Vec<Image>, BackendError> {
    if images.is_empty() {
        return Ok(Vec::new());
    }
    let result = match op {
        ListTransform::Append { vertical } => vec![append(images, *vertical, 0)],
        ListTransform::Smush { offset, vertical } => vec![append(images, *vertical, *offset)],
        ListTransform::Coalesce => coalesce(images),
        ListTransform::Combine(space) => vec![combine(images, *space)],
        ListTransform::Clut { hald: false } => {
            let [image, table, ..] = images else {
                return Err(failed("clut needs two images"));
            };
            vec![clut(image, table)]
        }
        ListTransform::Composite { compose, x, y } => {
            let [dst, src, ..] = images else {
                return Err(failed("composite needs two images"));
            };
            let mut canvas = dst.pixels.to_rgba8();
            composite_onto(&mut canvas, &src.pixels.to_rgba8(), *x, *y, *compose);
            vec![dst.with_pixels(DynamicImage::ImageRgba8(canvas))]
        }
        ListTransform::CompositeLayers {
            compose,
            x,
            y,
            split,
        } => {
            let (destinations, sources) = images.split_at((*split).min(images.len()));
            if sources.is_empty() {
                return Ok(destinations.to_vec());
            }
            destinations
                .iter()
                .enumerate()
                .map(|(i, dst)| {
                    let src = &sources[i.min(sources.len() - 1)];
                    let mut canvas = dst.pixels.to_rgba8();
                    composite_onto(
                        &mut canvas,
                        &src.pixels.to_rgba8(),
                        x + src.page.x - dst.page.x,
                        y + src.page.y - dst.page.y,
                        *compose,
                    );
                    dst.with_pixels(DynamicImage::ImageRgba8(canvas))
                })
                .collect()
        }
        ListTransform::EvaluateSequence(op) => vec![evaluate_sequence(images, *op)],
        ListTransform::Layers(method) => match method {
            m if m.is_merging() => vec![flatten(images, *m)],
            LayerMethod::Coalesce => coalesce(images),
            LayerMethod::RemoveDups => {
                let mut out: Vec<Image> = Vec::new();
                for image in images {
                    let duplicate = out.last().is_some_and(|prev: &Image| {
                        prev.page == image.page && prev.signature() == image.signature()
                    });
                    if !duplicate {
                        out.push(image.clone());
                    }
                }
                out
            }
            LayerMethod::RemoveZero => {
                let kept: Vec<Image> = images.iter().filter(|i| i.delay > 0).cloned().collect();
                if kept.is_empty() { images.to_vec() } else { kept }
            }
            LayerMethod::TrimBounds => {
                let layers: Vec<_> = images.iter().map(|i| (i.page, i.dimensions())).collect();
                let bounds = layer_bounds(&layers);
                images
                    .iter()
                    .map(|i| {
                        let mut out = i.clone();
                        out.page.x -= bounds.x;
                        out.page.y -= bounds.y;
                        out.page.width = bounds.width;
                        out.page.height = bounds.height;
                        out
                    })
                    .collect()
            }
            other => return Err(unsupported(&format!("layers {other}"))),
        },
        ListTransform::Morph { frames } => morph(images, *frames),
        ListTransform::Remap { colors, .. } => {
            let palette = shared_palette(images, *colors);
            images.par_iter().map(|i| remap_to(i, &palette)).collect()
        }
        other => return Err(unsupported(other.name())),
    };
    Ok(result)
}

impl ImageBackend for RustBackend {
    fn read(&self, params: &ReadParams) -> Result<Vec<Image>, BackendError> {
        if let Some(pseudo) = read_pseudo(params) {
            return pseudo.map(|image| vec![image]);
        }
        let path = Path::new(&params.source);
        if path.is_dir() {
            return read_directory(path, params.ping);
        }
        read_file(path, params.ping)
    }

    fn write(&self, images: &[Image], params: &WriteParams) -> Result<(), BackendError> {
        if images.is_empty() {
            return Ok(());
        }
        let destination = params.destination.as_str();
        if destination.eq_ignore_ascii_case("null:") {
            return Ok(());
        }
        if images.len() > 1 && params.adjoin && output_format(destination)? == ImageFormat::Gif {
            return save_gif(images, destination);
        }
        if images.len() == 1 {
            return save_one(&images[0], destination, params.quality);
        }
        for (index, image) in images.iter().enumerate() {
            save_one(image, &numbered(destination, index), params.quality)?;
        }
        Ok(())
    }

    fn transform(&self, image: &Image, op: &Transform) -> Result<Outcome, BackendError> {
        apply_transform(image, op)
    }

    fn apply_list(&self, images: &[Image], op: &ListTransform) -> Result<Vec<Image>, BackendError> {
        apply_list_transform(images, op)
    }

    fn formats(&self) -> Vec<FormatInfo> {
        let mut seen = HashSet::new();
        let mut formats: Vec<FormatInfo> = FORMAT_CANDIDATES
            .iter()
            .filter(|(_, fmt, _)| seen.insert(*fmt))
            .map(|(ext, fmt, description)| FormatInfo {
                name: ext.to_ascii_uppercase(),
                description: description.to_string(),
                readable: fmt.reading_enabled(),
                writable: fmt.writing_enabled(),
            })
            .collect();
        for (name, description) in [("XC", "Constant image uniform color"), ("NULL", "Constant image of uniform color")] {
            formats.push(FormatInfo {
                name: name.into(),
                description: description.into(),
                readable: true,
                writable: name == "NULL",
            });
        }
        formats
    }

    fn fonts(&self) -> Vec<String> {
        Vec::new()
    }
}
