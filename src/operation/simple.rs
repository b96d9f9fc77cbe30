//! Simple operators: applied once to each image of the active list.
//!
//! A handler turns its arguments into a [`Transform`] and hands it to the
//! backend, or edits metadata on the image directly. Defaults for missing
//! geometry components follow the usual conventions: `sigma` is 1 for the
//! blur family, a missing height repeats the width.
//!
//! `-` and `+` pick the polarity. Where the two forms differ the handler
//! says how.

use super::{ImageFn, Invocation, transform};
use crate::color::{Color, parse_color};
use crate::exception::ExceptionKind;
use crate::geometry::{GeometryFlags, GeometryInfo, parse_geometry, parse_si_size};
use crate::image::{Image, Page, QUANTUM_RANGE};
use crate::imaging::{
    BlurKind, Rect, ResizeMethod, SparsePoint, Transform, crop_regions, gravity_offset,
    resize_dimensions,
};
use crate::keywords::{
    AlphaChannel, Channels, Colorspace, Compose, DistortMethod, EvaluateOp, FunctionKind,
    Gravity, ImageType, MorphologyMethod, NoiseType, Orientation, SparseColorMethod,
    StatisticType,
};
use crate::output;
use crate::properties::{PropertyContext, interpret_properties};
use crate::wand::Wand;
use std::f64::consts::PI;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::str::FromStr;

type Step = Result<Option<Vec<Image>>, ExceptionKind>;

pub(super) const HANDLERS: &[(&str, ImageFn)] = &[
    ("adaptive-blur", adaptive_blur),
    ("adaptive-resize", adaptive_resize),
    ("adaptive-sharpen", adaptive_sharpen),
    ("alpha", alpha),
    ("annotate", annotate),
    ("auto-gamma", auto_gamma),
    ("auto-level", auto_level),
    ("auto-orient", auto_orient),
    ("black-threshold", black_threshold),
    ("blue-shift", blue_shift),
    ("blur", blur),
    ("border", border),
    ("brightness-contrast", brightness_contrast),
    ("cdl", cdl),
    ("channel", channel),
    ("charcoal", charcoal),
    ("chop", chop),
    ("clamp", clamp),
    ("colorize", colorize),
    ("color-matrix", color_matrix),
    ("colors", colors),
    ("colorspace", colorspace),
    ("contrast", contrast),
    ("contrast-stretch", contrast_stretch),
    ("convolve", convolve),
    ("crop", crop),
    ("cycle", cycle),
    ("decipher", cipher),
    ("depth", depth),
    ("deskew", deskew),
    ("despeckle", despeckle),
    ("distort", distort),
    ("draw", draw),
    ("edge", edge),
    ("emboss", emboss),
    ("encipher", cipher),
    ("enhance", enhance),
    ("equalize", equalize),
    ("evaluate", evaluate),
    ("extent", extent),
    ("features", features),
    ("flip", flip),
    ("floodfill", floodfill),
    ("flop", flop),
    ("frame", frame),
    ("function", function),
    ("gamma", gamma),
    ("gaussian", gaussian_blur),
    ("gaussian-blur", gaussian_blur),
    ("geometry", geometry),
    ("highlight-color", highlight_color),
    ("identify", identify),
    ("implode", implode),
    ("interpolative-resize", interpolative_resize),
    ("lat", lat),
    ("level", level),
    ("level-colors", level_colors),
    ("linear-stretch", linear_stretch),
    ("liquid-rescale", liquid_rescale),
    ("lowlight-color", lowlight_color),
    ("matte", matte),
    ("median", median),
    ("mode", mode),
    ("modulate", modulate),
    ("monochrome", monochrome),
    ("morphology", morphology),
    ("motion-blur", motion_blur),
    ("negate", negate),
    ("noise", noise),
    ("normalize", normalize),
    ("opaque", opaque),
    ("ordered-dither", ordered_dither),
    ("paint", paint),
    ("polaroid", polaroid),
    ("posterize", posterize),
    ("radial-blur", radial_blur),
    ("raise", raise),
    ("random-threshold", random_threshold),
    ("repage", repage),
    ("resample", resample),
    ("resize", resize),
    ("roll", roll),
    ("rotate", rotate),
    ("sample", sample),
    ("scale", scale),
    ("segment", segment),
    ("selective-blur", selective_blur),
    ("separate", separate),
    ("sepia-tone", sepia_tone),
    ("set", set),
    ("shade", shade),
    ("shadow", shadow),
    ("sharpen", sharpen),
    ("shave", shave),
    ("shear", shear),
    ("sigmoidal-contrast", sigmoidal_contrast),
    ("sketch", sketch),
    ("solarize", solarize),
    ("sparse-color", sparse_color),
    ("splice", splice),
    ("spread", spread),
    ("statistic", statistic),
    ("strip", strip),
    ("swirl", swirl),
    ("threshold", threshold),
    ("thumbnail", thumbnail),
    ("tint", tint),
    ("transform", affine_transform),
    ("transparent", transparent),
    ("transpose", transpose),
    ("transverse", transverse),
    ("trim", trim),
    ("type", image_type),
    ("unique", unique),
    ("unique-colors", unique_colors),
    ("unsharp", unsharp),
    ("verbose", verbose),
    ("vignette", vignette),
    ("wave", wave),
    ("white-threshold", white_threshold),
];

// ============================================================================
// Argument helpers
// ============================================================================

fn invalid(text: &str) -> ExceptionKind {
    ExceptionKind::InvalidArgument(text.to_string())
}

/// `value` as given, or as a percentage of `base` when the geometry had `%`.
fn scaled(g: &GeometryInfo, value: f64, base: f64) -> f64 {
    if g.has(GeometryFlags::PERCENT) {
        value * base / 100.0
    } else {
        value
    }
}

/// A channel value: a plain number, or a percentage of the quantum range.
fn quantum_value(text: &str) -> Result<f64, ExceptionKind> {
    parse_si_size(text, QUANTUM_RANGE).ok_or_else(|| invalid(text))
}

fn integer<T: FromStr>(text: &str) -> Result<T, ExceptionKind> {
    text.trim().parse().map_err(|_| invalid(text))
}

/// Comma or space separated numbers.
fn numbers(text: &str) -> Result<Vec<f64>, ExceptionKind> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| invalid(text)))
        .collect()
}

fn read_file(path: &str) -> Result<Vec<u8>, ExceptionKind> {
    std::fs::read(path).map_err(|e| ExceptionKind::UnableToReadImage {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn emit(wand: &mut Wand, text: &str, newline: bool) -> Result<(), ExceptionKind> {
    let out = wand.out();
    let written = if newline {
        writeln!(out, "{text}")
    } else {
        write!(out, "{text}")
    };
    written.map_err(|e| ExceptionKind::Collaborator(e.to_string()))
}

fn expand(wand: &Wand, image: &Image, text: &str) -> Result<String, ExceptionKind> {
    let ctx = PropertyContext {
        info: &wand.image_info,
        image: Some(image),
        list_len: wand.images.len(),
    };
    Ok(interpret_properties(text, &ctx)?)
}

fn run(wand: &Wand, image: &mut Image, op: Transform) -> Step {
    transform(wand, image, &op)
}

// ============================================================================
// Blur, sharpen and edge family
// ============================================================================

fn blur_with(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>, kind: BlurKind) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Blur {
        kind,
        radius: g.rho,
        sigma: g.sigma_or(1.0),
    })
}

fn adaptive_blur(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    blur_with(wand, image, inv, BlurKind::Adaptive)
}

fn blur(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    blur_with(wand, image, inv, BlurKind::Standard)
}

fn gaussian_blur(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    blur_with(wand, image, inv, BlurKind::Gaussian)
}

fn sharpen_with(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>, adaptive: bool) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Sharpen {
        radius: g.rho,
        sigma: g.sigma_or(1.0),
        adaptive,
    })
}

fn adaptive_sharpen(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    sharpen_with(wand, image, inv, true)
}

fn sharpen(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    sharpen_with(wand, image, inv, false)
}

fn charcoal(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Charcoal {
        radius: g.rho,
        sigma: g.sigma_or(1.0),
    })
}

fn edge(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Edge { radius: g.rho })
}

fn emboss(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Emboss {
        radius: g.rho,
        sigma: g.sigma_or(1.0),
    })
}

fn motion_blur(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::MotionBlur {
        radius: g.rho,
        sigma: g.sigma_or(1.0),
        angle: g.xi,
    })
}

fn radial_blur(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::RadialBlur(g.rho))
}

fn selective_blur(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::SelectiveBlur {
        radius: g.rho,
        sigma: g.sigma_or(1.0),
        threshold: scaled(&g, g.xi, QUANTUM_RANGE),
    })
}

fn sketch(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Sketch {
        radius: g.rho,
        sigma: g.sigma_or(1.0),
        angle: g.xi,
    })
}

fn spread(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Spread { radius: g.rho })
}

fn swirl(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Swirl(g.rho))
}

fn implode(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Implode(g.rho))
}

fn wave(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let background = image.background;
    run(wand, image, Transform::Wave {
        amplitude: g.rho,
        wavelength: g.sigma_or(1.0),
        background,
    })
}

fn unsharp(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Unsharp {
        radius: g.rho,
        sigma: g.sigma_or(1.0),
        amount: g.xi_or(1.0),
        threshold: g.psi_or(0.05),
    })
}

// ============================================================================
// Resize family
// ============================================================================

fn resize_with(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>, method: ResizeMethod) -> Step {
    let region = inv.region()?;
    let (width, height) = resize_dimensions(image.dimensions(), &region);
    if (width, height) == image.dimensions() && method != ResizeMethod::Thumbnail {
        return Ok(None);
    }
    run(wand, image, Transform::Resize {
        width,
        height,
        method,
    })
}

fn adaptive_resize(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    resize_with(wand, image, inv, ResizeMethod::Adaptive)
}

fn interpolative_resize(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    resize_with(wand, image, inv, ResizeMethod::Interpolative)
}

fn liquid_rescale(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    resize_with(wand, image, inv, ResizeMethod::LiquidRescale)
}

fn resize(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let filter = image.filter;
    resize_with(wand, image, inv, ResizeMethod::Resize(filter))
}

fn sample(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    resize_with(wand, image, inv, ResizeMethod::Sample)
}

fn scale(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    resize_with(wand, image, inv, ResizeMethod::Scale)
}

fn thumbnail(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    resize_with(wand, image, inv, ResizeMethod::Thumbnail)
}

/// Resize so the image keeps its physical size at a new resolution.
fn resample(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let target = (g.rho, g.sigma_or(g.rho));
    if target.0 <= 0.0 || target.1 <= 0.0 {
        return Err(ExceptionKind::InvalidGeometry(inv.arg1()?.to_string()));
    }
    let (dx, dy) = image.density.unwrap_or((72.0, 72.0));
    let (w, h) = image.dimensions();
    let width = ((w as f64 * target.0 / dx).round() as u32).max(1);
    let height = ((h as f64 * target.1 / dy).round() as u32).max(1);
    let filter = image.filter;
    let step = run(wand, image, Transform::Resize {
        width,
        height,
        method: ResizeMethod::Resize(filter),
    })?;
    Ok(with_each(step, image, |i| i.density = Some(target)))
}

/// Apply `edit` to whatever image survives a step.
fn with_each(step: Option<Vec<Image>>, image: &mut Image, edit: impl Fn(&mut Image)) -> Option<Vec<Image>> {
    match step {
        Some(mut images) => {
            images.iter_mut().for_each(&edit);
            Some(images)
        }
        None => {
            edit(image);
            None
        }
    }
}

// ============================================================================
// Color, tone and alpha
// ============================================================================

fn alpha(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let mode = inv.keyword::<AlphaChannel>()?;
    run(wand, image, Transform::Alpha(mode))
}

fn matte(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let mode = if inv.normal {
        AlphaChannel::Set
    } else {
        AlphaChannel::Deactivate
    };
    run(wand, image, Transform::Alpha(mode))
}

fn auto_gamma(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::AutoGamma)
}

fn auto_level(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::AutoLevel)
}

fn black_threshold(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let value = quantum_value(inv.arg1()?)?;
    run(wand, image, Transform::BlackThreshold(value))
}

fn white_threshold(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let value = quantum_value(inv.arg1()?)?;
    run(wand, image, Transform::WhiteThreshold(value))
}

fn blue_shift(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let factor = match inv.arg1 {
        Some(_) if inv.normal => inv.geometry()?.rho,
        _ => 1.5,
    };
    run(wand, image, Transform::BlueShift(factor))
}

fn brightness_contrast(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::BrightnessContrast {
        brightness: g.rho,
        contrast: g.sigma_or(0.0),
    })
}

fn cdl(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let path = inv.arg1()?;
    let text = String::from_utf8_lossy(&read_file(path)?).into_owned();
    run(wand, image, Transform::ColorDecisionList(text))
}

fn cipher(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let passphrase = read_file(inv.arg1()?)?;
    run(wand, image, Transform::Cipher {
        passphrase,
        encipher: inv.name == "encipher",
    })
}

fn clamp(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Clamp)
}

/// `-colorize 30` or per channel `-colorize 10,20,30`.
fn colorize(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let blend = [g.rho, g.sigma_or(g.rho), g.xi_or(g.rho)];
    let fill = wand.draw_info.fill;
    run(wand, image, Transform::Colorize { blend, fill })
}

fn color_matrix(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let matrix = inv.arg1()?.to_string();
    run(wand, image, Transform::ColorMatrix(matrix))
}

fn colors(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let colors: usize = integer(inv.arg1()?)?;
    if colors == 0 {
        return Ok(None);
    }
    let (dither, tree_depth) = (wand.quantize_info.dither, wand.quantize_info.tree_depth);
    run(wand, image, Transform::Quantize {
        colors,
        dither,
        tree_depth,
    })
}

fn colorspace(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let target = if inv.normal {
        inv.keyword::<Colorspace>()?
    } else {
        Colorspace::Srgb
    };
    if image.colorspace == target {
        return Ok(None);
    }
    let step = run(wand, image, Transform::Colorspace(target))?;
    Ok(with_each(step, image, |i| i.colorspace = target))
}

fn contrast(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Contrast { sharpen: inv.normal })
}

/// Black and white points for the histogram stretches, as pixel counts.
fn stretch_arguments(g: &GeometryInfo, pixels: f64) -> (f64, f64) {
    let black = scaled(g, g.rho, pixels);
    let white = scaled(g, g.sigma_or(g.rho), pixels);
    (black, white)
}

fn contrast_stretch(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let (w, h) = image.dimensions();
    let (black, white) = stretch_arguments(&g, (w as f64) * (h as f64));
    run(wand, image, Transform::ContrastStretch { black, white })
}

fn linear_stretch(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let (w, h) = image.dimensions();
    let (black, white) = stretch_arguments(&g, (w as f64) * (h as f64));
    run(wand, image, Transform::LinearStretch { black, white })
}

fn cycle(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let amount = integer(inv.arg1()?)?;
    run(wand, image, Transform::Cycle(amount))
}

/// `-deskew 40%`; `+deskew` uses 40%.
fn deskew(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let threshold = if inv.normal {
        quantum_value(inv.arg1()?)? / QUANTUM_RANGE
    } else {
        0.4
    };
    run(wand, image, Transform::Deskew(threshold))
}

fn despeckle(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Despeckle)
}

fn enhance(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Enhance)
}

fn equalize(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Equalize)
}

fn normalize(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Normalize)
}

fn evaluate(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let op = inv.keyword::<EvaluateOp>()?;
    let value = quantum_value(inv.arg2()?)?;
    run(wand, image, Transform::Evaluate { op, value })
}

fn function(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let function = inv.keyword::<FunctionKind>()?;
    let parameters = numbers(inv.arg2()?)?;
    run(wand, image, Transform::Function {
        function,
        parameters,
    })
}

/// `-gamma` corrects pixels; `+gamma` only records the value.
fn gamma(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    if !inv.normal {
        image.set_property("gamma", g.rho.to_string());
        return Ok(None);
    }
    run(wand, image, Transform::Gamma(g.rho))
}

/// Black point, white point and gamma of `-level black[,white][,gamma][%]`.
///
/// Without a white point the range is made symmetric: `-level 10%` stretches
/// 10%..90%.
fn level_arguments(g: &GeometryInfo) -> (f64, f64, f64) {
    let black = scaled(g, g.rho, QUANTUM_RANGE);
    let white = if g.has(GeometryFlags::SIGMA) {
        scaled(g, g.sigma, QUANTUM_RANGE)
    } else {
        QUANTUM_RANGE - black
    };
    (black, white, g.xi_or(1.0))
}

fn level(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let (black, white, gamma) = level_arguments(&inv.geometry()?);
    run(wand, image, Transform::Level {
        black,
        white,
        gamma,
        invert: !inv.normal,
    })
}

/// Split `black,white` on the first comma outside parentheses.
fn split_color_pair(text: &str) -> (&str, Option<&str>) {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return (&text[..i], Some(&text[i + 1..])),
            _ => {}
        }
    }
    (text, None)
}

fn level_colors(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let (first, second) = split_color_pair(inv.arg1()?);
    let black = parse_color(first.trim())?;
    let white = match second {
        Some(text) if !text.trim().is_empty() => parse_color(text.trim())?,
        _ => black,
    };
    run(wand, image, Transform::LevelColors {
        black,
        white,
        invert: !inv.normal,
    })
}

fn modulate(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Modulate {
        brightness: g.rho,
        saturation: g.sigma_or(100.0),
        hue: g.xi_or(100.0),
    })
}

fn monochrome(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Type(ImageType::Bilevel))
}

fn negate(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Negate {
        spare_alpha: !inv.normal,
    })
}

fn opaque(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let target = inv.color()?;
    let (fill, fuzz) = (wand.draw_info.fill, image.fuzz);
    run(wand, image, Transform::Opaque {
        target,
        fill,
        fuzz,
        invert: !inv.normal,
    })
}

fn transparent(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let target = inv.color()?;
    let fuzz = image.fuzz;
    run(wand, image, Transform::Transparent {
        target,
        fuzz,
        invert: !inv.normal,
    })
}

fn ordered_dither(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let map = inv.arg1()?.to_string();
    run(wand, image, Transform::OrderedDither(map))
}

fn posterize(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let levels = integer(inv.arg1()?)?;
    run(wand, image, Transform::Posterize(levels))
}

fn random_threshold(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let low = scaled(&g, g.rho, QUANTUM_RANGE);
    let high = scaled(&g, g.sigma_or(g.rho), QUANTUM_RANGE);
    run(wand, image, Transform::RandomThreshold { low, high })
}

fn segment(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Segment {
        cluster_threshold: g.rho,
        smoothing: g.sigma_or(1.5),
    })
}

fn sepia_tone(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let value = quantum_value(inv.arg1()?)?;
    run(wand, image, Transform::SepiaTone(value))
}

fn solarize(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let value = quantum_value(inv.arg1()?)?;
    run(wand, image, Transform::Solarize(value))
}

fn sigmoidal_contrast(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let midpoint = if g.has(GeometryFlags::SIGMA) {
        scaled(&g, g.sigma, QUANTUM_RANGE)
    } else {
        QUANTUM_RANGE / 2.0
    };
    run(wand, image, Transform::SigmoidalContrast {
        sharpen: inv.normal,
        contrast: g.rho,
        midpoint,
    })
}

fn threshold(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let value = if inv.normal {
        quantum_value(inv.arg1()?)?
    } else {
        QUANTUM_RANGE / 2.0
    };
    run(wand, image, Transform::Threshold(value))
}

fn lat(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let width = g.rho.max(1.0) as u32;
    let height = g.sigma_or(g.rho).max(1.0) as u32;
    run(wand, image, Transform::LocalThreshold {
        width,
        height,
        offset: scaled(&g, g.xi, QUANTUM_RANGE),
    })
}

fn tint(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let fill = wand.draw_info.fill;
    run(wand, image, Transform::Tint { amount: g.rho, fill })
}

fn image_type(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    if !inv.normal {
        return Ok(None);
    }
    let kind = inv.keyword::<ImageType>()?;
    run(wand, image, Transform::Type(kind))
}

fn unique_colors(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::UniqueColors)
}

// ============================================================================
// Geometry
// ============================================================================

/// The transforms that bring an image with `orientation` upright.
fn orientation_fix(orientation: Orientation) -> Option<Transform> {
    let rotate = |degrees| Transform::Rotate {
        degrees,
        background: Color::TRANSPARENT,
    };
    match orientation {
        Orientation::TopRight => Some(Transform::Flop),
        Orientation::BottomRight => Some(rotate(180.0)),
        Orientation::BottomLeft => Some(Transform::Flip),
        Orientation::LeftTop => Some(Transform::Transpose),
        Orientation::RightTop => Some(rotate(90.0)),
        Orientation::RightBottom => Some(Transform::Transverse),
        Orientation::LeftBottom => Some(rotate(270.0)),
        Orientation::TopLeft | Orientation::Undefined => None,
    }
}

fn auto_orient(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    let Some(op) = orientation_fix(image.orientation) else {
        return Ok(None);
    };
    let step = run(wand, image, op)?;
    Ok(with_each(step, image, |i| i.orientation = Orientation::TopLeft))
}

fn border(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let (w, h) = image.dimensions();
    let width = scaled(&g, g.rho, w as f64).max(0.0) as u32;
    let height = scaled(&g, g.sigma_or(g.rho), h as f64).max(0.0) as u32;
    let compose = wand
        .image_info
        .option_as::<Compose>("compose")
        .unwrap_or(Compose::Over);
    let color = image.border_color;
    run(wand, image, Transform::Border {
        width,
        height,
        color,
        compose,
    })
}

fn region_rect(inv: &Invocation<'_>, image: &Image) -> Result<Rect, ExceptionKind> {
    let region = inv.region()?;
    let (w, h) = image.dimensions();
    Ok(Rect::new(
        region.x,
        region.y,
        region.width.unwrap_or(w as f64).max(0.0) as u32,
        region.height.or(region.width).unwrap_or(h as f64).max(0.0) as u32,
    ))
}

fn chop(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let rect = region_rect(inv, image)?;
    run(wand, image, Transform::Chop(rect))
}

fn crop(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let region = inv.region()?;
    let regions = crop_regions(image.dimensions(), &region);
    if regions.is_empty() {
        return Err(ExceptionKind::InvalidGeometry(inv.arg1()?.to_string()));
    }
    run(wand, image, Transform::Crop(regions))
}

fn distort(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let method = inv.keyword::<DistortMethod>()?;
    let args = numbers(inv.arg2()?)?;
    run(wand, image, Transform::Distort {
        method,
        args,
        bestfit: !inv.normal,
    })
}

/// `-extent WxH+X+Y`; with a gravity the offset is relative to that edge.
fn extent(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let region = inv.region()?;
    let dims = image.dimensions();
    let width = region.width.filter(|w| *w > 0.0).map_or(dims.0, |w| w as u32);
    let height = region.height.filter(|h| *h > 0.0).map_or(dims.1, |h| h as u32);
    let (x, y) = match image.gravity {
        Gravity::Undefined | Gravity::Forget => (region.x, region.y),
        gravity => {
            let (ox, oy) = gravity_offset(gravity, (width, height), dims, (0, 0));
            (region.x - ox, region.y - oy)
        }
    };
    let background = image.background;
    run(wand, image, Transform::Extent {
        width,
        height,
        x,
        y,
        background,
    })
}

fn flip(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Flip)
}

fn flop(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Flop)
}

fn transpose(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Transpose)
}

fn transverse(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    run(wand, image, Transform::Transverse)
}

/// `-frame WxH+outer+inner`.
fn frame(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let (color, compose) = (image.matte_color, image.compose);
    run(wand, image, Transform::Frame {
        width: g.rho.max(0.0) as u32,
        height: g.sigma_or(g.rho).max(0.0) as u32,
        outer_bevel: g.xi as i64,
        inner_bevel: g.psi as i64,
        color,
        compose,
    })
}

/// With an offset, record where `-composite` should place the image.
/// Otherwise resize to the given size.
fn geometry(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    if !inv.normal {
        image.artifacts.remove("geometry");
        return Ok(None);
    }
    let region = inv.region()?;
    if region.has_offset() {
        image.artifacts.insert("geometry".into(), inv.arg1()?.to_string());
        return Ok(None);
    }
    resize(wand, image, inv)
}

fn raise(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Raise {
        width: g.rho.max(0.0) as u32,
        height: g.sigma_or(g.rho).max(0.0) as u32,
        raise: inv.normal,
    })
}

fn repage(_wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    if !inv.normal {
        image.page = Page::default();
        return Ok(None);
    }
    let region = inv.region()?;
    if let Some(w) = region.width {
        image.page.width = w.max(0.0) as u32;
        image.page.height = region.height.unwrap_or(w).max(0.0) as u32;
    }
    if region.has_offset() {
        image.page.x = region.x;
        image.page.y = region.y;
    }
    Ok(None)
}

fn roll(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let region = inv.region()?;
    run(wand, image, Transform::Roll {
        x: region.x,
        y: region.y,
    })
}

/// `-rotate 90>` only turns landscape images, `-rotate 90<` only portrait.
fn rotate(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let (w, h) = image.dimensions();
    if (g.has(GeometryFlags::GREATER) && w <= h) || (g.has(GeometryFlags::LESS) && w >= h) {
        return Ok(None);
    }
    let background = image.background;
    run(wand, image, Transform::Rotate {
        degrees: g.rho,
        background,
    })
}

fn shave(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let (w, h) = image.dimensions();
    run(wand, image, Transform::Shave {
        width: scaled(&g, g.rho, w as f64).max(0.0) as u32,
        height: scaled(&g, g.sigma_or(g.rho), h as f64).max(0.0) as u32,
    })
}

fn shear(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let background = image.background;
    run(wand, image, Transform::Shear {
        x_degrees: g.rho,
        y_degrees: g.sigma_or(g.rho),
        background,
    })
}

fn splice(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let region = region_rect(inv, image)?;
    let background = image.background;
    run(wand, image, Transform::Splice { region, background })
}

fn affine_transform(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    let affine = wand.draw_info.affine;
    run(wand, image, Transform::AffineTransform(affine))
}

fn trim(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    let fuzz = image.fuzz;
    run(wand, image, Transform::Trim { fuzz })
}

fn vignette(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let (w, h) = image.dimensions();
    let x = if g.has(GeometryFlags::XI) {
        scaled(&g, g.xi, w as f64)
    } else {
        w as f64 * 0.1
    };
    let y = if g.has(GeometryFlags::PSI) {
        scaled(&g, g.psi, h as f64)
    } else {
        h as f64 * 0.1
    };
    let background = image.background;
    run(wand, image, Transform::Vignette {
        radius: g.rho,
        sigma: g.sigma_or(1.0),
        x: x as i64,
        y: y as i64,
        background,
    })
}

fn shadow(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Shadow {
        opacity: g.rho,
        sigma: g.sigma_or(1.0),
        x: g.xi_or(4.0) as i64,
        y: g.psi_or(4.0) as i64,
    })
}

fn shade(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::Shade {
        azimuth: g.rho,
        elevation: g.sigma_or(1.0),
        gray: inv.normal,
    })
}

/// A stable pseudo-random tilt in roughly ±11 degrees for `+polaroid`.
fn polaroid_tilt(image: &Image) -> f64 {
    let mut hasher = DefaultHasher::new();
    image.filename.hash(&mut hasher);
    image.scene.hash(&mut hasher);
    let unit = (hasher.finish() % 10_000) as f64 / 10_000.0;
    22.5 * (unit - 0.5)
}

fn polaroid(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let angle = if inv.normal {
        inv.geometry()?.rho
    } else {
        polaroid_tilt(image)
    };
    let caption = match wand.image_info.option("caption") {
        Some(text) => Some(expand(wand, image, text)?),
        None => None,
    };
    let draw = Box::new(wand.draw_info.clone());
    run(wand, image, Transform::Polaroid {
        angle,
        caption,
        draw,
    })
}

// ============================================================================
// Neighbourhood statistics and morphology
// ============================================================================

fn statistic_with(wand: &mut Wand, image: &mut Image, g: &GeometryInfo, kind: StatisticType) -> Step {
    run(wand, image, Transform::Statistic {
        kind,
        width: g.rho.max(1.0) as u32,
        height: g.sigma_or(g.rho).max(1.0) as u32,
    })
}

fn median(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    statistic_with(wand, image, &g, StatisticType::Median)
}

fn mode(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    statistic_with(wand, image, &g, StatisticType::Mode)
}

/// `-noise radius` reduces noise; `+noise type` adds it.
fn noise(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    if inv.normal {
        let g = inv.geometry()?;
        return statistic_with(wand, image, &g, StatisticType::Nonpeak);
    }
    let noise = inv.keyword::<NoiseType>()?;
    let attenuate = wand.image_info.option_as::<f64>("attenuate").unwrap_or(1.0);
    run(wand, image, Transform::Noise { noise, attenuate })
}

fn statistic(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let kind = inv.keyword::<StatisticType>()?;
    let g = parse_geometry(inv.arg2()?)?;
    statistic_with(wand, image, &g, kind)
}

/// `-morphology method[:iterations] kernel`.
fn morphology(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let spec = inv.arg1()?;
    let (name, iterations) = match spec.split_once(':') {
        Some((name, count)) => (name, integer::<i64>(count)?),
        None => (spec, 1),
    };
    let method = name.parse::<MorphologyMethod>()?;
    let kernel = inv.arg2()?.to_string();
    if kernel.trim().is_empty() {
        return Err(invalid(&kernel));
    }
    run(wand, image, Transform::Morphology {
        method,
        iterations,
        kernel,
    })
}

fn convolve(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let kernel = inv.arg1()?.to_string();
    run(wand, image, Transform::Morphology {
        method: MorphologyMethod::Convolve,
        iterations: 1,
        kernel,
    })
}

fn paint(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    run(wand, image, Transform::OilPaint { radius: g.rho })
}

// ============================================================================
// Metadata, artifacts and properties
// ============================================================================

fn depth(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    image.depth = wand.image_info.depth.unwrap_or(8);
    Ok(None)
}

fn strip(_wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    image.strip();
    Ok(None)
}

fn set_artifact(image: &mut Image, key: &str, value: Option<&str>) {
    match value {
        Some(value) => {
            image.artifacts.insert(key.to_string(), value.to_string());
        }
        None => {
            image.artifacts.remove(key);
        }
    }
}

fn features(_wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    if inv.normal {
        set_artifact(image, "identify:features", Some(inv.arg1()?));
        set_artifact(image, "verbose", Some("true"));
    } else {
        set_artifact(image, "identify:features", None);
    }
    Ok(None)
}

fn unique(_wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    if inv.normal {
        set_artifact(image, "identify:unique-colors", Some("true"));
        set_artifact(image, "verbose", Some("true"));
    } else {
        set_artifact(image, "identify:unique-colors", None);
    }
    Ok(None)
}

fn compare_color(image: &mut Image, key: &str, inv: &Invocation<'_>) -> Step {
    if inv.normal {
        let text = inv.arg1()?;
        parse_color(text)?;
        set_artifact(image, key, Some(text));
    } else {
        set_artifact(image, key, None);
    }
    Ok(None)
}

fn highlight_color(_wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    compare_color(image, "compare:highlight-color", inv)
}

fn lowlight_color(_wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    compare_color(image, "compare:lowlight-color", inv)
}

fn verbose(_wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    set_artifact(image, "verbose", inv.normal.then_some("true"));
    Ok(None)
}

/// `-set key value` / `+set key`.
///
/// `option:key` goes to the settings as well as the image; `registry:` keys
/// are not kept.
fn set(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let key = inv.arg1()?;
    if key.starts_with("registry:") {
        return Ok(None);
    }
    if let Some(name) = key.strip_prefix("option:") {
        if inv.normal {
            let value = inv.arg2()?;
            wand.image_info.set_option(name, value);
            set_artifact(image, name, Some(value));
        } else {
            wand.image_info.remove_option(name);
            set_artifact(image, name, None);
        }
        return Ok(None);
    }
    if inv.normal {
        let value = expand(wand, image, inv.arg2()?)?;
        image.set_property(key, value);
    } else {
        image.properties.remove(key);
    }
    Ok(None)
}

// ============================================================================
// Drawing and text
// ============================================================================

/// `-annotate XdegxYdeg+X+Y text`.
fn annotate(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let g = inv.geometry()?;
    let (rx, ry) = (g.rho.rem_euclid(360.0), g.sigma_or(g.rho).rem_euclid(360.0));
    let (rx, ry) = (rx * PI / 180.0, ry * PI / 180.0);
    let mut draw = Box::new(wand.draw_info.clone());
    draw.affine = [rx.cos(), ry.sin(), -rx.sin(), ry.cos(), 0.0, 0.0];
    let text = expand(wand, image, inv.arg2()?)?;
    run(wand, image, Transform::Annotate {
        text,
        x: g.xi,
        y: g.psi,
        draw,
    })
}

fn draw(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let primitive = inv.arg1()?.to_string();
    let draw = Box::new(wand.draw_info.clone());
    run(wand, image, Transform::Draw { primitive, draw })
}

// ============================================================================
// Channels, fills and output
// ============================================================================

fn separate(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    let channels = image.channels;
    run(wand, image, Transform::Separate(channels))
}

/// `-channel` copies the mask the setting just stored onto the image;
/// `+channel` separates the current channels.
fn channel(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    if inv.normal {
        image.channels = wand.image_info.channels;
        return Ok(None);
    }
    separate(wand, image, inv)
}

fn identify(wand: &mut Wand, image: &mut Image, _inv: &Invocation<'_>) -> Step {
    match wand.image_info.option("format") {
        Some(format) => {
            let text = expand(wand, image, format)?;
            emit(wand, &text, false)?;
        }
        None => {
            let line = output::identify_line(image);
            emit(wand, &line, true)?;
        }
    }
    Ok(None)
}

/// `-floodfill +X+Y color`: fill from the seed over pixels matching `color`.
fn floodfill(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let region = inv.region()?;
    let target = parse_color(inv.arg2()?)?;
    let (fill, fuzz) = (wand.draw_info.fill, image.fuzz);
    run(wand, image, Transform::Floodfill {
        x: region.x,
        y: region.y,
        target,
        fill,
        fuzz,
        invert: !inv.normal,
    })
}

fn sparse_color(wand: &mut Wand, image: &mut Image, inv: &Invocation<'_>) -> Step {
    let method = inv.keyword::<SparseColorMethod>()?;
    let channels = image.channels;
    let points = parse_sparse_color(inv.arg2()?, channels)?;
    run(wand, image, Transform::SparseColor {
        method,
        channels,
        points,
    })
}

// ============================================================================
// Sparse color arguments
// ============================================================================

/// Split on whitespace and commas, keeping `rgb(...)` style colors whole.
fn sparse_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (i, c) in text.char_indices() {
        let separator = depth == 0 && (c == ',' || c.is_whitespace());
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if separator {
            if let Some(s) = start.take() {
                tokens.push(&text[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}

fn looks_numeric(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
}

/// Parse `x,y color x,y color ...` control points.
///
/// A color may also be written as one number per selected channel, each in
/// `0.0..=1.0`. Values are stored in channel order, one slot per selected
/// channel.
pub fn parse_sparse_color(text: &str, channels: Channels) -> Result<Vec<SparsePoint>, ExceptionKind> {
    let channels = if channels.count() == 0 {
        Channels::RGB
    } else {
        channels
    };
    let selected = channels.indexes();
    let tokens = sparse_tokens(text);
    let mut rest = tokens.iter().copied();
    let mut points = Vec::new();
    while let Some(x) = rest.next() {
        let x: f64 = x.parse().map_err(|_| invalid(text))?;
        let y: f64 = rest
            .next()
            .and_then(|y| y.parse().ok())
            .ok_or_else(|| invalid(text))?;
        let first = rest.next().ok_or_else(|| invalid(text))?;
        let mut values = [0.0; 4];
        if looks_numeric(first) {
            values[0] = first.parse().map_err(|_| invalid(text))?;
            for slot in values.iter_mut().take(selected.len()).skip(1) {
                *slot = rest
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| invalid(text))?;
            }
        } else {
            let color = parse_color(first).map_err(|_| invalid(text))?;
            let rgba = color.to_rgba().0;
            for (slot, &channel) in values.iter_mut().zip(&selected) {
                *slot = rgba[channel] as f64 / QUANTUM_RANGE;
            }
        }
        points.push(SparsePoint { x, y, values });
    }
    if points.is_empty() {
        return Err(invalid(text));
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::test_helpers::*;

    fn geometry(text: &str) -> GeometryInfo {
        parse_geometry(text).unwrap()
    }

    #[test]
    fn every_handler_name_is_unique() {
        let mut names: Vec<&str> = HANDLERS.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn negate_twice_is_identity() {
        let (mut wand, ops) = mock_wand();
        wand.images.push(Image::canvas(3, 2, Color::rgb(10, 200, 30)));
        let before = wand.images.at(0).unwrap().signature();
        wand.apply_simple_operator("-negate", None, None).unwrap();
        assert_ne!(wand.images.at(0).unwrap().signature(), before);
        wand.apply_simple_operator("-negate", None, None).unwrap();
        assert_eq!(wand.images.at(0).unwrap().signature(), before);
        assert_eq!(transform_count(&ops, "negate"), 2);
    }

    #[test]
    fn crop_outside_the_image_reports_and_keeps_it() {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, &["a.png"]);
        wand.apply_simple_operator("-crop", Some("2x2+50+50"), None).unwrap();
        assert_eq!(wand.images.len(), 1);
        assert_eq!(transform_count(&ops, "crop"), 0);
        assert!(matches!(
            exception_kinds(&wand)[..],
            [ExceptionKind::InvalidGeometry(_)]
        ));
    }

    #[test]
    fn rotate_respects_orientation_conditions() {
        let (mut wand, ops) = mock_wand();
        wand.images.push(Image::canvas(6, 3, Color::WHITE));
        wand.apply_simple_operator("-rotate", Some("90<"), None).unwrap();
        assert_eq!(transform_count(&ops, "rotate"), 0);
        wand.apply_simple_operator("-rotate", Some("90>"), None).unwrap();
        assert_eq!(transform_count(&ops, "rotate"), 1);
    }

    #[test]
    fn level_arguments_follow_the_symmetric_default() {
        assert_eq!(level_arguments(&geometry("10,200")), (10.0, 200.0, 1.0));
        let (black, white, gamma) = level_arguments(&geometry("10%"));
        assert!((black - 25.5).abs() < 1e-9);
        assert!((white - 229.5).abs() < 1e-9);
        assert_eq!(gamma, 1.0);
        assert_eq!(level_arguments(&geometry("0,255,0.5")).2, 0.5);
    }

    #[test]
    fn stretch_white_defaults_to_black() {
        assert_eq!(stretch_arguments(&geometry("5"), 100.0), (5.0, 5.0));
        assert_eq!(stretch_arguments(&geometry("2x3%"), 200.0), (4.0, 6.0));
    }

    #[test]
    fn missing_geometry_is_reported_per_image() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a.png", "b.png"]);
        wand.apply_simple_operator("-blur", None, None).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::MissingArgument; 2]);
    }

    #[test]
    fn set_interprets_property_values() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a.png"]);
        wand.apply_simple_operator("-set", Some("comment"), Some("%wx%h")).unwrap();
        assert_eq!(wand.images.at(0).unwrap().property("comment"), Some("4x4"));
        wand.apply_simple_operator("+set", Some("comment"), None).unwrap();
        assert_eq!(wand.images.at(0).unwrap().property("comment"), None);
    }

    #[test]
    fn set_option_reaches_the_settings() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a.png"]);
        wand.apply_simple_operator("-set", Some("option:distort:viewport"), Some("10x10"))
            .unwrap();
        assert_eq!(wand.image_info.option("distort:viewport"), Some("10x10"));
        assert_eq!(
            wand.images.at(0).unwrap().artifacts.get("distort:viewport").map(String::as_str),
            Some("10x10")
        );
    }

    #[test]
    fn auto_orient_resets_orientation() {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, &["a.png", "b.png"]);
        wand.images.at_mut(0).unwrap().orientation = Orientation::RightTop;
        wand.apply_simple_operator("-auto-orient", None, None).unwrap();
        assert_eq!(transform_count(&ops, "rotate"), 1);
        assert_eq!(wand.images.at(0).unwrap().orientation, Orientation::TopLeft);
        assert_eq!(wand.images.at(1).unwrap().orientation, Orientation::Undefined);
    }

    #[test]
    fn geometry_with_offset_is_recorded_not_applied() {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, &["a.png"]);
        wand.apply_simple_operator("-geometry", Some("+5+6"), None).unwrap();
        assert_eq!(
            wand.images.at(0).unwrap().artifacts.get("geometry").map(String::as_str),
            Some("+5+6")
        );
        assert_eq!(transform_count(&ops, "resize"), 0);
        wand.apply_simple_operator("-geometry", Some("8x8"), None).unwrap();
        assert_eq!(dimensions(&wand), vec![(8, 8)]);
    }

    #[test]
    fn repage_edits_only_the_page() {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, &["a.png"]);
        wand.apply_simple_operator("-repage", Some("100x50+3+4"), None).unwrap();
        let page = wand.images.at(0).unwrap().page;
        assert_eq!((page.width, page.height, page.x, page.y), (100, 50, 3, 4));
        wand.apply_simple_operator("+repage", None, None).unwrap();
        assert!(wand.images.at(0).unwrap().page.is_unset());
        assert!(ops.lock().unwrap().is_empty());
    }

    #[test]
    fn identify_prints_one_line_per_image() {
        let (mut wand, _, out) = mock_wand_with_output();
        push_named(&mut wand, &["a.png", "b.png"]);
        wand.apply_simple_operator("-identify", None, None).unwrap();
        let text = out.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("a.png"));
        assert!(lines[1].starts_with("b.png"));
    }

    #[test]
    fn identify_uses_the_format_option() {
        let (mut wand, _, out) = mock_wand_with_output();
        push_named(&mut wand, &["a.png"]);
        wand.image_info.set_option("format", "%f %wx%h\\n");
        wand.apply_simple_operator("-identify", None, None).unwrap();
        assert_eq!(out.contents(), "a.png 4x4\n");
    }

    #[test]
    fn plus_gamma_only_records() {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, &["a.png"]);
        wand.apply_simple_operator("+gamma", Some("2.2"), None).unwrap();
        assert_eq!(wand.images.at(0).unwrap().property("gamma"), Some("2.2"));
        assert_eq!(transform_count(&ops, "gamma"), 0);
    }

    #[test]
    fn zero_colors_is_a_no_op() {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, &["a.png"]);
        wand.apply_simple_operator("-colors", Some("0"), None).unwrap();
        assert!(ops.lock().unwrap().is_empty());
        wand.apply_simple_operator("-colors", Some("16"), None).unwrap();
        assert_eq!(transform_count(&ops, "quantize"), 1);
    }

    #[test]
    fn separate_splits_into_channels() {
        let (mut wand, _) = mock_wand_with(MockBackend::new());
        push_named(&mut wand, &["a.png", "b.png"]);
        wand.apply_setting("-channel", Some("RGB")).unwrap();
        wand.apply_simple_operator("-separate", None, None).unwrap();
        assert_eq!(wand.images.len(), 6);
        assert_list_shape(&wand, &["a.png", "a.png", "a.png", "b.png", "b.png", "b.png"]);
    }

    #[test]
    fn morphology_needs_a_known_method() {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, &["a.png"]);
        wand.apply_simple_operator("-morphology", Some("Dilate:2"), Some("Diamond"))
            .unwrap();
        wand.apply_simple_operator("-morphology", Some("Bogus"), Some("Diamond"))
            .unwrap();
        assert_eq!(transform_count(&ops, "morphology"), 1);
        assert!(matches!(
            exception_kinds(&wand)[..],
            [ExceptionKind::UnrecognizedKeyword { .. }]
        ));
    }

    #[test]
    fn polaroid_tilt_is_stable_and_small() {
        let image = named_image("a.png");
        let tilt = polaroid_tilt(&image);
        assert_eq!(tilt, polaroid_tilt(&image));
        assert!(tilt.abs() <= 11.25);
    }

    #[test]
    fn color_pair_splits_outside_parentheses() {
        assert_eq!(split_color_pair("rgb(1,2,3),white"), ("rgb(1,2,3)", Some("white")));
        assert_eq!(split_color_pair("red"), ("red", None));
    }

    #[test]
    fn sparse_color_accepts_names_and_numbers() {
        let points = parse_sparse_color("0,0 red 10,10 blue", Channels::RGB).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].values[..3], [1.0, 0.0, 0.0]);
        assert_eq!((points[1].x, points[1].y), (10.0, 10.0));
        assert_eq!(points[1].values[..3], [0.0, 0.0, 1.0]);

        let points = parse_sparse_color("1,2 0.5,0.25,0", Channels::RGB).unwrap();
        assert_eq!(points[0].values[..3], [0.5, 0.25, 0.0]);
    }

    #[test]
    fn sparse_color_keeps_functional_colors_whole() {
        let points = parse_sparse_color("0,0 rgb(255,0,0)", Channels::RGB).unwrap();
        assert_eq!(points[0].values[0], 1.0);
    }

    #[test]
    fn malformed_sparse_color_is_invalid() {
        for text in ["", "0,0", "0,x red", "0,0 nocolor", "0,0 0.5"] {
            assert!(
                matches!(parse_sparse_color(text, Channels::RGB), Err(ExceptionKind::InvalidArgument(_))),
                "{text:?}"
            );
        }
    }
}
