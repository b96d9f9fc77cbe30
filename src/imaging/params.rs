//! Parameter types for collaborator calls.
//!
//! These describe *what* to do, not *how*. Option handlers parse their
//! arguments into a [`Transform`] (one image) or [`ListTransform`] (a whole
//! list) and hand it to the [`backend`](super::backend), which owns the pixel
//! work. Swapping the backend (e.g. for the recording mock in tests) never
//! touches argument parsing.
//!
//! ## Types
//!
//! - [`ReadParams`] / [`WriteParams`]: image I/O requests.
//! - [`Transform`]: a per-image operation with fully resolved numbers.
//! - [`ListTransform`]: an operation over an ordered slice of images.
//! - [`SparsePoint`]: one `x,y color` control point of `-sparse-color`.

use super::calculations::Rect;
use crate::color::Color;
use crate::image::Image;
use crate::keywords::{
    AlphaChannel, Channels, Colorspace, Compose, DistortMethod, EvaluateOp, Filter, FunctionKind,
    ImageType, LayerMethod, MorphologyMethod, NoiseType, SparseColorMethod, StatisticType,
};
use crate::settings::DrawInfo;

/// Read request: a path, a directory, or a pseudo format like `xc:red`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadParams {
    pub source: String,
    /// Only read dimensions and metadata.
    pub ping: bool,
    /// `-size`, used by canvas pseudo formats.
    pub size: Option<(u32, u32)>,
    pub background: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteParams {
    pub destination: String,
    /// Write every image to one file when the format allows; otherwise
    /// numbered files are produced.
    pub adjoin: bool,
    pub quality: Option<u32>,
}

/// How a resize-family operator samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMethod {
    Resize(Filter),
    Adaptive,
    Sample,
    Scale,
    Thumbnail,
    Interpolative,
    LiquidRescale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurKind {
    Standard,
    Gaussian,
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparsePoint {
    pub x: f64,
    pub y: f64,
    /// One value per selected channel, `0.0..=1.0`.
    pub values: [f64; 4],
}

/// A per-image operation.
#[derive(Debug, Clone)]
pub enum Transform {
    Alpha(AlphaChannel),
    Annotate {
        text: String,
        x: f64,
        y: f64,
        draw: Box<DrawInfo>,
    },
    AutoGamma,
    AutoLevel,
    BlackThreshold(f64),
    /// Shift toward blue, `factor` like `-blue-shift 1.5`.
    BlueShift(f64),
    Blur {
        kind: BlurKind,
        radius: f64,
        sigma: f64,
    },
    Border {
        width: u32,
        height: u32,
        color: Color,
        compose: Compose,
    },
    BrightnessContrast {
        brightness: f64,
        contrast: f64,
    },
    Charcoal {
        radius: f64,
        sigma: f64,
    },
    Chop(Rect),
    Clamp,
    /// `-encipher` / `-decipher` with the passphrase file contents.
    Cipher {
        passphrase: Vec<u8>,
        encipher: bool,
    },
    ColorDecisionList(String),
    /// Blend `fill` over every pixel by a per-channel percentage.
    Colorize {
        blend: [f64; 3],
        fill: Color,
    },
    ColorMatrix(String),
    Colorspace(Colorspace),
    Contrast {
        sharpen: bool,
    },
    ContrastStretch {
        black: f64,
        white: f64,
    },
    /// One region yields a replacement, several yield a sub-list.
    Crop(Vec<Rect>),
    Cycle(i64),
    /// Straighten with `threshold` as a fraction of the quantum range.
    Deskew(f64),
    Despeckle,
    Distort {
        method: DistortMethod,
        args: Vec<f64>,
        bestfit: bool,
    },
    Draw {
        primitive: String,
        draw: Box<DrawInfo>,
    },
    Edge {
        radius: f64,
    },
    Emboss {
        radius: f64,
        sigma: f64,
    },
    Enhance,
    Equalize,
    Evaluate {
        op: EvaluateOp,
        value: f64,
    },
    Extent {
        width: u32,
        height: u32,
        x: i64,
        y: i64,
        background: Color,
    },
    Flip,
    Flop,
    /// Paint pixels connected to the seed that match `target`.
    Floodfill {
        x: i64,
        y: i64,
        target: Color,
        fill: Color,
        fuzz: f64,
        invert: bool,
    },
    Frame {
        width: u32,
        height: u32,
        outer_bevel: i64,
        inner_bevel: i64,
        color: Color,
        compose: Compose,
    },
    Function {
        function: FunctionKind,
        parameters: Vec<f64>,
    },
    Gamma(f64),
    Implode(f64),
    /// Local adaptive threshold (`-lat`).
    LocalThreshold {
        width: u32,
        height: u32,
        offset: f64,
    },
    Level {
        black: f64,
        white: f64,
        gamma: f64,
        /// `+level`: map the full range into `black..white`.
        invert: bool,
    },
    LinearStretch {
        black: f64,
        white: f64,
    },
    LevelColors {
        black: Color,
        white: Color,
        invert: bool,
    },
    Modulate {
        brightness: f64,
        saturation: f64,
        hue: f64,
    },
    Morphology {
        method: MorphologyMethod,
        iterations: i64,
        kernel: String,
    },
    MotionBlur {
        radius: f64,
        sigma: f64,
        angle: f64,
    },
    Negate {
        /// `+negate` leaves the alpha channel alone.
        spare_alpha: bool,
    },
    Noise {
        noise: NoiseType,
        attenuate: f64,
    },
    Normalize,
    OilPaint {
        radius: f64,
    },
    Opaque {
        target: Color,
        fill: Color,
        fuzz: f64,
        invert: bool,
    },
    OrderedDither(String),
    Polaroid {
        angle: f64,
        caption: Option<String>,
        draw: Box<DrawInfo>,
    },
    Posterize(u32),
    Quantize {
        colors: usize,
        dither: bool,
        tree_depth: usize,
    },
    RadialBlur(f64),
    Raise {
        width: u32,
        height: u32,
        raise: bool,
    },
    RandomThreshold {
        low: f64,
        high: f64,
    },
    Remap {
        reference: Box<Image>,
        dither: bool,
    },
    Resize {
        width: u32,
        height: u32,
        method: ResizeMethod,
    },
    Roll {
        x: i64,
        y: i64,
    },
    Rotate {
        degrees: f64,
        background: Color,
    },
    Segment {
        cluster_threshold: f64,
        smoothing: f64,
    },
    SelectiveBlur {
        radius: f64,
        sigma: f64,
        threshold: f64,
    },
    Separate(Channels),
    SepiaTone(f64),
    Shade {
        azimuth: f64,
        elevation: f64,
        gray: bool,
    },
    Shadow {
        opacity: f64,
        sigma: f64,
        x: i64,
        y: i64,
    },
    Sharpen {
        radius: f64,
        sigma: f64,
        adaptive: bool,
    },
    Shave {
        width: u32,
        height: u32,
    },
    Shear {
        x_degrees: f64,
        y_degrees: f64,
        background: Color,
    },
    SigmoidalContrast {
        sharpen: bool,
        contrast: f64,
        midpoint: f64,
    },
    Sketch {
        radius: f64,
        sigma: f64,
        angle: f64,
    },
    Solarize(f64),
    SparseColor {
        method: SparseColorMethod,
        channels: Channels,
        points: Vec<SparsePoint>,
    },
    Splice {
        region: Rect,
        background: Color,
    },
    Spread {
        radius: f64,
    },
    Statistic {
        kind: StatisticType,
        width: u32,
        height: u32,
    },
    Swirl(f64),
    Threshold(f64),
    Tint {
        amount: f64,
        fill: Color,
    },
    /// `-transform`: apply the drawing affine to the whole image.
    AffineTransform([f64; 6]),
    Transparent {
        target: Color,
        fuzz: f64,
        invert: bool,
    },
    Transpose,
    Transverse,
    Trim {
        fuzz: f64,
    },
    Type(ImageType),
    UniqueColors,
    Unsharp {
        radius: f64,
        sigma: f64,
        amount: f64,
        threshold: f64,
    },
    Vignette {
        radius: f64,
        sigma: f64,
        x: i64,
        y: i64,
        background: Color,
    },
    Wave {
        amplitude: f64,
        wavelength: f64,
        background: Color,
    },
    WhiteThreshold(f64),
}

impl Transform {
    /// Stable name for logs and recorded calls.
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Alpha(_) => "alpha",
            Transform::Annotate { .. } => "annotate",
            Transform::AutoGamma => "auto-gamma",
            Transform::AutoLevel => "auto-level",
            Transform::BlackThreshold(_) => "black-threshold",
            Transform::Blur { .. } => "blur",
            Transform::Border { .. } => "border",
            Transform::BrightnessContrast { .. } => "brightness-contrast",
            Transform::Charcoal { .. } => "charcoal",
            Transform::Chop(_) => "chop",
            Transform::Clamp => "clamp",
            Transform::Colorspace(_) => "colorspace",
            Transform::Contrast { .. } => "contrast",
            Transform::ContrastStretch { .. } => "contrast-stretch",
            Transform::Crop(_) => "crop",
            Transform::Despeckle => "despeckle",
            Transform::Distort { .. } => "distort",
            Transform::Draw { .. } => "draw",
            Transform::Edge { .. } => "edge",
            Transform::Emboss { .. } => "emboss",
            Transform::Enhance => "enhance",
            Transform::Equalize => "equalize",
            Transform::Evaluate { .. } => "evaluate",
            Transform::Extent { .. } => "extent",
            Transform::Flip => "flip",
            Transform::Flop => "flop",
            Transform::Floodfill { .. } => "floodfill",
            Transform::Gamma(_) => "gamma",
            Transform::Implode(_) => "implode",
            Transform::Level { .. } => "level",
            Transform::LinearStretch { .. } => "linear-stretch",
            Transform::Modulate { .. } => "modulate",
            Transform::MotionBlur { .. } => "motion-blur",
            Transform::Negate { .. } => "negate",
            Transform::Noise { .. } => "noise",
            Transform::Normalize => "normalize",
            Transform::OilPaint { .. } => "paint",
            Transform::Opaque { .. } => "opaque",
            Transform::Posterize(_) => "posterize",
            Transform::Quantize { .. } => "quantize",
            Transform::Raise { .. } => "raise",
            Transform::Remap { .. } => "remap",
            Transform::Resize { .. } => "resize",
            Transform::Roll { .. } => "roll",
            Transform::Rotate { .. } => "rotate",
            Transform::Separate(_) => "separate",
            Transform::SepiaTone(_) => "sepia-tone",
            Transform::Shade { .. } => "shade",
            Transform::Sharpen { .. } => "sharpen",
            Transform::Shave { .. } => "shave",
            Transform::Shear { .. } => "shear",
            Transform::SigmoidalContrast { .. } => "sigmoidal-contrast",
            Transform::Solarize(_) => "solarize",
            Transform::SparseColor { .. } => "sparse-color",
            Transform::Splice { .. } => "splice",
            Transform::Spread { .. } => "spread",
            Transform::Swirl(_) => "swirl",
            Transform::Threshold(_) => "threshold",
            Transform::Transparent { .. } => "transparent",
            Transform::Transpose => "transpose",
            Transform::Transverse => "transverse",
            Transform::Trim { .. } => "trim",
            Transform::Type(_) => "type",
            Transform::UniqueColors => "unique-colors",
            Transform::Unsharp { .. } => "unsharp",
            Transform::Vignette { .. } => "vignette",
            Transform::Wave { .. } => "wave",
            Transform::WhiteThreshold(_) => "white-threshold",
            Transform::BlueShift(_) => "blue-shift",
            Transform::Cipher { encipher: true, .. } => "encipher",
            Transform::Cipher { encipher: false, .. } => "decipher",
            Transform::ColorDecisionList(_) => "cdl",
            Transform::Colorize { .. } => "colorize",
            Transform::ColorMatrix(_) => "color-matrix",
            Transform::Cycle(_) => "cycle",
            Transform::Deskew(_) => "deskew",
            Transform::Frame { .. } => "frame",
            Transform::Function { .. } => "function",
            Transform::LocalThreshold { .. } => "lat",
            Transform::LevelColors { .. } => "level-colors",
            Transform::Morphology { .. } => "morphology",
            Transform::OrderedDither(_) => "ordered-dither",
            Transform::Polaroid { .. } => "polaroid",
            Transform::RadialBlur(_) => "radial-blur",
            Transform::RandomThreshold { .. } => "random-threshold",
            Transform::Segment { .. } => "segment",
            Transform::SelectiveBlur { .. } => "selective-blur",
            Transform::Shadow { .. } => "shadow",
            Transform::Sketch { .. } => "sketch",
            Transform::Statistic { .. } => "statistic",
            Transform::Tint { .. } => "tint",
            Transform::AffineTransform(_) => "transform",
        }
    }
}

/// An operation over a whole image list (or a fixed set of operands).
#[derive(Debug, Clone)]
pub enum ListTransform {
    /// `-append` (top to bottom) / `+append` (left to right).
    Append {
        vertical: bool,
    },
    ChannelFx(String),
    /// Second image is the lookup table.
    Clut {
        hald: bool,
    },
    Coalesce,
    Combine(Colorspace),
    /// Operands are destination, source and an optional mask.
    Composite {
        compose: Compose,
        x: i64,
        y: i64,
    },
    /// The first `split` images are destinations, the rest sources.
    CompositeLayers {
        compose: Compose,
        x: i64,
        y: i64,
        split: usize,
    },
    EvaluateSequence(EvaluateOp),
    Fft {
        magnitude: bool,
    },
    Fx(String),
    Ift {
        magnitude: bool,
    },
    Layers(LayerMethod),
    Morph {
        frames: usize,
    },
    /// Reduce every image to one shared palette of at most `colors`.
    Remap {
        colors: usize,
        dither: bool,
    },
    Smush {
        offset: i64,
        vertical: bool,
    },
}

impl ListTransform {
    pub fn name(&self) -> &'static str {
        match self {
            ListTransform::Append { .. } => "append",
            ListTransform::ChannelFx(_) => "channel-fx",
            ListTransform::Clut { hald: false } => "clut",
            ListTransform::Clut { hald: true } => "hald-clut",
            ListTransform::Coalesce => "coalesce",
            ListTransform::Combine(_) => "combine",
            ListTransform::Composite { .. } => "composite",
            ListTransform::CompositeLayers { .. } => "layers-composite",
            ListTransform::EvaluateSequence(_) => "evaluate-sequence",
            ListTransform::Fft { .. } => "fft",
            ListTransform::Fx(_) => "fx",
            ListTransform::Ift { .. } => "ift",
            ListTransform::Layers(_) => "layers",
            ListTransform::Morph { .. } => "morph",
            ListTransform::Remap { .. } => "remap",
            ListTransform::Smush { .. } => "smush",
        }
    }
}
