//! Keyword arguments (`-gravity North`, `-compose Over`, `-layers merge`).
//!
//! Every keyword family is a plain enum generated by [`keyword_enum!`], which
//! adds case-insensitive parsing, the canonical spelling and the list of
//! accepted names (used by `-list <family>`).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized {kind} type `{value}`")]
pub struct KeywordError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! keyword_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const KIND: &'static str = $kind;
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = KeywordError;

            fn from_str(s: &str) -> Result<Self, KeywordError> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($text) $(|| s.eq_ignore_ascii_case($alias))* {
                        return Ok(Self::$variant);
                    }
                )+
                Err(KeywordError { kind: $kind, value: s.to_string() })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

keyword_enum! {
    /// Placement of text, offsets and composited images.
    Gravity, "gravity" {
        #[default]
        Undefined => "Undefined" | "None",
        Forget => "Forget",
        NorthWest => "NorthWest",
        North => "North",
        NorthEast => "NorthEast",
        West => "West",
        Center => "Center",
        East => "East",
        SouthWest => "SouthWest",
        South => "South",
        SouthEast => "SouthEast",
    }
}

keyword_enum! {
    Compose, "compose" {
        #[default]
        Over => "Over",
        Atop => "Atop",
        Blend => "Blend",
        Clear => "Clear",
        Copy => "Copy" | "Src",
        Darken => "Darken",
        Difference => "Difference",
        Dst => "Dst",
        DstOver => "DstOver",
        In => "In",
        Lighten => "Lighten",
        Minus => "Minus",
        Multiply => "Multiply",
        Out => "Out",
        Plus => "Plus",
        Screen => "Screen",
        Xor => "Xor",
    }
}

keyword_enum! {
    Colorspace, "colorspace" {
        #[default]
        Srgb => "sRGB",
        Rgb => "RGB",
        Gray => "Gray",
        Cmy => "CMY",
        Cmyk => "CMYK",
        Hsb => "HSB",
        Hsl => "HSL",
        Lab => "Lab",
        Transparent => "Transparent",
        Xyz => "XYZ",
        YCbCr => "YCbCr",
        Yuv => "YUV",
    }
}

keyword_enum! {
    Compression, "compress" {
        #[default]
        Undefined => "Undefined",
        None => "None",
        Bzip => "BZip",
        Fax => "Fax",
        Group4 => "Group4",
        Jpeg => "JPEG",
        Lossless => "LosslessJPEG",
        Lzw => "LZW",
        Rle => "RLE",
        Zip => "Zip",
    }
}

keyword_enum! {
    Dither, "dither" {
        #[default]
        FloydSteinberg => "FloydSteinberg",
        None => "None",
        Riemersma => "Riemersma",
    }
}

keyword_enum! {
    Endian, "endian" {
        #[default]
        Undefined => "Undefined",
        Lsb => "LSB",
        Msb => "MSB",
    }
}

keyword_enum! {
    Interlace, "interlace" {
        #[default]
        Undefined => "Undefined",
        None => "None" | "NoInterlace",
        Line => "Line",
        Plane => "Plane",
        Partition => "Partition",
        Gif => "GIF",
        Jpeg => "JPEG",
        Png => "PNG",
    }
}

keyword_enum! {
    Orientation, "orientation" {
        #[default]
        Undefined => "Undefined",
        TopLeft => "TopLeft",
        TopRight => "TopRight",
        BottomRight => "BottomRight",
        BottomLeft => "BottomLeft",
        LeftTop => "LeftTop",
        RightTop => "RightTop",
        RightBottom => "RightBottom",
        LeftBottom => "LeftBottom",
    }
}

keyword_enum! {
    Units, "units" {
        #[default]
        Undefined => "Undefined",
        PixelsPerInch => "PixelsPerInch",
        PixelsPerCentimeter => "PixelsPerCentimeter",
    }
}

keyword_enum! {
    /// Text direction for `-annotate`.
    Direction, "direction" {
        #[default]
        LeftToRight => "left-to-right",
        RightToLeft => "right-to-left",
    }
}

keyword_enum! {
    Stretch, "stretch" {
        #[default]
        Normal => "Normal",
        UltraCondensed => "UltraCondensed",
        Condensed => "Condensed",
        SemiCondensed => "SemiCondensed",
        SemiExpanded => "SemiExpanded",
        Expanded => "Expanded",
        UltraExpanded => "UltraExpanded",
        Any => "Any",
    }
}

keyword_enum! {
    Style, "style" {
        #[default]
        Normal => "Normal",
        Italic => "Italic",
        Oblique => "Oblique",
        Any => "Any",
    }
}

keyword_enum! {
    ImageType, "type" {
        #[default]
        Undefined => "Undefined",
        Bilevel => "Bilevel",
        Grayscale => "Grayscale",
        GrayscaleAlpha => "GrayscaleAlpha" | "GrayscaleMatte",
        Palette => "Palette",
        PaletteAlpha => "PaletteAlpha" | "PaletteMatte",
        TrueColor => "TrueColor",
        TrueColorAlpha => "TrueColorAlpha" | "TrueColorMatte",
        ColorSeparation => "ColorSeparation",
        Optimize => "Optimize",
    }
}

keyword_enum! {
    /// Methods of `-layers`.
    LayerMethod, "layers" {
        #[default]
        Coalesce => "Coalesce",
        CompareAny => "CompareAny",
        CompareClear => "CompareClear",
        CompareOverlay => "CompareOverlay",
        Composite => "Composite",
        Dispose => "Dispose",
        Flatten => "Flatten",
        Merge => "Merge",
        Mosaic => "Mosaic",
        Optimize => "Optimize",
        OptimizeImage => "OptimizeFrame" | "OptimizeImage",
        OptimizePlus => "OptimizePlus",
        OptimizeTransparency => "OptimizeTransparency" | "OptimizeTrans",
        RemoveDups => "RemoveDups",
        RemoveZero => "RemoveZero",
        TrimBounds => "TrimBounds",
    }
}

impl LayerMethod {
    /// Methods that flatten the list onto a single canvas.
    pub fn is_merging(self) -> bool {
        matches!(self, Self::Flatten | Self::Merge | Self::Mosaic)
    }
}

keyword_enum! {
    /// Resources accepted by `-limit`.
    ResourceType, "resource" {
        #[default]
        Area => "Area",
        Disk => "Disk",
        File => "File",
        Height => "Height",
        ListLength => "List-Length" | "ListLength",
        Map => "Map",
        Memory => "Memory",
        Thread => "Thread",
        Throttle => "Throttle",
        Time => "Time",
        Width => "Width",
    }
}

keyword_enum! {
    /// Operators of `-evaluate` and `-evaluate-sequence`.
    EvaluateOp, "evaluate" {
        #[default]
        Add => "Add",
        Abs => "Abs",
        And => "And",
        Divide => "Divide",
        Max => "Max",
        Mean => "Mean",
        Median => "Median",
        Min => "Min",
        Multiply => "Multiply",
        Or => "Or",
        Pow => "Pow",
        Set => "Set",
        Subtract => "Subtract",
        Xor => "Xor",
    }
}

keyword_enum! {
    AlphaChannel, "alpha" {
        #[default]
        Undefined => "Undefined",
        Activate => "Activate",
        Background => "Background",
        Copy => "Copy",
        Deactivate => "Deactivate",
        Extract => "Extract",
        Off => "Off",
        On => "On",
        Opaque => "Opaque",
        Remove => "Remove",
        Set => "Set",
        Shape => "Shape",
        Transparent => "Transparent",
    }
}

keyword_enum! {
    /// Resampling filters for `-resize` and `-distort`.
    Filter, "filter" {
        #[default]
        Undefined => "Undefined",
        Point => "Point",
        Box => "Box",
        Triangle => "Triangle",
        Hermite => "Hermite",
        Hann => "Hann" | "Hanning",
        Hamming => "Hamming",
        Blackman => "Blackman",
        Gaussian => "Gaussian",
        Quadratic => "Quadratic",
        Cubic => "Cubic",
        Catrom => "Catrom",
        Mitchell => "Mitchell",
        Lanczos => "Lanczos",
        Sinc => "Sinc",
    }
}

keyword_enum! {
    Interpolate, "interpolate" {
        #[default]
        Undefined => "Undefined",
        Average => "Average",
        Bicubic => "Bicubic",
        Bilinear => "Bilinear",
        Integer => "Integer",
        Mesh => "Mesh",
        Nearest => "Nearest" | "NearestNeighbor",
        Spline => "Spline",
    }
}

keyword_enum! {
    Dispose, "dispose" {
        #[default]
        Undefined => "Undefined" | "0",
        None => "None" | "1",
        Background => "Background" | "2",
        Previous => "Previous" | "3",
    }
}

keyword_enum! {
    VirtualPixel, "virtual-pixel" {
        #[default]
        Undefined => "Undefined",
        Background => "Background",
        Black => "Black",
        Edge => "Edge",
        Gray => "Gray",
        Mirror => "Mirror",
        Tile => "Tile",
        Transparent => "Transparent",
        White => "White",
    }
}

keyword_enum! {
    Intent, "intent" {
        #[default]
        Undefined => "Undefined",
        Absolute => "Absolute",
        Perceptual => "Perceptual",
        Relative => "Relative",
        Saturation => "Saturation",
    }
}

keyword_enum! {
    /// `+noise` types.
    NoiseType, "noise" {
        #[default]
        Uniform => "Uniform",
        Gaussian => "Gaussian",
        Impulse => "Impulse",
        Laplacian => "Laplacian",
        Multiplicative => "Multiplicative",
        Poisson => "Poisson",
        Random => "Random",
    }
}

keyword_enum! {
    SparseColorMethod, "sparse-color" {
        #[default]
        Barycentric => "Barycentric",
        Bilinear => "Bilinear",
        Shepards => "Shepards",
        Inverse => "Inverse",
        Voronoi => "Voronoi",
    }
}

keyword_enum! {
    DistortMethod, "distort" {
        #[default]
        Affine => "Affine",
        AffineProjection => "AffineProjection",
        Arc => "Arc",
        Barrel => "Barrel",
        Bilinear => "BilinearForward" | "Bilinear",
        Perspective => "Perspective",
        Polar => "Polar",
        ScaleRotateTranslate => "ScaleRotateTranslate" | "SRT",
        Shepards => "Shepards",
    }
}

keyword_enum! {
    /// Neighbourhood statistics of `-statistic`, `-mode` and `-noise`.
    StatisticType, "statistic" {
        #[default]
        Gradient => "Gradient",
        Maximum => "Maximum",
        Mean => "Mean",
        Median => "Median",
        Minimum => "Minimum",
        Mode => "Mode",
        Nonpeak => "Nonpeak",
        StandardDeviation => "StandardDeviation",
    }
}

keyword_enum! {
    MorphologyMethod, "morphology" {
        #[default]
        Convolve => "Convolve",
        Correlate => "Correlate",
        Erode => "Erode",
        Dilate => "Dilate",
        Open => "Open",
        Close => "Close",
        Smooth => "Smooth",
        EdgeIn => "EdgeIn",
        EdgeOut => "EdgeOut",
        Edge => "Edge",
        TopHat => "TopHat",
        BottomHat => "BottomHat",
        HitAndMiss => "HitAndMiss" | "HMT",
        Thinning => "Thinning",
        Thicken => "Thicken",
        Distance => "Distance",
    }
}

keyword_enum! {
    /// Functions of `-function`.
    FunctionKind, "function" {
        #[default]
        Polynomial => "Polynomial",
        Sinusoid => "Sinusoid",
        Arcsin => "Arcsin",
        Arctan => "Arctan",
    }
}

keyword_enum! {
    /// Topics of `-list`.
    ListTopic, "list" {
        #[default]
        List => "List",
        Coder => "Coder",
        Color => "Color",
        Configure => "Configure",
        Font => "Font",
        Format => "Format",
        Resource => "Resource",
    }
}

/// Names accepted for a keyword family, by its `-list` name.
pub fn keyword_table(topic: &str) -> Option<&'static [&'static str]> {
    let table = match topic.to_ascii_lowercase().as_str() {
        "gravity" => Gravity::NAMES,
        "compose" => Compose::NAMES,
        "colorspace" => Colorspace::NAMES,
        "compress" | "compression" => Compression::NAMES,
        "dither" => Dither::NAMES,
        "endian" => Endian::NAMES,
        "interlace" => Interlace::NAMES,
        "orientation" => Orientation::NAMES,
        "units" => Units::NAMES,
        "direction" => Direction::NAMES,
        "stretch" => Stretch::NAMES,
        "style" => Style::NAMES,
        "type" => ImageType::NAMES,
        "layers" => LayerMethod::NAMES,
        "resource" => ResourceType::NAMES,
        "evaluate" => EvaluateOp::NAMES,
        "alpha" => AlphaChannel::NAMES,
        "filter" => Filter::NAMES,
        "interpolate" => Interpolate::NAMES,
        "dispose" => Dispose::NAMES,
        "virtual-pixel" => VirtualPixel::NAMES,
        "intent" => Intent::NAMES,
        "noise" => NoiseType::NAMES,
        "sparse-color" => SparseColorMethod::NAMES,
        "distort" => DistortMethod::NAMES,
        "statistic" => StatisticType::NAMES,
        "morphology" => MorphologyMethod::NAMES,
        "function" => FunctionKind::NAMES,
        "channel" => Channels::NAMES,
        _ => return None,
    };
    Some(table)
}

/// Families listed by `-list list`.
pub const KEYWORD_FAMILIES: &[&str] = &[
    "alpha",
    "channel",
    "colorspace",
    "compose",
    "compress",
    "direction",
    "dispose",
    "distort",
    "dither",
    "endian",
    "evaluate",
    "filter",
    "function",
    "gravity",
    "intent",
    "interlace",
    "interpolate",
    "layers",
    "morphology",
    "noise",
    "orientation",
    "resource",
    "sparse-color",
    "statistic",
    "stretch",
    "style",
    "type",
    "units",
    "virtual-pixel",
];

/// Channel selection for `-channel`, `-separate` and `-sparse-color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channels(u8);

impl Channels {
    pub const RED: Self = Self(1);
    pub const GREEN: Self = Self(1 << 1);
    pub const BLUE: Self = Self(1 << 2);
    pub const ALPHA: Self = Self(1 << 3);
    pub const RGB: Self = Self(0b0111);
    pub const ALL: Self = Self(0b1111);

    const NAMES: &'static [&'static str] =
        &["All", "Alpha", "Blue", "Gray", "Green", "Red", "RGB", "RGBA"];

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Number of selected channels.
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Selected channel indexes into an RGBA pixel, in R, G, B, A order.
    pub fn indexes(self) -> Vec<usize> {
        (0..4).filter(|i| self.0 & (1 << i) != 0).collect()
    }

    /// Parse `RGB`, `rgba`, `red,green`, `All`, `Gray`...
    pub fn parse(text: &str) -> Result<Self, KeywordError> {
        let invalid = || KeywordError {
            kind: "channel",
            value: text.to_string(),
        };
        let mut mask = 0u8;
        for word in text.split(',').map(str::trim).filter(|w| !w.is_empty()) {
            let bits = match word.to_ascii_lowercase().as_str() {
                "all" | "default" => Self::ALL.0,
                "red" | "r" | "cyan" | "c" => Self::RED.0,
                "green" | "g" | "magenta" | "m" => Self::GREEN.0,
                "blue" | "b" | "yellow" | "y" => Self::BLUE.0,
                "alpha" | "a" | "opacity" | "o" | "matte" => Self::ALPHA.0,
                "gray" | "grey" | "k" => Self::RED.0,
                letters if letters.chars().all(|c| "rgba".contains(c)) => {
                    letters.chars().fold(0, |m, c| {
                        m | match c {
                            'r' => Self::RED.0,
                            'g' => Self::GREEN.0,
                            'b' => Self::BLUE.0,
                            _ => Self::ALPHA.0,
                        }
                    })
                }
                _ => return Err(invalid()),
            };
            mask |= bits;
        }
        if mask == 0 {
            return Err(invalid());
        }
        Ok(Self(mask))
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::fmt::Display for Channels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (bit, c) in [(Self::RED, 'R'), (Self::GREEN, 'G'), (Self::BLUE, 'B'), (Self::ALPHA, 'A')] {
            if self.contains(bit) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// Font weight from `-weight`: a number or one of the CSS-ish keywords.
///
/// `bolder`/`lighter` are relative to `current`.
pub fn parse_weight(text: &str, current: u32) -> Option<u32> {
    match text.trim().to_ascii_lowercase().as_str() {
        "all" => Some(0),
        "bold" => Some(700),
        "bolder" => Some(current.saturating_add(100).min(900)),
        "lighter" => Some(current.saturating_sub(100).max(100)),
        "normal" => Some(400),
        n => n.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("northwest".parse::<Gravity>().unwrap(), Gravity::NorthWest);
        assert_eq!("OVER".parse::<Compose>().unwrap(), Compose::Over);
        assert_eq!("srgb".parse::<Colorspace>().unwrap(), Colorspace::Srgb);
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!("SRT".parse::<DistortMethod>().unwrap(), DistortMethod::ScaleRotateTranslate);
        assert_eq!("src".parse::<Compose>().unwrap(), Compose::Copy);
        assert_eq!("2".parse::<Dispose>().unwrap(), Dispose::Background);
        assert_eq!("OptimizeTrans".parse::<LayerMethod>().unwrap(), LayerMethod::OptimizeTransparency);
    }

    #[test]
    fn unknown_keyword_names_its_family() {
        let err = "sideways".parse::<Gravity>().unwrap_err();
        assert_eq!(err.kind, "gravity");
        assert_eq!(err.to_string(), "unrecognized gravity type `sideways`");
    }

    #[test]
    fn display_uses_canonical_spelling() {
        assert_eq!(LayerMethod::RemoveDups.to_string(), "RemoveDups");
        assert_eq!(Direction::RightToLeft.to_string(), "right-to-left");
    }

    #[test]
    fn keyword_tables_by_topic() {
        assert!(keyword_table("gravity").unwrap().contains(&"Center"));
        assert!(keyword_table("Layers").unwrap().contains(&"Merge"));
        assert!(keyword_table("bogus").is_none());
        for family in KEYWORD_FAMILIES {
            assert!(keyword_table(family).is_some(), "{family} has no table");
        }
    }

    #[test]
    fn channel_masks() {
        assert_eq!(Channels::parse("RGB").unwrap(), Channels::RGB);
        assert_eq!(Channels::parse("red,alpha").unwrap().count(), 2);
        assert_eq!(Channels::parse("All").unwrap(), Channels::ALL);
        assert_eq!(Channels::parse("gb").unwrap().indexes(), vec![1, 2]);
        assert!(Channels::parse("purple").is_err());
        assert_eq!(Channels::RGB.to_string(), "RGB");
    }

    #[test]
    fn weight_keywords() {
        assert_eq!(parse_weight("bold", 400), Some(700));
        assert_eq!(parse_weight("bolder", 400), Some(500));
        assert_eq!(parse_weight("lighter", 400), Some(300));
        assert_eq!(parse_weight("normal", 700), Some(400));
        assert_eq!(parse_weight("all", 400), Some(0));
        assert_eq!(parse_weight("600", 400), Some(600));
        assert_eq!(parse_weight("heavy", 400), None);
    }
}
