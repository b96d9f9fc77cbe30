//! Color argument parsing.
//!
//! Accepts the forms users type on the command line: hex (`#rgb`, `#rrggbb`,
//! `#rrggbbaa`, 16-bit `#rrrrggggbbbb`), functional (`rgb(...)`, `rgba(...)`,
//! `gray(...)`), `grayNN` percent shades, and a small table of named colors.
//! Everything is stored as 8-bit RGBA.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    #[error("unrecognized color `{0}`")]
    Unrecognized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }

    pub fn from_rgba(px: image::Rgba<u8>) -> Self {
        let [r, g, b, a] = px.0;
        Self { r, g, b, a }
    }

    /// Normalised RGBA distance in `0.0..=1.0`.
    pub fn distance(&self, other: &Color) -> f64 {
        let d = |x: u8, y: u8| (x as f64 - y as f64) / 255.0;
        let sum = d(self.r, other.r).powi(2)
            + d(self.g, other.g).powi(2)
            + d(self.b, other.b).powi(2)
            + d(self.a, other.a).powi(2);
        (sum / 4.0).sqrt()
    }

    /// True when `other` lies within `fuzz` (a `0.0..=1.0` fraction).
    pub fn matches(&self, other: &Color, fuzz: f64) -> bool {
        if fuzz <= 0.0 {
            self == other
        } else {
            self.distance(other) <= fuzz
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, ColorError> {
        parse_color(s)
    }
}

/// Named colors understood by [`parse_color`], also listed by `-list color`.
pub const NAMED_COLORS: &[(&str, Color)] = &[
    ("aqua", Color::rgb(0, 255, 255)),
    ("black", Color::BLACK),
    ("blue", Color::rgb(0, 0, 255)),
    ("brown", Color::rgb(165, 42, 42)),
    ("cyan", Color::rgb(0, 255, 255)),
    ("fuchsia", Color::rgb(255, 0, 255)),
    ("gold", Color::rgb(255, 215, 0)),
    ("gray", Color::rgb(126, 126, 126)),
    ("green", Color::rgb(0, 128, 0)),
    ("grey", Color::rgb(190, 190, 190)),
    ("indigo", Color::rgb(75, 0, 130)),
    ("khaki", Color::rgb(240, 230, 140)),
    ("lime", Color::rgb(0, 255, 0)),
    ("magenta", Color::rgb(255, 0, 255)),
    ("maroon", Color::rgb(128, 0, 0)),
    ("navy", Color::rgb(0, 0, 128)),
    ("none", Color::TRANSPARENT),
    ("olive", Color::rgb(128, 128, 0)),
    ("orange", Color::rgb(255, 165, 0)),
    ("pink", Color::rgb(255, 192, 203)),
    ("purple", Color::rgb(128, 0, 128)),
    ("red", Color::rgb(255, 0, 0)),
    ("silver", Color::rgb(192, 192, 192)),
    ("skyblue", Color::rgb(135, 206, 235)),
    ("tan", Color::rgb(210, 180, 140)),
    ("teal", Color::rgb(0, 128, 128)),
    ("transparent", Color::TRANSPARENT),
    ("violet", Color::rgb(238, 130, 238)),
    ("wheat", Color::rgb(245, 222, 179)),
    ("white", Color::WHITE),
    ("yellow", Color::rgb(255, 255, 0)),
];

/// Parse a color argument.
pub fn parse_color(text: &str) -> Result<Color, ColorError> {
    let unrecognized = || ColorError::Unrecognized(text.to_string());
    let trimmed = text.trim();
    if let Some(hex) = trimmed.strip_prefix('#') {
        return parse_hex(hex).ok_or_else(unrecognized);
    }
    let lower = trimmed.to_ascii_lowercase();
    if let Some(open) = lower.find('(') {
        let body = lower[open + 1..].strip_suffix(')').ok_or_else(unrecognized)?;
        return parse_functional(&lower[..open], body).ok_or_else(unrecognized);
    }
    if let Some((_, color)) = NAMED_COLORS.iter().find(|(name, _)| *name == lower) {
        return Ok(*color);
    }
    // gray0 .. gray100
    for prefix in ["gray", "grey"] {
        if let Some(level) = lower.strip_prefix(prefix).and_then(|n| n.parse::<u32>().ok()) {
            if level <= 100 {
                let v = (level as f64 * 255.0 / 100.0).round() as u8;
                return Ok(Color::rgb(v, v, v));
            }
        }
    }
    Err(unrecognized())
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| -> Option<u8> {
        let v = u32::from_str_radix(s, 16).ok()?;
        Some(match s.len() {
            1 => (v * 17) as u8,
            2 => v as u8,
            4 => (v >> 8) as u8,
            _ => return None,
        })
    };
    let width = match hex.len() {
        3 | 4 => 1,
        6 | 8 => 2,
        12 | 16 => 4,
        _ => return None,
    };
    let parts: Vec<u8> = (0..hex.len() / width)
        .map(|i| channel(&hex[i * width..(i + 1) * width]))
        .collect::<Option<_>>()?;
    Some(Color::rgba(
        parts[0],
        parts[1],
        parts[2],
        parts.get(3).copied().unwrap_or(255),
    ))
}

/// A channel value: `0-255` or a percentage.
fn channel_value(text: &str) -> Option<u8> {
    let text = text.trim();
    let v = match text.strip_suffix('%') {
        Some(p) => p.trim().parse::<f64>().ok()? * 255.0 / 100.0,
        None => text.parse::<f64>().ok()?,
    };
    Some(v.round().clamp(0.0, 255.0) as u8)
}

/// An alpha value: `0.0-1.0` or a percentage.
fn alpha_value(text: &str) -> Option<u8> {
    let text = text.trim();
    let v = match text.strip_suffix('%') {
        Some(p) => p.trim().parse::<f64>().ok()? / 100.0,
        None => text.parse::<f64>().ok()?,
    };
    Some((v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

fn parse_functional(name: &str, body: &str) -> Option<Color> {
    let args: Vec<&str> = body.split(',').collect();
    match (name.trim(), args.as_slice()) {
        ("rgb" | "srgb", [r, g, b]) => Some(Color::rgb(
            channel_value(r)?,
            channel_value(g)?,
            channel_value(b)?,
        )),
        ("rgba" | "srgba", [r, g, b, a]) => Some(Color::rgba(
            channel_value(r)?,
            channel_value(g)?,
            channel_value(b)?,
            alpha_value(a)?,
        )),
        ("gray" | "grey", [v]) => {
            let v = channel_value(v)?;
            Some(Color::rgb(v, v, v))
        }
        ("graya" | "greya", [v, a]) => {
            let v = channel_value(v)?;
            Some(Color::rgba(v, v, v, alpha_value(a)?))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_forms() {
        assert_eq!(parse_color("#fff").unwrap(), Color::WHITE);
        assert_eq!(parse_color("#dfdfdf").unwrap(), Color::rgb(0xdf, 0xdf, 0xdf));
        assert_eq!(parse_color("#ff000080").unwrap(), Color::rgba(255, 0, 0, 0x80));
        assert_eq!(parse_color("#ffff00000000").unwrap(), Color::rgb(255, 0, 0));
        assert!(parse_color("#ff").is_err());
        assert!(parse_color("#gggggg").is_err());
    }

    #[test]
    fn functional_forms() {
        assert_eq!(parse_color("rgb(255,0,0)").unwrap(), Color::rgb(255, 0, 0));
        assert_eq!(parse_color("rgb(100%, 0%, 0%)").unwrap(), Color::rgb(255, 0, 0));
        assert_eq!(parse_color("rgba(0,0,255,0.5)").unwrap().a, 128);
        assert_eq!(parse_color("gray(50%)").unwrap(), Color::rgb(128, 128, 128));
        assert!(parse_color("rgb(1,2)").is_err());
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(parse_color("Red").unwrap(), Color::rgb(255, 0, 0));
        assert_eq!(parse_color("none").unwrap(), Color::TRANSPARENT);
        assert_eq!(parse_color("gray50").unwrap(), Color::rgb(128, 128, 128));
        assert!(parse_color("notacolor").is_err());
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(Color::rgb(0xbd, 0xbd, 0xbd).to_string(), "#BDBDBD");
        assert_eq!(Color::rgba(1, 2, 3, 4).to_string(), "#01020304");
    }

    #[test]
    fn fuzzy_matching() {
        let a = Color::rgb(250, 250, 250);
        assert!(!a.matches(&Color::WHITE, 0.0));
        assert!(a.matches(&Color::WHITE, 0.05));
    }
}
