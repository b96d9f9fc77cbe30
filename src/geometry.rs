//! Argument grammars shared by many operators.
//!
//! - [`parse_geometry`]: the generic `<rho>x<sigma>{+-}<xi>{+-}<psi>` form
//!   used by blur-family and other numeric operators. Every component is
//!   optional; [`GeometryFlags`] records which ones were present so each
//!   operator can apply its own defaults.
//! - [`parse_region`]: the `WxH{+-}X{+-}Y` form with resize flags
//!   (`% ! < > ^ @`) used by resize, crop, extent, border, ...
//! - [`parse_scenes`]: image index lists like `0-2,5,-1` used by
//!   `-clone`, `-delete` and `-duplicate`.
//! - [`parse_si_size`]: resource amounts like `256MiB` or `2GB`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("invalid geometry `{0}`")]
    Invalid(String),
    #[error("invalid scene list `{0}`")]
    InvalidScenes(String),
}

/// Which parts of a geometry string were present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryFlags(u16);

impl GeometryFlags {
    pub const RHO: Self = Self(1);
    pub const SIGMA: Self = Self(1 << 1);
    pub const XI: Self = Self(1 << 2);
    pub const PSI: Self = Self(1 << 3);
    pub const PERCENT: Self = Self(1 << 4);
    /// `!`: ignore aspect ratio.
    pub const ASPECT: Self = Self(1 << 5);
    /// `>`: only shrink larger images.
    pub const GREATER: Self = Self(1 << 6);
    /// `<`: only enlarge smaller images.
    pub const LESS: Self = Self(1 << 7);
    /// `^`: fill the area, minimum dimensions.
    pub const MINIMUM: Self = Self(1 << 8);
    /// `@`: pixel area limit.
    pub const AREA: Self = Self(1 << 9);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for GeometryFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Parsed `<rho>x<sigma>{+-}<xi>{+-}<psi>` string.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeometryInfo {
    pub rho: f64,
    pub sigma: f64,
    pub xi: f64,
    pub psi: f64,
    pub flags: GeometryFlags,
}

impl GeometryInfo {
    pub fn has(&self, flag: GeometryFlags) -> bool {
        self.flags.contains(flag)
    }

    /// `sigma` if given, otherwise `default`.
    pub fn sigma_or(&self, default: f64) -> f64 {
        if self.has(GeometryFlags::SIGMA) {
            self.sigma
        } else {
            default
        }
    }

    pub fn xi_or(&self, default: f64) -> f64 {
        if self.has(GeometryFlags::XI) {
            self.xi
        } else {
            default
        }
    }

    pub fn psi_or(&self, default: f64) -> f64 {
        if self.has(GeometryFlags::PSI) {
            self.psi
        } else {
            default
        }
    }
}

/// Strip the modifier characters and return the remaining text plus flags.
fn split_modifiers(text: &str) -> (String, GeometryFlags) {
    let mut flags = GeometryFlags::default();
    let mut rest = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => flags.insert(GeometryFlags::PERCENT),
            '!' => flags.insert(GeometryFlags::ASPECT),
            '>' => flags.insert(GeometryFlags::GREATER),
            '<' => flags.insert(GeometryFlags::LESS),
            '^' => flags.insert(GeometryFlags::MINIMUM),
            '@' => flags.insert(GeometryFlags::AREA),
            c if c.is_whitespace() => {}
            c => rest.push(c),
        }
    }
    (rest, flags)
}

/// Consume a (possibly signed) decimal number from the front of `s`.
fn take_number(s: &str, allow_sign: bool) -> Option<(f64, &str)> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if allow_sign && end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    // exponent, e.g. 1e-3
    if end > digits_start && end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        if exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            end = exp_end;
        }
    }
    if end == digits_start {
        return None;
    }
    s[..end].parse::<f64>().ok().map(|v| (v, &s[end..]))
}

/// Parse the generic numeric geometry grammar.
///
/// ```text
/// 5            rho=5
/// 0x2          rho=0 sigma=2
/// 3,1          rho=3 sigma=1
/// 10x5+2-3     rho=10 sigma=5 xi=2 psi=-3
/// 50%          rho=50 (PERCENT)
/// ```
pub fn parse_geometry(text: &str) -> Result<GeometryInfo, GeometryError> {
    let (body, mut flags) = split_modifiers(text);
    let mut info = GeometryInfo::default();
    let mut rest = body.as_str();

    if let Some((v, r)) = take_number(rest, true) {
        info.rho = v;
        flags.insert(GeometryFlags::RHO);
        rest = r;
    }
    if let Some(r) = rest.strip_prefix(['x', 'X', ',', '/', ':']) {
        rest = r;
        if let Some((v, r)) = take_number(rest, true) {
            info.sigma = v;
            flags.insert(GeometryFlags::SIGMA);
            rest = r;
        }
    }
    for (slot, flag) in [(&mut info.xi, GeometryFlags::XI), (&mut info.psi, GeometryFlags::PSI)] {
        if rest.starts_with(['+', '-']) {
            match take_number(rest, true) {
                Some((v, r)) => {
                    *slot = v;
                    flags.insert(flag);
                    rest = r;
                }
                None => return Err(GeometryError::Invalid(text.to_string())),
            }
        } else if let Some(r) = rest.strip_prefix(',') {
            // comma separated extra components: "1,2,3,4"
            match take_number(r, true) {
                Some((v, r)) => {
                    *slot = v;
                    flags.insert(flag);
                    rest = r;
                }
                None => return Err(GeometryError::Invalid(text.to_string())),
            }
        }
    }
    if !rest.is_empty() || flags.is_empty() {
        return Err(GeometryError::Invalid(text.to_string()));
    }
    info.flags = flags;
    Ok(info)
}

/// Parsed `WxH{+-}X{+-}Y` region string.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegionGeometry {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub x: i64,
    pub y: i64,
    pub flags: GeometryFlags,
}

impl RegionGeometry {
    pub fn has(&self, flag: GeometryFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn has_offset(&self) -> bool {
        self.has(GeometryFlags::XI) || self.has(GeometryFlags::PSI)
    }
}

/// Parse a region/size geometry.
pub fn parse_region(text: &str) -> Result<RegionGeometry, GeometryError> {
    let (body, mut flags) = split_modifiers(text);
    let mut region = RegionGeometry::default();
    let mut rest = body.as_str();

    if let Some((v, r)) = take_number(rest, false) {
        region.width = Some(v);
        flags.insert(GeometryFlags::RHO);
        rest = r;
    }
    if let Some(r) = rest.strip_prefix(['x', 'X']) {
        rest = r;
        if let Some((v, r)) = take_number(rest, false) {
            region.height = Some(v);
            flags.insert(GeometryFlags::SIGMA);
            rest = r;
        }
    }
    if rest.starts_with(['+', '-']) {
        let (v, r) = take_number(rest, true).ok_or_else(|| GeometryError::Invalid(text.into()))?;
        region.x = v as i64;
        flags.insert(GeometryFlags::XI);
        rest = r;
        if rest.starts_with(['+', '-']) {
            let (v, r) =
                take_number(rest, true).ok_or_else(|| GeometryError::Invalid(text.into()))?;
            region.y = v as i64;
            flags.insert(GeometryFlags::PSI);
            rest = r;
        }
    }
    if !rest.is_empty() || flags.is_empty() {
        return Err(GeometryError::Invalid(text.to_string()));
    }
    region.flags = flags;
    Ok(region)
}

/// True when `text` is a valid scene list (`IsSceneGeometry`).
pub fn is_scene_list(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | ',' | ' '))
}

/// Resolve a scene list against a list of `len` images.
///
/// Negative indexes count from the end. Ranges may run backwards
/// (`3-1` yields 3,2,1). An index outside the list is an error.
pub fn parse_scenes(text: &str, len: usize) -> Result<Vec<usize>, GeometryError> {
    resolve_scenes(text, len, true)
}

/// Like [`parse_scenes`], but indexes outside the list are dropped and
/// ranges are cut to the list (`-delete 0-10` on three images deletes 0-2).
pub fn select_scenes(text: &str, len: usize) -> Result<Vec<usize>, GeometryError> {
    resolve_scenes(text, len, false)
}

fn resolve_scenes(text: &str, len: usize, strict: bool) -> Result<Vec<usize>, GeometryError> {
    let invalid = || GeometryError::InvalidScenes(text.to_string());
    if !is_scene_list(text) {
        return Err(invalid());
    }
    let last = len as i64 - 1;
    let absolute = |raw: i64| if raw < 0 { len as i64 + raw } else { raw };
    let mut scenes = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        // a leading '-' is a sign; a later '-' separates a range
        let split_at = part[1..].find('-').map(|i| i + 1);
        let (start, end) = match split_at {
            Some(i) => {
                let start: i64 = part[..i].parse().map_err(|_| invalid())?;
                let end: i64 = part[i + 1..].parse().map_err(|_| invalid())?;
                (absolute(start), absolute(end))
            }
            None => {
                let raw: i64 = part.parse().map_err(|_| invalid())?;
                (absolute(raw), absolute(raw))
            }
        };
        let in_range = |idx: i64| (0..=last).contains(&idx);
        if strict && !(in_range(start) && in_range(end)) {
            return Err(invalid());
        }
        let (low, high) = (start.min(end).max(0), start.max(end).min(last));
        if low > high {
            continue;
        }
        let span = (low as usize)..=(high as usize);
        if start <= end {
            scenes.extend(span);
        } else {
            scenes.extend(span.rev());
        }
    }
    Ok(scenes)
}

/// Parse an amount with an optional SI or IEC prefix.
///
/// `1024`, `64k`, `2MB`, `1.5GiB`. Decimal prefixes are powers of 1000,
/// the `i` forms are powers of 1024. A trailing `%` returns the number scaled
/// by `percent_base / 100`.
pub fn parse_si_size(text: &str, percent_base: f64) -> Option<f64> {
    let text = text.trim();
    let (value, rest) = take_number(text, true)?;
    let rest = rest.trim();
    if rest == "%" {
        return Some(value * percent_base / 100.0);
    }
    let mut chars = rest.chars();
    let scale = match chars.next() {
        None => return Some(value),
        Some(c) => {
            let exponent = match c.to_ascii_uppercase() {
                'K' => 1,
                'M' => 2,
                'G' => 3,
                'T' => 4,
                'P' => 5,
                'E' => 6,
                'B' if chars.as_str().is_empty() => return Some(value),
                _ => return None,
            };
            let tail = chars.as_str();
            let (binary, tail) = match tail.strip_prefix('i') {
                Some(t) => (true, t),
                None => (false, tail),
            };
            if !(tail.is_empty() || tail.eq_ignore_ascii_case("b")) {
                return None;
            }
            let base: f64 = if binary { 1024.0 } else { 1000.0 };
            base.powi(exponent)
        }
    };
    Some(value * scale)
}

/// Paper names accepted by `-page`.
const PAPER_SIZES: &[(&str, &str)] = &[
    ("a3", "842x1191"),
    ("a4", "595x842"),
    ("a5", "420x595"),
    ("b5", "501x709"),
    ("executive", "540x720"),
    ("ledger", "1224x792"),
    ("legal", "612x1008"),
    ("letter", "612x792"),
    ("tabloid", "792x1224"),
];

/// Canonical page geometry: paper names resolve to sizes, then the result is
/// normalised to `WxH` or `WxH+X+Y`.
pub fn canonical_page(text: &str) -> Result<String, GeometryError> {
    let lower = text.to_ascii_lowercase();
    let expanded = PAPER_SIZES
        .iter()
        .find(|(name, _)| lower.starts_with(name))
        .map(|(name, size)| format!("{size}{}", &text[name.len()..]))
        .unwrap_or_else(|| text.to_string());
    let region = parse_region(&expanded)?;
    let width = region.width.unwrap_or(0.0) as u64;
    let height = region.height.or(region.width).unwrap_or(0.0) as u64;
    if region.has_offset() {
        Ok(format!("{width}x{height}{:+}{:+}", region.x, region.y))
    } else {
        Ok(format!("{width}x{height}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_rho_only() {
        let g = parse_geometry("5").unwrap();
        assert_eq!(g.rho, 5.0);
        assert!(g.has(GeometryFlags::RHO));
        assert!(!g.has(GeometryFlags::SIGMA));
        assert_eq!(g.sigma_or(1.0), 1.0);
    }

    #[test]
    fn geometry_full_form() {
        let g = parse_geometry("10x5+2-3").unwrap();
        assert_eq!((g.rho, g.sigma, g.xi, g.psi), (10.0, 5.0, 2.0, -3.0));
        assert!(g.has(GeometryFlags::PSI));
    }

    #[test]
    fn geometry_comma_separated() {
        let g = parse_geometry("0,-1").unwrap();
        assert_eq!((g.rho, g.sigma), (0.0, -1.0));
        let g = parse_geometry("1,2,3,4").unwrap();
        assert_eq!((g.rho, g.sigma, g.xi, g.psi), (1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn geometry_sigma_without_rho() {
        let g = parse_geometry("0x1.5").unwrap();
        assert_eq!(g.sigma, 1.5);
        let g = parse_geometry("x3").unwrap();
        assert!(!g.has(GeometryFlags::RHO));
        assert_eq!(g.sigma, 3.0);
    }

    #[test]
    fn geometry_percent_flag() {
        let g = parse_geometry("50%").unwrap();
        assert!(g.has(GeometryFlags::PERCENT));
        assert_eq!(g.rho, 50.0);
    }

    #[test]
    fn geometry_rejects_garbage() {
        assert!(parse_geometry("abc").is_err());
        assert!(parse_geometry("").is_err());
        assert!(parse_geometry("5x5+").is_err());
    }

    #[test]
    fn region_with_offsets() {
        let r = parse_region("100x50+20-30").unwrap();
        assert_eq!(r.width, Some(100.0));
        assert_eq!(r.height, Some(50.0));
        assert_eq!((r.x, r.y), (20, -30));
        assert!(r.has_offset());
    }

    #[test]
    fn region_modifiers() {
        let r = parse_region("50%").unwrap();
        assert!(r.has(GeometryFlags::PERCENT));
        assert_eq!(r.height, None);
        let r = parse_region("640x480!").unwrap();
        assert!(r.has(GeometryFlags::ASPECT));
        let r = parse_region("+10+20").unwrap();
        assert_eq!(r.width, None);
        assert_eq!((r.x, r.y), (10, 20));
    }

    #[test]
    fn scenes_resolve_negative_and_ranges() {
        assert_eq!(parse_scenes("-1", 4).unwrap(), vec![3]);
        assert_eq!(parse_scenes("0-2", 4).unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_scenes("2-0", 4).unwrap(), vec![2, 1, 0]);
        assert_eq!(parse_scenes("0,-1", 4).unwrap(), vec![0, 3]);
        assert_eq!(parse_scenes("-2--1", 4).unwrap(), vec![2, 3]);
    }

    #[test]
    fn scenes_out_of_range_is_error() {
        assert!(parse_scenes("4", 4).is_err());
        assert!(parse_scenes("-5", 4).is_err());
        assert!(parse_scenes("a", 4).is_err());
        assert!(parse_scenes("0", 0).is_err());
    }

    #[test]
    fn selected_scenes_drop_what_is_out_of_range() {
        assert_eq!(select_scenes("0-10", 3).unwrap(), vec![0, 1, 2]);
        assert_eq!(select_scenes("1,7,-9", 3).unwrap(), vec![1]);
        assert_eq!(select_scenes("5-1", 3).unwrap(), vec![2, 1]);
        assert!(select_scenes("0", 0).unwrap().is_empty());
        assert!(select_scenes("x", 3).is_err());
    }

    #[test]
    fn si_sizes() {
        assert_eq!(parse_si_size("1024", 100.0), Some(1024.0));
        assert_eq!(parse_si_size("64k", 100.0), Some(64_000.0));
        assert_eq!(parse_si_size("2MiB", 100.0), Some(2.0 * 1024.0 * 1024.0));
        assert_eq!(parse_si_size("1GB", 100.0), Some(1e9));
        assert_eq!(parse_si_size("50%", 100.0), Some(50.0));
        assert_eq!(parse_si_size("lots", 100.0), None);
    }

    #[test]
    fn page_canonical_forms() {
        assert_eq!(canonical_page("a4").unwrap(), "595x842");
        assert_eq!(canonical_page("letter+10+20").unwrap(), "612x792+10+20");
        assert_eq!(canonical_page("100x200").unwrap(), "100x200");
        assert_eq!(canonical_page("100").unwrap(), "100x100");
    }
}
