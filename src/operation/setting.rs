//! Settings: options that change defaults for later operators and reads.
//!
//! A setting touches only `image_info`, `draw_info` and `quantize_info` (and,
//! for `-cache`, the resource registry). Most also keep their raw argument in
//! the `image_info` option table, which is what `DrawInfo` and
//! `QuantizeInfo` are rebuilt from when a `}` restores older settings.
//!
//! `-name arg` sets, `+name` resets to the default. For booleans `-name` is
//! on and `+name` is off. A value that fails to parse is reported and the
//! setting keeps its previous value.

use super::{Invocation, WandFn};
use crate::color::{Color, parse_color};
use crate::exception::ExceptionKind;
use crate::geometry::{canonical_page, parse_geometry, parse_region, parse_si_size};
use crate::keywords::{
    Channels, Colorspace, Compose, Compression, Direction, Dispose, Dither, Endian, Filter,
    Gravity, ImageType, Intent, Interlace, Interpolate, Orientation, ResourceType, Stretch,
    Style, Units, VirtualPixel, parse_weight,
};
use crate::resource::Limit;
use crate::settings::{DEFAULT_POINTSIZE, IDENTITY_AFFINE, parse_affine, parse_fuzz};
use crate::wand::Wand;
use std::str::FromStr;

type Outcome = Result<(), ExceptionKind>;

pub(super) const HANDLERS: &[(&str, WandFn)] = &[
    ("adjoin", adjoin),
    ("affine", affine),
    ("antialias", antialias),
    ("attenuate", numeric_option),
    ("authenticate", authenticate),
    ("background", background),
    ("bias", numeric_option),
    ("black-point-compensation", flag_option),
    ("blue-primary", geometry_option),
    ("bordercolor", bordercolor),
    ("box", r#box),
    ("cache", cache),
    ("caption", plain_option),
    ("channel", channel),
    ("colorspace", colorspace),
    ("comment", plain_option),
    ("compose", compose),
    ("compress", compress),
    ("debug", debug),
    ("define", define),
    ("delay", geometry_option),
    ("density", density),
    ("depth", depth),
    ("direction", direction),
    ("display", plain_option),
    ("dispose", keyword_option::<Dispose>),
    ("dither", dither),
    ("encoding", encoding),
    ("endian", endian),
    ("extract", extract),
    ("family", family),
    ("fill", fill),
    ("filter", keyword_option::<Filter>),
    ("font", font),
    ("format", plain_option),
    ("fuzz", fuzz),
    ("gravity", gravity),
    ("green-primary", geometry_option),
    ("intent", keyword_option::<Intent>),
    ("interlace", interlace),
    ("interline-spacing", interline_spacing),
    ("interpolate", keyword_option::<Interpolate>),
    ("interword-spacing", interword_spacing),
    ("kerning", kerning),
    ("label", plain_option),
    ("log", plain_option),
    ("loop", numeric_option),
    ("mattecolor", mattecolor),
    ("monitor", monitor),
    ("monochrome", flag_option),
    ("orient", orient),
    ("page", page),
    ("ping", ping),
    ("pointsize", pointsize),
    ("precision", numeric_option),
    ("preview", plain_option),
    ("quality", quality),
    ("quantize", quantize),
    ("quiet", quiet),
    ("red-primary", geometry_option),
    ("render", render),
    ("respect-parenthesis", flag_option),
    ("sampling-factor", sampling_factor),
    ("scene", scene),
    ("seed", numeric_option),
    ("size", size),
    ("stretch", stretch),
    ("stroke", stroke),
    ("strokewidth", strokewidth),
    ("style", style),
    ("synchronize", synchronize),
    ("taint", flag_option),
    ("texture", texture),
    ("tile", tile),
    ("tile-offset", tile_offset),
    ("transparent-color", transparent_color),
    ("treedepth", treedepth),
    ("type", image_type),
    ("undercolor", undercolor),
    ("units", units),
    ("verbose", verbose),
    ("view", view),
    ("virtual-pixel", virtual_pixel),
    ("weight", weight),
    ("white-point", geometry_option),
];

// ============================================================================
// Shared shapes
// ============================================================================

/// Store the raw argument under the option's name, or drop it for `+name`.
fn plain_option(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if inv.normal {
        wand.image_info.set_option(inv.name, inv.arg1()?);
    } else {
        wand.image_info.remove_option(inv.name);
    }
    Ok(())
}

/// Like [`plain_option`], but the value must be a number.
fn numeric_option(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if inv.normal {
        inv.number()?;
    }
    plain_option(wand, inv)
}

/// Like [`plain_option`], but the value must be a geometry.
fn geometry_option(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if inv.normal {
        inv.geometry()?;
    }
    plain_option(wand, inv)
}

/// `-name` stores `true`, `+name` stores `false`.
fn flag_option(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let value = if inv.normal { "true" } else { "false" };
    wand.image_info.set_option(inv.name, value);
    Ok(())
}

/// Validate a keyword, store it, and hand back the parsed value (`None` for
/// `+name`).
fn keyword<T>(wand: &mut Wand, inv: &Invocation<'_>) -> Result<Option<T>, ExceptionKind>
where
    T: FromStr<Err = crate::keywords::KeywordError>,
{
    if !inv.normal {
        wand.image_info.remove_option(inv.name);
        return Ok(None);
    }
    let value = inv.keyword::<T>()?;
    wand.image_info.set_option(inv.name, inv.arg1()?);
    Ok(Some(value))
}

fn keyword_option<T>(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome
where
    T: FromStr<Err = crate::keywords::KeywordError>,
{
    keyword::<T>(wand, inv).map(drop)
}

/// A color setting: `-name color` or `+name` for `default`.
fn color(wand: &mut Wand, inv: &Invocation<'_>, default: &str) -> Result<Color, ExceptionKind> {
    let text = if inv.normal { inv.arg1()? } else { default };
    let color = parse_color(text)?;
    wand.image_info.set_option(inv.name, text);
    Ok(color)
}

fn number(wand: &mut Wand, inv: &Invocation<'_>, default: f64) -> Result<f64, ExceptionKind> {
    if !inv.normal {
        wand.image_info.remove_option(inv.name);
        return Ok(default);
    }
    let value = inv.number()?;
    wand.image_info.set_option(inv.name, inv.arg1()?);
    Ok(value)
}

fn integer<T: FromStr>(inv: &Invocation<'_>) -> Result<T, ExceptionKind> {
    let text = inv.arg1()?;
    text.trim()
        .parse()
        .map_err(|_| ExceptionKind::InvalidArgument(text.to_string()))
}

/// `Some(arg)` for `-name arg`, `None` for `+name`.
fn text(inv: &Invocation<'_>) -> Result<Option<String>, ExceptionKind> {
    if inv.normal {
        Ok(Some(inv.arg1()?.to_string()))
    } else {
        Ok(None)
    }
}

// ============================================================================
// Booleans
// ============================================================================

fn adjoin(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.adjoin = inv.normal;
    Ok(())
}

fn antialias(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.antialias = inv.normal;
    wand.draw_info.antialias = inv.normal;
    wand.draw_info.text_antialias = inv.normal;
    Ok(())
}

fn debug(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.debug = inv.normal;
    match inv.arg1 {
        Some(events) if inv.normal => wand.image_info.set_option("debug", events),
        _ => {
            wand.image_info.remove_option("debug");
        }
    }
    Ok(())
}

fn monitor(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.monitor = inv.normal;
    Ok(())
}

fn ping(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.ping = inv.normal;
    Ok(())
}

fn quiet(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.quiet = inv.normal;
    Ok(())
}

fn render(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.render = inv.normal;
    Ok(())
}

fn synchronize(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.synchronize = inv.normal;
    Ok(())
}

fn verbose(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.verbose = inv.normal;
    wand.quantize_info.measure_error = inv.normal;
    Ok(())
}

// ============================================================================
// Colors and patterns
// ============================================================================

fn background(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.background = color(wand, inv, "#fff")?;
    Ok(())
}

fn bordercolor(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let c = color(wand, inv, "#dfdfdf")?;
    wand.image_info.border_color = c;
    wand.draw_info.border_color = c;
    Ok(())
}

fn mattecolor(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let c = color(wand, inv, "#bdbdbd")?;
    wand.image_info.matte_color = c;
    Ok(())
}

fn transparent_color(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.transparent_color = color(wand, inv, "none")?;
    Ok(())
}

fn undercolor(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.undercolor = color(wand, inv, "none")?;
    Ok(())
}

/// Deprecated spelling of `-undercolor`.
fn r#box(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let option = if inv.normal { "-undercolor" } else { "+undercolor" };
    undercolor(wand, &Invocation::new(option, inv.arg1, None))
}

/// What a color-or-pattern argument resolved to.
enum Paint {
    Color(Color),
    Pattern(crate::image::Image),
}

/// Try the argument as a color first; anything else is a pattern image.
fn paint(wand: &mut Wand, inv: &Invocation<'_>) -> Result<Paint, ExceptionKind> {
    let text = if inv.normal { inv.arg1()? } else { "none" };
    if let Ok(c) = parse_color(text) {
        wand.image_info.set_option(inv.name, text);
        return Ok(Paint::Color(c));
    }
    let pattern = wand.cached_image(text)?;
    Ok(Paint::Pattern(pattern))
}

fn fill(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    match paint(wand, inv)? {
        Paint::Color(c) => {
            wand.draw_info.fill = c;
            wand.draw_info.fill_pattern = None;
        }
        Paint::Pattern(image) => wand.draw_info.fill_pattern = Some(image),
    }
    Ok(())
}

fn stroke(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    match paint(wand, inv)? {
        Paint::Color(c) => {
            wand.draw_info.stroke = c;
            wand.draw_info.stroke_pattern = None;
        }
        Paint::Pattern(image) => wand.draw_info.stroke_pattern = Some(image),
    }
    Ok(())
}

fn tile(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if !inv.normal {
        wand.image_info.remove_option("tile");
        wand.draw_info.fill_pattern = None;
        return Ok(());
    }
    let path = inv.arg1()?;
    wand.draw_info.fill_pattern = Some(wand.cached_image(path)?);
    wand.image_info.set_option("tile", path);
    Ok(())
}

// ============================================================================
// Keywords
// ============================================================================

fn channel(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if !inv.normal {
        wand.image_info.remove_option("channel");
        wand.image_info.channels = Channels::default();
        return Ok(());
    }
    let text = inv.arg1()?;
    wand.image_info.channels = Channels::parse(text)?;
    wand.image_info.set_option("channel", text);
    Ok(())
}

fn colorspace(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.colorspace = keyword::<Colorspace>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn compose(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.compose = keyword::<Compose>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn compress(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.compression = keyword::<Compression>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn direction(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.direction = keyword::<Direction>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn dither(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let method = keyword::<Dither>(wand, inv)?;
    let method = method.unwrap_or(Dither::None);
    let on = method != Dither::None;
    wand.image_info.dither = on;
    wand.quantize_info.dither = on;
    wand.quantize_info.dither_method = method;
    Ok(())
}

fn endian(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.endian = keyword::<Endian>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn gravity(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.gravity = keyword::<Gravity>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn interlace(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.interlace = keyword::<Interlace>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn orient(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.orientation = keyword::<Orientation>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn quantize(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.quantize_info.colorspace = keyword::<Colorspace>(wand, inv)?;
    Ok(())
}

fn stretch(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.stretch = keyword::<Stretch>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn style(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.style = keyword::<Style>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn image_type(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.image_type = keyword::<ImageType>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn units(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.units = keyword::<Units>(wand, inv)?.unwrap_or_default();
    Ok(())
}

fn virtual_pixel(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.virtual_pixel = keyword::<VirtualPixel>(wand, inv)?.unwrap_or_default();
    Ok(())
}

// ============================================================================
// Numbers
// ============================================================================

fn depth(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.depth = if inv.normal { Some(integer(inv)?) } else { None };
    Ok(())
}

fn fuzz(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if !inv.normal {
        wand.image_info.fuzz = 0.0;
        wand.image_info.remove_option("fuzz");
        return Ok(());
    }
    let text = inv.arg1()?;
    wand.image_info.fuzz =
        parse_fuzz(text).ok_or_else(|| ExceptionKind::InvalidArgument(text.to_string()))?;
    wand.image_info.set_option("fuzz", text);
    Ok(())
}

fn interline_spacing(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.interline_spacing = number(wand, inv, 0.0)?;
    Ok(())
}

fn interword_spacing(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.interword_spacing = number(wand, inv, 0.0)?;
    Ok(())
}

fn kerning(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.kerning = number(wand, inv, 0.0)?;
    Ok(())
}

fn pointsize(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let size = number(wand, inv, DEFAULT_POINTSIZE)?;
    wand.image_info.pointsize = size;
    wand.draw_info.pointsize = size;
    Ok(())
}

fn quality(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.quality = if inv.normal { Some(integer(inv)?) } else { None };
    Ok(())
}

fn scene(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.scene = if inv.normal { integer(inv)? } else { 0 };
    Ok(())
}

fn strokewidth(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.stroke_width = number(wand, inv, 1.0)?;
    Ok(())
}

fn treedepth(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.quantize_info.tree_depth = if inv.normal { integer(inv)? } else { 0 };
    plain_option(wand, inv)
}

fn weight(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if !inv.normal {
        wand.draw_info.weight = 400;
        wand.image_info.remove_option("weight");
        return Ok(());
    }
    let text = inv.arg1()?;
    wand.draw_info.weight = parse_weight(text, wand.draw_info.weight)
        .ok_or_else(|| ExceptionKind::InvalidArgument(text.to_string()))?;
    wand.image_info.set_option("weight", text);
    Ok(())
}

// ============================================================================
// Geometry and free text
// ============================================================================

fn affine(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if !inv.normal {
        wand.draw_info.affine = IDENTITY_AFFINE;
        wand.image_info.remove_option("affine");
        return Ok(());
    }
    let text = inv.arg1()?;
    wand.draw_info.affine =
        parse_affine(text).ok_or_else(|| ExceptionKind::InvalidArgument(text.to_string()))?;
    wand.image_info.set_option("affine", text);
    Ok(())
}

fn authenticate(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.authenticate = text(inv)?;
    Ok(())
}

fn density(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if inv.normal {
        parse_geometry(inv.arg1()?)?;
    }
    wand.image_info.density = text(inv)?;
    plain_option(wand, inv)
}

fn encoding(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.encoding = text(inv)?;
    plain_option(wand, inv)
}

fn extract(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if inv.normal {
        parse_region(inv.arg1()?)?;
    }
    wand.image_info.extract = text(inv)?;
    Ok(())
}

fn family(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.draw_info.family = text(inv)?;
    plain_option(wand, inv)
}

fn font(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let font = text(inv)?;
    wand.image_info.font = font.clone();
    wand.draw_info.font = font;
    Ok(())
}

fn page(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if !inv.normal {
        wand.image_info.page = None;
        wand.image_info.remove_option("page");
        return Ok(());
    }
    let page = canonical_page(inv.arg1()?)?;
    wand.image_info.set_option("page", page.as_str());
    wand.image_info.page = Some(page);
    Ok(())
}

fn sampling_factor(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if inv.normal {
        parse_geometry(inv.arg1()?)?;
    }
    wand.image_info.sampling_factor = text(inv)?;
    Ok(())
}

fn size(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if inv.normal {
        parse_region(inv.arg1()?)?;
    }
    wand.image_info.size = text(inv)?;
    Ok(())
}

fn texture(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.texture = text(inv)?;
    Ok(())
}

fn tile_offset(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if inv.normal {
        parse_region(inv.arg1()?)?;
    }
    plain_option(wand, inv)
}

fn view(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    wand.image_info.view = text(inv)?;
    Ok(())
}

/// `-define key=value` stores an arbitrary option; `+define key` drops it.
fn define(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let arg = inv.arg1()?;
    if inv.normal {
        let (key, value) = arg.split_once('=').unwrap_or((arg, ""));
        wand.image_info.set_option(key, value);
    } else {
        let key = arg.split_once('=').map_or(arg, |(k, _)| k);
        wand.image_info.remove_option(key);
    }
    Ok(())
}

// ============================================================================
// Resources
// ============================================================================

/// `-cache N`: memory limit `N`, map limit twice that. `+cache` lifts both.
fn cache(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let (memory, map) = if inv.normal {
        let text = inv.arg1()?;
        let amount = parse_si_size(text, 100.0)
            .ok_or_else(|| ExceptionKind::InvalidArgument(text.to_string()))?;
        (Limit::Amount(amount), Limit::Amount(2.0 * amount))
    } else {
        (Limit::Unlimited, Limit::Unlimited)
    };
    wand.resources.set_limit(ResourceType::Memory, memory);
    wand.resources.set_limit(ResourceType::Map, map);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::RecordedOp;
    use crate::resource::{LimitTable, ResourceRegistry};
    use crate::settings::{DEFAULT_BORDER_COLOR, DEFAULT_MATTE_COLOR, ImageInfo};
    use crate::test_helpers::*;
    use std::sync::Arc;

    #[test]
    fn adjoin_toggles_only_adjoin() {
        let (mut wand, _) = mock_wand();
        let before = wand.image_info.clone();
        wand.apply_setting("+adjoin", None).unwrap();
        let mut expected = before.clone();
        expected.adjoin = false;
        assert_eq!(wand.image_info, expected);
        wand.apply_setting("-adjoin", None).unwrap();
        assert_eq!(wand.image_info, before);
    }

    #[test]
    fn plus_background_restores_white() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-background", Some("red")).unwrap();
        assert_eq!(wand.image_info.background, Color::rgb(255, 0, 0));
        wand.apply_setting("+background", None).unwrap();
        assert_eq!(wand.image_info.background, Color::WHITE);
        assert_eq!(wand.image_info.option("background"), Some("#fff"));
    }

    #[test]
    fn plus_colors_use_documented_defaults() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-mattecolor", Some("blue")).unwrap();
        wand.apply_setting("+mattecolor", None).unwrap();
        wand.apply_setting("-bordercolor", Some("blue")).unwrap();
        wand.apply_setting("+bordercolor", None).unwrap();
        assert_eq!(wand.image_info.matte_color, DEFAULT_MATTE_COLOR);
        assert_eq!(wand.image_info.border_color, DEFAULT_BORDER_COLOR);
        assert_eq!(wand.draw_info.border_color, DEFAULT_BORDER_COLOR);
    }

    #[test]
    fn bad_value_keeps_previous_setting() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-background", Some("red")).unwrap();
        wand.apply_setting("-background", Some("nocolor")).unwrap();
        assert_eq!(wand.image_info.background, Color::rgb(255, 0, 0));
        wand.apply_setting("-gravity", Some("sideways")).unwrap();
        assert_eq!(wand.draw_info.gravity, Gravity::Undefined);
        assert_eq!(
            exception_kinds(&wand),
            vec![
                ExceptionKind::UnrecognizedColor("nocolor".into()),
                ExceptionKind::UnrecognizedKeyword {
                    kind: "gravity",
                    value: "sideways".into()
                },
            ]
        );
    }

    #[test]
    fn box_is_undercolor() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-box", Some("yellow")).unwrap();
        assert_eq!(wand.draw_info.undercolor, Color::rgb(255, 255, 0));
        assert_eq!(wand.image_info.option("undercolor"), Some("yellow"));
        wand.apply_setting("+box", None).unwrap();
        assert_eq!(wand.draw_info.undercolor, Color::TRANSPARENT);
    }

    #[test]
    fn fill_accepts_color_or_pattern() {
        let (mut wand, ops) = mock_wand();
        wand.apply_setting("-fill", Some("red")).unwrap();
        assert_eq!(wand.draw_info.fill, Color::rgb(255, 0, 0));

        wand.apply_setting("-fill", Some("checks.png")).unwrap();
        assert!(wand.draw_info.fill_pattern.is_some());
        // the color is kept alongside the pattern
        assert_eq!(wand.draw_info.fill, Color::rgb(255, 0, 0));

        wand.apply_setting("-stroke", Some("checks.png")).unwrap();
        let reads = ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| matches!(op, RecordedOp::Read { .. }))
            .count();
        assert_eq!(reads, 1, "the pattern is read once");
        assert!(wand.exceptions().is_empty());
    }

    #[test]
    fn plus_tile_drops_pattern() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-tile", Some("bricks.png")).unwrap();
        assert!(wand.draw_info.fill_pattern.is_some());
        wand.apply_setting("+tile", None).unwrap();
        assert!(wand.draw_info.fill_pattern.is_none());
    }

    #[test]
    fn weight_keywords_and_numbers() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-weight", Some("bold")).unwrap();
        assert_eq!(wand.draw_info.weight, 700);
        wand.apply_setting("-weight", Some("bolder")).unwrap();
        assert_eq!(wand.draw_info.weight, 800);
        wand.apply_setting("-weight", Some("250")).unwrap();
        assert_eq!(wand.draw_info.weight, 250);
        wand.apply_setting("-weight", Some("heavy")).unwrap();
        assert_eq!(wand.draw_info.weight, 250);
        assert_eq!(wand.exceptions().len(), 1);
    }

    #[test]
    fn page_is_canonical() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-page", Some("a4")).unwrap();
        assert_eq!(wand.image_info.page.as_deref(), Some("595x842"));
        wand.apply_setting("+page", None).unwrap();
        assert!(wand.image_info.page.is_none());
    }

    #[test]
    fn define_and_undefine() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-define", Some("png:compression-level=9")).unwrap();
        assert_eq!(wand.image_info.option("png:compression-level"), Some("9"));
        wand.apply_setting("+define", Some("png:compression-level")).unwrap();
        assert!(wand.image_info.option("png:compression-level").is_none());
    }

    #[test]
    fn dither_feeds_quantize_info() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-dither", Some("Riemersma")).unwrap();
        assert!(wand.quantize_info.dither);
        assert_eq!(wand.quantize_info.dither_method, Dither::Riemersma);
        wand.apply_setting("+dither", None).unwrap();
        assert!(!wand.quantize_info.dither);
        assert!(!wand.image_info.dither);
    }

    #[test]
    fn cache_sets_memory_and_twice_the_map() {
        let table = Arc::new(LimitTable::new());
        let (wand, _) = mock_wand();
        let mut wand = wand.with_resources(table.clone());
        wand.apply_setting("-cache", Some("64MiB")).unwrap();
        let mib = 1024.0 * 1024.0;
        assert_eq!(table.limit(ResourceType::Memory), Limit::Amount(64.0 * mib));
        assert_eq!(table.limit(ResourceType::Map), Limit::Amount(128.0 * mib));
        wand.apply_setting("+cache", None).unwrap();
        assert_eq!(table.limit(ResourceType::Memory), Limit::Unlimited);
    }

    #[test]
    fn flags_store_true_or_false() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-respect-parenthesis", None).unwrap();
        assert_eq!(wand.image_info.option("respect-parenthesis"), Some("true"));
        wand.apply_setting("+respect-parenthesis", None).unwrap();
        assert_eq!(wand.image_info.option("respect-parenthesis"), Some("false"));
    }

    #[test]
    fn settings_work_without_images() {
        let (mut wand, ops) = mock_wand();
        for (option, arg) in [
            ("-size", Some("10x20")),
            ("-depth", Some("16")),
            ("-pointsize", Some("24")),
            ("-channel", Some("RGB")),
            ("-colorspace", Some("Gray")),
            ("-fuzz", Some("5%")),
            ("-verbose", None),
        ] {
            wand.apply_setting(option, arg).unwrap();
        }
        assert!(wand.exceptions().is_empty());
        assert!(ops.lock().unwrap().is_empty());
        assert_eq!(wand.image_info.size_dimensions(), Some((10, 20)));
        assert_eq!(wand.image_info.depth, Some(16));
        assert_eq!(wand.draw_info.pointsize, 24.0);
        assert_eq!(wand.image_info.channels, Channels::RGB);
        assert_eq!(wand.image_info.colorspace, Colorspace::Gray);
        assert!((wand.image_info.fuzz - 0.05).abs() < 1e-9);
        assert!(wand.quantize_info.measure_error);
        assert_ne!(wand.image_info, ImageInfo::default());
    }
}
