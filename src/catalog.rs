//! Option catalog and the argv driver.
//!
//! The catalog says, for every option name, how many arguments it takes and
//! which of the four entry points it goes to. An option can belong to more
//! than one class: `-colorspace` is both a setting (for images read later)
//! and a simple operator (for images already in the list).
//!
//! [`run`] walks a linear argv:
//!
//! ```text
//! wand rose.png ( -clone 0 -negate ) -append -write out.png
//!      ^read    ^special        ^simple ^list   ^list
//! ```
//!
//! For each option the setting part is applied first, then the operator
//! part. A combined option with no images yet only does its setting part.
//! Words without a sigil are read as images.

use crate::exception::ExceptionKind;
use crate::operation::Invocation;
use crate::wand::{Wand, WandError};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

pub const SETTING: u8 = 1;
pub const SIMPLE: u8 = 1 << 1;
pub const LIST: u8 = 1 << 2;
pub const SPECIAL: u8 = 1 << 3;

/// Option reported when the argv ends with `(` still open.
const END_OF_ARGS: &str = "(end of arguments)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionInfo {
    /// Name without its sigil.
    pub name: &'static str,
    /// Arguments taken by `-name`.
    pub args: u8,
    /// Arguments taken by `+name`.
    pub plus_args: u8,
    pub flags: u8,
}

impl OptionInfo {
    pub fn is(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn arg_count(&self, normal: bool) -> usize {
        usize::from(if normal { self.args } else { self.plus_args })
    }
}

const fn opt(name: &'static str, args: u8, plus_args: u8, flags: u8) -> OptionInfo {
    OptionInfo {
        name,
        args,
        plus_args,
        flags,
    }
}

/// `-name arg`, `+name` with no argument.
const fn one(name: &'static str, flags: u8) -> OptionInfo {
    opt(name, 1, 0, flags)
}

/// No arguments in either polarity.
const fn bare(name: &'static str, flags: u8) -> OptionInfo {
    opt(name, 0, 0, flags)
}

const SETTING_SIMPLE: u8 = SETTING | SIMPLE;

static OPTIONS: &[OptionInfo] = &[
    // specials
    bare("(", SPECIAL),
    bare(")", SPECIAL),
    bare("{", SPECIAL),
    bare("}", SPECIAL),
    opt("--", 1, 1, SPECIAL),
    one("clone", SPECIAL),
    one("list", SPECIAL),
    bare("noop", SPECIAL),
    one("read", SPECIAL),
    opt("sans", 1, 1, SPECIAL),
    bare("sans0", SPECIAL),
    opt("sans2", 2, 2, SPECIAL),
    // settings
    bare("adjoin", SETTING),
    one("affine", SETTING),
    bare("antialias", SETTING),
    one("attenuate", SETTING),
    one("authenticate", SETTING),
    one("background", SETTING),
    one("bias", SETTING),
    bare("black-point-compensation", SETTING),
    one("blue-primary", SETTING),
    one("bordercolor", SETTING),
    one("box", SETTING),
    one("cache", SETTING),
    one("caption", SETTING),
    one("comment", SETTING),
    one("compose", SETTING),
    one("compress", SETTING),
    one("debug", SETTING),
    opt("define", 1, 1, SETTING),
    one("delay", SETTING),
    one("density", SETTING),
    one("direction", SETTING),
    one("display", SETTING),
    one("dispose", SETTING),
    one("dither", SETTING),
    one("encoding", SETTING),
    one("endian", SETTING),
    one("extract", SETTING),
    one("family", SETTING),
    one("fill", SETTING),
    one("filter", SETTING),
    one("font", SETTING),
    one("format", SETTING),
    one("fuzz", SETTING),
    one("gravity", SETTING),
    one("green-primary", SETTING),
    one("intent", SETTING),
    one("interlace", SETTING),
    one("interline-spacing", SETTING),
    one("interpolate", SETTING),
    one("interword-spacing", SETTING),
    one("kerning", SETTING),
    one("label", SETTING),
    one("log", SETTING),
    one("loop", SETTING),
    one("mattecolor", SETTING),
    bare("monitor", SETTING),
    one("orient", SETTING),
    one("page", SETTING),
    bare("ping", SETTING),
    one("pointsize", SETTING),
    one("precision", SETTING),
    one("preview", SETTING),
    one("quality", SETTING),
    one("quantize", SETTING),
    bare("quiet", SETTING),
    one("red-primary", SETTING),
    bare("render", SETTING),
    bare("respect-parenthesis", SETTING),
    one("sampling-factor", SETTING),
    one("scene", SETTING),
    one("seed", SETTING),
    one("size", SETTING),
    one("stretch", SETTING),
    one("stroke", SETTING),
    one("strokewidth", SETTING),
    one("style", SETTING),
    bare("synchronize", SETTING),
    bare("taint", SETTING),
    one("texture", SETTING),
    one("tile", SETTING),
    one("tile-offset", SETTING),
    one("transparent-color", SETTING),
    one("treedepth", SETTING),
    one("undercolor", SETTING),
    one("units", SETTING),
    one("view", SETTING),
    one("virtual-pixel", SETTING),
    one("weight", SETTING),
    one("white-point", SETTING),
    // settings that also operate on the current images
    one("channel", SETTING_SIMPLE),
    one("colorspace", SETTING_SIMPLE),
    one("depth", SETTING_SIMPLE),
    bare("monochrome", SETTING_SIMPLE),
    one("type", SETTING_SIMPLE),
    bare("verbose", SETTING_SIMPLE),
    // simple operators
    one("adaptive-blur", SIMPLE),
    one("adaptive-resize", SIMPLE),
    one("adaptive-sharpen", SIMPLE),
    one("alpha", SIMPLE),
    opt("annotate", 2, 2, SIMPLE),
    bare("auto-gamma", SIMPLE),
    bare("auto-level", SIMPLE),
    bare("auto-orient", SIMPLE),
    one("black-threshold", SIMPLE),
    one("blue-shift", SIMPLE),
    one("blur", SIMPLE),
    one("border", SIMPLE),
    one("brightness-contrast", SIMPLE),
    one("cdl", SIMPLE),
    one("charcoal", SIMPLE),
    one("chop", SIMPLE),
    bare("clamp", SIMPLE),
    one("colorize", SIMPLE),
    one("color-matrix", SIMPLE),
    one("colors", SIMPLE),
    bare("contrast", SIMPLE),
    one("contrast-stretch", SIMPLE),
    one("convolve", SIMPLE),
    one("crop", SIMPLE),
    one("cycle", SIMPLE),
    one("decipher", SIMPLE),
    one("deskew", SIMPLE),
    bare("despeckle", SIMPLE),
    opt("distort", 2, 2, SIMPLE),
    one("draw", SIMPLE),
    one("edge", SIMPLE),
    one("emboss", SIMPLE),
    one("encipher", SIMPLE),
    bare("enhance", SIMPLE),
    bare("equalize", SIMPLE),
    opt("evaluate", 2, 2, SIMPLE),
    one("extent", SIMPLE),
    one("features", SIMPLE),
    bare("flip", SIMPLE),
    opt("floodfill", 2, 2, SIMPLE),
    bare("flop", SIMPLE),
    one("frame", SIMPLE),
    opt("function", 2, 2, SIMPLE),
    opt("gamma", 1, 1, SIMPLE),
    one("gaussian", SIMPLE),
    one("gaussian-blur", SIMPLE),
    one("geometry", SIMPLE),
    one("highlight-color", SIMPLE),
    bare("identify", SIMPLE),
    one("implode", SIMPLE),
    one("interpolative-resize", SIMPLE),
    one("lat", SIMPLE),
    opt("level", 1, 1, SIMPLE),
    opt("level-colors", 1, 1, SIMPLE),
    one("linear-stretch", SIMPLE),
    one("liquid-rescale", SIMPLE),
    one("lowlight-color", SIMPLE),
    bare("matte", SIMPLE),
    one("median", SIMPLE),
    one("mode", SIMPLE),
    one("modulate", SIMPLE),
    opt("morphology", 2, 2, SIMPLE),
    one("motion-blur", SIMPLE),
    bare("negate", SIMPLE),
    opt("noise", 1, 1, SIMPLE),
    bare("normalize", SIMPLE),
    opt("opaque", 1, 1, SIMPLE),
    one("ordered-dither", SIMPLE),
    one("paint", SIMPLE),
    one("polaroid", SIMPLE),
    one("posterize", SIMPLE),
    one("radial-blur", SIMPLE),
    opt("raise", 1, 1, SIMPLE),
    one("random-threshold", SIMPLE),
    one("repage", SIMPLE),
    one("resample", SIMPLE),
    one("resize", SIMPLE),
    one("roll", SIMPLE),
    one("rotate", SIMPLE),
    one("sample", SIMPLE),
    one("scale", SIMPLE),
    one("segment", SIMPLE),
    one("selective-blur", SIMPLE),
    bare("separate", SIMPLE),
    one("sepia-tone", SIMPLE),
    opt("set", 2, 1, SIMPLE),
    opt("shade", 1, 1, SIMPLE),
    one("shadow", SIMPLE),
    one("sharpen", SIMPLE),
    one("shave", SIMPLE),
    one("shear", SIMPLE),
    opt("sigmoidal-contrast", 1, 1, SIMPLE),
    one("sketch", SIMPLE),
    one("solarize", SIMPLE),
    opt("sparse-color", 2, 2, SIMPLE),
    one("splice", SIMPLE),
    one("spread", SIMPLE),
    opt("statistic", 2, 2, SIMPLE),
    bare("strip", SIMPLE),
    one("swirl", SIMPLE),
    one("threshold", SIMPLE),
    one("thumbnail", SIMPLE),
    one("tint", SIMPLE),
    bare("transform", SIMPLE),
    opt("transparent", 1, 1, SIMPLE),
    bare("transpose", SIMPLE),
    bare("transverse", SIMPLE),
    bare("trim", SIMPLE),
    bare("unique", SIMPLE),
    bare("unique-colors", SIMPLE),
    one("unsharp", SIMPLE),
    one("vignette", SIMPLE),
    one("wave", SIMPLE),
    one("white-threshold", SIMPLE),
    // list operators
    bare("append", LIST),
    bare("average", LIST),
    one("channel-fx", LIST),
    bare("clut", LIST),
    bare("coalesce", LIST),
    bare("combine", LIST),
    bare("composite", LIST),
    bare("deconstruct", LIST),
    one("delete", LIST),
    one("duplicate", LIST),
    one("evaluate-sequence", LIST),
    bare("fft", LIST),
    bare("flatten", LIST),
    one("fx", LIST),
    bare("hald-clut", LIST),
    bare("ift", LIST),
    one("insert", LIST),
    one("layers", LIST),
    opt("limit", 2, 2, LIST),
    one("map", LIST),
    one("morph", LIST),
    bare("mosaic", LIST),
    one("print", LIST),
    one("remap", LIST),
    bare("reverse", LIST),
    opt("smush", 1, 1, LIST),
    one("swap", LIST),
    opt("write", 1, 1, LIST),
];

static INDEX: LazyLock<HashMap<&'static str, OptionInfo>> =
    LazyLock::new(|| OPTIONS.iter().map(|o| (o.name, *o)).collect());

/// Look up an option, with or without its sigil.
pub fn lookup(option: &str) -> Option<OptionInfo> {
    let inv = Invocation::new(option, None, None);
    INDEX.get(inv.name).copied()
}

/// Every cataloged option.
pub fn options() -> &'static [OptionInfo] {
    OPTIONS
}

fn is_option(token: &str) -> bool {
    matches!(token, "(" | ")" | "{" | "}")
        || (token.len() > 1 && (token.starts_with('-') || token.starts_with('+')))
}

// ============================================================================
// Driver
// ============================================================================

/// Apply a linear argv to the wand, option by option.
///
/// Exceptions are caught after every option; the caller collects them with
/// [`Wand::take_exceptions`]. Only a fatal problem stops the run early.
pub fn run<S: AsRef<str>>(wand: &mut Wand, argv: &[S]) -> Result<(), WandError> {
    let mut rest = argv.iter().map(AsRef::as_ref);
    while let Some(token) = rest.next() {
        if !is_option(token) {
            wand.apply_special("read", Some(token))?;
            wand.catch_exceptions(false);
            continue;
        }
        let Some(info) = lookup(token) else {
            wand.report(ExceptionKind::UnrecognizedOption, token);
            wand.catch_exceptions(false);
            continue;
        };
        let normal = !token.starts_with('+');
        let wanted = info.arg_count(normal);
        let args: Vec<&str> = rest.by_ref().take(wanted).collect();
        if args.len() < wanted {
            wand.report(ExceptionKind::MissingArgument, token);
            wand.catch_exceptions(false);
            break;
        }
        apply(wand, &info, token, args.first().copied(), args.get(1).copied())?;
        wand.catch_exceptions(false);
    }
    if wand.list_depth() > 0 {
        wand.report(ExceptionKind::UnbalancedParenthesis, END_OF_ARGS);
        wand.catch_exceptions(false);
    }
    Ok(())
}

/// Apply one cataloged option: setting part first, then the operator part.
pub fn apply(
    wand: &mut Wand,
    info: &OptionInfo,
    option: &str,
    arg1: Option<&str>,
    arg2: Option<&str>,
) -> Result<(), WandError> {
    debug!(option, flags = info.flags, "dispatch");
    if info.is(SPECIAL) {
        return wand.apply_special(option, arg1);
    }
    if info.is(SETTING) {
        wand.apply_setting(option, arg1)?;
        if wand.images.is_empty() {
            return Ok(());
        }
    }
    if info.is(SIMPLE) {
        wand.apply_simple_operator(option, arg1, arg2)?;
    }
    if info.is(LIST) {
        wand.apply_list_operator(option, arg1, arg2)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::Exception;
    use crate::imaging::backend::tests::MockBackend;
    use crate::operation::{OperatorClass, registered, registered_names};
    use crate::test_helpers::*;

    fn kinds(caught: &[Exception]) -> Vec<ExceptionKind> {
        caught.iter().map(|e| e.kind.clone()).collect()
    }

    // =========================================================================
    // Table tests
    // =========================================================================

    #[test]
    fn names_are_unique() {
        assert_eq!(INDEX.len(), OPTIONS.len());
    }

    #[test]
    fn every_catalog_class_has_a_handler() {
        for info in options() {
            for (flag, class) in [
                (SETTING, OperatorClass::Setting),
                (SIMPLE, OperatorClass::Simple),
                (LIST, OperatorClass::List),
                (SPECIAL, OperatorClass::Special),
            ] {
                if info.is(flag) {
                    assert!(registered(class, info.name), "{} has no {class:?} handler", info.name);
                }
            }
        }
    }

    #[test]
    fn every_handler_is_cataloged() {
        for (class, flag) in [
            (OperatorClass::Setting, SETTING),
            (OperatorClass::Simple, SIMPLE),
            (OperatorClass::List, LIST),
            (OperatorClass::Special, SPECIAL),
        ] {
            for name in registered_names(class) {
                let info = lookup(name).unwrap_or_else(|| panic!("{name} not cataloged"));
                assert!(info.is(flag), "{name} missing {class:?} flag");
            }
        }
    }

    #[test]
    fn lookup_ignores_sigils() {
        assert_eq!(lookup("-resize"), lookup("+resize"));
        assert_eq!(lookup("resize").map(|o| o.args), Some(1));
        assert_eq!(lookup("+set").map(|o| o.arg_count(false)), Some(1));
        assert_eq!(lookup("(").map(|o| o.flags), Some(SPECIAL));
        assert!(lookup("-bogus").is_none());
    }

    // =========================================================================
    // Driver tests
    // =========================================================================

    #[test]
    fn bare_words_are_read() {
        let (mut wand, _) = mock_wand();
        run(&mut wand, &["a.png", "b.png"]).unwrap();
        assert_list_shape(&wand, &["a.png", "b.png"]);
    }

    #[test]
    fn settings_then_operators_in_order() {
        let (mut wand, ops) = mock_wand();
        run(&mut wand, &["-size", "8x6", "xc:red", "-flip", "+repage"]).unwrap();
        assert_eq!(dimensions(&wand), vec![(8, 6)]);
        assert_eq!(transform_count(&ops, "flip"), 1);
        assert!(wand.take_exceptions().is_empty());
    }

    #[test]
    fn combined_option_without_images_only_sets() {
        let (mut wand, ops) = mock_wand();
        run(&mut wand, &["-colorspace", "Gray"]).unwrap();
        assert!(wand.take_exceptions().is_empty());
        assert!(ops.lock().unwrap().is_empty());
        assert_eq!(wand.image_info.colorspace.to_string(), "Gray");
    }

    #[test]
    fn operator_without_images_reports() {
        let (mut wand, _) = mock_wand();
        run(&mut wand, &["-negate"]).unwrap();
        assert_eq!(kinds(&wand.take_exceptions()), vec![ExceptionKind::NoImagesDefined]);
    }

    #[test]
    fn unknown_option_is_reported_and_skipped() {
        let (mut wand, _) = mock_wand();
        run(&mut wand, &["-frobnicate", "a.png"]).unwrap();
        assert_list_shape(&wand, &["a.png"]);
        let caught = wand.take_exceptions();
        assert_eq!(kinds(&caught), vec![ExceptionKind::UnrecognizedOption]);
        assert_eq!(caught[0].option, "-frobnicate");
    }

    #[test]
    fn missing_argument_stops_the_run() {
        let (mut wand, _) = mock_wand();
        run(&mut wand, &["a.png", "-resize"]).unwrap();
        assert_eq!(kinds(&wand.take_exceptions()), vec![ExceptionKind::MissingArgument]);
        assert_list_shape(&wand, &["a.png"]);
    }

    #[test]
    fn scopes_and_clones() {
        let (mut wand, _) = mock_wand();
        run(
            &mut wand,
            &["a.png", "b.png", "(", "-clone", "0", "-flip", ")", "+swap"],
        )
        .unwrap();
        assert_list_shape(&wand, &["a.png", "a.png", "b.png"]);
        assert!(wand.take_exceptions().is_empty());
        assert_eq!(wand.list_depth(), 0);
    }

    #[test]
    fn open_scope_at_the_end_is_reported() {
        let (mut wand, _) = mock_wand();
        run(&mut wand, &["a.png", "("]).unwrap();
        let caught = wand.take_exceptions();
        assert_eq!(kinds(&caught), vec![ExceptionKind::UnbalancedParenthesis]);
        assert_eq!(caught[0].option, END_OF_ARGS);
    }

    #[test]
    fn double_dash_reads_option_like_names() {
        let (mut wand, ops) = mock_wand();
        run(&mut wand, &["--", "-odd.png"]).unwrap();
        assert_list_shape(&wand, &["-odd.png"]);
        assert_eq!(transform_count(&ops, "negate"), 0);
    }

    #[test]
    fn fatal_problem_aborts() {
        let (mut wand, ops) = mock_wand_with(MockBackend::new().exhausting("negate"));
        let result = run(&mut wand, &["a.png", "-negate", "-flip"]);
        assert!(matches!(result, Err(WandError::Fatal { .. })));
        assert_eq!(transform_count(&ops, "flip"), 0);
        assert!(wand.catch_exceptions(true));
    }

    #[test]
    fn plus_forms_take_their_own_argument_count() {
        let (mut wand, _) = mock_wand();
        run(&mut wand, &["a.png", "-set", "comment", "hi", "+set", "comment", "b.png"]).unwrap();
        assert!(wand.take_exceptions().is_empty());
        assert_list_shape(&wand, &["a.png", "b.png"]);
        assert_eq!(wand.images.first().and_then(|i| i.property("comment")), None);
    }
}
