//! List operators: applied once to the active list as a whole.
//!
//! Three shapes:
//!
//! - **Replacing**: the backend turns the list (or a few operands taken from
//!   it) into a new list that replaces the old one (`-append`, `-layers`,
//!   `-composite`). On failure the old list is kept.
//! - **Surgery**: the list is edited in place (`-delete`, `-duplicate`,
//!   `-insert`, `-swap`, `-reverse`).
//! - **Side effects**: `-write`, `-print` and `-limit` leave the list alone.

use super::{Invocation, WandFn, replace_list, transform};
use crate::exception::ExceptionKind;
use crate::geometry::{parse_geometry, parse_region, parse_scenes, select_scenes};
use crate::image::Image;
use crate::imaging::{ListTransform, Transform, WriteParams, gravity_offset};
use crate::keywords::{Compose, EvaluateOp, LayerMethod, ResourceType};
use crate::properties::{PropertyContext, interpret_properties};
use crate::resource::Limit;
use crate::wand::Wand;
use tracing::debug;

type Outcome = Result<(), ExceptionKind>;

pub(super) const HANDLERS: &[(&str, WandFn)] = &[
    ("append", append),
    ("average", average),
    ("channel-fx", channel_fx),
    ("clut", clut),
    ("coalesce", coalesce),
    ("combine", combine),
    ("composite", composite),
    ("deconstruct", deconstruct),
    ("delete", delete),
    ("duplicate", duplicate),
    ("evaluate-sequence", evaluate_sequence),
    ("fft", fft),
    ("flatten", flatten),
    ("fx", fx),
    ("hald-clut", clut),
    ("ift", ift),
    ("insert", insert),
    ("layers", layers),
    ("limit", limit),
    ("map", map),
    ("morph", morph),
    ("mosaic", mosaic),
    ("print", print),
    ("remap", remap),
    ("reverse", reverse),
    ("smush", smush),
    ("swap", swap),
    ("write", write),
];

fn invalid(text: &str) -> ExceptionKind {
    ExceptionKind::InvalidArgument(text.to_string())
}

fn integer(text: &str) -> Result<i64, ExceptionKind> {
    text.trim().parse().map_err(|_| invalid(text))
}

/// The `compose` setting, `Over` when unset.
fn compose_setting(wand: &Wand) -> Compose {
    wand.image_info
        .option_as::<Compose>("compose")
        .unwrap_or(Compose::Over)
}

/// Run `op` over copies of the images at `indexes`; the result replaces the
/// whole active list.
fn replace_from(wand: &mut Wand, indexes: &[usize], op: &ListTransform) -> Outcome {
    let operands = wand
        .images
        .clone_at(indexes)
        .ok_or(ExceptionKind::MissingImageOperand)?;
    let result = wand.backend.apply_list(&operands, op)?;
    wand.images.replace_all(result);
    Ok(())
}

// ============================================================================
// Replacing operators
// ============================================================================

/// `-append` stacks top to bottom, `+append` left to right.
fn append(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    replace_list(wand, &ListTransform::Append {
        vertical: inv.normal,
    })
}

fn smush(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let offset = integer(inv.arg1()?)?;
    replace_list(wand, &ListTransform::Smush {
        offset,
        vertical: inv.normal,
    })
}

fn average(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    replace_list(wand, &ListTransform::EvaluateSequence(EvaluateOp::Mean))
}

fn evaluate_sequence(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let op = inv.keyword::<EvaluateOp>()?;
    replace_list(wand, &ListTransform::EvaluateSequence(op))
}

fn channel_fx(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let expression = inv.arg1()?.to_string();
    replace_list(wand, &ListTransform::ChannelFx(expression))
}

fn coalesce(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    replace_list(wand, &ListTransform::Coalesce)
}

fn combine(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    let colorspace = wand.image_info.colorspace;
    replace_list(wand, &ListTransform::Combine(colorspace))
}

fn fx(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let expression = inv.arg1()?.to_string();
    replace_list(wand, &ListTransform::Fx(expression))
}

fn fft(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    replace_list(wand, &ListTransform::Fft {
        magnitude: inv.normal,
    })
}

/// Inverse transform of a magnitude/phase (or real/imaginary) pair.
fn ift(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if wand.images.len() < 2 {
        return Err(ExceptionKind::MissingImageOperand);
    }
    replace_from(wand, &[0, 1], &ListTransform::Ift {
        magnitude: inv.normal,
    })
}

fn morph(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let text = inv.arg1()?;
    let frames = usize::try_from(integer(text)?).map_err(|_| invalid(text))?;
    replace_list(wand, &ListTransform::Morph { frames })
}

/// The first image recoloured through the last one.
fn clut(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let len = wand.images.len();
    if len < 2 {
        return Err(ExceptionKind::MissingImageOperand);
    }
    replace_from(wand, &[0, len - 1], &ListTransform::Clut {
        hald: inv.name == "hald-clut",
    })
}

/// Where the source lands on the destination: its `-geometry` offset,
/// adjusted for the destination's gravity.
fn composite_offset(destination: &Image, source: &Image) -> (i64, i64) {
    let offset = source
        .artifacts
        .get("geometry")
        .and_then(|g| parse_region(g).ok())
        .map_or((0, 0), |r| (r.x, r.y));
    gravity_offset(
        destination.gravity,
        destination.dimensions(),
        source.dimensions(),
        offset,
    )
}

/// Destination, source and an optional mask; the rest of the list is
/// dropped.
fn composite(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    let len = wand.images.len();
    if len < 2 {
        return Err(ExceptionKind::MissingImageOperand);
    }
    let (x, y) = match (wand.images.at(0), wand.images.at(1)) {
        (Some(destination), Some(source)) => composite_offset(destination, source),
        _ => return Err(ExceptionKind::MissingImageOperand),
    };
    let operands: Vec<usize> = (0..len.min(3)).collect();
    let compose = compose_setting(wand);
    replace_from(wand, &operands, &ListTransform::Composite { compose, x, y })
}

fn deconstruct(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    replace_list(wand, &ListTransform::Layers(LayerMethod::CompareAny))
}

fn flatten(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    replace_list(wand, &ListTransform::Layers(LayerMethod::Flatten))
}

fn mosaic(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    replace_list(wand, &ListTransform::Layers(LayerMethod::Mosaic))
}

/// `-layers method`. `Composite` needs a `null:` separator between the
/// destination frames and the source frames.
fn layers(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let method = inv.keyword::<LayerMethod>()?;
    if method != LayerMethod::Composite {
        return replace_list(wand, &ListTransform::Layers(method));
    }
    // the separator needs at least one frame on each side
    let len = wand.images.len();
    let split = wand
        .images
        .iter()
        .skip(1)
        .position(Image::is_null)
        .map(|i| i + 1)
        .filter(|&i| i + 1 < len)
        .ok_or(ExceptionKind::MissingNullSeparator)?;
    let (x, y) = match (wand.images.at(0), wand.images.at(split + 1)) {
        (Some(destination), Some(source)) => composite_offset(destination, source),
        _ => (0, 0),
    };
    let operands: Vec<usize> = (0..wand.images.len()).filter(|&i| i != split).collect();
    let compose = compose_setting(wand);
    replace_from(wand, &operands, &ListTransform::CompositeLayers {
        compose,
        x,
        y,
        split,
    })
}

/// `-remap file` maps every image onto the colors of `file`; `+remap`
/// reduces the whole list to one shared palette.
fn remap(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let dither = wand.quantize_info.dither;
    if !inv.normal {
        let colors = wand.quantize_info.number_colors;
        return replace_list(wand, &ListTransform::Remap { colors, dither });
    }
    let reference = Box::new(wand.cached_image(inv.arg1()?)?);
    let op = Transform::Remap { reference, dither };
    for handle in wand.images.handles() {
        let Some(mut image) = wand.images.take(handle) else {
            continue;
        };
        match transform(wand, &mut image, &op) {
            Ok(None) => wand.images.restore(handle, image),
            Ok(Some(replacements)) => {
                wand.images.splice(handle, replacements);
            }
            Err(kind) => {
                wand.images.restore(handle, image);
                return Err(kind);
            }
        }
    }
    Ok(())
}

/// Deprecated spelling of `+remap`.
fn map(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    remap(wand, &Invocation::new("+remap", inv.arg1, None))
}

// ============================================================================
// List surgery
// ============================================================================

/// `-delete scenes`; `+delete` drops the last image. Scenes past the end
/// of the list are ignored.
fn delete(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    if !inv.normal {
        wand.images.remove_last();
        return Ok(());
    }
    let mut scenes = select_scenes(inv.arg1()?, wand.images.len())?;
    scenes.sort_unstable();
    scenes.dedup();
    for index in scenes.into_iter().rev() {
        wand.images.remove(index);
    }
    Ok(())
}

/// `-duplicate count[,scenes]` appends `count` copies of the scenes (the
/// last image by default). `+duplicate` copies the last image once.
fn duplicate(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let len = wand.images.len();
    let (count, scenes) = if inv.normal {
        let text = inv.arg1()?;
        match text.split_once(',') {
            Some((count, scenes)) => (integer(count)?, parse_scenes(scenes, len)?),
            None => (integer(text)?, vec![len - 1]),
        }
    } else {
        (1, vec![len - 1])
    };
    let copies = wand
        .images
        .clone_at(&scenes)
        .ok_or(ExceptionKind::UnableToCloneImage)?;
    for _ in 0..count.max(0) {
        wand.images.extend(copies.iter().cloned());
    }
    Ok(())
}

/// Move the last image to `index`; `+insert` moves it to the front.
fn insert(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let index = if inv.normal { integer(inv.arg1()?)? } else { 0 };
    let Some(image) = wand.images.remove_last() else {
        return Err(ExceptionKind::NoImagesDefined);
    };
    let len = wand.images.len() as i64;
    let position = if index < 0 { len + index } else { index };
    if !(0..=len).contains(&position) {
        wand.images.push(image);
        return Err(ExceptionKind::NoSuchImage(index.to_string()));
    }
    wand.images.insert(position as usize, image);
    Ok(())
}

fn reverse(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    wand.images.reverse();
    Ok(())
}

/// `-swap p,q`; `+swap` exchanges the last two images.
fn swap(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let (p, q) = if inv.normal {
        let g = parse_geometry(inv.arg1()?)?;
        (g.rho as i64, g.sigma_or(-2.0) as i64)
    } else {
        (-1, -2)
    };
    let missing = || ExceptionKind::NoSuchImage(format!("{p},{q}"));
    let a = wand.images.resolve_index(p).ok_or_else(missing)?;
    let b = wand.images.resolve_index(q).ok_or_else(missing)?;
    if a != b {
        wand.images.swap(a, b);
    }
    Ok(())
}

// ============================================================================
// Side effects
// ============================================================================

/// `-limit resource amount`: an SI size, a percentage, or `unlimited`.
fn limit(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let kind = inv.keyword::<ResourceType>()?;
    let text = inv.arg2()?;
    let limit = Limit::parse(text).ok_or_else(|| invalid(text))?;
    debug!(resource = %kind, %limit, "set resource limit");
    wand.resources.set_limit(kind, limit);
    Ok(())
}

/// Interpret the argument once against the list and print it.
fn print(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let ctx = PropertyContext {
        info: &wand.image_info,
        image: wand.images.first(),
        list_len: wand.images.len(),
    };
    let text = interpret_properties(inv.arg1()?, &ctx)?;
    write!(wand.out(), "{text}").map_err(|e| ExceptionKind::Collaborator(e.to_string()))
}

/// `-write file` writes the list and renames its images after the file;
/// `+write` writes a copy and leaves the list untouched.
fn write(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let path = inv.arg1()?;
    wand.registry.evict(path);
    let params = WriteParams {
        destination: path.to_string(),
        adjoin: wand.image_info.adjoin,
        quality: wand.image_info.quality,
    };
    let images: Vec<Image> = wand.images.iter().cloned().collect();
    wand.backend.write(&images, &params).map_err(|err| match ExceptionKind::from(err) {
        ExceptionKind::Collaborator(reason) => ExceptionKind::UnableToWriteImage {
            path: path.to_string(),
            reason,
        },
        fatal => fatal,
    })?;
    if inv.normal {
        for image in wand.images.iter_mut() {
            image.filename = path.to_string();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::resource::{LimitTable, ResourceRegistry};
    use crate::test_helpers::*;
    use std::sync::Arc;

    fn wand_with(names: &[&str]) -> (Wand, OpLog) {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, names);
        (wand, ops)
    }

    #[test]
    fn duplicate_appends_copies_of_the_last_image() {
        let (mut wand, _) = wand_with(&["a", "b"]);
        wand.apply_list_operator("-duplicate", Some("3,-1"), None).unwrap();
        assert_list_shape(&wand, &["a", "b", "b", "b", "b"]);

        let (mut wand, _) = wand_with(&["a", "b"]);
        wand.apply_list_operator("+duplicate", None, None).unwrap();
        assert_list_shape(&wand, &["a", "b", "b"]);

        let (mut wand, _) = wand_with(&["a", "b", "c"]);
        wand.apply_list_operator("-duplicate", Some("2,0-1"), None).unwrap();
        assert_list_shape(&wand, &["a", "b", "c", "a", "b", "a", "b"]);
    }

    #[test]
    fn swap_twice_restores_order() {
        let (mut wand, _) = wand_with(&["a", "b", "c"]);
        wand.apply_list_operator("-swap", Some("0,1"), None).unwrap();
        assert_list_shape(&wand, &["b", "a", "c"]);
        wand.apply_list_operator("-swap", Some("0,1"), None).unwrap();
        assert_list_shape(&wand, &["a", "b", "c"]);
        wand.apply_list_operator("+swap", None, None).unwrap();
        assert_list_shape(&wand, &["a", "c", "b"]);
    }

    #[test]
    fn swap_out_of_range_reports() {
        let (mut wand, _) = wand_with(&["a", "b"]);
        wand.apply_list_operator("-swap", Some("0,5"), None).unwrap();
        assert_list_shape(&wand, &["a", "b"]);
        assert!(matches!(exception_kinds(&wand)[..], [ExceptionKind::NoSuchImage(_)]));
    }

    #[test]
    fn delete_scenes_and_last() {
        let (mut wand, _) = wand_with(&["a", "b", "c", "d"]);
        wand.apply_list_operator("-delete", Some("0,2"), None).unwrap();
        assert_list_shape(&wand, &["b", "d"]);
        wand.apply_list_operator("+delete", None, None).unwrap();
        assert_list_shape(&wand, &["b"]);
    }

    #[test]
    fn delete_ranges_and_negative_indexes() {
        let (mut wand, _) = wand_with(&["a", "b", "c", "d"]);
        wand.apply_list_operator("-delete", Some("1--1"), None).unwrap();
        assert_list_shape(&wand, &["a"]);
    }

    #[test]
    fn delete_ignores_scenes_past_the_end() {
        let (mut wand, _) = wand_with(&["a", "b", "c"]);
        wand.apply_list_operator("-delete", Some("1-10"), None).unwrap();
        assert_list_shape(&wand, &["a"]);
        wand.apply_list_operator("-delete", Some("5"), None).unwrap();
        assert_list_shape(&wand, &["a"]);
        assert!(exception_kinds(&wand).is_empty());
    }

    #[test]
    fn insert_moves_the_last_image() {
        let (mut wand, _) = wand_with(&["a", "b", "c"]);
        wand.apply_list_operator("-insert", Some("1"), None).unwrap();
        assert_list_shape(&wand, &["a", "c", "b"]);
        wand.apply_list_operator("+insert", None, None).unwrap();
        assert_list_shape(&wand, &["b", "a", "c"]);
    }

    #[test]
    fn insert_out_of_range_keeps_the_list() {
        let (mut wand, _) = wand_with(&["a", "b"]);
        wand.apply_list_operator("-insert", Some("9"), None).unwrap();
        assert_list_shape(&wand, &["a", "b"]);
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::NoSuchImage("9".into())]);
    }

    #[test]
    fn reverse_reverses() {
        let (mut wand, _) = wand_with(&["a", "b", "c"]);
        wand.apply_list_operator("-reverse", None, None).unwrap();
        assert_list_shape(&wand, &["c", "b", "a"]);
    }

    #[test]
    fn append_replaces_the_list() {
        let (mut wand, ops) = wand_with(&["a", "b", "c"]);
        wand.apply_list_operator("-append", None, None).unwrap();
        assert_eq!(dimensions(&wand), vec![(4, 12)]);
        wand.apply_list_operator("+append", None, None).unwrap();
        assert_eq!(list_calls(&ops, "append"), vec![3, 1]);
    }

    #[test]
    fn clut_needs_two_images() {
        let (mut wand, ops) = wand_with(&["a"]);
        wand.apply_list_operator("-clut", None, None).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::MissingImageOperand]);
        assert!(list_calls(&ops, "clut").is_empty());
        assert_list_shape(&wand, &["a"]);
    }

    #[test]
    fn clut_uses_first_and_last() {
        let (mut wand, ops) = wand_with(&["a", "b", "lut"]);
        wand.apply_list_operator("-hald-clut", None, None).unwrap();
        assert_eq!(list_calls(&ops, "hald-clut"), vec![2]);
        assert_list_shape(&wand, &["a"]);
    }

    #[test]
    fn composite_takes_an_optional_mask() {
        let (mut wand, ops) = wand_with(&["dst", "src", "mask", "extra"]);
        wand.apply_list_operator("-composite", None, None).unwrap();
        assert_eq!(list_calls(&ops, "composite"), vec![3]);
        assert_list_shape(&wand, &["dst"]);
    }

    #[test]
    fn composite_offset_follows_geometry_and_gravity() {
        let destination = Image::canvas(10, 10, Color::WHITE);
        let mut source = Image::canvas(4, 4, Color::BLACK);
        source.artifacts.insert("geometry".into(), "+2+3".into());
        assert_eq!(composite_offset(&destination, &source), (2, 3));

        let mut centred = destination.clone();
        centred.gravity = crate::keywords::Gravity::Center;
        assert_eq!(composite_offset(&centred, &source), (5, 6));
    }

    #[test]
    fn layers_composite_needs_a_separator() {
        let (mut wand, ops) = wand_with(&["a", "b"]);
        wand.apply_list_operator("-layers", Some("composite"), None).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::MissingNullSeparator]);
        assert!(ops.lock().unwrap().is_empty());
    }

    #[test]
    fn layers_composite_splits_at_null() {
        let (mut wand, ops) = wand_with(&["a", "b"]);
        let mut null = named_image("null:");
        null.magick = "NULL".into();
        wand.images.push(null);
        push_named(&mut wand, &["c", "d"]);
        wand.apply_list_operator("-layers", Some("Composite"), None).unwrap();
        assert_eq!(list_calls(&ops, "layers-composite"), vec![4]);
        assert_list_shape(&wand, &["a", "b"]);
    }

    #[test]
    fn layers_composite_separator_at_either_end_is_missing() {
        let (mut wand, ops) = mock_wand();
        let mut null = named_image("null:");
        null.magick = "NULL".into();
        wand.images.push(null.clone());
        push_named(&mut wand, &["a", "b"]);
        wand.apply_list_operator("-layers", Some("composite"), None).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::MissingNullSeparator]);
        assert_list_shape(&wand, &["null:", "a", "b"]);
        assert!(list_calls(&ops, "layers-composite").is_empty());

        let (mut wand, ops) = wand_with(&["a", "b"]);
        wand.images.push(null);
        wand.apply_list_operator("-layers", Some("composite"), None).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::MissingNullSeparator]);
        assert_list_shape(&wand, &["a", "b", "null:"]);
        assert!(list_calls(&ops, "layers-composite").is_empty());
    }

    #[test]
    fn layers_flatten_merges() {
        let (mut wand, _) = wand_with(&["a", "b"]);
        wand.images.at_mut(1).unwrap().page.x = 4;
        wand.apply_list_operator("-layers", Some("flatten"), None).unwrap();
        assert_eq!(dimensions(&wand), vec![(8, 4)]);
    }

    #[test]
    fn ift_needs_a_pair() {
        let (mut wand, _) = wand_with(&["a"]);
        wand.apply_list_operator("-ift", None, None).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::MissingImageOperand]);
    }

    #[test]
    fn limit_configures_the_registry() {
        let table = Arc::new(LimitTable::new());
        let (wand, _) = mock_wand();
        let mut wand = wand.with_resources(table.clone());
        wand.apply_list_operator("-limit", Some("memory"), Some("64MiB")).unwrap();
        wand.apply_list_operator("-limit", Some("disk"), Some("unlimited")).unwrap();
        assert_eq!(table.limit(ResourceType::Memory), Limit::Amount(64.0 * 1024.0 * 1024.0));
        assert_eq!(table.limit(ResourceType::Disk), Limit::Unlimited);

        wand.apply_list_operator("-limit", Some("memory"), Some("lots")).unwrap();
        assert!(matches!(exception_kinds(&wand)[..], [ExceptionKind::InvalidArgument(_)]));
    }

    #[test]
    fn write_evicts_the_cache_and_renames() {
        let (mut wand, ops) = wand_with(&["a", "b"]);
        wand.cached_image("out.png").unwrap();
        assert!(wand.registry.contains("out.png"));
        wand.apply_list_operator("-write", Some("out.png"), None).unwrap();
        assert!(!wand.registry.contains("out.png"));
        assert_list_shape(&wand, &["out.png", "out.png"]);
        assert!(ops.lock().unwrap().contains(&RecordedOp::Write {
            destination: "out.png".into(),
            count: 2
        }));
    }

    #[test]
    fn plus_write_leaves_the_list_alone() {
        let (mut wand, _) = wand_with(&["a", "b"]);
        wand.apply_list_operator("+write", Some("copy.png"), None).unwrap();
        assert_list_shape(&wand, &["a", "b"]);
    }

    #[test]
    fn write_failure_is_reported_and_pipeline_continues() {
        let (mut wand, _) = mock_wand_with(MockBackend::new().failing("write"));
        push_named(&mut wand, &["a"]);
        wand.apply_list_operator("-write", Some("out.png"), None).unwrap();
        assert!(matches!(
            &exception_kinds(&wand)[..],
            [ExceptionKind::UnableToWriteImage { path, .. }] if path == "out.png"
        ));
        assert_list_shape(&wand, &["a"]);
    }

    #[test]
    fn print_interprets_once_for_the_list() {
        let (mut wand, _, out) = mock_wand_with_output();
        push_named(&mut wand, &["a.png", "b.png", "c.png"]);
        wand.apply_list_operator("-print", Some("%n images, first %f\\n"), None).unwrap();
        assert_eq!(out.contents(), "3 images, first a.png\n");
    }

    #[test]
    fn remap_with_a_file_maps_each_image() {
        let (mut wand, ops) = wand_with(&["a", "b"]);
        wand.apply_list_operator("-remap", Some("palette.gif"), None).unwrap();
        assert_eq!(transform_count(&ops, "remap"), 2);
        assert!(list_calls(&ops, "remap").is_empty());
    }

    #[test]
    fn map_is_plus_remap() {
        let (mut wand, ops) = wand_with(&["a", "b"]);
        wand.apply_list_operator("-map", Some("palette.gif"), None).unwrap();
        assert_eq!(list_calls(&ops, "remap"), vec![2]);
        assert_eq!(transform_count(&ops, "remap"), 0);
    }

    #[test]
    fn deprecated_layer_spellings() {
        let (mut wand, ops) = wand_with(&["a", "b"]);
        wand.apply_list_operator("-deconstruct", None, None).unwrap();
        wand.apply_list_operator("-flatten", None, None).unwrap();
        wand.apply_list_operator("-average", None, None).unwrap();
        assert_eq!(list_calls(&ops, "layers"), vec![2, 2]);
        assert_eq!(list_calls(&ops, "evaluate-sequence"), vec![1]);
    }
}
