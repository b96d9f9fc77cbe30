//! Special operators: the two scope stacks, reads, clones and `-list`.
//!
//! ```text
//! (   active list -> image_list_stack, fresh empty list
//! )   inner list appended to the popped outer list
//! {   image_info -> image_info_stack, active info is a copy
//! }   popped info restored, draw/quantize info rebuilt from it
//! ```
//!
//! With `respect-parenthesis` set, `(` and `)` also do the `{`/`}` step.
//! The coupled transitions check both stacks before touching either, so a
//! refused push or pop leaves the wand as it was.

use super::{Invocation, WandFn};
use crate::exception::ExceptionKind;
use crate::geometry::{is_scene_list, parse_scenes};
use crate::output;
use crate::settings::{DrawInfo, ImageInfo, QuantizeInfo};
use crate::wand::Wand;
use tracing::debug;

type Outcome = Result<(), ExceptionKind>;

pub(super) const HANDLERS: &[(&str, WandFn)] = &[
    ("(", open_paren),
    (")", close_paren),
    ("{", open_brace),
    ("}", close_brace),
    ("--", read),
    ("clone", clone),
    ("list", list),
    ("noop", noop),
    ("read", read),
    ("sans", noop),
    ("sans0", noop),
    ("sans2", noop),
];

fn respects_parenthesis(info: &ImageInfo) -> bool {
    info.option("respect-parenthesis")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Scope stacks
// ============================================================================

fn open_paren(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    let coupled = respects_parenthesis(&wand.image_info);
    if wand.image_list_stack.is_full() || (coupled && wand.image_info_stack.is_full()) {
        return Err(ExceptionKind::ParenthesisNestedTooDeeply);
    }
    let outer = std::mem::take(&mut wand.images);
    if let Err(rejected) = wand.image_list_stack.push(outer) {
        wand.images = rejected.value;
        return Err(ExceptionKind::ParenthesisNestedTooDeeply);
    }
    debug!(depth = wand.image_list_stack.depth(), "push image list");
    if coupled {
        push_settings(wand)?;
    }
    Ok(())
}

fn close_paren(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    let outer = wand
        .image_list_stack
        .pop()
        .map_err(|_| ExceptionKind::UnbalancedParenthesis)?;
    let inner = std::mem::replace(&mut wand.images, outer);
    debug!(
        depth = wand.image_list_stack.depth(),
        inner = inner.len(),
        outer = wand.images.len(),
        "pop image list"
    );
    wand.images.append(inner);

    // the frame `(` pushed is the one that recorded the flag
    if wand
        .image_info_stack
        .top()
        .is_some_and(respects_parenthesis)
    {
        pop_settings(wand)?;
    }
    Ok(())
}

fn open_brace(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    push_settings(wand)
}

fn close_brace(wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    pop_settings(wand)
}

fn push_settings(wand: &mut Wand) -> Outcome {
    let saved = wand.image_info.clone();
    wand.image_info_stack
        .push(saved)
        .map_err(|_| ExceptionKind::ParenthesisNestedTooDeeply)?;
    debug!(depth = wand.image_info_stack.depth(), "push settings");
    Ok(())
}

fn pop_settings(wand: &mut Wand) -> Outcome {
    let restored = wand
        .image_info_stack
        .pop()
        .map_err(|_| ExceptionKind::UnbalancedParenthesis)?;
    wand.image_info = restored;
    wand.draw_info = DrawInfo::from_image_info(&wand.image_info);
    wand.quantize_info = QuantizeInfo::from_image_info(&wand.image_info);
    debug!(depth = wand.image_info_stack.depth(), "pop settings");
    Ok(())
}

// ============================================================================
// Images
// ============================================================================

/// `-read file` and bare file names append whatever the file holds.
fn read(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let source = inv.arg1()?;
    let images = wand.read_images(source)?;
    debug!(source, count = images.len(), ping = wand.image_info.ping, "read");
    wand.images.extend(images);
    Ok(())
}

/// `-clone scenes` copies images out of the enclosing scope; `+clone`
/// copies its last image.
fn clone(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let scenes = if inv.normal { inv.arg1()? } else { "-1" };
    if !is_scene_list(scenes) {
        return Err(ExceptionKind::InvalidArgument(scenes.to_string()));
    }
    let outer = wand
        .image_list_stack
        .top()
        .filter(|outer| !outer.is_empty())
        .ok_or(ExceptionKind::UnableToCloneImage)?;
    let indexes = parse_scenes(scenes, outer.len())
        .map_err(|_| ExceptionKind::NoSuchImage(scenes.to_string()))?;
    let copies = outer
        .clone_at(&indexes)
        .ok_or_else(|| ExceptionKind::NoSuchImage(scenes.to_string()))?;
    debug!(scenes, count = copies.len(), "clone from enclosing list");
    wand.images.extend(copies);
    Ok(())
}

// ============================================================================
// Introspection and no-ops
// ============================================================================

fn list(wand: &mut Wand, inv: &Invocation<'_>) -> Outcome {
    let topic = inv.arg1()?;
    let text = output::list_topic(wand, topic)?;
    wand.out()
        .write_all(text.as_bytes())
        .map_err(|e| ExceptionKind::Collaborator(e.to_string()))
}

fn noop(_wand: &mut Wand, _inv: &Invocation<'_>) -> Outcome {
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::exception::ExceptionKind;
    use crate::imaging::backend::tests::MockBackend;
    use crate::stack::MAX_STACK_DEPTH;
    use crate::test_helpers::*;

    #[test]
    fn parens_concatenate_outer_then_inner() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a", "b"]);
        wand.apply_special("(", None).unwrap();
        assert!(wand.images.is_empty());
        assert_eq!(wand.list_depth(), 1);
        push_named(&mut wand, &["c"]);
        wand.apply_special(")", None).unwrap();
        assert_eq!(wand.list_depth(), 0);
        assert_list_shape(&wand, &["a", "b", "c"]);
    }

    #[test]
    fn nested_parens_unwind_to_zero() {
        let (mut wand, _) = mock_wand();
        for i in 0..5 {
            push_named(&mut wand, &[format!("outer{i}")]);
            wand.apply_special("(", None).unwrap();
        }
        push_named(&mut wand, &["inner"]);
        for _ in 0..5 {
            wand.apply_special(")", None).unwrap();
        }
        assert_eq!(wand.list_depth(), 0);
        assert_list_shape(&wand, &["outer0", "outer1", "outer2", "outer3", "outer4", "inner"]);
        assert!(wand.exceptions().is_empty());
    }

    #[test]
    fn overflow_is_reported_and_state_kept() {
        let (mut wand, _) = mock_wand();
        for _ in 0..MAX_STACK_DEPTH {
            wand.apply_special("(", None).unwrap();
        }
        push_named(&mut wand, &["deep"]);
        wand.apply_special("(", None).unwrap();
        assert_eq!(wand.list_depth(), MAX_STACK_DEPTH);
        assert_list_shape(&wand, &["deep"]);
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::ParenthesisNestedTooDeeply]);
    }

    #[test]
    fn brace_overflow_is_reported() {
        let (mut wand, _) = mock_wand();
        for _ in 0..=MAX_STACK_DEPTH {
            wand.apply_special("{", None).unwrap();
        }
        assert_eq!(wand.settings_depth(), MAX_STACK_DEPTH);
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::ParenthesisNestedTooDeeply]);
    }

    #[test]
    fn unbalanced_close_leaves_wand_alone() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a"]);
        wand.apply_special(")", None).unwrap();
        wand.apply_special("}", None).unwrap();
        assert_list_shape(&wand, &["a"]);
        assert_eq!(
            exception_kinds(&wand),
            vec![ExceptionKind::UnbalancedParenthesis, ExceptionKind::UnbalancedParenthesis]
        );
    }

    #[test]
    fn braces_isolate_settings() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-fill", Some("red")).unwrap();
        let before = wand.image_info.clone();
        wand.apply_special("{", None).unwrap();
        wand.apply_setting("-fill", Some("blue")).unwrap();
        wand.apply_setting("-gravity", Some("center")).unwrap();
        assert_ne!(wand.image_info, before);
        wand.apply_special("}", None).unwrap();
        assert_eq!(wand.image_info, before);
        assert_eq!(wand.draw_info.fill, crate::color::parse_color("red").unwrap());
        assert_eq!(wand.settings_depth(), 0);
    }

    #[test]
    fn plain_parens_do_not_scope_settings() {
        let (mut wand, _) = mock_wand();
        wand.apply_special("(", None).unwrap();
        wand.apply_setting("-gravity", Some("east")).unwrap();
        wand.apply_special(")", None).unwrap();
        assert_eq!(wand.image_info.option("gravity"), Some("east"));
    }

    #[test]
    fn respect_parenthesis_couples_the_stacks() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-respect-parenthesis", None).unwrap();
        wand.apply_special("(", None).unwrap();
        assert_eq!(wand.settings_depth(), 1);
        wand.apply_setting("-gravity", Some("east")).unwrap();
        wand.apply_special(")", None).unwrap();
        assert_eq!(wand.settings_depth(), 0);
        assert_eq!(wand.image_info.option("gravity"), None);
    }

    #[test]
    fn background_survives_a_scope_around_a_read() {
        let (mut wand, _) = mock_wand();
        wand.apply_setting("-background", Some("#fff")).unwrap();
        let background = wand.image_info.background;
        wand.apply_special("read", Some("one.png")).unwrap();
        wand.apply_special("(", None).unwrap();
        wand.apply_special("read", Some("two.png")).unwrap();
        wand.apply_special(")", None).unwrap();
        wand.apply_special("--", Some("three.png")).unwrap();
        assert_eq!(wand.images.len(), 3);
        assert_list_shape(&wand, &["one.png", "two.png", "three.png"]);
        assert_eq!(wand.image_info.background, background);
    }

    #[test]
    fn read_appends_every_frame() {
        let (mut wand, _) = mock_wand_with(MockBackend::new().with_frames("anim.gif", 3));
        wand.apply_special("-read", Some("anim.gif")).unwrap();
        assert_eq!(wand.images.len(), 3);
    }

    #[test]
    fn read_failure_is_reported() {
        let (mut wand, _) = mock_wand_with(MockBackend::new().with_missing("gone.png"));
        wand.apply_special("-read", Some("gone.png")).unwrap();
        assert!(wand.images.is_empty());
        assert!(matches!(
            exception_kinds(&wand).as_slice(),
            [ExceptionKind::UnableToReadImage { path, .. }] if path == "gone.png"
        ));
    }

    #[test]
    fn clone_copies_from_the_enclosing_list() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a", "b", "c"]);
        wand.apply_special("(", None).unwrap();
        wand.apply_special("-clone", Some("0,2")).unwrap();
        wand.apply_special("+clone", None).unwrap();
        assert_list_shape(&wand, &["a", "c", "c"]);
        wand.apply_special(")", None).unwrap();
        assert_list_shape(&wand, &["a", "b", "c", "a", "c", "c"]);
    }

    #[test]
    fn clone_without_a_scope_is_an_error() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a"]);
        wand.apply_special("+clone", None).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::UnableToCloneImage]);
        assert_list_shape(&wand, &["a"]);
    }

    #[test]
    fn clone_bad_index_is_no_such_image() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a"]);
        wand.apply_special("(", None).unwrap();
        wand.apply_special("-clone", Some("4")).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::NoSuchImage("4".into())]);
        assert!(wand.images.is_empty());
    }

    #[test]
    fn clone_from_an_empty_enclosing_list_is_an_error() {
        let (mut wand, _) = mock_wand();
        wand.apply_special("(", None).unwrap();
        wand.apply_special("-clone", Some("0")).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::UnableToCloneImage]);
        assert!(wand.images.is_empty());
    }

    #[test]
    fn clone_with_a_malformed_scene_list_is_invalid() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a"]);
        wand.apply_special("(", None).unwrap();
        wand.apply_special("-clone", Some("abc")).unwrap();
        assert_eq!(exception_kinds(&wand), vec![ExceptionKind::InvalidArgument("abc".into())]);
        assert!(wand.images.is_empty());
    }

    #[test]
    fn list_writes_the_topic() {
        let (mut wand, _, out) = mock_wand_with_output();
        wand.apply_special("-list", Some("gravity")).unwrap();
        assert!(out.contents().lines().any(|l| l == "Center"));
        wand.apply_special("-list", Some("font")).unwrap();
        assert!(out.contents().contains("Mock-Sans"));
    }

    #[test]
    fn list_unknown_topic_is_reported() {
        let (mut wand, _, out) = mock_wand_with_output();
        wand.apply_special("-list", Some("bogus")).unwrap();
        assert!(out.contents().is_empty());
        assert!(matches!(
            exception_kinds(&wand).as_slice(),
            [ExceptionKind::UnrecognizedKeyword { kind: "list", .. }]
        ));
    }

    #[test]
    fn noops_do_nothing() {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, &["a"]);
        for option in ["-noop", "-sans", "-sans0", "-sans2"] {
            wand.apply_special(option, Some("x")).unwrap();
        }
        assert_list_shape(&wand, &["a"]);
        assert!(ops.lock().unwrap().is_empty());
        assert!(wand.exceptions().is_empty());
    }
}
