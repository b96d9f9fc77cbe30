//! Option dispatch: the four entry points of the wand.
//!
//! Every option name maps to a handler through one registry keyed by
//! `(OperatorClass, name)`. The classes differ only in what the handler is
//! given:
//!
//! | Class | Entry point | Handler sees |
//! |---|---|---|
//! | [`Setting`](OperatorClass::Setting) | [`Wand::apply_setting`] | the wand |
//! | [`Simple`](OperatorClass::Simple) | [`Wand::apply_simple_operator`] | the wand and one image, once per image |
//! | [`List`](OperatorClass::List) | [`Wand::apply_list_operator`] | the wand, once for the whole list |
//! | [`Special`](OperatorClass::Special) | [`Wand::apply_special`] | the wand |
//!
//! Names are matched exactly and case-sensitively, without the sigil. A name
//! with no handler in the requested class is a no-op: classification happens
//! upstream in [`catalog`](crate::catalog).
//!
//! ## Failure
//!
//! Handlers return `Result<_, ExceptionKind>`. The entry point reports an
//! `Err` to the wand's exception sink, tagged with the option as written, and
//! carries on. Only a fatal kind (resource exhaustion) turns into a
//! [`WandError`] for the caller.
//!
//! ## Simple operators and list surgery
//!
//! The per-image loop snapshots the list's handles first, then for each one
//! moves the image out, syncs settings onto it, runs the handler and either
//! puts it back or splices the handler's replacements in at the same
//! position. Images spliced in are never revisited in the same pass.

mod list;
mod setting;
mod simple;
mod special;

use crate::color::{Color, parse_color};
use crate::exception::{ExceptionKind, Severity};
use crate::geometry::{GeometryInfo, RegionGeometry, parse_geometry, parse_region};
use crate::image::Image;
use crate::image_list::ImageList;
use crate::imaging::{ListTransform, Outcome, Transform};
use crate::settings::sync_image_settings;
use crate::wand::{Wand, WandError};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

pub use simple::parse_sparse_color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorClass {
    Setting,
    Simple,
    List,
    Special,
}

/// Handler over the wand as a whole (settings, list and special options).
pub(crate) type WandFn = fn(&mut Wand, &Invocation<'_>) -> Result<(), ExceptionKind>;

/// Handler over one image. `Ok(Some(images))` replaces the image with
/// `images` at its position; `Ok(None)` keeps it (possibly modified).
pub(crate) type ImageFn =
    fn(&mut Wand, &mut Image, &Invocation<'_>) -> Result<Option<Vec<Image>>, ExceptionKind>;

#[derive(Clone, Copy)]
enum Handler {
    Wand(WandFn),
    Image(ImageFn),
}

static REGISTRY: LazyLock<HashMap<(OperatorClass, &'static str), Handler>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for &(name, f) in setting::HANDLERS {
        map.insert((OperatorClass::Setting, name), Handler::Wand(f));
    }
    for &(name, f) in simple::HANDLERS {
        map.insert((OperatorClass::Simple, name), Handler::Image(f));
    }
    for &(name, f) in list::HANDLERS {
        map.insert((OperatorClass::List, name), Handler::Wand(f));
    }
    for &(name, f) in special::HANDLERS {
        map.insert((OperatorClass::Special, name), Handler::Wand(f));
    }
    map
});

/// Whether `name` (no sigil) has a handler in `class`.
pub fn registered(class: OperatorClass, name: &str) -> bool {
    REGISTRY.contains_key(&(class, name))
}

/// Every name with a handler in `class`.
#[cfg(test)]
pub(crate) fn registered_names(class: OperatorClass) -> Vec<&'static str> {
    REGISTRY
        .keys()
        .filter(|(c, _)| *c == class)
        .map(|&(_, name)| name)
        .collect()
}

fn lookup(class: OperatorClass, name: &str) -> Option<Handler> {
    REGISTRY.get(&(class, name)).copied()
}

// ============================================================================
// Invocation
// ============================================================================

/// One option as handed to a handler.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// The option as written, sigil included. Used in exception reports.
    pub option: &'a str,
    /// Registry name: the option without its sigil.
    pub name: &'a str,
    /// `true` for `-name` (and the bracket tokens), `false` for `+name`.
    pub normal: bool,
    pub arg1: Option<&'a str>,
    pub arg2: Option<&'a str>,
}

impl<'a> Invocation<'a> {
    pub fn new(option: &'a str, arg1: Option<&'a str>, arg2: Option<&'a str>) -> Self {
        let (name, normal) = if option == "--" {
            ("--", true)
        } else if let Some(rest) = option.strip_prefix('-') {
            (rest, true)
        } else if let Some(rest) = option.strip_prefix('+') {
            (rest, false)
        } else {
            (option, true)
        };
        Self {
            option,
            name,
            normal,
            arg1,
            arg2,
        }
    }

    pub fn arg1(&self) -> Result<&'a str, ExceptionKind> {
        self.arg1.ok_or(ExceptionKind::MissingArgument)
    }

    pub fn arg2(&self) -> Result<&'a str, ExceptionKind> {
        self.arg2.ok_or(ExceptionKind::MissingArgument)
    }

    /// `arg1` as a `rho x sigma +xi +psi` geometry.
    pub fn geometry(&self) -> Result<GeometryInfo, ExceptionKind> {
        Ok(parse_geometry(self.arg1()?)?)
    }

    /// `arg1` as a `WxH+X+Y` region.
    pub fn region(&self) -> Result<RegionGeometry, ExceptionKind> {
        Ok(parse_region(self.arg1()?)?)
    }

    pub fn keyword<T>(&self) -> Result<T, ExceptionKind>
    where
        T: FromStr<Err = crate::keywords::KeywordError>,
    {
        Ok(self.arg1()?.parse::<T>()?)
    }

    pub fn color(&self) -> Result<Color, ExceptionKind> {
        Ok(parse_color(self.arg1()?)?)
    }

    pub fn number(&self) -> Result<f64, ExceptionKind> {
        let text = self.arg1()?;
        text.trim()
            .parse()
            .map_err(|_| ExceptionKind::InvalidArgument(text.to_string()))
    }
}

// ============================================================================
// Entry points
// ============================================================================

impl Wand {
    /// Apply a setting. Never touches images and works before any exist.
    pub fn apply_setting(&mut self, option: &str, arg: Option<&str>) -> Result<(), WandError> {
        let inv = Invocation::new(option, arg, None);
        let Some(Handler::Wand(handler)) = lookup(OperatorClass::Setting, inv.name) else {
            debug!(option, "no setting handler");
            return Ok(());
        };
        self.trace_option(OperatorClass::Setting, &inv);
        let result = handler(self, &inv);
        self.settle(&inv, result)
    }

    /// Apply a per-image operator to every image in the active list.
    pub fn apply_simple_operator(
        &mut self,
        option: &str,
        arg1: Option<&str>,
        arg2: Option<&str>,
    ) -> Result<(), WandError> {
        let inv = Invocation::new(option, arg1, arg2);
        let Some(Handler::Image(handler)) = lookup(OperatorClass::Simple, inv.name) else {
            debug!(option, "no simple operator handler");
            return Ok(());
        };
        self.trace_option(OperatorClass::Simple, &inv);
        if self.images.is_empty() {
            return self.settle(&inv, Err(ExceptionKind::NoImagesDefined));
        }

        let handles = self.images.handles();
        let total = handles.len();
        for (i, handle) in handles.into_iter().enumerate() {
            let Some(mut image) = self.images.take(handle) else {
                continue;
            };
            sync_image_settings(&self.image_info, &mut image);
            match handler(self, &mut image, &inv) {
                Ok(None) => self.images.restore(handle, image),
                Ok(Some(replacements)) => {
                    drop(image);
                    self.images.splice(handle, replacements);
                }
                Err(kind) => {
                    self.images.restore(handle, image);
                    self.settle(&inv, Err(kind))?;
                }
            }
            if self.image_info.monitor {
                info!("Monitor/{}: {} of {}", inv.name, i + 1, total);
            }
        }
        Ok(())
    }

    /// Apply an operator to the active list as a whole.
    pub fn apply_list_operator(
        &mut self,
        option: &str,
        arg1: Option<&str>,
        arg2: Option<&str>,
    ) -> Result<(), WandError> {
        let inv = Invocation::new(option, arg1, arg2);
        let Some(Handler::Wand(handler)) = lookup(OperatorClass::List, inv.name) else {
            debug!(option, "no list operator handler");
            return Ok(());
        };
        self.trace_option(OperatorClass::List, &inv);
        // `-limit` configures the resource registry and needs no images.
        if self.images.is_empty() && inv.name != "limit" {
            return self.settle(&inv, Err(ExceptionKind::NoImagesDefined));
        }
        for image in self.images.iter_mut() {
            sync_image_settings(&self.image_info, image);
        }
        let result = handler(self, &inv);
        self.settle(&inv, result)
    }

    /// Apply a stack, read, clone, list or no-op option.
    pub fn apply_special(&mut self, option: &str, arg: Option<&str>) -> Result<(), WandError> {
        let inv = Invocation::new(option, arg, None);
        let Some(Handler::Wand(handler)) = lookup(OperatorClass::Special, inv.name) else {
            debug!(option, "no special handler");
            return Ok(());
        };
        self.trace_option(OperatorClass::Special, &inv);
        let result = handler(self, &inv);
        self.settle(&inv, result)
    }

    fn trace_option(&self, class: OperatorClass, inv: &Invocation<'_>) {
        if self.image_info.debug {
            info!(?class, option = inv.option, arg1 = ?inv.arg1, arg2 = ?inv.arg2, "apply");
        } else {
            debug!(?class, option = inv.option, arg1 = ?inv.arg1, arg2 = ?inv.arg2, "apply");
        }
    }

    /// Report a handler failure; only a fatal one reaches the caller.
    fn settle(&mut self, inv: &Invocation<'_>, result: Result<(), ExceptionKind>) -> Result<(), WandError> {
        let Err(kind) = result else {
            return Ok(());
        };
        if let ExceptionKind::Collaborator(reason) = &kind {
            warn!(option = inv.option, %reason, "operation failed");
        }
        let fatal = kind.severity() == Severity::Fatal;
        self.report(kind.clone(), inv.option);
        if fatal {
            return Err(WandError::Fatal {
                kind,
                option: inv.option.to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Collaborator helpers
// ============================================================================

/// Run a per-image transform and translate its outcome for the simple loop.
pub(crate) fn transform(
    wand: &Wand,
    image: &mut Image,
    op: &Transform,
) -> Result<Option<Vec<Image>>, ExceptionKind> {
    match wand.backend.transform(image, op)? {
        Outcome::Unchanged => Ok(None),
        Outcome::Mutated(new) => {
            *image = new;
            Ok(None)
        }
        Outcome::Replaced(new) => Ok(Some(vec![new])),
        Outcome::Split(images) => Ok(Some(images)),
    }
}

/// Run a list transform over the whole active list and install the result.
///
/// The old list is kept when the collaborator fails.
pub(crate) fn replace_list(wand: &mut Wand, op: &ListTransform) -> Result<(), ExceptionKind> {
    let images = std::mem::take(&mut wand.images).into_images();
    match wand.backend.apply_list(&images, op) {
        Ok(result) => {
            wand.images.replace_all(result);
            Ok(())
        }
        Err(err) => {
            wand.images = ImageList::from_images(images);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::test_helpers::*;

    #[test]
    fn invocation_sigils() {
        let inv = Invocation::new("-blur", Some("0x2"), None);
        assert_eq!((inv.name, inv.normal), ("blur", true));
        let inv = Invocation::new("+repage", None, None);
        assert_eq!((inv.name, inv.normal), ("repage", false));
        let inv = Invocation::new("(", None, None);
        assert_eq!((inv.name, inv.normal), ("(", true));
        let inv = Invocation::new("--", Some("file.png"), None);
        assert_eq!(inv.name, "--");
    }

    #[test]
    fn invocation_argument_errors() {
        let inv = Invocation::new("-blur", None, None);
        assert_eq!(inv.arg1(), Err(ExceptionKind::MissingArgument));
        let inv = Invocation::new("-blur", Some("x"), None);
        assert!(matches!(inv.number(), Err(ExceptionKind::InvalidArgument(_))));
        let inv = Invocation::new("-fill", Some("notacolor"), None);
        assert!(matches!(inv.color(), Err(ExceptionKind::UnrecognizedColor(_))));
    }

    #[test]
    fn every_class_has_handlers() {
        assert!(registered(OperatorClass::Setting, "adjoin"));
        assert!(registered(OperatorClass::Simple, "negate"));
        assert!(registered(OperatorClass::List, "append"));
        assert!(registered(OperatorClass::Special, "("));
        assert!(!registered(OperatorClass::Simple, "append"));
    }

    #[test]
    fn unknown_names_are_silent() {
        let (mut wand, ops) = mock_wand();
        wand.apply_setting("-no-such-setting", Some("1")).unwrap();
        wand.apply_simple_operator("-no-such-op", None, None).unwrap();
        wand.apply_list_operator("-no-such-op", None, None).unwrap();
        wand.apply_special("-no-such-op", None).unwrap();
        assert!(wand.exceptions().is_empty());
        assert!(ops.lock().unwrap().is_empty());
    }

    #[test]
    fn simple_operator_visits_each_image_once() {
        for n in 1..=4 {
            let (mut wand, ops) = mock_wand();
            push_named(&mut wand, &(0..n).map(|i| format!("img{i}.png")).collect::<Vec<_>>());
            wand.apply_simple_operator("-flip", None, None).unwrap();
            let visited: Vec<String> = ops
                .lock()
                .unwrap()
                .iter()
                .filter_map(|op| match op {
                    RecordedOp::Transform { name: "flip", filename } => Some(filename.clone()),
                    _ => None,
                })
                .collect();
            assert_eq!(visited.len(), n);
            assert_eq!(visited, filenames(&wand));
        }
    }

    #[test]
    fn splits_are_spliced_in_place_and_not_revisited() {
        let (mut wand, ops) = mock_wand();
        push_named(&mut wand, &["a.png", "b.png", "c.png"]);
        wand.apply_simple_operator("-crop", Some("2x2"), None).unwrap();
        // 4x4 mock images split into four tiles each
        assert_eq!(wand.images.len(), 12);
        assert_eq!(
            filenames(&wand),
            ["a.png", "b.png", "c.png"]
                .iter()
                .flat_map(|n| std::iter::repeat_n(n.to_string(), 4))
                .collect::<Vec<_>>()
        );
        assert_eq!(transform_count(&ops, "crop"), 3);
    }

    #[test]
    fn operators_without_images_report() {
        let (mut wand, _) = mock_wand();
        wand.apply_simple_operator("-negate", None, None).unwrap();
        wand.apply_list_operator("-append", None, None).unwrap();
        let kinds: Vec<_> = wand.exceptions().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ExceptionKind::NoImagesDefined; 2]);
    }

    #[test]
    fn limit_needs_no_images() {
        let (mut wand, _) = mock_wand();
        wand.apply_list_operator("-limit", Some("memory"), Some("64MiB")).unwrap();
        assert!(wand.exceptions().is_empty());
    }

    #[test]
    fn collaborator_failure_keeps_image_and_continues() {
        let mut wand = Wand::new().with_backend(Box::new(MockBackend::new().failing("blur")));
        push_named(&mut wand, &["a.png", "b.png"]);
        wand.apply_simple_operator("-blur", Some("0x1"), None).unwrap();
        assert_eq!(filenames(&wand), vec!["a.png", "b.png"]);
        let exceptions = wand.exceptions();
        assert_eq!(exceptions.len(), 2);
        assert!(matches!(exceptions[0].kind, ExceptionKind::Collaborator(_)));
        assert_eq!(exceptions[0].option, "-blur");
    }

    #[test]
    fn resource_exhaustion_is_fatal() {
        let backend = MockBackend::new().exhausting("swirl");
        let ops = backend.recorder();
        let mut wand = Wand::new().with_backend(Box::new(backend));
        push_named(&mut wand, &["a.png", "b.png"]);
        let err = wand.apply_simple_operator("-swirl", Some("90"), None).unwrap_err();
        assert!(matches!(err, WandError::Fatal { ref option, .. } if option == "-swirl"));
        // the pass stops at the first image; the list is intact
        assert_eq!(transform_count(&ops, "swirl"), 1);
        assert_eq!(wand.images.len(), 2);
        assert!(wand.catch_exceptions(false));
    }

    #[test]
    fn settings_are_synced_before_simple_operators() {
        let (mut wand, _) = mock_wand();
        push_named(&mut wand, &["a.png"]);
        wand.apply_setting("-background", Some("red")).unwrap();
        wand.apply_simple_operator("-flip", None, None).unwrap();
        assert_eq!(wand.images.at(0).unwrap().background, Color::rgb(255, 0, 0));
    }

    #[test]
    fn list_failure_keeps_old_list() {
        let mut wand = Wand::new().with_backend(Box::new(MockBackend::new().failing("append")));
        push_named(&mut wand, &["a.png", "b.png"]);
        wand.apply_list_operator("-append", None, None).unwrap();
        assert_eq!(filenames(&wand), vec!["a.png", "b.png"]);
        assert_eq!(wand.exceptions().len(), 1);
    }
}
