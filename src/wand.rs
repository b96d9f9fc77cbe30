//! The CLI wand: the single mutable context every option is applied to.
//!
//! A [`Wand`] owns the active [`ImageList`], the three settings structures
//! and the two scope stacks. Options reach it through the four entry points
//! in [`operation`](crate::operation):
//!
//! ```text
//! apply_setting          ImageInfo / DrawInfo / QuantizeInfo
//! apply_simple_operator  each image in the active list
//! apply_list_operator    the active list as a whole
//! apply_special          ( ) { } read clone list noop
//! ```
//!
//! ## Ownership
//!
//! An image has exactly one owner: the active list, a frame on
//! `image_list_stack`, or a local about to be spliced back. Pushing with `(`
//! moves the whole list into the stack frame; `)` moves it back out. Nothing
//! is ever shared between two lists.
//!
//! ## Exceptions
//!
//! Problems are reported to an [`ExceptionSink`]. The wand either owns its
//! sink or borrows the caller's ([`Wand::with_sink`]); a borrowed sink
//! outlives the wand. [`Wand::catch_exceptions`] is the point where the
//! caller collects what accumulated.

use crate::exception::{Exception, ExceptionKind, ExceptionSink, Severity, SinkHandle};
use crate::image::Image;
use crate::image_list::ImageList;
use crate::imaging::{BackendError, ImageBackend, ReadParams, RustBackend};
use crate::registry::ImageRegistry;
use crate::resource::{self, ResourceRegistry};
use crate::settings::{DrawInfo, ImageInfo, QuantizeInfo};
use crate::stack::BoundedStack;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;

/// The only failure an entry point hands back to its caller.
///
/// Everything recoverable goes to the exception sink instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WandError {
    #[error("fatal: {kind} `{option}'")]
    Fatal { kind: ExceptionKind, option: String },
}

pub struct Wand {
    pub images: ImageList,
    pub image_info: ImageInfo,
    pub draw_info: DrawInfo,
    pub quantize_info: QuantizeInfo,
    pub(crate) image_list_stack: BoundedStack<ImageList>,
    pub(crate) image_info_stack: BoundedStack<ImageInfo>,
    pub(crate) backend: Box<dyn ImageBackend>,
    pub(crate) resources: Arc<dyn ResourceRegistry>,
    pub(crate) registry: ImageRegistry,
    sink: SinkHandle,
    output: Box<dyn Write>,
    caught: Vec<Exception>,
}

impl Default for Wand {
    fn default() -> Self {
        Self::new()
    }
}

impl Wand {
    /// A wand with the built-in backend, its own sink, the process-wide
    /// resource registry and stdout for printed output.
    pub fn new() -> Self {
        let image_info = ImageInfo::default();
        Self {
            images: ImageList::new(),
            draw_info: DrawInfo::from_image_info(&image_info),
            quantize_info: QuantizeInfo::from_image_info(&image_info),
            image_info,
            image_list_stack: BoundedStack::default(),
            image_info_stack: BoundedStack::default(),
            backend: Box::new(RustBackend::new()),
            resources: resource::global(),
            registry: ImageRegistry::new(),
            sink: SinkHandle::Owned(ExceptionSink::new()),
            output: Box::new(std::io::stdout()),
            caught: Vec::new(),
        }
    }

    pub fn with_backend(mut self, backend: Box<dyn ImageBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Report into a caller-owned sink instead of a private one.
    pub fn with_sink(mut self, sink: Rc<RefCell<ExceptionSink>>) -> Self {
        self.sink = SinkHandle::Shared(sink);
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceRegistry>) -> Self {
        self.resources = resources;
        self
    }

    /// Where `-print`, `-identify` and `-list` write.
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    pub fn report(&mut self, kind: ExceptionKind, option: &str) {
        self.sink.report(kind, option);
    }

    /// Worst severity currently in the sink.
    pub fn severity(&self) -> Option<Severity> {
        self.sink.severity()
    }

    /// Snapshot of what the sink holds right now.
    pub fn exceptions(&self) -> Vec<Exception> {
        self.sink.entries()
    }

    /// Collect accumulated exceptions.
    ///
    /// Returns `true` when something fatal was reported. Unless `all` is set,
    /// a fatal sink is left untouched so the caller can tear down with the
    /// full record still in place.
    pub fn catch_exceptions(&mut self, all: bool) -> bool {
        let fatal = self.severity().is_some_and(|s| s > Severity::Error);
        if !fatal || all {
            let drained = self.sink.drain();
            self.caught.extend(drained);
        }
        fatal
    }

    /// Hand over everything collected by [`catch_exceptions`](Self::catch_exceptions).
    pub fn take_exceptions(&mut self) -> Vec<Exception> {
        std::mem::take(&mut self.caught)
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Depth of the `(` stack.
    pub fn list_depth(&self) -> usize {
        self.image_list_stack.depth()
    }

    /// Depth of the `{` stack.
    pub fn settings_depth(&self) -> usize {
        self.image_info_stack.depth()
    }

    pub(crate) fn out(&mut self) -> &mut dyn Write {
        self.output.as_mut()
    }

    /// Read `source` with the current read settings (`-size`, `-ping`,
    /// `-background`).
    pub(crate) fn read_images(&self, source: &str) -> Result<Vec<Image>, ExceptionKind> {
        let params = ReadParams {
            source: source.to_string(),
            ping: self.image_info.ping,
            size: self.image_info.size_dimensions(),
            background: self.image_info.background,
        };
        self.backend.read(&params).map_err(|err| read_error(source, err))
    }

    /// Load an auxiliary image through the registry.
    pub(crate) fn cached_image(&mut self, path: &str) -> Result<Image, ExceptionKind> {
        let params = ReadParams {
            source: path.to_string(),
            ping: false,
            size: self.image_info.size_dimensions(),
            background: self.image_info.background,
        };
        let backend = &self.backend;
        self.registry
            .get_or_read(path, |p| backend.read(&params).map_err(|err| read_error(p, err)))?
            .ok_or_else(|| ExceptionKind::UnableToReadImage {
                path: path.to_string(),
                reason: "no images".into(),
            })
    }
}

fn read_error(path: &str, err: BackendError) -> ExceptionKind {
    match err {
        BackendError::ResourceExhausted(what) => ExceptionKind::ResourceExhausted(what),
        other => ExceptionKind::UnableToReadImage {
            path: path.to_string(),
            reason: other.to_string(),
        },
    }
}

impl Drop for Wand {
    fn drop(&mut self) {
        for list in self.image_list_stack.drain() {
            tracing::debug!(images = list.len(), "releasing pushed image list");
        }
        for _ in self.image_info_stack.drain() {
            tracing::debug!("releasing pushed settings");
        }
    }
}
