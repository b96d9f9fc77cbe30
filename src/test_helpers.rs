//! Shared test utilities for the wand test suite.
//!
//! Provides wand builders around the recording [`MockBackend`], synthetic
//! images, an in-memory output sink and list-shape assertions.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let (mut wand, ops) = mock_wand();
//! push_named(&mut wand, &["a.png", "b.png"]);
//! wand.apply_simple_operator("-flip", None, None).unwrap();
//!
//! assert_eq!(transform_count(&ops, "flip"), 2);
//! assert_eq!(filenames(&wand), vec!["a.png", "b.png"]);
//! ```

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::color::Color;
use crate::exception::ExceptionKind;
use crate::image::Image;
use crate::imaging::backend::tests::{MockBackend, RecordedOp};
use crate::resource::LimitTable;
use crate::wand::Wand;

pub type OpLog = Arc<Mutex<Vec<RecordedOp>>>;

// =========================================================================
// Wand builders
// =========================================================================

/// A wand over a fresh [`MockBackend`] and a private resource table, plus a
/// handle on the backend's operation log.
pub fn mock_wand() -> (Wand, OpLog) {
    mock_wand_with(MockBackend::new())
}

pub fn mock_wand_with(backend: MockBackend) -> (Wand, OpLog) {
    let ops = backend.recorder();
    let wand = Wand::new()
        .with_backend(Box::new(backend))
        .with_resources(Arc::new(LimitTable::new()));
    (wand, ops)
}

/// A mock wand whose printed output is captured.
pub fn mock_wand_with_output() -> (Wand, OpLog, SharedBuffer) {
    let (wand, ops) = mock_wand();
    let buffer = SharedBuffer::default();
    (wand.with_output(Box::new(buffer.clone())), ops, buffer)
}

// =========================================================================
// Synthetic images
// =========================================================================

/// A 4x4 white image with the given file name.
pub fn named_image(name: &str) -> Image {
    let mut image = Image::canvas(4, 4, Color::WHITE);
    image.filename = name.to_string();
    image.magick = "PNG".into();
    image
}

/// Append one [`named_image`] per name to the active list.
pub fn push_named<S: AsRef<str>>(wand: &mut Wand, names: &[S]) {
    for name in names {
        wand.images.push(named_image(name.as_ref()));
    }
}

// =========================================================================
// Lookups
// =========================================================================

/// File names of the active list, in order.
pub fn filenames(wand: &Wand) -> Vec<String> {
    wand.images.iter().map(|i| i.filename.clone()).collect()
}

/// Dimensions of the active list, in order.
pub fn dimensions(wand: &Wand) -> Vec<(u32, u32)> {
    wand.images.iter().map(Image::dimensions).collect()
}

pub fn exception_kinds(wand: &Wand) -> Vec<ExceptionKind> {
    wand.exceptions().into_iter().map(|e| e.kind).collect()
}

/// How many per-image transforms named `name` reached the backend.
pub fn transform_count(ops: &OpLog, name: &str) -> usize {
    ops.lock()
        .unwrap()
        .iter()
        .filter(|op| matches!(op, RecordedOp::Transform { name: n, .. } if *n == name))
        .count()
}

/// Image counts of every list transform named `name`, in call order.
pub fn list_calls(ops: &OpLog, name: &str) -> Vec<usize> {
    ops.lock()
        .unwrap()
        .iter()
        .filter_map(|op| match op {
            RecordedOp::List { name: n, count } if *n == name => Some(*count),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Assertions
// =========================================================================

/// Assert the active list's file names, with a readable diff on failure.
pub fn assert_list_shape(wand: &Wand, expected: &[&str]) {
    let actual = filenames(wand);
    assert_eq!(
        actual, expected,
        "list shape mismatch\n  expected: {expected:?}\n  actual:   {actual:?}"
    );
}

// =========================================================================
// Output capture
// =========================================================================

/// A cloneable `Write` that keeps everything written to it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
