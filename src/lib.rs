//! # Wand CLI
//!
//! A command interpreter for image pipelines. A command line is a flat list
//! of options applied left to right to one mutable context, the [`Wand`]:
//!
//! ```text
//! wand rose.png -resize 50% ( +clone -negate ) -append -write out.png
//! ```
//!
//! # Architecture: One Context, Four Entry Points
//!
//! Every option is classified by [`catalog`] and handed to one or more of
//! the wand's entry points:
//!
//! ```text
//! apply_setting          settings for later operations   -fill red
//! apply_simple_operator  each image in the active list   -resize 50%
//! apply_list_operator    the active list as a whole      -append
//! apply_special          scopes, reads, introspection    ( ) { } -read -list
//! ```
//!
//! Handlers never unwind for recoverable problems. They return an
//! [`ExceptionKind`](exception::ExceptionKind), the entry point records it in
//! the wand's exception sink and the run moves on. Only resource exhaustion
//! stops a run.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`wand`] | The CLI wand: active list, settings, scope stacks, exception catching |
//! | [`operation`] | Handler registry and the four entry points |
//! | [`catalog`] | Option table (argument counts, classes) and the argv driver |
//! | [`settings`] | `ImageInfo`, `DrawInfo`, `QuantizeInfo` and the per-image sync |
//! | [`image`], [`image_list`] | Image records and the handle-addressed list |
//! | [`stack`] | Bounded stack behind `(`/`)` and `{`/`}` |
//! | [`geometry`], [`color`], [`keywords`] | Argument grammars |
//! | [`properties`] | `%`-escape interpreter for `-print`, `-annotate`, `-identify` |
//! | [`exception`] | Exception sink, kinds and severities |
//! | [`resource`] | Process-wide resource limits (`-limit`, `-cache`) |
//! | [`registry`] | `cache:<path>` image registry for auxiliary images |
//! | [`imaging`] | Backend trait, operation parameters, dimension math, pure-Rust backend |
//! | [`config`] | `wand.toml` loading, validation and merging |
//! | [`output`] | Exception reports, identify lines and `-list` topics |
//!
//! # Design Decisions
//!
//! ## Handles Instead of Links
//!
//! The active list is an arena addressed by [`ImageHandle`](image_list::ImageHandle).
//! A simple operator snapshots the handles before it starts, so images it
//! splices in are never visited twice and images it removes are skipped.
//!
//! ## Owned Scope Frames
//!
//! `(` moves the whole active list into a stack frame and `)` moves it back
//! out, concatenated with whatever was built inside. `{` stores a full copy
//! of `ImageInfo`. Nothing is shared between frames, so a popped frame is
//! exactly what was pushed.
//!
//! ## Pure-Rust Imaging
//!
//! The built-in [`RustBackend`](imaging::RustBackend) uses the `image` crate
//! for decoding, encoding and resampling. Operations it does not implement
//! report `Unsupported` and leave the image untouched; the option engine does
//! not care which backend is plugged in.

pub mod catalog;
pub mod color;
pub mod config;
pub mod exception;
pub mod geometry;
pub mod image;
pub mod image_list;
pub mod imaging;
pub mod keywords;
pub mod operation;
pub mod output;
pub mod properties;
pub mod registry;
pub mod resource;
pub mod settings;
pub mod stack;
pub mod wand;

pub use wand::{Wand, WandError};

#[cfg(test)]
pub(crate) mod test_helpers;
