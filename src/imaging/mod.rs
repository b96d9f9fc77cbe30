//! Image processing: everything below the option engine.
//!
//! | Concern | Where |
//! |---|---|
//! | **Read / write** | [`ImageBackend::read`], [`ImageBackend::write`] |
//! | **Per-image operators** | [`Transform`] via [`ImageBackend::transform`] |
//! | **List operators** | [`ListTransform`] via [`ImageBackend::apply_list`] |
//! | **Geometry math** | [`resize_dimensions`], [`crop_regions`], [`gravity_offset`] |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
pub mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, FormatInfo, ImageBackend, Outcome};
pub use calculations::{Rect, crop_regions, gravity_offset, layer_bounds, resize_dimensions};
pub use params::{
    BlurKind, ListTransform, ReadParams, ResizeMethod, SparsePoint, Transform, WriteParams,
};
pub use rust_backend::RustBackend;
