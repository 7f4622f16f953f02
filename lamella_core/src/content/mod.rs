// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint content: recordings on the producer side, snapshots everywhere else.
//!
//! ```text
//!   ContentClient::refresh_content()
//!            │ ops + invalidation
//!            ▼
//!   RecordingSource ──create_raster_source()──► RasterSource ──► consumer trees
//!   (mutable, producer only)                    (immutable, Arc-shared)
//! ```

mod paint;
mod raster;
mod recording;

pub use paint::{ContentClient, ContentOutput, PaintMode, PaintOp, RefreshRequest, Rgba8};
pub use raster::RasterSource;
pub use recording::RecordingSource;
