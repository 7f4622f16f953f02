// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mutable paint logs owned by the producer side.

use alloc::sync::Arc;
use alloc::vec::Vec;

use kurbo::{Rect, Size};

use super::paint::{ContentClient, PaintMode, PaintOp, RefreshRequest};
use super::raster::RasterSource;
use crate::id::NodeId;
use crate::producer::ProducerTree;
use crate::region::Region;

/// The recorded paint content of one content-bearing node.
///
/// A recording is an append/replace log: re-recording a sub-rectangle drops
/// the ops that lie entirely inside it and appends whatever the client
/// produces, so untouched content survives partial updates. Every change is
/// also accumulated into an invalidation region which the commit drains when
/// it snapshots the recording into a [`RasterSource`].
#[derive(Clone, Debug)]
pub struct RecordingSource {
    content_id: NodeId,
    size: Size,
    ops: Vec<PaintOp>,
    invalidation: Region,
    recorded_frame: u64,
    memory_usage: usize,
    has_recording: bool,
}

impl RecordingSource {
    /// Creates an empty recording for `content_id`.
    #[must_use]
    pub fn new(content_id: NodeId) -> Self {
        Self {
            content_id,
            size: Size::ZERO,
            ops: Vec::new(),
            invalidation: Region::new(),
            recorded_frame: 0,
            memory_usage: 0,
            has_recording: false,
        }
    }

    /// The node that owns this recording.
    #[must_use]
    pub fn content_id(&self) -> NodeId {
        self.content_id
    }

    /// Current recorded size.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Current paint log.
    #[must_use]
    pub fn ops(&self) -> &[PaintOp] {
        &self.ops
    }

    /// Area changed since the last [`take_invalidation`](Self::take_invalidation).
    #[must_use]
    pub fn invalidation(&self) -> &Region {
        &self.invalidation
    }

    /// Returns `true` once the client has recorded at least once at a
    /// non-empty size.
    #[must_use]
    pub fn has_recording(&self) -> bool {
        self.has_recording
    }

    /// Re-requests content for `update_rect` and folds the result in.
    ///
    /// The client's reported invalidation is unioned into both
    /// `existing_invalidation` and the recording's own region. The recording
    /// is resized to `new_size`; growing invalidates the exposed strips, and
    /// an empty size clears the recording entirely. The first recording at a
    /// non-empty size always re-records and invalidates the whole area.
    ///
    /// `tree` is handed through to the client, which may mutate unrelated
    /// nodes; the recording itself is not reachable from the tree while this
    /// runs.
    ///
    /// Returns whether anything visible changed.
    pub fn update_and_expand_invalidation(
        &mut self,
        client: &mut dyn ContentClient,
        tree: &mut ProducerTree,
        existing_invalidation: &mut Region,
        new_size: Size,
        update_rect: Rect,
        frame_number: u64,
        mode: PaintMode,
    ) -> bool {
        let mut changed = false;

        if new_size != self.size {
            for exposed in exposed_strips(self.size, new_size) {
                existing_invalidation.insert(exposed);
                self.invalidation.insert(exposed);
            }
            self.size = new_size;
            changed = true;
        }

        if is_empty(new_size) {
            let had_content = self.has_recording || !self.ops.is_empty();
            self.clear();
            return changed || had_content;
        }

        let full = Rect::from_origin_size((0.0, 0.0), new_size);
        self.ops.retain(|op| !op.bounds().intersect(full).is_zero_area());

        let first = !self.has_recording;
        let clip = if first || mode == PaintMode::CachingDisabled {
            full
        } else {
            update_rect.intersect(full)
        };
        if clip.is_zero_area() {
            return changed;
        }

        let request = RefreshRequest {
            node: self.content_id,
            clip,
            mode,
            frame_number,
        };
        let output = client.refresh_content(&request, tree);

        if clip == full {
            self.ops.clear();
        } else {
            self.ops.retain(|op| op.bounds().union(clip) != clip);
        }
        self.ops.extend(output.ops);

        let mut reported = output.invalidation;
        reported.intersect_rect(full);
        if first {
            reported.insert(full);
        }
        changed |= !reported.is_empty();
        existing_invalidation.union_with(&reported);
        self.invalidation.union_with(&reported);

        self.memory_usage = output.memory_usage;
        self.recorded_frame = frame_number;
        self.has_recording = true;
        changed
    }

    /// Snapshots the current state.
    ///
    /// This is a pure function of the recording; nothing is mutated, and the
    /// result can be sent to another thread as-is.
    #[must_use]
    pub fn create_raster_source(&self) -> RasterSource {
        let ops: Arc<[PaintOp]> = self.ops.as_slice().into();
        RasterSource::new(
            self.content_id,
            self.size,
            ops,
            self.recorded_frame,
            self.memory_usage,
        )
    }

    /// Drains the accumulated invalidation.
    pub fn take_invalidation(&mut self) -> Region {
        self.invalidation.take()
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.invalidation.clear();
        self.memory_usage = 0;
        self.has_recording = false;
    }
}

fn is_empty(size: Size) -> bool {
    size.width <= 0.0 || size.height <= 0.0
}

/// Areas inside `new` that were outside `old`.
fn exposed_strips(old: Size, new: Size) -> [Rect; 2] {
    let right = Rect::new(old.width.min(new.width), 0.0, new.width, new.height);
    let bottom = Rect::new(0.0, old.height.min(new.height), new.width, new.height);
    [right, bottom]
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::content::paint::{ContentOutput, Rgba8};

    /// Paints one fill per request and reports the requested clip as changed.
    struct FillClient {
        color: Rgba8,
        requests: Vec<Rect>,
    }

    impl ContentClient for FillClient {
        fn refresh_content(
            &mut self,
            request: &RefreshRequest,
            _tree: &mut ProducerTree,
        ) -> ContentOutput {
            self.requests.push(request.clip);
            let ops = if request.mode == PaintMode::PaintingDisabled {
                Vec::new()
            } else {
                vec![PaintOp::FillRect {
                    rect: request.clip,
                    color: self.color,
                }]
            };
            ContentOutput {
                ops,
                invalidation: Region::from_rect(request.clip),
                memory_usage: 64,
            }
        }
    }

    fn setup() -> (ProducerTree, NodeId, FillClient) {
        let mut tree = ProducerTree::new();
        let id = tree.create_node();
        let client = FillClient {
            color: Rgba8::WHITE,
            requests: Vec::new(),
        };
        (tree, id, client)
    }

    #[test]
    fn first_update_records_everything() {
        let (mut tree, id, mut client) = setup();
        let mut rec = RecordingSource::new(id);
        let mut inval = Region::new();
        let changed = rec.update_and_expand_invalidation(
            &mut client,
            &mut tree,
            &mut inval,
            Size::new(50.0, 50.0),
            Rect::new(0.0, 0.0, 10.0, 10.0),
            1,
            PaintMode::Normal,
        );
        assert!(changed);
        assert_eq!(client.requests, vec![Rect::new(0.0, 0.0, 50.0, 50.0)]);
        assert_eq!(inval.bounds(), Some(Rect::new(0.0, 0.0, 50.0, 50.0)));
        assert!(rec.has_recording());
    }

    #[test]
    fn partial_update_replaces_covered_ops() {
        let (mut tree, id, mut client) = setup();
        let mut rec = RecordingSource::new(id);
        let mut inval = Region::new();
        let size = Size::new(100.0, 100.0);
        let full = Rect::new(0.0, 0.0, 100.0, 100.0);
        rec.update_and_expand_invalidation(
            &mut client, &mut tree, &mut inval, size, full, 1, PaintMode::Normal,
        );
        inval.clear();

        let dirty = Rect::new(10.0, 10.0, 20.0, 20.0);
        rec.update_and_expand_invalidation(
            &mut client, &mut tree, &mut inval, size, dirty, 2, PaintMode::Normal,
        );
        rec.update_and_expand_invalidation(
            &mut client, &mut tree, &mut inval, size, dirty, 3, PaintMode::Normal,
        );
        // Full fill survives, the first partial fill was replaced by the second.
        assert_eq!(rec.ops().len(), 2);
        assert_eq!(inval.bounds(), Some(dirty));
    }

    #[test]
    fn empty_size_clears_recording() {
        let (mut tree, id, mut client) = setup();
        let mut rec = RecordingSource::new(id);
        let mut inval = Region::new();
        let full = Rect::new(0.0, 0.0, 10.0, 10.0);
        rec.update_and_expand_invalidation(
            &mut client,
            &mut tree,
            &mut inval,
            Size::new(10.0, 10.0),
            full,
            1,
            PaintMode::Normal,
        );
        let changed = rec.update_and_expand_invalidation(
            &mut client,
            &mut tree,
            &mut inval,
            Size::ZERO,
            full,
            2,
            PaintMode::Normal,
        );
        assert!(changed);
        assert!(!rec.has_recording());
        assert!(rec.ops().is_empty());
    }

    #[test]
    fn growing_invalidates_exposed_strips() {
        let (mut tree, id, mut client) = setup();
        let mut rec = RecordingSource::new(id);
        let mut inval = Region::new();
        let small = Size::new(10.0, 10.0);
        rec.update_and_expand_invalidation(
            &mut client,
            &mut tree,
            &mut inval,
            small,
            Rect::ZERO,
            1,
            PaintMode::Normal,
        );
        inval.clear();
        let changed = rec.update_and_expand_invalidation(
            &mut client,
            &mut tree,
            &mut inval,
            Size::new(20.0, 10.0),
            Rect::ZERO,
            2,
            PaintMode::Normal,
        );
        assert!(changed);
        assert_eq!(inval.bounds(), Some(Rect::new(10.0, 0.0, 20.0, 10.0)));
    }

    #[test]
    fn unchanged_without_update_rect() {
        let (mut tree, id, mut client) = setup();
        let mut rec = RecordingSource::new(id);
        let mut inval = Region::new();
        let size = Size::new(10.0, 10.0);
        rec.update_and_expand_invalidation(
            &mut client,
            &mut tree,
            &mut inval,
            size,
            Rect::ZERO,
            1,
            PaintMode::Normal,
        );
        let changed = rec.update_and_expand_invalidation(
            &mut client,
            &mut tree,
            &mut inval,
            size,
            Rect::ZERO,
            2,
            PaintMode::Normal,
        );
        assert!(!changed);
        assert_eq!(client.requests.len(), 1);
    }

    #[test]
    fn paint_mode_does_not_change_invalidation() {
        let size = Size::new(40.0, 40.0);
        let dirty = Rect::new(0.0, 0.0, 5.0, 5.0);
        let mut results = Vec::new();
        for mode in [
            PaintMode::Normal,
            PaintMode::PaintingDisabled,
            PaintMode::ConstructionDisabled,
        ] {
            let (mut tree, id, mut client) = setup();
            let mut rec = RecordingSource::new(id);
            let mut inval = Region::new();
            rec.update_and_expand_invalidation(
                &mut client, &mut tree, &mut inval, size, dirty, 1, mode,
            );
            inval.clear();
            rec.update_and_expand_invalidation(
                &mut client, &mut tree, &mut inval, size, dirty, 2, mode,
            );
            results.push(inval.bounds());
        }
        assert!(results.iter().all(|r| *r == Some(dirty)));
    }

    #[test]
    fn snapshot_does_not_drain_invalidation() {
        let (mut tree, id, mut client) = setup();
        let mut rec = RecordingSource::new(id);
        let mut inval = Region::new();
        rec.update_and_expand_invalidation(
            &mut client,
            &mut tree,
            &mut inval,
            Size::new(10.0, 10.0),
            Rect::ZERO,
            4,
            PaintMode::Normal,
        );
        let raster = rec.create_raster_source();
        assert_eq!(raster.recorded_frame(), 4);
        assert_eq!(raster.ops(), rec.ops());
        assert!(!rec.invalidation().is_empty());
        assert!(!rec.take_invalidation().is_empty());
        assert!(rec.invalidation().is_empty());
    }
}
