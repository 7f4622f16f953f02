// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resolving a consumer tree into target-space draw items.
//!
//! The walk is a pre-order traversal from the root that carries three
//! inherited values down the tree:
//!
//! 1. **Space**: `parent_space * translate(position) * transform` places a
//!    node; its children live in `node_world * translate(-scroll_offset)`.
//! 2. **Opacity**: multiplied down from the root. A subtree whose effective
//!    opacity reaches zero, or that is hidden, is skipped entirely.
//! 3. **Clip**: nodes that mask to bounds (or whose kind clips) intersect
//!    the inherited clip with their own target rect for their descendants.

use alloc::vec;
use alloc::vec::Vec;

use kurbo::{Point, Rect};

use super::tree::ConsumerTree;
use crate::backend::DrawItem;
use crate::id::NodeId;
use crate::transform::Transform3d;

/// The drawable content of one consumer tree.
#[derive(Clone, Debug, Default)]
pub struct DrawList {
    /// Drawable nodes in paint order.
    pub items: Vec<DrawItem>,
    /// Full target area: the viewport if set, else the root's rect, else the
    /// union of all item rects.
    pub content_rect: Rect,
}

struct Frame {
    id: NodeId,
    space: Transform3d,
    opacity: f32,
    clip: Option<Rect>,
}

impl ConsumerTree {
    /// Resolves every visible drawable node.
    ///
    /// A node is drawable when its kind draws content, it is not hidden, its
    /// effective opacity is non-zero, and its clipped target rect is not
    /// empty.
    #[must_use]
    pub fn draw_list(&self) -> DrawList {
        let mut items = Vec::new();
        let mut root_rect = None;

        if let Some(root) = self.root {
            let mut stack = vec![Frame {
                id: root,
                space: Transform3d::IDENTITY,
                opacity: 1.0,
                clip: None,
            }];
            while let Some(frame) = stack.pop() {
                let Some(node) = self.nodes.get(&frame.id) else {
                    continue;
                };
                let opacity = frame.opacity * node.opacity;
                if node.hidden || opacity <= 0.0 {
                    continue;
                }

                let origin = node.position.to_vec2();
                let world = frame.space * Transform3d::from_offset(origin) * node.transform;
                let rect = world.map_rect_bbox(node.local_rect());
                if frame.id == root {
                    root_rect = Some(rect);
                }
                let visible = frame.clip.map_or(rect, |c| rect.intersect(c));

                let caps = node.kind.capabilities();
                if caps.draws_content && !visible.is_zero_area() {
                    items.push(DrawItem {
                        id: node.id,
                        kind: node.kind,
                        rect: visible,
                        transform: world,
                        clip: frame.clip,
                        opacity,
                        raster: node.raster.clone(),
                    });
                }

                let child_clip = if node.masks_to_bounds || caps.clips_descendants {
                    Some(visible)
                } else {
                    frame.clip
                };
                let child_space = world * Transform3d::from_offset(-node.scroll_offset);
                // Reverse so children pop in paint order.
                stack.extend(node.children.iter().rev().map(|&id| Frame {
                    id,
                    space: child_space,
                    opacity,
                    clip: child_clip,
                }));
            }
        }

        let content_rect = match (self.viewport, root_rect) {
            (Some(viewport), _) => Rect::from_origin_size(Point::ORIGIN, viewport),
            (None, Some(rect)) if !rect.is_zero_area() => rect,
            _ => items
                .iter()
                .map(|item| item.rect)
                .reduce(|a, b| a.union(b))
                .unwrap_or(Rect::ZERO),
        };
        DrawList {
            items,
            content_rect,
        }
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{Size, Vec2};

    use super::*;
    use crate::content::Rgba8;
    use crate::producer::{NodeKind, ProducerTree};
    use crate::trace::Tracer;

    const RED: NodeKind = NodeKind::SolidColor(Rgba8::new(255, 0, 0, 255));

    fn solid(producer: &mut ProducerTree, parent: NodeId, rect: Rect) -> NodeId {
        let id = producer.create_node_with_kind(RED);
        producer.set_position(id, rect.origin());
        producer.set_bounds(id, rect.size());
        producer.add_child(parent, id);
        id
    }

    fn consumer(producer: &mut ProducerTree, frame: u64) -> ConsumerTree {
        let mut tree = ConsumerTree::new();
        tree.apply(&producer.synchronize(frame, &mut Tracer::none()));
        tree
    }

    #[test]
    fn groups_are_not_drawn_but_position_children() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        producer.set_root(Some(root));
        let group = producer.create_node();
        producer.set_position(group, Point::new(10.0, 20.0));
        producer.add_child(root, group);
        let leaf = solid(&mut producer, group, Rect::new(5.0, 5.0, 15.0, 15.0));

        let list = consumer(&mut producer, 1).draw_list();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].id, leaf);
        assert_eq!(list.items[0].rect, Rect::new(15.0, 25.0, 25.0, 35.0));
        assert_eq!(list.content_rect, Rect::new(15.0, 25.0, 25.0, 35.0));
    }

    #[test]
    fn scroll_offset_moves_children_only() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node_with_kind(RED);
        producer.set_bounds(root, Size::new(100.0, 100.0));
        producer.set_scroll_offset(root, Vec2::new(0.0, 30.0));
        producer.set_root(Some(root));
        let _ = solid(&mut producer, root, Rect::new(0.0, 40.0, 10.0, 50.0));

        let list = consumer(&mut producer, 1).draw_list();
        assert_eq!(list.items[0].rect, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(list.items[1].rect, Rect::new(0.0, 10.0, 10.0, 20.0));
    }

    #[test]
    fn masks_to_bounds_clips_descendants() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        producer.set_bounds(root, Size::new(50.0, 50.0));
        producer.set_masks_to_bounds(root, true);
        producer.set_root(Some(root));
        let _ = solid(&mut producer, root, Rect::new(40.0, 40.0, 80.0, 80.0));
        let _ = solid(&mut producer, root, Rect::new(60.0, 0.0, 70.0, 10.0));

        let list = consumer(&mut producer, 1).draw_list();
        assert_eq!(list.items.len(), 1, "fully clipped node is not drawable");
        assert_eq!(list.items[0].rect, Rect::new(40.0, 40.0, 50.0, 50.0));
        assert_eq!(list.items[0].clip, Some(Rect::new(0.0, 0.0, 50.0, 50.0)));
    }

    #[test]
    fn hidden_and_transparent_subtrees_are_skipped() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        producer.set_root(Some(root));
        let hidden = producer.create_node();
        producer.set_hidden(hidden, true);
        producer.add_child(root, hidden);
        let _ = solid(&mut producer, hidden, Rect::new(0.0, 0.0, 10.0, 10.0));
        let faded = producer.create_node();
        producer.set_opacity(faded, 0.0);
        producer.add_child(root, faded);
        let _ = solid(&mut producer, faded, Rect::new(0.0, 0.0, 10.0, 10.0));
        let half = producer.create_node();
        producer.set_opacity(half, 0.5);
        producer.add_child(root, half);
        let shown = solid(&mut producer, half, Rect::new(0.0, 0.0, 10.0, 10.0));
        producer.set_opacity(shown, 0.5);

        let list = consumer(&mut producer, 1).draw_list();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].id, shown);
        assert!((list.items[0].opacity - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn viewport_is_the_content_rect() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        producer.set_root(Some(root));
        producer.set_viewport(Some(Size::new(320.0, 240.0)));
        let list = consumer(&mut producer, 1).draw_list();
        assert!(list.items.is_empty());
        assert_eq!(list.content_rect, Rect::new(0.0, 0.0, 320.0, 240.0));
    }

    #[test]
    fn zero_area_root_falls_back_to_item_bounds() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        producer.set_root(Some(root));
        let _ = solid(&mut producer, root, Rect::new(10.0, 10.0, 20.0, 20.0));
        let _ = solid(&mut producer, root, Rect::new(40.0, 0.0, 50.0, 30.0));
        let list = consumer(&mut producer, 1).draw_list();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.content_rect, Rect::new(10.0, 0.0, 50.0, 30.0));
    }
}
