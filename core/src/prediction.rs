//! Prediction tree: root is image-level, level 1 is object detections
//! (YOLOV3), level 2 is classification attributes attached to each level-1
//! node in a fixed order — color, then make, then type.
//!
//! Modeled as a node arena with parent/child indices rather than a
//! hand-written linked structure. Traversal is a recursive depth-first walk
//! that can stop early via [`std::ops::ControlFlow`].

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic, process-wide id generator for [`PredictionNode::prediction_id`]
///. A plain atomic counter is the
/// idiomatic replacement for whatever global counter the source kept —
/// there's exactly one writer site (`PredictionTree::push`), so no pool or
/// per-tree scheme is needed.
static NEXT_PREDICTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_prediction_id() -> u64 {
    NEXT_PREDICTION_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    /// Rescales this box from one frame resolution to another, in place
    ///.
    pub fn rescale(&self, from_w: f32, from_h: f32, to_w: f32, to_h: f32) -> BBox {
        let fx = to_w / from_w;
        let fy = to_h / from_h;
        BBox {
            x: self.x * fx,
            y: self.y * fy,
            w: self.w * fx,
            h: self.h * fy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictionNode {
    pub prediction_id: u64,
    pub bbox: BBox,
    pub class_id: i32,
    pub class_prob: f32,
    pub class_label: String,
    pub enabled: bool,
    pub obj_track_label: Option<String>,
    children: Vec<usize>,
    parent: Option<usize>,
}

impl PredictionNode {
    fn leaf(bbox: BBox, class_id: i32, class_prob: f32, class_label: String) -> Self {
        Self {
            prediction_id: next_prediction_id(),
            bbox,
            class_id,
            class_prob,
            class_label,
            enabled: true,
            obj_track_label: None,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }
}

/// A rooted arena; index 0 is always the image-level root. Allocated at
/// detection, scaled in-place to main-frame coordinates, attached to the
/// main buffer's `user_data`, and freed after overlay conversion.
#[derive(Debug, Clone)]
pub struct PredictionTree {
    nodes: Vec<PredictionNode>,
}

pub const ROOT: usize = 0;

impl PredictionTree {
    /// Creates a tree with only the image-level root, representing "no
    /// detections in this frame" until [`push_detection`](Self::push_detection)
    /// is called.
    pub fn new_image_root() -> Self {
        Self {
            nodes: vec![PredictionNode::leaf(BBox::default(), -1, 1.0, String::new())],
        }
    }

    pub fn root(&self) -> usize {
        ROOT
    }

    pub fn node(&self, idx: usize) -> &PredictionNode {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: usize) -> &mut PredictionNode {
        &mut self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a level-1 object-detection node under the root. Returns its
    /// index.
    pub fn push_detection(
        &mut self,
        bbox: BBox,
        class_id: i32,
        class_prob: f32,
        class_label: String,
    ) -> usize {
        self.push_child(ROOT, bbox, class_id, class_prob, class_label)
    }

    /// Appends a level-2 classification attribute under `parent` (a
    /// level-1 detection node). Callers append color, then make, then
    /// type, in that order, so `children()` on a level-1 node always
    /// yields the three attributes in that fixed order.
    pub fn push_classification(
        &mut self,
        parent: usize,
        class_id: i32,
        class_prob: f32,
        class_label: String,
    ) -> usize {
        self.push_child(parent, self.nodes[parent].bbox, class_id, class_prob, class_label)
    }

    fn push_child(
        &mut self,
        parent: usize,
        bbox: BBox,
        class_id: i32,
        class_prob: f32,
        class_label: String,
    ) -> usize {
        let mut node = PredictionNode::leaf(bbox, class_id, class_prob, class_label);
        node.parent = Some(parent);
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children.push(idx);
        idx
    }

    /// Depth-1 nodes: the object detections directly under the root,
    /// counting the root's own level as depth 1 and these as depth 2 —
    /// equivalent to "direct children of root", which is what this returns.
    pub fn level_1_nodes(&self) -> &[usize] {
        self.nodes[ROOT].children()
    }

    /// Rescales every node's bbox in place from one resolution to another
    ///.
    pub fn rescale_all(&mut self, from_w: f32, from_h: f32, to_w: f32, to_h: f32) {
        for node in &mut self.nodes {
            node.bbox = node.bbox.rescale(from_w, from_h, to_w, to_h);
        }
    }

    /// Recursive depth-first walk starting at `start`, stopping early if
    /// `visit` returns `ControlFlow::Break`.
    pub fn walk(
        &self,
        start: usize,
        visit: &mut impl FnMut(usize, &PredictionNode) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        if visit(start, &self.nodes[start]).is_break() {
            return ControlFlow::Break(());
        }
        for &child in self.nodes[start].children() {
            if self.walk(child, visit).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_1_nodes_are_direct_children_of_root() {
        let mut tree = PredictionTree::new_image_root();
        let car = tree.push_detection(BBox::default(), 2, 0.9, "car".into());
        let person = tree.push_detection(BBox::default(), 0, 0.8, "person".into());
        assert_eq!(tree.level_1_nodes(), &[car, person]);
    }

    #[test]
    fn classification_children_preserve_color_make_type_order() {
        let mut tree = PredictionTree::new_image_root();
        let car = tree.push_detection(BBox::default(), 2, 0.9, "car".into());
        tree.push_classification(car, 1, 0.7, "red".into());
        tree.push_classification(car, 3, 0.6, "toyota".into());
        tree.push_classification(car, 5, 0.95, "sedan".into());
        let labels: Vec<_> = tree
            .node(car)
            .children()
            .iter()
            .map(|&idx| tree.node(idx).class_label.clone())
            .collect();
        assert_eq!(labels, vec!["red", "toyota", "sedan"]);
    }

    #[test]
    fn walk_visits_every_node_and_can_stop_early() {
        let mut tree = PredictionTree::new_image_root();
        let car = tree.push_detection(BBox::default(), 2, 0.9, "car".into());
        tree.push_classification(car, 1, 0.7, "red".into());
        let mut visited = Vec::new();
        tree.walk(tree.root(), &mut |idx, _| {
            visited.push(idx);
            ControlFlow::Continue(())
        });
        assert_eq!(visited.len(), 3);

        let mut count = 0;
        tree.walk(tree.root(), &mut |_, _| {
            count += 1;
            if count == 1 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn bbox_rescale_is_linear_per_axis() {
        let bbox = BBox { x: 10.0, y: 20.0, w: 100.0, h: 50.0 };
        let scaled = bbox.rescale(640.0, 480.0, 1920.0, 1080.0);
        assert!((scaled.x - 30.0).abs() < 1e-3);
        assert!((scaled.w - 300.0).abs() < 1e-3);
    }
}
