//! KD-tree over element bounding boxes.
//!
//! Each interior node splits its items at the median box center along the
//! longest axis of the node's box. Items whose boxes straddle the split plane
//! are referenced from both children, so a point query descends a single
//! path and still sees every element that could contain the point.
//!
//! Straddling items make the total number of leaf references grow with the
//! amount of overlap. A build fails once that count exceeds
//! [`MAX_REFERENCE_FACTOR`] times the number of items; callers retry with a
//! coarser leaf cap.

use crate::geometry::bbox::BoundingBox;
use thiserror::Error;

/// Upper bound on leaf references per item before a build gives up.
pub const MAX_REFERENCE_FACTOR: usize = 8;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("kd-tree holds {references} leaf references, limit is {limit}")]
pub struct KdBuildError {
    pub references: usize,
    pub limit: usize,
}

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        bbox: BoundingBox,
        items: Vec<usize>,
    },
    Split {
        bbox: BoundingBox,
        axis: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

impl Node {
    fn bbox(&self) -> &BoundingBox {
        match self {
            Node::Leaf { bbox, .. } | Node::Split { bbox, .. } => bbox,
        }
    }
}

/// Static spatial index; items are indices into the box slice it was built from.
#[derive(Clone, Debug)]
pub struct KdTree {
    nodes: Vec<Node>,
    root: usize,
    len: usize,
    references: usize,
    depth: usize,
}

struct Builder<'a> {
    boxes: &'a [BoundingBox],
    max_per_leaf: usize,
    max_depth: usize,
    limit: usize,
    nodes: Vec<Node>,
    references: usize,
    depth: usize,
}

impl Builder<'_> {
    fn leaf(&mut self, bbox: BoundingBox, items: Vec<usize>) -> Result<usize, KdBuildError> {
        self.references += items.len();
        if self.references > self.limit {
            return Err(KdBuildError {
                references: self.references,
                limit: self.limit,
            });
        }
        self.nodes.push(Node::Leaf { bbox, items });
        Ok(self.nodes.len() - 1)
    }

    fn build(&mut self, items: Vec<usize>, depth: usize) -> Result<usize, KdBuildError> {
        self.depth = self.depth.max(depth);
        let mut bbox = BoundingBox::empty();
        for &i in &items {
            bbox.merge(&self.boxes[i]);
        }
        if items.len() <= self.max_per_leaf || depth >= self.max_depth {
            return self.leaf(bbox, items);
        }
        let axis = bbox.longest_axis();
        let mut centers: Vec<f64> = items
            .iter()
            .map(|&i| self.boxes[i].center()[axis])
            .collect();
        let mid = centers.len() / 2;
        let (_, median, _) = centers.select_nth_unstable_by(mid, f64::total_cmp);
        let value = *median;

        let left: Vec<usize> = items
            .iter()
            .copied()
            .filter(|&i| self.boxes[i].min[axis] <= value)
            .collect();
        let right: Vec<usize> = items
            .iter()
            .copied()
            .filter(|&i| self.boxes[i].max[axis] > value)
            .collect();
        if left.len() == items.len() || right.len() == items.len() {
            return self.leaf(bbox, items);
        }
        let left = self.build(left, depth + 1)?;
        let right = self.build(right, depth + 1)?;
        self.nodes.push(Node::Split {
            bbox,
            axis,
            value,
            left,
            right,
        });
        Ok(self.nodes.len() - 1)
    }
}

impl KdTree {
    /// Builds the tree over `boxes` with at most `max_per_leaf` items per
    /// leaf (unless splitting stops making progress) and at most `max_depth`
    /// levels of splits.
    pub fn build(
        boxes: &[BoundingBox],
        max_per_leaf: usize,
        max_depth: usize,
    ) -> Result<Self, KdBuildError> {
        let mut builder = Builder {
            boxes,
            max_per_leaf: max_per_leaf.max(1),
            max_depth,
            limit: MAX_REFERENCE_FACTOR * boxes.len().max(1),
            nodes: Vec::new(),
            references: 0,
            depth: 0,
        };
        let root = builder.build((0..boxes.len()).collect(), 0)?;
        Ok(Self {
            nodes: builder.nodes,
            root,
            len: boxes.len(),
            references: builder.references,
            depth: builder.depth,
        })
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Box of every indexed item.
    pub fn root_box(&self) -> BoundingBox {
        *self.nodes[self.root].bbox()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Deepest leaf level (root is 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Total item references over all leaves.
    pub fn reference_count(&self) -> usize {
        self.references
    }

    fn descend(&self, p: &[f64; 3]) -> usize {
        let mut node = self.root;
        while let Node::Split {
            axis,
            value,
            left,
            right,
            ..
        } = &self.nodes[node]
        {
            node = if p[*axis] <= *value { *left } else { *right };
        }
        node
    }

    fn leaf_items(&self, node: usize) -> &[usize] {
        match &self.nodes[node] {
            Node::Leaf { items, .. } => items,
            Node::Split { .. } => &[],
        }
    }

    /// Items of the leaf whose region contains `p`: every item whose box
    /// contains `p` is among them.
    pub fn point_search(&self, p: &[f64; 3]) -> &[usize] {
        self.leaf_items(self.descend(p))
    }

    /// Items of the leaf closest to `p` among leaves within `eps` of it.
    ///
    /// The leaf found by [`KdTree::point_search`] wins ties, so a point inside
    /// the indexed region behaves as in a point search.
    pub fn distance_search(&self, p: &[f64; 3], eps: f64) -> &[usize] {
        let home = self.descend(p);
        let mut best = (self.nodes[home].bbox().distance_squared(p), home);
        let eps2 = eps * eps;
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            let d2 = self.nodes[node].bbox().distance_squared(p);
            if d2 > eps2 || d2 >= best.0 {
                continue;
            }
            match &self.nodes[node] {
                Node::Leaf { .. } => best = (d2, node),
                Node::Split { left, right, .. } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
        if best.0 > eps2 {
            return &[];
        }
        self.leaf_items(best.1)
    }
}
