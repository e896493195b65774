use crate::messages::{Segment, SegmentList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Even,
    Odd,
}

impl Flavor {
    pub fn flipped(self) -> Self {
        match self {
            Flavor::Even => Flavor::Odd,
            Flavor::Odd => Flavor::Even,
        }
    }
}

#[derive(Debug)]
struct TreeNode {
    parent: usize,
    flavor: Flavor,
    segment: Segment,
    data: Option<SegmentList>,
}

/// Union-find arena over two PRIs: the previous generation's nodes come
/// first, then the current one's. Only roots own a [`SegmentList`].
#[derive(Debug)]
pub struct SegmentForest {
    nodes: Vec<TreeNode>,
    old_len: usize,
    flavor: Flavor,
}

impl SegmentForest {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            old_len: 0,
            flavor: Flavor::Even,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Nodes of the previous generation still alive.
    pub fn old_len(&self) -> usize {
        self.old_len
    }

    pub fn new_len(&self) -> usize {
        self.nodes.len() - self.old_len
    }

    /// Roots carrying data, i.e. extractions still being grown.
    pub fn active_trees(&self) -> usize {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(index, node)| node.parent == *index && node.data.is_some())
            .count()
    }

    /// Flips the flavor and adds one self-rooted node per segment.
    pub fn begin_generation(&mut self, segments: &[Segment]) {
        debug_assert_eq!(self.old_len, self.nodes.len());
        self.flavor = self.flavor.flipped();
        let flavor = self.flavor;
        let base = self.nodes.len();
        self.nodes
            .extend(segments.iter().enumerate().map(|(offset, &segment)| TreeNode {
                parent: base + offset,
                flavor,
                segment,
                data: None,
            }));
    }

    /// Joins the tree of old node `old` with the tree of new node `new`.
    pub fn connect(&mut self, old: usize, new: usize) {
        let a = self.find(old);
        let b = self.find(self.old_len + new);
        if a == b {
            return;
        }

        let (winner, loser) = self.pick_root(a, b);
        let moved = self.take_extended(loser);
        self.nodes[loser].parent = winner;
        let kept = self.take_extended(winner);
        self.nodes[winner].data = match (kept, moved) {
            (Some(mut kept), Some(moved)) => {
                kept.merge(moved);
                Some(kept)
            }
            (kept, moved) => kept.or(moved),
        };
    }

    /// Old-generation roots no new segment reached. Their extractions are
    /// complete.
    pub fn take_finished(&mut self) -> Vec<SegmentList> {
        let mut finished = Vec::new();
        for (index, node) in self.nodes[..self.old_len].iter_mut().enumerate() {
            if node.parent == index {
                finished.extend(node.data.take());
            }
        }
        finished
    }

    /// Adds every new segment to the data of its root, starting a one-azimuth
    /// list for trees that had none.
    pub fn attach_new_segments(&mut self) {
        for index in self.old_len..self.nodes.len() {
            let root = self.find(index);
            let segment = self.nodes[index].segment;
            self.nodes[root]
                .data
                .get_or_insert_with(|| SegmentList::with_span(1))
                .push(segment);
        }
    }

    /// Removes the data of current roots spanning more than `max_span`
    /// azimuths. The nodes stay, so later segments touching them start over.
    pub fn take_oversized(&mut self, max_span: u32) -> Vec<SegmentList> {
        let mut oversized = Vec::new();
        for index in self.old_len..self.nodes.len() {
            let node = &mut self.nodes[index];
            if node.parent != index {
                continue;
            }
            if node.data.as_ref().is_some_and(|data| data.span() > max_span) {
                oversized.extend(node.data.take());
            }
        }
        oversized
    }

    /// Drops the previous generation; the current one becomes "old".
    pub fn end_generation(&mut self) {
        let old_len = self.old_len;
        for index in old_len..self.nodes.len() {
            let root = self.find(index);
            debug_assert!(root >= old_len);
            self.nodes[index].parent = root;
        }
        self.nodes.drain(..old_len);
        for node in &mut self.nodes {
            node.parent -= old_len;
        }
        self.old_len = self.nodes.len();
    }

    /// Every list still owned by a root, leaving the forest empty.
    pub fn drain(&mut self) -> Vec<SegmentList> {
        let lists = self
            .nodes
            .iter_mut()
            .enumerate()
            .filter(|(index, node)| node.parent == *index)
            .filter_map(|(_, node)| node.data.take())
            .collect();
        self.nodes.clear();
        self.old_len = 0;
        lists
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.nodes[index].parent != index {
            let grandparent = self.nodes[self.nodes[index].parent].parent;
            self.nodes[index].parent = grandparent;
            index = grandparent;
        }
        index
    }

    /// Current-generation roots win; between two of them the one holding
    /// data wins, then the lower index.
    fn pick_root(&self, a: usize, b: usize) -> (usize, usize) {
        let current = |index: usize| self.nodes[index].flavor == self.flavor;
        let holds = |index: usize| self.nodes[index].data.is_some();
        let a_first = match (current(a), current(b)) {
            (true, false) => true,
            (false, true) => false,
            _ => match (holds(a), holds(b)) {
                (true, false) => true,
                (false, true) => false,
                _ => a < b,
            },
        };
        if a_first {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Takes a root's data; data leaving the previous generation grows by
    /// the azimuth now being connected.
    fn take_extended(&mut self, index: usize) -> Option<SegmentList> {
        let node = &mut self.nodes[index];
        let mut data = node.data.take()?;
        if node.flavor != self.flavor {
            data.set_span(data.span() + 1);
        }
        Some(data)
    }
}

impl Default for SegmentForest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(azimuth: u32, start: u32, stop: u32) -> Segment {
        Segment::new(azimuth, start, stop).unwrap()
    }

    fn finish_pass(forest: &mut SegmentForest) -> Vec<SegmentList> {
        let finished = forest.take_finished();
        forest.attach_new_segments();
        forest.end_generation();
        finished
    }

    #[test]
    fn flavor_alternates_every_generation() {
        let mut forest = SegmentForest::new();
        let first = forest.flavor();
        forest.begin_generation(&[seg(0, 0, 1)]);
        finish_pass(&mut forest);
        assert_ne!(forest.flavor(), first);
        forest.begin_generation(&[]);
        finish_pass(&mut forest);
        assert_eq!(forest.flavor(), first);
    }

    #[test]
    fn connected_segment_extends_span_once() {
        let mut forest = SegmentForest::new();
        forest.begin_generation(&[seg(0, 0, 4)]);
        finish_pass(&mut forest);

        forest.begin_generation(&[seg(1, 2, 3), seg(1, 4, 6)]);
        forest.connect(0, 0);
        forest.connect(0, 1);
        assert!(finish_pass(&mut forest).is_empty());
        assert_eq!(forest.old_len(), 2);
        assert_eq!(forest.active_trees(), 1);

        forest.begin_generation(&[]);
        let finished = finish_pass(&mut forest);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].span(), 2);
        assert_eq!(finished[0].len(), 3);
        assert_eq!(forest.old_len(), 0);
    }

    #[test]
    fn unifying_two_trees_does_not_double_count_span() {
        let mut forest = SegmentForest::new();
        forest.begin_generation(&[seg(0, 0, 1), seg(0, 5, 6)]);
        finish_pass(&mut forest);

        forest.begin_generation(&[seg(1, 0, 6)]);
        forest.connect(0, 0);
        forest.connect(1, 0);
        finish_pass(&mut forest);

        let lists = forest.drain();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].span(), 2);
        assert_eq!(lists[0].len(), 3);
    }

    #[test]
    fn oversized_roots_lose_their_data() {
        let mut forest = SegmentForest::new();
        forest.begin_generation(&[seg(0, 0, 1)]);
        finish_pass(&mut forest);
        forest.begin_generation(&[seg(1, 0, 1)]);
        forest.connect(0, 0);
        forest.take_finished();
        forest.attach_new_segments();
        let oversized = forest.take_oversized(1);
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].span(), 2);
        forest.end_generation();
        assert_eq!(forest.active_trees(), 0);
    }
}
