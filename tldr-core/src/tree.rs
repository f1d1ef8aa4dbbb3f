//! Summary tree produced by a run.
//!
//! Leaves summarize one chunk each; internal nodes merge their children in
//! document order. The tree is kept in the result so callers can inspect
//! how a summary was assembled.

use serde::{Deserialize, Serialize};

/// One node of the reduction tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum SummaryNode {
    /// Summary of a single chunk.
    Leaf {
        position: usize,
        start: usize,
        end: usize,
        summary: String,
    },
    /// Merge of ordered children.
    Internal {
        start: usize,
        end: usize,
        summary: String,
        children: Vec<SummaryNode>,
        /// Children concatenated without a provider call (depth limit hit).
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        verbatim: bool,
    },
}

impl SummaryNode {
    pub fn leaf(position: usize, start: usize, end: usize, summary: impl Into<String>) -> Self {
        SummaryNode::Leaf {
            position,
            start,
            end,
            summary: summary.into(),
        }
    }

    /// Internal node spanning its first child's start to its last child's end.
    pub fn internal(children: Vec<SummaryNode>, summary: impl Into<String>, verbatim: bool) -> Self {
        let start = children.first().map_or(0, |c| c.span().0);
        let end = children.last().map_or(0, |c| c.span().1);
        SummaryNode::Internal {
            start,
            end,
            summary: summary.into(),
            children,
            verbatim,
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            SummaryNode::Leaf { summary, .. } | SummaryNode::Internal { summary, .. } => summary,
        }
    }

    /// Byte range `[start, end)` of the input this node covers.
    pub fn span(&self) -> (usize, usize) {
        match self {
            SummaryNode::Leaf { start, end, .. } | SummaryNode::Internal { start, end, .. } => {
                (*start, *end)
            }
        }
    }

    pub fn children(&self) -> &[SummaryNode] {
        match self {
            SummaryNode::Leaf { .. } => &[],
            SummaryNode::Internal { children, .. } => children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, SummaryNode::Leaf { .. })
    }

    pub fn is_verbatim(&self) -> bool {
        matches!(self, SummaryNode::Internal { verbatim: true, .. })
    }

    /// Levels from this node down to its deepest leaf; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(SummaryNode::depth).max().unwrap_or(0)
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            SummaryNode::Leaf { .. } => 1,
            SummaryNode::Internal { children, .. } => {
                children.iter().map(SummaryNode::leaf_count).sum()
            }
        }
    }

    /// Leaf positions in tree order.
    pub fn leaf_positions(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.leaf_count());
        self.collect_positions(&mut out);
        out
    }

    fn collect_positions(&self, out: &mut Vec<usize>) {
        match self {
            SummaryNode::Leaf { position, .. } => out.push(*position),
            SummaryNode::Internal { children, .. } => {
                for child in children {
                    child.collect_positions(out);
                }
            }
        }
    }

    /// Check that this node covers exactly `[start, end)` and that every
    /// internal node's children tile its span with no gap or overlap.
    pub fn validate_coverage(&self, start: usize, end: usize) -> Result<(), String> {
        let (own_start, own_end) = self.span();
        if (own_start, own_end) != (start, end) {
            return Err(format!(
                "node claims [{own_start}..{own_end}) but must cover [{start}..{end})"
            ));
        }
        let children = self.children();
        if self.is_leaf() {
            return Ok(());
        }
        if children.is_empty() {
            return Err(format!("internal node [{start}..{end}) has no children"));
        }

        let mut cursor = start;
        for child in children {
            let (child_start, child_end) = child.span();
            if child_start != cursor {
                return Err(format!(
                    "child [{child_start}..{child_end}) does not start at {cursor}"
                ));
            }
            child.validate_coverage(child_start, child_end)?;
            cursor = child_end;
        }
        if cursor != end {
            return Err(format!("children end at {cursor}, node ends at {end}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SummaryNode {
        let left = SummaryNode::internal(
            vec![
                SummaryNode::leaf(0, 0, 10, "a"),
                SummaryNode::leaf(1, 10, 25, "b"),
            ],
            "a b",
            false,
        );
        SummaryNode::internal(vec![left, SummaryNode::leaf(2, 25, 40, "c")], "a b c", false)
    }

    #[test]
    fn test_depth_and_leaf_count() {
        let root = sample();
        assert_eq!(root.depth(), 3);
        assert_eq!(root.leaf_count(), 3);
        assert_eq!(root.leaf_positions(), vec![0, 1, 2]);
        assert_eq!(root.span(), (0, 40));
        assert_eq!(SummaryNode::leaf(0, 0, 5, "x").depth(), 1);
    }

    #[test]
    fn test_valid_coverage() {
        assert!(sample().validate_coverage(0, 40).is_ok());
    }

    #[test]
    fn test_gap_is_detected() {
        let root = SummaryNode::internal(
            vec![
                SummaryNode::leaf(0, 0, 10, "a"),
                SummaryNode::leaf(1, 12, 20, "b"),
            ],
            "a b",
            false,
        );
        let err = root.validate_coverage(0, 20).unwrap_err();
        assert!(err.contains("does not start at 10"));
    }

    #[test]
    fn test_wrong_outer_span_is_detected() {
        assert!(sample().validate_coverage(0, 41).is_err());
    }

    #[test]
    fn test_verbatim_flag_serialization() {
        let node = SummaryNode::internal(vec![SummaryNode::leaf(0, 0, 3, "x")], "x", true);
        assert!(node.is_verbatim());
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"verbatim\":true"));

        let plain = SummaryNode::internal(vec![SummaryNode::leaf(0, 0, 3, "x")], "x", false);
        let json = serde_json::to_string(&plain).unwrap();
        assert!(!json.contains("verbatim"));
        let parsed: SummaryNode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, plain);
    }
}
