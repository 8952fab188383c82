//! Node table for bracketed parse trees.
//!
//! Every token of every tree becomes one [`Node`]. Identifiers encode the
//! tree they belong to: node `i` (1-based, in token order) of tree `t`
//! (1-based, in corpus order) has id `t * NODE_OFFSET + i`. This is the same
//! numbering the external matcher reports, so a `tree:node` match maps to a
//! node id without any lookup table.

use crate::corpus::Corpus;
use crate::error::TredevError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Globally unique node identifier
pub type NodeId = u64;

/// Id stride between consecutive trees; trees hold at most `NODE_OFFSET - 1` nodes.
pub const NODE_OFFSET: u64 = 1000;

const BRACKET_ESCAPES: [(&str, &str); 6] = [
    ("-LRB-", "("),
    ("-RRB-", ")"),
    ("-LSB-", "["),
    ("-RSB-", "]"),
    ("-LCB-", "{"),
    ("-RCB-", "}"),
];

/// Map a (tree index, intra-tree node index) match to its global node id.
pub fn node_id(tree_n: u64, node_n: u64) -> NodeId {
    tree_n * NODE_OFFSET + node_n
}

/// Inverse of [`node_id`].
pub fn split_node_id(id: NodeId) -> (u64, u64) {
    (id / NODE_OFFSET, id % NODE_OFFSET)
}

/// Restore a bracket escape code (e.g. `-LRB-`) to the bracket it stands for.
pub fn unescape_bracket(label: &str) -> &str {
    BRACKET_ESCAPES
        .iter()
        .find(|(code, _)| *code == label)
        .map(|(_, bracket)| *bracket)
        .unwrap_or(label)
}

/// A terminal (token) or non-terminal (phrase/POS tag) node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    /// `None` for the root of a tree
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }
}

/// All nodes of all trees in a corpus, keyed by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, Node>,
    tree_count: u64,
}

impl NodeStore {
    /// Parse every file of the corpus, one tree per non-empty line.
    pub fn from_corpus(corpus: &Corpus) -> crate::Result<Self> {
        let mut store = Self::default();

        for path in corpus.files()? {
            let text = fs::read_to_string(&path)?;
            let before = store.tree_count;
            store.parse_text(&text, &path)?;
            debug!(
                file = %path.display(),
                trees = store.tree_count - before,
                "parsed corpus file"
            );
        }

        info!(
            trees = store.tree_count,
            nodes = store.nodes.len(),
            "built node table"
        );
        Ok(store)
    }

    /// Parse trees from in-memory text, numbering them after any trees already held.
    pub fn parse_text(&mut self, text: &str, source: &Path) -> crate::Result<()> {
        for line in text.lines() {
            if line.split_whitespace().next().is_none() {
                continue;
            }
            self.tree_count += 1;
            self.parse_tree(line, self.tree_count, source)?;
        }
        Ok(())
    }

    fn parse_tree(&mut self, line: &str, tree_n: u64, source: &Path) -> crate::Result<()> {
        let base = node_id(tree_n, 0);
        let mut nodes: Vec<Node> = Vec::new();
        // Open non-terminals from the root down to the current node, as
        // indices into `nodes`.
        let mut path: Vec<usize> = Vec::new();

        for token in line.split_whitespace() {
            let node_n = nodes.len() as u64 + 1;
            if node_n >= NODE_OFFSET {
                return Err(TredevError::TreeTooLarge {
                    path: source.to_path_buf(),
                    tree: tree_n,
                    max: NODE_OFFSET - 1,
                });
            }
            let id = base + node_n;
            let parent = path.last().map(|&idx| nodes[idx].id);
            if let Some(&idx) = path.last() {
                nodes[idx].children.push(id);
            }

            if let Some(label) = token.strip_prefix('(') {
                nodes.push(Node {
                    id,
                    label: label.trim_start_matches('(').to_string(),
                    parent,
                    children: Vec::new(),
                });
                path.push(nodes.len() - 1);
            } else {
                let label = token.trim_end_matches(')');
                let closures = token.len() - label.len();
                nodes.push(Node {
                    id,
                    label: label.to_string(),
                    parent,
                    children: Vec::new(),
                });
                path.truncate(path.len().saturating_sub(closures));
            }
        }

        self.nodes.extend(nodes.into_iter().map(|n| (n.id, n)));
        Ok(())
    }

    /// Rebuild a store from previously persisted nodes.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes: BTreeMap<NodeId, Node> = nodes.into_iter().map(|n| (n.id, n)).collect();
        let tree_count = nodes
            .keys()
            .next_back()
            .map(|&id| split_node_id(id).0)
            .unwrap_or(0);
        Self { nodes, tree_count }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of trees parsed (highest tree index)
    pub fn tree_count(&self) -> u64 {
        self.tree_count
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Node ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn get(&self, id: NodeId) -> crate::Result<&Node> {
        self.nodes.get(&id).ok_or(TredevError::UnknownNode(id))
    }

    /// Id of the root of the tree containing `id`.
    pub fn root_id(&self, id: NodeId) -> crate::Result<NodeId> {
        let mut node = self.get(id)?;
        while let Some(parent) = node.parent {
            node = self.get(parent)?;
        }
        Ok(node.id)
    }

    /// Bracketed rendering of the subtree rooted at `id`.
    ///
    /// With `indent == 0` the result is a single line. Otherwise each
    /// non-terminal starts on its own line, indented by `indent` spaces per
    /// level, except that pre-terminals such as `(NN ocean)` stay on one line.
    pub fn subtree(&self, id: NodeId, indent: usize) -> crate::Result<String> {
        let mut out = String::new();
        self.write_subtree(id, indent, 0, &mut out)?;
        Ok(out)
    }

    fn write_subtree(
        &self,
        id: NodeId,
        indent: usize,
        level: usize,
        out: &mut String,
    ) -> crate::Result<()> {
        let node = self.get(id)?;

        let Some(&first) = node.children.first() else {
            out.push_str(&node.label);
            return Ok(());
        };

        out.push_str(&" ".repeat(level * indent));
        out.push('(');
        out.push_str(&node.label);

        let separator = if indent > 0 { '\n' } else { ' ' };
        if indent > 0 && !self.get(first)?.is_terminal() {
            out.push('\n');
        } else {
            out.push(' ');
        }

        for (i, &child) in node.children.iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            self.write_subtree(child, indent, level + 1, out)?;
        }
        out.push(')');
        Ok(())
    }

    /// Bracketed rendering of the whole tree containing `id`.
    pub fn full_tree(&self, id: NodeId, indent: usize) -> crate::Result<String> {
        self.subtree(self.root_id(id)?, indent)
    }

    /// Surface string spanned by `id`, with bracket escapes restored.
    pub fn substring(&self, id: NodeId) -> crate::Result<String> {
        let mut tokens = Vec::new();
        self.collect_tokens(id, &mut tokens)?;
        Ok(tokens.join(" "))
    }

    fn collect_tokens<'a>(&'a self, id: NodeId, tokens: &mut Vec<&'a str>) -> crate::Result<()> {
        let node = self.get(id)?;
        if node.is_terminal() {
            tokens.push(unescape_bracket(&node.label));
        } else {
            for &child in &node.children {
                self.collect_tokens(child, tokens)?;
            }
        }
        Ok(())
    }

    /// Surface string of the whole sentence containing `id`.
    pub fn sentence(&self, id: NodeId) -> crate::Result<String> {
        self.substring(self.root_id(id)?)
    }

    /// Text diagram of the tree containing `id`, with `id` marked by `*`.
    pub fn draw(&self, id: NodeId) -> crate::Result<String> {
        let root = self.root_id(id)?;
        let mut out = String::new();
        self.draw_node(root, id, "", "", &mut out)?;
        Ok(out)
    }

    fn draw_node(
        &self,
        id: NodeId,
        marked: NodeId,
        lead: &str,
        child_lead: &str,
        out: &mut String,
    ) -> crate::Result<()> {
        let node = self.get(id)?;
        out.push_str(lead);
        out.push_str(&node.label);
        if id == marked {
            out.push_str(" *");
        }
        out.push('\n');

        let last = node.children.len().saturating_sub(1);
        for (i, &child) in node.children.iter().enumerate() {
            let (branch, extension) = if i == last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            self.draw_node(
                child,
                marked,
                &format!("{child_lead}{branch}"),
                &format!("{child_lead}{extension}"),
                out,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAT: &str = "(S (NP (DT The) (NN cat)) (VP (VBD sat)))";

    fn store_from(text: &str) -> NodeStore {
        let mut store = NodeStore::default();
        store.parse_text(text, Path::new("test.mrg")).unwrap();
        store
    }

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn parses_every_token_into_a_node() {
        let store = store_from(CAT);
        assert_eq!(store.len(), 9);
        assert_eq!(store.tree_count(), 1);

        let root = store.get(1001).unwrap();
        assert_eq!(root.label, "S");
        assert_eq!(root.parent, None);
        assert_eq!(root.children, vec![1002, 1007]);

        let labels: Vec<&str> = store.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["S", "NP", "DT", "The", "NN", "cat", "VP", "VBD", "sat"]
        );
    }

    #[test]
    fn sentence_and_subtree_of_example() {
        let store = store_from(CAT);
        assert_eq!(store.sentence(1001).unwrap(), "The cat sat");
        assert_eq!(store.sentence(1006).unwrap(), "The cat sat");
        assert_eq!(store.subtree(1002, 0).unwrap(), "(NP (DT The) (NN cat))");
        assert_eq!(store.substring(1002).unwrap(), "The cat");
        assert_eq!(store.subtree(1004, 0).unwrap(), "The");
    }

    #[test]
    fn full_tree_round_trips_without_indent() {
        let text = "(ROOT (S (NP (NNP John)) (VP (VBZ loves) (NP (NNP Mary))) (. .)))";
        let store = store_from(text);
        assert_eq!(store.full_tree(1005, 0).unwrap(), text);

        let spaced = "  (S   (NP (DT a)  (NN b))\t(VP (VB c)))  ";
        let store = store_from(spaced);
        assert_eq!(store.full_tree(1004, 0).unwrap(), normalize(spaced));
    }

    #[test]
    fn indented_subtree_keeps_preterminals_inline() {
        let store = store_from(CAT);
        assert_eq!(
            store.full_tree(1009, 2).unwrap(),
            "(S\n  (NP\n    (DT The)\n    (NN cat))\n  (VP\n    (VBD sat)))"
        );
        assert_eq!(store.subtree(1003, 2).unwrap(), "(DT The)");
        assert!(!store.full_tree(1001, 0).unwrap().contains('\n'));
    }

    #[test]
    fn trees_are_partitioned_by_offset() {
        let store = store_from(&format!("{CAT}\n\n(S (X y))\n"));
        assert_eq!(store.tree_count(), 2);
        assert!(store.ids().filter(|&id| id < 2000).all(|id| id > 1000));
        assert_eq!(store.get(2001).unwrap().label, "S");
        assert_eq!(store.get(2003).unwrap().label, "y");
        assert_eq!(store.sentence(2002).unwrap(), "y");
    }

    #[test]
    fn parent_child_links_are_consistent() {
        let store = store_from(&format!(
            "{CAT}\n(ROOT (S (NP (PRP It)) (VP (VBD rose) (PP (IN by) (NP (CD 5) (NN %))))))"
        ));
        for node in store.iter() {
            assert_eq!(node.is_terminal(), node.children.is_empty());
            if let Some(parent) = node.parent {
                let siblings = &store.get(parent).unwrap().children;
                assert_eq!(siblings.iter().filter(|&&c| c == node.id).count(), 1);
            }
            for &child in &node.children {
                assert_eq!(store.get(child).unwrap().parent, Some(node.id));
            }
        }
    }

    #[test]
    fn bracket_escapes_are_restored_in_strings_only() {
        let store = store_from("(S (-LRB- -LRB-) (NN aside) (-RRB- -RRB-) (-LCB- -LCB-))");
        assert_eq!(store.sentence(1001).unwrap(), "( aside ) {");
        assert_eq!(store.get(1003).unwrap().label, "-LRB-");
        assert_eq!(
            store.full_tree(1001, 0).unwrap(),
            "(S (-LRB- -LRB-) (NN aside) (-RRB- -RRB-) (-LCB- -LCB-))"
        );
        assert_eq!(unescape_bracket("-LSB-"), "[");
        assert_eq!(unescape_bracket("-RSB-"), "]");
        assert_eq!(unescape_bracket("word"), "word");
    }

    #[test]
    fn unknown_node_is_an_error() {
        let store = store_from(CAT);
        assert!(matches!(
            store.subtree(1010, 0),
            Err(TredevError::UnknownNode(1010))
        ));
        assert!(matches!(store.sentence(7), Err(TredevError::UnknownNode(7))));
    }

    #[test]
    fn oversized_tree_is_rejected() {
        let mut line = String::from("(S");
        for _ in 0..NODE_OFFSET {
            line.push_str(" (X x)");
        }
        line.push(')');
        let mut store = NodeStore::default();
        let err = store.parse_text(&line, Path::new("big.mrg")).unwrap_err();
        assert!(matches!(err, TredevError::TreeTooLarge { tree: 1, .. }));
    }

    #[test]
    fn node_id_mapping_is_collision_free() {
        let mut seen = std::collections::HashSet::new();
        for tree_n in 1..20 {
            for node_n in 1..NODE_OFFSET {
                let id = node_id(tree_n, node_n);
                assert!(seen.insert(id));
                assert_eq!(split_node_id(id), (tree_n, node_n));
            }
        }
    }

    #[test]
    fn from_nodes_restores_tree_count() {
        let store = store_from(&format!("{CAT}\n{CAT}"));
        let restored = NodeStore::from_nodes(store.iter().cloned());
        assert_eq!(restored, store);
        assert_eq!(restored.tree_count(), 2);
    }

    #[test]
    fn draw_marks_the_selected_node() {
        let store = store_from("(S (NP (NN it)) (VP (VBD rose)))");
        let drawing = store.draw(1002).unwrap();
        assert_eq!(
            drawing,
            "S\n├── NP *\n│   └── NN\n│       └── it\n└── VP\n    └── VBD\n        └── rose\n"
        );
    }
}
