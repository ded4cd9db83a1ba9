//! Selection Generalizer (design §4.8): infers a structural selector from
//! an example set of nodes and expands it to every matching node.

use std::collections::HashSet;

use crate::index::Index;
use crate::types::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorKind {
    Element,
    Value,
}

#[derive(Debug, Clone)]
struct Selector {
    tag: Option<String>,
    depth: Option<usize>,
    kind: Option<SelectorKind>,
}

impl Selector {
    fn is_degenerate(&self) -> bool {
        self.tag.is_none() && self.depth.is_none()
    }

    fn matches(&self, index: &Index, id: NodeId, depth: usize) -> bool {
        if let Some(d) = self.depth {
            if d != depth {
                return false;
            }
        }

        let Some(node) = index.node(id) else { return false };
        match (&self.tag, node) {
            (Some(tag), crate::node::NodeSnapshot::Element { tag: actual, .. }) => {
                if actual != tag {
                    return false;
                }
            }
            (Some(_), _) => return false,
            (None, _) => {}
        }

        match self.kind {
            Some(SelectorKind::Element) => matches!(node, crate::node::NodeSnapshot::Element { .. }),
            Some(SelectorKind::Value) => matches!(node, crate::node::NodeSnapshot::Value { .. }),
            None => true,
        }
    }
}

/// Generalizes `selection` into every node matching the inferred selector
/// (design §4.8). Returns the input unchanged if the selector would be
/// degenerate (neither `tag` nor `depth` constrained), and empty if the
/// input is empty.
pub fn generalize(index: &Index, selection: &[NodeId]) -> Vec<NodeId> {
    if selection.is_empty() {
        return Vec::new();
    }

    let mut lca = lowest_common_ancestor(index, selection);

    if selection.len() == 1 {
        if let Some(parent) = index.parent(lca) {
            lca = parent;
        } else {
            return vec![selection[0]];
        }
    }

    let mut tags: HashSet<String> = HashSet::new();
    let mut depths: HashSet<usize> = HashSet::new();
    let mut has_value = false;
    let mut has_element = false;

    for &id in selection {
        let depth = depth_from(index, lca, id);
        depths.insert(depth);
        match index.node(id) {
            Some(crate::node::NodeSnapshot::Element { tag, .. }) => {
                tags.insert(tag.clone());
                has_element = true;
            }
            Some(crate::node::NodeSnapshot::Value { .. }) => {
                has_value = true;
            }
            _ => {}
        }
    }

    let tag = if tags.len() == 1 && !has_value { tags.into_iter().next() } else { None };
    let depth = if depths.len() == 1 { depths.into_iter().next() } else { None };
    let kind = if has_element && !has_value {
        Some(SelectorKind::Element)
    } else if has_value && !has_element {
        Some(SelectorKind::Value)
    } else {
        None
    };

    let selector = Selector { tag, depth, kind };
    if selector.is_degenerate() {
        return selection.to_vec();
    }

    expand(index, lca, &selector)
}

fn lowest_common_ancestor(index: &Index, ids: &[NodeId]) -> NodeId {
    let root = index.root().expect("index always has a root once rebuilt");

    let ancestor_chain = |id: NodeId| -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = index.parent(current) {
            chain.push(parent);
            current = parent;
        }
        chain
    };

    let mut common: HashSet<NodeId> = ancestor_chain(ids[0]).into_iter().collect();
    for &id in &ids[1..] {
        let chain: HashSet<NodeId> = ancestor_chain(id).into_iter().collect();
        common = common.intersection(&chain).copied().collect();
    }

    if common.is_empty() {
        return root;
    }

    // Deepest common ancestor: the one with the longest chain from `ids[0]`
    // (every ancestor of ids[0] is itself an ancestor chain prefix, so the
    // first one found walking from ids[0] upward that's in `common` is the
    // deepest, i.e. the LCA).
    let mut current = ids[0];
    loop {
        if common.contains(&current) {
            return current;
        }
        match index.parent(current) {
            Some(parent) => current = parent,
            None => return root,
        }
    }
}

fn depth_from(index: &Index, ancestor: NodeId, mut id: NodeId) -> usize {
    let mut depth = 0;
    while id != ancestor {
        match index.parent(id) {
            Some(parent) => {
                id = parent;
                depth += 1;
            }
            None => break,
        }
    }
    depth
}

/// DFS from `lca`, tracking current depth (design §4.8 step 4).
fn expand(index: &Index, lca: NodeId, selector: &Selector) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<(NodeId, usize)> = vec![(lca, 0)];

    while let Some((id, depth)) = stack.pop() {
        if depth > 0 && selector.matches(index, id, depth) {
            out.push(id);
        }
        for &child in index.children(id).iter().rev() {
            stack.push((child, depth + 1));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeSpec;
    use crate::substrate::{LoroSubstrate, Substrate};
    use std::collections::BTreeMap;

    fn element(tag: &str) -> NodeSpec {
        NodeSpec::Element { tag: tag.to_string(), attrs: BTreeMap::new() }
    }

    #[test]
    fn single_node_selection_generalizes_to_its_siblings_by_tag_and_depth() {
        let (substrate, root) = LoroSubstrate::new(1).unwrap();

        let mut articles = Vec::new();
        for _ in 0..2 {
            let article = substrate.create_node(Some(root), None).unwrap();
            substrate.init_node(article, &element("article")).unwrap();
            let h2 = substrate.create_node(Some(article), None).unwrap();
            substrate.init_node(h2, &element("h2")).unwrap();
            let p = substrate.create_node(Some(article), None).unwrap();
            substrate.init_node(p, &element("p")).unwrap();
            substrate.commit("local");
            articles.push((article, h2, p));
        }

        let index = Index::rebuild(&substrate);
        let (_, first_h2, _) = articles[0];
        let result = generalize(&index, &[first_h2]);

        assert_eq!(result.len(), 2);
        assert!(result.contains(&articles[0].1));
        assert!(result.contains(&articles[1].1));
    }

    #[test]
    fn empty_selection_returns_empty() {
        let (substrate, _root) = LoroSubstrate::new(1).unwrap();
        let index = Index::rebuild(&substrate);
        assert!(generalize(&index, &[]).is_empty());
    }
}
