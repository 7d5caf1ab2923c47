//! Node collection along each XPath axis.
//!
//! Every function returns nodes in axis order: document order for forward
//! axes, nearest-first for reverse axes, so predicate positions can be taken
//! straight from the index.

use crate::ast::Axis;
use xform_tree::{NamespaceScope, Navigator, NodeType};

pub fn collect(axis: Axis, node: &Navigator) -> Vec<Navigator> {
    match axis {
        Axis::SelfAxis => vec![node.clone()],
        Axis::Child => node.children(),
        Axis::Attribute => node.attributes(),
        Axis::Namespace => node.namespaces(NamespaceScope::All),
        Axis::Parent => node.parent().into_iter().collect(),
        Axis::Descendant => node.descendants(),
        Axis::DescendantOrSelf => {
            let mut out = vec![node.clone()];
            out.extend(node.descendants());
            out
        }
        Axis::Ancestor => collect_ancestors(node),
        Axis::AncestorOrSelf => {
            let mut out = vec![node.clone()];
            out.extend(collect_ancestors(node));
            out
        }
        Axis::FollowingSibling => collect_siblings(node, Navigator::move_to_next),
        Axis::PrecedingSibling => collect_siblings(node, Navigator::move_to_previous),
        Axis::Following => collect_following(node),
        Axis::Preceding => collect_preceding(node),
    }
}

fn collect_ancestors(node: &Navigator) -> Vec<Navigator> {
    let mut out = Vec::new();
    let mut current = node.clone();
    while current.move_to_parent() {
        out.push(current.clone());
    }
    out
}

fn collect_siblings(node: &Navigator, step: fn(&mut Navigator) -> bool) -> Vec<Navigator> {
    let mut out = Vec::new();
    let mut current = node.clone();
    while step(&mut current) {
        out.push(current.clone());
    }
    out
}

fn is_tree_child(node: &Navigator) -> bool {
    !matches!(node.node_type(), NodeType::Attribute | NodeType::Namespace)
}

fn collect_following(node: &Navigator) -> Vec<Navigator> {
    let mut out = Vec::new();
    let mut anchor = node.clone();
    if !is_tree_child(node) {
        // An attribute or namespace node precedes its element's content.
        if !anchor.move_to_parent() {
            return out;
        }
        out.extend(anchor.descendants());
    }
    loop {
        let mut sibling = anchor.clone();
        while sibling.move_to_next() {
            out.push(sibling.clone());
            out.extend(sibling.descendants());
        }
        if !anchor.move_to_parent() {
            break;
        }
    }
    out
}

fn collect_preceding(node: &Navigator) -> Vec<Navigator> {
    let mut out = Vec::new();
    let mut anchor = node.clone();
    if !is_tree_child(node) && !anchor.move_to_parent() {
        return out;
    }
    loop {
        let mut sibling = anchor.clone();
        while sibling.move_to_previous() {
            out.extend(sibling.descendants().into_iter().rev());
            out.push(sibling.clone());
        }
        if !anchor.move_to_parent() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use xform_tree::Document;

    fn names(nodes: &[Navigator]) -> Vec<String> {
        nodes.iter().map(|n| n.local_name().to_string()).collect()
    }

    fn find(root: &Navigator, name: &str) -> Navigator {
        root.descendants()
            .into_iter()
            .find(|n| n.local_name() == name)
            .unwrap()
    }

    #[test]
    fn test_reverse_axes_are_nearest_first() {
        let root = Document::parse("<a><b><c/></b><d><e/></d></a>", "").unwrap();
        let e = find(&root, "e");
        assert_eq!(names(&collect(Axis::Ancestor, &e)), vec!["d", "a", ""]);
        assert_eq!(names(&collect(Axis::Preceding, &e)), vec!["c", "b"]);
    }

    #[test]
    fn test_following_excludes_descendants() {
        let root = Document::parse("<a><b><c/></b><d><e/></d></a>", "").unwrap();
        let b = find(&root, "b");
        assert_eq!(names(&collect(Axis::Following, &b)), vec!["d", "e"]);
        assert_eq!(names(&collect(Axis::FollowingSibling, &b)), vec!["d"]);
    }

    #[test]
    fn test_following_of_attribute_includes_element_content() {
        let root = Document::parse(r#"<a x="1"><b/></a>"#, "").unwrap();
        let a = find(&root, "a");
        let x = a.attributes().remove(0);
        assert_eq!(names(&collect(Axis::Following, &x)), vec!["b"]);
        assert_eq!(names(&collect(Axis::Parent, &x)), vec!["a"]);
    }
}
