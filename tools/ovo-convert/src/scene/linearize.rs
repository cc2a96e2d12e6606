//! Depth-first flattening of the node hierarchy.

use hashbrown::{HashMap, HashSet};

use super::{NodeId, SceneNode};
use crate::error::ExportError;

/// A node's place in the chunk stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearNode {
    /// Position in `SceneProvider::nodes()`.
    pub source: usize,
    pub id: NodeId,
    /// Stream index, assigned in visit order.
    pub index: u32,
    /// Stream index of the parent; always smaller than `index`.
    pub parent: Option<u32>,
    pub child_count: u32,
}

fn invalid(node: &SceneNode, reason: impl Into<String>) -> ExportError {
    ExportError::InvalidHierarchy {
        node: node.name.clone(),
        reason: reason.into(),
    }
}

/// Order nodes for writing: roots in host order, each followed by its
/// subtree in depth-first pre-order.
///
/// Fails with [`ExportError::InvalidHierarchy`] when a child does not point
/// back at the parent listing it, a node is reached twice, or a node is
/// unreachable from every root.
pub fn linearize(nodes: &[SceneNode]) -> Result<Vec<LinearNode>, ExportError> {
    let mut by_id: HashMap<NodeId, usize> = HashMap::with_capacity(nodes.len());
    for (pos, node) in nodes.iter().enumerate() {
        if by_id.insert(node.id, pos).is_some() {
            return Err(invalid(node, format!("duplicate node id {}", node.id)));
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    let mut visited: HashSet<NodeId> = HashSet::with_capacity(nodes.len());
    // (position, parent stream index)
    let mut stack: Vec<(usize, Option<u32>)> = Vec::new();

    for (root_pos, root) in nodes.iter().enumerate().filter(|(_, n)| n.parent.is_none()) {
        stack.push((root_pos, None));
        visited.insert(root.id);

        while let Some((pos, parent)) = stack.pop() {
            let node = &nodes[pos];
            let index = order.len() as u32;
            order.push(LinearNode {
                source: pos,
                id: node.id,
                index,
                parent,
                child_count: node.children.len() as u32,
            });

            // Reverse so the first child is visited first
            for &child_id in node.children.iter().rev() {
                let Some(&child_pos) = by_id.get(&child_id) else {
                    return Err(invalid(node, format!("child {child_id} does not exist")));
                };
                let child = &nodes[child_pos];
                if child.parent != Some(node.id) {
                    return Err(invalid(
                        child,
                        format!("listed as child of '{}' but its parent is {:?}", node.name, child.parent),
                    ));
                }
                if !visited.insert(child_id) {
                    return Err(invalid(child, "reached twice during traversal"));
                }
                stack.push((child_pos, Some(index)));
            }
        }
    }

    if let Some(orphan) = nodes.iter().find(|n| !visited.contains(&n.id)) {
        return Err(invalid(orphan, "not reachable from any root"));
    }

    tracing::debug!("Linearized {} nodes", order.len());
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NodeKind, Scene};
    use glam::Mat4;

    fn tree() -> Scene {
        // a        e
        // ├─ b
        // │  └─ c
        // └─ d
        let mut scene = Scene::new();
        let a = scene.add_node("a", NodeKind::Empty, Mat4::IDENTITY, None);
        let b = scene.add_node("b", NodeKind::Empty, Mat4::IDENTITY, Some(a));
        scene.add_node("c", NodeKind::Empty, Mat4::IDENTITY, Some(b));
        scene.add_node("d", NodeKind::Empty, Mat4::IDENTITY, Some(a));
        scene.add_node("e", NodeKind::Empty, Mat4::IDENTITY, None);
        scene
    }

    fn names(scene: &Scene, order: &[LinearNode]) -> Vec<String> {
        order
            .iter()
            .map(|n| scene.nodes[n.source].name.clone())
            .collect()
    }

    #[test]
    fn test_preorder_with_parent_indices() {
        let scene = tree();
        let order = linearize(&scene.nodes).unwrap();
        assert_eq!(names(&scene, &order), ["a", "b", "c", "d", "e"]);

        let parents: Vec<_> = order.iter().map(|n| n.parent).collect();
        assert_eq!(parents, [None, Some(0), Some(1), Some(0), None]);
        assert_eq!(order[0].child_count, 2);
        for n in &order {
            if let Some(p) = n.parent {
                assert!(p < n.index);
            }
        }
    }

    #[test]
    fn test_host_order_of_roots_is_kept() {
        let mut scene = tree();
        // Move root "e" to the front
        let e = scene.nodes.pop().unwrap();
        scene.nodes.insert(0, e);
        let order = linearize(&scene.nodes).unwrap();
        assert_eq!(names(&scene, &order), ["e", "a", "b", "c", "d"]);
    }

    #[test]
    fn test_mismatched_back_reference() {
        let mut scene = tree();
        // "d" claims "b" as parent, but "a" lists it
        scene.nodes[3].parent = Some(NodeId(1));
        let err = linearize(&scene.nodes).unwrap_err();
        assert!(matches!(err, ExportError::InvalidHierarchy { node, .. } if node == "d"));
    }

    #[test]
    fn test_node_listed_twice() {
        let mut scene = tree();
        scene.nodes[0].children.push(NodeId(1));
        assert!(matches!(
            linearize(&scene.nodes),
            Err(ExportError::InvalidHierarchy { .. })
        ));
    }

    #[test]
    fn test_cycle_is_unreachable() {
        let mut scene = Scene::new();
        let a = scene.add_node("a", NodeKind::Empty, Mat4::IDENTITY, None);
        let b = scene.add_node("b", NodeKind::Empty, Mat4::IDENTITY, Some(a));
        // Make a a child of b: no roots remain
        scene.nodes[0].parent = Some(b);
        scene.nodes[1].children.push(a);
        let err = linearize(&scene.nodes).unwrap_err();
        assert!(matches!(err, ExportError::InvalidHierarchy { .. }));
    }

    #[test]
    fn test_missing_child() {
        let mut scene = tree();
        scene.nodes[4].children.push(NodeId(99));
        assert!(linearize(&scene.nodes).is_err());
    }
}
