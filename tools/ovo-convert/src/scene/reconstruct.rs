//! Index-based tree rebuild for the importer.

use hashbrown::{HashMap, HashSet};
use ovo_common::formats::NodeHeader;

use super::{NodeId, NodeKind, Scene, SceneNode};
use crate::error::ImportError;
use crate::report::{Report, Warning};

/// Incrementally rebuilds a [`Scene`] from node records in stream order.
///
/// Node `i` of the stream gets `NodeId(i)`. A node may only reference a
/// parent that was added before it, so the tree is complete after a single
/// pass.
#[derive(Debug, Default)]
pub struct SceneBuilder {
    scene: Scene,
    /// Names in use under each parent (None = roots)
    sibling_names: HashMap<Option<u32>, HashSet<String>>,
    /// Declared child count and chunk offset per node
    declared: Vec<(u32, u64)>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> u32 {
        self.scene.nodes.len() as u32
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn unique_name(&mut self, parent: Option<u32>, name: &str) -> String {
        let used = self.sibling_names.entry(parent).or_default();
        if name.is_empty() || used.insert(name.to_owned()) {
            return name.to_owned();
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{name}.{n:03}");
            if used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Append a node as the last child of its declared parent.
    ///
    /// `offset` is the byte offset of the node's chunk, used in errors.
    pub fn add_node(
        &mut self,
        header: &NodeHeader,
        kind: NodeKind,
        offset: u64,
        report: &mut Report,
    ) -> Result<NodeId, ImportError> {
        let index = self.node_count();
        if let Some(parent) = header.parent {
            if parent >= index {
                return Err(ImportError::DanglingParentReference {
                    index,
                    name: header.name.clone(),
                    parent,
                    offset,
                });
            }
        }

        let name = self.unique_name(header.parent, &header.name);
        if name != header.name {
            report.push(Warning::NameDisambiguated {
                index,
                original: header.name.clone(),
                renamed: name.clone(),
            });
        }

        let id = NodeId(index);
        let parent = header.parent.map(NodeId);
        if let Some(NodeId(p)) = parent {
            self.scene.nodes[p as usize].children.push(id);
        }
        self.scene.nodes.push(SceneNode {
            id,
            name,
            kind,
            local_transform: header.transform,
            parent,
            children: Vec::new(),
        });
        self.declared.push((header.child_count, offset));
        Ok(id)
    }

    /// Validate declared child counts and hand over the scene.
    pub fn finish(self) -> Result<Scene, ImportError> {
        for (node, &(declared, offset)) in self.scene.nodes.iter().zip(&self.declared) {
            if node.children.len() as u32 != declared {
                return Err(ImportError::malformed(
                    offset,
                    format!(
                        "node '{}' declares {declared} children, stream has {}",
                        node.name,
                        node.children.len()
                    ),
                ));
            }
        }
        Ok(self.scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn header(name: &str, parent: Option<u32>, child_count: u32) -> NodeHeader {
        NodeHeader {
            name: name.into(),
            parent,
            child_count,
            transform: Mat4::IDENTITY,
        }
    }

    #[test]
    fn test_builds_tree_in_stream_order() {
        let mut b = SceneBuilder::new();
        let mut report = Report::new();
        b.add_node(&header("root", None, 2), NodeKind::Empty, 24, &mut report).unwrap();
        b.add_node(&header("a", Some(0), 0), NodeKind::Mesh, 100, &mut report).unwrap();
        b.add_node(&header("b", Some(0), 0), NodeKind::Light, 200, &mut report).unwrap();
        let scene = b.finish().unwrap();

        assert_eq!(scene.nodes[0].children, vec![NodeId(1), NodeId(2)]);
        assert_eq!(scene.nodes[2].parent, Some(NodeId(0)));
        assert!(report.is_empty());
    }

    #[test]
    fn test_forward_parent_is_dangling() {
        let mut b = SceneBuilder::new();
        let mut report = Report::new();
        b.add_node(&header("root", None, 0), NodeKind::Empty, 24, &mut report).unwrap();
        let err = b
            .add_node(&header("child", Some(5), 0), NodeKind::Empty, 96, &mut report)
            .unwrap_err();
        match err {
            ImportError::DanglingParentReference {
                index,
                name,
                parent,
                offset,
            } => {
                assert_eq!((index, parent, offset), (1, 5, 96));
                assert_eq!(name, "child");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_self_parent_is_dangling() {
        let mut b = SceneBuilder::new();
        let err = b
            .add_node(&header("loop", Some(0), 0), NodeKind::Empty, 24, &mut Report::new())
            .unwrap_err();
        assert!(matches!(err, ImportError::DanglingParentReference { .. }));
    }

    #[test]
    fn test_sibling_names_disambiguated() {
        let mut b = SceneBuilder::new();
        let mut report = Report::new();
        b.add_node(&header("root", None, 3), NodeKind::Empty, 0, &mut report).unwrap();
        for _ in 0..3 {
            b.add_node(&header("box", Some(0), 0), NodeKind::Empty, 0, &mut report).unwrap();
        }
        // Same name under a different parent is fine
        b.add_node(&header("box", None, 0), NodeKind::Empty, 0, &mut report).unwrap();
        let scene = b.finish().unwrap();

        let names: Vec<_> = scene.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["root", "box", "box.001", "box.002", "box"]);
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_child_count_mismatch() {
        let mut b = SceneBuilder::new();
        let mut report = Report::new();
        b.add_node(&header("root", None, 2), NodeKind::Empty, 24, &mut report).unwrap();
        b.add_node(&header("a", Some(0), 0), NodeKind::Empty, 80, &mut report).unwrap();
        let err = b.finish().unwrap_err();
        assert_eq!(err.offset(), Some(24));
    }
}
