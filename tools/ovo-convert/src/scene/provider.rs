use ovo_common::formats::RawChunk;

use super::{LightRecord, MaterialRecord, MeshRecord, NodeId, Scene, SceneNode};

/// Read-only view of a host scene.
///
/// The exporter never mutates the provider; everything it needs is pulled
/// through these accessors as plain records.
pub trait SceneProvider {
    /// Every node, in host order. Roots are exported in this order.
    fn nodes(&self) -> &[SceneNode];

    fn mesh(&self, id: NodeId) -> Option<&MeshRecord>;

    fn light(&self, id: NodeId) -> Option<&LightRecord>;

    fn material(&self, name: &str) -> Option<&MaterialRecord>;

    /// Every material, in host order. Materials no exported mesh uses are
    /// written after the node stream in this order.
    fn materials(&self) -> &[MaterialRecord];

    /// Opaque chunks to re-emit after the node stream.
    fn extra_chunks(&self) -> &[RawChunk] {
        &[]
    }
}

impl SceneProvider for Scene {
    fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    fn mesh(&self, id: NodeId) -> Option<&MeshRecord> {
        self.meshes.get(&id)
    }

    fn light(&self, id: NodeId) -> Option<&LightRecord> {
        self.lights.get(&id)
    }

    fn material(&self, name: &str) -> Option<&MaterialRecord> {
        Scene::material(self, name)
    }

    fn materials(&self) -> &[MaterialRecord] {
        &self.materials
    }

    fn extra_chunks(&self) -> &[RawChunk] {
        &self.extra_chunks
    }
}
