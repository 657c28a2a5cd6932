use glam::{Affine3A, Vec4};
use slotmap::SlotMap;

use crate::assets::{MaterialHandle, TextureHandle};
use crate::scene::NodeHandle;
use crate::scene::fog::Fog;
use crate::scene::node::Node;

/// Scene graph: a forest of nodes plus scene-wide rendering inputs.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: SlotMap<NodeHandle, Node>,
    roots: Vec<NodeHandle>,
    pub fog: Option<Fog>,
    /// Clear color override for frames rendering this scene.
    pub background: Option<Vec4>,
    /// Cube environment used by materials without their own env map.
    pub environment: Option<TextureHandle>,
    /// Renders every drawable with this material instead of its own.
    pub override_material: Option<MaterialHandle>,
    /// Update world matrices at the start of each render.
    pub auto_update: bool,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            auto_update: true,
            ..Self::default()
        }
    }

    /// Adds a root node.
    pub fn add(&mut self, node: Node) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.roots.push(handle);
        handle
    }

    /// Adds `node` below `parent`; falls back to a root node when `parent`
    /// does not exist.
    pub fn add_child(&mut self, parent: NodeHandle, mut node: Node) -> NodeHandle {
        if !self.nodes.contains_key(parent) {
            return self.add(node);
        }
        node.parent = Some(parent);
        let handle = self.nodes.insert(node);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(handle);
        }
        handle
    }

    /// Removes a node and its subtree.
    pub fn remove(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.remove(handle) else {
            return;
        };
        match node.parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(parent) => parent.children.retain(|&c| c != handle),
            None => self.roots.retain(|&r| r != handle),
        }
        let mut stack = node.children;
        while let Some(child) = stack.pop() {
            if let Some(n) = self.nodes.remove(child) {
                stack.extend(n.children);
            }
        }
    }

    #[must_use]
    pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeHandle, &mut Node)> {
        self.nodes.iter_mut()
    }

    /// Propagates local transforms down the hierarchy.
    pub fn update_world_matrices(&mut self) {
        let mut stack: Vec<(NodeHandle, Affine3A, bool)> = self
            .roots
            .iter()
            .rev()
            .map(|&r| (r, Affine3A::IDENTITY, false))
            .collect();
        while let Some((handle, parent_world, parent_changed)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(handle) else {
                continue;
            };
            let changed = node.transform.update_local_matrix() || parent_changed;
            if changed {
                let world = parent_world * *node.transform.local_matrix();
                node.transform.set_world_matrix(world);
            }
            let world = *node.transform.world_matrix();
            stack.extend(node.children.iter().rev().map(|&c| (c, world, changed)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::transform::Transform;
    use glam::Vec3;

    #[test]
    fn world_matrices_compose_parent_first() {
        let mut scene = Scene::new();
        let parent =
            scene.add(Node::group().with_transform(Transform::from_position(Vec3::X)));
        let child = scene.add_child(
            parent,
            Node::group().with_transform(Transform::from_position(Vec3::Y)),
        );
        scene.update_world_matrices();
        let world = scene.get(child).unwrap().transform.world_position();
        assert_eq!(world, Vec3::new(1.0, 1.0, 0.0));

        scene.get_mut(parent).unwrap().transform.position = Vec3::Z;
        scene.update_world_matrices();
        let world = scene.get(child).unwrap().transform.world_position();
        assert_eq!(world, Vec3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn remove_drops_subtree() {
        let mut scene = Scene::new();
        let parent = scene.add(Node::group());
        let child = scene.add_child(parent, Node::group());
        scene.add_child(child, Node::group());
        scene.remove(parent);
        assert!(scene.is_empty());
        assert!(scene.roots().is_empty());
    }
}
