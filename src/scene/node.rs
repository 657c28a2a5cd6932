use glam::Affine3A;

use crate::scene::NodeHandle;
use crate::scene::drawable::Drawable;
use crate::scene::layers::Layers;
use crate::scene::light::Light;
use crate::scene::transform::Transform;

/// What a node contributes to a frame.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Pure hierarchy node. A non-zero `group_order` sorts every drawable
    /// below it as one block.
    Group { group_order: i32 },
    Drawable(Box<Drawable>),
    Light(Light),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,
    pub transform: Transform,
    /// Invisible nodes are skipped together with their subtree.
    pub visible: bool,
    pub layers: Layers,
    pub kind: NodeKind,
}

impl Node {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            name: String::new(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            visible: true,
            layers: Layers::default(),
            kind,
        }
    }

    #[must_use]
    pub fn group() -> Self {
        Self::new(NodeKind::Group { group_order: 0 })
    }

    #[must_use]
    pub fn drawable(drawable: Drawable) -> Self {
        Self::new(NodeKind::Drawable(Box::new(drawable)))
    }

    #[must_use]
    pub fn light(light: Light) -> Self {
        Self::new(NodeKind::Light(light))
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.transform.world_matrix
    }

    #[must_use]
    pub fn as_drawable(&self) -> Option<&Drawable> {
        match &self.kind {
            NodeKind::Drawable(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_drawable_mut(&mut self) -> Option<&mut Drawable> {
        match &mut self.kind {
            NodeKind::Drawable(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_light(&self) -> Option<&Light> {
        match &self.kind {
            NodeKind::Light(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_light_mut(&mut self) -> Option<&mut Light> {
        match &mut self.kind {
            NodeKind::Light(l) => Some(l),
            _ => None,
        }
    }
}
