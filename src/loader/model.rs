//! Minimal scene holder: a tree of named nodes that may carry bundles

use std::fmt;
use std::sync::Arc;

use crate::anim::AnimBundle;
use crate::part::PartBundle;

/// What a model node holds
#[derive(Clone, Default)]
pub enum ModelContent {
    #[default]
    Empty,
    Anim(Arc<AnimBundle>),
    Part(PartBundle),
}

/// A node of a loaded model
#[derive(Clone, Default)]
pub struct ModelNode {
    name: String,
    content: ModelContent,
    children: Vec<ModelNode>,
}

impl ModelNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A node holding an animation
    pub fn with_anim(name: impl Into<String>, anim: Arc<AnimBundle>) -> Self {
        Self {
            name: name.into(),
            content: ModelContent::Anim(anim),
            children: Vec::new(),
        }
    }

    /// A node holding a character's skeleton
    pub fn with_part(name: impl Into<String>, part: PartBundle) -> Self {
        Self {
            name: name.into(),
            content: ModelContent::Part(part),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &ModelContent {
        &self.content
    }

    pub fn children(&self) -> &[ModelNode] {
        &self.children
    }

    pub fn add_child(&mut self, child: ModelNode) -> &mut Self {
        self.children.push(child);
        self
    }

    /// First animation found depth-first
    pub fn find_anim_bundle(&self) -> Option<Arc<AnimBundle>> {
        if let ModelContent::Anim(anim) = &self.content {
            return Some(Arc::clone(anim));
        }
        self.children.iter().find_map(|c| c.find_anim_bundle())
    }

    /// Every bundle under this node, depth-first. Animations come with the
    /// name of the node holding them.
    pub fn collect_bundles(&self, anims: &mut Vec<(String, Arc<AnimBundle>)>, parts: &mut Vec<PartBundle>) {
        match &self.content {
            ModelContent::Anim(anim) => anims.push((self.name.clone(), Arc::clone(anim))),
            ModelContent::Part(part) => parts.push(part.clone()),
            ModelContent::Empty => {}
        }
        for child in &self.children {
            child.collect_bundles(anims, parts);
        }
    }
}

impl fmt::Debug for ModelNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = match &self.content {
            ModelContent::Empty => "empty".to_string(),
            ModelContent::Anim(anim) => format!("anim {}", anim.name()),
            ModelContent::Part(part) => format!("part {}", part.name()),
        };
        f.debug_struct("ModelNode")
            .field("name", &self.name)
            .field("content", &content)
            .field("children", &self.children)
            .finish()
    }
}
