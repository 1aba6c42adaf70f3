//! Animation sources: where model files come from

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::model::ModelNode;
use crate::anim::{AnimBundle, AnimIndex, MatrixTable, ScalarTable};
use crate::core::Error;

/// Loads a model from a path. Implementations must be usable from loader
/// worker threads.
pub trait AnimSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<ModelNode, Error>;
}

/// One node of an animation file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnimNodeDesc {
    Group {
        name: String,
        #[serde(default)]
        children: Vec<AnimNodeDesc>,
    },
    /// Component tables keyed by letter (`i j k a b c h p r x y z`)
    Matrix {
        name: String,
        #[serde(default)]
        tables: BTreeMap<String, Vec<f32>>,
        #[serde(default)]
        children: Vec<AnimNodeDesc>,
    },
    Scalar {
        name: String,
        #[serde(default)]
        table: Vec<f32>,
        #[serde(default)]
        children: Vec<AnimNodeDesc>,
    },
}

/// An animation file: one anim bundle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimFile {
    pub name: String,
    pub frame_rate: f64,
    pub num_frames: usize,
    #[serde(default)]
    pub children: Vec<AnimNodeDesc>,
}

impl AnimFile {
    /// Build the anim bundle, validating table lengths
    pub fn build(&self) -> Result<AnimBundle, Error> {
        let mut bundle = AnimBundle::new(&self.name, self.frame_rate, self.num_frames);
        for child in &self.children {
            add_node(&mut bundle, AnimBundle::ROOT, child)?;
        }
        Ok(bundle)
    }

    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn add_node(bundle: &mut AnimBundle, parent: AnimIndex, desc: &AnimNodeDesc) -> Result<(), Error> {
    let (index, children) = match desc {
        AnimNodeDesc::Group { name, children } => (bundle.add_group(parent, name)?, children),
        AnimNodeDesc::Matrix { name, tables, children } => {
            let mut table = MatrixTable::new();
            for (key, values) in tables {
                let mut letters = key.chars();
                let (Some(letter), None) = (letters.next(), letters.next()) else {
                    return Err(Error::Runtime(format!("{name}: bad table key {key:?}")));
                };
                table.set_table(letter, values.clone())?;
            }
            (bundle.add_channel(parent, name, table)?, children)
        }
        AnimNodeDesc::Scalar { name, table, children } => {
            (bundle.add_channel(parent, name, ScalarTable::new(table.clone()))?, children)
        }
    };
    for child in children {
        add_node(bundle, index, child)?;
    }
    Ok(())
}

/// Reads [`AnimFile`] JSON documents, resolving relative paths against a
/// search path
#[derive(Clone, Debug, Default)]
pub struct JsonAnimSource {
    search_path: Vec<PathBuf>,
}

impl JsonAnimSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_path.push(dir.into());
        self
    }

    pub fn add_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_path.push(dir.into());
    }

    /// Locate `path` directly or under each search directory in turn
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, Error> {
        if path.is_absolute() || path.exists() {
            return if path.exists() {
                Ok(path.to_path_buf())
            } else {
                Err(Error::NotFound(path.to_path_buf()))
            };
        }
        self.search_path
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| Error::NotFound(path.to_path_buf()))
    }
}

impl AnimSource for JsonAnimSource {
    fn load(&self, path: &Path) -> Result<ModelNode, Error> {
        let resolved = self.resolve(path)?;
        log::debug!("Loading animation from {}", resolved.display());
        let json = fs::read_to_string(&resolved)?;
        let file = AnimFile::from_json_str(&json)?;
        let bundle = file.build()?;

        let stem = resolved
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut root = ModelNode::new(stem);
        root.add_child(ModelNode::with_anim(file.name.clone(), Arc::new(bundle)));
        Ok(root)
    }
}
