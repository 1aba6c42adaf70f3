//! Named set of controls, usually everything bound to one character

use super::anim_control::AnimControl;

/// Controls stored by name, with helpers to drive them together.
///
/// Dropping a control from the collection releases that handle; the control
/// itself goes away when no other handle holds it.
#[derive(Clone, Debug, Default)]
pub struct AnimControlCollection {
    controls: Vec<(String, AnimControl)>,
    last_started: Option<String>,
}

impl AnimControlCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a control under `name`, replacing any control already there
    pub fn store_anim(&mut self, control: AnimControl, name: impl Into<String>) {
        let name = name.into();
        match self.controls.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = control,
            None => self.controls.push((name, control)),
        }
    }

    pub fn find_anim(&self, name: &str) -> Option<&AnimControl> {
        self.controls.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Remove a control. Returns false if there was none by that name.
    pub fn unbind_anim(&mut self, name: &str) -> bool {
        let Some(pos) = self.controls.iter().position(|(n, _)| n == name) else {
            return false;
        };
        self.controls.remove(pos);
        if self.last_started.as_deref() == Some(name) {
            self.last_started = None;
        }
        true
    }

    pub fn num_anims(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn anim(&self, n: usize) -> Option<&AnimControl> {
        self.controls.get(n).map(|(_, c)| c)
    }

    pub fn anim_name(&self, n: usize) -> Option<&str> {
        self.controls.get(n).map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnimControl)> {
        self.controls.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn clear_anims(&mut self) {
        self.controls.clear();
        self.last_started = None;
    }

    fn start(&mut self, name: &str, f: impl FnOnce(&AnimControl)) -> bool {
        let Some(control) = self.find_anim(name) else {
            return false;
        };
        f(control);
        self.last_started = Some(name.to_string());
        true
    }

    pub fn play(&mut self, name: &str) -> bool {
        self.start(name, |c| c.play())
    }

    pub fn play_range(&mut self, name: &str, from: f64, to: f64) -> bool {
        self.start(name, |c| c.play_range(from, to))
    }

    pub fn loop_anim(&mut self, name: &str, restart: bool) -> bool {
        self.start(name, |c| c.loop_anim(restart))
    }

    pub fn loop_range(&mut self, name: &str, restart: bool, from: f64, to: f64) -> bool {
        self.start(name, |c| c.loop_range(restart, from, to))
    }

    pub fn pose(&mut self, name: &str, frame: f64) -> bool {
        self.start(name, |c| c.pose(frame))
    }

    pub fn stop(&self, name: &str) -> bool {
        match self.find_anim(name) {
            Some(control) => {
                control.stop();
                true
            }
            None => false,
        }
    }

    pub fn play_all(&mut self) {
        for (_, control) in &self.controls {
            control.play();
        }
        self.last_started = self.controls.last().map(|(n, _)| n.clone());
    }

    pub fn loop_all(&mut self, restart: bool) {
        for (_, control) in &self.controls {
            control.loop_anim(restart);
        }
        self.last_started = self.controls.last().map(|(n, _)| n.clone());
    }

    /// Stop everything. Returns true if anything was playing.
    pub fn stop_all(&self) -> bool {
        let mut any = false;
        for (_, control) in &self.controls {
            if control.is_playing() {
                any = true;
            }
            control.stop();
        }
        any
    }

    pub fn pose_all(&mut self, frame: f64) {
        for (_, control) in &self.controls {
            control.pose(frame);
        }
        self.last_started = self.controls.last().map(|(n, _)| n.clone());
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.find_anim(name).is_some_and(|c| c.is_playing())
    }

    /// Current frame of a named control
    pub fn frame(&self, name: &str) -> Option<usize> {
        self.find_anim(name).map(|c| c.frame())
    }

    pub fn num_frames(&self, name: &str) -> Option<usize> {
        self.find_anim(name).map(|c| c.num_frames())
    }

    /// The control most recently started through this collection
    pub fn last_started(&self) -> Option<&AnimControl> {
        self.last_started.as_deref().and_then(|n| self.find_anim(n))
    }

    /// Space-separated names of the playing controls, each with its frame
    pub fn which_anim_playing(&self) -> String {
        self.controls
            .iter()
            .filter(|(_, c)| c.is_playing())
            .map(|(n, c)| format!("{n}:{}", c.frame()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::AnimBundle;
    use crate::bind::HierarchyMatchFlags;
    use crate::core::{AnimClock, ChanConfig};
    use crate::part::{PartBundle, PartSubset, PartTree};
    use std::sync::Arc;

    fn setup() -> (AnimClock, PartBundle, AnimControlCollection) {
        let clock = AnimClock::manual();
        let mut tree = PartTree::new("actor");
        tree.add_joint(PartTree::ROOT, "hips", glam::Mat4::IDENTITY).unwrap();
        let bundle = PartBundle::new(tree, &ChanConfig::default(), clock.clone());

        let mut collection = AnimControlCollection::new();
        for (name, frames) in [("walk", 10), ("run", 20)] {
            let anim = Arc::new(AnimBundle::new("actor", 10.0, frames));
            let control = bundle
                .bind_anim(anim, HierarchyMatchFlags::OK_PART_EXTRA, &PartSubset::new())
                .unwrap();
            collection.store_anim(control, name);
        }
        (clock, bundle, collection)
    }

    #[test]
    fn test_store_find_unbind() {
        let (_clock, _bundle, mut collection) = setup();
        assert_eq!(collection.num_anims(), 2);
        assert_eq!(collection.num_frames("run"), Some(20));
        assert_eq!(collection.anim_name(0), Some("walk"));
        assert!(collection.unbind_anim("walk"));
        assert!(!collection.unbind_anim("walk"));
        assert!(collection.find_anim("walk").is_none());
    }

    #[test]
    fn test_play_and_report() {
        let (clock, _bundle, mut collection) = setup();
        assert!(collection.loop_anim("run", true));
        assert!(!collection.play("jump"));
        clock.advance(0.5);

        assert_eq!(collection.which_anim_playing(), "run:5");
        assert_eq!(collection.last_started().map(|c| c.name().to_string()), Some("actor".to_string()));
        assert!(collection.stop_all());
        assert!(!collection.stop_all());
        assert_eq!(collection.frame("run"), Some(5));
    }
}
