//! Scenes: snapshots of every player's clip plus a tempo

use serde::{Deserialize, Serialize};

use crate::limits::{INACTIVE_SCENE, PLAYER_COUNT, SCENE_SLOTS};

/// One player's part of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipState {
    pub active: bool,
    pub pattern_index: usize,
    pub midi_file_name: Option<String>,
    pub volume: f32,
    pub muted: bool,
}

impl Default for ClipState {
    fn default() -> Self {
        Self {
            active: true,
            pattern_index: 0,
            midi_file_name: None,
            volume: 1.0,
            muted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    pub tempo: f64,
    pub clips: [ClipState; PLAYER_COUNT],
}

impl Scene {
    pub fn new(name: &str, tempo: f64) -> Self {
        Self {
            name: name.to_string(),
            tempo,
            clips: std::array::from_fn(|_| ClipState::default()),
        }
    }
}

/// Fixed bank of scene slots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneBank {
    slots: [Option<Scene>; SCENE_SLOTS],
    active: Option<usize>,
}

impl SceneBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a scene, returning whatever the slot held before
    pub fn save(&mut self, index: usize, scene: Scene) -> Option<Option<Scene>> {
        let slot = self.slots.get_mut(index)?;
        Some(slot.replace(scene))
    }

    pub fn get(&self, index: usize) -> Option<&Scene> {
        self.slots.get(index)?.as_ref()
    }

    pub fn is_empty_slot(&self, index: usize) -> bool {
        self.get(index).is_none()
    }

    pub fn clear(&mut self, index: usize) -> Option<Scene> {
        let removed = self.slots.get_mut(index)?.take();
        if self.active == Some(index) {
            self.active = None;
        }
        removed
    }

    /// Mark a stored scene as active. Empty or invalid slots are ignored.
    pub fn set_active(&mut self, index: usize) -> bool {
        if self.get(index).is_none() {
            return false;
        }
        self.active = Some(index);
        true
    }

    /// Active scene, or `INACTIVE_SCENE` when none
    pub fn active_index(&self) -> i32 {
        self.active.map_or(INACTIVE_SCENE, |i| i as i32)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Scene)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_activate() {
        let mut bank = SceneBank::new();
        assert_eq!(bank.active_index(), INACTIVE_SCENE);
        assert!(!bank.set_active(2));

        let mut scene = Scene::new("verse", 98.0);
        scene.clips[3].pattern_index = 5;
        bank.save(2, scene.clone());
        assert!(bank.set_active(2));
        assert_eq!(bank.active_index(), 2);
        assert_eq!(bank.get(2), Some(&scene));
    }

    #[test]
    fn test_invalid_slots_are_ignored() {
        let mut bank = SceneBank::new();
        assert!(bank.save(SCENE_SLOTS, Scene::new("x", 120.0)).is_none());
        assert!(bank.clear(SCENE_SLOTS).is_none());
        assert!(!bank.set_active(SCENE_SLOTS));
    }

    #[test]
    fn test_clearing_active_scene_deactivates() {
        let mut bank = SceneBank::new();
        bank.save(0, Scene::new("intro", 120.0));
        bank.set_active(0);
        assert!(bank.clear(0).is_some());
        assert_eq!(bank.active_index(), INACTIVE_SCENE);
        assert_eq!(bank.iter().count(), 0);
    }
}
