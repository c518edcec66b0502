//! Bar-quantized pattern, scene and clip changes

use serde::{Deserialize, Serialize};

use crate::limits::MAX_QUEUED_CHANGES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Pattern,
    Scene,
    /// Launch (target set) or stop (target `None`) a player's clip
    Clip,
}

/// A change waiting for its trigger bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedChange {
    pub kind: ChangeKind,
    /// Pattern or scene index
    pub target_index: Option<usize>,
    pub player_index: Option<usize>,
    pub quantization_bars: u32,
    pub trigger_bar: u64,
}

/// Fixed-capacity queue of changes applied at bar boundaries
#[derive(Debug, Clone)]
pub struct PatternChangeScheduler {
    queue: Vec<QueuedChange>,
    matured: Vec<QueuedChange>,
}

impl Default for PatternChangeScheduler {
    fn default() -> Self {
        Self {
            queue: Vec::with_capacity(MAX_QUEUED_CHANGES),
            matured: Vec::with_capacity(MAX_QUEUED_CHANGES),
        }
    }
}

impl PatternChangeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// First bar boundary strictly after `current_bar` that is a multiple of
    /// `quantization_bars`
    pub fn next_boundary(current_bar: u64, quantization_bars: u32) -> u64 {
        let q = quantization_bars.max(1) as u64;
        (current_bar / q + 1) * q
    }

    /// Queue a change for `trigger_bar`. Bars that have already started are
    /// moved to the next boundary. Returns the bar actually used, or `None`
    /// when the queue is full.
    pub fn schedule(
        &mut self,
        kind: ChangeKind,
        target_index: Option<usize>,
        player_index: Option<usize>,
        quantization_bars: u32,
        trigger_bar: u64,
        current_bar: u64,
    ) -> Option<u64> {
        if self.queue.len() >= MAX_QUEUED_CHANGES {
            return None;
        }
        let trigger_bar = if trigger_bar <= current_bar {
            Self::next_boundary(current_bar, quantization_bars)
        } else {
            trigger_bar
        };
        self.queue.push(QueuedChange {
            kind,
            target_index,
            player_index,
            quantization_bars: quantization_bars.max(1),
            trigger_bar,
        });
        Some(trigger_bar)
    }

    /// Queue a change at the next quantized boundary after `current_bar`
    pub fn schedule_quantized(
        &mut self,
        kind: ChangeKind,
        target_index: Option<usize>,
        player_index: Option<usize>,
        quantization_bars: u32,
        current_bar: u64,
    ) -> Option<u64> {
        let bar = Self::next_boundary(current_bar, quantization_bars);
        self.schedule(kind, target_index, player_index, quantization_bars, bar, current_bar)
    }

    /// Move every change due at or before `bar` to the matured list, in
    /// enqueue order. Returns how many matured.
    pub fn collect_matured(&mut self, bar: u64) -> usize {
        self.matured.clear();
        let matured = &mut self.matured;
        self.queue.retain(|change| {
            if change.trigger_bar <= bar {
                matured.push(*change);
                false
            } else {
                true
            }
        });
        self.matured.len()
    }

    /// The `index`th change from the last `collect_matured`
    pub fn matured(&self, index: usize) -> Option<QueuedChange> {
        self.matured.get(index).copied()
    }

    /// Drop queued changes for one player, or all of them
    pub fn clear(&mut self, player: Option<usize>) {
        match player {
            Some(p) => self.queue.retain(|c| c.player_index != Some(p)),
            None => self.queue.clear(),
        }
    }

    pub fn pending(&self) -> &[QueuedChange] {
        &self.queue
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_boundary() {
        assert_eq!(PatternChangeScheduler::next_boundary(0, 1), 1);
        assert_eq!(PatternChangeScheduler::next_boundary(5, 4), 8);
        assert_eq!(PatternChangeScheduler::next_boundary(8, 4), 12);
        assert_eq!(PatternChangeScheduler::next_boundary(3, 0), 4);
    }

    #[test]
    fn test_past_bars_move_forward() {
        let mut scheduler = PatternChangeScheduler::new();
        let bar = scheduler.schedule(ChangeKind::Pattern, Some(2), Some(0), 1, 3, 5);
        assert_eq!(bar, Some(6));
        let bar = scheduler.schedule(ChangeKind::Pattern, Some(2), Some(0), 1, 9, 5);
        assert_eq!(bar, Some(9));
        assert!(scheduler.pending().iter().all(|c| c.trigger_bar > 5));
    }

    #[test]
    fn test_matured_in_enqueue_order() {
        let mut scheduler = PatternChangeScheduler::new();
        scheduler.schedule(ChangeKind::Pattern, Some(1), Some(0), 1, 2, 0);
        scheduler.schedule(ChangeKind::Scene, Some(3), None, 1, 4, 0);
        scheduler.schedule(ChangeKind::Pattern, Some(2), Some(1), 1, 2, 0);

        assert_eq!(scheduler.collect_matured(1), 0);
        assert_eq!(scheduler.collect_matured(2), 2);
        assert_eq!(scheduler.matured(0).unwrap().player_index, Some(0));
        assert_eq!(scheduler.matured(1).unwrap().player_index, Some(1));
        assert_eq!(scheduler.pending().len(), 1);
        assert_eq!(scheduler.collect_matured(4), 1);
        assert_eq!(scheduler.matured(0).unwrap().kind, ChangeKind::Scene);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_clear_by_player() {
        let mut scheduler = PatternChangeScheduler::new();
        scheduler.schedule(ChangeKind::Pattern, Some(1), Some(0), 1, 2, 0);
        scheduler.schedule(ChangeKind::Clip, None, Some(1), 1, 2, 0);
        scheduler.clear(Some(0));
        assert_eq!(scheduler.pending().len(), 1);
        scheduler.clear(None);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_queue_is_bounded() {
        let mut scheduler = PatternChangeScheduler::new();
        for _ in 0..MAX_QUEUED_CHANGES {
            assert!(scheduler.schedule(ChangeKind::Pattern, Some(0), Some(0), 1, 1, 0).is_some());
        }
        assert!(scheduler.schedule(ChangeKind::Pattern, Some(0), Some(0), 1, 1, 0).is_none());
    }
}
