//! Two-slot frame pair for pipelined dispatch and harvest
//!
//! One frame holds the work unit whose batch is being dispatched, the other
//! the unit whose previous batch is waiting to be inspected. The roles are
//! named explicitly rather than derived from an index parity.

use std::ops::{Index, IndexMut};

/// One of the two work unit slots of a device
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Frame {
    #[default]
    First,
    Second,
}

impl Frame {
    /// The opposite slot
    pub fn other(self) -> Self {
        match self {
            Frame::First => Frame::Second,
            Frame::Second => Frame::First,
        }
    }

    fn index(self) -> usize {
        match self {
            Frame::First => 0,
            Frame::Second => 1,
        }
    }
}

/// Two slots with a dispatch role and a harvest role
#[derive(Clone, Debug, Default)]
pub struct FramePair<T> {
    slots: [T; 2],
    dispatch: Frame,
    harvest: Frame,
}

impl<T> FramePair<T> {
    /// Creates a pair with both roles on the first slot
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            dispatch: Frame::First,
            harvest: Frame::First,
        }
    }

    /// Slot whose unit is dispatched next
    pub fn dispatch(&self) -> Frame {
        self.dispatch
    }

    /// Slot whose ready batch is inspected next
    pub fn harvest(&self) -> Frame {
        self.harvest
    }

    /// Moves the dispatch role to the other slot, leaving the harvest role
    /// where it is. Called before a fresh unit is loaded so the previous
    /// unit's pending batch survives.
    pub fn rotate(&mut self) -> Frame {
        self.dispatch = self.dispatch.other();
        self.dispatch
    }

    /// The batch just read back becomes the one harvested next
    pub fn promote(&mut self) {
        self.harvest = self.dispatch;
    }

    pub fn get(&self, frame: Frame) -> &T {
        &self.slots[frame.index()]
    }

    pub fn get_mut(&mut self, frame: Frame) -> &mut T {
        &mut self.slots[frame.index()]
    }
}

impl<T> Index<Frame> for FramePair<T> {
    type Output = T;

    fn index(&self, frame: Frame) -> &T {
        self.get(frame)
    }
}

impl<T> IndexMut<Frame> for FramePair<T> {
    fn index_mut(&mut self, frame: Frame) -> &mut T {
        self.get_mut(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_is_an_involution() {
        assert_eq!(Frame::First.other(), Frame::Second);
        assert_eq!(Frame::Second.other().other(), Frame::Second);
    }

    #[test]
    fn test_rotate_then_promote() {
        let mut pair = FramePair::new("a", "b");
        assert_eq!(pair.dispatch(), pair.harvest());

        // a fresh unit lands in the other slot; the old batch stays harvestable
        assert_eq!(pair.rotate(), Frame::Second);
        assert_eq!(pair.harvest(), Frame::First);
        assert_eq!(pair[pair.dispatch()], "b");
        assert_eq!(pair[pair.harvest()], "a");

        pair.promote();
        assert_eq!(pair.harvest(), Frame::Second);
        assert_eq!(pair.dispatch(), Frame::Second);
    }

    #[test]
    fn test_index_mut() {
        let mut pair: FramePair<Option<u32>> = FramePair::default();
        pair[Frame::Second] = Some(5);
        assert_eq!(pair[Frame::First], None);
        assert_eq!(*pair.get(Frame::Second), Some(5));
    }
}
