//! Monitor geometry and the display topology snapshot.
//!
//! Monitors are recreated wholesale on every topology change; the only
//! identity that survives a change is the connector name (`device_id`).
//! The ordinal `index` is a display convenience and must never be used
//! as a persistent key.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> i32 {
        self.x + i32::try_from(self.width).unwrap_or(i32::MAX)
    }

    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.y + i32::try_from(self.height).unwrap_or(i32::MAX)
    }

    /// The bounding union of two rectangles.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect {
            x,
            y,
            width: right.abs_diff(x),
            height: bottom.abs_diff(y),
        }
    }

    /// The overlapping region, or `None` when the rectangles are disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Rect {
            x,
            y,
            width: right.abs_diff(x),
            height: bottom.abs_diff(y),
        })
    }

    #[must_use]
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }
}

/// One connected monitor.
///
/// Equality is by `device_id` only; geometry and ordering are transient.
#[derive(Debug, Clone, Eq)]
pub struct DisplayMonitor {
    /// Connector name, stable across reboots and hot-plug cycles.
    pub device_id: String,
    /// Position in the current enumeration, unstable across changes.
    pub index: usize,
    pub bounds: Rect,
    pub working_area: Rect,
    pub is_primary: bool,
}

impl PartialEq for DisplayMonitor {
    fn eq(&self, other: &Self) -> bool {
        self.device_id == other.device_id
    }
}

/// The bounding union of all monitor bounds.
///
/// Returns `None` for an empty set.
#[must_use]
pub fn union_bounds(monitors: &[DisplayMonitor]) -> Option<Rect> {
    let mut iter = monitors.iter().map(|m| m.bounds);
    let first = iter.next()?;
    Some(iter.fold(first, |acc, r| acc.union(&r)))
}

#[cfg(test)]
pub(crate) fn test_monitor(device_id: &str, index: usize, bounds: Rect, primary: bool) -> DisplayMonitor {
    DisplayMonitor {
        device_id: device_id.to_string(),
        index,
        bounds,
        working_area: bounds,
        is_primary: primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_of_side_by_side() {
        let a = Rect::new(0, 0, 1920, 1080);
        let b = Rect::new(1920, 0, 1280, 1024);
        assert_eq!(a.union(&b), Rect::new(0, 0, 3200, 1080));
    }

    #[test]
    fn union_with_negative_origin() {
        let a = Rect::new(0, 0, 1920, 1080);
        let b = Rect::new(-1280, -200, 1280, 1024);
        assert_eq!(a.union(&b), Rect::new(-1280, -200, 3200, 1280));
    }

    #[test]
    fn intersect_disjoint() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(200, 200, 50, 50);
        assert_eq!(a.intersect(&b), None);
    }

    #[test]
    fn intersect_partial() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 50, 100, 100);
        assert_eq!(a.intersect(&b), Some(Rect::new(50, 50, 50, 50)));
    }

    #[test]
    fn monitor_equality_is_by_device_id() {
        let a = test_monitor("DP-1", 0, Rect::new(0, 0, 1920, 1080), true);
        let b = test_monitor("DP-1", 3, Rect::new(500, 0, 800, 600), false);
        assert_eq!(a, b);
    }

    #[test]
    fn union_bounds_single_monitor() {
        let m = test_monitor("DP-1", 0, Rect::new(0, 0, 1920, 1080), true);
        assert_eq!(union_bounds(&[m]), Some(Rect::new(0, 0, 1920, 1080)));
        assert_eq!(union_bounds(&[]), None);
    }
}
