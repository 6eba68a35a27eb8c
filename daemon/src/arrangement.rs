//! Maps the monitor set and the user's arrangement mode to player bindings.
//!
//! All arrangement state lives in [`ArrangementState`] and only changes
//! through its entry points; nothing else mutates the current mode or the
//! assignments. Resolving the same inputs twice yields an identical
//! binding set.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::display::{DisplayMonitor, Rect, union_bounds};
use crate::wallpaper::WallpaperDescriptor;

/// How many player instances exist relative to the monitor count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ArrangementMode {
    /// One instance per monitor, independent content.
    #[default]
    Per,
    /// One instance stretched over the union of all monitors.
    Span,
    /// One instance per monitor, all showing the same content.
    Duplicate,
}

impl FromStr for ArrangementMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "per" => Ok(Self::Per),
            "span" => Ok(Self::Span),
            "duplicate" => Ok(Self::Duplicate),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ArrangementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Per => "per",
            Self::Span => "span",
            Self::Duplicate => "duplicate",
        };
        write!(f, "{name}")
    }
}

/// The monitor group one player instance covers.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorGroup {
    Single(DisplayMonitor),
    /// All monitors treated as one union rectangle (span).
    Union(Vec<DisplayMonitor>),
}

impl MonitorGroup {
    /// Target rectangle of the group in screen coordinates.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Single(monitor) => monitor.bounds,
            Self::Union(monitors) => {
                union_bounds(monitors).unwrap_or(Rect::new(0, 0, 0, 0))
            }
        }
    }

    /// Sorted device ids, used as the stable half of a binding key.
    #[must_use]
    pub fn device_ids(&self) -> Vec<String> {
        match self {
            Self::Single(monitor) => vec![monitor.device_id.clone()],
            Self::Union(monitors) => {
                let mut ids: Vec<String> =
                    monitors.iter().map(|m| m.device_id.clone()).collect();
                ids.sort();
                ids
            }
        }
    }
}

/// An association between a monitor group and a content descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub group: MonitorGroup,
    pub descriptor: WallpaperDescriptor,
}

impl Binding {
    /// Stable identity of the binding, used to diff desired vs. live.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}|{}",
            self.group.device_ids().join("+"),
            self.descriptor.root.display()
        )
    }
}

/// Owns the current mode, the content assignments, and the monitor the
/// user last interacted with.
#[derive(Debug, Default)]
pub struct ArrangementState {
    mode: ArrangementMode,
    /// Per-monitor content, keyed by device id. Only meaningful in `per`.
    assignments: HashMap<String, WallpaperDescriptor>,
    /// Shared content for `span`/`duplicate`.
    shared: Option<WallpaperDescriptor>,
    /// Device id of the monitor that was last assigned to or selected.
    last_interacted: Option<String>,
}

impl ArrangementState {
    #[must_use]
    pub fn new(mode: ArrangementMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn mode(&self) -> ArrangementMode {
        self.mode
    }

    /// Assigns content. In `per` mode the target monitor gets it; in
    /// `span`/`duplicate` the shared slot is replaced regardless of the
    /// monitor named.
    pub fn assign(&mut self, device_id: &str, descriptor: WallpaperDescriptor) {
        self.last_interacted = Some(device_id.to_string());
        match self.mode {
            ArrangementMode::Per => {
                self.assignments.insert(device_id.to_string(), descriptor);
            }
            ArrangementMode::Span | ArrangementMode::Duplicate => {
                self.shared = Some(descriptor);
            }
        }
    }

    /// Removes the assignment for a monitor, leaving it unbound.
    pub fn unassign(&mut self, device_id: &str) {
        match self.mode {
            ArrangementMode::Per => {
                self.assignments.remove(device_id);
            }
            ArrangementMode::Span | ArrangementMode::Duplicate => {
                self.shared = None;
            }
        }
    }

    /// Switches the arrangement mode.
    ///
    /// Collapsing into `span`/`duplicate` takes the content of the
    /// last-interacted monitor when one is assigned, otherwise the first
    /// assigned monitor in enumeration order. Expanding back into `per`
    /// rebinds only the previously selected monitor; all others stay
    /// unbound until the user assigns them again.
    pub fn set_mode(&mut self, mode: ArrangementMode, monitors: &[DisplayMonitor]) {
        if mode == self.mode {
            return;
        }
        let was_collapsed = matches!(
            self.mode,
            ArrangementMode::Span | ArrangementMode::Duplicate
        );
        let collapsing = matches!(mode, ArrangementMode::Span | ArrangementMode::Duplicate);
        match (was_collapsed, collapsing) {
            (false, true) => {
                self.shared = self
                    .last_interacted
                    .as_ref()
                    .and_then(|id| self.assignments.get(id).cloned())
                    .or_else(|| {
                        monitors
                            .iter()
                            .find_map(|m| self.assignments.get(&m.device_id).cloned())
                    });
                self.assignments.clear();
            }
            (true, false) => {
                let selected = self
                    .last_interacted
                    .clone()
                    .or_else(|| {
                        monitors
                            .iter()
                            .find(|m| m.is_primary)
                            .map(|m| m.device_id.clone())
                    })
                    .or_else(|| monitors.first().map(|m| m.device_id.clone()));
                self.assignments.clear();
                if let (Some(id), Some(shared)) = (selected, self.shared.take()) {
                    self.assignments.insert(id, shared);
                }
            }
            // span <-> duplicate keeps the shared content as-is
            _ => {}
        }
        self.mode = mode;
    }

    /// Drops `per` assignments for monitors that disappeared. Bindings for
    /// `span`/`duplicate` are unaffected; their groups shrink or grow when
    /// resolved against the new monitor set.
    pub fn topology_changed(&mut self, monitors: &[DisplayMonitor]) {
        self.assignments
            .retain(|id, _| monitors.iter().any(|m| &m.device_id == id));
        if let Some(last) = &self.last_interacted
            && !monitors.iter().any(|m| &m.device_id == last)
        {
            self.last_interacted = None;
        }
    }

    /// Produces the desired binding set for the given monitors.
    ///
    /// Groups with no assigned content are simply left unbound; that is
    /// not an error.
    #[must_use]
    pub fn resolve(&self, monitors: &[DisplayMonitor]) -> Vec<Binding> {
        match self.mode {
            ArrangementMode::Per => monitors
                .iter()
                .filter_map(|monitor| {
                    self.assignments.get(&monitor.device_id).map(|descriptor| {
                        Binding {
                            group: MonitorGroup::Single(monitor.clone()),
                            descriptor: descriptor.clone(),
                        }
                    })
                })
                .collect(),
            ArrangementMode::Span => {
                let Some(descriptor) = &self.shared else {
                    return Vec::new();
                };
                if monitors.is_empty() {
                    return Vec::new();
                }
                vec![Binding {
                    group: MonitorGroup::Union(monitors.to_vec()),
                    descriptor: descriptor.clone(),
                }]
            }
            ArrangementMode::Duplicate => {
                let Some(descriptor) = &self.shared else {
                    return Vec::new();
                };
                monitors
                    .iter()
                    .map(|monitor| Binding {
                        group: MonitorGroup::Single(monitor.clone()),
                        descriptor: descriptor.clone(),
                    })
                    .collect()
            }
        }
    }
}
