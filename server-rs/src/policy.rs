//! Visibility rules for roster membership data.
//!
//! Everything here is a pure function of its arguments: the caller loads the
//! viewer's context and the events governing a membership row, then asks
//! whether that row may be shown. Nothing is read from or written to storage.

use serde::Serialize;

/// The most senior rank an anonymous viewer may see while a shift is live.
pub const TOP_RANK: i32 = 1;

/// One event of a roster member, annotated with its role's rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GoverningEvent {
    pub display_order: i32,
    pub start: i64,
    pub duration: i64,
}

impl GoverningEvent {
    /// Shift windows are half open: `[start, start + duration)`.
    pub fn is_active_at(&self, now: i64) -> bool {
        self.start <= now && now < self.start.saturating_add(self.duration)
    }
}

/// Who is asking, resolved against one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    Member(MemberViewer),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberViewer {
    pub user_id: i64,
    pub name: String,
    pub god: bool,
    pub team_admin: bool,
    /// Ranks of the roles scheduled in this team on rosters the viewer belongs to.
    pub assignment_ranks: Vec<i32>,
}

impl Viewer {
    pub fn name(&self) -> Option<&str> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Member(m) => Some(&m.name),
        }
    }

    fn is_privileged(&self) -> bool {
        matches!(self, Viewer::Member(m) if m.god || m.team_admin)
    }
}

/// Decides whether one roster membership row is visible to `viewer`.
///
/// `events` are the team events of the row's user. A row with no events can
/// only be seen by a god user or a team admin.
pub fn is_visible(viewer: &Viewer, events: &[GoverningEvent], now: i64) -> bool {
    if viewer.is_privileged() {
        return true;
    }

    match viewer {
        Viewer::Anonymous => events
            .iter()
            .any(|e| e.display_order <= TOP_RANK && e.is_active_at(now)),
        Viewer::Member(member) => member.assignment_ranks.iter().any(|&rank| {
            events.iter().any(|e| {
                rank >= e.display_order
                    || (e.is_active_at(now) && rank.checked_add(1) == Some(e.display_order))
            })
        }),
    }
}

/// Whether `viewer` may list the team's admins.
pub fn can_see_admins(viewer: &Viewer, minimum_display_order: i32) -> bool {
    match viewer {
        Viewer::Anonymous => false,
        Viewer::Member(m) => {
            m.god
                || m.team_admin
                || m.assignment_ranks
                    .iter()
                    .any(|&rank| rank >= minimum_display_order)
        }
    }
}
