//! Consistency rules for contribution state.
//!
//! Pure functions with no I/O. These encode what "deleted" means for a
//! contribution, independent of how page and revision state is obtained.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Revision visibility bitfield as reported by the host wiki.
///
/// Bits follow the host's `rev_deleted` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionVisibility(pub u8);

impl RevisionVisibility {
    /// Revision content is hidden.
    pub const DELETED_TEXT: u8 = 1;
    /// Edit summary is hidden.
    pub const DELETED_COMMENT: u8 = 2;
    /// Editor name is hidden.
    pub const DELETED_USER: u8 = 4;
    /// The other bits also apply to administrators (suppression).
    pub const DELETED_RESTRICTED: u8 = 8;

    /// Fully visible revision.
    pub const VISIBLE: RevisionVisibility = RevisionVisibility(0);

    pub fn from_bits(bits: u8) -> Self {
        RevisionVisibility(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn with(self, flag: u8) -> Self {
        RevisionVisibility(self.0 | flag)
    }
}

impl fmt::Display for RevisionVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06b}", self.0)
    }
}

/// Returns true if a revision with these flags may be shown as a contribution.
///
/// A hidden edit summary alone does not hide the contribution. Hidden content or
/// a hidden editor does. `DELETED_RESTRICTED` only widens who the other bits apply
/// to, so it has no effect on its own.
pub fn is_revision_publicly_visible(flags: RevisionVisibility) -> bool {
    !flags.contains(RevisionVisibility::DELETED_TEXT)
        && !flags.contains(RevisionVisibility::DELETED_USER)
}

/// A contribution is deleted iff its page is gone or its revision is hidden.
pub fn effective_deleted_state(page_exists: bool, revision_visible: bool) -> bool {
    !page_exists || !revision_visible
}
