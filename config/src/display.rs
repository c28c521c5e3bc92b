// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `Display` impls used by the CLI's `commit --diff` rendering (§6).

use std::fmt::{Display, Formatter};

use crate::snapshot::{SnapshotDiff, SnapshotDiffEntry};

impl Display for SnapshotDiffEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotDiffEntry::TenantAdded(id) => write!(f, "+ tenant {id}"),
            SnapshotDiffEntry::TenantRemoved(id) => write!(f, "- tenant {id}"),
            SnapshotDiffEntry::TenantChanged(id) => write!(f, "~ tenant {id}"),
            SnapshotDiffEntry::ServiceChanged => write!(f, "~ service (DEFAULT)"),
        }
    }
}

impl Display for SnapshotDiff {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "(no changes)");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TenantId;

    #[test]
    fn empty_diff_displays_no_changes() {
        assert_eq!(SnapshotDiff::default().to_string(), "(no changes)");
    }

    #[test]
    fn diff_displays_one_line_per_entry() {
        let diff = SnapshotDiff {
            entries: vec![
                SnapshotDiffEntry::TenantAdded(TenantId::try_from("C0001").unwrap()),
                SnapshotDiffEntry::ServiceChanged,
            ],
        };
        assert_eq!(diff.to_string(), "+ tenant C0001\n~ service (DEFAULT)");
    }
}
