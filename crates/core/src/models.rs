//! Domain model types used throughout RoleSync.
//!
//! These types bridge the sheet rows, the role resolver, the membership
//! matcher, and the Discord client.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sheet side
// ---------------------------------------------------------------------------

/// One spreadsheet row. The first cell is the identity key.
///
/// The Sheets API drops trailing empty cells, so [`Row::cell`] reads missing
/// cells as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(pub Vec<String>);

impl Row {
    pub fn cell(&self, index: usize) -> &str {
        self.0.get(index).map(String::as_str).unwrap_or("")
    }

    /// Raw identity cell (column 0).
    pub fn key(&self) -> &str {
        self.cell(0)
    }

    /// Parsed identity of column 0, if non-empty.
    pub fn identity(&self) -> Option<Identity> {
        Identity::parse(self.key())
    }
}

impl<S: Into<String>> FromIterator<S> for Row {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A normalized (trimmed, lowercased, non-empty) identity key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Normalize a raw cell or account name. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_lowercase();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Desired role names per identity, rebuilt from scratch every run.
pub type RoleAssignment = BTreeMap<Identity, BTreeSet<String>>;

/// Identities whose non-default roles are stripped.
pub type BanSet = BTreeSet<Identity>;

// ---------------------------------------------------------------------------
// Guild side
// ---------------------------------------------------------------------------

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    /// Owned by an integration (bot role, booster role); never reassignable.
    #[serde(default)]
    pub managed: bool,
}

/// A live guild member as seen in one roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Account id.
    pub id: String,
    /// Account username.
    pub handle: String,
    /// Guild nickname, if set.
    pub alias: Option<String>,
    /// Ids of the roles currently held.
    pub roles: BTreeSet<String>,
}

impl Member {
    /// Identity keys to try, in priority order: handle, then alias.
    pub fn candidate_keys(&self) -> impl Iterator<Item = Identity> + '_ {
        std::iter::once(self.handle.as_str())
            .chain(self.alias.as_deref())
            .filter_map(Identity::parse)
    }

    pub fn holds(&self, role: &Role) -> bool {
        self.roles.contains(&role.id)
    }
}

// ---------------------------------------------------------------------------
// Plan & report
// ---------------------------------------------------------------------------

/// Roles to add to, or strip from, a single member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberDiff {
    pub member: Member,
    /// The identity key the member matched on.
    pub identity: Identity,
    pub roles: Vec<Role>,
}

impl MemberDiff {
    pub fn role_names(&self) -> Vec<&str> {
        self.roles.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Every operation one run intends to issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub to_assign: Vec<MemberDiff>,
    pub to_strip: Vec<MemberDiff>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_assign.is_empty() && self.to_strip.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.to_assign.len() + self.to_strip.len()
    }
}

/// A member whose role update failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberFailure {
    pub member_id: String,
    pub handle: String,
    pub error: String,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub members_scanned: usize,
    pub desired_identities: usize,
    pub assigned: usize,
    pub stripped: usize,
    pub failures: Vec<MemberFailure>,
    /// Desired role names with no matching guild role.
    pub missing_roles: Vec<String>,
    pub dry_run: bool,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_parse_normalizes() {
        assert_eq!(Identity::parse("  Alice ").unwrap().as_str(), "alice");
        assert!(Identity::parse("   ").is_none());
        assert!(Identity::parse("").is_none());
    }

    #[test]
    fn test_row_missing_cells_read_empty() {
        let row: Row = ["bob"].into_iter().collect();
        assert_eq!(row.key(), "bob");
        assert_eq!(row.cell(1), "");
    }

    #[test]
    fn test_candidate_keys_order() {
        let member = Member {
            id: "1".into(),
            handle: "Carol".into(),
            alias: Some("CJ ".into()),
            roles: BTreeSet::new(),
        };
        let keys: Vec<String> = member.candidate_keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["carol", "cj"]);
    }

    #[test]
    fn test_row_deserializes_from_json_array() {
        let row: Row = serde_json::from_str(r#"["alice", "mentor"]"#).unwrap();
        assert_eq!(row.cell(1), "mentor");
    }
}
