//! Role resolution: sheet categories to a desired-role table.
//!
//! Categories are applied in a fixed order (builders, others, coworkers) and
//! each later category replaces, rather than extends, an earlier entry for
//! the same identity.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::RolesConfig;
use crate::errors::ConfigError;
use crate::models::{BanSet, Identity, RoleAssignment, Row};

/// Build the desired-role table for one run.
///
/// Banned identities are skipped in every category. An "others" row whose
/// label has no mapping fails the whole resolution so no partial plan is
/// ever applied.
pub fn resolve(
    builders: &[Identity],
    others: &[Row],
    coworkers: &[Row],
    banned: &BanSet,
    roles: &RolesConfig,
) -> Result<RoleAssignment, ConfigError> {
    let mut desired = RoleAssignment::new();

    for builder in builders.iter().filter(|b| !banned.contains(*b)) {
        desired.insert(builder.clone(), BTreeSet::from([roles.builder_role.clone()]));
    }

    for row in others {
        let Some(identity) = row.identity() else {
            continue;
        };
        let label = row.cell(1).trim();
        if banned.contains(&identity) || label.is_empty() {
            continue;
        }
        let role = roles
            .role_for_label(label)
            .ok_or_else(|| ConfigError::UnmappedRoleLabel {
                label: label.to_string(),
                identity: identity.to_string(),
            })?;
        desired.insert(identity, BTreeSet::from([role.to_string()]));
    }

    for row in coworkers {
        let Some(identity) = row.identity() else {
            continue;
        };
        let weeks = row.cell(1);
        if banned.contains(&identity) || weeks.trim().is_empty() {
            continue;
        }
        let week_roles: BTreeSet<String> = roles
            .coworker_weeks
            .iter()
            .filter(|week| weeks.contains(week.as_str()))
            .map(|week| roles.coworker_role(week))
            .collect();
        desired.insert(identity, week_roles);
    }

    debug!(identities = desired.len(), "resolved desired roles");
    Ok(desired)
}
