//! Membership matching: desired-role table vs. a live roster snapshot.
//!
//! The sync is one-way. Members that match neither the desired table nor
//! the ban set are never touched, and members that do match only ever gain
//! roles. Banned members lose every role except the default one.
//! Integration-managed roles are never planned in either direction.

use std::collections::BTreeSet;

use tracing::debug;

use crate::models::{BanSet, Identity, Member, MemberDiff, ReconcilePlan, Role, RoleAssignment};

/// First candidate key of `member` (handle, then alias) accepted by `known`.
pub fn resolve_identity(member: &Member, known: impl Fn(&Identity) -> bool) -> Option<Identity> {
    member.candidate_keys().find(|key| known(key))
}

/// Compute the add/strip operations for a roster snapshot.
///
/// `catalog` is the guild's role list; desired role names that are not in it
/// are silently unassignable (see [`missing_roles`]). `default_role` names the
/// role every member implicitly holds.
pub fn plan(
    desired: &RoleAssignment,
    banned: &BanSet,
    roster: &[Member],
    catalog: &[Role],
    default_role: &str,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for member in roster {
        if let Some(identity) = resolve_identity(member, |key| banned.contains(key)) {
            let roles: Vec<Role> = catalog
                .iter()
                .filter(|role| !role.managed && role.name != default_role && member.holds(role))
                .cloned()
                .collect();
            if !roles.is_empty() {
                plan.to_strip.push(MemberDiff {
                    member: member.clone(),
                    identity,
                    roles,
                });
            }
            continue;
        }

        let Some(identity) = resolve_identity(member, |key| desired.contains_key(key)) else {
            continue;
        };
        let wanted = &desired[&identity];
        let roles: Vec<Role> = catalog
            .iter()
            .filter(|role| !role.managed && wanted.contains(&role.name) && !member.holds(role))
            .cloned()
            .collect();
        if !roles.is_empty() {
            plan.to_assign.push(MemberDiff {
                member: member.clone(),
                identity,
                roles,
            });
        }
    }

    debug!(
        members = roster.len(),
        to_assign = plan.to_assign.len(),
        to_strip = plan.to_strip.len(),
        "planned role changes"
    );
    plan
}

/// Desired role names with no role of that name in the guild.
pub fn missing_roles(desired: &RoleAssignment, catalog: &[Role]) -> Vec<String> {
    let known: BTreeSet<&str> = catalog.iter().map(|r| r.name.as_str()).collect();
    let wanted: BTreeSet<&str> = desired.values().flatten().map(String::as_str).collect();
    wanted
        .difference(&known)
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    fn role(id: &str, name: &str) -> Role {
        Role {
            id: id.into(),
            name: name.into(),
            managed: false,
        }
    }

    fn managed(id: &str, name: &str) -> Role {
        Role {
            managed: true,
            ..role(id, name)
        }
    }

    fn catalog() -> Vec<Role> {
        vec![
            role("100", "@everyone"),
            role("1", "builder"),
            role("2", "MENTOR"),
            role("3", "coworkerWeek1"),
            role("4", "coworkerWeek2"),
        ]
    }

    fn member(id: &str, handle: &str, alias: Option<&str>, roles: &[&str]) -> Member {
        Member {
            id: id.into(),
            handle: handle.into(),
            alias: alias.map(Into::into),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn desired(entries: &[(&str, &[&str])]) -> RoleAssignment {
        entries
            .iter()
            .map(|(k, roles)| (id(k), roles.iter().map(|r| r.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_resolve_identity_prefers_handle() {
        let m = member("1", "Alice", Some("bob"), &[]);
        let table = desired(&[("alice", &["builder"]), ("bob", &["MENTOR"])]);
        let hit = resolve_identity(&m, |k| table.contains_key(k));
        assert_eq!(hit, Some(id("alice")));
    }

    #[test]
    fn test_resolve_identity_falls_back_to_alias() {
        let m = member("1", "xX_alice_Xx", Some("Alice"), &[]);
        let table = desired(&[("alice", &["builder"])]);
        assert_eq!(resolve_identity(&m, |k| table.contains_key(k)), Some(id("alice")));
    }

    #[test]
    fn test_unmatched_member_untouched() {
        let roster = vec![member("9", "stranger", None, &["2"])];
        let plan = plan(
            &desired(&[("alice", &["builder"])]),
            &BanSet::new(),
            &roster,
            &catalog(),
            "@everyone",
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_additive_only_for_normal_members() {
        // Holds MENTOR, sheet says builder: gains builder, keeps MENTOR.
        let roster = vec![member("1", "alice", None, &["2"])];
        let plan = plan(
            &desired(&[("alice", &["builder"])]),
            &BanSet::new(),
            &roster,
            &catalog(),
            "@everyone",
        );
        assert_eq!(plan.to_assign.len(), 1);
        assert_eq!(plan.to_assign[0].role_names(), vec!["builder"]);
        assert!(plan.to_strip.is_empty());
    }

    #[test]
    fn test_already_held_roles_emit_nothing() {
        let roster = vec![member("1", "carol", None, &["3", "4"])];
        let plan = plan(
            &desired(&[("carol", &["coworkerWeek1", "coworkerWeek2"])]),
            &BanSet::new(),
            &roster,
            &catalog(),
            "@everyone",
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_banned_member_stripped_except_default() {
        let roster = vec![member("2", "bob", None, &["2", "100"])];
        let banned: BanSet = [id("bob")].into_iter().collect();
        let plan = plan(&RoleAssignment::new(), &banned, &roster, &catalog(), "@everyone");
        assert!(plan.to_assign.is_empty());
        assert_eq!(plan.to_strip.len(), 1);
        assert_eq!(plan.to_strip[0].role_names(), vec!["MENTOR"]);
    }

    #[test]
    fn test_banned_by_alias_gets_no_additions() {
        // Handle is in the desired table, alias is banned: ban wins.
        let roster = vec![member("2", "robert", Some("Bob"), &["1"])];
        let banned: BanSet = [id("bob")].into_iter().collect();
        let plan = plan(
            &desired(&[("robert", &["MENTOR"])]),
            &banned,
            &roster,
            &catalog(),
            "@everyone",
        );
        assert!(plan.to_assign.is_empty());
        assert_eq!(plan.to_strip[0].role_names(), vec!["builder"]);
        assert_eq!(plan.to_strip[0].identity, id("bob"));
    }

    #[test]
    fn test_banned_member_without_roles_emits_nothing() {
        let roster = vec![member("2", "bob", None, &[])];
        let banned: BanSet = [id("bob")].into_iter().collect();
        let plan = plan(&RoleAssignment::new(), &banned, &roster, &catalog(), "@everyone");
        assert!(plan.is_empty());
    }

    #[test]
    fn test_missing_roles() {
        let table = desired(&[("alice", &["builder", "ghost"]), ("bob", &["phantom"])]);
        assert_eq!(missing_roles(&table, &catalog()), vec!["ghost", "phantom"]);
    }

    #[test]
    fn test_managed_roles_are_never_planned() {
        let mut catalog = catalog();
        catalog.push(managed("7", "Server Booster"));
        catalog.push(managed("8", "builder"));

        let roster = vec![
            member("1", "alice", None, &[]),
            member("2", "bob", None, &["2", "7"]),
        ];
        let banned: BanSet = [id("bob")].into_iter().collect();
        let plan = plan(
            &desired(&[("alice", &["builder"])]),
            &banned,
            &roster,
            &catalog,
            "@everyone",
        );

        // Only the unmanaged "builder" role is granted.
        assert_eq!(plan.to_assign[0].roles, vec![role("1", "builder")]);
        assert_eq!(plan.to_strip[0].role_names(), vec!["MENTOR"]);
    }
}
