//! One reconciliation pass: sheet rows in, guild role changes out.
//!
//! The [`Reconciler`] sequences each run:
//!
//! 1. Fetch the builder, others, coworker, and banned rows.
//! 2. Normalize them and resolve the desired-role table.
//! 3. Fetch the guild's role catalog and a fresh roster snapshot.
//! 4. Plan the additions and strips.
//! 5. Apply the plan one member at a time.
//!
//! Nothing is carried between runs. A failed fetch aborts the run; a failed
//! member update is logged and recorded, and the loop moves on.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::{ApplyError, FetchError, ReconcileError};
use crate::matcher;
use crate::models::{Member, MemberDiff, MemberFailure, ReconcilePlan, Role, Row, RunReport};
use crate::normalize::{ban_set, identities, normalize_rows};
use crate::resolver;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Source of spreadsheet rows.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Raw rows of `range`; deduplication is the caller's job.
    async fn fetch_rows(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Row>, FetchError>;
}

/// The remote group whose roles are reconciled.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Every member with their currently held roles, freshly fetched.
    async fn fetch_roster(&self) -> Result<Vec<Member>, FetchError>;

    /// The roles defined in the group.
    async fn fetch_role_catalog(&self) -> Result<Vec<Role>, FetchError>;

    async fn add_roles(&self, member: &Member, roles: &[Role]) -> Result<(), ApplyError>;

    async fn remove_roles(&self, member: &Member, roles: &[Role]) -> Result<(), ApplyError>;
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// The four normalized row sets of one run.
#[derive(Debug, Clone, Default)]
pub struct SheetInputs {
    pub builders: Vec<Row>,
    pub others: Vec<Row>,
    pub coworkers: Vec<Row>,
    pub banned: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Assign,
    Strip,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assign => write!(f, "assign"),
            Self::Strip => write!(f, "strip"),
        }
    }
}

/// Drives a single reconciliation run against a sheet source and a platform.
pub struct Reconciler<S, P> {
    config: AppConfig,
    sheets: S,
    platform: P,
}

impl<S: SheetSource, P: Platform> Reconciler<S, P> {
    pub fn new(config: AppConfig, sheets: S, platform: P) -> Self {
        Self {
            config,
            sheets,
            platform,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Execute one full run.
    ///
    /// Returns `Err` only when the run could not get as far as applying:
    /// a fetch failed or a role label is unmapped. Per-member failures are
    /// reported in [`RunReport::failures`].
    pub async fn run(&self) -> Result<RunReport, ReconcileError> {
        let mut report = RunReport {
            dry_run: self.config.run.dry_run,
            started_at: Utc::now().to_rfc3339(),
            ..Default::default()
        };

        let plan = self.build_plan(&mut report).await?;

        if plan.is_empty() {
            info!("no role changes required");
        } else {
            info!(operations = plan.operation_count(), "applying role changes");
            self.apply(&plan, &mut report).await;
        }

        report.completed_at = Some(Utc::now().to_rfc3339());
        info!(
            members = report.members_scanned,
            assigned = report.assigned,
            stripped = report.stripped,
            failed = report.failures.len(),
            dry_run = report.dry_run,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Fetch and normalize the four row sets.
    pub async fn fetch_inputs(&self) -> Result<SheetInputs, FetchError> {
        let sheets = &self.config.sheets;
        let builders = self
            .fetch(&sheets.builders_spreadsheet_id, &sheets.builders_range)
            .await?;
        let others = self
            .fetch(&sheets.others_spreadsheet_id, &sheets.others_range)
            .await?;
        let coworkers = self
            .fetch(&sheets.others_spreadsheet_id, &sheets.coworkers_range)
            .await?;
        let banned = self
            .fetch(&sheets.others_spreadsheet_id, &sheets.banned_range)
            .await?;

        Ok(SheetInputs {
            builders,
            others,
            coworkers,
            banned,
        })
    }

    async fn fetch(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Row>, FetchError> {
        let rows = self
            .sheets
            .fetch_rows(spreadsheet_id, range)
            .await
            .inspect_err(|e| error!(spreadsheet_id, range, error = %e, "sheet fetch failed"))?;
        Ok(normalize_rows(rows))
    }

    /// Fetch every input and compute the plan, filling the report's
    /// planning fields.
    pub async fn build_plan(&self, report: &mut RunReport) -> Result<ReconcilePlan, ReconcileError> {
        let inputs = self.fetch_inputs().await?;

        let banned = ban_set(&inputs.banned);
        let desired = resolver::resolve(
            &identities(&inputs.builders),
            &inputs.others,
            &inputs.coworkers,
            &banned,
            &self.config.roles,
        )
        .inspect_err(|e| error!(error = %e, "role resolution failed, nothing applied"))?;
        report.desired_identities = desired.len();
        info!(
            builders = inputs.builders.len(),
            others = inputs.others.len(),
            coworkers = inputs.coworkers.len(),
            banned = banned.len(),
            desired = desired.len(),
            "resolved sheet rows"
        );

        let catalog = self
            .platform
            .fetch_role_catalog()
            .await
            .inspect_err(|e| error!(error = %e, "role catalog fetch failed"))?;
        info!("fetching guild members");
        let roster = self
            .platform
            .fetch_roster()
            .await
            .inspect_err(|e| error!(error = %e, "roster fetch failed"))?;
        info!(members = roster.len(), roles = catalog.len(), "guild members fetched");
        report.members_scanned = roster.len();

        report.missing_roles = matcher::missing_roles(&desired, &catalog);
        for name in &report.missing_roles {
            warn!(role = %name, "desired role does not exist in the guild");
        }

        Ok(matcher::plan(
            &desired,
            &banned,
            &roster,
            &catalog,
            &self.config.discord.default_role,
        ))
    }

    /// Apply a plan sequentially. Each member is awaited before the next so
    /// the outbound request rate stays bounded.
    async fn apply(&self, plan: &ReconcilePlan, report: &mut RunReport) {
        for diff in &plan.to_assign {
            if self.apply_one(Operation::Assign, diff, report).await {
                report.assigned += 1;
            }
        }
        for diff in &plan.to_strip {
            if self.apply_one(Operation::Strip, diff, report).await {
                report.stripped += 1;
            }
        }
    }

    async fn apply_one(&self, op: Operation, diff: &MemberDiff, report: &mut RunReport) -> bool {
        let member = &diff.member;
        let names = diff.role_names();

        if self.config.run.dry_run {
            info!(%op, member = %member.handle, identity = %diff.identity, roles = ?names, "dry run, skipping");
            return true;
        }

        let result = match op {
            Operation::Assign => self.platform.add_roles(member, &diff.roles).await,
            Operation::Strip => self.platform.remove_roles(member, &diff.roles).await,
        };

        match result {
            Ok(()) => {
                match op {
                    Operation::Assign => {
                        info!(member = %member.handle, roles = %names.join(", "), "assigned roles")
                    }
                    Operation::Strip => {
                        info!(member = %member.handle, roles = %names.join(", "), "removed roles")
                    }
                }
                true
            }
            Err(e) => {
                error!(%op, member = %member.handle, member_id = %member.id, roles = ?names, error = %e, "role update failed");
                report.failures.push(MemberFailure {
                    member_id: member.id.clone(),
                    handle: member.handle.clone(),
                    error: e.to_string(),
                });
                false
            }
        }
    }
}
