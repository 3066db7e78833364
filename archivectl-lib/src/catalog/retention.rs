//! The retention engine: turns `{policy, backup list}` into a
//! `CleanupDescriptor` without touching the catalog or filesystem itself.
//!
//! Evaluation is pure and deterministic so it can be tested without a real
//! catalog: callers fetch the backup list and the set of backup ids
//! currently referenced from worker shared memory, then call [`evaluate`].

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::xlog::Timeline;

use super::{
    BackupStatus, BaseBackupDescr, BasebackupMode, CleanupDescriptor, CleanupMode, PinSelector,
    RetentionPolicyDescr, RetentionRuleDescr, RetentionRuleType, RetentionRuleValue,
    TimelineCutoff,
};

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum RetentionError {
    #[error("retention rule requires {required} valid backups but only {available} exist")]
    #[diagnostic(help("retention count must be smaller than the number of valid basebackups"))]
    TooFewValidBackups { required: u32, available: usize },

    #[error("drop_num would remove every valid backup")]
    #[diagnostic(help("drop_num must leave at least one valid backup behind"))]
    NoValidBackupsRemain,

    #[error("cleanup policy blocked by an in-progress backup")]
    #[diagnostic(help(
        "an in-progress backup exists in this archive; resolve it manually (finish or abort it) before running cleanup"
    ))]
    InProgressBlocksCleanup,

    #[error("WAL_CLEANUP_RANGE is not supported by this implementation")]
    Unsupported,

    #[error("bad regex in retention rule: {0}")]
    BadRegex(#[from] regex::Error),
}

/// Per-backup locking classification, computed once per evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    LockedByPin,
    LockedByShm,
    NotLocked,
}

#[must_use]
pub fn classify_lock(backup: &BaseBackupDescr, shm_referenced_ids: &HashSet<i64>) -> LockState {
    if backup.pinned {
        LockState::LockedByPin
    } else if backup
        .id
        .map(|id| shm_referenced_ids.contains(&id))
        .unwrap_or(false)
    {
        LockState::LockedByShm
    } else {
        LockState::NotLocked
    }
}

/// Working state threaded through rule evaluation. `backups` is assumed
/// sorted newest-first, matching `Catalog::get_backup_list`.
struct Evaluation<'a> {
    backups: &'a [BaseBackupDescr],
    shm_referenced_ids: &'a HashSet<i64>,
    now: DateTime<Utc>,
    deleted: HashSet<i64>,
    deleted_via_interval: HashSet<i64>,
    warnings: Vec<String>,
}

pub fn evaluate(
    policy: &RetentionPolicyDescr,
    backups: &[BaseBackupDescr],
    shm_referenced_ids: &HashSet<i64>,
    now: DateTime<Utc>,
) -> Result<CleanupDescriptor, RetentionError> {
    let mut eval = Evaluation {
        backups,
        shm_referenced_ids,
        now,
        deleted: HashSet::new(),
        deleted_via_interval: HashSet::new(),
        warnings: Vec::new(),
    };

    let mut pin_actions: Vec<(PinSelector, bool)> = Vec::new();

    for rule in &policy.rules {
        match rule.rule_type {
            RetentionRuleType::Pin => {
                if let RetentionRuleValue::PinSelector(sel) = &rule.value {
                    pin_actions.push((*sel, true));
                }
            }
            RetentionRuleType::Unpin => {
                if let RetentionRuleValue::PinSelector(sel) = &rule.value {
                    pin_actions.push((*sel, false));
                }
            }
            RetentionRuleType::Cleanup => eval.apply_cleanup()?,
            _ => eval.apply_rule(rule)?,
        }
    }

    eval.build_descriptor(pin_actions)
}

impl Evaluation<'_> {
    fn lock_state(&self, backup: &BaseBackupDescr) -> LockState {
        classify_lock(backup, self.shm_referenced_ids)
    }

    fn valid_backups(&self) -> Vec<&BaseBackupDescr> {
        self.backups
            .iter()
            .filter(|b| b.status == BackupStatus::Ready)
            .collect()
    }

    fn apply_rule(&mut self, rule: &RetentionRuleDescr) -> Result<(), RetentionError> {
        match (&rule.rule_type, &rule.value) {
            (RetentionRuleType::KeepWithLabel, RetentionRuleValue::Regex(pattern)) => {
                let re = regex::Regex::new(pattern)?;
                for b in self.backups {
                    let Some(id) = b.id else { continue };
                    let matches = b.label.as_deref().is_some_and(|l| re.is_match(l));
                    if !matches && self.lock_state(b) == LockState::NotLocked {
                        self.deleted.insert(id);
                    }
                }
            }
            (RetentionRuleType::DropWithLabel, RetentionRuleValue::Regex(pattern)) => {
                let re = regex::Regex::new(pattern)?;
                for b in self.backups {
                    let Some(id) = b.id else { continue };
                    let matches = b.label.as_deref().is_some_and(|l| re.is_match(l));
                    if matches && self.lock_state(b) == LockState::NotLocked {
                        self.deleted.insert(id);
                    }
                }
            }
            (RetentionRuleType::KeepNum, RetentionRuleValue::Count(n)) => {
                let valid = self.valid_backups();
                if valid.len() < *n as usize {
                    return Err(RetentionError::TooFewValidBackups {
                        required: *n,
                        available: valid.len(),
                    });
                }
                let mut kept = 0u32;
                for b in &valid {
                    let Some(id) = b.id else { continue };
                    if self.lock_state(b) != LockState::NotLocked {
                        continue;
                    }
                    if kept < *n {
                        kept += 1;
                    } else {
                        self.deleted.insert(id);
                    }
                }
            }
            (RetentionRuleType::DropNum, RetentionRuleValue::Count(n)) => {
                let valid = self.valid_backups();
                if valid.len() <= *n as usize {
                    return Err(RetentionError::NoValidBackupsRemain);
                }
                let mut dropped = 0u32;
                for b in valid.iter().rev() {
                    let Some(id) = b.id else { continue };
                    if dropped >= *n {
                        break;
                    }
                    if self.lock_state(b) != LockState::NotLocked {
                        continue;
                    }
                    self.deleted.insert(id);
                    dropped += 1;
                }
            }
            (
                RetentionRuleType::KeepNewerDt
                | RetentionRuleType::KeepOlderDt
                | RetentionRuleType::DropNewerDt
                | RetentionRuleType::DropOlderDt,
                RetentionRuleValue::Interval(expr),
            ) => {
                let threshold = expr.resolve(self.now);
                for b in self.backups {
                    let Some(id) = b.id else { continue };
                    if b.status == BackupStatus::InProgress {
                        self.warnings.push(format!(
                            "backup {id} is in progress; its cutoff contribution was degraded"
                        ));
                        continue;
                    }
                    if self.lock_state(b) == LockState::LockedByPin {
                        continue;
                    }
                    let Some(stopped) = b.stopped else { continue };
                    let newer = stopped > threshold;
                    let matches = match rule.rule_type {
                        RetentionRuleType::KeepNewerDt | RetentionRuleType::DropOlderDt => newer,
                        RetentionRuleType::KeepOlderDt | RetentionRuleType::DropNewerDt => !newer,
                        _ => unreachable!(),
                    };
                    let deletes = match rule.rule_type {
                        RetentionRuleType::KeepNewerDt | RetentionRuleType::KeepOlderDt => !matches,
                        RetentionRuleType::DropNewerDt | RetentionRuleType::DropOlderDt => matches,
                        _ => unreachable!(),
                    };
                    if deletes {
                        self.deleted.insert(id);
                        self.deleted_via_interval.insert(id);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_cleanup(&mut self) -> Result<(), RetentionError> {
        if self
            .backups
            .iter()
            .any(|b| b.status == BackupStatus::InProgress)
        {
            return Err(RetentionError::InProgressBlocksCleanup);
        }
        for b in self.backups {
            let Some(id) = b.id else { continue };
            if b.status != BackupStatus::Aborted {
                continue;
            }
            if self.lock_state(b) == LockState::LockedByPin {
                self.warnings.push(format!(
                    "backup {id} is aborted and pinned; retained with its WAL freed from its start"
                ));
                continue;
            }
            self.deleted.insert(id);
        }
        Ok(())
    }

    fn build_descriptor(
        self,
        pin_actions: Vec<(PinSelector, bool)>,
    ) -> Result<CleanupDescriptor, RetentionError> {
        let mut per_timeline: BTreeMap<Timeline, TimelineCutoff> = BTreeMap::new();

        let mut advance = |timeline: Timeline, ptr: crate::xlog::XLogRecPtr, segment_size: u64| {
            per_timeline
                .entry(timeline)
                .and_modify(|cutoff| {
                    if ptr.0 < cutoff.cleanup_start_ptr.0 {
                        cutoff.cleanup_start_ptr = ptr;
                    }
                })
                .or_insert(TimelineCutoff {
                    cleanup_start_ptr: ptr,
                    wal_segment_size: segment_size,
                });
        };

        for b in self.backups {
            let Some(id) = b.id else { continue };
            let is_deleted = self.deleted.contains(&id);
            let is_aborted_pinned_kept =
                b.status == BackupStatus::Aborted && b.pinned && !is_deleted;

            if is_deleted && self.deleted_via_interval.contains(&id) {
                if let Some(end) = b.xlogpos_end {
                    advance(b.timeline, end, b.wal_segment_size);
                }
                continue;
            }
            if is_deleted {
                // Deleted by a count/label/cleanup rule: its own WAL is no
                // longer this backup's concern, but we make no independent
                // cutoff claim for it (only interval rules do, per policy).
                continue;
            }
            if is_aborted_pinned_kept {
                if let Some(start) = b.xlogpos_start {
                    advance(b.timeline, start, b.wal_segment_size);
                }
                continue;
            }
            if let Some(start) = b.xlogpos_start {
                let preceding = start.preceding_segment_start(b.wal_segment_size);
                advance(b.timeline, preceding, b.wal_segment_size);
            }
        }

        let mut basebackups: Vec<i64> = self.deleted.into_iter().collect();
        basebackups.sort_unstable();

        Ok(CleanupDescriptor {
            mode: if per_timeline.is_empty() {
                CleanupMode::None
            } else {
                CleanupMode::WalCleanupOffset
            },
            basebackup_mode: if basebackups.is_empty() {
                BasebackupMode::Keep
            } else {
                BasebackupMode::Delete
            },
            basebackups,
            per_timeline_offsets: per_timeline,
            pin_actions,
            warnings: self.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PinSelector, RetentionRuleDescr, RetentionRuleType, RetentionRuleValue};
    use crate::xlog::{Timeline, XLogRecPtr};
    use chrono::Duration;

    fn backup(id: i64, started_hours_ago: i64, status: BackupStatus, pinned: bool) -> BaseBackupDescr {
        let now = Utc::now();
        let started = now - Duration::hours(started_hours_ago);
        let stopped = if status == BackupStatus::Ready {
            Some(started + Duration::minutes(10))
        } else {
            None
        };
        BaseBackupDescr {
            id: Some(id),
            archive_id: Some(1),
            xlogpos_start: Some(XLogRecPtr::new((id as u64) * 0x1000_0000)),
            xlogpos_end: stopped.map(|_| XLogRecPtr::new((id as u64) * 0x1000_0000 + 0x100)),
            timeline: Timeline(1),
            label: Some(format!("b{id}")),
            fsentry: Some(format!("/archive/base/b{id}").into()),
            started: Some(started),
            stopped,
            pinned,
            status,
            systemid: None,
            wal_segment_size: crate::xlog::DEFAULT_WAL_SEGMENT_SIZE,
            used_profile: None,
            tablespaces: Vec::new(),
            duration_seconds: None,
            exceeds_retention_rule: None,
            affected: Vec::new(),
        }
    }

    fn policy_with(rule_type: RetentionRuleType, value: RetentionRuleValue) -> RetentionPolicyDescr {
        RetentionPolicyDescr {
            id: Some(1),
            name: Some("p".into()),
            created: Some(Utc::now()),
            rules: vec![RetentionRuleDescr {
                id: Some(1),
                policy_id: Some(1),
                rule_type,
                value,
            }],
        }
    }

    #[test]
    fn keep_plus_2_deletes_oldest_three() {
        let backups = vec![
            backup(1, 1, BackupStatus::Ready, false),
            backup(2, 2, BackupStatus::Ready, false),
            backup(3, 3, BackupStatus::Ready, false),
            backup(4, 4, BackupStatus::Ready, false),
            backup(5, 5, BackupStatus::Ready, false),
        ];
        let policy = policy_with(RetentionRuleType::KeepNum, RetentionRuleValue::Count(2));
        let plan = evaluate(&policy, &backups, &HashSet::new(), Utc::now()).unwrap();
        let mut deleted = plan.basebackups.clone();
        deleted.sort_unstable();
        assert_eq!(deleted, vec![3, 4, 5]);
    }

    #[test]
    fn keep_plus_2_respects_pin() {
        let backups = vec![
            backup(1, 1, BackupStatus::Ready, false),
            backup(2, 2, BackupStatus::Ready, false),
            backup(3, 3, BackupStatus::Ready, false),
            backup(4, 4, BackupStatus::Ready, true),
            backup(5, 5, BackupStatus::Ready, false),
        ];
        let policy = policy_with(RetentionRuleType::KeepNum, RetentionRuleValue::Count(2));
        let plan = evaluate(&policy, &backups, &HashSet::new(), Utc::now()).unwrap();
        let mut deleted = plan.basebackups.clone();
        deleted.sort_unstable();
        assert_eq!(deleted, vec![3, 5]);
    }

    #[test]
    fn drop_plus_3_on_four_fails() {
        let backups = vec![
            backup(1, 1, BackupStatus::Ready, false),
            backup(2, 2, BackupStatus::Ready, false),
            backup(3, 3, BackupStatus::Ready, false),
            backup(4, 4, BackupStatus::Ready, false),
        ];
        let policy = policy_with(RetentionRuleType::DropNum, RetentionRuleValue::Count(3));
        let err = evaluate(&policy, &backups, &HashSet::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, RetentionError::NoValidBackupsRemain));
    }

    #[test]
    fn cleanup_with_in_progress_backup_aborts() {
        let backups = vec![
            backup(1, 1, BackupStatus::InProgress, false),
            backup(2, 2, BackupStatus::Aborted, false),
            backup(3, 3, BackupStatus::Aborted, false),
        ];
        let policy = policy_with(RetentionRuleType::Cleanup, RetentionRuleValue::None);
        let err = evaluate(&policy, &backups, &HashSet::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, RetentionError::InProgressBlocksCleanup));
    }

    #[test]
    fn cleanup_deletes_only_aborted() {
        let backups = vec![
            backup(1, 1, BackupStatus::Ready, false),
            backup(2, 2, BackupStatus::Aborted, false),
            backup(3, 3, BackupStatus::Aborted, true),
        ];
        let policy = policy_with(RetentionRuleType::Cleanup, RetentionRuleValue::None);
        let plan = evaluate(&policy, &backups, &HashSet::new(), Utc::now()).unwrap();
        assert_eq!(plan.basebackups, vec![2]);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn cutoff_moves_only_backward() {
        let backups = vec![
            backup(1, 1, BackupStatus::Ready, false),
            backup(2, 2, BackupStatus::Ready, false),
        ];
        let policy = policy_with(RetentionRuleType::KeepNum, RetentionRuleValue::Count(2));
        let plan = evaluate(&policy, &backups, &HashSet::new(), Utc::now()).unwrap();
        let cutoff = plan.per_timeline_offsets.get(&Timeline(1)).unwrap();
        assert!(cutoff.cleanup_start_ptr.0 < backups[0].xlogpos_start.unwrap().0);
    }

    #[test]
    fn unused_pin_selector_variant_compiles() {
        let _ = PinSelector::Pinned;
    }

    #[test]
    fn pin_rule_surfaces_as_pin_action() {
        let backups = vec![backup(1, 1, BackupStatus::Ready, false)];
        let policy = policy_with(RetentionRuleType::Pin, RetentionRuleValue::PinSelector(PinSelector::Newest));
        let plan = evaluate(&policy, &backups, &HashSet::new(), Utc::now()).unwrap();
        assert_eq!(plan.pin_actions, vec![(PinSelector::Newest, true)]);
    }
}
