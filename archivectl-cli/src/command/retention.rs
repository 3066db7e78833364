use archivectl::catalog::interval::RetentionIntervalExpr;
use archivectl::catalog::{RetentionPolicyDescr, RetentionRuleDescr, RetentionRuleType, RetentionRuleValue};
use archivectl::command::Command;

use super::pin::parse_pin_selector;

/// One `--rule TYPE[:VALUE]` flag, parsed into a `RetentionRuleDescr`.
fn parse_rule(s: &str) -> Result<RetentionRuleDescr, String> {
    let (kind, value) = match s.split_once(':') {
        Some((kind, value)) => (kind, Some(value)),
        None => (s, None),
    };
    let (rule_type, value) = match kind {
        "keep_with_label" => (
            RetentionRuleType::KeepWithLabel,
            RetentionRuleValue::Regex(value.ok_or("keep_with_label requires a regex")?.to_owned()),
        ),
        "drop_with_label" => (
            RetentionRuleType::DropWithLabel,
            RetentionRuleValue::Regex(value.ok_or("drop_with_label requires a regex")?.to_owned()),
        ),
        "keep_num" => (
            RetentionRuleType::KeepNum,
            RetentionRuleValue::Count(
                value.ok_or("keep_num requires a count")?.parse().map_err(|_| "bad count")?,
            ),
        ),
        "drop_num" => (
            RetentionRuleType::DropNum,
            RetentionRuleValue::Count(
                value.ok_or("drop_num requires a count")?.parse().map_err(|_| "bad count")?,
            ),
        ),
        "keep_newer_than" => (
            RetentionRuleType::KeepNewerDt,
            RetentionRuleValue::Interval(
                RetentionIntervalExpr::parse(value.ok_or("keep_newer_than requires an interval")?)
                    .map_err(|e| e.to_string())?,
            ),
        ),
        "keep_older_than" => (
            RetentionRuleType::KeepOlderDt,
            RetentionRuleValue::Interval(
                RetentionIntervalExpr::parse(value.ok_or("keep_older_than requires an interval")?)
                    .map_err(|e| e.to_string())?,
            ),
        ),
        "drop_newer_than" => (
            RetentionRuleType::DropNewerDt,
            RetentionRuleValue::Interval(
                RetentionIntervalExpr::parse(value.ok_or("drop_newer_than requires an interval")?)
                    .map_err(|e| e.to_string())?,
            ),
        ),
        "drop_older_than" => (
            RetentionRuleType::DropOlderDt,
            RetentionRuleValue::Interval(
                RetentionIntervalExpr::parse(value.ok_or("drop_older_than requires an interval")?)
                    .map_err(|e| e.to_string())?,
            ),
        ),
        "pin" => (
            RetentionRuleType::Pin,
            RetentionRuleValue::PinSelector(parse_pin_selector(value.ok_or("pin requires a selector")?)?),
        ),
        "unpin" => (
            RetentionRuleType::Unpin,
            RetentionRuleValue::PinSelector(parse_pin_selector(value.ok_or("unpin requires a selector")?)?),
        ),
        "cleanup" => (RetentionRuleType::Cleanup, RetentionRuleValue::None),
        other => return Err(format!("unknown retention rule type: {other:?}")),
    };
    Ok(RetentionRuleDescr { id: None, policy_id: None, rule_type, value })
}

#[derive(clap::Subcommand, Debug)]
pub enum RetentionCommand {
    /// Create a named retention policy from one or more `--rule` flags.
    Create {
        name: String,
        /// e.g. `keep_num:5`, `keep_newer_than:7d`, `cleanup`.
        #[clap(long = "rule", value_parser = parse_rule)]
        rules: Vec<RetentionRuleDescr>,
    },
    /// Remove a retention policy.
    Drop { name: String },
    /// Evaluate a policy against an archive's backups and report the plan.
    Apply { policy: String, archive: String },
    /// List all retention policies.
    List,
    /// Show one retention policy's rules.
    Show { name: String },
}

impl RetentionCommand {
    #[must_use]
    pub fn into_command(self) -> Command {
        match self {
            RetentionCommand::Create { name, rules } => {
                let descr = RetentionPolicyDescr { name: Some(name), rules, ..Default::default() };
                Command::CreateRetentionPolicy { descr }
            }
            RetentionCommand::Drop { name } => Command::DropRetentionPolicy { name },
            RetentionCommand::Apply { policy, archive } => Command::ApplyRetentionPolicy { policy, archive },
            RetentionCommand::List => Command::ListRetentionPolicies,
            RetentionCommand::Show { name } => Command::ListRetentionPolicy { name },
        }
    }
}
