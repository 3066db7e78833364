use rusqlite::params;

use super::{
    BackupSelector, Catalog, CatalogError, PinSelector, RetentionPolicyDescr, RetentionRuleDescr,
    RetentionRuleType, RetentionRuleValue,
};

impl Catalog {
    pub fn create_retention_policy(
        &mut self,
        descr: &RetentionPolicyDescr,
    ) -> Result<i64, CatalogError> {
        let name = descr
            .name
            .clone()
            .ok_or_else(|| CatalogError::Transaction("policy name is required".into()))?;
        self.conn().execute(
            "INSERT INTO retention (name, created) VALUES (?1, ?2)",
            params![name, descr.created.unwrap_or_else(chrono::Utc::now)],
        )?;
        let policy_id = self.conn().last_insert_rowid();
        for rule in &descr.rules {
            self.add_retention_rule(policy_id, rule)?;
        }
        Ok(policy_id)
    }

    pub fn add_retention_rule(
        &mut self,
        policy_id: i64,
        rule: &RetentionRuleDescr,
    ) -> Result<i64, CatalogError> {
        let (type_str, value_str) = encode_rule(&rule.rule_type, &rule.value);
        self.conn().execute(
            "INSERT INTO retention_rules (policy_id, type, value) VALUES (?1, ?2, ?3)",
            params![policy_id, type_str, value_str],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn drop_retention_policy(&mut self, name: &str) -> Result<(), CatalogError> {
        let affected = self
            .conn()
            .execute("DELETE FROM retention WHERE name = ?1", [name])?;
        if affected == 0 {
            return Err(CatalogError::NoSuchRetentionPolicy(name.to_owned()));
        }
        Ok(())
    }

    pub fn get_retention_policy(&self, name: &str) -> Result<RetentionPolicyDescr, CatalogError> {
        let (id, created) = self
            .conn()
            .query_row(
                "SELECT id, created FROM retention WHERE name = ?1",
                [name],
                |row| Ok((row.get::<_, i64>(0)?, row.get(1)?)),
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    CatalogError::NoSuchRetentionPolicy(name.to_owned())
                }
                other => other.into(),
            })?;

        let mut stmt = self
            .conn()
            .prepare("SELECT id, policy_id, type, value FROM retention_rules WHERE policy_id = ?1")?;
        let rows = stmt.query_map([id], |row| {
            let type_str: String = row.get(2)?;
            let value_str: Option<String> = row.get(3)?;
            let (rule_type, value) = decode_rule(&type_str, value_str.as_deref())
                .map_err(|e| rusqlite::Error::InvalidColumnType(2, e, rusqlite::types::Type::Text))?;
            Ok(RetentionRuleDescr {
                id: row.get(0)?,
                policy_id: row.get(1)?,
                rule_type,
                value,
            })
        })?;
        let rules = rows.collect::<Result<Vec<_>, _>>()?;

        Ok(RetentionPolicyDescr {
            id: Some(id),
            name: Some(name.to_owned()),
            created: Some(created),
            rules,
        })
    }

    pub fn get_retention_policies(&self) -> Result<Vec<RetentionPolicyDescr>, CatalogError> {
        let mut stmt = self.conn().prepare("SELECT name FROM retention ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        names.iter().map(|name| self.get_retention_policy(name)).collect()
    }

    /// Apply a `PIN`/`UNPIN` selector directly against an archive's backups.
    /// Returns the ids that were (un)pinned.
    pub fn perform_pin_action(
        &mut self,
        archive_id: i64,
        selector: PinSelector,
        pin: bool,
    ) -> Result<Vec<i64>, CatalogError> {
        let targets: Vec<i64> = match selector {
            PinSelector::ById(id) => vec![id],
            PinSelector::Count(k) => {
                let mut stmt = self.conn().prepare(
                    "SELECT id FROM backup WHERE archive_id = ?1 AND status = 'ready'
                     ORDER BY started DESC LIMIT ?2",
                )?;
                stmt.query_map(params![archive_id, k], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?
            }
            PinSelector::Newest => {
                let id = self.get_base_backup(archive_id, BackupSelector::Newest)?.id;
                id.into_iter().collect()
            }
            PinSelector::Oldest => {
                let id = self.get_base_backup(archive_id, BackupSelector::Oldest)?.id;
                id.into_iter().collect()
            }
            PinSelector::Pinned => {
                if pin {
                    return Err(CatalogError::Transaction(
                        "selector `pinned` is only valid for UNPIN".into(),
                    ));
                }
                let mut stmt = self
                    .conn()
                    .prepare("SELECT id FROM backup WHERE archive_id = ?1 AND pinned = 1")?;
                stmt.query_map([archive_id], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        for id in &targets {
            self.conn().execute(
                "UPDATE backup SET pinned = ?1 WHERE id = ?2",
                params![pin, id],
            )?;
        }
        Ok(targets)
    }
}

fn encode_rule(rule_type: &RetentionRuleType, value: &RetentionRuleValue) -> (&'static str, Option<String>) {
    let type_str = match rule_type {
        RetentionRuleType::KeepWithLabel => "keep_with_label",
        RetentionRuleType::DropWithLabel => "drop_with_label",
        RetentionRuleType::KeepNum => "keep_num",
        RetentionRuleType::DropNum => "drop_num",
        RetentionRuleType::KeepNewerDt => "keep_newer_than",
        RetentionRuleType::KeepOlderDt => "keep_older_than",
        RetentionRuleType::DropNewerDt => "drop_newer_than",
        RetentionRuleType::DropOlderDt => "drop_older_than",
        RetentionRuleType::Pin => "pin",
        RetentionRuleType::Unpin => "unpin",
        RetentionRuleType::Cleanup => "cleanup",
    };
    let value_str = match value {
        RetentionRuleValue::Regex(re) => Some(re.clone()),
        RetentionRuleValue::Count(n) => Some(n.to_string()),
        RetentionRuleValue::Interval(expr) => Some(expr.compile()),
        RetentionRuleValue::PinSelector(sel) => Some(encode_pin_selector(*sel)),
        RetentionRuleValue::None => None,
    };
    (type_str, value_str)
}

fn decode_rule(
    type_str: &str,
    value_str: Option<&str>,
) -> Result<(RetentionRuleType, RetentionRuleValue), String> {
    let rule_type = match type_str {
        "keep_with_label" => RetentionRuleType::KeepWithLabel,
        "drop_with_label" => RetentionRuleType::DropWithLabel,
        "keep_num" => RetentionRuleType::KeepNum,
        "drop_num" => RetentionRuleType::DropNum,
        "keep_newer_than" => RetentionRuleType::KeepNewerDt,
        "keep_older_than" => RetentionRuleType::KeepOlderDt,
        "drop_newer_than" => RetentionRuleType::DropNewerDt,
        "drop_older_than" => RetentionRuleType::DropOlderDt,
        "pin" => RetentionRuleType::Pin,
        "unpin" => RetentionRuleType::Unpin,
        "cleanup" => RetentionRuleType::Cleanup,
        other => return Err(format!("unknown retention rule type: {other}")),
    };
    let value = match rule_type {
        RetentionRuleType::KeepWithLabel | RetentionRuleType::DropWithLabel => {
            RetentionRuleValue::Regex(value_str.unwrap_or_default().to_owned())
        }
        RetentionRuleType::KeepNum | RetentionRuleType::DropNum => RetentionRuleValue::Count(
            value_str.unwrap_or("0").parse().map_err(|_| "bad count".to_owned())?,
        ),
        RetentionRuleType::KeepNewerDt
        | RetentionRuleType::KeepOlderDt
        | RetentionRuleType::DropNewerDt
        | RetentionRuleType::DropOlderDt => RetentionRuleValue::Interval(
            super::interval::RetentionIntervalExpr::parse(value_str.unwrap_or_default())
                .map_err(|e| e.to_string())?,
        ),
        RetentionRuleType::Pin | RetentionRuleType::Unpin => {
            RetentionRuleValue::PinSelector(decode_pin_selector(value_str.unwrap_or_default())?)
        }
        RetentionRuleType::Cleanup => RetentionRuleValue::None,
    };
    Ok((rule_type, value))
}

fn encode_pin_selector(sel: PinSelector) -> String {
    match sel {
        PinSelector::ById(id) => format!("by_id({id})"),
        PinSelector::Count(n) => format!("count({n})"),
        PinSelector::Newest => "newest".to_owned(),
        PinSelector::Oldest => "oldest".to_owned(),
        PinSelector::Pinned => "pinned".to_owned(),
    }
}

fn decode_pin_selector(s: &str) -> Result<PinSelector, String> {
    if let Some(inner) = s.strip_prefix("by_id(").and_then(|s| s.strip_suffix(')')) {
        return inner.parse().map(PinSelector::ById).map_err(|_| "bad by_id selector".to_owned());
    }
    if let Some(inner) = s.strip_prefix("count(").and_then(|s| s.strip_suffix(')')) {
        return inner.parse().map(PinSelector::Count).map_err(|_| "bad count selector".to_owned());
    }
    match s {
        "newest" => Ok(PinSelector::Newest),
        "oldest" => Ok(PinSelector::Oldest),
        "pinned" => Ok(PinSelector::Pinned),
        other => Err(format!("unknown pin selector: {other}")),
    }
}
