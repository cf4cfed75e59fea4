use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use shared::{
    domain::{
        AuditEntry, AuditEntryId, GroupId, GroupSummary, Honour, HonourId, HonourStatus, Member,
        MemberId, MemberStatus, Registration, RegistrationFlag,
    },
    protocol::{normalize_search, HonourQuery, MemberQuery},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

const MEMBER_COLUMNS: &str = "id, first_name, last_name, group_name, class, status, \
     reg_form, reg_health_info, reg_fees_paid, created_at, updated_at";
const HONOUR_COLUMNS: &str =
    "id, member_id, name, category, status, awarded_at, created_at, updated_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub first_name: String,
    pub last_name: String,
    pub group: Option<String>,
    pub class: String,
    pub status: MemberStatus,
}

#[derive(Debug, Clone)]
pub struct NewHonour {
    pub member_id: MemberId,
    pub name: String,
    pub category: String,
    pub status: HonourStatus,
}

/// A validated scalar change to one member row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberUpdate {
    Group(Option<String>),
    Class(String),
    Status(MemberStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HonourUpdate {
    Status(HonourStatus),
    Category(String),
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_group(&self, name: &str) -> Result<GroupSummary> {
        let result = sqlx::query("INSERT INTO groups (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to create group '{name}'"))?;
        Ok(GroupSummary {
            group_id: GroupId(result.last_insert_rowid()),
            name: name.to_string(),
            member_count: 0,
        })
    }

    pub async fn group_exists(&self, name: &str) -> Result<bool> {
        Ok(self.canonical_group_name(name).await?.is_some())
    }

    /// Looks a group up case-insensitively and returns its name as stored.
    pub async fn canonical_group_name(&self, name: &str) -> Result<Option<String>> {
        let found: Option<String> = sqlx::query_scalar("SELECT name FROM groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found)
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>> {
        let rows = sqlx::query(
            "SELECT g.id, g.name, COUNT(m.id)
             FROM groups g
             LEFT JOIN members m ON m.group_name = g.name
             GROUP BY g.id, g.name
             ORDER BY g.name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| GroupSummary {
                group_id: GroupId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
                member_count: r.get::<i64, _>(2).max(0) as u64,
            })
            .collect())
    }

    pub async fn create_member(&self, new_member: NewMember) -> Result<Member> {
        let now = Utc::now();
        let member = Member {
            id: MemberId::generate(),
            first_name: new_member.first_name,
            last_name: new_member.last_name,
            group: new_member.group,
            class: new_member.class,
            status: new_member.status,
            registration: Registration::default(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO members (id, first_name, last_name, group_name, class, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(member.id.as_str())
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(member.group.as_deref())
        .bind(&member.class)
        .bind(member.status.as_str())
        .bind(member.created_at)
        .bind(member.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to insert member")?;
        debug!(member_id = %member.id, "member inserted");
        Ok(member)
    }

    pub async fn get_member(&self, member_id: &MemberId) -> Result<Option<Member>> {
        let row = sqlx::query(&format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?"))
            .bind(member_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    pub async fn list_members(&self, query: &MemberQuery) -> Result<Vec<Member>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {MEMBER_COLUMNS} FROM members WHERE 1 = 1"));
        if let Some(term) = normalize_search(query.search.as_deref()) {
            builder
                .push(" AND lower(first_name || ' ' || last_name) LIKE ")
                .push_bind(like_pattern(&term))
                .push(" ESCAPE '\\'");
        }
        if let Some(group) = non_blank(query.group.as_deref()) {
            builder.push(" AND group_name = ").push_bind(group.to_string());
        }
        if let Some(class) = non_blank(query.class.as_deref()) {
            builder
                .push(" AND class = ")
                .push_bind(class.to_string())
                .push(" COLLATE NOCASE");
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(
            " ORDER BY last_name COLLATE NOCASE ASC, first_name COLLATE NOCASE ASC, id ASC",
        );

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(member_from_row).collect()
    }

    /// Returns `false` when no member has the given id.
    pub async fn update_member(&self, member_id: &MemberId, update: &MemberUpdate) -> Result<bool> {
        let (column, value) = match update {
            MemberUpdate::Group(group) => ("group_name", group.clone()),
            MemberUpdate::Class(class) => ("class", Some(class.clone())),
            MemberUpdate::Status(status) => ("status", Some(status.as_str().to_string())),
        };
        let result = sqlx::query(&format!(
            "UPDATE members SET {column} = ?, updated_at = ? WHERE id = ?"
        ))
        .bind(value)
        .bind(Utc::now())
        .bind(member_id.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update {column} for member {member_id}"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_registration_flag(
        &self,
        member_id: &MemberId,
        flag: RegistrationFlag,
        value: bool,
    ) -> Result<bool> {
        let column = registration_column(flag);
        let result = sqlx::query(&format!(
            "UPDATE members SET {column} = ?, updated_at = ? WHERE id = ?"
        ))
        .bind(value)
        .bind(Utc::now())
        .bind(member_id.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to set {} for member {member_id}", flag.path()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes the member and, through the foreign key, their honours.
    pub async fn delete_member(&self, member_id: &MemberId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(member_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_honour(&self, new_honour: NewHonour) -> Result<Honour> {
        let now = Utc::now();
        let honour = Honour {
            id: HonourId::generate(),
            member_id: new_honour.member_id,
            name: new_honour.name,
            category: new_honour.category,
            status: new_honour.status,
            awarded_at: (new_honour.status == HonourStatus::Awarded).then_some(now),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO honours (id, member_id, name, category, status, awarded_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(honour.id.as_str())
        .bind(honour.member_id.as_str())
        .bind(&honour.name)
        .bind(&honour.category)
        .bind(honour.status.as_str())
        .bind(honour.awarded_at)
        .bind(honour.created_at)
        .bind(honour.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to insert honour")?;
        Ok(honour)
    }

    pub async fn get_honour(&self, honour_id: &HonourId) -> Result<Option<Honour>> {
        let row = sqlx::query(&format!("SELECT {HONOUR_COLUMNS} FROM honours WHERE id = ?"))
            .bind(honour_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(honour_from_row).transpose()
    }

    pub async fn list_honours(&self, query: &HonourQuery) -> Result<Vec<Honour>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {HONOUR_COLUMNS} FROM honours WHERE 1 = 1"));
        if let Some(term) = normalize_search(query.search.as_deref()) {
            builder
                .push(" AND lower(name) LIKE ")
                .push_bind(like_pattern(&term))
                .push(" ESCAPE '\\'");
        }
        if let Some(member_id) = &query.member_id {
            builder
                .push(" AND member_id = ")
                .push_bind(member_id.as_str().to_string());
        }
        if let Some(category) = non_blank(query.category.as_deref()) {
            builder
                .push(" AND category = ")
                .push_bind(category.to_string())
                .push(" COLLATE NOCASE");
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY name COLLATE NOCASE ASC, created_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(honour_from_row).collect()
    }

    /// Moving into `awarded` stamps `awarded_at` once; leaving it clears the stamp.
    pub async fn update_honour(&self, honour_id: &HonourId, update: &HonourUpdate) -> Result<bool> {
        let now = Utc::now();
        let result = match update {
            HonourUpdate::Status(status) => {
                sqlx::query(
                    "UPDATE honours
                     SET status = ?1,
                         awarded_at = CASE WHEN ?1 = 'awarded' THEN COALESCE(awarded_at, ?2) ELSE NULL END,
                         updated_at = ?2
                     WHERE id = ?3",
                )
                .bind(status.as_str())
                .bind(now)
                .bind(honour_id.as_str())
                .execute(&self.pool)
                .await
            }
            HonourUpdate::Category(category) => {
                sqlx::query("UPDATE honours SET category = ?1, updated_at = ?2 WHERE id = ?3")
                    .bind(category)
                    .bind(now)
                    .bind(honour_id.as_str())
                    .execute(&self.pool)
                    .await
            }
        }
        .with_context(|| format!("failed to update honour {honour_id}"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_honour(&self, honour_id: &HonourId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM honours WHERE id = ?")
            .bind(honour_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_audit_entry(
        &self,
        actor: &str,
        action: &str,
        details: &serde_json::Value,
    ) -> Result<AuditEntry> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO audit_log (actor, action, details, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(actor)
        .bind(action)
        .bind(serde_json::to_string(details)?)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("failed to append audit entry")?;
        Ok(AuditEntry {
            entry_id: AuditEntryId(result.last_insert_rowid()),
            actor: actor.to_string(),
            action: action.to_string(),
            details: details.clone(),
            created_at,
        })
    }

    /// Newest entries first.
    pub async fn list_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, actor, action, details, created_at
             FROM audit_log
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let details: String = row.try_get("details")?;
                Ok(AuditEntry {
                    entry_id: AuditEntryId(row.try_get("id")?),
                    actor: row.try_get("actor")?,
                    action: row.try_get("action")?,
                    details: serde_json::from_str(&details)
                        .context("audit details are not valid json")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

fn registration_column(flag: RegistrationFlag) -> &'static str {
    match flag {
        RegistrationFlag::Form => "reg_form",
        RegistrationFlag::HealthInfo => "reg_health_info",
        RegistrationFlag::FeesPaid => "reg_fees_paid",
    }
}

fn member_from_row(row: &SqliteRow) -> Result<Member> {
    let status: String = row.try_get("status")?;
    Ok(Member {
        id: MemberId(row.try_get("id")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        group: row.try_get("group_name")?,
        class: row.try_get("class")?,
        status: status.parse()?,
        registration: Registration {
            form: row.try_get("reg_form")?,
            health_info: row.try_get("reg_health_info")?,
            fees_paid: row.try_get("reg_fees_paid")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn honour_from_row(row: &SqliteRow) -> Result<Honour> {
    let status: String = row.try_get("status")?;
    Ok(Honour {
        id: HonourId(row.try_get("id")?),
        member_id: MemberId(row.try_get("member_id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        status: status.parse()?,
        awarded_at: row.try_get::<Option<DateTime<Utc>>, _>("awarded_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
