use serde::{Deserialize, Serialize};

use crate::domain::{Honour, HonourStatus, Member, MemberId, MemberStatus};

/// Lowercased, trimmed search term; `None` when the term is blank.
pub fn normalize_search(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
}

fn text_matches(expected: Option<&str>, actual: &str) -> bool {
    match expected.map(str::trim).filter(|value| !value.is_empty()) {
        Some(expected) => expected.eq_ignore_ascii_case(actual.trim()),
        None => true,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
}

impl MemberQuery {
    pub fn matches(&self, member: &Member) -> bool {
        if let Some(term) = normalize_search(self.search.as_deref()) {
            if !member.full_name().to_lowercase().contains(&term) {
                return false;
            }
        }
        if !text_matches(self.group.as_deref(), member.group.as_deref().unwrap_or_default()) {
            return false;
        }
        if !text_matches(self.class.as_deref(), &member.class) {
            return false;
        }
        self.status.map_or(true, |status| member.status == status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HonourQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<MemberId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HonourStatus>,
}

impl HonourQuery {
    pub fn matches(&self, honour: &Honour) -> bool {
        if let Some(term) = normalize_search(self.search.as_deref()) {
            if !honour.name.to_lowercase().contains(&term) {
                return false;
            }
        }
        if let Some(member_id) = &self.member_id {
            if &honour.member_id != member_id {
                return false;
            }
        }
        if !text_matches(self.category.as_deref(), &honour.category) {
            return false;
        }
        self.status.map_or(true, |status| honour.status == status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMemberRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHonourRequest {
    pub member_id: MemberId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HonourStatus>,
}

/// Sets one scalar field. Values travel as text and are validated per field server side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFieldRequest<F> {
    pub field: F,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFlagRequest<G> {
    pub flag: G,
    pub value: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogActionRequest {
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}
