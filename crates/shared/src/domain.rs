use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

macro_rules! record_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(GroupId);
id_newtype!(AuditEntryId);

record_id_newtype!(MemberId);
record_id_newtype!(HonourId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Implements `as_str`, `Display` and case-insensitive `FromStr` over the wire names.
macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let trimmed = raw.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(trimmed))
                    .ok_or_else(|| ParseEnumError::new($kind, raw))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Inactive,
    Pending,
}

wire_enum!(MemberStatus, "member status", {
    Active => "active",
    Inactive => "inactive",
    Pending => "pending",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HonourStatus {
    InProgress,
    Completed,
    Awarded,
}

wire_enum!(HonourStatus, "honour status", {
    InProgress => "in_progress",
    Completed => "completed",
    Awarded => "awarded",
});

/// Scalar member columns that can be rewritten in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberField {
    Group,
    Class,
    Status,
}

wire_enum!(MemberField, "member field", {
    Group => "group",
    Class => "class",
    Status => "status",
});

/// Flags inside a member's `registration` bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistrationFlag {
    Form,
    HealthInfo,
    FeesPaid,
}

wire_enum!(RegistrationFlag, "registration flag", {
    Form => "form",
    HealthInfo => "healthInfo",
    FeesPaid => "feesPaid",
});

impl RegistrationFlag {
    pub fn path(self) -> String {
        format!("registration.{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HonourField {
    Status,
    Category,
}

wire_enum!(HonourField, "honour field", {
    Status => "status",
    Category => "category",
});

/// Flag type for records without a flag bag. It has no values, so flag updates
/// against such records cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoFlag {}

impl fmt::Display for NoFlag {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub form: bool,
    pub health_info: bool,
    pub fees_paid: bool,
}

impl Registration {
    pub fn get(&self, flag: RegistrationFlag) -> bool {
        match flag {
            RegistrationFlag::Form => self.form,
            RegistrationFlag::HealthInfo => self.health_info,
            RegistrationFlag::FeesPaid => self.fees_paid,
        }
    }

    pub fn set(&mut self, flag: RegistrationFlag, value: bool) {
        match flag {
            RegistrationFlag::Form => self.form = value,
            RegistrationFlag::HealthInfo => self.health_info = value,
            RegistrationFlag::FeesPaid => self.fees_paid = value,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.form && self.health_info && self.fees_paid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub class: String,
    pub status: MemberStatus,
    #[serde(default)]
    pub registration: Registration,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Honour {
    pub id: HonourId,
    pub member_id: MemberId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub status: HonourStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: GroupId,
    pub name: String,
    pub member_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: AuditEntryId,
    pub actor: String,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
