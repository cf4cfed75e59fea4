use shared::{
    domain::{
        AuditEntry, GroupSummary, Honour, HonourField, HonourId, HonourStatus, Member, MemberField,
        MemberId, MemberStatus, RegistrationFlag,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        CreateGroupRequest, CreateHonourRequest, CreateMemberRequest, HonourQuery,
        LogActionRequest, MemberQuery,
    },
};
use storage::{HonourUpdate, MemberUpdate, NewHonour, NewMember, Storage};
use tracing::info;

pub const MAX_NAME_BYTES: usize = 120;
pub const DEFAULT_AUDIT_LIMIT: u32 = 50;
pub const MAX_AUDIT_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_groups(ctx: &ApiContext) -> Result<Vec<GroupSummary>, ApiError> {
    ctx.storage.list_groups().await.map_err(internal)
}

pub async fn create_group(
    ctx: &ApiContext,
    req: CreateGroupRequest,
) -> Result<GroupSummary, ApiError> {
    let name = required_name("group name", &req.name)?;
    if ctx.storage.group_exists(&name).await.map_err(internal)? {
        return Err(ApiError::validation(format!("group '{name}' already exists")));
    }
    let group = ctx.storage.create_group(&name).await.map_err(internal)?;
    info!(group_id = group.group_id.0, name = %group.name, "group created");
    Ok(group)
}

pub async fn list_members(ctx: &ApiContext, query: &MemberQuery) -> Result<Vec<Member>, ApiError> {
    ctx.storage.list_members(query).await.map_err(internal)
}

pub async fn create_member(
    ctx: &ApiContext,
    req: CreateMemberRequest,
) -> Result<Member, ApiError> {
    let first_name = required_name("first name", &req.first_name)?;
    let last_name = required_name("last name", &req.last_name)?;
    let group = resolve_group(ctx, req.group.as_deref().unwrap_or_default()).await?;
    let member = ctx
        .storage
        .create_member(NewMember {
            first_name,
            last_name,
            group,
            class: req.class.trim().to_string(),
            status: req.status.unwrap_or(MemberStatus::Active),
        })
        .await
        .map_err(internal)?;
    info!(member_id = %member.id, "member created");
    Ok(member)
}

/// Applies one scalar change. `value` is validated against the field: `group` must
/// name an existing group (blank clears it) and `status` must be a member status.
pub async fn update_member_field(
    ctx: &ApiContext,
    member_id: &MemberId,
    field: MemberField,
    value: &str,
) -> Result<(), ApiError> {
    let update = match field {
        MemberField::Group => MemberUpdate::Group(resolve_group(ctx, value).await?),
        MemberField::Class => MemberUpdate::Class(bounded_text("class", value)?),
        MemberField::Status => MemberUpdate::Status(value.parse::<MemberStatus>()?),
    };
    let found = ctx
        .storage
        .update_member(member_id, &update)
        .await
        .map_err(internal)?;
    if !found {
        return Err(member_not_found(member_id));
    }
    info!(member_id = %member_id, field = %field, "member field updated");
    Ok(())
}

pub async fn set_registration_flag(
    ctx: &ApiContext,
    member_id: &MemberId,
    flag: RegistrationFlag,
    value: bool,
) -> Result<(), ApiError> {
    let found = ctx
        .storage
        .set_registration_flag(member_id, flag, value)
        .await
        .map_err(internal)?;
    if !found {
        return Err(member_not_found(member_id));
    }
    info!(member_id = %member_id, flag = %flag.path(), value, "registration flag updated");
    Ok(())
}

pub async fn delete_member(ctx: &ApiContext, member_id: &MemberId) -> Result<(), ApiError> {
    if !ctx.storage.delete_member(member_id).await.map_err(internal)? {
        return Err(member_not_found(member_id));
    }
    info!(member_id = %member_id, "member deleted");
    Ok(())
}

pub async fn list_honours(ctx: &ApiContext, query: &HonourQuery) -> Result<Vec<Honour>, ApiError> {
    ctx.storage.list_honours(query).await.map_err(internal)
}

pub async fn create_honour(
    ctx: &ApiContext,
    req: CreateHonourRequest,
) -> Result<Honour, ApiError> {
    let name = required_name("honour name", &req.name)?;
    let category = bounded_text("category", &req.category)?;
    if ctx
        .storage
        .get_member(&req.member_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(member_not_found(&req.member_id));
    }
    let honour = ctx
        .storage
        .create_honour(NewHonour {
            member_id: req.member_id,
            name,
            category,
            status: req.status.unwrap_or(HonourStatus::InProgress),
        })
        .await
        .map_err(internal)?;
    info!(honour_id = %honour.id, member_id = %honour.member_id, "honour created");
    Ok(honour)
}

pub async fn update_honour_field(
    ctx: &ApiContext,
    honour_id: &HonourId,
    field: HonourField,
    value: &str,
) -> Result<(), ApiError> {
    let update = match field {
        HonourField::Status => HonourUpdate::Status(value.parse::<HonourStatus>()?),
        HonourField::Category => HonourUpdate::Category(bounded_text("category", value)?),
    };
    let found = ctx
        .storage
        .update_honour(honour_id, &update)
        .await
        .map_err(internal)?;
    if !found {
        return Err(honour_not_found(honour_id));
    }
    info!(honour_id = %honour_id, field = %field, "honour field updated");
    Ok(())
}

pub async fn delete_honour(ctx: &ApiContext, honour_id: &HonourId) -> Result<(), ApiError> {
    if !ctx.storage.delete_honour(honour_id).await.map_err(internal)? {
        return Err(honour_not_found(honour_id));
    }
    info!(honour_id = %honour_id, "honour deleted");
    Ok(())
}

pub async fn record_action(
    ctx: &ApiContext,
    req: LogActionRequest,
) -> Result<AuditEntry, ApiError> {
    let actor = required_name("actor", &req.actor)?;
    let action = required_name("action", &req.action)?;
    let entry = ctx
        .storage
        .insert_audit_entry(&actor, &action, &req.details)
        .await
        .map_err(internal)?;
    info!(entry_id = entry.entry_id.0, %actor, %action, "audit entry recorded");
    Ok(entry)
}

pub async fn list_actions(ctx: &ApiContext, limit: Option<u32>) -> Result<Vec<AuditEntry>, ApiError> {
    let limit = limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    ctx.storage
        .list_audit_entries(limit)
        .await
        .map_err(internal)
}

/// Blank clears the group; anything else must already exist.
async fn resolve_group(ctx: &ApiContext, raw: &str) -> Result<Option<String>, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Ok(None);
    }
    match ctx.storage.canonical_group_name(name).await.map_err(internal)? {
        Some(stored) => Ok(Some(stored)),
        None => Err(ApiError::validation(format!("unknown group '{name}'"))),
    }
}

fn required_name(what: &str, raw: &str) -> Result<String, ApiError> {
    let value = bounded_text(what, raw)?;
    if value.is_empty() {
        return Err(ApiError::validation(format!("{what} cannot be empty")));
    }
    Ok(value)
}

fn bounded_text(what: &str, raw: &str) -> Result<String, ApiError> {
    let value = raw.trim();
    if value.len() > MAX_NAME_BYTES {
        return Err(ApiError::validation(format!(
            "{what} exceeds {MAX_NAME_BYTES} bytes"
        )));
    }
    Ok(value.to_string())
}

fn member_not_found(member_id: &MemberId) -> ApiError {
    ApiError::not_found(format!("member {member_id} not found"))
}

fn honour_not_found(honour_id: &HonourId) -> ApiError {
    ApiError::not_found(format!("honour {honour_id} not found"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
