use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{
        AuditEntry, GroupSummary, Honour, HonourField, HonourId, Member, MemberField, MemberId,
        NoFlag, RegistrationFlag,
    },
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        AuditQuery, CreateGroupRequest, CreateHonourRequest, CreateMemberRequest, HonourQuery,
        LogActionRequest, MemberQuery, UpdateFieldRequest, UpdateFlagRequest,
    },
};
use tracing::debug;
use url::Url;

pub mod bulk;
pub mod controller;
pub mod record;
pub mod selection;

pub use bulk::{
    BulkError, BulkGate, BulkMutation, BulkOperation, BulkOutcome, BulkReport, ConfirmedBulk,
    PendingConfirmation,
};
pub use controller::ListController;
pub use record::Record;
pub use selection::{header_checkbox_state, HeaderCheckboxState, SelectionSet};

/// Persistence calls a list screen needs for one kind of record.
#[async_trait]
pub trait RecordApi<R: Record>: Send + Sync {
    async fn fetch_list(&self, filter: &R::Filter) -> Result<Vec<R>>;
    async fn update_field(&self, id: &R::Id, field: R::Field, value: &str) -> Result<()>;
    async fn update_nested_flag(&self, id: &R::Id, flag: R::Flag, value: bool) -> Result<()>;
    async fn delete_record(&self, id: &R::Id) -> Result<()>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn log_action(&self, actor: &str, label: &str, details: serde_json::Value)
        -> Result<()>;
}

/// HTTP client for the club server.
#[derive(Clone)]
pub struct ClubClient {
    http: Client,
    base_url: Url,
}

impl ClubClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let base_url = Url::parse(server_url.trim())
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("server url '{server_url}' cannot be used as a base"));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("server url '{}' cannot be used as a base", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        query: &Q,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let res = self.http.get(url).query(query).send().await?;
        Ok(check(res).await?.json().await?)
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let res = self.http.post(url).json(body).send().await?;
        Ok(check(res).await?.json().await?)
    }

    async fn patch<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> Result<()> {
        let url = self.endpoint(segments)?;
        debug!(%url, "PATCH");
        let res = self.http.patch(url).json(body).send().await?;
        check(res).await?;
        Ok(())
    }

    async fn delete(&self, segments: &[&str]) -> Result<()> {
        let url = self.endpoint(segments)?;
        debug!(%url, "DELETE");
        let res = self.http.delete(url).send().await?;
        check(res).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<()> {
        let url = self.endpoint(&["healthz"])?;
        check(self.http.get(url).send().await?).await?;
        Ok(())
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>> {
        self.get_json(&["groups"], &[] as &[(&str, &str)]).await
    }

    pub async fn create_group(&self, name: &str) -> Result<GroupSummary> {
        self.post_json(
            &["groups"],
            &CreateGroupRequest {
                name: name.to_string(),
            },
        )
        .await
    }

    pub async fn list_members(&self, query: &MemberQuery) -> Result<Vec<Member>> {
        self.get_json(&["members"], query).await
    }

    pub async fn create_member(&self, req: &CreateMemberRequest) -> Result<Member> {
        self.post_json(&["members"], req).await
    }

    pub async fn update_member_field(
        &self,
        member_id: &MemberId,
        field: MemberField,
        value: &str,
    ) -> Result<()> {
        self.patch(
            &["members", member_id.as_str(), "fields"],
            &UpdateFieldRequest {
                field,
                value: value.to_string(),
            },
        )
        .await
    }

    pub async fn set_registration_flag(
        &self,
        member_id: &MemberId,
        flag: RegistrationFlag,
        value: bool,
    ) -> Result<()> {
        self.patch(
            &["members", member_id.as_str(), "registration"],
            &UpdateFlagRequest { flag, value },
        )
        .await
    }

    pub async fn delete_member(&self, member_id: &MemberId) -> Result<()> {
        self.delete(&["members", member_id.as_str()]).await
    }

    pub async fn list_honours(&self, query: &HonourQuery) -> Result<Vec<Honour>> {
        self.get_json(&["honours"], query).await
    }

    pub async fn create_honour(&self, req: &CreateHonourRequest) -> Result<Honour> {
        self.post_json(&["honours"], req).await
    }

    pub async fn update_honour_field(
        &self,
        honour_id: &HonourId,
        field: HonourField,
        value: &str,
    ) -> Result<()> {
        self.patch(
            &["honours", honour_id.as_str(), "fields"],
            &UpdateFieldRequest {
                field,
                value: value.to_string(),
            },
        )
        .await
    }

    pub async fn delete_honour(&self, honour_id: &HonourId) -> Result<()> {
        self.delete(&["honours", honour_id.as_str()]).await
    }

    pub async fn list_audit(&self, limit: Option<u32>) -> Result<Vec<AuditEntry>> {
        self.get_json(&["audit"], &AuditQuery { limit }).await
    }

    pub async fn record_action(&self, req: &LogActionRequest) -> Result<AuditEntry> {
        self.post_json(&["audit"], req).await
    }
}

/// Turns a non-2xx response into an [`ApiException`], preferring the server's
/// `ApiError` body over the bare status.
async fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let exception = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => ApiException::from(api_error),
        Err(_) if body.trim().is_empty() => {
            ApiException::new(code_for_status(status), status.to_string())
        }
        Err(_) => ApiException::new(code_for_status(status), body),
    };
    Err(exception.into())
}

fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNPROCESSABLE_ENTITY => {
            ErrorCode::Validation
        }
        StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
        StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ErrorCode::RateLimited,
        _ => ErrorCode::Internal,
    }
}

#[async_trait]
impl RecordApi<Member> for ClubClient {
    async fn fetch_list(&self, filter: &MemberQuery) -> Result<Vec<Member>> {
        self.list_members(filter).await
    }

    async fn update_field(&self, id: &MemberId, field: MemberField, value: &str) -> Result<()> {
        self.update_member_field(id, field, value).await
    }

    async fn update_nested_flag(
        &self,
        id: &MemberId,
        flag: RegistrationFlag,
        value: bool,
    ) -> Result<()> {
        self.set_registration_flag(id, flag, value).await
    }

    async fn delete_record(&self, id: &MemberId) -> Result<()> {
        self.delete_member(id).await
    }
}

#[async_trait]
impl RecordApi<Honour> for ClubClient {
    async fn fetch_list(&self, filter: &HonourQuery) -> Result<Vec<Honour>> {
        self.list_honours(filter).await
    }

    async fn update_field(&self, id: &HonourId, field: HonourField, value: &str) -> Result<()> {
        self.update_honour_field(id, field, value).await
    }

    async fn update_nested_flag(&self, _id: &HonourId, flag: NoFlag, _value: bool) -> Result<()> {
        match flag {}
    }

    async fn delete_record(&self, id: &HonourId) -> Result<()> {
        self.delete_honour(id).await
    }
}

#[async_trait]
impl AuditLog for ClubClient {
    async fn log_action(
        &self,
        actor: &str,
        label: &str,
        details: serde_json::Value,
    ) -> Result<()> {
        self.record_action(&LogActionRequest {
            actor: actor.to_string(),
            action: label.to_string(),
            details,
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
