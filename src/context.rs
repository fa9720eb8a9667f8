use crate::errors::ServiceError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use uuid::Uuid;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const BRANCH_HEADER: &str = "x-branch-id";

/// Caller identity for one request, set by the upstream auth gateway.
///
/// Every service operation receives this explicitly and scopes its queries to
/// `tenant_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(tenant_id: Uuid, user_id: Uuid) -> Self {
        Self {
            tenant_id,
            user_id,
            branch_id: None,
            ip: None,
            user_agent: None,
            request_id: None,
        }
    }

    pub fn with_branch(mut self, branch_id: Uuid) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ServiceError> {
        let tenant_id = required_uuid(headers, TENANT_HEADER)?;
        let user_id = required_uuid(headers, USER_HEADER)?;
        let branch_id = match header_str(headers, BRANCH_HEADER) {
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                ServiceError::ValidationError(format!("{BRANCH_HEADER} must be a UUID"))
            })?),
            None => None,
        };

        let ip = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .or_else(|| header_str(headers, "x-real-ip").map(str::to_string));

        Ok(Self {
            tenant_id,
            user_id,
            branch_id,
            ip,
            user_agent: header_str(headers, "user-agent").map(str::to_string),
            request_id: crate::tracing::current_request_id().map(|id| id.0).or_else(|| {
                header_str(
                    headers,
                    crate::middleware_helpers::request_id::REQUEST_ID_HEADER,
                )
                .map(str::to_string)
            }),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn required_uuid(headers: &HeaderMap, name: &str) -> Result<Uuid, ServiceError> {
    let raw = header_str(headers, name)
        .ok_or_else(|| ServiceError::Unauthorized(format!("missing {name} header")))?;
    Uuid::parse_str(raw).map_err(|_| ServiceError::Unauthorized(format!("{name} is not a valid id")))
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        RequestContext::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn extracts_tenant_user_and_branch() {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let branch = Uuid::new_v4();
        let ctx = RequestContext::from_headers(&headers(&[
            (TENANT_HEADER, &tenant.to_string()),
            (USER_HEADER, &user.to_string()),
            (BRANCH_HEADER, &branch.to_string()),
            ("x-forwarded-for", "10.0.0.7, 172.16.0.1"),
            ("user-agent", "pdv/1.0"),
        ]))
        .unwrap();

        assert_eq!(ctx.tenant_id, tenant);
        assert_eq!(ctx.user_id, user);
        assert_eq!(ctx.branch_id, Some(branch));
        assert_eq!(ctx.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("pdv/1.0"));
    }

    #[test]
    fn missing_tenant_is_unauthorized() {
        let err = RequestContext::from_headers(&headers(&[(
            USER_HEADER,
            &Uuid::new_v4().to_string(),
        )]))
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn malformed_branch_is_a_validation_error() {
        let err = RequestContext::from_headers(&headers(&[
            (TENANT_HEADER, &Uuid::new_v4().to_string()),
            (USER_HEADER, &Uuid::new_v4().to_string()),
            (BRANCH_HEADER, "main"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
