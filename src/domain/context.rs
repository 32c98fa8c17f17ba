//! Who performed an operation, and from where.
//!
//! Built once per request by the auth middleware and carried into every
//! audit entry the request produces.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<Uuid>,

    /// Staff member named by X-Admin-User-Id; required for mutations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_user_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl OperationContext {
    /// Unattributed context (jobs, tests)
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a request authenticated with `api_key_id`
    pub fn for_request(api_key_id: Uuid, correlation_id: Uuid) -> Self {
        Self {
            api_key_id: Some(api_key_id),
            correlation_id: Some(correlation_id),
            ..Self::default()
        }
    }

    pub fn with_admin_user(mut self, admin_user_id: Uuid) -> Self {
        self.admin_user_id = Some(admin_user_id);
        self
    }

    pub fn with_client_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.client_ip = ip;
        self
    }
}
