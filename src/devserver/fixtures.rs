use chrono::{TimeZone, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    models::{DocumentThread, Identity, Role, ServiceRequest, Ticket},
    resource::ResourceKind,
};

pub const ADMIN_ID: Uuid = Uuid::from_u128(1);
pub const USER_ID: Uuid = Uuid::from_u128(2);
pub const LAWYER_ID: Uuid = Uuid::from_u128(3);
pub const HR_MANAGER_ID: Uuid = Uuid::from_u128(4);

/// Directory
///
/// In-memory accounts and records served by the development API. Read-only after
/// seeding, so it is shared without locking.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub users: Vec<Identity>,
    pub tickets: Vec<Ticket>,
    pub requests: Vec<ServiceRequest>,
    pub threads: Vec<DocumentThread>,
}

impl Directory {
    /// seeded
    ///
    /// One account per known role plus a handful of records linking them.
    pub fn seeded() -> Self {
        let user = |id: Uuid, email: &str, name: &str, role: Role| Identity {
            id,
            email: email.to_string(),
            name: Some(name.to_string()),
            role,
        };
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).single();

        Self {
            users: vec![
                user(ADMIN_ID, "admin@portal.local", "Ada Admin", Role::Admin),
                user(USER_ID, "user@portal.local", "Uma User", Role::User),
                user(LAWYER_ID, "lawyer@portal.local", "Leo Lawyer", Role::Lawyer),
                user(HR_MANAGER_ID, "hr@portal.local", "Hana HR", Role::HrManager),
            ],
            tickets: vec![
                Ticket {
                    id: Uuid::from_u128(101),
                    subject: "Cannot upload signed contract".to_string(),
                    status: "open".to_string(),
                    priority: Some("high".to_string()),
                    reporter_id: Some(USER_ID),
                    assignee_id: Some(LAWYER_ID),
                    created_at: day(1),
                },
                Ticket {
                    id: Uuid::from_u128(102),
                    subject: "Update billing address".to_string(),
                    status: "closed".to_string(),
                    priority: None,
                    reporter_id: Some(USER_ID),
                    assignee_id: None,
                    created_at: day(2),
                },
            ],
            requests: vec![
                ServiceRequest {
                    id: Uuid::from_u128(201),
                    title: "Annual leave, 4-8 March".to_string(),
                    status: "pending".to_string(),
                    request_type: Some("leave".to_string()),
                    requester_id: Some(USER_ID),
                    handler_id: Some(HR_MANAGER_ID),
                    created_at: day(3),
                },
                ServiceRequest {
                    id: Uuid::from_u128(202),
                    title: "Replacement laptop".to_string(),
                    status: "approved".to_string(),
                    request_type: Some("equipment".to_string()),
                    requester_id: Some(LAWYER_ID),
                    handler_id: Some(HR_MANAGER_ID),
                    created_at: day(4),
                },
            ],
            threads: vec![DocumentThread {
                id: Uuid::from_u128(301),
                document_title: "Employment agreement".to_string(),
                message_count: 3,
                owner_id: Some(USER_ID),
                lawyer_id: Some(LAWYER_ID),
                last_activity_at: day(5),
            }],
        }
    }

    pub fn find_by_email(&self, email: &str) -> Option<&Identity> {
        self.users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email.trim()))
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<&Identity> {
        self.users.iter().find(|user| user.id == id)
    }

    /// collection
    ///
    /// Records of `kind` visible under `scope` (`all`, `mine`, `assigned`) to `caller`.
    /// Role authorization happens in the handler; this only filters by relation.
    pub fn collection(&self, kind: ResourceKind, scope: &str, caller: Uuid) -> Vec<Value> {
        let owned = |owner: Option<Uuid>| scope == "all" || owner == Some(caller);

        let values: Vec<Result<Value, serde_json::Error>> = match (kind, scope) {
            (ResourceKind::Tickets, "assigned") => self
                .tickets
                .iter()
                .filter(|t| t.assignee_id == Some(caller))
                .map(serde_json::to_value)
                .collect(),
            (ResourceKind::Tickets, _) => self
                .tickets
                .iter()
                .filter(|t| owned(t.reporter_id))
                .map(serde_json::to_value)
                .collect(),
            (ResourceKind::Requests, "assigned") => self
                .requests
                .iter()
                .filter(|r| r.handler_id == Some(caller))
                .map(serde_json::to_value)
                .collect(),
            (ResourceKind::Requests, _) => self
                .requests
                .iter()
                .filter(|r| owned(r.requester_id))
                .map(serde_json::to_value)
                .collect(),
            (ResourceKind::DocumentThreads, "assigned") => self
                .threads
                .iter()
                .filter(|t| t.lawyer_id == Some(caller))
                .map(serde_json::to_value)
                .collect(),
            (ResourceKind::DocumentThreads, _) => self
                .threads
                .iter()
                .filter(|t| owned(t.owner_id))
                .map(serde_json::to_value)
                .collect(),
        };

        values.into_iter().filter_map(Result::ok).collect()
    }
}
