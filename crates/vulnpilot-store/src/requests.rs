//! Tool request log: the approval state machine's persistence.
//!
//! A request transitions exactly once from `pending` to `approved` or
//! `rejected`. Approval merges the (possibly overridden) descriptor into
//! the registry in the same SQLite transaction as the status write, so a
//! reader can never observe one without the other.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vulnpilot_core::error::{Error, Result};
use vulnpilot_core::tool::{FieldOverrides, ToolDescriptor};

use crate::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(Error::store(format!("unknown request status '{other}'"))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// Admin decision on a pending request.
#[derive(Debug, Clone)]
pub enum Decision {
    Approve(FieldOverrides),
    Reject,
}

/// One registration request. Terminal records are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub proposed: ToolDescriptor,
    /// Originating chat message the proposal was extracted from.
    pub message: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String, Option<String>)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_request(
    (id, proposed, message, status, created_at, decided_at): (
        String,
        String,
        String,
        String,
        String,
        Option<String>,
    ),
) -> Result<ToolRequest> {
    Ok(ToolRequest {
        id,
        proposed: serde_json::from_str(&proposed).map_err(Error::store)?,
        message,
        status: RequestStatus::parse(&status)?,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .map_err(Error::store)?,
        decided_at: decided_at
            .map(|s| s.parse::<DateTime<Utc>>())
            .transpose()
            .map_err(Error::store)?,
    })
}

const SELECT_REQUEST: &str =
    "SELECT id, proposed, message, status, created_at, decided_at FROM requests";

impl Store {
    /// Persist a new pending request. The caller (registration workflow)
    /// has already checked required fields and duplicate names.
    pub fn create_request(&self, proposed: ToolDescriptor, message: &str) -> Result<ToolRequest> {
        let request = ToolRequest {
            id: Uuid::new_v4().to_string(),
            proposed,
            message: message.to_string(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        };
        let proposed_json = serde_json::to_string(&request.proposed).map_err(Error::store)?;
        let conn = self.conn.lock().map_err(|_| Error::store("lock poisoned"))?;
        conn.execute(
            "INSERT INTO requests (id, proposed, message, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                request.id,
                proposed_json,
                request.message,
                request.status.as_str(),
                request.created_at.to_rfc3339(),
            ],
        )
        .map_err(Error::store)?;
        tracing::info!(request_id = %request.id, tool_id = %request.proposed.id, "tool request created");
        Ok(request)
    }

    pub fn request(&self, id: &str) -> Result<Option<ToolRequest>> {
        let conn = self.conn.lock().map_err(|_| Error::store("lock poisoned"))?;
        let row = conn
            .query_row(
                &format!("{SELECT_REQUEST} WHERE id = ?1"),
                params![id],
                row_to_request,
            )
            .optional()
            .map_err(Error::store)?;
        row.map(decode_request).transpose()
    }

    /// All requests, newest first.
    pub fn list_requests(&self) -> Result<Vec<ToolRequest>> {
        let conn = self.conn.lock().map_err(|_| Error::store("lock poisoned"))?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_REQUEST} ORDER BY created_at DESC"))
            .map_err(Error::store)?;
        let rows = stmt.query_map([], row_to_request).map_err(Error::store)?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(decode_request(row.map_err(Error::store)?)?);
        }
        Ok(requests)
    }

    /// Decide a pending request. Rejection only marks the record; approval
    /// additionally validates the merged descriptor and merges it into the
    /// registry; both writes commit in one transaction. Deciding a
    /// terminal request is a conflict with no state change.
    pub fn decide_request(&self, id: &str, decision: Decision) -> Result<ToolRequest> {
        let mut conn = self.conn.lock().map_err(|_| Error::store("lock poisoned"))?;
        let tx = conn.transaction().map_err(Error::store)?;

        let row = tx
            .query_row(
                &format!("{SELECT_REQUEST} WHERE id = ?1"),
                params![id],
                row_to_request,
            )
            .optional()
            .map_err(Error::store)?;
        let mut request = match row {
            Some(row) => decode_request(row)?,
            None => return Err(Error::NotFound(id.to_string())),
        };
        if request.status.is_terminal() {
            return Err(Error::conflict(format!(
                "request '{}' already {}",
                request.id,
                request.status.as_str()
            )));
        }

        let decided_at = Utc::now();
        match decision {
            Decision::Reject => {
                tx.execute(
                    "UPDATE requests SET status = 'rejected', decided_at = ?2 WHERE id = ?1",
                    params![request.id, decided_at.to_rfc3339()],
                )
                .map_err(Error::store)?;
                request.status = RequestStatus::Rejected;
            }
            Decision::Approve(overrides) => {
                let merged = overrides.apply(request.proposed.clone());
                merged.validate()?;
                let already: Option<String> = tx
                    .query_row(
                        "SELECT id FROM tools WHERE id = ?1",
                        params![merged.id],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(Error::store)?;
                if already.is_some() {
                    return Err(Error::conflict(format!(
                        "tool '{}' was registered while this request was pending",
                        merged.id
                    )));
                }
                let descriptor_json = serde_json::to_string(&merged).map_err(Error::store)?;
                tx.execute(
                    "INSERT INTO tools (id, descriptor) VALUES (?1, ?2)",
                    params![merged.id, descriptor_json],
                )
                .map_err(Error::store)?;
                let proposed_json = serde_json::to_string(&merged).map_err(Error::store)?;
                tx.execute(
                    "UPDATE requests SET status = 'approved', decided_at = ?2, proposed = ?3
                     WHERE id = ?1",
                    params![request.id, decided_at.to_rfc3339(), proposed_json],
                )
                .map_err(Error::store)?;
                request.proposed = merged;
                request.status = RequestStatus::Approved;
            }
        }
        request.decided_at = Some(decided_at);

        tx.commit().map_err(Error::store)?;
        drop(conn);
        if request.status == RequestStatus::Approved {
            self.invalidate_registry_cache();
        }
        Ok(request)
    }
}
