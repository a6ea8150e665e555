//! Registration workflow: pending → approved | rejected, exactly once.
//!
//! Submission happens only from a resolved add-tool intent with complete
//! required fields; the approve path's registry merge is transactional in
//! the store (see `vulnpilot_store::requests`).

use vulnpilot_core::error::Result;
use vulnpilot_core::observability;
use vulnpilot_core::tool::ToolDescriptor;
use vulnpilot_store::{Decision, Store, ToolRequest};

/// Outcome of submitting a proposal for review.
#[derive(Debug)]
pub enum SubmitOutcome {
    Created(ToolRequest),
    /// The proposed name collides (case-insensitively) with a registered
    /// tool; nothing was written.
    AlreadyExists(String),
}

pub fn submit(store: &Store, proposed: ToolDescriptor, message: &str) -> Result<SubmitOutcome> {
    proposed.validate()?;
    if store.tool(&proposed.id)?.is_some() {
        tracing::info!(tool_id = %proposed.id, "add-tool request for an existing tool, ignored");
        return Ok(SubmitOutcome::AlreadyExists(proposed.id));
    }
    let request = store.create_request(proposed, message)?;
    Ok(SubmitOutcome::Created(request))
}

/// Apply an admin decision. Conflicts (already-terminal request, racing
/// registration) surface as errors with no state change.
pub fn decide(store: &Store, request_id: &str, decision: Decision) -> Result<ToolRequest> {
    let action = match &decision {
        Decision::Approve(_) => "approve",
        Decision::Reject => "reject",
    };
    let request = store.decide_request(request_id, decision)?;
    observability::audit_request_decided(&request.id, &request.proposed.id, action);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use vulnpilot_core::error::Error;
    use vulnpilot_core::tool::{FieldOverrides, ParamKind};
    use vulnpilot_store::RequestStatus;

    use super::*;

    fn fooscan() -> ToolDescriptor {
        ToolDescriptor {
            id: "fooscan".to_string(),
            name: "Fooscan".to_string(),
            description: "Scans foos".to_string(),
            command: "fooscan {url}".to_string(),
            params: [("url".to_string(), ParamKind::Url)].into(),
            default_param: "url".to_string(),
            category: "web_security".to_string(),
            trigger_phrases: vec!["run fooscan".to_string()],
            usage_example: None,
        }
    }

    #[test]
    fn test_submit_then_approve_registers_tool() {
        let store = Store::open_in_memory().unwrap();
        let SubmitOutcome::Created(request) = submit(&store, fooscan(), "add fooscan").unwrap()
        else {
            panic!("expected Created");
        };
        let decided = decide(
            &store,
            &request.id,
            Decision::Approve(FieldOverrides::default()),
        )
        .unwrap();
        assert_eq!(decided.status, RequestStatus::Approved);
        assert!(store.tool("fooscan").unwrap().is_some());

        // The approved id is immediately resolvable by the intent cascade.
        let registry = store.registry_snapshot().unwrap();
        assert_eq!(
            vulnpilot_agent::intent::resolve("run fooscan on example.com", &registry),
            vulnpilot_agent::intent::Intent::Execute {
                tool_id: "fooscan".to_string(),
                raw_target: "example.com".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_name_creates_nothing() {
        let store = Store::open_in_memory().unwrap();
        store.insert_tool_if_absent(&fooscan()).unwrap();
        let mut shouting = fooscan();
        shouting.name = "FOOSCAN".to_string();
        let outcome = submit(&store, shouting, "add FOOSCAN").unwrap();
        assert!(matches!(outcome, SubmitOutcome::AlreadyExists(_)));
        assert!(store.list_requests().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_proposal_is_rejected_before_persisting() {
        let store = Store::open_in_memory().unwrap();
        let mut broken = fooscan();
        broken.command = "fooscan {url} {depth}".to_string();
        let err = submit(&store, broken, "add fooscan").unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got: {err}");
        assert!(store.list_requests().unwrap().is_empty());
    }

    #[test]
    fn test_decide_twice_is_conflict() {
        let store = Store::open_in_memory().unwrap();
        let SubmitOutcome::Created(request) = submit(&store, fooscan(), "add fooscan").unwrap()
        else {
            panic!("expected Created");
        };
        decide(&store, &request.id, Decision::Reject).unwrap();
        let err = decide(&store, &request.id, Decision::Reject).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "got: {err}");
    }
}
