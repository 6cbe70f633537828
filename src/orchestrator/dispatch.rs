//! Tool call fan-out and join.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{HalError, Result};
use crate::registry::{Catalogue, ToolRegistry};
use crate::session::ToolSessionOps;
use crate::types::{Message, ToolCall};
use crate::util::RetryPolicy;

/// How the calls of one assistant message are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ToolDispatch {
    /// One call at a time, in message order.
    #[default]
    Sequential,
    /// Calls to different sessions run concurrently; calls to the same
    /// session keep their relative order.
    Concurrent,
}

/// Tool messages for the calls that completed before the first failure.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub results: Vec<Message>,
    pub failure: Option<HalError>,
}

impl DispatchOutcome {
    fn collect(calls: &[ToolCall], slots: Vec<Option<Result<String>>>) -> Self {
        let mut outcome = Self::default();
        for (call, slot) in calls.iter().zip(slots) {
            match slot {
                Some(Ok(text)) => outcome.results.push(Message::tool_result(&call.id, text)),
                Some(Err(error)) => {
                    outcome.failure = Some(error);
                    break;
                }
                // Skipped because an earlier call on the same session failed.
                None => {
                    outcome.failure = Some(HalError::InvalidState(format!(
                        "tool call '{}' was not executed",
                        call.id
                    )));
                    break;
                }
            }
        }
        outcome
    }
}

/// Run `calls`, routing each through `catalogue` rather than the registry's
/// shared routes.
pub async fn execute(
    registry: &ToolRegistry,
    catalogue: &Catalogue,
    calls: &[ToolCall],
    dispatch: ToolDispatch,
    retry: &RetryPolicy,
) -> DispatchOutcome {
    match dispatch {
        ToolDispatch::Sequential => execute_sequential(registry, catalogue, calls, retry).await,
        ToolDispatch::Concurrent => execute_concurrent(registry, catalogue, calls, retry).await,
    }
}

async fn execute_sequential(
    registry: &ToolRegistry,
    catalogue: &Catalogue,
    calls: &[ToolCall],
    retry: &RetryPolicy,
) -> DispatchOutcome {
    let mut slots = Vec::with_capacity(calls.len());
    for call in calls {
        let result = match registry.resolve_in(catalogue, &call.tool_name) {
            Ok(session) => invoke(registry, &session, call, retry).await,
            Err(error) => Err(error),
        };
        let failed = result.is_err();
        slots.push(Some(result));
        if failed {
            break;
        }
    }
    slots.resize_with(calls.len(), || None);
    DispatchOutcome::collect(calls, slots)
}

struct SessionGroup {
    session: Arc<dyn ToolSessionOps>,
    indices: Vec<usize>,
}

async fn execute_concurrent(
    registry: &ToolRegistry,
    catalogue: &Catalogue,
    calls: &[ToolCall],
    retry: &RetryPolicy,
) -> DispatchOutcome {
    let mut slots: Vec<Option<Result<String>>> = calls.iter().map(|_| None).collect();
    let mut groups: Vec<SessionGroup> = Vec::new();

    for (index, call) in calls.iter().enumerate() {
        match registry.resolve_in(catalogue, &call.tool_name) {
            Ok(session) => {
                match groups
                    .iter_mut()
                    .find(|group| group.session.id() == session.id())
                {
                    Some(group) => group.indices.push(index),
                    None => groups.push(SessionGroup {
                        session,
                        indices: vec![index],
                    }),
                }
            }
            Err(error) => {
                // Nothing after an unresolvable call is kept, so stop grouping here.
                slots[index] = Some(Err(error));
                break;
            }
        }
    }

    let runs = groups.iter().map(|group| async move {
        let mut finished = Vec::with_capacity(group.indices.len());
        for &index in &group.indices {
            let result = invoke(registry, &group.session, &calls[index], retry).await;
            let failed = result.is_err();
            finished.push((index, result));
            if failed {
                break;
            }
        }
        finished
    });

    for (index, result) in join_all(runs).await.into_iter().flatten() {
        slots[index] = Some(result);
    }
    DispatchOutcome::collect(calls, slots)
}

async fn invoke(
    registry: &ToolRegistry,
    session: &Arc<dyn ToolSessionOps>,
    call: &ToolCall,
    retry: &RetryPolicy,
) -> Result<String> {
    tracing::info!(
        session = %session.id(),
        tool = %call.tool_name,
        call_id = %call.id,
        arguments = %call.arguments,
        "Executing tool call"
    );
    let result = retry
        .execute(move || registry.invoke(session, &call.tool_name, call.arguments.clone()))
        .await;
    match &result {
        Ok(text) => tracing::info!(tool = %call.tool_name, call_id = %call.id, result = %text, "Tool call result"),
        Err(error) => tracing::warn!(tool = %call.tool_name, call_id = %call.id, error = %error, "Tool call failed"),
    }
    result
}
