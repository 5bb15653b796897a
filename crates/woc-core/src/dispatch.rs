use crate::command_log::{CommandLog, CorrelationId, WorldOutcome};
use crate::commands::{CommandArg, CommandKind};
use crate::CommandTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const NO_WORLDS_RESPONDED: &str = "no worlds responded";

/// Body of the execute endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchRequest {
    pub target: CommandTarget,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub command: String,
    #[serde(default)]
    pub args: Vec<CommandArg>,
    pub confirm: bool,
}

impl DispatchRequest {
    pub fn new(
        target: CommandTarget,
        kind: CommandKind,
        command: impl Into<String>,
        args: Vec<CommandArg>,
    ) -> Self {
        Self {
            target,
            kind,
            command: command.into(),
            args,
            confirm: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FanOutResult {
    #[serde(rename = "worldId")]
    pub world_id: u32,
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DispatchResponse {
    FanOut {
        results: Vec<FanOutResult>,
    },
    Single {
        ok: bool,
        #[serde(default)]
        message: String,
    },
}

impl DispatchResponse {
    pub fn succeeded(&self) -> usize {
        match self {
            DispatchResponse::FanOut { results } => {
                results.iter().filter(|result| result.ok).count()
            }
            DispatchResponse::Single { ok, .. } => usize::from(*ok),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn new(level: ToastLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// In-flight dispatch as tracked by the console.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDispatch {
    pub id: CorrelationId,
    pub request: DispatchRequest,
}

/// Folds a finished dispatch into the log and returns exactly one toast.
pub fn apply_dispatch_result(
    log: &mut CommandLog,
    pending: &PendingDispatch,
    result: Result<DispatchResponse, String>,
    now: DateTime<Utc>,
) -> Toast {
    let command = pending.request.command.as_str();
    let target = pending.request.target;
    match result {
        Ok(DispatchResponse::Single { ok, message }) => {
            log.resolve(pending.id, ok, message.clone());
            let level = if ok {
                ToastLevel::Success
            } else {
                ToastLevel::Error
            };
            let detail = if message.is_empty() {
                let fallback = if ok { "ok" } else { "failed" };
                fallback.to_string()
            } else {
                message
            };
            Toast::new(level, format!("{command} on {}: {detail}", target.label()))
        }
        Ok(DispatchResponse::FanOut { results }) if results.is_empty() => {
            log.resolve(pending.id, false, NO_WORLDS_RESPONDED);
            Toast::new(
                ToastLevel::Warning,
                format!("{command}: {NO_WORLDS_RESPONDED}"),
            )
        }
        Ok(DispatchResponse::FanOut { results }) => {
            let outcomes: Vec<WorldOutcome> = results
                .iter()
                .map(|result| WorldOutcome {
                    world_id: result.world_id,
                    ok: result.ok,
                    message: result.message.clone(),
                })
                .collect();
            log.replace_with_fanout(pending.id, command, &outcomes, now);
            fanout_toast(command, &results)
        }
        Err(err) => {
            log.resolve(pending.id, false, err.clone());
            Toast::new(ToastLevel::Error, format!("{command} failed: {err}"))
        }
    }
}

pub fn fanout_toast(command: &str, results: &[FanOutResult]) -> Toast {
    let total = results.len();
    let succeeded = results.iter().filter(|result| result.ok).count();
    let level = if succeeded == total {
        ToastLevel::Success
    } else if succeeded == 0 {
        ToastLevel::Error
    } else {
        ToastLevel::Warning
    };
    Toast::new(
        level,
        format!("{command}: {succeeded}/{total} worlds succeeded"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_log::EntryStatus;
    use crate::commands::ParamKind;

    fn pending(log: &mut CommandLog, command: &str, target: CommandTarget) -> PendingDispatch {
        let id = log.append_pending(command, target, Utc::now());
        PendingDispatch {
            id,
            request: DispatchRequest::new(target, CommandKind::Game, command, Vec::new()),
        }
    }

    #[test]
    fn request_serializes_wire_body() {
        let request = DispatchRequest::new(
            CommandTarget::All,
            CommandKind::Game,
            "broadcast",
            vec![CommandArg {
                kind: ParamKind::String,
                value: serde_json::json!("restart in 5"),
            }],
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "target": "all",
                "type": "game",
                "command": "broadcast",
                "args": [{"type": "string", "value": "restart in 5"}],
                "confirm": true
            })
        );
    }

    #[test]
    fn response_shapes_are_distinguished() {
        let single: DispatchResponse =
            serde_json::from_value(serde_json::json!({"ok": true, "message": "done"})).unwrap();
        assert_eq!(
            single,
            DispatchResponse::Single {
                ok: true,
                message: "done".to_string()
            }
        );
        let fanout: DispatchResponse = serde_json::from_value(serde_json::json!({
            "results": [{"worldId": 1, "ok": true, "message": "a"}, {"worldId": 2, "ok": false}]
        }))
        .unwrap();
        assert_eq!(fanout.succeeded(), 1);
    }

    #[test]
    fn fanout_yields_three_rows_and_one_summary_toast() {
        let mut log = CommandLog::default();
        let dispatch = pending(&mut log, "save", CommandTarget::All);
        let response = DispatchResponse::FanOut {
            results: vec![
                FanOutResult {
                    world_id: 1,
                    ok: true,
                    message: "saved".to_string(),
                },
                FanOutResult {
                    world_id: 2,
                    ok: true,
                    message: "saved".to_string(),
                },
                FanOutResult {
                    world_id: 3,
                    ok: false,
                    message: "world offline".to_string(),
                },
            ],
        };
        let toast = apply_dispatch_result(&mut log, &dispatch, Ok(response), Utc::now());

        assert_eq!(log.len(), 3);
        let success = log
            .iter_recent()
            .filter(|entry| entry.status == EntryStatus::Success)
            .count();
        let failed = log
            .iter_recent()
            .filter(|entry| entry.status == EntryStatus::Failed)
            .count();
        assert_eq!((success, failed), (2, 1));
        assert_eq!(toast.message, "save: 2/3 worlds succeeded");
        assert!(toast.message.contains("2/3"));
        assert_eq!(toast.level, ToastLevel::Warning);
    }

    #[test]
    fn single_failure_keeps_server_message_verbatim() {
        let mut log = CommandLog::default();
        let dispatch = pending(&mut log, "kick", CommandTarget::World(4));
        let toast = apply_dispatch_result(
            &mut log,
            &dispatch,
            Ok(DispatchResponse::Single {
                ok: false,
                message: "player not found: Steve".to_string(),
            }),
            Utc::now(),
        );
        let entry = log.get(dispatch.id).unwrap();
        assert_eq!(entry.status, EntryStatus::Failed);
        assert_eq!(entry.message, "player not found: Steve");
        assert_eq!(toast.level, ToastLevel::Error);
        assert!(toast.message.contains("World 4"));
    }

    #[test]
    fn transport_error_fails_entry() {
        let mut log = CommandLog::default();
        let dispatch = pending(&mut log, "restart", CommandTarget::World(2));
        let toast = apply_dispatch_result(
            &mut log,
            &dispatch,
            Err("connection refused".to_string()),
            Utc::now(),
        );
        assert_eq!(log.get(dispatch.id).unwrap().status, EntryStatus::Failed);
        assert_eq!(toast.message, "restart failed: connection refused");
    }

    #[test]
    fn empty_fanout_fails_pending_row_with_warning() {
        let mut log = CommandLog::default();
        let dispatch = pending(&mut log, "save", CommandTarget::All);
        let response: DispatchResponse =
            serde_json::from_value(serde_json::json!({"results": []})).unwrap();
        let toast = apply_dispatch_result(&mut log, &dispatch, Ok(response), Utc::now());

        assert_eq!(log.len(), 1);
        let entry = log.get(dispatch.id).unwrap();
        assert_eq!(entry.status, EntryStatus::Failed);
        assert_eq!(entry.message, "no worlds responded");
        assert_eq!(toast.level, ToastLevel::Warning);
        assert_eq!(toast.message, "save: no worlds responded");
    }
}
