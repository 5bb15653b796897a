use chrono::{DateTime, TimeZone, Utc};
use woc_core::command_log::{EntryStatus, COMMAND_LOG_CAPACITY};
use woc_core::commands::{CommandCatalog, CommandDescriptor, CommandKind};
use woc_core::console::{CommandConsole, ConsoleStep};
use woc_core::dispatch::{DispatchResponse, FanOutResult, ToastLevel};
use woc_core::recent::RecentStore;
use woc_core::CommandTarget;

fn ts(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_708_995_600 + offset_secs, 0)
        .single()
        .expect("valid timestamp")
}

fn catalog() -> CommandCatalog {
    CommandCatalog {
        agent_commands: vec!["start".into(), "stop".into(), "restart".into(), "update".into()],
        game_commands: vec![
            CommandDescriptor {
                name: "save".to_string(),
                kind: CommandKind::Game,
                category: "world".to_string(),
                params: Vec::new(),
                dangerous: false,
            },
            CommandDescriptor {
                name: "SHUTDOWN_ALL".to_string(),
                kind: CommandKind::Game,
                category: "admin".to_string(),
                params: Vec::new(),
                dangerous: false,
            },
        ],
    }
}

#[test]
fn fleet_wide_save_fans_out_and_persists_recent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = RecentStore::for_session(dir.path(), "ops-1");
    let mut console = CommandConsole::new(
        store.load().expect("empty load"),
        Some(store.clone()),
        true,
    );
    console.set_catalog(catalog());

    assert_eq!(
        console.request(CommandKind::Game, "save", CommandTarget::All),
        ConsoleStep::NeedsConfirmation
    );
    let request = console.confirm().expect("simple confirmation passes");
    let pending = console.begin_dispatch(request, ts(0));
    console.persist_recent().expect("persist recent");

    let toast = console
        .complete_dispatch(
            pending.id,
            Ok(DispatchResponse::FanOut {
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
            }),
            ts(2),
        )
        .expect("dispatch was in flight");

    assert_eq!(toast.message, "save: 2/3 worlds succeeded");
    assert_eq!(toast.level, ToastLevel::Warning);
    assert_eq!(console.log().len(), 3);
    assert_eq!(console.log().pending_count(), 0);
    let failed: Vec<_> = console
        .log()
        .iter_recent()
        .filter(|entry| entry.status == EntryStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].target, CommandTarget::World(3));
    assert_eq!(failed[0].message, "world offline");

    let reloaded = store.load().expect("reload");
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.items()[0].name, "save");
    assert_eq!(reloaded.items()[0].kind, CommandKind::Game);
}

#[test]
fn dangerous_command_ignores_no_confirm_preference() {
    let mut console = CommandConsole::new(Default::default(), None, false);
    console.set_catalog(catalog());

    assert_eq!(
        console.request(CommandKind::Game, "SHUTDOWN_ALL", CommandTarget::All),
        ConsoleStep::NeedsConfirmation
    );
    assert!(console.confirm().is_none());
    for ch in "SHUTDOWN_ALL".chars() {
        console.type_confirmation(ch);
    }
    let request = console.confirm().expect("typed gate satisfied");
    assert_eq!(request.command, "SHUTDOWN_ALL");
}

#[test]
fn log_stays_bounded_under_many_dispatches() {
    let mut console = CommandConsole::new(Default::default(), None, false);
    console.set_catalog(catalog());
    let mut first_id = None;
    for index in 0..(COMMAND_LOG_CAPACITY + 10) {
        let ConsoleStep::Ready(request) =
            console.request(CommandKind::Agent, "restart", CommandTarget::World(index as u32))
        else {
            panic!("agent restart should not need confirmation");
        };
        let pending = console.begin_dispatch(request, ts(index as i64));
        first_id.get_or_insert(pending.id);
        assert!(console.log().len() <= COMMAND_LOG_CAPACITY);
    }
    assert_eq!(console.log().len(), COMMAND_LOG_CAPACITY);
    let first_id = first_id.expect("first id");
    assert!(console.log().get(first_id).is_none());

    // The evicted row's response is still consumed without resurrecting it.
    let toast = console
        .complete_dispatch(
            first_id,
            Ok(DispatchResponse::Single {
                ok: true,
                message: "restarted".to_string(),
            }),
            ts(100),
        )
        .expect("still tracked in flight");
    assert_eq!(toast.level, ToastLevel::Success);
    assert_eq!(console.log().len(), COMMAND_LOG_CAPACITY);
}

#[test]
fn fanout_for_evicted_row_keeps_command_name() {
    let mut console = CommandConsole::new(Default::default(), None, false);
    console.set_catalog(catalog());
    let ConsoleStep::Ready(request) =
        console.request(CommandKind::Game, "save", CommandTarget::All)
    else {
        panic!("save should dispatch without confirmation");
    };
    let save = console.begin_dispatch(request, ts(0));
    for index in 0..COMMAND_LOG_CAPACITY {
        let ConsoleStep::Ready(request) =
            console.request(CommandKind::Agent, "restart", CommandTarget::World(4))
        else {
            panic!("agent restart should not need confirmation");
        };
        console.begin_dispatch(request, ts(1 + index as i64));
    }
    assert!(console.log().get(save.id).is_none());

    let toast = console
        .complete_dispatch(
            save.id,
            Ok(DispatchResponse::FanOut {
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
                ],
            }),
            ts(200),
        )
        .expect("save still tracked in flight");
    assert_eq!(toast.message, "save: 2/2 worlds succeeded");
    let newest: Vec<_> = console.log().iter_recent().take(2).collect();
    assert!(newest.iter().all(|entry| entry.command == "save"));
    assert_eq!(newest[0].target, CommandTarget::World(2));
    assert_eq!(newest[0].status, EntryStatus::Success);
}
