//! Integration tests for fabricd
//!
//! Exercises the whole coordinator stack against mock participant daemons
//! serving the channel protocol on real unix sockets: discovery, the
//! phased commit protocol, lock arbitration, autosave rules, and the
//! client/server round trip.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::sync::broadcast;

use fabricd::{
    client,
    coordinator::{Coordinator, LockName, SocketLauncher, SocketMessenger},
    daemon::{CoordinatorMetrics, IpcServer, Request, RequestHandler, Response},
    participant::{
        Introspection, ParticipantRequest, ParticipantResponse, PhaseAck, PhaseMessage,
        PhaseResult, ProcKind,
    },
    store::ConfStore,
    types::{ArgValue, ConfigTarget, ControllerKind, OperCode, OperStatus, OperType},
    wire::{decode_message, encode_message, read_frame, write_frame},
};

/// Shared state of one mock participant: every phase it received plus the
/// verdicts it should return per phase type (success by default).
#[derive(Clone, Default)]
struct ParticipantState {
    received: Arc<Mutex<Vec<PhaseMessage>>>,
    verdicts: Arc<Mutex<HashMap<OperType, PhaseResult>>>,
}

impl ParticipantState {
    fn veto(&self, oper: OperType, result: PhaseResult) {
        self.verdicts.lock().insert(oper, result);
    }

    fn opers(&self) -> Vec<OperType> {
        self.received.lock().iter().map(|m| m.oper).collect()
    }
}

/// Serve the participant protocol on `socket_path` until the test ends.
fn spawn_participant(socket_path: PathBuf, identity: Introspection, state: ParticipantState) {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let listener = UnixListener::bind(&socket_path).unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let identity = identity.clone();
            let state = state.clone();
            tokio::spawn(async move {
                while let Ok(Some(frame)) = read_frame(&mut stream).await {
                    let request: ParticipantRequest = decode_message(&frame).unwrap();
                    let response = match request {
                        ParticipantRequest::Introspect => {
                            ParticipantResponse::Identity(identity.clone())
                        }
                        ParticipantRequest::Phase(message) => {
                            let result = state
                                .verdicts
                                .lock()
                                .get(&message.oper)
                                .copied()
                                .unwrap_or(PhaseResult::Success);
                            state.received.lock().push(message);
                            ParticipantResponse::Ack(PhaseAck {
                                result,
                                ctrl_result: None,
                            })
                        }
                    };
                    let frame = encode_message(&response).unwrap();
                    if write_frame(&mut stream, &frame).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
}

struct Fabric {
    _tmp: TempDir,
    handler: Arc<RequestHandler>,
    coordinator: Arc<Coordinator>,
    logical: ParticipantState,
    physical: ParticipantState,
    openflow: ParticipantState,
    overlay: ParticipantState,
}

/// Full coordinator stack over a temp run directory with two engines and
/// two drivers listening.
async fn fabric() -> Fabric {
    let tmp = TempDir::new().unwrap();
    let run_dir = tmp.path().join("run");
    let data_dir = tmp.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();

    let engine = |role| Introspection {
        role,
        controller: None,
    };
    let driver = |kind| Introspection {
        role: ProcKind::Driver,
        controller: Some(kind),
    };

    let logical = ParticipantState::default();
    let physical = ParticipantState::default();
    let openflow = ParticipantState::default();
    let overlay = ParticipantState::default();

    spawn_participant(
        run_dir.join("logical/lgc.sock"),
        engine(ProcKind::Logical),
        logical.clone(),
    );
    spawn_participant(
        run_dir.join("physical/phy.sock"),
        engine(ProcKind::Physical),
        physical.clone(),
    );
    spawn_participant(
        run_dir.join("driver/of.sock"),
        driver(ControllerKind::Openflow),
        openflow.clone(),
    );
    spawn_participant(
        run_dir.join("driver/ov.sock"),
        driver(ControllerKind::Overlay),
        overlay.clone(),
    );

    let store = ConfStore::open(&data_dir).unwrap();
    let messenger = Arc::new(SocketMessenger::new(
        run_dir.clone(),
        std::time::Duration::from_secs(2),
    ));
    let launcher = Arc::new(SocketLauncher::new(run_dir));
    let coordinator = Arc::new(Coordinator::new(
        store,
        messenger,
        CoordinatorMetrics::shared(),
    ));
    coordinator
        .directory()
        .discover(launcher.as_ref(), coordinator.messenger())
        .await
        .unwrap();

    let (shutdown_tx, _) = broadcast::channel(4);
    let handler = Arc::new(RequestHandler::new(
        coordinator.clone(),
        launcher,
        fabricd::Config::default(),
        shutdown_tx,
    ));

    Fabric {
        _tmp: tmp,
        handler,
        coordinator,
        logical,
        physical,
        openflow,
        overlay,
    }
}

async fn operate(fabric: &Fabric, args: Vec<ArgValue>) -> (OperStatus, Vec<ArgValue>) {
    match fabric.handler.handle(Request::Operate { args }).await {
        Response::Operate { status, outputs } => (status, outputs),
        other => panic!("expected Operate response, got {other:?}"),
    }
}

fn args(code: OperCode, session_id: u32) -> Vec<ArgValue> {
    vec![ArgValue::U32(code.as_u32()), ArgValue::U32(session_id)]
}

#[tokio::test]
async fn discovery_finds_engines_and_drivers() {
    let fabric = fabric().await;

    match fabric.handler.handle(Request::Status).await {
        Response::Status(status) => {
            assert_eq!(status.driver_count, 2);
            assert!(status.config_owner.is_none());
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn commit_runs_full_phase_protocol() {
    let fabric = fabric().await;

    // Acquire the configuration session.
    let (status, outputs) = operate(&fabric, args(OperCode::ConfigAcquire, 7)).await;
    assert_eq!(status, OperStatus::Success);
    let ArgValue::U32(config_id) = outputs[0] else {
        panic!("expected config id output");
    };

    // Commit with the granted id.
    let mut commit_args = args(OperCode::CommitTrans, 7);
    commit_args.push(ArgValue::U32(config_id));
    let (status, _) = operate(&fabric, commit_args).await;
    assert_eq!(status, OperStatus::Success);

    // Engines observed the engine phases in protocol order (after the
    // config-id notification from the acquire).
    let logical = fabric.logical.opers();
    assert_eq!(
        logical,
        vec![
            OperType::NotifyConfigId,
            OperType::CommitTransStart,
            OperType::CommitVote,
            OperType::CommitGlobal,
            OperType::CommitTransEnd,
        ]
    );
    assert_eq!(logical, fabric.physical.opers());

    // Both drivers voted and applied, nothing else.
    for driver in [&fabric.openflow, &fabric.overlay] {
        assert_eq!(
            driver.opers(),
            vec![OperType::CommitDriverVote, OperType::CommitDriverGlobal]
        );
    }

    // Running-config commit number advanced once.
    let (status, outputs) = operate(&fabric, args(OperCode::ReadRunningStatus, 7)).await;
    assert_eq!(status, OperStatus::Success);
    assert_eq!(outputs, vec![ArgValue::U64(1), ArgValue::U8(0)]);
}

#[tokio::test]
async fn driver_veto_aborts_commit_and_releases_lock() {
    let fabric = fabric().await;
    fabric
        .openflow
        .veto(OperType::CommitDriverVote, PhaseResult::Abort);

    let (_, outputs) = operate(&fabric, args(OperCode::ConfigAcquire, 7)).await;
    let ArgValue::U32(config_id) = outputs[0] else {
        panic!("expected config id output");
    };

    let mut commit_args = args(OperCode::CommitTrans, 7);
    commit_args.push(ArgValue::U32(config_id));
    let (status, _) = operate(&fabric, commit_args).await;
    assert_eq!(status, OperStatus::OperAbort);

    // No participant saw a global phase.
    for participant in [
        &fabric.logical,
        &fabric.physical,
        &fabric.openflow,
        &fabric.overlay,
    ] {
        let opers = participant.opers();
        assert!(!opers.contains(&OperType::CommitGlobal));
        assert!(!opers.contains(&OperType::CommitDriverGlobal));
    }
    // Participants were told to roll back.
    assert!(fabric
        .logical
        .opers()
        .contains(&OperType::CommitTransEnd));

    // The write token is free again: a save goes through.
    let (status, _) = operate(&fabric, args(OperCode::RunningSave, 7)).await;
    assert_eq!(status, OperStatus::Success);
}

#[tokio::test]
async fn write_lock_contention_yields_busy() {
    let fabric = fabric().await;

    let (_, outputs) = operate(&fabric, args(OperCode::ConfigAcquire, 1)).await;
    let ArgValue::U32(config_id) = outputs[0] else {
        panic!("expected config id output");
    };

    // Session 2's write token: held while session 1 tries to commit.
    assert_eq!(
        fabric
            .coordinator
            .locks()
            .get_lock(2, LockName::WriteSession, true),
        fabricd::coordinator::LockResult::Acquired
    );

    let phases_before: usize = fabric.logical.opers().len();
    let mut commit_args = args(OperCode::CommitTrans, 1);
    commit_args.push(ArgValue::U32(config_id));
    let (status, _) = operate(&fabric, commit_args).await;
    assert_eq!(status, OperStatus::SystemBusy);
    assert_eq!(fabric.logical.opers().len(), phases_before);

    // Ledger untouched by the rejected commit.
    let (_, outputs) = operate(&fabric, args(OperCode::ReadRunningStatus, 1)).await;
    assert_eq!(outputs, vec![ArgValue::U64(0), ArgValue::U8(0)]);
}

#[tokio::test]
async fn save_increments_version_and_autosave_rules_apply() {
    let fabric = fabric().await;

    // Plain save: one save phase to each engine, startup version 1.
    let (status, _) = operate(&fabric, args(OperCode::RunningSave, 3)).await;
    assert_eq!(status, OperStatus::Success);
    assert_eq!(fabric.logical.opers(), vec![OperType::SaveConfig]);
    let (_, outputs) = operate(&fabric, args(OperCode::ReadStartupStatus, 3)).await;
    assert_eq!(outputs, vec![ArgValue::U64(1), ArgValue::U8(0)]);

    // Enable autosave.
    let (status, _) = operate(&fabric, args(OperCode::AutosaveEnable, 3)).await;
    assert_eq!(status, OperStatus::Success);
    let (_, outputs) = operate(&fabric, args(OperCode::AutosaveGet, 3)).await;
    assert_eq!(outputs, vec![ArgValue::U8(1)]);

    // With autosave on, a save is a local no-op success.
    let phases_before = fabric.logical.opers().len();
    let (status, _) = operate(&fabric, args(OperCode::RunningSave, 3)).await;
    assert_eq!(status, OperStatus::Success);
    assert_eq!(fabric.logical.opers().len(), phases_before);
    // Startup version unchanged by the no-op.
    let (_, outputs) = operate(&fabric, args(OperCode::ReadStartupStatus, 3)).await;
    assert_eq!(outputs, vec![ArgValue::U64(1), ArgValue::U8(0)]);

    // Clearing the startup config is forbidden while autosave is on.
    let (status, _) = operate(&fabric, args(OperCode::ClearStartup, 3)).await;
    assert_eq!(status, OperStatus::Forbidden);
    assert_eq!(fabric.logical.opers().len(), phases_before);
}

#[tokio::test]
async fn failed_save_closes_status_window_and_counts_attempt() {
    let fabric = fabric().await;
    fabric.logical.veto(OperType::SaveConfig, PhaseResult::Fatal);

    let (_, before) = operate(&fabric, args(OperCode::ReadStartupStatus, 3)).await;
    assert_eq!(before, vec![ArgValue::U64(0), ArgValue::U8(0)]);

    let (status, _) = operate(&fabric, args(OperCode::RunningSave, 3)).await;
    assert_eq!(status, OperStatus::SystemFailure);

    // The attempt completed: flag CONFIRMED, version advanced by one.
    let (_, after) = operate(&fabric, args(OperCode::ReadStartupStatus, 3)).await;
    assert_eq!(after, vec![ArgValue::U64(1), ArgValue::U8(0)]);
}

#[tokio::test]
async fn audit_targets_one_driver_and_cancel_is_quiet() {
    let fabric = fabric().await;

    let mut audit_args = args(OperCode::AuditTrans, 5);
    audit_args.push(ArgValue::Str("overlay".to_string()));
    let (status, _) = operate(&fabric, audit_args).await;
    assert_eq!(status, OperStatus::Success);

    // Only the audited driver saw driver phases.
    assert_eq!(
        fabric.overlay.opers(),
        vec![
            OperType::AuditStart,
            OperType::AuditDriverVote,
            OperType::AuditDriverGlobal,
            OperType::AuditEnd,
        ]
    );
    assert!(fabric.openflow.opers().is_empty());

    // Cancel with no audit in flight: quiet success, no phases.
    let before = fabric.logical.opers().len();
    let (status, _) = operate(&fabric, args(OperCode::AuditCancel, 5)).await;
    assert_eq!(status, OperStatus::Success);
    assert_eq!(fabric.logical.opers().len(), before);
}

#[tokio::test]
async fn stale_config_id_rejected_after_reacquire() {
    let fabric = fabric().await;

    let (_, outputs) = operate(&fabric, args(OperCode::ConfigAcquire, 7)).await;
    let ArgValue::U32(first_id) = outputs[0] else {
        panic!("expected config id output");
    };

    let mut release = args(OperCode::ConfigRelease, 7);
    release.push(ArgValue::U32(first_id));
    let (status, _) = operate(&fabric, release).await;
    assert_eq!(status, OperStatus::Success);

    let (_, outputs) = operate(&fabric, args(OperCode::ConfigAcquire, 7)).await;
    let ArgValue::U32(second_id) = outputs[0] else {
        panic!("expected config id output");
    };
    assert_ne!(first_id, second_id);

    // Committing with the stale id fails, even from the same session.
    let mut commit_args = args(OperCode::CommitTrans, 7);
    commit_args.push(ArgValue::U32(first_id));
    let (status, _) = operate(&fabric, commit_args).await;
    assert_eq!(status, OperStatus::InvalidConfigId);
}

#[tokio::test]
async fn client_round_trip_over_ipc_socket() {
    let fabric = fabric().await;
    let socket_path = fabric._tmp.path().join("fabricd.sock");

    let server = IpcServer::new(socket_path.clone(), fabric.handler.clone());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server_handle = tokio::spawn(async move { server.run(shutdown_rx).await });

    // Wait for the socket to appear.
    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let socket = Some(socket_path);
    assert!(client::ping(&socket).await.unwrap());

    let config_id = client::acquire_config(&socket, 42).await.unwrap();
    client::commit(&socket, 42, config_id).await.unwrap();
    client::release_config(&socket, 42, config_id).await.unwrap();

    let (version, updating) = client::read_status(&socket, 42, ConfigTarget::Running)
        .await
        .unwrap();
    assert_eq!(version, 1);
    assert!(!updating);

    // A stale-id release is surfaced as a typed rejection.
    let err = client::release_config(&socket, 42, config_id).await.unwrap_err();
    assert!(matches!(
        err,
        client::ClientError::Rejected(OperStatus::ConfigNotPresent)
    ));

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;
}
