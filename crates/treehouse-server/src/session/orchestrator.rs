//! Session Orchestrator
//!
//! `start_session` only reserves an id and spawns a task; the caller (a
//! connection handler) never waits on process I/O. Each session task owns
//! its child process and reports through the registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use treehouse_core::TreehouseError;
use treehouse_core::config::AgentConfig;

use crate::errors::SessionError;
use crate::protocol::{OutputStream, ServerEvent};
use crate::session::output::spawn_output_reader;
use crate::session::registry::{EventSink, SessionEntry, SessionRegistry};
use crate::types::{ConnectionId, SessionInfo, SessionOptions, SessionState};

/// How long readers may keep draining pipes after the process exited.
/// Bounded because a grandchild can hold a pipe open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub command: String,
    pub options: SessionOptions,
    pub request_id: Option<String>,
}

/// Fully resolved process invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

/// `[executable] ++ agent.args ++ options.args ++ [--resume id] ++ [command]`.
pub fn build_launch(agent: &AgentConfig, command: &str, options: &SessionOptions) -> LaunchPlan {
    let mut args = agent.args.clone();
    args.extend(options.args.iter().cloned());
    if let Some(resume) = options.resume.as_deref().filter(|r| !r.is_empty()) {
        args.push("--resume".to_string());
        args.push(resume.to_string());
    }
    if !command.is_empty() {
        args.push(command.to_string());
    }

    let cwd = options
        .cwd
        .clone()
        .or_else(|| options.project_path.clone())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    LaunchPlan {
        program: agent.executable.clone(),
        args,
        cwd,
        env: options.env.clone(),
    }
}

pub struct SessionOrchestrator {
    registry: Arc<SessionRegistry>,
    agent: AgentConfig,
    /// Parent of every session's terminate token.
    shutdown: CancellationToken,
}

impl SessionOrchestrator {
    pub fn new(agent: AgentConfig) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            agent,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a session and return its id without waiting for the process.
    ///
    /// The `started` event is queued on `sink` before the process is
    /// spawned, so it always precedes the session's output.
    pub fn start_session(
        &self,
        connection_id: &str,
        request: StartRequest,
        sink: EventSink,
    ) -> Result<String, SessionError> {
        if let Some(limit) = self.agent.max_sessions_per_connection
            && self.registry.count_for_connection(connection_id) >= limit
        {
            return Err(SessionError::LimitReached { limit });
        }

        let plan = build_launch(&self.agent, &request.command, &request.options);
        let session_id = Uuid::new_v4().to_string();
        let terminate = self.shutdown.child_token();

        self.registry.insert(SessionEntry::new(
            session_id.clone(),
            connection_id.to_string(),
            request.command.clone(),
            plan.cwd.clone(),
            sink,
            terminate.clone(),
        ));
        self.registry.emit(
            &session_id,
            ServerEvent::Started {
                session_id: session_id.clone(),
                request_id: request.request_id,
            },
        );

        info!(
            event = "server.session.start_requested",
            session_id = %session_id,
            connection_id = connection_id,
            program = %plan.program,
            cwd = %plan.cwd.display(),
        );

        let grace = Duration::from_millis(self.agent.terminate_grace_ms);
        tokio::spawn(run_session(
            self.registry.clone(),
            session_id.clone(),
            plan,
            grace,
            terminate,
        ));

        Ok(session_id)
    }

    /// Ask a session to stop: SIGTERM, then SIGKILL after the grace period.
    ///
    /// Succeeds for sessions that already finished.
    pub fn terminate_session(&self, session_id: &str) -> Result<(), SessionError> {
        if let Some(token) = self.registry.terminate_token(session_id) {
            info!(event = "server.session.terminate_requested", session_id = session_id);
            token.cancel();
            return Ok(());
        }
        if self.registry.finished_state(session_id).is_some() {
            debug!(event = "server.session.terminate_already_finished", session_id = session_id);
            return Ok(());
        }
        Err(SessionError::NotFound {
            id: session_id.to_string(),
        })
    }

    pub fn attach_session(
        &self,
        session_id: &str,
        connection_id: &str,
        sink: EventSink,
    ) -> Result<SessionInfo, SessionError> {
        let info = self
            .registry
            .bind(session_id, connection_id.to_string(), sink)?;
        info!(
            event = "server.session.attached",
            session_id = session_id,
            connection_id = connection_id,
        );
        Ok(info)
    }

    /// Unbind a closed connection. Its sessions keep running.
    pub fn detach_connection(&self, connection_id: &ConnectionId) {
        let detached = self.registry.detach_connection(connection_id);
        if detached > 0 {
            info!(
                event = "server.session.connection_detached",
                connection_id = %connection_id,
                sessions = detached,
            );
        }
    }

    /// Terminate every session and wait (bounded) for them to finish.
    pub async fn stop_all(&self) {
        let live = self.registry.len();
        info!(event = "server.session.stop_all_started", sessions = live);
        self.shutdown.cancel();

        let deadline = Duration::from_millis(self.agent.terminate_grace_ms) + DRAIN_TIMEOUT;
        let wait = async {
            while !self.registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        };
        if tokio::time::timeout(deadline, wait).await.is_err() {
            warn!(
                event = "server.session.stop_all_timed_out",
                remaining = self.registry.len(),
            );
        } else {
            info!(event = "server.session.stop_all_completed");
        }
    }
}

fn spawn_child(plan: &LaunchPlan) -> std::io::Result<Child> {
    let mut command = Command::new(&plan.program);
    command
        .args(&plan.args)
        .current_dir(&plan.cwd)
        .envs(&plan.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so signals reach the agent's children too
    command.process_group(0);
    command.spawn()
}

fn signal_group(pid: Option<u32>, signal: Signal) {
    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), signal) {
        debug!(event = "server.session.signal_failed", pid = raw, error = %e);
    }
}

async fn wait_or_terminate(
    child: &mut Child,
    session_id: &str,
    grace: Duration,
    terminate: &CancellationToken,
) -> std::io::Result<ExitStatus> {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = terminate.cancelled() => None,
    };
    if let Some(status) = exited {
        return status;
    }

    let pid = child.id();
    signal_group(pid, Signal::SIGTERM);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                event = "server.session.kill_forced",
                session_id = session_id,
                grace_ms = grace.as_millis() as u64,
            );
            signal_group(pid, Signal::SIGKILL);
            let _ = child.start_kill();
            child.wait().await
        }
    }
}

async fn run_session(
    registry: Arc<SessionRegistry>,
    session_id: String,
    plan: LaunchPlan,
    grace: Duration,
    terminate: CancellationToken,
) {
    let mut child = match spawn_child(&plan) {
        Ok(child) => child,
        Err(e) => {
            let err = SessionError::SpawnFailed {
                program: plan.program.clone(),
                message: e.to_string(),
            };
            error!(
                event = "server.session.spawn_failed",
                session_id = %session_id,
                program = %plan.program,
                error = %err,
            );
            let state = SessionState::Failed {
                error: err.to_string(),
            };
            registry.set_state(&session_id, state.clone());
            registry.emit(
                &session_id,
                ServerEvent::error(Some(session_id.clone()), err.error_code(), err.to_string()),
            );
            registry.finish(&session_id, state);
            return;
        }
    };

    let pid = child.id();
    registry.set_running(&session_id, pid);
    info!(
        event = "server.session.spawn_completed",
        session_id = %session_id,
        pid = ?pid,
    );

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_output_reader(
            registry.clone(),
            session_id.clone(),
            OutputStream::Stdout,
            stdout,
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_output_reader(
            registry.clone(),
            session_id.clone(),
            OutputStream::Stderr,
            stderr,
        ));
    }

    let status = wait_or_terminate(&mut child, &session_id, grace, &terminate).await;

    // Flush output before the terminal event
    let aborts: Vec<_> = readers.iter().map(|r| r.abort_handle()).collect();
    let drain = async {
        for reader in readers {
            let _ = reader.await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!(event = "server.session.drain_timed_out", session_id = %session_id);
        for abort in aborts {
            abort.abort();
        }
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(
                event = "server.session.wait_failed",
                session_id = %session_id,
                error = %e,
            );
            None
        }
    };

    let state = SessionState::Exited { code };
    registry.set_state(&session_id, state.clone());
    registry.emit(
        &session_id,
        ServerEvent::Exit {
            session_id: session_id.clone(),
            code,
        },
    );
    registry.finish(&session_id, state);

    info!(
        event = "server.session.exited",
        session_id = %session_id,
        code = ?code,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::sync::mpsc;

    fn shell_agent() -> AgentConfig {
        AgentConfig {
            executable: "sh".to_string(),
            args: vec!["-c".to_string()],
            terminate_grace_ms: 500,
            max_sessions_per_connection: None,
        }
    }

    fn start(command: &str) -> StartRequest {
        StartRequest {
            command: command.to_string(),
            ..Default::default()
        }
    }

    /// Collect events for one session until its terminal event.
    async fn collect_until_exit(
        rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
        session_id: &str,
    ) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        let deadline = Duration::from_secs(10);
        loop {
            let event = tokio::time::timeout(deadline, rx.recv())
                .await
                .expect("timed out waiting for session events")
                .expect("channel closed");
            let (id, terminal) = match &event {
                ServerEvent::Started { session_id, .. } => (Some(session_id.clone()), false),
                ServerEvent::Output { session_id, .. } => (Some(session_id.clone()), false),
                ServerEvent::Exit { session_id, .. } => (Some(session_id.clone()), true),
                ServerEvent::Error { session_id, .. } => (session_id.clone(), true),
                _ => (None, false),
            };
            if id.as_deref() == Some(session_id) {
                events.push(event);
                if terminal {
                    return events;
                }
            }
        }
    }

    fn stdout_of(events: &[ServerEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::Output {
                    stream: OutputStream::Stdout,
                    chunk,
                    ..
                } => Some(chunk.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_build_launch_argument_order() {
        let agent = AgentConfig {
            executable: "claude".to_string(),
            args: vec!["--print".to_string()],
            ..AgentConfig::default()
        };
        let options = SessionOptions {
            args: vec!["--verbose".to_string()],
            resume: Some("abc".to_string()),
            project_path: Some(PathBuf::from("/repo")),
            ..Default::default()
        };

        let plan = build_launch(&agent, "fix it", &options);
        assert_eq!(plan.program, "claude");
        assert_eq!(plan.args, vec!["--print", "--verbose", "--resume", "abc", "fix it"]);
        assert_eq!(plan.cwd, PathBuf::from("/repo"));

        let plan = build_launch(
            &agent,
            "",
            &SessionOptions {
                cwd: Some(PathBuf::from("/wt")),
                project_path: Some(PathBuf::from("/repo")),
                ..Default::default()
            },
        );
        assert_eq!(plan.args, vec!["--print"]);
        assert_eq!(plan.cwd, PathBuf::from("/wt"));
    }

    #[tokio::test]
    async fn test_output_then_exit_in_order() {
        let orchestrator = SessionOrchestrator::new(shell_agent());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = orchestrator
            .start_session(
                "c1",
                StartRequest {
                    request_id: Some("r1".to_string()),
                    ..start("echo one; echo two; echo oops >&2")
                },
                tx,
            )
            .unwrap();

        let events = collect_until_exit(&mut rx, &id).await;
        assert_eq!(
            events.first(),
            Some(&ServerEvent::Started {
                session_id: id.clone(),
                request_id: Some("r1".to_string()),
            })
        );
        assert_eq!(stdout_of(&events), "one\ntwo\n");
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::Output { stream: OutputStream::Stderr, chunk, .. } if chunk == "oops\n"
        )));
        assert_eq!(
            events.last(),
            Some(&ServerEvent::Exit {
                session_id: id.clone(),
                code: Some(0),
            })
        );

        // Entry removed after exit
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(orchestrator.registry().get(&id).is_none());
    }

    #[tokio::test]
    async fn test_start_does_not_wait_for_process() {
        let orchestrator = SessionOrchestrator::new(shell_agent());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let begin = Instant::now();
        let slow = orchestrator.start_session("c1", start("sleep 5"), tx.clone()).unwrap();
        let fast = orchestrator.start_session("c1", start("echo fast"), tx).unwrap();
        assert!(begin.elapsed() < Duration::from_millis(500));

        // The quick session finishes while the slow one is still running
        let events = collect_until_exit(&mut rx, &fast).await;
        assert_eq!(stdout_of(&events), "fast\n");
        assert!(orchestrator.registry().get(&slow).is_some());

        orchestrator.terminate_session(&slow).unwrap();
        let events = collect_until_exit(&mut rx, &slow).await;
        assert!(matches!(events.last(), Some(ServerEvent::Exit { .. })));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let orchestrator = SessionOrchestrator::new(shell_agent());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        let a = orchestrator.start_session("ca", start("echo from-a; exit 3"), tx_a).unwrap();
        let b = orchestrator.start_session("cb", start("echo from-b"), tx_b).unwrap();

        let events_a = collect_until_exit(&mut rx_a, &a).await;
        let events_b = collect_until_exit(&mut rx_b, &b).await;

        assert_eq!(stdout_of(&events_a), "from-a\n");
        assert_eq!(stdout_of(&events_b), "from-b\n");
        assert!(matches!(events_a.last(), Some(ServerEvent::Exit { code: Some(3), .. })));
        assert!(matches!(events_b.last(), Some(ServerEvent::Exit { code: Some(0), .. })));
    }

    #[tokio::test]
    async fn test_spawn_failure_emits_one_error() {
        let orchestrator = SessionOrchestrator::new(AgentConfig {
            executable: "/nonexistent/treehouse-agent".to_string(),
            ..shell_agent()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = orchestrator.start_session("c1", start("hi"), tx).unwrap();
        let events = collect_until_exit(&mut rx, &id).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            ServerEvent::Error { session_id: Some(s), code, .. }
                if s == &id && code == "SESSION_SPAWN_FAILED"
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(orchestrator.registry().is_empty());
        assert!(matches!(
            orchestrator.registry().finished_state(&id),
            Some(SessionState::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent_after_exit() {
        let orchestrator = SessionOrchestrator::new(shell_agent());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = orchestrator.start_session("c1", start("true"), tx).unwrap();
        collect_until_exit(&mut rx, &id).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(orchestrator.terminate_session(&id).is_ok());
        assert!(orchestrator.terminate_session(&id).is_ok());
        assert!(matches!(
            orchestrator.terminate_session("unknown"),
            Err(SessionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let orchestrator = SessionOrchestrator::new(AgentConfig {
            terminate_grace_ms: 200,
            ..shell_agent()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = orchestrator
            .start_session("c1", start("trap '' TERM; echo ready; while true; do sleep 0.1; done"), tx)
            .unwrap();

        // Wait until the trap is installed
        loop {
            let event = rx.recv().await.unwrap();
            if matches!(&event, ServerEvent::Output { chunk, .. } if chunk.contains("ready")) {
                break;
            }
        }

        orchestrator.terminate_session(&id).unwrap();
        let events = collect_until_exit(&mut rx, &id).await;
        // Killed by signal: no exit code
        assert!(matches!(events.last(), Some(ServerEvent::Exit { code: None, .. })));
    }

    #[tokio::test]
    async fn test_cwd_and_env_are_applied() {
        let dir = tempfile::TempDir::new().unwrap();
        let orchestrator = SessionOrchestrator::new(shell_agent());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut env = HashMap::new();
        env.insert("TREEHOUSE_TEST_VAR".to_string(), "hello".to_string());
        let id = orchestrator
            .start_session(
                "c1",
                StartRequest {
                    command: "pwd; echo $TREEHOUSE_TEST_VAR".to_string(),
                    options: SessionOptions {
                        cwd: Some(dir.path().to_path_buf()),
                        env,
                        ..Default::default()
                    },
                    request_id: None,
                },
                tx,
            )
            .unwrap();

        let output = stdout_of(&collect_until_exit(&mut rx, &id).await);
        let mut lines = output.lines();
        let pwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(pwd.canonicalize().unwrap(), dir.path().canonicalize().unwrap());
        assert_eq!(lines.next(), Some("hello"));
    }

    #[tokio::test]
    async fn test_max_sessions_per_connection() {
        let orchestrator = SessionOrchestrator::new(AgentConfig {
            max_sessions_per_connection: Some(1),
            ..shell_agent()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = orchestrator.start_session("c1", start("sleep 5"), tx.clone()).unwrap();
        let second = orchestrator.start_session("c1", start("sleep 5"), tx.clone());
        assert!(matches!(second, Err(SessionError::LimitReached { limit: 1 })));

        // Other connections are unaffected
        let other = orchestrator.start_session("c2", start("true"), tx).unwrap();
        collect_until_exit(&mut rx, &other).await;

        orchestrator.terminate_session(&first).unwrap();
        collect_until_exit(&mut rx, &first).await;
    }

    #[tokio::test]
    async fn test_detached_session_keeps_running_and_can_reattach() {
        let orchestrator = SessionOrchestrator::new(shell_agent());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = orchestrator
            .start_session("c1", start("sleep 0.3; echo after"), tx)
            .unwrap();
        orchestrator.detach_connection(&"c1".to_string());
        let _started = rx.recv().await;

        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let info = orchestrator.attach_session(&id, "c2", tx2).unwrap();
        assert_eq!(info.connection_id.as_deref(), Some("c2"));

        let events = collect_until_exit(&mut rx2, &id).await;
        assert_eq!(stdout_of(&events), "after\n");
    }

    #[tokio::test]
    async fn test_stop_all_terminates_everything() {
        let orchestrator = SessionOrchestrator::new(shell_agent());
        let (tx, _rx) = mpsc::unbounded_channel();
        orchestrator.start_session("c1", start("sleep 5"), tx.clone()).unwrap();
        orchestrator.start_session("c2", start("sleep 5"), tx).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let begin = Instant::now();
        orchestrator.stop_all().await;
        assert!(orchestrator.registry().is_empty());
        assert!(begin.elapsed() < Duration::from_secs(3));
    }
}
