//! Parent side of an isolated run.

use super::error::IsolatedError;
use super::frame::{
    decode_response, write_frame, Envelope, IsolatedBody, WorkerRequest, TAG_REQUEST,
};
use super::worker::WORKER_ENV;
use crate::config::IsolatedConfig;
use crate::context::RequestContext;
use crate::dispatcher::ResponseSink;
use crate::router::ParamVec;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Worker output is drained in chunks of this size.
pub const DRAIN_CHUNK: usize = 8192;

/// Error text of the envelope synthesized for a worker that ran out of time.
pub const TIMEOUT_ERROR: &str = "isolated worker timed out";

/// Pause between exit checks once the worker closed its output.
const EXIT_POLL: Duration = Duration::from_millis(2);

// Run states; whichever of the drain thread and the watchdog moves a run out of
// RUNNING decides how it ended.
const RUNNING: u8 = 0;
const EXITED: u8 = 1;
const TIMED_OUT: u8 = 2;

/// Program and arguments used to start a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running executable, which must call `maybe_run_worker` first in `main`.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).env(WORKER_ENV, "1");
        cmd
    }
}

/// Whether `run` waits for the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Suspend the calling coroutine until the worker's response is decoded
    Block,
    /// Fire and forget; output is discarded and the sink is left alone
    Detached,
}

/// Decoded result of a blocking run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedOutcome {
    pub envelope: Envelope,
    pub body: IsolatedBody,
    /// `None` when the worker was killed by a signal
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

struct Collected {
    output: Vec<u8>,
    exit_code: Option<i32>,
    timed_out: bool,
}

/// Runs named tasks in freshly spawned worker processes.
///
/// Each call spawns its own worker; there is no pool.
#[derive(Debug, Clone)]
pub struct IsolatedExecutor {
    command: WorkerCommand,
    timeout: Duration,
}

impl IsolatedExecutor {
    #[must_use]
    pub fn new(command: WorkerCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Worker program from config, or the running executable.
    pub fn from_config(config: &IsolatedConfig) -> Result<Self, IsolatedError> {
        let mut command = match &config.worker_program {
            Some(program) => WorkerCommand::new(program),
            None => WorkerCommand::current_exe()?,
        };
        for arg in &config.worker_args {
            command = command.arg(arg);
        }
        Ok(Self::new(command, config.timeout()))
    }

    #[must_use]
    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `task` in a worker and forward its status and headers into `sink`.
    ///
    /// With [`Wait::Block`] the sink is only touched after the whole stream decoded.
    /// A worker that runs past the timeout is killed and reported as a faulted 504.
    pub fn run(
        &self,
        task: &str,
        request: &RequestContext,
        params: &ParamVec,
        sink: &ResponseSink,
        wait: Wait,
    ) -> Result<Option<IsolatedOutcome>, IsolatedError> {
        let start = Instant::now();
        let frame = request_frame(task, request, params)?;

        if wait == Wait::Detached {
            self.run_detached(task, frame)?;
            return Ok(None);
        }

        let child = self.spawn(task, Stdio::piped())?;
        let collected = self.collect(child, frame)?;
        let outcome = self.outcome(task, collected, start)?;

        sink.set_status(outcome.envelope.status_code);
        for (name, value) in &outcome.envelope.headers {
            sink.set_header(name, value.as_str());
        }
        Ok(Some(outcome))
    }

    /// Run `task` and return only its body; status and headers are dropped.
    pub fn coprocess(&self, task: &str, request: &RequestContext) -> Result<Vec<u8>, IsolatedError> {
        let start = Instant::now();
        let frame = request_frame(task, request, &ParamVec::new())?;
        let child = self.spawn(task, Stdio::piped())?;
        let collected = self.collect(child, frame)?;
        let outcome = self.outcome(task, collected, start)?;
        if outcome.timed_out {
            return Err(IsolatedError::TimedOut(self.timeout));
        }
        Ok(outcome.body.into_bytes())
    }

    fn spawn(&self, task: &str, stdout: Stdio) -> Result<Child, IsolatedError> {
        let child = self
            .command
            .command()
            .stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| IsolatedError::Spawn {
                program: self.command.program.display().to_string(),
                source,
            })?;
        info!(
            task = %task,
            pid = child.id(),
            program = %self.command.program.display(),
            "Isolated worker spawned"
        );
        Ok(child)
    }

    fn run_detached(&self, task: &str, frame: Vec<u8>) -> Result<(), IsolatedError> {
        let mut child = self.spawn(task, Stdio::null())?;
        let Some(stdin) = child.stdin.take() else {
            kill_and_reap(&mut child);
            return Err(IsolatedError::Protocol("worker stdin not captured".to_string()));
        };
        let child = Arc::new(Mutex::new(child));
        let reaper = {
            let child = Arc::clone(&child);
            let task = task.to_string();
            thread::Builder::new()
                .name("zeal-isolated-reaper".to_string())
                .spawn(move || {
                    if let Err(e) = send_request(stdin, &frame) {
                        warn!(task = %task, error = %e, "Detached worker request not delivered");
                    }
                    let status = child.lock().unwrap_or_else(PoisonError::into_inner).wait();
                    match status {
                        Ok(status) => debug!(task = %task, status = %status, "Detached worker reaped"),
                        Err(e) => warn!(task = %task, error = %e, "Detached worker wait failed"),
                    }
                })
        };
        if let Err(e) = reaper {
            kill_and_reap(&mut child.lock().unwrap_or_else(PoisonError::into_inner));
            return Err(IsolatedError::Io(e));
        }
        Ok(())
    }

    /// Send the request, drain stdout until EOF, and wait for the exit, all under one
    /// deadline.
    ///
    /// The watchdog starts before anything is written, so a worker that never reads its
    /// request is killed like one that never answers. Writing, draining and waiting run
    /// on helper threads; the caller waits on `may` channels, so only the calling
    /// coroutine is suspended.
    fn collect(&self, mut child: Child, frame: Vec<u8>) -> Result<Collected, IsolatedError> {
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                kill_and_reap(&mut child);
                return Err(IsolatedError::Protocol("worker stdio not captured".to_string()));
            }
        };

        let child = Arc::new(Mutex::new(child));
        let state = Arc::new(AtomicU8::new(RUNNING));
        let (done_tx, done_rx) = std_mpsc::channel::<()>();
        let (sent_tx, sent_rx) = may::sync::mpsc::channel::<Result<(), IsolatedError>>();
        let (reply_tx, reply_rx) =
            may::sync::mpsc::channel::<(io::Result<Vec<u8>>, io::Result<ExitStatus>)>();

        let watchdog = {
            let child = Arc::clone(&child);
            let state = Arc::clone(&state);
            let timeout = self.timeout;
            thread::Builder::new()
                .name("zeal-isolated-watchdog".to_string())
                .spawn(move || {
                    let expired = matches!(
                        done_rx.recv_timeout(timeout),
                        Err(std_mpsc::RecvTimeoutError::Timeout)
                    );
                    if expired && claim(&state, TIMED_OUT) {
                        let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
                        warn!(pid = child.id(), timeout_ms = timeout.as_millis() as u64, "Killing isolated worker");
                        if let Err(e) = child.kill() {
                            debug!(error = %e, "Isolated worker already gone");
                        }
                    }
                })
        };
        let writer = watchdog.and_then(|_| {
            thread::Builder::new()
                .name("zeal-isolated-writer".to_string())
                .spawn(move || {
                    let _ = sent_tx.send(send_request(stdin, &frame));
                })
        });
        let drainer = writer.and_then(|_| {
            let child = Arc::clone(&child);
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("zeal-isolated-drain".to_string())
                .spawn(move || {
                    let mut output = Vec::new();
                    let drained = drain(stdout, &mut output).map(|()| output);
                    let status = wait_for_exit(&child);
                    claim(&state, EXITED);
                    drop(done_tx);
                    let _ = reply_tx.send((drained, status));
                })
        });
        if let Err(e) = drainer {
            kill_and_reap(&mut child.lock().unwrap_or_else(PoisonError::into_inner));
            return Err(IsolatedError::Io(e));
        }

        let (drained, status) = reply_rx
            .recv()
            .map_err(|_| IsolatedError::Protocol("worker drain thread vanished".to_string()))?;
        // The child has exited, so the writer is done or failing with a broken pipe.
        sent_rx
            .recv()
            .map_err(|_| IsolatedError::Protocol("worker writer thread vanished".to_string()))??;
        let output = drained?;
        let status = status?;
        debug!(bytes = output.len(), "Worker output drained");

        Ok(Collected {
            output,
            exit_code: status.code(),
            timed_out: state.load(Ordering::SeqCst) == TIMED_OUT,
        })
    }

    fn outcome(
        &self,
        task: &str,
        collected: Collected,
        start: Instant,
    ) -> Result<IsolatedOutcome, IsolatedError> {
        let Collected {
            output,
            exit_code,
            timed_out,
        } = collected;

        let (body, envelope, timed_out) = settle(&output, timed_out).map_err(|e| {
            error!(task = %task, exit_code = ?exit_code, error = %e, "Isolated worker response rejected");
            e
        })?;

        let elapsed = start.elapsed();
        info!(
            task = %task,
            status = envelope.status_code,
            faulted = envelope.faulted,
            early_exit = envelope.early_exit,
            body_length = envelope.body_length,
            exit_code = ?exit_code,
            timed_out = timed_out,
            latency_ms = elapsed.as_millis() as u64,
            "Isolated run complete"
        );
        Ok(IsolatedOutcome {
            envelope,
            body,
            exit_code,
            timed_out,
            elapsed,
        })
    }
}

fn request_frame(
    task: &str,
    request: &RequestContext,
    params: &ParamVec,
) -> Result<Vec<u8>, IsolatedError> {
    let payload = WorkerRequest {
        task: task.to_string(),
        request: request.clone(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    };
    let json = serde_json::to_vec(&payload)
        .map_err(|e| IsolatedError::Protocol(format!("request not encodable: {e}")))?;
    let mut frame = Vec::with_capacity(json.len() + 5);
    write_frame(&mut frame, TAG_REQUEST, &json)?;
    Ok(frame)
}

/// Decide how a run ended from what the worker wrote.
///
/// A complete response wins even when the deadline fired on the way out; only a
/// timed-out run with an undecodable stream becomes the synthesized 504. The returned
/// flag says whether the envelope was synthesized.
pub(crate) fn settle(
    output: &[u8],
    timed_out: bool,
) -> Result<(IsolatedBody, Envelope, bool), IsolatedError> {
    match decode_response(output) {
        Ok((body, envelope)) => {
            if timed_out {
                debug!("Isolated worker answered in full before it was killed");
            }
            Ok((body, envelope, false))
        }
        Err(_) if timed_out => Ok((
            IsolatedBody::NotProduced,
            Envelope::synthesized_fault(504, TIMEOUT_ERROR),
            true,
        )),
        Err(e) => Err(e),
    }
}

/// Move a run out of `RUNNING`; false if the other side got there first.
fn claim(state: &AtomicU8, to: u8) -> bool {
    state
        .compare_exchange(RUNNING, to, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Poll for the exit without holding the lock, so the watchdog can still kill.
fn wait_for_exit(child: &Mutex<Child>) -> io::Result<ExitStatus> {
    loop {
        if let Some(status) = child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_wait()?
        {
            return Ok(status);
        }
        thread::sleep(EXIT_POLL);
    }
}

/// Kill and wait, for a worker abandoned before its run could be collected.
pub(crate) fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(pid = child.id(), error = %e, "Isolated worker already gone");
    }
    if let Err(e) = child.wait() {
        warn!(pid = child.id(), error = %e, "Isolated worker could not be reaped");
    }
}

fn send_request(mut stdin: ChildStdin, frame: &[u8]) -> Result<(), IsolatedError> {
    match stdin.write_all(frame).and_then(|()| stdin.flush()) {
        Ok(()) => Ok(()),
        // The worker quit, or was killed, before reading; its output decides what happened.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Isolated worker closed stdin early");
            Ok(())
        }
        Err(e) => Err(IsolatedError::Io(e)),
    }
}

/// Read everything from `reader` in fixed-size chunks.
pub fn drain<R: Read>(mut reader: R, out: &mut Vec<u8>) -> io::Result<()> {
    let mut chunk = [0u8; DRAIN_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}
