//! Worker side of an isolated run.

use super::capture::{redirect_stdout, StdoutCapture};
use super::frame::{
    read_frame, write_frame, Envelope, WorkerRequest, TAG_BODY, TAG_ENVELOPE, TAG_NO_BODY,
    TAG_REQUEST,
};
use crate::context::RequestContext;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Set on a worker process by the executor; `maybe_run_worker` checks it.
pub const WORKER_ENV: &str = "ZEAL_ISOLATED_WORKER";

/// Why a task stopped before returning normally.
#[derive(Debug, Error)]
pub enum TaskFault {
    /// Deliberate early stop; output so far is kept and the run is not a fault
    #[error("task exited early")]
    Exit,
    #[error(transparent)]
    Error(#[from] anyhow::Error),
}

impl From<io::Error> for TaskFault {
    fn from(e: io::Error) -> Self {
        TaskFault::Error(e.into())
    }
}

pub type Task = Arc<dyn Fn(&mut WorkerContext) -> Result<(), TaskFault> + Send + Sync>;

/// Tasks a worker binary can run, by name.
///
/// The parent only ships a name across the process boundary, so the same registry has
/// to be built in the parent (to register routes) and in the worker (to run them).
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Task>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, task: F) -> &mut Self
    where
        F: Fn(&mut WorkerContext) -> Result<(), TaskFault> + Send + Sync + 'static,
    {
        if self.tasks.insert(name.to_string(), Arc::new(task)).is_some() {
            warn!(task = %name, "Isolated task replaced");
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// What a task sees: the request, its captures, and a buffered response.
///
/// Body output goes through `io::Write`. In a worker process it is written to the
/// captured stdout, interleaved with anything the task prints; elsewhere it is buffered.
/// Either way it only reaches the parent once the task returns.
#[derive(Debug)]
pub struct WorkerContext {
    request: RequestContext,
    params: Vec<(String, String)>,
    body: Vec<u8>,
    to_stdout: bool,
    status: Option<u16>,
    headers: Vec<(String, String)>,
}

impl WorkerContext {
    #[must_use]
    pub fn new(request: RequestContext, params: Vec<(String, String)>) -> Self {
        Self {
            request,
            params,
            body: Vec::new(),
            to_stdout: false,
            status: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Captured path parameter; last one wins for repeated names.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    /// Replaces a header with the same name (ASCII case-insensitive).
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    fn streaming(request: RequestContext, params: Vec<(String, String)>) -> Self {
        Self {
            to_stdout: true,
            ..Self::new(request, params)
        }
    }

    /// Append text to the body.
    pub fn echo(&mut self, text: &str) {
        if let Err(e) = self.write_all(text.as_bytes()) {
            warn!(error = %e, "Isolated task output lost");
        }
    }

    /// Stop the task here, keeping output written so far.
    pub fn exit(&self) -> Result<(), TaskFault> {
        Err(TaskFault::Exit)
    }

    /// Buffered body so far; always empty while writing to the captured stdout.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.body
    }
}

impl Write for WorkerContext {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.to_stdout {
            return io::stdout().write(buf);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.to_stdout {
            return io::stdout().flush();
        }
        Ok(())
    }
}

/// How a task run ended, before it is put on the wire.
enum Completion {
    Normal,
    EarlyExit,
    Fault(String),
}

/// What a task run left behind, before it is put on the wire.
struct Ran {
    body: Option<Vec<u8>>,
    completion: Completion,
    status: Option<u16>,
    headers: Vec<(String, String)>,
}

impl Ran {
    fn refused(message: String) -> Self {
        Self {
            body: None,
            completion: Completion::Fault(message),
            status: None,
            headers: Vec::new(),
        }
    }
}

/// Serve one request frame from `input` and answer on `output`.
///
/// Task output is buffered in memory; anything the task prints to the process stdout
/// is not part of the body. Returns the process exit code: 0 for normal and early-exit
/// runs, 1 for faults.
pub fn run_worker<R: Read, W: Write>(registry: &TaskRegistry, input: R, output: W) -> i32 {
    serve(registry, input, output, None)
}

fn serve<R: Read, W: Write>(
    registry: &TaskRegistry,
    mut input: R,
    mut output: W,
    capture: Option<StdoutCapture>,
) -> i32 {
    let ran = execute(registry, &mut input, capture.is_some());
    let ran = match capture {
        None => ran,
        Some(capture) => match capture.finish() {
            Ok(printed) => Ran {
                body: Some(printed),
                ..ran
            },
            Err(e) => {
                error!(error = %e, "Isolated task output could not be collected");
                Ran {
                    completion: Completion::Fault(format!("collecting task output: {e}")),
                    ..ran
                }
            }
        },
    };
    finish(&mut output, ran.body, ran.completion, ran.status, &ran.headers)
}

fn execute<R: Read>(registry: &TaskRegistry, input: &mut R, to_stdout: bool) -> Ran {
    let request = match read_request(input) {
        Ok(request) => request,
        Err(message) => {
            error!(error = %message, "Isolated worker received a malformed request");
            return Ran::refused(message);
        }
    };

    let Some(task) = registry.get(&request.task) else {
        error!(task = %request.task, "Isolated task not registered");
        return Ran::refused(format!("unknown isolated task `{}`", request.task));
    };

    info!(
        task = %request.task,
        request_id = %request.request.request_id,
        "Isolated task start"
    );
    let mut ctx = if to_stdout {
        WorkerContext::streaming(request.request, request.params)
    } else {
        WorkerContext::new(request.request, request.params)
    };
    let completion = match catch_unwind(AssertUnwindSafe(|| task(&mut ctx))) {
        Ok(Ok(())) => Completion::Normal,
        Ok(Err(TaskFault::Exit)) => Completion::EarlyExit,
        Ok(Err(TaskFault::Error(e))) => Completion::Fault(format!("{e:#}")),
        Err(panic) => Completion::Fault(panic_message(panic.as_ref())),
    };
    if let Completion::Fault(message) = &completion {
        error!(task = %request.task, error = %message, "Isolated task faulted");
    }

    let WorkerContext {
        body,
        status,
        headers,
        ..
    } = ctx;
    Ran {
        body: Some(body),
        completion,
        status,
        headers,
    }
}

/// Entry point for binaries: runs as a worker when started by the executor.
///
/// Call first thing in `main`; `Some(code)` means this process was a worker and should
/// exit with `code`. Frames go to the original stdout, while fd 1 is redirected for the
/// duration of the task so printed text lands in the body instead of the frame stream.
pub fn maybe_run_worker(registry: &TaskRegistry) -> Option<i32> {
    if std::env::var(WORKER_ENV).as_deref() != Ok("1") {
        return None;
    }
    crate::logging::init_worker_logging();
    let stdin = io::stdin();
    let code = match redirect_stdout() {
        Ok((frames, capture)) => serve(registry, stdin.lock(), io::BufWriter::new(frames), Some(capture)),
        Err(e) => {
            warn!(error = %e, "Worker stdout not captured; tasks must not print to it");
            serve(registry, stdin.lock(), io::stdout().lock(), None)
        }
    };
    Some(code)
}

fn read_request<R: Read>(input: &mut R) -> Result<WorkerRequest, String> {
    match read_frame(input) {
        Ok(Some((TAG_REQUEST, payload))) => serde_json::from_slice(&payload)
            .map_err(|e| format!("malformed request frame: {e}")),
        Ok(Some((tag, _))) => Err(format!(
            "expected request frame, got tag {:?}",
            char::from(tag)
        )),
        Ok(None) => Err("no request frame received".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn finish<W: Write>(
    output: &mut W,
    body: Option<Vec<u8>>,
    completion: Completion,
    status: Option<u16>,
    headers: &[(String, String)],
) -> i32 {
    let body = body.unwrap_or_default();
    let (envelope, exit_code) = match completion {
        Completion::Normal => (
            envelope(status.unwrap_or(200), headers, false, false, &body, None),
            0,
        ),
        Completion::EarlyExit => (
            envelope(status.unwrap_or(200), headers, false, true, &body, None),
            0,
        ),
        Completion::Fault(message) => (
            envelope(status.unwrap_or(500), headers, true, false, &body, Some(message)),
            1,
        ),
    };

    // A normal run always sends a body frame, even an empty one.
    let no_body = body.is_empty() && (envelope.faulted || envelope.early_exit);
    let written = write_response(output, &body, no_body, &envelope);
    if let Err(e) = written {
        error!(error = %e, "Isolated worker could not write its response");
        return 1;
    }
    exit_code
}

fn envelope(
    status_code: u16,
    headers: &[(String, String)],
    faulted: bool,
    early_exit: bool,
    body: &[u8],
    error: Option<String>,
) -> Envelope {
    Envelope {
        status_code,
        headers: headers.to_vec(),
        faulted,
        early_exit,
        body_length: body.len() as u64,
        error,
    }
}

fn write_response<W: Write>(
    output: &mut W,
    body: &[u8],
    no_body: bool,
    envelope: &Envelope,
) -> io::Result<()> {
    if no_body {
        write_frame(output, TAG_NO_BODY, &[])?;
    } else {
        write_frame(output, TAG_BODY, body)?;
    }
    let payload = serde_json::to_vec(envelope).map_err(io::Error::other)?;
    write_frame(output, TAG_ENVELOPE, &payload)?;
    output.flush()
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
