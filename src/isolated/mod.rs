//! # Isolated Execution Module
//!
//! Runs a handler's work in a separate worker process when a coroutine does not give
//! enough isolation: a crash, a panic, or a runaway loop in the task cannot take the
//! server down with it.
//!
//! ## How a run works
//!
//! 1. The parent starts the worker program (by default the running binary) with
//!    `ZEAL_ISOLATED_WORKER=1` and writes a request frame to its stdin.
//! 2. The binary's `main` calls [`maybe_run_worker`] first, which looks the task up in
//!    a [`TaskRegistry`] and runs it against a [`WorkerContext`]. For the duration of
//!    the task fd 1 is redirected into a capture pipe, so the task's whole standard
//!    output (its own `println!`s included) is the body candidate.
//! 3. The worker answers on its original stdout, a separate channel the task cannot
//!    write to, with a body frame (or the empty no-body frame) and an [`Envelope`]
//!    describing status, headers and whether the run faulted.
//! 4. The parent drains stdout to the end, decodes strictly, and only then applies the
//!    envelope to the response sink.
//!
//! ## Frames
//!
//! `[tag: u8][len: u32 big-endian][payload]` with tags `R` (request JSON), `B` (body),
//! `N` (no body, zero length) and `E` (envelope JSON). A task that prints `EOF` is
//! therefore just a task with a three-byte body.

mod capture;
mod error;
mod executor;
mod frame;
mod worker;

pub use error::IsolatedError;
pub use executor::{
    drain, IsolatedExecutor, IsolatedOutcome, Wait, WorkerCommand, DRAIN_CHUNK, TIMEOUT_ERROR,
};
pub use frame::{
    decode_response, read_frame, write_frame, Envelope, IsolatedBody, WorkerRequest,
    MAX_FRAME_LEN, TAG_BODY, TAG_ENVELOPE, TAG_NO_BODY, TAG_REQUEST,
};
pub use worker::{
    maybe_run_worker, run_worker, Task, TaskFault, TaskRegistry, WorkerContext, WORKER_ENV,
};
pub(crate) use worker::panic_message;
