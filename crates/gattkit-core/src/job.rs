//! The per-session job queue.
//!
//! Every remote operation a session performs (service discovery,
//! characteristic discovery, descriptor discovery, reads and writes) becomes
//! a [`Job`]. The queue holds at most one job in flight; everything else
//! waits in FIFO order. A completion is only accepted for the job currently
//! in flight, matched by [`JobId`].

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use tokio::sync::oneshot;

use gattkit_types::{Handle, WriteMode};

use crate::error::{Error, Result};

/// Identifier assigned to a job when it is enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
    /// Placeholder carried by a job before it is enqueued.
    const UNASSIGNED: JobId = JobId(0);
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// What a job asks the transport to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    ServiceDiscovery,
    CharacteristicDiscovery,
    DescriptorDiscovery,
    Read,
    Write,
}

/// Who is waiting for a job.
#[derive(Debug, Default)]
pub(crate) enum Reply {
    /// Nobody; progress is tracked elsewhere (discovery chains).
    #[default]
    Detached,
    Unit(oneshot::Sender<Result<()>>),
    Value(oneshot::Sender<Result<Vec<u8>>>),
}

impl Reply {
    pub(crate) fn succeed_unit(self) {
        match self {
            Reply::Unit(tx) => {
                let _ = tx.send(Ok(()));
            }
            Reply::Value(tx) => {
                let _ = tx.send(Ok(Vec::new()));
            }
            Reply::Detached => {}
        }
    }

    pub(crate) fn succeed_value(self, value: Vec<u8>) {
        match self {
            Reply::Value(tx) => {
                let _ = tx.send(Ok(value));
            }
            other => other.succeed_unit(),
        }
    }

    pub(crate) fn fail(self, error: Error) {
        match self {
            Reply::Unit(tx) => {
                let _ = tx.send(Err(error));
            }
            Reply::Value(tx) => {
                let _ = tx.send(Err(error));
            }
            Reply::Detached => {}
        }
    }
}

/// One unit of serialized remote work.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    pub(crate) kind: JobKind,
    pub(crate) target: Handle,
    pub(crate) payload: Vec<u8>,
    pub(crate) write_mode: WriteMode,
    /// Issued on behalf of a discovery chain rather than a caller.
    pub(crate) background: bool,
    pub(crate) reply: Reply,
    pub(crate) started: Option<Instant>,
}

impl Job {
    /// A job of `kind` against `target` with nobody waiting on it.
    pub fn new(kind: JobKind, target: Handle) -> Self {
        Self {
            id: JobId::UNASSIGNED,
            kind,
            target,
            payload: Vec::new(),
            write_mode: WriteMode::WithResponse,
            background: false,
            reply: Reply::Detached,
            started: None,
        }
    }

    pub(crate) fn read(target: Handle, reply: oneshot::Sender<Result<Vec<u8>>>) -> Self {
        Self {
            reply: Reply::Value(reply),
            ..Self::new(JobKind::Read, target)
        }
    }

    pub(crate) fn write(
        target: Handle,
        payload: Vec<u8>,
        write_mode: WriteMode,
        reply: oneshot::Sender<Result<()>>,
    ) -> Self {
        Self {
            payload,
            write_mode,
            reply: Reply::Unit(reply),
            ..Self::new(JobKind::Write, target)
        }
    }

    pub(crate) fn background(mut self) -> Self {
        self.background = true;
        self
    }

    /// The id assigned at enqueue time.
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn target(&self) -> Handle {
        self.target
    }
}

/// FIFO of pending jobs with a single in-flight slot.
#[derive(Debug)]
pub struct JobQueue {
    pending: VecDeque<Job>,
    in_flight: Option<Job>,
    next_id: u64,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: None,
            next_id: 1,
        }
    }

    /// Append a job and return its id.
    pub fn enqueue(&mut self, mut job: Job) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        job.id = id;
        self.pending.push_back(job);
        id
    }

    /// Move the oldest pending job into flight, if nothing is in flight.
    pub fn start_next(&mut self) -> Option<&mut Job> {
        if self.in_flight.is_some() {
            return None;
        }
        let mut job = self.pending.pop_front()?;
        job.started = Some(Instant::now());
        self.in_flight = Some(job);
        self.in_flight.as_mut()
    }

    /// Take the in-flight job if `id` matches it.
    ///
    /// Completions for any other id are stale and leave the queue untouched.
    pub fn complete(&mut self, id: JobId) -> Option<Job> {
        match &self.in_flight {
            Some(job) if job.id == id => self.in_flight.take(),
            _ => None,
        }
    }

    pub fn in_flight(&self) -> Option<&Job> {
        self.in_flight.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    /// Number of jobs waiting behind the in-flight one.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Remove every job, in-flight first, then pending in FIFO order.
    pub fn drain(&mut self) -> Vec<Job> {
        self.in_flight.take().into_iter().chain(self.pending.drain(..)).collect()
    }
}
