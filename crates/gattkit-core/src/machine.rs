//! The per-session state machine.
//!
//! One task per session owns the job queue and is the only writer of the
//! attribute table. It reads a single mailbox fed by three producers:
//! callers (commands), spawned transport requests (completions) and the
//! transport's [`EventSink`] (unsolicited events). Each message is handled
//! to completion before the next is read, then the queue is pumped so that
//! the next job starts as soon as the previous one finished.
//!
//! Per-service detail discovery is a chain: characteristic discovery first,
//! then descriptor discovery of each characteristic in order and, in
//! [`DiscoveryMode::FullDiscovery`], reads of every readable characteristic
//! and every descriptor. Only one job of a chain is queued at a time.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use gattkit_types::{
    CharacteristicProperties, DiscoveryMode, Handle, ServiceError, ServiceState, SessionState,
    WriteMode,
};

use crate::attribute::{AttributeTable, TableError};
use crate::config::DEFAULT_ATT_MTU;
use crate::error::{Error, OperationErrorReason, Result};
use crate::events::{DisconnectReason, SessionEvent};
use crate::job::{Job, JobId, JobKind, JobQueue};
use crate::session::SessionShared;
use crate::transport::{
    CharacteristicDeclaration, DescriptorDeclaration, EventSink, ServiceDeclaration, Target,
    Transport, TransportError, TransportEvent, TransportResult,
};

type UnitReply = oneshot::Sender<Result<()>>;

/// Everything a session's mailbox can carry.
#[derive(Debug)]
pub(crate) enum Inbound {
    Command(Command),
    Opened(TransportResult<()>),
    Completed { job: JobId, outcome: Outcome },
    Transport(TransportEvent),
}

/// Requests posted by [`Session`](crate::Session) and
/// [`ServiceView`](crate::ServiceView) after their synchronous checks.
#[derive(Debug)]
pub(crate) enum Command {
    Connect {
        reply: UnitReply,
    },
    DiscoverServices {
        reply: UnitReply,
    },
    DiscoverDetails {
        service: Handle,
        mode: DiscoveryMode,
        reply: UnitReply,
    },
    Read {
        handle: Handle,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    Write {
        handle: Handle,
        value: Vec<u8>,
        mode: WriteMode,
        reply: UnitReply,
    },
    Close,
}

/// Result of one transport request.
#[derive(Debug)]
pub(crate) enum Outcome {
    Services(TransportResult<Vec<ServiceDeclaration>>),
    Characteristics(TransportResult<Vec<CharacteristicDeclaration>>),
    Descriptors(TransportResult<Vec<DescriptorDeclaration>>),
    Value(TransportResult<Vec<u8>>),
    Written(TransportResult<()>),
}

impl Outcome {
    fn failure(kind: JobKind, error: TransportError) -> Self {
        match kind {
            JobKind::ServiceDiscovery => Outcome::Services(Err(error)),
            JobKind::CharacteristicDiscovery => Outcome::Characteristics(Err(error)),
            JobKind::DescriptorDiscovery => Outcome::Descriptors(Err(error)),
            JobKind::Read => Outcome::Value(Err(error)),
            JobKind::Write => Outcome::Written(Err(error)),
        }
    }

    fn is_ok(&self) -> bool {
        match self {
            Outcome::Services(r) => r.is_ok(),
            Outcome::Characteristics(r) => r.is_ok(),
            Outcome::Descriptors(r) => r.is_ok(),
            Outcome::Value(r) => r.is_ok(),
            Outcome::Written(r) => r.is_ok(),
        }
    }
}

/// A transport call with everything it needs copied out of the table.
enum Request {
    Services,
    Characteristics(ServiceDeclaration),
    Descriptors(CharacteristicDeclaration),
    Read(Target),
    Write(Target, Vec<u8>, WriteMode),
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Descriptors(Handle),
    Read(Handle),
}

/// Progress of one service's detail discovery.
struct DetailDiscovery {
    mode: DiscoveryMode,
    steps: VecDeque<Step>,
    waiters: Vec<UnitReply>,
}

pub(crate) struct SessionMachine {
    shared: Arc<SessionShared>,
    transport: Arc<dyn Transport>,
    mailbox: mpsc::UnboundedReceiver<Inbound>,
    queue: JobQueue,
    connect_reply: Option<UnitReply>,
    service_waiters: Vec<UnitReply>,
    details: HashMap<Handle, DetailDiscovery>,
    link_open: bool,
    stopped: bool,
}

impl SessionMachine {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        transport: Arc<dyn Transport>,
        mailbox: mpsc::UnboundedReceiver<Inbound>,
    ) -> Self {
        Self {
            shared,
            transport,
            mailbox,
            queue: JobQueue::new(),
            connect_reply: None,
            service_waiters: Vec::new(),
            details: HashMap::new(),
            link_open: false,
            stopped: false,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(message) = self.mailbox.recv().await {
            self.handle(message);
            if self.stopped {
                break;
            }
            self.pump();
        }
        if !self.stopped {
            self.shutdown(None);
        }
        debug!("session machine stopped");
    }

    fn handle(&mut self, message: Inbound) {
        // Closed from the caller side; the message is dropped with its reply.
        if !self.shared.state().is_valid() {
            self.shutdown(None);
            return;
        }
        match message {
            Inbound::Command(command) => self.on_command(command),
            Inbound::Opened(result) => self.on_opened(result),
            Inbound::Completed { job, outcome } => self.on_completed(job, outcome),
            Inbound::Transport(event) => self.on_transport_event(event),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.open(reply),
            Command::DiscoverServices { reply } => self.discover_services(reply),
            Command::DiscoverDetails {
                service,
                mode,
                reply,
            } => self.discover_details(service, mode, reply),
            Command::Read { handle, reply } => self.submit(Job::read(handle, reply)),
            Command::Write {
                handle,
                value,
                mode,
                reply,
            } => self.submit(Job::write(handle, value, mode, reply)),
            Command::Close => self.shutdown(Some(DisconnectReason::UserRequested)),
        }
    }

    fn open(&mut self, reply: UnitReply) {
        self.connect_reply = Some(reply);
        self.link_open = true;

        let transport = Arc::clone(&self.transport);
        let dispatcher = self.shared.dispatcher.clone();
        let token = self.shared.token;
        let address = self.shared.address.clone();
        let limit = self.shared.config.open_timeout;
        let sink = EventSink::new(token, dispatcher.clone());
        debug!(%address, "opening transport");
        tokio::spawn(async move {
            let result = deadline(limit, transport.open(&address, sink)).await;
            dispatcher.post(token, Inbound::Opened(result));
        });
    }

    fn on_opened(&mut self, result: TransportResult<()>) {
        let reply = self.connect_reply.take();
        match result {
            Ok(()) => {
                self.shared.metrics.mark_connected();
                self.shared.advance_state(SessionState::Connected);
                info!("transport open");
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to open transport");
                self.link_open = false;
                self.shared.events.send(SessionEvent::SessionError {
                    error: err.to_string(),
                });
                if let Some(reply) = reply {
                    let _ = reply.send(Err(Error::connection(self.shared.address.clone(), err.clone())));
                }
                self.shutdown(Some(DisconnectReason::Failed(err.to_string())));
            }
        }
    }

    fn discover_services(&mut self, reply: UnitReply) {
        let state = self.shared.state();
        match state {
            SessionState::Connected => {
                self.shared.advance_state(SessionState::Discovering);
                self.service_waiters.push(reply);
                self.submit(Job::new(JobKind::ServiceDiscovery, Handle::INVALID));
            }
            SessionState::Discovering => self.service_waiters.push(reply),
            SessionState::Discovered => {
                let _ = reply.send(Ok(()));
            }
            _ => {
                let _ = reply.send(Err(Error::operation(
                    OperationErrorReason::SessionNotReady {
                        state,
                        expected: SessionState::Connected,
                    },
                )));
            }
        }
    }

    fn discover_details(&mut self, service: Handle, mode: DiscoveryMode, reply: UnitReply) {
        let Some(status) = self.shared.service_status(service) else {
            let _ = reply.send(Err(Error::operation(OperationErrorReason::UnknownHandle(
                service,
            ))));
            return;
        };
        match status.state {
            ServiceState::DiscoveryRequired => {
                debug!(%service, ?mode, "discovering service details");
                self.details.insert(
                    service,
                    DetailDiscovery {
                        mode,
                        steps: VecDeque::new(),
                        waiters: vec![reply],
                    },
                );
                self.shared
                    .set_service_state(service, ServiceState::Discovering);
                self.submit(Job::new(JobKind::CharacteristicDiscovery, service));
            }
            ServiceState::Discovering => match self.details.get_mut(&service) {
                Some(discovery) => discovery.waiters.push(reply),
                None => {
                    let _ = reply.send(Err(Error::SessionInvalidated));
                }
            },
            ServiceState::Discovered => {
                let _ = reply.send(Ok(()));
            }
            _ => {
                let _ = reply.send(Err(Error::SessionInvalidated));
            }
        }
    }

    fn submit(&mut self, job: Job) {
        let id = self.queue.enqueue(job);
        trace!(%id, "job enqueued");
        self.shared
            .metrics
            .observe_queue_depth(self.queue.pending_len());
    }

    /// Start the next job if the queue is idle.
    fn pump(&mut self) {
        while let Some(job) = self.queue.start_next() {
            let id = job.id();
            let kind = job.kind;
            let target = job.target;
            let mode = job.write_mode;
            let payload = job.payload.clone();

            let request = request_for(&self.shared.model.read().table, kind, target, payload, mode);
            match request {
                Ok(request) => {
                    self.dispatch(id, kind, request);
                    return;
                }
                Err(err) => {
                    warn!(%id, ?kind, %target, error = %err, "job cannot be dispatched");
                    self.on_completed(id, Outcome::failure(kind, err));
                }
            }
        }
    }

    fn dispatch(&self, id: JobId, kind: JobKind, request: Request) {
        let transport = Arc::clone(&self.transport);
        let dispatcher = self.shared.dispatcher.clone();
        let token = self.shared.token;
        let limit = self.shared.config.timeout_for(kind);
        trace!(%id, ?kind, "job dispatched");

        tokio::spawn(async move {
            let outcome = match request {
                Request::Services => {
                    Outcome::Services(deadline(limit, transport.discover_services()).await)
                }
                Request::Characteristics(service) => Outcome::Characteristics(
                    deadline(limit, transport.discover_characteristics(&service)).await,
                ),
                Request::Descriptors(characteristic) => Outcome::Descriptors(
                    deadline(limit, transport.discover_descriptors(&characteristic)).await,
                ),
                Request::Read(target) => Outcome::Value(deadline(limit, transport.read(target)).await),
                Request::Write(target, value, mode) => Outcome::Written(
                    deadline(limit, transport.write(target, &value, mode)).await,
                ),
            };
            if !dispatcher.post(token, Inbound::Completed { job: id, outcome }) {
                trace!(%id, "completion arrived after the session ended");
            }
        });
    }

    fn on_completed(&mut self, id: JobId, outcome: Outcome) {
        let Some(job) = self.queue.complete(id) else {
            debug!(%id, "discarding stale completion");
            return;
        };
        let elapsed = job.started.map(|t| t.elapsed()).unwrap_or_default();
        self.shared
            .metrics
            .record_job(job.kind, elapsed, outcome.is_ok());

        match outcome {
            Outcome::Services(result) => self.finish_service_discovery(result),
            Outcome::Characteristics(result) => {
                self.finish_characteristic_discovery(job.target, result)
            }
            Outcome::Descriptors(result) => self.finish_descriptor_discovery(job.target, result),
            Outcome::Value(result) => self.finish_read(job, result),
            Outcome::Written(result) => self.finish_write(job, result),
        }
    }

    fn finish_service_discovery(&mut self, result: TransportResult<Vec<ServiceDeclaration>>) {
        let folded = result.and_then(|declared| {
            let mut model = self.shared.model.write();
            let mut handles = Vec::with_capacity(declared.len());
            for service in declared {
                let handle = model
                    .table
                    .insert_service(service.id, service.uuid, service.kind)
                    .map_err(table_error)?;
                model.services.entry(handle).or_default();
                handles.push(handle);
            }
            Ok(handles)
        });

        match folded {
            Ok(services) => {
                info!(count = services.len(), "services discovered");
                self.shared
                    .events
                    .send(SessionEvent::ServicesDiscovered { services });
                self.shared.advance_state(SessionState::Discovered);
                for waiter in self.service_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(err) => {
                error!(error = %err, "service discovery failed");
                self.shared.events.send(SessionEvent::SessionError {
                    error: err.to_string(),
                });
                for waiter in self.service_waiters.drain(..) {
                    let _ = waiter.send(Err(Error::discovery(None, err.clone())));
                }
                self.shutdown(Some(DisconnectReason::Failed(err.to_string())));
            }
        }
    }

    fn finish_characteristic_discovery(
        &mut self,
        service: Handle,
        result: TransportResult<Vec<CharacteristicDeclaration>>,
    ) {
        let folded = result.and_then(|declared| {
            let mut model = self.shared.model.write();
            declared
                .iter()
                .map(|c| {
                    model
                        .table
                        .insert_characteristic(service, c.id, c.uuid, c.properties)
                        .map_err(table_error)
                })
                .collect::<TransportResult<Vec<Handle>>>()
        });

        match folded {
            Ok(characteristics) => {
                trace!(%service, count = characteristics.len(), "characteristics discovered");
                if let Some(discovery) = self.details.get_mut(&service) {
                    discovery
                        .steps
                        .extend(characteristics.into_iter().map(Step::Descriptors));
                }
                self.advance_details(service);
            }
            Err(err) => self.fail_details(service, err),
        }
    }

    fn finish_descriptor_discovery(
        &mut self,
        characteristic: Handle,
        result: TransportResult<Vec<DescriptorDeclaration>>,
    ) {
        let Some(service) = self.shared.model.read().table.service_of(characteristic) else {
            return;
        };
        let folded = result.and_then(|declared| {
            let mut model = self.shared.model.write();
            declared
                .iter()
                .map(|d| {
                    model
                        .table
                        .insert_descriptor(characteristic, d.id, d.uuid)
                        .map_err(table_error)
                })
                .collect::<TransportResult<Vec<Handle>>>()
        });

        match folded {
            Ok(descriptors) => {
                let readable = self
                    .shared
                    .model
                    .read()
                    .table
                    .characteristic(characteristic)
                    .is_some_and(|c| c.properties.contains(CharacteristicProperties::READ));
                if let Some(discovery) = self.details.get_mut(&service)
                    && discovery.mode == DiscoveryMode::FullDiscovery
                {
                    let reads = readable
                        .then_some(characteristic)
                        .into_iter()
                        .chain(descriptors)
                        .map(Step::Read);
                    for step in reads.rev() {
                        discovery.steps.push_front(step);
                    }
                }
                self.advance_details(service);
            }
            Err(err) => self.fail_details(service, err),
        }
    }

    fn advance_details(&mut self, service: Handle) {
        let Some(discovery) = self.details.get_mut(&service) else {
            return;
        };
        match discovery.steps.pop_front() {
            Some(Step::Descriptors(characteristic)) => {
                self.submit(Job::new(JobKind::DescriptorDiscovery, characteristic));
            }
            Some(Step::Read(handle)) => {
                self.submit(Job::new(JobKind::Read, handle).background());
            }
            None => self.complete_details(service),
        }
    }

    fn complete_details(&mut self, service: Handle) {
        let Some(discovery) = self.details.remove(&service) else {
            return;
        };
        self.shared.model.write().table.freeze(service);
        self.shared
            .set_service_state(service, ServiceState::Discovered);
        debug!(%service, "service details discovered");
        for waiter in discovery.waiters {
            let _ = waiter.send(Ok(()));
        }
    }

    fn fail_details(&mut self, service: Handle, err: TransportError) {
        warn!(%service, error = %err, "service detail discovery failed");
        let Some(discovery) = self.details.remove(&service) else {
            return;
        };
        self.shared
            .record_service_error(service, ServiceError::DiscoveryError);
        self.shared
            .set_service_state(service, ServiceState::DiscoveryRequired);
        for waiter in discovery.waiters {
            let _ = waiter.send(Err(Error::discovery(Some(service), err.clone())));
        }
    }

    fn finish_read(&mut self, job: Job, result: TransportResult<Vec<u8>>) {
        let handle = job.target;
        let (service, is_descriptor) = {
            let model = self.shared.model.read();
            (
                model.table.service_of(handle).unwrap_or(Handle::INVALID),
                model.table.descriptor(handle).is_some(),
            )
        };

        if self.closed_by_caller() {
            job.reply.fail(Error::SessionInvalidated);
            return;
        }

        match result {
            Ok(value) => {
                let event = (!job.background).then(|| {
                    if is_descriptor {
                        SessionEvent::DescriptorRead {
                            service,
                            descriptor: handle,
                            value: value.clone(),
                        }
                    } else {
                        SessionEvent::CharacteristicRead {
                            service,
                            characteristic: handle,
                            value: value.clone(),
                        }
                    }
                });
                if !self.apply_value(handle, &value, event) {
                    self.shutdown(None);
                    job.reply.fail(Error::SessionInvalidated);
                    return;
                }
                self.shared.metrics.record_bytes_read(value.len());
                job.reply.succeed_value(value);
            }
            Err(err) if job.background => {
                debug!(%handle, error = %err, "value discovery read failed");
            }
            Err(err) => {
                let kind = if is_descriptor {
                    ServiceError::DescriptorReadError
                } else {
                    ServiceError::CharacteristicReadError
                };
                self.shared.record_service_error(service, kind);
                job.reply.fail(Error::Read { handle, source: err });
            }
        }

        if job.background {
            self.advance_details(service);
        }
    }

    fn finish_write(&mut self, job: Job, result: TransportResult<()>) {
        let Job {
            target: handle,
            payload,
            write_mode,
            reply,
            ..
        } = job;
        let (service, is_descriptor) = {
            let model = self.shared.model.read();
            (
                model.table.service_of(handle).unwrap_or(Handle::INVALID),
                model.table.descriptor(handle).is_some(),
            )
        };

        if self.closed_by_caller() {
            reply.fail(Error::SessionInvalidated);
            return;
        }

        match (result, write_mode) {
            (Ok(()), mode) => {
                let event = (mode == WriteMode::WithResponse).then(|| {
                    if is_descriptor {
                        SessionEvent::DescriptorWritten {
                            service,
                            descriptor: handle,
                            value: payload.clone(),
                        }
                    } else {
                        SessionEvent::CharacteristicWritten {
                            service,
                            characteristic: handle,
                            value: payload.clone(),
                        }
                    }
                });
                if !self.apply_value(handle, &payload, event) {
                    self.shutdown(None);
                    reply.fail(Error::SessionInvalidated);
                    return;
                }
                self.shared.metrics.record_bytes_written(payload.len());
                reply.succeed_unit();
            }
            (Err(err), WriteMode::WithoutResponse) => {
                // Write commands are never confirmed; failures are not reported.
                debug!(%handle, error = %err, "write without response failed");
                reply.succeed_unit();
            }
            (Err(err), WriteMode::WithResponse) => {
                let kind = if is_descriptor {
                    ServiceError::DescriptorWriteError
                } else {
                    ServiceError::CharacteristicWriteError
                };
                self.shared.record_service_error(service, kind);
                reply.fail(Error::Write { handle, source: err });
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ValueChanged { id, value } => {
                if self.closed_by_caller() {
                    return;
                }
                let located = {
                    let model = self.shared.model.read();
                    model.table.find_by_remote(id).and_then(|handle| {
                        model
                            .table
                            .characteristic(handle)
                            .map(|c| (handle, c.service))
                    })
                };
                let Some((characteristic, service)) = located else {
                    trace!(remote = %id, "notification for unknown characteristic");
                    return;
                };
                let event = SessionEvent::CharacteristicChanged {
                    service,
                    characteristic,
                    value: value.clone(),
                };
                if self.apply_value(characteristic, &value, Some(event)) {
                    self.shared.metrics.record_notification();
                } else {
                    self.shutdown(None);
                }
            }
            TransportEvent::MtuChanged(mtu) if mtu < DEFAULT_ATT_MTU => {
                warn!(mtu, minimum = DEFAULT_ATT_MTU, "ignoring mtu below the ATT minimum");
            }
            TransportEvent::MtuChanged(mtu) => {
                debug!(mtu, "mtu changed");
                self.shared.model.write().mtu = mtu;
                self.shared.events.send(SessionEvent::MtuChanged { mtu });
            }
            TransportEvent::Disconnected(reason) => {
                info!(?reason, "transport disconnected");
                self.link_open = false;
                self.shutdown(Some(reason));
            }
            TransportEvent::Failed(err) => {
                error!(error = %err, "transport failed");
                self.shared.events.send(SessionEvent::SessionError {
                    error: err.to_string(),
                });
                self.shutdown(Some(DisconnectReason::Failed(err.to_string())));
            }
        }
    }

    /// Invalidate, fail every waiter, deregister and close the transport.
    /// Cache `value` and emit `event`, unless the session was invalidated.
    ///
    /// Runs under the model write lock, which invalidation also takes, so no
    /// value lands in the table and no event follows the switch to `Invalid`.
    fn apply_value(&self, handle: Handle, value: &[u8], event: Option<SessionEvent>) -> bool {
        let mut model = self.shared.model.write();
        if !self.shared.state().is_valid() {
            return false;
        }
        if let Err(err) = model.table.update_value(handle, value.to_vec()) {
            warn!(%handle, error = %err, "value not cached");
        }
        if let Some(event) = event {
            self.shared.events.send(event);
        }
        true
    }

    /// Shut down if the caller closed the session while a message was being
    /// applied.
    fn closed_by_caller(&mut self) -> bool {
        if self.shared.state().is_valid() {
            return false;
        }
        self.shutdown(None);
        true
    }

    fn shutdown(&mut self, reason: Option<DisconnectReason>) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shared.invalidate(reason);

        let abandoned = self.queue.drain();
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "abandoning queued jobs");
        }
        for job in abandoned {
            job.reply.fail(Error::SessionInvalidated);
        }
        let waiters = self
            .service_waiters
            .drain(..)
            .chain(self.details.drain().flat_map(|(_, d)| d.waiters))
            .chain(self.connect_reply.take());
        for waiter in waiters {
            let _ = waiter.send(Err(Error::SessionInvalidated));
        }

        self.shared
            .dispatcher
            .registry()
            .deregister(self.shared.token);

        if self.link_open {
            self.link_open = false;
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move {
                if let Err(err) = transport.close().await {
                    debug!(error = %err, "transport close failed");
                }
            });
        }
    }
}

fn request_for(
    table: &AttributeTable,
    kind: JobKind,
    target: Handle,
    payload: Vec<u8>,
    mode: WriteMode,
) -> TransportResult<Request> {
    let missing = || TransportError::Other(format!("no attribute {target} for {kind:?}"));
    match kind {
        JobKind::ServiceDiscovery => Ok(Request::Services),
        JobKind::CharacteristicDiscovery => table
            .service(target)
            .map(|s| {
                Request::Characteristics(ServiceDeclaration {
                    id: s.remote,
                    uuid: s.uuid,
                    kind: s.kind,
                })
            })
            .ok_or_else(missing),
        JobKind::DescriptorDiscovery => table
            .characteristic(target)
            .map(|c| {
                Request::Descriptors(CharacteristicDeclaration {
                    id: c.remote,
                    uuid: c.uuid,
                    properties: c.properties,
                })
            })
            .ok_or_else(missing),
        JobKind::Read => remote_target(table, target)
            .map(Request::Read)
            .ok_or_else(missing),
        JobKind::Write => remote_target(table, target)
            .map(|t| Request::Write(t, payload, mode))
            .ok_or_else(missing),
    }
}

fn remote_target(table: &AttributeTable, handle: Handle) -> Option<Target> {
    if let Some(c) = table.characteristic(handle) {
        Some(Target::Characteristic(c.remote))
    } else {
        table.descriptor(handle).map(|d| Target::Descriptor(d.remote))
    }
}

fn table_error(err: TableError) -> TransportError {
    TransportError::Other(format!("inconsistent discovery result: {err}"))
}

/// Run a transport request under `limit`; overrunning counts as failure.
async fn deadline<T>(
    limit: Duration,
    request: impl Future<Output = TransportResult<T>>,
) -> TransportResult<T> {
    tokio::time::timeout(limit, request)
        .await
        .unwrap_or(Err(TransportError::Timeout(limit)))
}
