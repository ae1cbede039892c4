//! Listener: the task that owns a transport and drives the pipeline.
//!
//! The listener lifecycle:
//! 1. Bind the transport to the configured interface (fatal on failure)
//! 2. Poll the transport every `poll_interval`, reading up to `read_batch`
//!    frames per tick
//! 3. Parse each frame, run it through the pipeline, write any reply
//! 4. Park yielded requests until a [`ListenerHandle`] resumes or signals
//!    them, or they exceed `max_request_time`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wirestage::{
//!     ArpCodec, Dictionary, Listener, ListenerConfig, Outcome, PcapTransport, Pipeline, Profile,
//!     VirtualServer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> wirestage::Result<()> {
//!     let mut server = VirtualServer::new("default");
//!     server.register("recv", "Request", |_request| Outcome::Ok);
//!
//!     let dict = Arc::new(Dictionary::arp());
//!     let pipeline = Pipeline::compile(Arc::new(server), &Profile::arp(), dict)?;
//!
//!     let config = ListenerConfig::default();
//!     let transport = PcapTransport::<ArpCodec>::new(&config.capture_dir);
//!     let running = Listener::new(transport, Arc::new(pipeline), config)?.start().await?;
//!     running.wait().await
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ListenerConfig;
use crate::error::{Error, Result};
use crate::pipeline::{Action, Final, Pipeline, Request, Signal};
use crate::protocol::{Frame, FrameCodec};
use crate::transport::Transport;

/// Commands accepted by a running listener.
#[derive(Debug)]
enum Command {
    Resume(u64),
    Signal(u64, Signal),
    Shutdown(oneshot::Sender<()>),
}

/// Counters kept by a listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    received: AtomicU64,
    ignored: AtomicU64,
    dropped: AtomicU64,
    replied: AtomicU64,
    unanswered: AtomicU64,
    failed: AtomicU64,
    yielded: AtomicU64,
    suspended: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    read_errors: AtomicU64,
    write_errors: AtomicU64,
}

impl ListenerStats {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            received: get(&self.received),
            ignored: get(&self.ignored),
            dropped: get(&self.dropped),
            replied: get(&self.replied),
            unanswered: get(&self.unanswered),
            failed: get(&self.failed),
            yielded: get(&self.yielded),
            suspended: get(&self.suspended),
            timed_out: get(&self.timed_out),
            cancelled: get(&self.cancelled),
            read_errors: get(&self.read_errors),
            write_errors: get(&self.write_errors),
        }
    }
}

/// Plain copy of [`ListenerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests created from frames.
    pub received: u64,
    /// Frames with a packet type this listener does not handle.
    pub ignored: u64,
    /// Frames that could not be parsed.
    pub dropped: u64,
    /// Replies written to the transport.
    pub replied: u64,
    /// Requests finished without a reply.
    pub unanswered: u64,
    /// Requests aborted by a stage failure.
    pub failed: u64,
    /// Times a request yielded.
    pub yielded: u64,
    /// Requests currently parked.
    pub suspended: u64,
    /// Requests given up on after `max_request_time`.
    pub timed_out: u64,
    /// Requests cancelled (capacity or shutdown).
    pub cancelled: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}

/// Cloneable handle for talking to a listener.
#[derive(Clone)]
pub struct ListenerHandle {
    tx: mpsc::Sender<Command>,
    stats: Arc<ListenerStats>,
}

impl ListenerHandle {
    /// Resume suspended request `number`.
    pub async fn resume(&self, number: u64) -> Result<()> {
        self.send(Command::Resume(number)).await
    }

    /// Resume without waiting for channel capacity.
    pub fn try_resume(&self, number: u64) -> Result<()> {
        self.tx.try_send(Command::Resume(number)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::Backpressure,
            mpsc::error::TrySendError::Closed(_) => Error::ListenerClosed,
        })
    }

    /// Deliver `signal` to suspended request `number`.
    pub async fn signal(&self, number: u64, signal: Signal) -> Result<()> {
        self.send(Command::Signal(number, signal)).await
    }

    /// Stop the listener, cancelling every suspended request.
    ///
    /// Returns once the listener loop has exited.
    pub async fn shutdown(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Shutdown(ack_tx)).await?;
        ack_rx.await.map_err(|_| Error::ListenerClosed)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the listener loop has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Error::ListenerClosed)
    }
}

/// An unstarted listener.
pub struct Listener<T: Transport> {
    transport: T,
    pipeline: Arc<Pipeline>,
    config: ListenerConfig,
    tx: mpsc::Sender<Command>,
    rx: mpsc::Receiver<Command>,
    stats: Arc<ListenerStats>,
}

impl<T: Transport> Listener<T> {
    /// Create a listener. Fails if `config` does not validate.
    pub fn new(transport: T, pipeline: Arc<Pipeline>, config: ListenerConfig) -> Result<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        Ok(Self {
            transport,
            pipeline,
            config,
            tx,
            rx,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Handle usable before and after `start`.
    pub fn handle(&self) -> ListenerHandle {
        ListenerHandle {
            tx: self.tx.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Bind the transport and spawn the listener loop.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(self) -> Result<RunningListener> {
        let handle = self.handle();
        let Listener {
            mut transport,
            pipeline,
            config,
            tx,
            rx,
            stats,
        } = self;
        drop(tx);

        if let Err(e) = transport.open(&config.interface, T::Codec::FILTER) {
            tracing::error!(
                "Failed opening {} on interface {}: {}",
                T::Codec::NAME,
                config.interface,
                e
            );
            return Err(e);
        }
        tracing::info!(
            "Listening on {} for {} in virtual server {}",
            transport.name(),
            pipeline.table().profile().request,
            pipeline.table().scope()
        );

        let worker = Worker {
            transport,
            pipeline,
            config,
            rx,
            stats,
            suspended: HashMap::new(),
            next_number: 0,
            buf: BytesMut::with_capacity(T::Codec::FRAME_SIZE * 4),
        };
        let task = tokio::spawn(worker.run());

        Ok(RunningListener { handle, task })
    }
}

/// A started listener.
pub struct RunningListener {
    handle: ListenerHandle,
    task: JoinHandle<Result<()>>,
}

impl RunningListener {
    pub fn handle(&self) -> ListenerHandle {
        self.handle.clone()
    }

    /// Wait for the listener loop to exit.
    pub async fn wait(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            ))),
        }
    }
}

/// A suspended request and when it must be given up on.
struct Parked {
    request: Request,
    deadline: Instant,
}

/// State owned by the spawned loop.
struct Worker<T: Transport> {
    transport: T,
    pipeline: Arc<Pipeline>,
    config: ListenerConfig,
    rx: mpsc::Receiver<Command>,
    stats: Arc<ListenerStats>,
    suspended: HashMap<u64, Parked>,
    next_number: u64,
    buf: BytesMut,
}

impl<T: Transport> Worker<T> {
    async fn run(mut self) -> Result<()> {
        let mut tick = tokio::time::interval(self.config.poll_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Resume(number)) => self.resume(number),
                    Some(Command::Signal(number, signal)) => self.signal(number, signal),
                    Some(Command::Shutdown(ack)) => {
                        self.shutdown();
                        let _ = ack.send(());
                        return Ok(());
                    }
                    None => {
                        self.shutdown();
                        return Ok(());
                    }
                },
                _ = tick.tick() => {
                    self.poll();
                    self.expire();
                }
            }
        }
    }

    /// Read and process up to `read_batch` frames.
    fn poll(&mut self) {
        for _ in 0..self.config.read_batch {
            match self.transport.read(&mut self.buf) {
                Ok(0) => break,
                Ok(_) => {
                    let frame = Frame::new(self.buf.split().freeze());
                    self.receive(frame);
                }
                Err(e) => {
                    tracing::debug!("Error reading from {}: {}", self.transport.name(), e);
                    ListenerStats::bump(&self.stats.read_errors);
                    self.buf.clear();
                    break;
                }
            }
        }
    }

    fn receive(&mut self, frame: Frame) {
        let table = self.pipeline.table().clone();
        let packet = match T::Codec::parse(&frame, table.dictionary()) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Dropping frame from {}: {}", self.transport.name(), e);
                ListenerStats::bump(&self.stats.dropped);
                return;
            }
        };

        if !self.pipeline.accepts(&packet) {
            tracing::trace!(
                "Ignoring {} packet from {}",
                table.code_name(packet.code).unwrap_or("unknown"),
                self.transport.name()
            );
            ListenerStats::bump(&self.stats.ignored);
            return;
        }

        self.next_number += 1;
        let deadline = Instant::now() + self.config.max_request_time();
        let mut request = Request::from_frame(self.next_number, frame, packet);
        ListenerStats::bump(&self.stats.received);

        let result = self.pipeline.process(&mut request, Action::Run);
        self.complete(request, result, deadline);
    }

    fn complete(&mut self, request: Request, result: Final, deadline: Instant) {
        match result {
            Final::Reply => self.reply(&request),
            Final::Done => ListenerStats::bump(&self.stats.unanswered),
            Final::Fail => ListenerStats::bump(&self.stats.failed),
            Final::Yield => {
                ListenerStats::bump(&self.stats.yielded);
                self.park(request, deadline);
            }
        }
    }

    fn park(&mut self, mut request: Request, deadline: Instant) {
        if self.suspended.len() >= self.config.max_suspended {
            tracing::warn!(
                "({}) Too many suspended requests ({}), cancelling",
                request.number(),
                self.suspended.len()
            );
            self.pipeline
                .process(&mut request, Action::Signal(Signal::Cancel));
            ListenerStats::bump(&self.stats.cancelled);
            return;
        }

        self.suspended
            .insert(request.number(), Parked { request, deadline });
        self.update_suspended();
    }

    fn reply(&mut self, request: &Request) {
        let dict = self.pipeline.table().dictionary();
        let encoded = match T::Codec::encode(request.reply(), dict) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::debug!("({}) Failed encoding reply: {}", request.number(), e);
                ListenerStats::bump(&self.stats.write_errors);
                return;
            }
        };

        match self.transport.write(&encoded) {
            Ok(_) => ListenerStats::bump(&self.stats.replied),
            Err(e) => {
                tracing::debug!(
                    "({}) Failed writing reply to {}: {}",
                    request.number(),
                    self.transport.name(),
                    e
                );
                ListenerStats::bump(&self.stats.write_errors);
            }
        }
    }

    fn resume(&mut self, number: u64) {
        let Some(Parked {
            mut request,
            deadline,
        }) = self.suspended.remove(&number)
        else {
            tracing::debug!("({}) Resume for unknown request", number);
            return;
        };
        self.update_suspended();

        let result = self.pipeline.process(&mut request, Action::Run);
        self.complete(request, result, deadline);
    }

    fn signal(&mut self, number: u64, signal: Signal) {
        let Some(mut parked) = self.suspended.remove(&number) else {
            tracing::debug!("({}) {:?} for unknown request", number, signal);
            return;
        };
        self.update_suspended();

        self.pipeline
            .process(&mut parked.request, Action::Signal(signal));
        match signal {
            Signal::Timeout => ListenerStats::bump(&self.stats.timed_out),
            Signal::Cancel | Signal::Duplicate => ListenerStats::bump(&self.stats.cancelled),
        }
    }

    /// Time out requests suspended past their deadline.
    fn expire(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .suspended
            .iter()
            .filter(|(_, parked)| parked.deadline <= now)
            .map(|(number, _)| *number)
            .collect();

        for number in expired {
            tracing::warn!(
                "({}) Request exceeded max request time {:?}",
                number,
                self.config.max_request_time()
            );
            self.signal(number, Signal::Timeout);
        }
    }

    fn shutdown(&mut self) {
        let numbers: Vec<u64> = self.suspended.keys().copied().collect();
        if !numbers.is_empty() {
            tracing::info!("Cancelling {} suspended requests", numbers.len());
        }
        for number in numbers {
            self.signal(number, Signal::Cancel);
        }
        tracing::info!("Listener on {} stopped", self.transport.name());
    }

    fn update_suspended(&self) {
        self.stats
            .suspended
            .store(self.suspended.len() as u64, Ordering::Relaxed);
    }
}
