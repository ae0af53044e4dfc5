//! Background I/O dispatcher.
//!
//! Each [`Context`](crate::Context) owns at most one dispatcher: a named
//! thread running a compio runtime. Application threads never touch a TCP
//! stream; they talk to the dispatcher through a command channel and to
//! their peers through in-memory pipes.
//!
//! ```text
//! app thread                     dispatcher thread (compio)
//! ┌──────────┐  Command::Bind    ┌──────────────────────────────┐
//! │  Socket  │ ────────────────▶ │ accept loop ─▶ handshake     │
//! │          │  Command::Connect │                 │            │
//! │  send()  │ ────────────────▶ │ connect ─▶ handshake         │
//! │  recv()  │                   │                 ▼            │
//! │    ▲ │   │   Pipe (flume)    │ reader half ─▶ inbound queue │
//! │    │ └───┼──────────────────▶│ writer half ◀─ outbound queue│
//! └──────────┘                   └──────────────────────────────┘
//! ```
//!
//! A connection lives until either half fails, the socket side of its pipe
//! is dropped, or the dispatcher halts. Shutdown waits for every task to
//! finish, so once it returns every TCP pipe is disconnected.

use crate::socket::{Origin, SocketCore};
use crate::tcp::set_nodelay;
use bytes::BytesMut;
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWriteExt};
use compio::net::{TcpListener, TcpStream};
use compio::runtime::TryClone;
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use tandem_core::endpoint::{Endpoint, EndpointError};
use tandem_core::error::{Result, SocketError};
use tandem_core::message::Message;
use tandem_core::monitor::SocketEvent;
use tandem_core::options::SocketOptions;
use tandem_core::queue::{pipe_pair, Pipe};
use tandem_core::socket_type::SocketType;
use tandem_core::subscription::SubscriptionEvent;
use tandem_zmtp::codec::{encode_message, Result as ZmtpResult, ZmtpDecoder};
use tandem_zmtp::handshake::perform_handshake_with_timeout;
use tracing::{debug, error, trace, warn};

/// Upper bound on bytes coalesced into one write.
const MAX_WRITE_BATCH: usize = 64 * 1024;

/// Dropping this stops the listener's accept loop.
pub(crate) type ListenerGuard = Sender<()>;

/// Commands sent from application threads to the dispatcher thread
enum Command {
    /// Bind a listener and accept connections for `socket`
    Bind {
        addr: SocketAddr,
        socket: Weak<SocketCore>,
        reply: Sender<io::Result<(SocketAddr, ListenerGuard)>>,
    },
    /// Dial `addr`; the reply is sent once TCP is connected
    Connect {
        addr: SocketAddr,
        socket: Weak<SocketCore>,
        reply: Sender<io::Result<()>>,
    },
    /// Stop the runtime
    Shutdown,
}

/// Held by every task the dispatcher spawns.
///
/// `halt` disconnects when shutdown starts; shutdown then waits until every
/// clone of `_alive` is gone.
#[derive(Clone)]
struct Lifeline {
    halt: Receiver<()>,
    _alive: Sender<()>,
}

impl Lifeline {
    /// Run `fut` unless the dispatcher halts first.
    async fn guard<F: Future>(&self, fut: F) -> Option<F::Output> {
        use futures::{select, FutureExt};

        let fut = fut.fuse();
        let halted = self.halt.recv_async().fuse();
        futures::pin_mut!(fut, halted);

        select! {
            out = fut => Some(out),
            _ = halted => None,
        }
    }
}

/// Handle to the dispatcher thread.
pub(crate) struct Dispatcher {
    commands: Sender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the dispatcher thread.
    pub(crate) fn start() -> Result<Self> {
        let (tx, rx) = flume::unbounded();
        let thread = thread::Builder::new()
            .name("tandem-dispatch".to_string())
            .spawn(move || run(rx))?;

        debug!("[DISPATCH] Started");
        Ok(Self {
            commands: tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Bind a TCP listener for `socket`, returning the resolved address.
    pub(crate) fn bind(
        &self,
        addr: SocketAddr,
        socket: Weak<SocketCore>,
    ) -> Result<(SocketAddr, ListenerGuard)> {
        let (reply, response) = flume::bounded(1);
        self.submit(Command::Bind {
            addr,
            socket,
            reply,
        })?;
        Ok(response.recv().map_err(|_| unavailable())??)
    }

    /// Dial `addr` for `socket`. Returns once TCP is connected; the
    /// handshake and attach complete in the background.
    pub(crate) fn connect(&self, addr: SocketAddr, socket: Weak<SocketCore>) -> Result<()> {
        let (reply, response) = flume::bounded(1);
        self.submit(Command::Connect {
            addr,
            socket,
            reply,
        })?;
        response
            .recv()
            .map_err(|_| unavailable())?
            .map_err(|source| {
                EndpointError::Unreachable {
                    endpoint: Endpoint::Tcp(addr),
                    source,
                }
                .into()
            })
    }

    /// Stop the runtime and wait for the thread to exit.
    pub(crate) fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("[DISPATCH] Dispatcher thread panicked");
            }
        }
    }

    fn submit(&self, cmd: Command) -> Result<()> {
        self.commands.send(cmd).map_err(|_| unavailable())
    }
}

fn unavailable() -> SocketError {
    SocketError::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "dispatcher is not running",
    ))
}

fn run(commands: Receiver<Command>) {
    let rt = match compio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("[DISPATCH] Failed to create runtime: {}", e);
            return;
        }
    };

    rt.block_on(async move {
        let (halt_tx, halt) = flume::bounded::<()>(1);
        let (alive, all_done) = flume::bounded::<()>(1);
        let lifeline = Lifeline {
            halt,
            _alive: alive,
        };

        while let Ok(cmd) = commands.recv_async().await {
            match cmd {
                Command::Bind {
                    addr,
                    socket,
                    reply,
                } => {
                    let _ = reply.send(start_listener(addr, socket, lifeline.clone()).await);
                }
                Command::Connect {
                    addr,
                    socket,
                    reply,
                } => {
                    compio::runtime::spawn(dial(addr, socket, reply, lifeline.clone())).detach();
                }
                Command::Shutdown => {
                    debug!("[DISPATCH] Shutting down");
                    break;
                }
            }
        }

        drop(halt_tx);
        drop(lifeline);
        // Resolves once the last task has dropped its lifeline.
        let _ = all_done.recv_async().await;
    });

    debug!("[DISPATCH] Stopped");
}

async fn start_listener(
    addr: SocketAddr,
    socket: Weak<SocketCore>,
    lifeline: Lifeline,
) -> io::Result<(SocketAddr, ListenerGuard)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let (guard, stop) = flume::bounded(1);

    debug!("[DISPATCH] Listening on tcp://{}", local);
    compio::runtime::spawn(accept_loop(listener, socket, stop, lifeline)).detach();

    Ok((local, guard))
}

async fn accept_loop(
    listener: TcpListener,
    socket: Weak<SocketCore>,
    stop: Receiver<()>,
    lifeline: Lifeline,
) {
    use futures::{select, FutureExt};

    loop {
        let accept = lifeline.guard(listener.accept()).fuse();
        let stopped = stop.recv_async().fuse();
        futures::pin_mut!(accept, stopped);

        let accepted = select! {
            accepted = accept => accepted,
            _ = stopped => None,
        };
        let Some(accepted) = accepted else {
            break;
        };

        match accepted {
            Ok((stream, peer)) => {
                if socket.strong_count() == 0 {
                    break;
                }
                trace!("[DISPATCH] Accepted tcp://{}", peer);
                let (socket, lifeline) = (socket.clone(), lifeline.clone());
                compio::runtime::spawn(async move {
                    serve(stream, Endpoint::Tcp(peer), socket, Origin::Accepted, lifeline).await;
                })
                .detach();
            }
            Err(e) => {
                warn!("[DISPATCH] Accept failed: {}", e);
            }
        }
    }

    debug!("[DISPATCH] Listener stopped");
}

async fn dial(
    addr: SocketAddr,
    socket: Weak<SocketCore>,
    reply: Sender<io::Result<()>>,
    lifeline: Lifeline,
) {
    let connected = lifeline
        .guard(TcpStream::connect(addr))
        .await
        .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Interrupted, "dispatcher halted")));

    match connected {
        Ok(stream) => {
            let _ = reply.send(Ok(()));
            serve(stream, Endpoint::Tcp(addr), socket, Origin::Connected, lifeline).await;
        }
        Err(e) => {
            debug!("[DISPATCH] Connect to tcp://{} failed: {}", addr, e);
            let _ = reply.send(Err(e));
        }
    }
}

/// Capacities `(outbound, inbound)` of a TCP pipe, seen from the socket.
///
/// Traffic sent by a SUB is subscription commands only and is never bounded
/// on the SUB side. A PUB bounds what it has not yet applied by its receive
/// mark; the reader then stalls until the next `send` drains it.
fn tcp_capacities(local: SocketType, options: &SocketOptions) -> (usize, usize) {
    match local {
        SocketType::Sub => (0, options.recv_hwm),
        SocketType::Pub | SocketType::Pair => (options.send_hwm, options.recv_hwm),
    }
}

/// Whether an inbound message is worth queueing for the socket.
///
/// A PUB only ever consumes subscription commands.
fn accepts_inbound(local: SocketType, msg: &Message) -> bool {
    local != SocketType::Pub || SubscriptionEvent::from_message(msg).is_some()
}

/// Handshake, attach and pump one TCP connection.
async fn serve(
    mut stream: TcpStream,
    endpoint: Endpoint,
    socket: Weak<SocketCore>,
    origin: Origin,
    lifeline: Lifeline,
) {
    // Never keep the socket alive across an await.
    let Some((local_type, options)) = socket
        .upgrade()
        .map(|core| (core.socket_type(), core.options()))
    else {
        return;
    };

    if let Err(e) = set_nodelay(&stream) {
        debug!("[DISPATCH] TCP_NODELAY failed on {}: {}", endpoint, e);
    }

    let as_server = matches!(origin, Origin::Accepted);
    let handshake = lifeline
        .guard(perform_handshake_with_timeout(
            &mut stream,
            local_type,
            as_server,
            options.handshake_timeout,
        ))
        .await;
    let Some(handshake) = handshake else {
        return;
    };
    if let Err(e) = handshake {
        warn!("[HANDSHAKE] {} with {} failed: {}", local_type, endpoint, e);
        if let Some(core) = socket.upgrade() {
            core.emit(SocketEvent::HandshakeFailed {
                endpoint,
                reason: e.to_string(),
            });
        }
        return;
    }

    let (outbound, inbound) = tcp_capacities(local_type, &options);
    let (local, remote) = pipe_pair(endpoint.clone(), outbound, inbound);

    match socket.upgrade() {
        Some(core) if core.attach(local, origin) => {}
        _ => return,
    }

    match lifeline
        .guard(pump(stream, remote, local_type, &options))
        .await
    {
        Some(Ok(())) => trace!("[DISPATCH] Connection {} closed", endpoint),
        Some(Err(e)) => debug!("[DISPATCH] Connection {} ended: {}", endpoint, e),
        None => trace!("[DISPATCH] Connection {} halted", endpoint),
    }
}

/// Run the reader and writer halves until either one finishes.
async fn pump(
    stream: TcpStream,
    pipe: Pipe,
    local: SocketType,
    options: &SocketOptions,
) -> ZmtpResult<()> {
    let read_stream = stream.try_clone()?;
    let decoder = options
        .max_msg_size
        .map_or_else(ZmtpDecoder::new, ZmtpDecoder::with_max_body);
    let reader = read_half(
        read_stream,
        pipe.sender().clone(),
        decoder,
        local,
        options.read_buffer_size,
    );
    let writer = write_half(stream, pipe.receiver().clone());
    drop(pipe);

    futures::pin_mut!(reader, writer);
    match futures::future::select(reader, writer).await {
        futures::future::Either::Left((res, _)) | futures::future::Either::Right((res, _)) => res,
    }
}

/// Stream → inbound queue. A full queue suspends reading (back-pressure).
async fn read_half(
    mut stream: TcpStream,
    inbound: Sender<Message>,
    mut decoder: ZmtpDecoder,
    local: SocketType,
    buffer_size: usize,
) -> ZmtpResult<()> {
    let mut pending = BytesMut::new();
    let mut buf = Vec::with_capacity(buffer_size);

    loop {
        buf.clear();
        let BufResult(res, returned) = AsyncRead::read(&mut stream, buf).await;
        buf = returned;
        let n = res?;
        if n == 0 {
            return Ok(());
        }

        pending.extend_from_slice(&buf[..n]);
        let mut src = pending.split().freeze();

        while let Some(msg) = decoder.decode_message(&mut src)? {
            trace!("[DISPATCH] Received {} bytes", msg.len());
            if !accepts_inbound(local, &msg) {
                trace!("[DISPATCH] {} ignoring {} byte message", local, msg.len());
                continue;
            }
            if inbound.send_async(msg).await.is_err() {
                // Socket side dropped the pipe
                return Ok(());
            }
        }

        // Partial header, if any
        pending.extend_from_slice(&src);
    }
}

/// Outbound queue → stream, batching whatever is already queued.
async fn write_half(mut stream: TcpStream, outbound: Receiver<Message>) -> ZmtpResult<()> {
    let mut out = BytesMut::with_capacity(4096);

    while let Ok(msg) = outbound.recv_async().await {
        encode_message(&msg, &mut out);
        while out.len() < MAX_WRITE_BATCH {
            match outbound.try_recv() {
                Ok(next) => encode_message(&next, &mut out),
                Err(_) => break,
            }
        }

        let batch = out.split().to_vec();
        trace!("[DISPATCH] Writing {} bytes", batch.len());
        let BufResult(res, _) = stream.write_all(batch).await;
        res?;
    }

    Ok(())
}
