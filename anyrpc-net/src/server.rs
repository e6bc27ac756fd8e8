//! Single-threaded, thread-per-connection, and thread-pool server loops
//! (spec.md §4.10), grounded on
//! `examples/original_source/include/anyrpc/server.h` and `src/server.cpp`'s
//! `Server`/`ServerST`/`ServerMT`/`ServerTP`.
//!
//! The original multiplexes with `select()` over raw file descriptors. This
//! port uses `mio::Poll` instead -- the same readiness-driven loop, just
//! through the registry/token API `mio` 0.8 exposes rather than hand-rolled
//! `fd_set`s.

use crate::config::ServerConfig;
use crate::connection::PollableConnection;
use crate::socket::UdpSocket as LoopbackUdp;
use anyrpc::error::{AnyRpcError, ErrorKind, Result};
use anyrpc::registry::MethodRegistry;
use log::{debug, info, warn};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use socket2::{SockRef, TcpKeepalive};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const LISTENER_TOKEN: Token = Token(0);
const SIGNAL_TOKEN: Token = Token(1);
const FIRST_CONNECTION_TOKEN: usize = 2;

type Factory = Arc<dyn Fn(mio::net::TcpStream) -> Box<dyn PollableConnection> + Send + Sync>;

fn bind(port: u16) -> Result<TcpListener> {
    let std_listener = std::net::TcpListener::bind(("0.0.0.0", port))
        .map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
    {
        let sock = SockRef::from(&std_listener);
        sock.set_reuse_address(true).map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
    }
    std_listener.set_nonblocking(true).map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
    Ok(TcpListener::from_std(std_listener))
}

fn apply_keepalive(stream: &mio::net::TcpStream, interval: Duration) {
    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new().with_time(interval).with_interval(interval);
    let _ = sock.set_tcp_keepalive(&keepalive);
}

/// Drains pending wake datagrams from the main thread's signal socket so
/// the next readiness event doesn't immediately refire on stale data.
fn drain_signal(signal: &mio::net::UdpSocket) {
    let mut scratch = [0u8; 64];
    loop {
        match signal.recv_from(&mut scratch) {
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}

fn evict_target<'a>(
    connections: &'a HashMap<Token, Box<dyn PollableConnection>>,
) -> Option<Token> {
    connections
        .iter()
        .filter(|(_, c)| c.forced_disconnect_allowed())
        .min_by_key(|(_, c)| c.last_transaction_time())
        .map(|(token, _)| *token)
}

/// Single-threaded server: one `mio::Poll` instance drives the listener and
/// every accepted connection in the calling thread, matching `ServerST`.
pub struct ServerSt {
    listener: TcpListener,
    poll: Poll,
    connections: HashMap<Token, Box<dyn PollableConnection>>,
    next_token: usize,
    registry: Arc<MethodRegistry>,
    config: ServerConfig,
    factory: Factory,
    exit: Arc<AtomicBool>,
}

impl ServerSt {
    pub fn bind(config: ServerConfig, registry: Arc<MethodRegistry>, factory: Factory) -> Result<Self> {
        let mut listener = bind(config.port)?;
        let poll = Poll::new().map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
        info!("ServerSt listening on port {}", config.port);
        Ok(ServerSt {
            listener,
            poll,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            registry,
            config,
            factory,
            exit: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn exit_handle(&self) -> Arc<AtomicBool> {
        self.exit.clone()
    }

    /// Runs the event loop for up to `budget`, or indefinitely if `None`,
    /// matching `Work(int ms)`.
    pub fn work(&mut self, budget: Option<Duration>) {
        let start = Instant::now();
        let mut events = Events::with_capacity(128);
        loop {
            if self.exit.load(Ordering::Relaxed) {
                return;
            }
            let remaining = budget.map(|b| b.saturating_sub(start.elapsed()));
            if let Some(r) = remaining {
                if r.is_zero() {
                    return;
                }
            }
            if let Err(e) = self.poll.poll(&mut events, remaining) {
                warn!("poll error: {e}");
                continue;
            }

            for event in events.iter() {
                if event.token() == LISTENER_TOKEN {
                    self.accept_connections();
                } else {
                    self.process_connection(event.token());
                }
            }
            self.reregister_all();

            if let Some(b) = budget {
                if start.elapsed() >= b {
                    return;
                }
            }
        }
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    apply_keepalive(&stream, self.config.keepalive());
                    if self.connections.len() >= self.config.max_connections {
                        if let Some(target) = evict_target(&self.connections) {
                            debug!("evicting connection to admit new client");
                            if let Some(mut c) = self.connections.remove(&target) {
                                let _ = self.poll.registry().deregister(c.raw_stream());
                            }
                        } else {
                            debug!("too many active connections, refusing {addr}");
                            continue;
                        }
                    }
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    let mut conn = (self.factory)(stream);
                    let _ = self.poll.registry().register(conn.raw_stream(), token, interest_for(&*conn));
                    self.connections.insert(token, conn);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("accept error: {e}");
                    return;
                }
            }
        }
    }

    fn process_connection(&mut self, token: Token) {
        if let Some(conn) = self.connections.get_mut(&token) {
            conn.drive(&self.registry, true);
            if conn.is_closed() {
                if let Some(mut c) = self.connections.remove(&token) {
                    let _ = self.poll.registry().deregister(c.raw_stream());
                }
            }
        }
    }

    fn reregister_all(&mut self) {
        for (token, conn) in self.connections.iter_mut() {
            let _ = self.poll.registry().reregister(conn.raw_stream(), *token, interest_for(&**conn));
        }
    }

    pub fn shutdown(&mut self) {
        self.connections.clear();
    }
}

fn interest_for(conn: &dyn PollableConnection) -> Interest {
    match (conn.wants_read(), conn.wants_write()) {
        (true, true) => Interest::READABLE | Interest::WRITABLE,
        (true, false) => Interest::READABLE,
        (false, true) => Interest::WRITABLE,
        (false, false) => Interest::READABLE,
    }
}

/// Thread-per-connection server: the listener loop runs in the calling
/// thread; each accepted connection gets its own OS thread running its own
/// tiny `mio::Poll` loop, matching `ServerMT`.
pub struct ServerMt {
    listener: TcpListener,
    poll: Poll,
    registry: Arc<MethodRegistry>,
    config: ServerConfig,
    factory: Factory,
    exit: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
    active: Arc<Mutex<usize>>,
}

impl ServerMt {
    pub fn bind(config: ServerConfig, registry: Arc<MethodRegistry>, factory: Factory) -> Result<Self> {
        let mut listener = bind(config.port)?;
        let poll = Poll::new().map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
        info!("ServerMt listening on port {}", config.port);
        Ok(ServerMt {
            listener,
            poll,
            registry,
            config,
            factory,
            exit: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
            active: Arc::new(Mutex::new(0)),
        })
    }

    pub fn exit_handle(&self) -> Arc<AtomicBool> {
        self.exit.clone()
    }

    pub fn work(&mut self, budget: Option<Duration>) {
        let start = Instant::now();
        let mut events = Events::with_capacity(16);
        loop {
            if self.exit.load(Ordering::Relaxed) {
                return;
            }
            let remaining = budget.map(|b| b.saturating_sub(start.elapsed()));
            if let Some(r) = remaining {
                if r.is_zero() {
                    return;
                }
            }
            if self.poll.poll(&mut events, remaining).is_err() {
                continue;
            }
            for event in events.iter() {
                if event.token() == LISTENER_TOKEN {
                    self.accept_connections();
                }
            }
            if let Some(b) = budget {
                if start.elapsed() >= b {
                    return;
                }
            }
        }
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    apply_keepalive(&stream, self.config.keepalive());
                    let active = self.active.clone();
                    {
                        let mut count = active.lock().unwrap();
                        if *count >= self.config.max_connections {
                            debug!("too many active connections, refusing");
                            continue;
                        }
                        *count += 1;
                    }
                    let registry = self.registry.clone();
                    let factory = self.factory.clone();
                    let exit = self.exit.clone();
                    let handle = thread::spawn(move || {
                        run_connection_thread(stream, registry, factory, exit);
                        *active.lock().unwrap() -= 1;
                    });
                    self.handles.push(handle);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(_) => return,
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.exit.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_connection_thread(
    mut stream: mio::net::TcpStream,
    registry: Arc<MethodRegistry>,
    factory: Factory,
    server_exit: Arc<AtomicBool>,
) {
    let poll = match Poll::new() {
        Ok(p) => p,
        Err(_) => return,
    };
    let token = Token(0);
    if poll.registry().register(&mut stream, token, Interest::READABLE | Interest::WRITABLE).is_err() {
        return;
    }
    let mut conn = factory(stream);
    let mut events = Events::with_capacity(4);
    while !server_exit.load(Ordering::Relaxed) {
        if poll.poll(&mut events, Some(Duration::from_millis(100))).is_err() {
            continue;
        }
        if events.is_empty() {
            continue;
        }
        conn.drive(&registry, true);
        if conn.is_closed() {
            return;
        }
        let _ = poll.registry().reregister(conn.raw_stream(), token, interest_for(&*conn));
    }
}

/// Thread-pool server: the main thread reads headers/requests and hands
/// off to a fixed pool of workers once a request is ready to execute,
/// matching `ServerTP`. Workers wake the main thread's poll with a loopback
/// UDP datagram when they finish, since the connection moved off the main
/// thread's registry while being processed.
pub struct ServerTp {
    listener: TcpListener,
    poll: Poll,
    connections: HashMap<Token, Box<dyn PollableConnection>>,
    executing: HashMap<Token, ()>,
    next_token: usize,
    registry: Arc<MethodRegistry>,
    config: ServerConfig,
    factory: Factory,
    exit: Arc<AtomicBool>,
    /// The socket `mio` watches for wake datagrams from finished workers,
    /// bound to the same port number as the TCP listener (UDP and TCP
    /// ports are independent namespaces), matching `serverSignal_`.
    signal_mio: mio::net::UdpSocket,
    work_queue: Arc<Mutex<Vec<(Token, Box<dyn PollableConnection>)>>>,
    done_queue: Arc<Mutex<Vec<(Token, Box<dyn PollableConnection>)>>>,
    worker_block: Arc<std::sync::Condvar>,
    worker_exit: Arc<AtomicBool>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ServerTp {
    pub fn bind(config: ServerConfig, registry: Arc<MethodRegistry>, factory: Factory) -> Result<Self> {
        let mut listener = bind(config.port)?;
        let poll = Poll::new().map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;

        let std_udp = std::net::UdpSocket::bind(("0.0.0.0", config.port))
            .map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
        std_udp.set_nonblocking(true).map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
        let mut signal_mio = mio::net::UdpSocket::from_std(std_udp);
        poll.registry()
            .register(&mut signal_mio, SIGNAL_TOKEN, Interest::READABLE)
            .map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;

        info!("ServerTp listening on port {} with {} workers", config.port, config.thread_pool_size);

        Ok(ServerTp {
            listener,
            poll,
            connections: HashMap::new(),
            executing: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            registry,
            config,
            factory,
            exit: Arc::new(AtomicBool::new(false)),
            signal_mio,
            work_queue: Arc::new(Mutex::new(Vec::new())),
            done_queue: Arc::new(Mutex::new(Vec::new())),
            worker_block: Arc::new(std::sync::Condvar::new()),
            worker_exit: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        })
    }

    pub fn exit_handle(&self) -> Arc<AtomicBool> {
        self.exit.clone()
    }

    pub fn start_workers(&mut self) {
        for _ in 0..self.config.thread_pool_size {
            let queue = self.work_queue.clone();
            let done = self.done_queue.clone();
            let block = self.worker_block.clone();
            let exit = self.worker_exit.clone();
            let registry = self.registry.clone();
            let wake_port = self.config.port;
            let handle = thread::spawn(move || {
                // Each worker sends from its own ephemeral loopback socket;
                // only the receiver needs a fixed, known port.
                let signal = match LoopbackUdp::bind_loopback(0) {
                    Ok(s) => s,
                    Err(_) => return,
                };
                loop {
                    let item = {
                        let mut q = queue.lock().unwrap();
                        while q.is_empty() && !exit.load(Ordering::Relaxed) {
                            q = block.wait(q).unwrap();
                        }
                        if q.is_empty() {
                            return; // exit requested and nothing left to do
                        }
                        q.pop()
                    };
                    if let Some((token, mut conn)) = item {
                        conn.drive(&registry, true);
                        done.lock().unwrap().push((token, conn));
                        let _ = signal.wake(wake_port);
                    }
                }
            });
            self.workers.push(handle);
        }
    }

    pub fn work(&mut self, budget: Option<Duration>) {
        let start = Instant::now();
        let mut events = Events::with_capacity(128);
        loop {
            if self.exit.load(Ordering::Relaxed) {
                return;
            }
            let remaining = budget.map(|b| b.saturating_sub(start.elapsed()));
            if let Some(r) = remaining {
                if r.is_zero() {
                    return;
                }
            }
            if self.poll.poll(&mut events, remaining).is_err() {
                continue;
            }

            let mut tokens_to_process = Vec::new();
            for event in events.iter() {
                if event.token() == LISTENER_TOKEN {
                    self.accept_connections();
                } else if event.token() == SIGNAL_TOKEN {
                    drain_signal(&self.signal_mio);
                } else {
                    tokens_to_process.push(event.token());
                }
            }
            for token in tokens_to_process {
                self.process_connection(token);
            }
            self.drain_completed();
            self.reregister_all();

            if let Some(b) = budget {
                if start.elapsed() >= b {
                    return;
                }
            }
        }
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    apply_keepalive(&stream, self.config.keepalive());
                    if self.connections.len() + self.executing.len() >= self.config.max_connections {
                        if let Some(target) = evict_target(&self.connections) {
                            if let Some(mut c) = self.connections.remove(&target) {
                                let _ = self.poll.registry().deregister(c.raw_stream());
                            }
                        } else {
                            continue;
                        }
                    }
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    let mut conn = (self.factory)(stream);
                    let _ = self.poll.registry().register(conn.raw_stream(), token, interest_for(&*conn));
                    self.connections.insert(token, conn);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(_) => return,
            }
        }
    }

    fn process_connection(&mut self, token: Token) {
        if let Some(conn) = self.connections.get_mut(&token) {
            conn.drive(&self.registry, false);
            if conn.is_closed() {
                if let Some(mut c) = self.connections.remove(&token) {
                    let _ = self.poll.registry().deregister(c.raw_stream());
                }
                return;
            }
            if conn.is_executing() {
                if let Some(mut c) = self.connections.remove(&token) {
                    let _ = self.poll.registry().deregister(c.raw_stream());
                    self.executing.insert(token, ());
                    self.work_queue.lock().unwrap().push((token, c));
                    self.worker_block.notify_one();
                }
            }
        }
    }

    fn drain_completed(&mut self) {
        let mut done = self.done_queue.lock().unwrap();
        for (token, mut conn) in done.drain(..) {
            self.executing.remove(&token);
            if conn.is_closed() {
                continue;
            }
            let _ = self.poll.registry().register(conn.raw_stream(), token, interest_for(&*conn));
            self.connections.insert(token, conn);
        }
    }

    fn reregister_all(&mut self) {
        for (token, conn) in self.connections.iter_mut() {
            let _ = self.poll.registry().reregister(conn.raw_stream(), *token, interest_for(&**conn));
        }
    }

    pub fn shutdown(&mut self) {
        self.worker_exit.store(true, Ordering::Relaxed);
        self.worker_block.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.connections.clear();
        self.executing.clear();
    }
}
