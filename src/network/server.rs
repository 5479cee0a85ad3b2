//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::command::CommandTable;
use crate::config::Config;
use crate::error::Result;
use crate::protocol::{write_reply, Reply};
use crate::store::Store;

use super::Connection;

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// TCP server for flatkv
pub struct Server {
    config: Config,
    listener: TcpListener,
    store: Arc<Store>,
    commands: Arc<CommandTable>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

/// Cloneable handle that stops a running server
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl Server {
    /// Bind the listen address; no connection is accepted until [`run`](Self::run)
    pub fn bind(config: Config, store: Arc<Store>, commands: Arc<CommandTable>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            listener,
            store,
            commands,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Actual bound address (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
        }
    }

    /// Signal the accept loop to stop
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections until shut down (blocking)
    ///
    /// Connection threads already running are left to finish on their own.
    pub fn run(&self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "listening");

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.accept(stream, addr),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        tracing::info!("server stopped accepting connections");
        Ok(())
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!(peer = %addr, error = %e, "failed to configure stream");
            return;
        }

        if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
            tracing::warn!(peer = %addr, max = self.config.max_connections, "connection limit reached");
            let mut stream = stream;
            let _ = write_reply(&mut stream, &Reply::error("max number of clients reached"));
            return;
        }

        let store = Arc::clone(&self.store);
        let commands = Arc::clone(&self.commands);
        let active = Arc::clone(&self.active);
        let (read_ms, write_ms) = (self.config.read_timeout_ms, self.config.write_timeout_ms);

        active.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("flatkv-conn-{}", addr))
            .spawn(move || {
                let result = Connection::new(stream, store, commands).and_then(|mut conn| {
                    conn.set_timeouts(read_ms, write_ms)?;
                    conn.handle()
                });
                if let Err(e) = result {
                    tracing::debug!(peer = %addr, error = %e, "connection ended with error");
                }
                active.fetch_sub(1, Ordering::SeqCst);
            });

        if let Err(e) = spawned {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::error!(peer = %addr, error = %e, "failed to spawn connection thread");
        }
    }
}
