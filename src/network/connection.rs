//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::command::CommandTable;
use crate::error::{FlatError, Result};
use crate::protocol::{read_request, write_reply, Reply};
use crate::store::Store;

/// Handles a single client connection
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    store: Arc<Store>,
    commands: Arc<CommandTable>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Set up buffered halves of the stream
    pub fn new(stream: TcpStream, store: Arc<Store>, commands: Arc<CommandTable>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            store,
            commands,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Serve requests until the client goes away
    ///
    /// Requests on one connection run strictly in order. Store errors become
    /// error replies and the connection stays open; only a protocol or
    /// transport failure ends it.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!(peer = %self.peer_addr, "connection established");

        loop {
            let request = match read_request(&mut self.reader) {
                Ok(Some(request)) => request,
                Ok(None) => {
                    tracing::debug!(peer = %self.peer_addr, "client disconnected");
                    return Ok(());
                }
                Err(FlatError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!(peer = %self.peer_addr, error = %e, "connection closed");
                    return Ok(());
                }
                Err(e @ FlatError::Protocol(_)) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "protocol error");
                    // Best effort: the stream position is lost, so the
                    // connection is closed after telling the client why
                    let _ = write_reply(&mut self.writer, &Reply::error(&e));
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "read failed");
                    return Err(e);
                }
            };

            tracing::trace!(peer = %self.peer_addr, command = %request.name, args = request.args.len(), "request");

            let reply = self.commands.dispatch(&request, &self.store);

            if let Err(e) = write_reply(&mut self.writer, &reply) {
                if let FlatError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(peer = %self.peer_addr, "client left before reply was sent");
                        return Ok(());
                    }
                }
                tracing::warn!(peer = %self.peer_addr, error = %e, "write failed");
                return Err(e);
            }
        }
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

/// Errors that only mean the peer hung up or went idle past the timeout
fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}
