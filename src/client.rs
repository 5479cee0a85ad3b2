//! Blocking client
//!
//! A minimal RESP client used by `flatkv-cli`, tests and benchmarks.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;
use crate::protocol::{read_reply, write_request, Reply};

/// One connection to a flatkv server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Send one command and wait for its reply
    ///
    /// Error replies are returned as `Reply::Error`, not as `Err`.
    pub fn execute(&mut self, args: &[&[u8]]) -> Result<Reply> {
        write_request(&mut self.writer, args)?;
        read_reply(&mut self.reader)
    }

    pub fn ping(&mut self) -> Result<Reply> {
        self.execute(&[b"PING"])
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Reply> {
        self.execute(&[b"GET", key])
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<Reply> {
        self.execute(&[b"SET", key, value])
    }
}
