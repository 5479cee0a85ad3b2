//! flatkv CLI Client
//!
//! Command-line interface for interacting with a flatkv server.

use clap::{Parser, Subcommand};
use flatkv::client::Client;
use flatkv::protocol::Reply;

/// flatkv CLI
#[derive(Parser, Debug)]
#[command(name = "flatkv-cli")]
#[command(about = "CLI for the flatkv key-value server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        key: String,
    },

    /// Set a key-value pair, optionally expiring (e.g. 10s, 1.5h)
    Set {
        key: String,
        value: String,
        ttl: Option<String>,
    },

    /// Delete keys
    Del {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Add a delta to a numeric key
    Incr {
        key: String,
        #[arg(allow_negative_numbers = true)]
        delta: Option<String>,
        ttl: Option<String>,
    },

    /// Seconds until a key expires (-1 none, -2 missing)
    Ttl {
        key: String,
    },

    /// List keys matching a glob pattern
    Keys {
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Ping the server
    Ping,
}

impl Commands {
    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            Commands::Get { key } => args.extend(["GET".to_string(), key.clone()]),
            Commands::Set { key, value, ttl } => {
                args.extend(["SET".to_string(), key.clone(), value.clone()]);
                args.extend(ttl.clone());
            }
            Commands::Del { keys } => {
                args.push("DEL".to_string());
                args.extend(keys.iter().cloned());
            }
            Commands::Incr { key, delta, ttl } => {
                args.extend(["INCR".to_string(), key.clone()]);
                match (delta, ttl) {
                    (Some(delta), Some(ttl)) => args.extend([delta.clone(), ttl.clone()]),
                    (Some(delta), None) => args.push(delta.clone()),
                    (None, Some(ttl)) => args.extend(["0".to_string(), ttl.clone()]),
                    (None, None) => {}
                }
            }
            Commands::Ttl { key } => args.extend(["TTL".to_string(), key.clone()]),
            Commands::Keys { pattern } => args.extend(["KEYS".to_string(), pattern.clone()]),
            Commands::Ping => args.push("PING".to_string()),
        }
        args
    }
}

fn main() {
    let args = Args::parse();

    let mut client = match Client::connect(&args.server) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let parts = args.command.to_args();
    let parts: Vec<&[u8]> = parts.iter().map(|p| p.as_bytes()).collect();

    match client.execute(&parts) {
        Ok(reply) => {
            let failed = reply.is_error();
            print_reply(&reply);
            if failed {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Request failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_reply(reply: &Reply) {
    match reply {
        Reply::Simple(s) => println!("{}", s),
        Reply::Error(e) => println!("(error) {}", e),
        Reply::Integer(n) => println!("(integer) {}", n),
        Reply::Bulk(data) => println!("\"{}\"", String::from_utf8_lossy(data)),
        Reply::Null => println!("(nil)"),
        Reply::Array(items) if items.is_empty() => println!("(empty array)"),
        Reply::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                print!("{}) ", i + 1);
                print_reply(item);
            }
        }
    }
}
