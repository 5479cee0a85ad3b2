//! Protocol Module
//!
//! The Redis serialization protocol (RESP2) as spoken by flatkv.
//!
//! ## Requests
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<arg bytes>\r\n      (repeated argc times)
//! ```
//! or an inline command: `SET key value\r\n`.
//!
//! ## Replies
//! | Prefix | Reply               |
//! |--------|---------------------|
//! | `+`    | simple string       |
//! | `-`    | error               |
//! | `:`    | integer             |
//! | `$`    | bulk string (`$-1` null) |
//! | `*`    | array               |

mod codec;
mod reply;
mod request;

pub use codec::{
    encode_reply, encode_request, read_reply, read_request, write_reply, write_request,
    MAX_ARRAY_LEN, MAX_BULK_LEN, MAX_INLINE_LEN,
};
pub use reply::Reply;
pub use request::Request;
