//! Scalar key commands: SET, GET, DEL, INCR/INCRBY, MSET, EXISTS, TTL, KEYS

use crate::error::Result;
use crate::protocol::Reply;
use crate::store::{Entry, KeyTtl};

use super::{
    number_reply, parse_float, parse_ttl, scalar_key, wrong_arity, Arity, CommandSpec,
    CommandTable, Context, SCALAR_PREFIX,
};

pub(super) fn register(table: &mut CommandTable) {
    let specs = [
        ("set", Arity::Range(2, 3), set as super::CommandHandler),
        ("get", Arity::Exact(1), get),
        ("del", Arity::AtLeast(0), del),
        ("incr", Arity::Range(1, 3), incr),
        ("incrby", Arity::Range(1, 3), incr),
        ("mset", Arity::AtLeast(2), mset),
        ("exists", Arity::AtLeast(1), exists),
        ("ttl", Arity::Exact(1), ttl),
        ("keys", Arity::Exact(1), keys),
    ];
    for (name, arity, handler) in specs {
        table.register(CommandSpec {
            name,
            arity,
            handler,
        });
    }
}

/// SET key value [ttl]
fn set(ctx: &Context<'_>) -> Result<Reply> {
    let ttl = ctx.args.get(2).map(|arg| parse_ttl(arg)).transpose()?;
    let entry = Entry::new(ctx.key(0), ctx.arg(1)).with_ttl(ttl);
    ctx.store.put(&entry)?;
    Ok(Reply::ok())
}

/// GET key
fn get(ctx: &Context<'_>) -> Result<Reply> {
    Ok(match ctx.store.get(&ctx.key(0))? {
        Some(value) => Reply::Bulk(value),
        None => Reply::Null,
    })
}

/// DEL key [key ...]
///
/// Replies with the number of keys named, whether or not they existed.
fn del(ctx: &Context<'_>) -> Result<Reply> {
    if ctx.args.is_empty() {
        return Ok(Reply::Integer(0));
    }
    let entries: Vec<Entry> = (0..ctx.args.len()).map(|i| Entry::key_only(ctx.key(i))).collect();
    ctx.store.batch(&entries)?;
    Ok(Reply::Integer(entries.len() as i64))
}

/// INCR key [delta] [ttl]
///
/// `delta` defaults to 0, which reads the current number back (creating 0).
fn incr(ctx: &Context<'_>) -> Result<Reply> {
    let delta = match ctx.args.get(1) {
        Some(arg) => parse_float(arg)?,
        None => 0.0,
    };
    let ttl = ctx.args.get(2).map(|arg| parse_ttl(arg)).transpose()?;

    let value = ctx.store.incr(&ctx.key(0), delta, ttl)?;
    Ok(number_reply(value))
}

/// MSET key value [key value ...], applied atomically
fn mset(ctx: &Context<'_>) -> Result<Reply> {
    if ctx.args.len() % 2 != 0 {
        return Ok(wrong_arity("mset"));
    }
    let entries: Vec<Entry> = ctx
        .args
        .chunks_exact(2)
        .map(|pair| Entry::new(scalar_key(&pair[0]), pair[1].clone()))
        .collect();
    ctx.store.put_many(&entries)?;
    Ok(Reply::ok())
}

/// EXISTS key [key ...]: number of named keys that are live
fn exists(ctx: &Context<'_>) -> Result<Reply> {
    let mut live = 0;
    for i in 0..ctx.args.len() {
        if ctx.store.get(&ctx.key(i))?.is_some() {
            live += 1;
        }
    }
    Ok(Reply::Integer(live))
}

/// TTL key: seconds left, -1 without expiry, -2 when missing
fn ttl(ctx: &Context<'_>) -> Result<Reply> {
    Ok(Reply::Integer(match ctx.store.ttl(&ctx.key(0))? {
        KeyTtl::Missing => -2,
        KeyTtl::Persistent => -1,
        KeyTtl::Expires(left) => ((left.as_millis() + 500) / 1000) as i64,
    }))
}

/// KEYS pattern
fn keys(ctx: &Context<'_>) -> Result<Reply> {
    let pattern = ctx.arg(0);
    let prefix = scalar_key(&literal_prefix(pattern));

    let matches = ctx
        .store
        .keys(&prefix)
        .into_iter()
        .filter_map(|key| key.strip_prefix(SCALAR_PREFIX).map(<[u8]>::to_vec))
        .filter(|key| glob_match(pattern, key))
        .map(Reply::Bulk)
        .collect();
    Ok(Reply::Array(matches))
}

// =============================================================================
// Glob Matching
// =============================================================================

/// The fixed leading part of a pattern, used to bound the key scan
fn literal_prefix(pattern: &[u8]) -> Vec<u8> {
    let mut prefix = Vec::new();
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            b'*' | b'?' => break,
            b'\\' if i + 1 < pattern.len() => {
                prefix.push(pattern[i + 1]);
                i += 2;
            }
            b => {
                prefix.push(b);
                i += 1;
            }
        }
    }
    prefix
}

/// Match `text` against a pattern of `*` (any run), `?` (any byte) and
/// `\x` (literal `x`)
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position after the last `*` and the text index it is trying to absorb
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p + 1, t));
                p += 1;
                continue;
            }
            Some(b'?') => Some(1),
            Some(b'\\') if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(2),
            Some(&c) => (c == text[t]).then_some(1),
            None => None,
        };

        match (step, backtrack) {
            (Some(width), _) => {
                p += width;
                t += 1;
            }
            (None, Some((star_p, star_t))) => {
                p = star_p;
                t = star_t + 1;
                backtrack = Some((star_p, star_t + 1));
            }
            (None, None) => return false,
        }
    }

    pattern[p.min(pattern.len())..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"user:*", b"user:42"));
        assert!(!glob_match(b"user:*", b"users"));
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(!glob_match(b"h?llo", b"hllo"));
        assert!(glob_match(b"a*b*c", b"axxbyyc"));
        assert!(!glob_match(b"a*b*c", b"axxbyy"));
        assert!(glob_match(b"*ab", b"aab"));
        assert!(glob_match(b"a\\*", b"a*"));
        assert!(!glob_match(b"a\\*", b"ab"));
        assert!(glob_match(b"", b""));
        assert!(!glob_match(b"", b"x"));
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix(b"user:*"), b"user:".to_vec());
        assert_eq!(literal_prefix(b"a\\*b?"), b"a*b".to_vec());
        assert_eq!(literal_prefix(b"*x"), Vec::<u8>::new());
        assert_eq!(literal_prefix(b"exact"), b"exact".to_vec());
    }
}
