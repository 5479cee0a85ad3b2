//! Connection-level commands

use crate::error::Result;
use crate::protocol::Reply;

use super::{Arity, CommandSpec, CommandTable, Context};

pub(super) fn register(table: &mut CommandTable) {
    table.register(CommandSpec {
        name: "ping",
        arity: Arity::Range(0, 1),
        handler: ping,
    });
    table.register(CommandSpec {
        name: "echo",
        arity: Arity::Exact(1),
        handler: echo,
    });
}

fn ping(ctx: &Context<'_>) -> Result<Reply> {
    Ok(match ctx.args.first() {
        Some(message) => Reply::Bulk(message.clone()),
        None => Reply::Simple("PONG".to_string()),
    })
}

fn echo(ctx: &Context<'_>) -> Result<Reply> {
    Ok(Reply::Bulk(ctx.arg(0).to_vec()))
}
