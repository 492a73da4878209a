//! SQL scalar functions exposing the codec to statements.
//!
//! Registered on every card database connection so that updates and filters
//! share the exact parse/serialize rules of [`TagSet`](super::TagSet)
//! instead of matching substrings with `LIKE`.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use super::{StyleId, TagSet};

fn raw_text(ctx: &Context<'_>, idx: usize) -> Option<String> {
    match ctx.get_raw(idx) {
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Null | ValueRef::Real(_) | ValueRef::Blob(_) => None,
    }
}

/// Registers `tagset_add`, `tagset_remove`, `tagset_contains` and `tagset_len`.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("tagset_add", 2, flags, |ctx| {
        let id: StyleId = ctx.get(1)?;
        let mut set = TagSet::parse(raw_text(ctx, 0).as_deref());
        set.insert(id);
        Ok(set.serialize())
    })?;

    conn.create_scalar_function("tagset_remove", 2, flags, |ctx| {
        let id: StyleId = ctx.get(1)?;
        let mut set = TagSet::parse(raw_text(ctx, 0).as_deref());
        set.remove(id);
        Ok(set.serialize())
    })?;

    conn.create_scalar_function("tagset_contains", 2, flags, |ctx| {
        let id: StyleId = ctx.get(1)?;
        Ok(TagSet::parse(raw_text(ctx, 0).as_deref()).contains(id))
    })?;

    conn.create_scalar_function("tagset_len", 1, flags, |ctx| {
        Ok(TagSet::parse(raw_text(ctx, 0).as_deref()).len() as i64)
    })?;

    Ok(())
}
