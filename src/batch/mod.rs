//! Partitioning of key sets into statement-sized chunks.

use crate::error::{Result, SwapperError};

/// Conservative bound-parameter ceiling of a single SQLite statement.
pub const MAX_BOUND_PARAMETERS: usize = 999;

/// Parameters every chunked statement binds besides the keys (the style id).
pub const RESERVED_PARAMETERS: usize = 1;

pub const DEFAULT_MUTATION_CHUNK_SIZE: usize = 100;
pub const DEFAULT_LOOKUP_CHUNK_SIZE: usize = 900;

/// Split `keys` into consecutive chunks of at most `max_chunk` elements.
///
/// Concatenating the chunks reproduces `keys` exactly.
pub fn plan<K>(keys: &[K], max_chunk: usize) -> Result<Vec<&[K]>> {
    if max_chunk == 0 {
        return Err(SwapperError::InvalidArgument(
            "chunk size must be at least 1".to_string(),
        ));
    }
    Ok(keys.chunks(max_chunk).collect())
}

/// The two chunk sizes used against the card database.
///
/// Writes use small chunks because each one is a commit plus a progress
/// event; read-only existence checks can go up to the parameter ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLimits {
    pub mutation: usize,
    pub lookup: usize,
}

impl ChunkLimits {
    pub fn new(mutation: usize, lookup: usize) -> Result<Self> {
        Self::check("mutation", mutation)?;
        Self::check("lookup", lookup)?;
        Ok(Self { mutation, lookup })
    }

    fn check(name: &str, size: usize) -> Result<()> {
        let ceiling = MAX_BOUND_PARAMETERS - RESERVED_PARAMETERS;
        if size == 0 || size > ceiling {
            return Err(SwapperError::InvalidArgument(format!(
                "{} chunk size must be between 1 and {}, got {}",
                name, ceiling, size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            mutation: DEFAULT_MUTATION_CHUNK_SIZE,
            lookup: DEFAULT_LOOKUP_CHUNK_SIZE,
        }
    }
}
