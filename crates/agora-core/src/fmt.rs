//! Error plumbing shared across crates.

use std::error::Error;
use std::fmt;

pub type BoxedError = Box<dyn Error + Send + Sync + 'static>;
pub type BoxedErrorResult<T> = std::result::Result<T, BoxedError>;

/// Render an error and its source chain on one line, for structured logging
/// fields where a multi-line `Debug` dump is unreadable.
pub struct CompactChain<'e>(&'e (dyn Error + 'static));

impl fmt::Display for CompactChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut cur = self.0.source();
        while let Some(source) = cur {
            write!(f, ": {source}")?;
            cur = source.source();
        }
        Ok(())
    }
}

pub trait FmtCompact {
    fn fmt_compact(&self) -> CompactChain<'_>;
}

impl<E> FmtCompact for E
where
    E: Error + 'static,
{
    fn fmt_compact(&self) -> CompactChain<'_> {
        CompactChain(self)
    }
}
