use tracing::debug;

use crate::util::round_up;

use super::{Error, Result};

/// Arena index type. Arena size is limited to `u16::MAX` by [`Config`].
///
/// [`Config`]: crate::Config
type Idx = u16;

/// Allocation alignment.
const ALIGN: usize = 4;

/// Location of an allocation within an [`Arena`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[must_use]
pub struct Span {
    off: Idx,
    len: Idx,
}

impl Span {
    /// Returns the number of usable bytes.
    #[inline(always)]
    #[must_use]
    pub const fn len(self) -> usize {
        self.len as _
    }

    /// Returns whether the span is empty.
    #[inline(always)]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Returns the span offset.
    #[inline(always)]
    const fn off(self) -> usize {
        self.off as _
    }
}

/// Arena checkpoint returned by [`Arena::mark`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
pub struct Mark(Idx);

/// Fixed-capacity bump allocator with stack discipline.
///
/// Allocations are 4-byte aligned and zero-filled. Memory is released either
/// by [`Arena::pull`], which reverses the most recent [`Arena::push`], or by
/// rewinding to a [`Mark`].
#[derive(Clone, Debug)]
pub struct Arena {
    buf: Box<[u8]>,
    top: usize,
    hwm: usize,
}

impl Arena {
    /// Creates an arena of `cap` bytes.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            buf: vec![0; cap.min(usize::from(Idx::MAX))].into_boxed_slice(),
            top: 0,
            hwm: 0,
        }
    }

    /// Allocates `n` zeroed bytes.
    pub fn push(&mut self, n: usize) -> Result<Span> {
        let need = round_up(n, ALIGN);
        let free = self.free();
        if need > free {
            return Err(Error::ArenaExhausted { need, free });
        }
        #[allow(clippy::cast_possible_truncation)]
        let s = Span {
            off: self.top as _,
            len: n as _,
        };
        self.buf[self.top..self.top + need].fill(0);
        self.top += need;
        self.hwm = self.hwm.max(self.top);
        debug!("Arena {}/{} used", self.top, self.buf.len());
        Ok(s)
    }

    /// Allocates a copy of `v`.
    pub fn push_copy(&mut self, v: &[u8]) -> Result<Span> {
        let s = self.push(v.len())?;
        self.get_mut(s).copy_from_slice(v);
        Ok(s)
    }

    /// Releases the most recent allocation of `n` bytes. Releasing anything
    /// else corrupts later allocations, so the request is ignored if it would
    /// move the top below zero.
    pub fn pull(&mut self, n: usize) {
        let n = round_up(n, ALIGN);
        debug_assert!(n <= self.top, "arena underflow");
        self.top = self.top.saturating_sub(n);
        debug!("Arena {}/{} used", self.top, self.buf.len());
    }

    /// Returns a checkpoint of the current allocation state.
    #[inline]
    pub fn mark(&self) -> Mark {
        #[allow(clippy::cast_possible_truncation)]
        Mark(self.top as _)
    }

    /// Releases all allocations made after `m` was taken.
    #[inline]
    pub fn rewind_to(&mut self, m: Mark) {
        let top = usize::from(m.0);
        if top < self.top {
            self.top = top;
            debug!("Arena rewound to {}/{}", self.top, self.buf.len());
        }
    }

    /// Returns the contents of an allocation.
    #[inline]
    #[must_use]
    pub fn get(&self, s: Span) -> &[u8] {
        &self.buf[s.off()..s.off() + s.len()]
    }

    /// Returns the mutable contents of an allocation.
    #[inline]
    #[must_use]
    pub fn get_mut(&mut self, s: Span) -> &mut [u8] {
        &mut self.buf[s.off()..s.off() + s.len()]
    }

    /// Returns the number of allocated bytes, including alignment padding.
    #[inline(always)]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.top
    }

    /// Returns the number of free bytes.
    #[inline(always)]
    #[must_use]
    pub const fn free(&self) -> usize {
        self.buf.len() - self.top
    }

    /// Returns the arena capacity.
    #[inline(always)]
    #[must_use]
    pub const fn cap(&self) -> usize {
        self.buf.len()
    }

    /// Returns the maximum number of bytes ever allocated.
    #[inline(always)]
    #[must_use]
    pub const fn high_water(&self) -> usize {
        self.hwm
    }

    /// Releases all allocations. The high-water mark is preserved.
    #[inline]
    pub fn clear(&mut self) {
        self.top = 0;
    }
}
