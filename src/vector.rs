//! Dynamic array with a doubling growth policy and a pluggable relocation
//! strategy for elements that need more than a `memmove` when shifted.
//!
//! Ported from `include/b6/vector.h` / `src/vector.c`. The C version is
//! untyped (an `itemsize` field and a `move` callback that receives raw
//! bytes) because C has no generics; here `Vector<T>` is generic over `T`
//! directly and `itemsize` falls out of `size_of::<T>()`. The "move is an
//! ops callback" design point survives as the [`Relocate`] trait, kept for
//! element types whose relocation needs more than a byte copy (e.g.
//! self-referential types), resolved statically rather than through a
//! function pointer so the common case costs nothing extra.

use core::cmp;
use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};

use crate::allocator::Allocator;

/// How to move `count` elements of `T` from `src` to `dst` when a
/// [`Vector`] shifts its contents to make room for an insertion or to close
/// a gap left by a removal.
///
/// The default, [`ByteMove`], is a plain `ptr::copy` (a `memmove`), correct
/// for any `T` since both regions belong to the same vector and ownership
/// simply moves along with the bytes.
pub trait Relocate<T> {
    /// Moves `count` elements from `src` to `dst`. The ranges may overlap.
    fn relocate(dst: *mut T, src: *const T, count: usize);
}

/// The default [`Relocate`] strategy: a raw, possibly-overlapping copy.
pub struct ByteMove;

impl<T> Relocate<T> for ByteMove {
    fn relocate(dst: *mut T, src: *const T, count: usize) {
        unsafe { ptr::copy(src, dst, count) };
    }
}

/// A dynamic array over an injected [`Allocator`].
///
/// Invariants: `length <= capacity`; `buffer` is `Some` iff `capacity > 0`
/// and owns exactly `capacity * size_of::<T>()` bytes.
pub struct Vector<'a, T, M: Relocate<T> = ByteMove> {
    allocator: &'a dyn Allocator,
    capacity: usize,
    length: usize,
    buffer: Option<NonNull<T>>,
    _relocate: PhantomData<fn(&M)>,
}

impl<'a, T, M: Relocate<T>> Vector<'a, T, M> {
    /// Creates an empty vector backed by `allocator`.
    pub fn new(allocator: &'a dyn Allocator) -> Self {
        Vector { allocator, capacity: 0, length: 0, buffer: None, _relocate: PhantomData }
    }

    /// The number of elements currently stored.
    pub fn len(&self) -> usize {
        self.length
    }

    /// `true` iff the vector holds no elements.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of elements the current buffer can hold without
    /// reallocating.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn byte_size(count: usize) -> Option<usize> {
        count.checked_mul(mem::size_of::<T>())
    }

    fn next_capacity(needed: usize) -> Option<usize> {
        cmp::max(needed, 2).checked_next_power_of_two()
    }

    fn grow(&mut self, needed: usize) -> bool {
        if needed <= self.capacity {
            return true;
        }
        let new_capacity = match Self::next_capacity(needed) {
            Some(c) => c,
            None => return false,
        };
        let new_size = match Self::byte_size(new_capacity) {
            Some(s) => s,
            None => return false,
        };
        let old_size = Self::byte_size(self.capacity).unwrap_or(0);
        let old_ptr = self.buffer.map(|p| p.cast::<u8>());
        match self.allocator.reallocate(old_ptr, old_size, new_size) {
            Some(ptr) => {
                self.buffer = Some(ptr.cast());
                self.capacity = new_capacity;
                true
            }
            None => false,
        }
    }

    /// Returns a slice view of the `n` elements starting at `index`, or
    /// `None` if that range runs past the end of the vector.
    pub fn get(&self, index: usize, n: usize) -> Option<&[T]> {
        if n > self.length.checked_sub(index)? {
            return None;
        }
        let buffer = self.buffer?;
        Some(unsafe { core::slice::from_raw_parts(buffer.as_ptr().add(index), n) })
    }

    /// Returns a mutable slice view of the `n` elements starting at
    /// `index`, or `None` if that range runs past the end of the vector.
    pub fn get_mut(&mut self, index: usize, n: usize) -> Option<&mut [T]> {
        if n > self.length.checked_sub(index)? {
            return None;
        }
        let buffer = self.buffer?;
        Some(unsafe { core::slice::from_raw_parts_mut(buffer.as_ptr().add(index), n) })
    }

    /// Makes room for `n` uninitialized elements starting at `index`,
    /// shifting anything at or after `index` upward, and returns a pointer
    /// to the (uninitialized) first new slot.
    ///
    /// `index > length()` is clamped to `length()`. Returns `None` on
    /// allocator failure or size-arithmetic overflow; the vector is left
    /// unchanged in that case.
    ///
    /// # Safety
    ///
    /// The caller must initialize the `n` slots at the returned pointer
    /// before they are read through [`Vector::get`].
    pub fn add(&mut self, index: usize, n: usize) -> Option<NonNull<T>> {
        let index = cmp::min(index, self.length);

        if n == 0 {
            return self.buffer.map(|p| unsafe { NonNull::new_unchecked(p.as_ptr().add(index)) });
        }

        let new_length = self.length.checked_add(n)?;
        if !self.grow(new_length) {
            return None;
        }

        let buffer = self.buffer.expect("grow succeeded");
        let tail_count = self.length - index;
        if tail_count > 0 {
            let src = unsafe { buffer.as_ptr().add(index) };
            let dst = unsafe { buffer.as_ptr().add(index + n) };
            M::relocate(dst, src, tail_count);
        }
        self.length = new_length;

        Some(unsafe { NonNull::new_unchecked(buffer.as_ptr().add(index)) })
    }

    /// Removes up to `n` elements starting at `index` and returns how many
    /// were actually removed.
    ///
    /// `index >= length()` is a no-op returning `0`. When `n` reaches or
    /// exceeds `length() - index`, the tail is simply truncated (no move
    /// needed).
    pub fn del(&mut self, index: usize, n: usize) -> usize {
        if n == 0 || index >= self.length {
            return 0;
        }

        let available = self.length - index;
        if n >= available {
            self.length -= available;
            return available;
        }

        let buffer = self.buffer.expect("non-empty vector has a buffer");
        let tail_count = available - n;
        let src = unsafe { buffer.as_ptr().add(index + n) };
        let dst = unsafe { buffer.as_ptr().add(index) };
        M::relocate(dst, src, tail_count);
        self.length -= n;
        n
    }

    /// Inserts `n` uninitialized elements at the front. See [`Vector::add`].
    pub fn add_first(&mut self, n: usize) -> Option<NonNull<T>> {
        self.add(0, n)
    }

    /// Appends `n` uninitialized elements at the back. See [`Vector::add`].
    pub fn add_last(&mut self, n: usize) -> Option<NonNull<T>> {
        self.add(self.length, n)
    }

    /// Removes up to `n` elements from the front. See [`Vector::del`].
    pub fn del_first(&mut self, n: usize) -> usize {
        self.del(0, n)
    }

    /// Removes up to `n` elements from the back. See [`Vector::del`].
    pub fn del_last(&mut self, n: usize) -> usize {
        let index = self.length.saturating_sub(n);
        self.del(index, n)
    }
}

impl<'a, T, M: Relocate<T>> Drop for Vector<'a, T, M> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer {
            let size = Self::byte_size(self.capacity).unwrap_or(0);
            self.allocator.deallocate(Some(buffer.cast()), size);
        }
    }
}
