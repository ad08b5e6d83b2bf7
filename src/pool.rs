//! A chunked fixed-size object allocator: slabs of same-sized slots,
//! bump-allocated within a chunk and recycled through a FIFO once freed.
//!
//! Ported from `include/b6/pool.h` / `src/pool.c`. The design point worth
//! dwelling on is that there is no per-slot free-list node: a freed slot's
//! own first machine word is reused as the recycle queue's link field (see
//! [`deque::SRef`]), and a chunk's *current* owner is found by address-range
//! lookup in an AVL [`tree::Tree`] rather than by following a pointer stored
//! in the slot. That is also why a pool's minimum object size is one
//! pointer: the slot must be able to hold the link while it sits in the
//! recycle queue.

use core::mem;
use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::deque::{Deque, SRef};
use crate::list::{DRef, List};
use crate::tree::{Avl, Tree};

const PTR_SIZE: usize = mem::size_of::<usize>();

/// The header prefixed to every chunk's backing allocation. A chunk is laid
/// out as `[Chunk header][bump-allocated slots...]`; `bump_index` starts at
/// `size_of::<Chunk>()` so the header itself is never handed out as a slot.
///
/// `#[repr(C)]` fixes the field order so [`Chunk::from_dref`] can recover
/// the enclosing `Chunk` from a `&DRef` by subtracting a known offset.
#[repr(C)]
struct Chunk {
    tref: crate::tree::TRef,
    dref: DRef,
    /// Bytes within the chunk not yet accounted as used by a live object.
    free: usize,
    /// Count of slots currently considered live (handed out and not yet put
    /// back, or put back but not yet drained through the recycle queue).
    used: usize,
    /// Offset of the next never-yet-allocated byte, from the chunk start.
    index: usize,
    /// Set once `used` drops to zero: the chunk is draining and none of its
    /// recycled slots may be reissued, only accounted towards release.
    dead: bool,
}

impl Chunk {
    #[inline]
    fn start(r: NonNull<Chunk>) -> usize {
        r.as_ptr() as usize
    }

    #[inline]
    fn from_tref(tref: NonNull<crate::tree::TRef>) -> NonNull<Chunk> {
        tref.cast()
    }

    #[inline]
    fn from_dref(dref: NonNull<DRef>) -> NonNull<Chunk> {
        // dref is the second field of Chunk; back up by its offset.
        unsafe {
            NonNull::new_unchecked(
                (dref.as_ptr() as *mut u8).sub(mem::size_of::<crate::tree::TRef>()) as *mut Chunk,
            )
        }
    }

    #[inline]
    fn tref_ptr(r: NonNull<Chunk>) -> NonNull<crate::tree::TRef> {
        unsafe { NonNull::new_unchecked(&mut (*r.as_ptr()).tref as *mut _) }
    }

    #[inline]
    fn dref_ptr(r: NonNull<Chunk>) -> NonNull<DRef> {
        unsafe { NonNull::new_unchecked(&mut (*r.as_ptr()).dref as *mut _) }
    }
}

/// Why [`Pool::new`] refused a configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The requested `chunk_size` cannot hold the chunk header, one pointer
    /// of slack, and at least one object.
    ChunkTooSmall,
    /// `chunk_size` (or the auto-picked default) overflowed while growing to
    /// accommodate `size`.
    SizeOverflow,
}

/// A chunked fixed-size allocator. `size` is fixed at construction; every
/// allocation request for `n <= size` bytes succeeds from the same pool of
/// same-sized slots (see the [`Allocator`] impl below).
///
/// # Safety
///
/// A `Pool` must not be moved after [`Pool::new`] has run: its `queue`,
/// `list` and `tree` fields are self-referential sentinels.
pub struct Pool<'a> {
    chunk_size: usize,
    size: usize,
    curr: Option<NonNull<Chunk>>,
    free: Option<NonNull<Chunk>>,
    queue: Deque,
    list: List,
    tree: Tree<Avl, fn(NonNull<crate::tree::TRef>, NonNull<crate::tree::TRef>) -> core::cmp::Ordering>,
    allocator: &'a dyn Allocator,
}

fn compare_chunks(
    a: NonNull<crate::tree::TRef>,
    b: NonNull<crate::tree::TRef>,
) -> core::cmp::Ordering {
    Chunk::start(Chunk::from_tref(a)).cmp(&Chunk::start(Chunk::from_tref(b)))
}

impl<'a> Pool<'a> {
    /// Creates a pool of fixed-size `size`-byte objects, backed by
    /// `allocator` for chunk storage.
    ///
    /// `size` is rounded up to the machine pointer size. `chunk_size == 0`
    /// auto-picks the smallest power of two at least 4096 that leaves room
    /// for the chunk header, one pointer of slack, and at least one object;
    /// an explicit `chunk_size` is validated against the same bound and
    /// rejected if too small.
    pub fn new(size: usize, chunk_size: usize, allocator: &'a dyn Allocator) -> Result<Self, PoolError> {
        let size = (size + (PTR_SIZE - 1)) & !(PTR_SIZE - 1);
        let size = core::cmp::max(size, PTR_SIZE);
        let header = mem::size_of::<Chunk>();

        let chunk_size = if chunk_size == 0 {
            let mut candidate: usize = 4096;
            loop {
                if candidate >= header + PTR_SIZE + size {
                    break candidate - header - PTR_SIZE;
                }
                candidate = candidate.checked_mul(2).ok_or(PoolError::SizeOverflow)?;
            }
        } else {
            if chunk_size < header + PTR_SIZE || chunk_size - header - PTR_SIZE < size {
                return Err(PoolError::ChunkTooSmall);
            }
            chunk_size - header - PTR_SIZE
        };

        let mut queue = Deque::new();
        queue.initialize();
        let mut list = List::new();
        list.initialize();
        let compare: fn(_, _) -> _ = compare_chunks;
        let mut tree: Tree<Avl, _> = Tree::new(compare);
        tree.initialize();

        Ok(Pool { chunk_size, size, curr: None, free: None, queue, list, tree, allocator })
    }

    /// The fixed object size every allocation from this pool satisfies.
    pub fn size(&self) -> usize {
        self.size
    }

    fn alloc_chunk_storage(&self) -> Option<NonNull<Chunk>> {
        let bytes = self.allocator.allocate(mem::size_of::<Chunk>() + self.chunk_size)?;
        Some(bytes.cast())
    }

    fn allocate_chunk(&mut self) -> Option<NonNull<Chunk>> {
        match self.free.take() {
            Some(chunk) => Some(chunk),
            None => self.alloc_chunk_storage(),
        }
    }

    fn release_chunk(&mut self, chunk: NonNull<Chunk>) {
        if self.free.is_none() {
            self.free = Some(chunk);
        } else {
            self.allocator.deallocate(
                Some(chunk.cast()),
                mem::size_of::<Chunk>() + self.chunk_size,
            );
        }
    }

    fn initialize_chunk(&mut self, chunk: NonNull<Chunk>) {
        unsafe {
            let c = chunk.as_ptr();
            (*c).free = self.chunk_size;
            (*c).used = 0;
            (*c).index = mem::size_of::<Chunk>();
            (*c).dead = true;
        }

        self.list.add_first(Chunk::dref_ptr(chunk));

        let tref = Chunk::tref_ptr(chunk);
        let result = self.tree.search(|candidate| compare_chunks(candidate, tref));
        match result {
            crate::tree::SearchResult::Found(_) => {
                precondition!(false, "two chunks cannot share a starting address");
            }
            crate::tree::SearchResult::Missing { top, dir } => {
                self.tree.insert(top, dir, tref);
            }
        }
    }

    fn finalize_chunk(&mut self, chunk: NonNull<Chunk>) {
        if self.curr == Some(chunk) {
            self.curr = None;
        }
        self.list.del(Chunk::dref_ptr(chunk));

        let start = Chunk::start(chunk);
        let end = start + self.chunk_size;
        let found = self.tree.search(|candidate| {
            let other = Chunk::start(Chunk::from_tref(candidate));
            if other < start {
                core::cmp::Ordering::Less
            } else if other >= end {
                core::cmp::Ordering::Greater
            } else {
                core::cmp::Ordering::Equal
            }
        });
        match found {
            crate::tree::SearchResult::Found(tref) => {
                self.tree.del(tref);
            }
            crate::tree::SearchResult::Missing { .. } => {
                precondition!(false, "finalized chunk was not indexed in the tree");
            }
        }
    }

    fn find_chunk(&self, ptr: usize) -> NonNull<Chunk> {
        let found = self.tree.search(|candidate| {
            let start = Chunk::start(Chunk::from_tref(candidate));
            let end = start + self.chunk_size;
            if start > ptr {
                core::cmp::Ordering::Greater
            } else if end <= ptr {
                core::cmp::Ordering::Less
            } else {
                core::cmp::Ordering::Equal
            }
        });
        match found {
            crate::tree::SearchResult::Found(tref) => Chunk::from_tref(tref),
            crate::tree::SearchResult::Missing { .. } => {
                precondition!(false, "pointer does not belong to any chunk owned by this pool")
            }
        }
    }

    /// Hands out one `size`-byte slot, or `None` on allocator exhaustion.
    ///
    /// Drains the recycle queue first (most-recently-freed slot first); if
    /// a popped slot belongs to a chunk that has gone fully dead since, it
    /// is accounted towards that chunk's release instead of being reissued.
    /// Failing that, it bump-allocates from the current chunk, obtaining a
    /// new one (from the one-chunk cache, or the underlying allocator) when
    /// the current chunk is absent or exhausted.
    pub fn get(&mut self) -> Option<NonNull<u8>> {
        while !self.queue.is_empty() {
            let sref = self.queue.del_first();
            let chunk = self.find_chunk(sref.as_ptr() as usize);

            let dead = unsafe { (*chunk.as_ptr()).dead };
            if !dead {
                unsafe { (*chunk.as_ptr()).used += 1 };
                return Some(sref.cast());
            }

            unsafe { (*chunk.as_ptr()).free += self.size };
            if unsafe { (*chunk.as_ptr()).free } == self.chunk_size {
                self.finalize_chunk(chunk);
                self.release_chunk(chunk);
            }
        }

        let needs_new = match self.curr {
            None => true,
            Some(chunk) => unsafe { (*chunk.as_ptr()).index + self.size > self.chunk_size },
        };
        if needs_new {
            let chunk = self.allocate_chunk()?;
            self.initialize_chunk(chunk);
            self.curr = Some(chunk);
        }

        let chunk = self.curr.expect("just ensured curr is set");
        // index is bumped before the slot address is taken, not after: the
        // first object of a chunk therefore lands one `size` past the
        // header, which is exactly what the pointer of slack in chunk_size
        // (see Pool::new) accounts for.
        let index = unsafe {
            (*chunk.as_ptr()).used += 1;
            (*chunk.as_ptr()).free -= self.size;
            (*chunk.as_ptr()).index += self.size;
            (*chunk.as_ptr()).index
        };
        let slot = unsafe { (chunk.as_ptr() as *mut u8).add(index) };
        NonNull::new(slot)
    }

    /// Returns a slot previously obtained from [`Pool::get`] to the pool. Its
    /// first machine word is overwritten to serve as the recycle queue link;
    /// the rest of the slot's former contents are left untouched but must be
    /// treated as logically freed by the caller.
    ///
    /// # Panics
    ///
    /// Panics (via the tree's own precondition) if `ptr` was not obtained
    /// from this pool.
    pub fn put(&mut self, ptr: NonNull<u8>) {
        let chunk = self.find_chunk(ptr.as_ptr() as usize);
        let sref: NonNull<SRef> = ptr.cast();
        unsafe { core::ptr::write(sref.as_ptr(), SRef::new()) };
        self.queue.add_first(sref);
        unsafe {
            (*chunk.as_ptr()).used -= 1;
            (*chunk.as_ptr()).dead = (*chunk.as_ptr()).used == 0;
        }
    }

    /// Releases every chunk this pool owns, including the one-chunk cache.
    /// The pool may not be used again without calling [`Pool::new`] (or
    /// reassigning a freshly-constructed one) first.
    pub fn finalize(&mut self) {
        while !self.list.is_empty() {
            let dref = self.list.first();
            let chunk = Chunk::from_dref(dref);
            self.finalize_chunk(chunk);
            self.release_chunk(chunk);
        }
        if let Some(chunk) = self.free.take() {
            self.allocator.deallocate(
                Some(chunk.cast()),
                mem::size_of::<Chunk>() + self.chunk_size,
            );
        }
    }
}

impl<'a> Drop for Pool<'a> {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl<'a> Allocator for Pool<'a> {
    fn align(&self) -> usize {
        PTR_SIZE
    }

    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size > self.size {
            return None;
        }
        // `get` mutates pool-internal bookkeeping, not anything the caller
        // can observe as aliasing; `Allocator` takes `&self` to match
        // `SystemAllocator`'s shape, so the mutation happens through a raw
        // pointer cast rather than `&mut self`.
        let pool = self as *const Pool<'a> as *mut Pool<'a>;
        unsafe { (*pool).get() }
    }

    fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        _old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if new_size > self.size {
            return None;
        }
        match ptr {
            None => self.allocate(new_size),
            Some(ptr) => Some(ptr),
        }
    }

    fn deallocate(&self, ptr: Option<NonNull<u8>>, _size: usize) {
        if let Some(ptr) = ptr {
            let pool = self as *const Pool<'a> as *mut Pool<'a>;
            unsafe { (*pool).put(ptr) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SystemAllocator;

    #[test]
    fn new_rejects_too_small_explicit_chunk_size() {
        let alloc = SystemAllocator;
        assert_eq!(Pool::new(16, 8, &alloc).unwrap_err(), PoolError::ChunkTooSmall);
    }

    #[test]
    fn auto_chunk_size_accepts_small_objects() {
        let alloc = SystemAllocator;
        let pool = Pool::new(16, 0, &alloc).unwrap();
        assert_eq!(pool.size(), 16);
    }

    #[test]
    fn get_and_put_roundtrip() {
        let alloc = SystemAllocator;
        let mut pool = Pool::new(16, 0, &alloc).unwrap();
        let p = pool.get().unwrap();
        let q = pool.get().unwrap();
        assert_ne!(p, q);
        pool.put(p);
        pool.put(q);
    }

    #[test]
    fn recycle_returns_most_recently_freed_first() {
        let alloc = SystemAllocator;
        let mut pool = Pool::new(16, 0, &alloc).unwrap();

        let p = pool.get().unwrap();
        let q = pool.get().unwrap();
        let _r = pool.get().unwrap();

        pool.put(q);
        let next = pool.get().unwrap();
        assert_eq!(next, q);
        assert_ne!(next, p);
    }

    #[test]
    fn chunk_reclamation_across_two_chunks() {
        let alloc = SystemAllocator;
        // size=64, chunk_size sized for exactly two slots per chunk. The
        // bump threshold compares `index` (which already starts at
        // `header`) against the *stored* chunk_size (post header+slack
        // subtraction), so fitting two slots needs a second header's worth
        // of room on top of the two slots themselves.
        let header = mem::size_of::<Chunk>();
        let chunk_size = 2 * header + PTR_SIZE + 2 * 64;
        let mut pool = Pool::new(64, chunk_size, &alloc).unwrap();

        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        let c = pool.get().unwrap();
        let d = pool.get().unwrap();

        let chunk_of_a = pool.find_chunk(a.as_ptr() as usize);
        let chunk_of_c = pool.find_chunk(c.as_ptr() as usize);
        assert_ne!(chunk_of_a, chunk_of_c, "four slots at two per chunk span two chunks");

        pool.put(a);
        pool.put(b);
        assert!(unsafe { (*chunk_of_a.as_ptr()).dead });

        // Draining the now-dead first chunk's entries, then bump-allocating
        // fresh from the still-live second chunk, must still succeed.
        let e = pool.get().unwrap();
        assert_eq!(pool.find_chunk(e.as_ptr() as usize), chunk_of_c);

        pool.put(c);
        pool.put(d);
        pool.put(e);
    }

    #[test]
    fn pool_as_allocator_respects_its_own_size() {
        let alloc = SystemAllocator;
        let pool = Pool::new(16, 0, &alloc).unwrap();
        assert!(pool.allocate(8).is_some());
        assert!(pool.allocate(17).is_none());
    }
}
