use std::alloc::Layout;
use std::mem;
use std::ptr::NonNull;

use config::Config;

use crate::alloc::AllocatorHandle;

const WORD: usize = mem::size_of::<usize>();

/// A cache of free message memory blocks, bucketed by size class.
///
/// Each worker thread owns one cache, and the system keeps one more behind
/// a mutex for sends made from outside the pool. Block sizes are rounded up
/// to word multiples; class `n` holds blocks of `(n + 1) * WORD` bytes.
/// Requests larger than the largest class bypass the cache and go straight
/// to the allocator.
///
/// A cached block is only reused for a request with the same alignment it
/// was originally allocated with, so every block is returned to the
/// allocator under the exact layout it was acquired under.
pub(crate) struct MessageCache {
    pools: Vec<BlockPool>,
    blocks_per_pool: usize,
    allocator: AllocatorHandle,
}

struct BlockPool {
    blocks: Vec<CachedBlock>,
}

struct CachedBlock {
    ptr: NonNull<u8>,
    align: usize,
}

// Raw block pointers are plain memory owned by the cache.
unsafe impl Send for MessageCache {}

impl MessageCache {
    pub fn new(allocator: AllocatorHandle, config: &CacheConfig) -> Self {
        MessageCache {
            pools: (0..config.max_pools)
                .map(|_| BlockPool { blocks: Vec::new() })
                .collect(),
            blocks_per_pool: config.blocks_per_pool,
            allocator,
        }
    }

    /// Rounds a block size up to the cache's word-multiple granularity.
    fn rounded(layout: Layout) -> Layout {
        let size = layout.size().max(WORD).next_multiple_of(WORD);
        Layout::from_size_align(size, layout.align()).expect("rounded message layout")
    }

    fn class_of(size: usize) -> usize {
        debug_assert!(size >= WORD && size % WORD == 0);
        size / WORD - 1
    }

    /// Allocates a block for `layout`, reusing a cached block when one of
    /// the right size class and alignment is available.
    pub fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let layout = Self::rounded(layout);
        let class = Self::class_of(layout.size());

        if let Some(pool) = self.pools.get_mut(class) {
            if let Some(at) = pool.blocks.iter().position(|b| b.align == layout.align()) {
                return Some(pool.blocks.swap_remove(at).ptr);
            }
        }

        NonNull::new(self.allocator.allocate(layout))
    }

    /// Returns a block to the cache, or to the allocator when the block's
    /// class is full or too large to cache.
    ///
    /// # Safety
    /// `ptr` must have come from `allocate` on a cache sharing this
    /// allocator, with the same `layout`.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>, layout: Layout) {
        let layout = Self::rounded(layout);
        let class = Self::class_of(layout.size());

        if let Some(pool) = self.pools.get_mut(class) {
            if pool.blocks.len() < self.blocks_per_pool {
                pool.blocks.push(CachedBlock {
                    ptr,
                    align: layout.align(),
                });
                return;
            }
        }

        self.allocator.free(ptr.as_ptr(), layout);
    }
}

impl Drop for MessageCache {
    fn drop(&mut self) {
        for (class, pool) in self.pools.iter_mut().enumerate() {
            let size = (class + 1) * WORD;
            for block in pool.blocks.drain(..) {
                let layout = Layout::from_size_align(size, block.align).expect("cached layout");
                unsafe { self.allocator.free(block.ptr.as_ptr(), layout) };
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub max_pools: usize,
    pub blocks_per_pool: usize,
}

impl From<&Config> for CacheConfig {
    fn from(config: &Config) -> Self {
        CacheConfig {
            max_pools: config.get_int("message_cache.max_pools").unwrap() as usize,
            blocks_per_pool: config.get_int("message_cache.blocks_per_pool").unwrap() as usize,
        }
    }
}
