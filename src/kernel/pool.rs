use std::error::Error;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::kernel::fault;

pub(crate) const ENTRIES_PER_PAGE: u32 = 64;

/// A growable pool of generation-stamped slots, the backing store of the
/// actor and receiver directories.
///
/// Slots live in fixed-size pages that are allocated on demand and never
/// moved or released for the lifetime of the pool. The pool-wide lock
/// guards page growth and the free-index list (the infrequent paths);
/// each slot has its own short-hold lock so readers can resolve, pin and
/// unpin without touching the pool lock.
///
/// Every `reserve` bumps the slot's generation, so an address minted for a
/// previous occupant of the slot can never resolve to a new one. A pinned
/// slot cannot be freed; `retire` on a pinned slot defers the reclamation
/// to the final unpin.
pub(crate) struct PagedPool<T> {
    core: Mutex<PoolCore<T>>,
    capacity: u32,
}

struct PoolCore<T> {
    pages: Vec<Arc<Page<T>>>,
    free: Vec<u32>,
    live: u32,
}

struct Page<T> {
    slots: Box<[Slot<T>]>,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
}

struct SlotState<T> {
    entity: Option<Arc<T>>,
    generation: u32,
    pins: u32,
    retired: bool,
}

/// Keeps a slot's occupant resolvable for the duration of a dispatch.
///
/// Dropping the guard unpins the slot; the last guard on a retired slot
/// completes the deferred free.
pub(crate) struct PinGuard<'a, T> {
    pool: &'a PagedPool<T>,
    page: Arc<Page<T>>,
    offset: u32,
    index: u32,
}

impl<T> Page<T> {
    fn new() -> Self {
        let slots = (0..ENTRIES_PER_PAGE)
            .map(|_| Slot {
                state: Mutex::new(SlotState {
                    entity: None,
                    generation: 0,
                    pins: 0,
                    retired: false,
                }),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Page { slots }
    }
}

impl<T> PagedPool<T> {
    pub fn new(capacity: u32) -> Self {
        PagedPool {
            core: Mutex::new(PoolCore {
                pages: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
            capacity,
        }
    }

    fn locate(&self, index: u32) -> Option<(Arc<Page<T>>, u32)> {
        let core = self.core.lock();
        let page = core.pages.get((index / ENTRIES_PER_PAGE) as usize)?;
        Some((page.clone(), index % ENTRIES_PER_PAGE))
    }

    /// Reserves a free slot, bumping its generation.
    ///
    /// The slot is empty until `install` publishes an entity; resolving it
    /// in between yields nothing. Fails once `capacity` slots are live.
    pub fn reserve(&self) -> Result<(u32, u32), ExhaustedError> {
        let (page, offset, index) = {
            let mut core = self.core.lock();
            if core.live >= self.capacity {
                return Err(ExhaustedError);
            }

            let index = match core.free.pop() {
                Some(index) => index,
                None => {
                    // Page in a fresh batch of slots. The new indices go on
                    // the free list high-to-low so allocation starts at the
                    // low end.
                    let base = core.pages.len() as u32 * ENTRIES_PER_PAGE;
                    core.pages.push(Arc::new(Page::new()));
                    for offset in (1..ENTRIES_PER_PAGE).rev() {
                        core.free.push(base + offset);
                    }
                    base
                }
            };

            core.live += 1;
            let page = core.pages[(index / ENTRIES_PER_PAGE) as usize].clone();
            (page, index % ENTRIES_PER_PAGE, index)
        };

        let mut slot = page.slots[offset as usize].state.lock();
        if slot.pins != 0 || slot.entity.is_some() {
            fault("reserved a slot that is still in use");
        }
        slot.generation += 1;
        slot.retired = false;
        Ok((index, slot.generation))
    }

    /// Publishes the entity for a reserved slot.
    pub fn install(&self, index: u32, entity: Arc<T>) {
        match self.locate(index) {
            Some((page, offset)) => {
                let mut slot = page.slots[offset as usize].state.lock();
                if slot.entity.is_some() {
                    fault("slot installed twice");
                }
                slot.entity = Some(entity);
            }
            None => fault("install on an unknown slot"),
        }
    }

    /// Returns a reserved slot that will never be installed.
    pub fn cancel(&self, index: u32) {
        match self.locate(index) {
            Some((page, offset)) => {
                let needs_free = {
                    let mut slot = page.slots[offset as usize].state.lock();
                    slot.retired = true;
                    slot.pins == 0
                };
                if needs_free && self.free(index).is_err() {
                    fault("cancelled slot is pinned");
                }
            }
            None => fault("cancel on an unknown slot"),
        }
    }

    /// Resolves a slot to its entity, provided the generation still
    /// matches.
    pub fn get(&self, index: u32, generation: u32) -> Option<Arc<T>> {
        let (page, offset) = self.locate(index)?;
        let slot = page.slots[offset as usize].state.lock();
        if slot.generation == generation {
            slot.entity.clone()
        } else {
            None
        }
    }

    /// Pins a slot so it cannot be reused while the guard lives.
    ///
    /// Returns the occupant together with the guard, or `None` when the
    /// generation no longer matches or the slot has been retired. Only
    /// occupied slots can be pinned, so a slot on the free list never
    /// carries a pin.
    pub fn pin(&self, index: u32, generation: u32) -> Option<(Arc<T>, PinGuard<'_, T>)> {
        let (page, offset) = self.locate(index)?;
        let entity = {
            let mut slot = page.slots[offset as usize].state.lock();
            if slot.generation != generation {
                return None;
            }
            let entity = slot.entity.clone()?;
            slot.pins += 1;
            entity
        };
        Some((
            entity,
            PinGuard {
                pool: self,
                page,
                offset,
                index,
            },
        ))
    }

    /// Clears a slot so its address stops resolving, returning the entity.
    ///
    /// The slot itself is reclaimed immediately when unpinned, otherwise
    /// by the last outstanding `PinGuard`.
    pub fn retire(&self, index: u32, generation: u32) -> Option<Arc<T>> {
        let (page, offset) = self.locate(index)?;
        let (entity, needs_free) = {
            let mut slot = page.slots[offset as usize].state.lock();
            if slot.generation != generation || slot.retired {
                return None;
            }
            let entity = slot.entity.take()?;
            slot.retired = true;
            (entity, slot.pins == 0)
        };
        if needs_free && self.free(index).is_err() {
            fault("retired slot is pinned");
        }
        Some(entity)
    }

    /// Reclaims a retired slot, returning its index to the free list.
    ///
    /// Fails if the slot is still pinned.
    pub fn free(&self, index: u32) -> Result<(), InvariantError> {
        let mut core = self.core.lock();
        let page = match core.pages.get((index / ENTRIES_PER_PAGE) as usize) {
            Some(page) => page.clone(),
            None => return Ok(()),
        };

        {
            let mut slot = page.slots[(index % ENTRIES_PER_PAGE) as usize].state.lock();
            if slot.pins != 0 {
                return Err(InvariantError);
            }
            if !slot.retired || slot.entity.is_some() {
                // Lost a race with another unpinner, or the slot was
                // already recycled. Nothing to do.
                return Ok(());
            }
            slot.retired = false;
        }

        core.free.push(index);
        core.live -= 1;
        Ok(())
    }

    /// Visits every installed entity. Entities are collected under the
    /// slot locks and visited outside them.
    pub fn for_each<F: FnMut(&Arc<T>)>(&self, mut f: F) {
        let pages: Vec<Arc<Page<T>>> = self.core.lock().pages.clone();
        let mut entities = Vec::new();
        for page in &pages {
            for slot in page.slots.iter() {
                if let Some(entity) = slot.state.lock().entity.clone() {
                    entities.push(entity);
                }
            }
        }
        for entity in &entities {
            f(entity);
        }
    }

    pub fn len(&self) -> u32 {
        self.core.lock().live
    }
}

impl<T> Drop for PinGuard<'_, T> {
    fn drop(&mut self) {
        let needs_free = {
            let mut slot = self.page.slots[self.offset as usize].state.lock();
            if slot.pins == 0 {
                fault("slot unpinned more times than pinned");
            }
            slot.pins -= 1;
            slot.retired && slot.pins == 0 && slot.entity.is_none()
        };
        // Competing unpinners may both observe the condition; `free`
        // tolerates the race.
        if needs_free && self.pool.free(self.index).is_err() {
            fault("deferred slot free found the slot pinned");
        }
    }
}

#[derive(Clone, Copy)]
pub struct ExhaustedError;

impl Error for ExhaustedError {}

impl fmt::Display for ExhaustedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("directory capacity exhausted")
    }
}

impl fmt::Debug for ExhaustedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("directory capacity exhausted")
    }
}

#[derive(Clone, Copy)]
pub struct InvariantError;

impl Error for InvariantError {}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("slot is pinned")
    }
}

impl fmt::Debug for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("slot is pinned")
    }
}
