// Fixed-length result buffer whose slots are written without locks by
// exactly one owner each.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// `ResultArena` holds one write-once slot per task of a wave.
///
/// Slot ownership is fixed at construction: [`ResultArena::new`] hands out
/// exactly one [`SlotWriter`] per index and a writer is consumed by its
/// single write, so no two threads ever touch the same slot. The arena can
/// only be drained once every writer has published its value.
pub struct ResultArena<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    written: AtomicUsize,
    drained: AtomicBool,
}

// SAFETY: slots are only written through their unique `SlotWriter` and only
// read by `drain` after every write has been published with Release and
// observed with Acquire; `drained` makes that read happen at most once.
unsafe impl<T: Send> Sync for ResultArena<T> {}

impl<T> ResultArena<T> {
    /// Creates an arena of `len` empty slots and the writers owning them,
    /// writer `i` owns slot `i`.
    #[must_use]
    pub fn new(len: usize) -> (Arc<Self>, Vec<SlotWriter<T>>) {
        let slots = (0..len).map(|_| UnsafeCell::new(None)).collect();
        let arena = Arc::new(Self {
            slots,
            written: AtomicUsize::new(0),
            drained: AtomicBool::new(false),
        });

        let writers = (0..len)
            .map(|index| SlotWriter {
                arena: Arc::clone(&arena),
                index,
            })
            .collect();

        (arena, writers)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots published so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Acquire)
    }

    /// Takes every value out of the arena in slot order.
    ///
    /// Returns `None` while any slot is still unwritten, or if the arena
    /// was already drained.
    pub fn drain(&self) -> Option<Vec<T>> {
        if self.written.load(Ordering::Acquire) != self.slots.len() {
            return None;
        }
        if self.drained.swap(true, Ordering::AcqRel) {
            return None;
        }

        // SAFETY: every writer has been consumed by its write (the count
        // reached `len`), so no other reference to any slot exists, and the
        // swap above guarantees this is the only drain.
        self.slots
            .iter()
            .map(|slot| unsafe { (*slot.get()).take() })
            .collect()
    }
}

/// Exclusive write access to one slot of a [`ResultArena`].
pub struct SlotWriter<T> {
    arena: Arc<ResultArena<T>>,
    index: usize,
}

impl<T> SlotWriter<T> {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Stores the value and publishes it to whoever drains the arena.
    pub fn write(self, value: T) {
        // SAFETY: this writer is the only handle to `index` and is consumed
        // here, the arena is not drained until `written` counts this write.
        unsafe {
            *self.arena.slots[self.index].get() = Some(value);
        }
        self.arena.written.fetch_add(1, Ordering::Release);
    }
}
