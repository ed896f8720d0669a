//! Flat word-addressed memory with per-address observers.
//!
//! Every address owns at most one observer slot. Writes fire the observer
//! after the store completes; reads give the observer a chance to supply
//! the value instead (this is how memory-mapped device registers work).
//! Bulk loads never fire observers.
//!
//! Observers are handed the stored value only, never the memory itself, so
//! a callback cannot write back into the address that triggered it.

use thiserror::Error;

/// A 16-bit machine word.
pub type Word = u16;

/// The number of words in the emulator's address space.
pub const MEMORY_SIZE: usize = 0x1_0000;

/// Something that reacts to traffic on a single memory address.
///
/// Plain closures taking the stored value implement this for the write side.
pub trait Observer {
    /// Called after a word has been stored at the watched address.
    fn on_write(&mut self, value: Word);

    /// Called before the watched address is read. Returning `Some` replaces
    /// the stored word for this read.
    fn on_read(&mut self) -> Option<Word> {
        None
    }
}

impl<F: FnMut(Word)> Observer for F {
    fn on_write(&mut self, value: Word) {
        self(value)
    }
}

type Slot = Option<Box<dyn Observer>>;

/// Word-addressed memory.
pub struct Memory {
    cells: Vec<Word>,
    observers: Vec<Slot>,
}

impl Memory {
    /// Create a full 64K-word memory with all cells zeroed.
    pub fn new() -> Self {
        Self::with_capacity(MEMORY_SIZE)
    }

    /// Create a memory of `capacity` words.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut observers = Vec::with_capacity(capacity);
        observers.resize_with(capacity, || None);
        Self {
            cells: vec![0; capacity],
            observers,
        }
    }

    /// Number of addressable words.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn check(&self, addr: usize) -> Result<(), MemoryError> {
        if addr >= self.cells.len() {
            return Err(MemoryError::OutOfRange {
                addr,
                capacity: self.cells.len(),
            });
        }
        Ok(())
    }

    /// Read a word, consulting the address's observer first.
    pub fn read(&mut self, addr: usize) -> Result<Word, MemoryError> {
        self.check(addr)?;
        if let Some(value) = self.observers[addr].as_mut().and_then(|o| o.on_read()) {
            return Ok(value);
        }
        Ok(self.cells[addr])
    }

    /// Read the stored word without involving any observer.
    #[inline]
    pub fn peek(&self, addr: usize) -> Result<Word, MemoryError> {
        self.check(addr)?;
        Ok(self.cells[addr])
    }

    /// Store `value` (masked to 16 bits), then fire the address's observer.
    pub fn write(&mut self, addr: usize, value: u32) -> Result<(), MemoryError> {
        self.check(addr)?;
        let value = (value & 0xFFFF) as Word;
        self.cells[addr] = value;

        if let Some(observer) = self.observers[addr].as_mut() {
            observer.on_write(value);
        }
        Ok(())
    }

    /// Copy `words` into memory starting at `offset`. Observers do not fire.
    pub fn load(&mut self, offset: usize, words: &[Word]) -> Result<(), MemoryError> {
        self.check(offset)?;
        let available = self.cells.len() - offset;
        if words.len() > available {
            return Err(MemoryError::ProgramTooLarge {
                size: words.len(),
                available,
            });
        }
        self.cells[offset..offset + words.len()].copy_from_slice(words);
        Ok(())
    }

    /// Install the observer for `addr`, replacing any previous one.
    pub fn watch<O: Observer + 'static>(&mut self, addr: usize, observer: O) -> Result<(), MemoryError> {
        self.check(addr)?;
        self.observers[addr] = Some(Box::new(observer));
        Ok(())
    }

    /// Remove the observer for `addr`, if any.
    pub fn unwatch(&mut self, addr: usize) -> Result<(), MemoryError> {
        self.check(addr)?;
        self.observers[addr] = None;
        Ok(())
    }

    /// Whether an observer is installed at `addr`.
    pub fn is_watched(&self, addr: usize) -> bool {
        self.observers.get(addr).is_some_and(Option::is_some)
    }

    /// Zero every cell. Observers stay installed.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(self.cells.len());
        (start.min(end)..end).map(|i| (i, self.cells[i])).collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&w| w != 0).count();
        let watched = self.observers.iter().filter(|slot| slot.is_some()).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("watched_cells", &watched)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Address is outside valid memory range.
    #[error("memory address {addr:#06x} out of range (capacity {capacity})")]
    OutOfRange { addr: usize, capacity: usize },

    /// Program is too large to fit in memory.
    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}
