//! The instruction heap.
//!
//! The heap is an append-only buffer of `i32` instruction words. Compiled
//! blocks are addressed through handles into a table, so a block keeps its
//! identity while compaction moves its words:
//!
//! ```text
//! table: | offset | info = state | scope_size << 2 | size | ...
//!          handle    handle + 1                      handle + 2
//! ```
//!
//! Addresses returned by [`Heap::get_addr`] are only valid until the next
//! [`Heap::compact`].

use core::mem;
use anyhow::{Result, anyhow, ensure};
use log::debug;
use serde::{Deserialize, Serialize};

/// Words the buffer grows by when full.
pub const PAGE_SIZE: usize = 0x0010_0000;
/// Value written into operand slots that are patched later.
pub const PLACEHOLDER_WORD: i32 = i32::MAX;
/// The handle used while a block is still compiling.
pub const PLACEHOLDER_HANDLE: i32 = -1;

const ENTRY_SIZE: usize = 3;
const INFO_OFFSET: usize = 1;
const SIZE_OFFSET: usize = 2;
const STATE_MASK: i32 = 0b11;

/// Lifecycle state of a table entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum TableSlotState {
    /// Live compiled code.
    Allocated = 0,
    /// Released, reclaimed on the next compaction.
    Freed = 1,
    /// Reclaimed.
    Purged = 2,
    /// An alias to an address inside another entry.
    Pointer = 3,
}

impl TableSlotState {
    const fn from_info(info: i32) -> Self {
        match info & STATE_MASK {
            0 => Self::Allocated,
            1 => Self::Freed,
            2 => Self::Purged,
            _ => Self::Pointer,
        }
    }
}

const fn encode_table_info(scope_size: i32, state: TableSlotState) -> i32 {
    state as i32 | (scope_size << 2)
}

const fn change_state(info: i32, state: TableSlotState) -> i32 {
    (info & !STATE_MASK) | state as i32
}

/// The well-known routines patched into placeholder operands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StdlibOperand {
    /// Entry point of a top-level component render.
    Main,
    /// Append a value, inserting strings as HTML.
    TrustingAppend,
    /// Append a value, inserting strings as text.
    CautiousAppend,
}

/// Handles of the compiled stdlib routines.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdlibHandles {
    /// Handle of the main routine.
    pub main: i32,
    /// Handle of the trusting append routine.
    pub trusting_append: i32,
    /// Handle of the cautious append routine.
    pub cautious_append: i32,
}

impl StdlibHandles {
    /// The handle for `operand`.
    pub const fn get(&self, operand: StdlibOperand) -> i32 {
        match operand {
            StdlibOperand::Main => self.main,
            StdlibOperand::TrustingAppend => self.trusting_append,
            StdlibOperand::CautiousAppend => self.cautious_append,
        }
    }
}

/// A deferred operand computed once compilation finishes.
type Placeholder = Box<dyn FnOnce() -> i32>;

/// A heap snapshot that can be serialized and rehydrated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedHeap {
    /// The next handle to be issued.
    pub handle: i32,
    /// The handle table.
    pub table: Vec<i32>,
    /// The used part of the instruction buffer.
    pub buffer: Vec<i32>,
}

/// The growable instruction buffer plus its handle table.
pub struct Heap {
    heap: Vec<i32>,
    offset: usize,
    capacity: usize,
    page_size: usize,
    handle: i32,
    table: Vec<i32>,
    placeholders: Vec<(usize, Placeholder)>,
    stdlibs: Vec<(usize, StdlibOperand)>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Create a heap that grows by [`PAGE_SIZE`] words.
    #[inline]
    pub fn new() -> Self {
        Self::with_page_size(PAGE_SIZE)
    }

    /// Create a heap that grows by `page_size` words.
    pub fn with_page_size(page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            heap: vec![0; page_size],
            offset: 0,
            capacity: page_size,
            page_size,
            handle: 0,
            table: Vec::new(),
            placeholders: Vec::new(),
            stdlibs: Vec::new(),
        }
    }

    /// Rehydrate a heap from a snapshot.
    pub fn from_serialized(serialized: SerializedHeap) -> Self {
        let offset = serialized.buffer.len();
        let mut heap = Self::with_page_size(PAGE_SIZE);
        heap.heap = serialized.buffer;
        heap.offset = offset;
        heap.capacity = 0;
        heap.handle = serialized.handle;
        heap.table = serialized.table;
        heap
    }

    fn size_check(&mut self) {
        if self.capacity == 0 {
            self.heap.truncate(self.offset);
            self.heap.resize(self.offset + self.page_size, 0);
            self.capacity = self.page_size;
            debug!(target: "trellis::heap", "grew heap to {} words", self.heap.len());
        }
        self.capacity -= 1;
    }

    /// Append a word.
    pub fn push(&mut self, word: i32) {
        self.size_check();
        self.heap[self.offset] = word;
        self.offset += 1;
    }

    /// Read the word at `address`; out-of-range reads are zero.
    #[inline]
    pub fn get_by_addr(&self, address: usize) -> i32 {
        self.heap.get(address).copied().unwrap_or_default()
    }

    /// Overwrite the word at `address`.
    ///
    /// # Errors
    /// Returns an error if `address` was never written.
    pub fn set_by_addr(&mut self, address: usize, word: i32) -> Result<()> {
        ensure!(address < self.offset, "heap address {address} is out of bounds");
        self.heap[address] = word;
        Ok(())
    }

    /// Reserve a handle whose code starts at the current offset.
    pub fn malloc(&mut self) -> i32 {
        self.table.extend([self.offset as i32, 0, 0]);
        let handle = self.handle;
        self.handle += ENTRY_SIZE as i32;
        handle
    }

    /// Finalize the entry for `handle` with the code written since
    /// [`Heap::malloc`].
    pub fn finish_malloc(&mut self, handle: i32, scope_size: i32) {
        let index = handle as usize;
        let start = self.table.get(index).copied().unwrap_or_default();
        if let Some(info) = self.table.get_mut(index + INFO_OFFSET) {
            *info = encode_table_info(scope_size, TableSlotState::Allocated);
        }
        if let Some(size) = self.table.get_mut(index + SIZE_OFFSET) {
            *size = self.offset as i32 - start;
        }
    }

    /// Number of words written.
    #[inline]
    pub const fn size(&self) -> usize {
        self.offset
    }

    /// The address of the code behind `handle`.
    ///
    /// # Errors
    /// Returns an error for handles that were never issued.
    pub fn get_addr(&self, handle: i32) -> Result<usize> {
        usize::try_from(handle)
            .ok()
            .and_then(|index| self.table.get(index))
            .map(|address| *address as usize)
            .ok_or_else(|| anyhow!("unknown heap handle {handle}"))
    }

    /// Issue a pointer handle for a raw `address`.
    pub fn get_handle(&mut self, address: usize) -> i32 {
        self.table.extend([
            address as i32,
            encode_table_info(0, TableSlotState::Pointer),
            0,
        ]);
        let handle = self.handle;
        self.handle += ENTRY_SIZE as i32;
        handle
    }

    /// The number of local slots the code behind `handle` needs.
    pub fn scope_size_of(&self, handle: i32) -> i32 {
        self.info(handle) >> 2
    }

    /// The words of code behind `handle`.
    pub fn size_of(&self, handle: i32) -> i32 {
        self.entry(handle, SIZE_OFFSET)
    }

    /// The lifecycle state of `handle`.
    pub fn state_of(&self, handle: i32) -> TableSlotState {
        TableSlotState::from_info(self.info(handle))
    }

    fn info(&self, handle: i32) -> i32 {
        self.entry(handle, INFO_OFFSET)
    }

    fn entry(&self, handle: i32, field: usize) -> i32 {
        usize::try_from(handle)
            .ok()
            .and_then(|index| self.table.get(index + field))
            .copied()
            .unwrap_or_default()
    }

    /// Release the code behind `handle`. The words are reclaimed by the
    /// next [`Heap::compact`].
    pub fn free(&mut self, handle: i32) {
        if let Some(info) = usize::try_from(handle)
            .ok()
            .and_then(|index| self.table.get_mut(index + INFO_OFFSET))
        {
            *info = change_state(*info, TableSlotState::Freed);
        }
    }

    /// Mark-compact: shift live code down over freed code and rewrite the
    /// table offsets.
    pub fn compact(&mut self) {
        let mut compacted = 0_usize;
        for entry in (0..self.table.len()).step_by(ENTRY_SIZE) {
            let offset = self.table[entry] as usize;
            let info = self.table[entry + INFO_OFFSET];
            let size = self.table[entry + SIZE_OFFSET] as usize;

            match TableSlotState::from_info(info) {
                TableSlotState::Purged => {}
                TableSlotState::Freed => {
                    self.table[entry + INFO_OFFSET] = change_state(info, TableSlotState::Purged);
                    compacted += size;
                }
                TableSlotState::Allocated => {
                    if compacted > 0 {
                        self.heap
                            .copy_within(offset..offset + size, offset - compacted);
                    }
                    self.table[entry] = (offset - compacted) as i32;
                }
                TableSlotState::Pointer => {
                    self.table[entry] = (offset - compacted) as i32;
                }
            }
        }
        self.offset -= compacted;
        self.capacity += compacted;
        debug!(target: "trellis::heap", "compacted {compacted} words, {} remain", self.offset);
    }

    /// Append a word that is computed later by `resolve`.
    pub fn push_placeholder<F>(&mut self, resolve: F)
    where
        F: FnOnce() -> i32 + 'static,
    {
        let address = self.offset;
        self.push(PLACEHOLDER_WORD);
        self.placeholders.push((address, Box::new(resolve)));
    }

    /// Append a word that will hold the handle of a stdlib routine.
    pub fn push_stdlib(&mut self, operand: StdlibOperand) {
        let address = self.offset;
        self.push(PLACEHOLDER_WORD);
        self.stdlibs.push((address, operand));
    }

    /// Fill in every pending placeholder.
    pub fn patch_placeholders(&mut self) {
        for (address, resolve) in mem::take(&mut self.placeholders) {
            self.heap[address] = resolve();
        }
    }

    /// Fill in every pending stdlib reference.
    pub fn patch_stdlibs(&mut self, stdlib: &StdlibHandles) {
        for (address, operand) in mem::take(&mut self.stdlibs) {
            self.heap[address] = stdlib.get(operand);
        }
    }

    /// Patch everything and snapshot the used part of the heap.
    pub fn capture(&mut self, stdlib: &StdlibHandles) -> SerializedHeap {
        self.patch_placeholders();
        self.patch_stdlibs(stdlib);
        SerializedHeap {
            handle: self.handle,
            table: self.table.clone(),
            buffer: self.heap[..self.offset].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(heap: &mut Heap, words: &[i32], scope_size: i32) -> i32 {
        let handle = heap.malloc();
        for word in words {
            heap.push(*word);
        }
        heap.finish_malloc(handle, scope_size);
        handle
    }

    /// Test that handles step through the table and record metadata.
    ///
    /// # Panics
    /// Panics if table entries are misplaced.
    #[test]
    fn malloc_records_entries() -> Result<()> {
        let mut heap = Heap::with_page_size(4);
        let first = block(&mut heap, &[1, 2, 3], 2);
        let second = block(&mut heap, &[4, 5], 0);

        assert_eq!(first, 0);
        assert_eq!(second, 3);
        assert_eq!(heap.get_addr(second)?, 3);
        assert_eq!(heap.scope_size_of(first), 2);
        assert_eq!(heap.size_of(first), 3);
        assert_eq!(heap.state_of(first), TableSlotState::Allocated);
        assert!(heap.get_addr(99).is_err());
        Ok(())
    }

    /// Test growth past the first page.
    ///
    /// # Panics
    /// Panics if words written after growth are lost.
    #[test]
    fn grows_by_pages() {
        let mut heap = Heap::with_page_size(2);
        for word in 0..7 {
            heap.push(word);
        }
        assert_eq!(heap.size(), 7);
        assert_eq!(heap.get_by_addr(6), 6);
        assert_eq!(heap.get_by_addr(0), 0);
    }

    /// Test that compaction keeps live code reachable through its handle.
    ///
    /// # Panics
    /// Panics if live code moves without its table entry.
    #[test]
    fn compaction_preserves_handles() -> Result<()> {
        let mut heap = Heap::with_page_size(16);
        let dead = block(&mut heap, &[9, 9, 9], 0);
        let live = block(&mut heap, &[7, 8], 1);
        let pointer = heap.get_handle(heap.get_addr(live)? + 1);

        heap.free(dead);
        assert_eq!(heap.state_of(dead), TableSlotState::Freed);
        heap.compact();

        assert_eq!(heap.state_of(dead), TableSlotState::Purged);
        assert_eq!(heap.size(), 2);
        let address = heap.get_addr(live)?;
        assert_eq!(address, 0);
        assert_eq!(heap.get_by_addr(address), 7);
        assert_eq!(heap.get_by_addr(heap.get_addr(pointer)?), 8);
        assert_eq!(heap.scope_size_of(live), 1);
        Ok(())
    }

    /// Test patching of stdlib and placeholder operands.
    ///
    /// # Panics
    /// Panics if a patched word keeps the placeholder value.
    #[test]
    fn patches_deferred_operands() {
        let mut heap = Heap::with_page_size(8);
        heap.push_stdlib(StdlibOperand::CautiousAppend);
        heap.push_placeholder(|| 42);
        assert_eq!(heap.get_by_addr(0), PLACEHOLDER_WORD);

        let stdlib = StdlibHandles {
            main: 0,
            trusting_append: 3,
            cautious_append: 6,
        };
        let captured = heap.capture(&stdlib);
        assert_eq!(captured.buffer, vec![6, 42]);

        let restored = Heap::from_serialized(captured);
        assert_eq!(restored.get_by_addr(1), 42);
        assert_eq!(restored.size(), 2);
    }
}
