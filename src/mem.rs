//! # Guest address space
//!
//! A flat, byte-addressable, little-endian store of configurable size,
//! shared by every hart the driver attaches to it. Address ranges are
//! listed in the format A-B, where A is the first byte of the region
//! and B is the first byte above it.
//!
//! ## Memory map (default 64 KiB image)
//!
//! | Region | Description |
//! |----------------------|------------------------------------------|
//! | 0x0000-text_end      | code image; `sbrk` never moves below it  |
//! | text_end-0x2000      | free RAM below the initial program break |
//! | 0x2000-brk           | heap, managed by the first-fit free list |
//! | 0xf000-0xf010        | device page (see the mmio module)        |
//!
//! `text_end` is 0 until the loader records the end of the code image.
//! The program break starts at 0x2000 and moves with [`AddressSpace::sbrk`],
//! clamped to `[text_end, size]`.
//!
//! Checks are ordered: alignment, then bounds, then device dispatch,
//! then the backing store. An access that would land in the device page
//! of a smaller image therefore faults on bounds first.

use std::collections::HashMap;

use thiserror::Error;

use crate::alloc::FreeList;
use crate::mmio::{
    in_device_page, Console, Timer, CONSOLE_OUT, TIMER_ADD, TIMER_READ, TIMER_RESET,
};
use crate::opcodes::EBREAK;

/// Default backing store size (64 KiB)
pub const DEFAULT_SIZE: u32 = 64 * 1024;

/// Initial program break; the heap grows up from here
pub const HEAP_BASE: u32 = 8192;

/// Granule by which `malloc` grows the break
const PAGE_SIZE: u32 = 4096;

/// Allocation alignment and split threshold
const ALIGN: u32 = 8;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemFault {
    #[error("misaligned load at address 0x{0:x}")]
    MisalignedLoad(u32),
    #[error("misaligned store at address 0x{0:x}")]
    MisalignedStore(u32),
    #[error("access out of range at address 0x{0:x}")]
    AccessFault(u32),
}

#[derive(Debug, Default)]
pub struct AddressSpace {
    bytes: Vec<u8>,
    text_end: u32,
    brk: u32,
    brk_base: u32,
    heap: FreeList,
    /// Original words behind patched-in software breakpoints
    patched: HashMap<u32, u32>,
    timer: Timer,
    console: Console,
}

impl AddressSpace {
    pub fn new(size: u32) -> Self {
        let brk_base = HEAP_BASE.min(size);
        Self {
            bytes: vec![0; size as usize],
            brk: brk_base,
            brk_base,
            ..Self::default()
        }
    }

    /// True if `width` bytes starting at `addr` fit in the backing store
    fn in_range(&self, addr: u32, width: u32) -> bool {
        u64::from(addr) + u64::from(width) <= self.bytes.len() as u64
    }

    pub fn load32(&self, addr: u32) -> Result<u32, MemFault> {
        if addr & 3 != 0 {
            return Err(MemFault::MisalignedLoad(addr));
        }
        if !self.in_range(addr, 4) {
            return Err(MemFault::AccessFault(addr));
        }
        if in_device_page(addr) {
            return Ok(match addr {
                TIMER_READ => self.timer.value(),
                _ => 0,
            });
        }
        let at = addr as usize;
        Ok(u32::from_le_bytes([
            self.bytes[at],
            self.bytes[at + 1],
            self.bytes[at + 2],
            self.bytes[at + 3],
        ]))
    }

    pub fn store32(&mut self, addr: u32, value: u32) -> Result<(), MemFault> {
        if addr & 3 != 0 {
            return Err(MemFault::MisalignedStore(addr));
        }
        if !self.in_range(addr, 4) {
            return Err(MemFault::AccessFault(addr));
        }
        if in_device_page(addr) {
            match addr {
                TIMER_ADD => self.timer.advance(value),
                TIMER_RESET => self.timer.reset(),
                CONSOLE_OUT => self.console.put((value & 0xff) as u8),
                // TIMER_READ and the rest of the page ignore writes
                _ => (),
            }
            return Ok(());
        }
        let at = addr as usize;
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn load8(&self, addr: u32) -> Result<u8, MemFault> {
        if !self.in_range(addr, 1) {
            return Err(MemFault::AccessFault(addr));
        }
        if in_device_page(addr) {
            return Ok(0);
        }
        Ok(self.bytes[addr as usize])
    }

    pub fn store8(&mut self, addr: u32, value: u8) -> Result<(), MemFault> {
        if !self.in_range(addr, 1) {
            return Err(MemFault::AccessFault(addr));
        }
        if in_device_page(addr) {
            if addr == CONSOLE_OUT {
                self.console.put(value);
            }
            return Ok(());
        }
        self.bytes[addr as usize] = value;
        Ok(())
    }

    /// Move the program break by `delta` bytes and return the old
    /// break. The break is clamped to `[text_end, size]`, so it never
    /// dips below the code image or escapes the backing store.
    pub fn sbrk(&mut self, delta: i32) -> u32 {
        let old = self.brk;
        let target = i64::from(self.brk) + i64::from(delta);
        self.brk = target.clamp(i64::from(self.text_end), self.bytes.len() as i64) as u32;
        old
    }

    /// Record where the loaded code image ends (guards `sbrk`). The
    /// break is lifted if a large image overlaps the initial heap.
    pub fn set_text_end(&mut self, addr: u32) {
        self.text_end = addr.min(self.size());
        self.brk = self.brk.max(self.text_end);
    }

    /// Allocate `nbytes` from the heap, first-fit. Grows the break by
    /// at least a page when no block is big enough. Returns 0 for a
    /// zero-size request or when the address space is exhausted.
    pub fn malloc(&mut self, nbytes: u32) -> u32 {
        if nbytes == 0 {
            return 0;
        }
        let Some(padded) = nbytes.checked_add(ALIGN - 1) else {
            return 0;
        };
        let need = padded & !(ALIGN - 1);
        if let Some(ptr) = self.heap.allocate(need) {
            return ptr;
        }
        let grow = need.max(PAGE_SIZE);
        if grow > i32::MAX as u32 {
            return 0;
        }
        let old = self.sbrk(grow as i32);
        let grown = self.brk - old;
        if grown == 0 {
            return 0;
        }
        self.heap.extend(old, grown);
        self.heap.allocate(need).unwrap_or(0)
    }

    /// Return a block to the heap. Pointers outside `[brk_base, brk)`
    /// or not at a block start are ignored.
    pub fn free(&mut self, ptr: u32) {
        if ptr < self.brk_base || ptr >= self.brk {
            return;
        }
        self.heap.release(ptr);
    }

    /// Toggle a software breakpoint at a word-aligned, in-range
    /// address: the first call saves the original word and patches in
    /// EBREAK, the second restores it. Returns whether the breakpoint
    /// is now armed.
    pub fn toggle_break(&mut self, addr: u32) -> Result<bool, MemFault> {
        if let Some(original) = self.patched.remove(&addr) {
            self.store32(addr, original)?;
            Ok(false)
        } else {
            let original = self.load32(addr)?;
            self.store32(addr, EBREAK)?;
            self.patched.insert(addr, original);
            Ok(true)
        }
    }

    pub fn has_break(&self, addr: u32) -> bool {
        self.patched.contains_key(&addr)
    }

    /// Advance the timer; called by the interpreter with the cost of
    /// each retired instruction
    pub fn tick(&mut self, n: u32) {
        self.timer.advance(n);
    }

    /// Push a byte into the console sink (syscall path; the guest's
    /// MMIO path is a store to CONSOLE_OUT)
    pub fn console_put(&mut self, byte: u8) {
        self.console.put(byte);
    }

    /// Return buffered console output and clear the buffer
    pub fn drain_console(&mut self) -> String {
        self.console.drain()
    }

    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn brk(&self) -> u32 {
        self.brk
    }

    pub fn brk_base(&self) -> u32 {
        self.brk_base
    }

    pub fn text_end(&self) -> u32 {
        self.text_end
    }

    pub fn ticks(&self) -> u32 {
        self.timer.value()
    }

    /// Allocator block list, for inspection
    pub fn heap_blocks(&self) -> &[crate::alloc::Block] {
        self.heap.blocks()
    }
}
