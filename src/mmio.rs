//! # Memory-mapped devices
//!
//! The guest sees one device page, `0xf000-0xf010`, inside the address
//! space. Word accesses inside the page never touch the backing store.
//! The layout is part of the guest ABI:
//!
//! | Address | Name | Read | Write |
//! |-------------|-------------|--------------------|----------------------|
//! | 0x0000_f000 | TIMER_READ  | current tick count | ignored              |
//! | 0x0000_f004 | TIMER_ADD   | 0                  | ticks += value       |
//! | 0x0000_f008 | TIMER_RESET | 0                  | ticks = 0            |
//! | 0x0000_f00c | CONSOLE_OUT | 0                  | low byte to console  |
//!
//! Byte reads in the page return 0; byte writes other than to
//! `CONSOLE_OUT` are ignored. The console buffers its bytes; the driver
//! drains the buffer to the host's stdout and flushes.

use queues::{IsQueue, Queue};

pub const DEVICE_BASE: u32 = 0x0000_f000;
pub const TIMER_READ: u32 = 0x0000_f000;
pub const TIMER_ADD: u32 = 0x0000_f004;
pub const TIMER_RESET: u32 = 0x0000_f008;
pub const CONSOLE_OUT: u32 = 0x0000_f00c;
pub const DEVICE_END: u32 = 0x0000_f010;

/// True if the address falls in the device page
pub fn in_device_page(addr: u32) -> bool {
    (DEVICE_BASE..DEVICE_END).contains(&addr)
}

/// Monotonic tick counter. Advanced by the interpreter after each
/// retired instruction, and adjustable by the guest through the
/// TIMER_ADD and TIMER_RESET slots.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    ticks: u32,
}

impl Timer {
    pub fn value(&self) -> u32 {
        self.ticks
    }

    pub fn advance(&mut self, n: u32) {
        self.ticks = self.ticks.wrapping_add(n);
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }
}

/// Byte sink for guest output. Bytes queue up until the driver drains
/// them.
#[derive(Debug, Default)]
pub struct Console {
    out: Queue<char>,
}

impl Console {
    pub fn put(&mut self, byte: u8) {
        self.out
            .add(char::from(byte))
            .expect("insert into queue should work");
    }

    /// Return the buffered output and clear the buffer
    pub fn drain(&mut self) -> String {
        let mut out = String::new();
        while let Ok(ch) = self.out.remove() {
            out.push(ch);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_timer_advance_and_reset() {
        let mut timer = Timer::default();
        timer.advance(3);
        timer.advance(2);
        assert_eq!(timer.value(), 5);
        timer.reset();
        assert_eq!(timer.value(), 0);
    }

    #[test]
    fn check_console_drain_clears() {
        let mut console = Console::default();
        for byte in b"hi" {
            console.put(*byte);
        }
        assert_eq!(console.drain(), "hi");
        assert_eq!(console.drain(), "");
    }

    #[test]
    fn check_device_page_bounds() {
        assert!(in_device_page(TIMER_READ));
        assert!(in_device_page(CONSOLE_OUT));
        assert!(!in_device_page(DEVICE_BASE - 4));
        assert!(!in_device_page(DEVICE_END));
    }
}
