//! Environment-call interface between guest code and the host.
//!
//! The calling convention is a tiny OS ABI: `a7` carries the call
//! number, `a0` and `a1` carry arguments, and a result (if the call has
//! one) comes back in `a0`. Register mnemonics follow the standard
//! mapping (`a0` = x10, `a1` = x11, `a7` = x17).
//!
//! | id | name      | args            | result in a0 |
//! |----|-----------|-----------------|--------------|
//! | 0  | exit      | code = a0       | -            |
//! | 1  | print_u32 | v = a0          | -            |
//! | 2  | putchar   | ch = a0         | -            |
//! | 3  | sbrk      | delta = a0      | old break    |
//! | 4  | write_str | ptr = a0, len = a1 | -         |
//! | 5  | malloc    | n = a0          | pointer or 0 |
//! | 6  | free      | p = a0          | -            |
//! | 7  | yield     | -               | -            |
//! | 8  | get_time  | -               | ticks        |
//!
//! An unknown id halts the calling hart with exit code -1.

use crate::hart::Hart;
use crate::mem::AddressSpace;
use crate::utils::{interpret_i32_as_unsigned, interpret_u32_as_signed};

pub const SYS_EXIT: u32 = 0;
pub const SYS_PRINT_U32: u32 = 1;
pub const SYS_PUTCHAR: u32 = 2;
pub const SYS_SBRK: u32 = 3;
pub const SYS_WRITE_STR: u32 = 4;
pub const SYS_MALLOC: u32 = 5;
pub const SYS_FREE: u32 = 6;
pub const SYS_YIELD: u32 = 7;
pub const SYS_GET_TIME: u32 = 8;

pub const REG_A0: u8 = 10;
pub const REG_A1: u8 = 11;
pub const REG_A7: u8 = 17;

/// Dispatch the environment call currently staged in the hart's
/// argument registers. Output bytes go to the address space's console
/// sink; the driver drains them to the host.
pub fn handle_ecall(hart: &mut Hart, mem: &mut AddressSpace) {
    let a0 = hart.x(REG_A0);
    let a1 = hart.x(REG_A1);
    match hart.x(REG_A7) {
        SYS_EXIT => hart.halt(a0),
        SYS_PRINT_U32 => {
            for byte in format!("{a0}\n").bytes() {
                mem.console_put(byte);
            }
        }
        SYS_PUTCHAR => mem.console_put((a0 & 0xff) as u8),
        SYS_SBRK => {
            let old = mem.sbrk(interpret_u32_as_signed(a0));
            hart.set_x(REG_A0, old);
        }
        SYS_WRITE_STR => {
            // Copy len bytes out of guest memory; a byte that runs off
            // the end of the address space truncates the write
            for offset in 0..a1 {
                match mem.load8(a0.wrapping_add(offset)) {
                    Ok(byte) => mem.console_put(byte),
                    Err(_) => break,
                }
            }
        }
        SYS_MALLOC => {
            let ptr = mem.malloc(a0);
            hart.set_x(REG_A0, ptr);
        }
        SYS_FREE => mem.free(a0),
        SYS_YIELD => hart.set_yielded(),
        SYS_GET_TIME => hart.set_x(REG_A0, mem.ticks()),
        _ => hart.halt(interpret_i32_as_unsigned(-1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::DEFAULT_SIZE;

    fn stage(hart: &mut Hart, id: u32, a0: u32, a1: u32) {
        hart.set_x(REG_A7, id);
        hart.set_x(REG_A0, a0);
        hart.set_x(REG_A1, a1);
    }

    #[test]
    fn check_exit_sets_code_and_halts() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        stage(&mut hart, SYS_EXIT, 3, 0);
        handle_ecall(&mut hart, &mut mem);
        assert!(hart.halted());
        assert_eq!(hart.exit_code(), 3);
    }

    #[test]
    fn check_print_u32_is_decimal_with_newline() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        stage(&mut hart, SYS_PRINT_U32, 5050, 0);
        handle_ecall(&mut hart, &mut mem);
        assert_eq!(mem.drain_console(), "5050\n");
    }

    #[test]
    fn check_putchar_takes_low_byte() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        stage(&mut hart, SYS_PUTCHAR, 0x1200 + u32::from(b'A'), 0);
        handle_ecall(&mut hart, &mut mem);
        assert_eq!(mem.drain_console(), "A");
    }

    #[test]
    fn check_sbrk_returns_old_break_in_a0() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        let before = mem.brk();
        stage(&mut hart, SYS_SBRK, 64, 0);
        handle_ecall(&mut hart, &mut mem);
        assert_eq!(hart.x(REG_A0), before);
        assert_eq!(mem.brk(), before + 64);
    }

    #[test]
    fn check_write_str_copies_guest_bytes() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        let message = b"Hello from user space!\n";
        for (offset, byte) in message.iter().enumerate() {
            mem.store8(0x200 + offset as u32, *byte).unwrap();
        }
        stage(&mut hart, SYS_WRITE_STR, 0x200, message.len() as u32);
        handle_ecall(&mut hart, &mut mem);
        assert_eq!(mem.drain_console(), "Hello from user space!\n");
    }

    #[test]
    fn check_write_str_truncates_at_end_of_memory() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        let base = mem.size() - 2;
        mem.store8(base, b'o').unwrap();
        mem.store8(base + 1, b'k').unwrap();
        stage(&mut hart, SYS_WRITE_STR, base, 10);
        handle_ecall(&mut hart, &mut mem);
        assert_eq!(mem.drain_console(), "ok");
        assert!(!hart.halted());
    }

    #[test]
    fn check_malloc_and_free() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        stage(&mut hart, SYS_MALLOC, 16, 0);
        handle_ecall(&mut hart, &mut mem);
        let p1 = hart.x(REG_A0);
        assert!(p1 >= mem.brk_base());
        stage(&mut hart, SYS_FREE, p1, 0);
        handle_ecall(&mut hart, &mut mem);
        stage(&mut hart, SYS_MALLOC, 16, 0);
        handle_ecall(&mut hart, &mut mem);
        assert_eq!(hart.x(REG_A0), p1);
    }

    #[test]
    fn check_yield_flags_the_hart() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        stage(&mut hart, SYS_YIELD, 0, 0);
        handle_ecall(&mut hart, &mut mem);
        assert!(hart.yielded());
    }

    #[test]
    fn check_get_time_reads_the_timer() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        mem.tick(42);
        stage(&mut hart, SYS_GET_TIME, 0, 0);
        handle_ecall(&mut hart, &mut mem);
        assert_eq!(hart.x(REG_A0), 42);
    }

    #[test]
    fn check_unknown_id_halts_with_minus_one() {
        let mut hart = Hart::new(0);
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        stage(&mut hart, 99, 0, 0);
        handle_ecall(&mut hart, &mut mem);
        assert!(hart.halted());
        assert_eq!(hart.exit_code(), 0xffff_ffff);
    }
}
