//! Round-robin scheduling of harts over one shared address space.
//!
//! The core itself is single-contextual: a step advances one hart. The
//! scheduler drives the rotation from the two cooperative signals a
//! hart exposes: it steps the front of the ready queue until the step
//! reports `Yielded` (explicit yield call or quantum expiry), then
//! moves it to the back; a hart reporting `Halted` leaves the rotation
//! for good. Priority on a hart is advisory and not consulted here.

use queues::{IsQueue, Queue};

use crate::hart::{Hart, StepOutcome};
use crate::mem::AddressSpace;

#[derive(Debug, Default)]
pub struct Scheduler {
    ready: Queue<Hart>,
    finished: Vec<Hart>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hart to the back of the rotation
    pub fn spawn(&mut self, hart: Hart) {
        self.ready
            .add(hart)
            .expect("insert into queue should work");
    }

    /// Step harts round-robin until all have halted or `max_steps`
    /// instructions have been attempted. Returns the number of steps
    /// spent.
    pub fn run(&mut self, mem: &mut AddressSpace, max_steps: u64) -> u64 {
        let mut steps = 0;
        'rotation: while let Ok(mut hart) = self.ready.remove() {
            loop {
                if steps == max_steps {
                    self.ready
                        .add(hart)
                        .expect("insert into queue should work");
                    break 'rotation;
                }
                steps += 1;
                match hart.step(mem) {
                    StepOutcome::Ran => (),
                    StepOutcome::Yielded => {
                        self.ready
                            .add(hart)
                            .expect("insert into queue should work");
                        break;
                    }
                    StepOutcome::Halted(_) => {
                        self.finished.push(hart);
                        break;
                    }
                }
            }
        }
        steps
    }

    /// True when no hart is left in the rotation
    pub fn idle(&self) -> bool {
        self.ready.size() == 0
    }

    /// Harts that have halted, in the order they stopped
    pub fn finished(&self) -> &[Hart] {
        &self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::*;
    use crate::hart::Trap;
    use crate::mem::DEFAULT_SIZE;

    fn write_instr(mem: &mut AddressSpace, addr: u32, instr: u32) {
        mem.store32(addr, instr).unwrap();
    }

    /// Two harts run the same putchar-then-yield loop with different
    /// argument registers; the console shows strict alternation
    #[test]
    fn check_round_robin_interleaving() -> Result<(), &'static str> {
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        write_instr(&mut mem, 0x00, addi!(x17, x0, 2));
        write_instr(&mut mem, 0x04, ecall!());
        write_instr(&mut mem, 0x08, addi!(x17, x0, 7));
        write_instr(&mut mem, 0x0c, ecall!());
        write_instr(&mut mem, 0x10, jal!(x0, -16));

        let mut a = Hart::new(0);
        a.set_x(10, u32::from(b'A'));
        a.set_tid(0);
        let mut b = Hart::new(0);
        b.set_x(10, u32::from(b'B'));
        b.set_tid(1);

        let mut sched = Scheduler::new();
        sched.spawn(a);
        sched.spawn(b);
        sched.run(&mut mem, 40);

        let output = mem.drain_console();
        assert!(output.starts_with("ABABAB"), "got {output:?}");
        assert!(!sched.idle());
        Ok(())
    }

    /// A halting hart leaves the rotation; the survivor keeps running
    #[test]
    fn check_halted_hart_leaves_rotation() -> Result<(), &'static str> {
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        // Print once, yield, then exit with code 7
        write_instr(&mut mem, 0x00, addi!(x17, x0, 2));
        write_instr(&mut mem, 0x04, ecall!());
        write_instr(&mut mem, 0x08, addi!(x17, x0, 7));
        write_instr(&mut mem, 0x0c, ecall!());
        write_instr(&mut mem, 0x10, addi!(x10, x0, 7));
        write_instr(&mut mem, 0x14, addi!(x17, x0, 0));
        write_instr(&mut mem, 0x18, ecall!());
        // The second program loops forever at 0x40
        write_instr(&mut mem, 0x40, addi!(x17, x0, 7));
        write_instr(&mut mem, 0x44, ecall!());
        write_instr(&mut mem, 0x48, jal!(x0, -8));

        let mut a = Hart::new(0);
        a.set_x(10, u32::from(b'!'));
        let b = Hart::new(0x40);

        let mut sched = Scheduler::new();
        sched.spawn(a);
        sched.spawn(b);
        sched.run(&mut mem, 100);

        assert_eq!(sched.finished().len(), 1);
        let done = &sched.finished()[0];
        assert_eq!(done.exit_code(), 7);
        assert_eq!(done.last_trap(), Trap::None);
        assert_eq!(mem.drain_console(), "!");
        assert!(!sched.idle());
        Ok(())
    }

    /// Quantum expiry rotates a hart even without explicit yields
    #[test]
    fn check_quantum_preemption_rotates() -> Result<(), &'static str> {
        let mut mem = AddressSpace::new(DEFAULT_SIZE);
        write_instr(&mut mem, 0x00, addi!(x17, x0, 2));
        write_instr(&mut mem, 0x04, ecall!());
        write_instr(&mut mem, 0x08, jal!(x0, -8));

        let mut a = Hart::new(0);
        a.set_x(10, u32::from(b'a'));
        a.set_quantum(3);
        let mut b = Hart::new(0);
        b.set_x(10, u32::from(b'b'));
        b.set_quantum(3);

        let mut sched = Scheduler::new();
        sched.spawn(a);
        sched.spawn(b);
        sched.run(&mut mem, 18);

        // Each 3-instruction slice prints exactly one character
        assert_eq!(mem.drain_console(), "ababab");
        Ok(())
    }
}
