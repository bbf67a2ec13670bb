// Mutual-exclusion spin locks, with nested interrupt disabling on the
// owning CPU. Ported from the teacher's RISC-V `Spinlock`
// (examples/LENSHOOD-xv6-rust/src/kernel/spinlock.rs) onto the x86 atomic
// exchange and push_off/pop_off discipline in
// examples/original_source/xv6/synchronization/spinlock.c.

use crate::proc::mycpu;
use crate::x86::{intr_enabled, xchg};
use core::sync::atomic::{fence, Ordering};

#[derive(Copy, Clone)]
pub struct Spinlock {
    locked: u32,
    name: &'static str,
    cpu: Option<usize>, // apicid-independent: index into CPUS of the holder
}

impl Spinlock {
    pub const fn init_lock(name: &'static str) -> Self {
        Spinlock {
            locked: 0,
            name,
            cpu: None,
        }
    }

    /// Acquire the lock. Spins until it becomes free. Disables interrupts
    /// on this CPU for the duration (possibly nested with other held
    /// locks) to avoid a deadlock against an interrupt handler that wants
    /// the same lock.
    pub fn acquire(&mut self) {
        push_off();
        if self.holding() {
            panic!("acquire: {}", self.name);
        }

        while xchg(&mut self.locked, 1) != 0 {
            core::hint::spin_loop();
        }

        fence(Ordering::SeqCst);
        self.cpu = Some(mycpu_index());
    }

    pub fn release(&mut self) {
        if !self.holding() {
            panic!("release: {}", self.name);
        }

        self.cpu = None;
        fence(Ordering::SeqCst);
        self.locked = 0;

        pop_off();
    }

    /// True iff the calling CPU holds the lock. Caller must have
    /// interrupts disabled, or the answer may be stale by the time it is
    /// read.
    pub fn holding(&self) -> bool {
        self.locked != 0 && self.cpu == Some(mycpu_index())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

fn mycpu_index() -> usize {
    mycpu().id
}

/// push_off/pop_off are like cli/sti except matched: it takes as many
/// pop_off()s as push_off()s to re-enable interrupts. If interrupts were
/// already off on entry, the balance leaves them off.
pub fn push_off() {
    let old = intr_enabled();
    crate::x86::cli();

    let c = mycpu();
    if c.noff == 0 {
        c.intena = old;
    }
    c.noff += 1;
}

pub fn pop_off() {
    if intr_enabled() {
        panic!("pop_off - interruptible");
    }

    let c = mycpu();
    if c.noff == 0 {
        panic!("pop_off");
    }
    c.noff -= 1;
    if c.noff == 0 && c.intena {
        crate::x86::sti();
    }
}
