// Unified trap dispatch: one entry point for every exception, hardware
// interrupt, and syscall. Grounded in
// examples/original_source/xv6/systemCall/trap.c; the interrupt-gate
// vector stubs themselves (`vectors[]`) are generated by an external
// tool and are out of this crate's scope, same as the assembly trap
// entry that calls `trap`.

use crate::mmu::{Gatedesc, Pseudodesc, DPL_USER, SEG_KCODE};
use crate::proc::{mycpu, Trapframe};
use crate::spinlock::Spinlock;
use crate::trap_const::*;
use crate::x86::rcr2;

extern "C" {
    static vectors: [u32; 256];
}

static mut IDT: [Gatedesc; 256] = [Gatedesc::zero(); 256];
pub static mut TICKS: u32 = 0;
pub static mut TICKSLOCK: Spinlock = Spinlock::init_lock("time");

/// Build the interrupt descriptor table: every vector is a kernel-only
/// interrupt gate except the syscall vector, which is a trap gate
/// reachable from user mode (DPL_USER) so `int $T_SYSCALL` doesn't fault.
pub fn trapinit() {
    unsafe {
        for i in 0..256 {
            IDT[i] = Gatedesc::new(false, (SEG_KCODE << 3) as u16, vectors[i], 0);
        }
        IDT[T_SYSCALL as usize] =
            Gatedesc::new(true, (SEG_KCODE << 3) as u16, vectors[T_SYSCALL as usize], DPL_USER);
    }
}

/// Load the IDT register on this CPU. Every CPU must do this
/// individually at boot.
pub fn trapinithart() {
    unsafe {
        let pd = Pseudodesc {
            limit: (core::mem::size_of::<[Gatedesc; 256]>() - 1) as u16,
            base: IDT.as_ptr() as u32,
        };
        crate::x86::lidt(&pd as *const Pseudodesc as *const u8);
    }
}

/// Called by the assembly trap stub with the trap frame it built on the
/// kernel stack. Dispatches on `tf.trapno`, then re-checks the killed
/// flag so a process that was marked killed mid-trap still exits before
/// returning to user mode.
#[no_mangle]
pub extern "C" fn trap(tf: *mut Trapframe) {
    unsafe {
        let p = mycpu().proc;
        if !p.is_null() && (*p).killed {
            crate::proc::exit();
        }

        let tf = &mut *tf;
        match tf.trapno {
            T_SYSCALL => {
                (*p).tf = tf as *mut Trapframe;
                crate::syscall::syscall();
            }
            n if n == T_IRQ0 + IRQ_TIMER => {
                if crate::proc::cpuid() == 0 {
                    TICKSLOCK.acquire();
                    TICKS = TICKS.wrapping_add(1);
                    crate::proc::wakeup(&TICKS as *const u32 as usize);
                    TICKSLOCK.release();
                }
                crate::lapic::eoi();
                if !p.is_null() && (*p).state == crate::proc::Procstate::Running {
                    crate::proc::proc_yield();
                }
            }
            n if n == T_IRQ0 + IRQ_IDE => {
                crate::ide::intr();
                crate::lapic::eoi();
            }
            n if n == T_IRQ0 + IRQ_KBD => {
                crate::kbd::kbdintr();
                crate::lapic::eoi();
            }
            n if n == T_IRQ0 + IRQ_COM1 => {
                crate::uart::intr();
                crate::lapic::eoi();
            }
            n if n == T_IRQ0 + IRQ_SPURIOUS => {
                log::warn!("cpu{}: spurious interrupt at {:x}:{:x}", crate::proc::cpuid(), tf.cs, tf.eip);
                crate::lapic::eoi();
            }
            _ => {
                if p.is_null() || (tf.cs & 3) == 0 {
                    log::error!(
                        "unexpected trap {} from cpu {} eip {:x} (cr2={:#x})",
                        tf.trapno, crate::proc::cpuid(), tf.eip, rcr2()
                    );
                    panic!("trap: unexpected trap in kernel mode");
                } else {
                    let proc = &mut *p;
                    let namelen = proc.name.iter().position(|&b| b == 0).unwrap_or(proc.name.len());
                    log::error!(
                        "pid {} {}: trap {} err {} on cpu {} eip {:#x} addr {:#x} -- kill proc",
                        proc.pid,
                        core::str::from_utf8(&proc.name[..namelen]).unwrap_or("?"),
                        tf.trapno, tf.err, crate::proc::cpuid(), tf.eip, rcr2()
                    );
                    proc.killed = true;
                }
            }
        }

        let p = mycpu().proc;
        if !p.is_null() && (*p).killed {
            crate::proc::exit();
        }
    }
}
