// Local APIC: the per-CPU interrupt controller used for the timer tick,
// inter-processor interrupts, and waking application processors at boot.
// Grounded in examples/original_source/xv6/drivers/lapic.c; register
// offsets (lapic.h was not carried into the retrieval pack) are the
// standard xv6 constants, divided by 4 to index the memory-mapped
// register array.

use crate::trap_const::{IRQ_ERROR, IRQ_SPURIOUS, IRQ_TIMER, T_IRQ0};
use crate::x86::{inb, outb};
use core::ptr::{read_volatile, write_volatile};

const ID: isize = 0x0020 / 4;
const VER: isize = 0x0030 / 4;
const TPR: isize = 0x0080 / 4;
const EOI: isize = 0x00B0 / 4;
const SVR: isize = 0x00F0 / 4;
const ENABLE: u32 = 0x0000_0100;
const ESR: isize = 0x0280 / 4;
const ICRLO: isize = 0x0300 / 4;
const INIT: u32 = 0x0000_0500;
const STARTUP: u32 = 0x0000_0600;
const DELIVS: u32 = 0x0000_1000;
const ASSERT: u32 = 0x0000_4000;
const LEVEL: u32 = 0x0000_8000;
const BCAST: u32 = 0x0008_0000;
const ICRHI: isize = 0x0310 / 4;
const TIMER: isize = 0x0320 / 4;
const X1: u32 = 0x0000_000B;
const PERIODIC: u32 = 0x0002_0000;
const PCINT: isize = 0x0340 / 4;
const LINT0: isize = 0x0350 / 4;
const LINT1: isize = 0x0360 / 4;
const ERROR: isize = 0x0370 / 4;
const MASKED: u32 = 0x0001_0000;
const TICR: isize = 0x0380 / 4;
const TDCR: isize = 0x03E0 / 4;

/// Memory-mapped base of the local APIC register block, set from the MP
/// configuration table by `mp::init`. Null means no local APIC was
/// found, and every operation below becomes a no-op — matching
/// original xv6's tolerance for booting single-CPU under an emulator
/// without one.
pub static mut LAPIC: *mut u32 = core::ptr::null_mut();

unsafe fn lapicw(index: isize, value: u32) {
    write_volatile(LAPIC.offset(index), value);
    read_volatile(LAPIC.offset(ID)); // wait for the write to land
}

pub fn init() {
    unsafe {
        if LAPIC.is_null() {
            return;
        }

        lapicw(SVR, ENABLE | (T_IRQ0 + IRQ_SPURIOUS));

        lapicw(TDCR, X1);
        lapicw(TIMER, PERIODIC | (T_IRQ0 + IRQ_TIMER));
        lapicw(TICR, 10_000_000);

        lapicw(LINT0, MASKED);
        lapicw(LINT1, MASKED);

        if (read_volatile(LAPIC.offset(VER)) >> 16) & 0xFF >= 4 {
            lapicw(PCINT, MASKED);
        }

        lapicw(ERROR, T_IRQ0 + IRQ_ERROR);

        lapicw(ESR, 0);
        lapicw(ESR, 0);

        lapicw(EOI, 0);

        lapicw(ICRHI, 0);
        lapicw(ICRLO, BCAST | INIT | LEVEL);
        while read_volatile(LAPIC.offset(ICRLO)) & DELIVS != 0 {}

        lapicw(TPR, 0);
    }
}

/// This CPU's local APIC ID, or 0 if there is no local APIC (uniprocessor
/// fallback — `cpuid()` then always resolves to CPU 0).
pub fn id() -> u8 {
    unsafe {
        if LAPIC.is_null() {
            return 0;
        }
        (read_volatile(LAPIC.offset(ID)) >> 24) as u8
    }
}

/// Acknowledge the interrupt currently being serviced.
pub fn eoi() {
    unsafe {
        if !LAPIC.is_null() {
            lapicw(EOI, 0);
        }
    }
}

fn microdelay(_us: u32) {}

const CMOS_PORT: u16 = 0x70;

/// Boot an application processor at `addr` (a 4 KiB-aligned entry point
/// reachable in real mode) by writing the warm-reset vector and sending
/// the INIT/STARTUP IPI sequence from the Intel MP startup algorithm.
pub fn startap(apicid: u8, addr: u32) {
    outb(CMOS_PORT, 0xF);
    outb(CMOS_PORT + 1, 0x0A);

    let wrv = crate::memlayout::p2v((0x40 << 4) | 0x67) as *mut u16;
    unsafe {
        write_volatile(wrv, 0);
        write_volatile(wrv.add(1), (addr >> 4) as u16);

        lapicw(ICRHI, (apicid as u32) << 24);
        lapicw(ICRLO, INIT | LEVEL | ASSERT);
        microdelay(200);
        lapicw(ICRLO, INIT | LEVEL);
        microdelay(100);

        for _ in 0..2 {
            lapicw(ICRHI, (apicid as u32) << 24);
            lapicw(ICRLO, STARTUP | (addr >> 12));
            microdelay(200);
        }
    }
}
