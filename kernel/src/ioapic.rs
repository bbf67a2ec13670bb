// I/O APIC: routes interrupts from devices (disk, keyboard, serial) to a
// chosen CPU's local APIC. Grounded in
// examples/original_source/xv6/drivers/ioapic.c.

use crate::trap_const::T_IRQ0;
use core::ptr::{read_volatile, write_volatile};

const IOAPIC_BASE: usize = 0xFEC0_0000;
const REG_ID: u32 = 0x00;
const REG_VER: u32 = 0x01;
const REG_TABLE: u32 = 0x10;
const INT_DISABLED: u32 = 0x0001_0000;

#[repr(C)]
struct IoApicRegs {
    reg: u32,
    pad: [u32; 3],
    data: u32,
}

fn regs() -> *mut IoApicRegs {
    IOAPIC_BASE as *mut IoApicRegs
}

unsafe fn read(reg: u32) -> u32 {
    write_volatile(&mut (*regs()).reg, reg);
    read_volatile(&(*regs()).data)
}

unsafe fn write(reg: u32, data: u32) {
    write_volatile(&mut (*regs()).reg, reg);
    write_volatile(&mut (*regs()).data, data);
}

/// Mask off every redirection entry so nothing arrives before
/// `enable` opts a device in. `ioapicid` is the ID read from the MP
/// table during `mp::init`, used only to sanity-check against the
/// hardware's own idea of its ID.
pub fn init(ioapicid: u8) {
    unsafe {
        let maxintr = (read(REG_VER) >> 16) & 0xFF;
        let id = (read(REG_ID) >> 24) as u8;
        if id != ioapicid {
            log::warn!("ioapic: id mismatch; not a multiprocessor config");
        }

        for i in 0..=maxintr {
            write(REG_TABLE + 2 * i, INT_DISABLED | (T_IRQ0 + i));
            write(REG_TABLE + 2 * i + 1, 0);
        }
    }
}

/// Route `irq` to `cpunum`'s local APIC and unmask it.
pub fn enable(irq: u32, cpunum: u8) {
    unsafe {
        write(REG_TABLE + 2 * irq, T_IRQ0 + irq);
        write(REG_TABLE + 2 * irq + 1, (cpunum as u32) << 24);
    }
}
