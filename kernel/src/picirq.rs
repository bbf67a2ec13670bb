// Disables the legacy 8259A PIC pair so the local/IO APIC has sole
// control of interrupt delivery. Grounded in
// examples/original_source/xv6/drivers/picirq.c.

use crate::x86::outb;

const IO_PIC1: u16 = 0x20;
const IO_PIC2: u16 = 0xA0;

pub fn init() {
    outb(IO_PIC1 + 1, 0xFF);
    outb(IO_PIC2 + 1, 0xFF);
}
