// Physical memory layout, x86.
//
// 0            - real mode ivt, BIOS data
// EXTMEM 0x100000   - extended memory
// end          - start of kernel page allocation area (set by the linker)
// PHYSTOP 0xE000000 - end of physical RAM the kernel manages
// DEVSPACE     - mapped for I/O devices (MMIO)
//
// The kernel's own virtual address is KERNBASE + physical address; every
// process's page directory maps [KERNBASE, KERNBASE+PHYSTOP) and
// [DEVSPACE, 4GiB) identically so the kernel stays addressable no matter
// which process is current. This is the `KBASE` split spec.md refers to.

pub const EXTMEM: usize = 0x0010_0000;
pub const PHYSTOP: usize = 0x0E00_0000;
pub const DEVSPACE: usize = 0xFE00_0000;

pub const KERNBASE: usize = 0x8000_0000;
pub const KERNLINK: usize = KERNBASE + EXTMEM;

pub const fn v2p(a: usize) -> usize {
    a - KERNBASE
}

pub const fn p2v(a: usize) -> usize {
    a + KERNBASE
}
