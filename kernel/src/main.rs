// Kernel entry point and boot sequence. Grounded in
// examples/original_source/xv6/main.c for init order, restructured
// around the teacher's cpuid()-branching `kmain` (kernel/src/main.rs).
// Bringing up application processors (`startothers`/`entryother.S` in
// the original) needs a real-mode-to-protected-mode assembly trampoline
// copied to low memory; that, like the trap vector stubs and `swtch`,
// is an external assembly collaborator outside this crate's scope, so
// this kernel boots and schedules on CPU 0 only.

#![no_std]
#![no_main]

mod bio;
mod buf;
mod console;
mod elf;
mod exec;
mod file;
mod fs;
mod fslog;
mod ide;
mod initcode;
mod ioapic;
mod kalloc;
mod kbd;
mod lapic;
mod memlayout;
mod mmu;
mod mp;
mod param;
mod picirq;
mod pipe;
mod printf;
mod proc;
mod sleeplock;
mod spinlock;
mod stat;
mod string;
mod syscall;
mod trap;
mod trap_const;
mod uart;
mod vm;
mod x86;

use core::sync::atomic::{AtomicBool, Ordering};

extern "C" {
    // First address past the loaded kernel image, set by the linker
    // script; everything up to PHYSTOP is free for the page allocator.
    static end: u8;
}

static STARTED: AtomicBool = AtomicBool::new(false);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    unsafe {
        printf::PRINTER.stop_locking();
    }
    printf!("lapicid {}: panic: ", lapic::id());
    if let Some(loc) = info.location() {
        printf!("{}:{}: ", loc.file(), loc.line());
    }
    printf!("{}\n", info.message());
    loop {
        x86::hlt();
    }
}

// Bootstrap processor entry point, called by an external assembly stub
// once it has switched into protected mode and built a temporary page
// table mapping both low memory and KERNBASE (`entry.S`/`entrypgdir` in
// the original -- outside this crate's scope). Application processors
// would join here too, branching on `proc::cpuid()`, but bringing them
// up needs `entryother.S` copied to low memory and is likewise out of
// scope, so `STARTED` and the AP branch that would wait on it are not
// wired up: this kernel always runs single-CPU.
#[no_mangle]
pub extern "C" fn kmain() {
    printf!("\nxv6 kernel is booting\n\n");

    unsafe {
        kalloc::KMem::kinit(&end as *const u8 as usize);
    }
    vm::switchkvm(vm::setup_kernel_vm().expect("kmain: out of memory for kernel page table"));
    mp::init();
    unsafe {
        proc::NCPU_ACTIVE = mp::NCPU_FOUND;
    }
    lapic::init();
    proc::seginit();
    picirq::init();
    unsafe {
        ioapic::init(mp::IOAPIC_ID);
    }
    uart::init();
    console::init();
    printf::init();
    proc::pinit();
    trap::trapinit();
    trap::trapinithart();
    bio::binit();
    file::fileinit();
    ide::init();

    proc::userinit();

    core::sync::atomic::fence(Ordering::SeqCst);
    STARTED.store(true, Ordering::Relaxed);

    proc::scheduler();
}
