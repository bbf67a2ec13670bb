// Per-process and kernel virtual memory: page-directory/page-table
// management, the user/kernel mapping split, and the copy primitives the
// fork/exec/grow/shrink paths share. Ported from the teacher's vm.rs
// (Sv39, three levels) onto x86's two-level page directory / page table,
// following examples/original_source/xv6/memory/vm.c.
//
// Because an x86 xv6 process's page directory maps both its own user
// pages *and* the kernel range, the kernel can dereference user
// addresses directly once `proc.sz` has been checked — there is no
// separate copyin/copyout-via-walk step the way a split address space
// would need. copy_out still walks page by page because the destination
// range may span non-contiguous physical frames.

use crate::kalloc::KMEM;
use crate::memlayout::{DEVSPACE, EXTMEM, KERNBASE, KERNLINK, PHYSTOP};
use crate::mmu::{PageTable, Pte, Segdesc, NPDENTRIES, PGSIZE, PTE_P, PTE_U, PTE_W, SEG_TSS, STS_T32A};
use crate::proc::{myproc, Cpu};
use crate::string::memset;
use crate::{PDX, PGROUNDDOWN, PGROUNDUP, PTE_ADDR};

extern "C" {
    // First address past the kernel's text+rodata, set by the linker
    // script (kernel.ld). Everything from here to PHYSTOP is kernel data
    // plus the page-allocation arena.
    static data: u8;
}

/// One fixed kernel mapping: [va, va+sz) -> [pa, pa+sz), with the given
/// permission bits (PTE_W set or clear; PTE_U never set — kernel only).
struct KMap {
    va: usize,
    pa: usize,
    sz: usize,
    perm: u32,
}

fn data_addr() -> usize {
    unsafe { &data as *const u8 as usize }
}

fn kmap_table() -> [KMap; 4] {
    let data_va = data_addr();
    [
        // I/O space: identity-mapped low memory, used for VGA/BIOS-era MMIO.
        KMap { va: KERNBASE, pa: 0, sz: EXTMEM, perm: PTE_W },
        // Kernel text and rodata: read-only.
        KMap { va: KERNLINK, pa: KERNLINK - KERNBASE, sz: data_va - KERNLINK, perm: 0 },
        // Kernel data and the physical memory the page allocator owns.
        KMap { va: data_va, pa: data_va - KERNBASE, sz: PHYSTOP - (data_va - KERNBASE), perm: PTE_W },
        // High device MMIO region, wrapping to the 4GiB top.
        KMap { va: DEVSPACE, pa: DEVSPACE, sz: 0usize.wrapping_sub(DEVSPACE), perm: PTE_W },
    ]
}

/// Allocate a fresh page directory and install the four fixed kernel
/// mappings. Returns `None` on allocation failure (no partial directory
/// is left mapped: map_pages either fully succeeds or this unwinds by
/// dropping the allocated frame, relying on the fact that failures only
/// happen on the very first page-table frame, before any user content
/// exists).
pub fn setup_kernel_vm() -> Option<*mut PageTable> {
    let pg = unsafe { KMEM.kalloc() } as *mut PageTable;
    if pg.is_null() {
        return None;
    }
    unsafe {
        memset(pg as *mut u8, 0, PGSIZE);
    }

    if data_addr() >= PHYSTOP + KERNBASE {
        panic!("setup_kernel_vm: physical memory smaller than kernel");
    }

    for k in kmap_table() {
        if map_pages(unsafe { &mut *pg }, k.va, k.sz, k.pa, k.perm).is_err() {
            unsafe { KMEM.kfree(pg as *mut u8) };
            return None;
        }
    }

    Some(pg)
}

/// Return the address of the PTE in `pgdir` that maps `va`. When `alloc`
/// is set, missing page-table frames are allocated, zeroed, and wired
/// into the directory as present+writable+user (the directory entry's
/// own permission bits are irrelevant to user/kernel — the leaf PTE
/// decides that).
pub fn walk_pgdir(pgdir: &mut PageTable, va: usize, alloc: bool) -> Option<*mut Pte> {
    let pde = &mut pgdir.0[PDX!(va)];

    let pgtab: *mut PageTable = if pde.present() {
        (PTE_ADDR!(pde.0) as usize) as *mut PageTable
    } else {
        if !alloc {
            return None;
        }
        let pg = unsafe { KMEM.kalloc() } as *mut PageTable;
        if pg.is_null() {
            return None;
        }
        unsafe { memset(pg as *mut u8, 0, PGSIZE) };
        *pde = Pte((pg as u32) | PTE_P | PTE_W | PTE_U);
        pg
    };

    let idx = (va >> 12) & 0x3FF;
    Some(unsafe { &mut (*pgtab).0[idx] as *mut Pte })
}

/// Install present mappings for every page in [va, va+size). Panics if
/// any page in the range is already present (a remap is an internal
/// programming error, never a recoverable condition).
pub fn map_pages(pgdir: &mut PageTable, va: usize, size: usize, pa: usize, perm: u32) -> Result<(), ()> {
    if size == 0 {
        return Ok(());
    }

    let mut a = PGROUNDDOWN!(va);
    let last = PGROUNDDOWN!(va + size - 1);
    let mut pa = pa;

    loop {
        let pte = walk_pgdir(pgdir, a, true).ok_or(())?;
        unsafe {
            if (*pte).present() {
                panic!("map_pages: remap");
            }
            *pte = Pte((pa as u32) | perm | PTE_P);
        }

        if a == last {
            break;
        }
        a += PGSIZE;
        pa += PGSIZE;
    }
    Ok(())
}

/// Load `pgdir` into CR3 and enable paging/write-protect, for the CPU
/// that is always mapped to the kernel page table (used before any
/// process runs, and between processes while the scheduler itself runs).
pub fn switchkvm(kpgdir: *mut PageTable) {
    crate::x86::lcr3(crate::memlayout::v2p(kpgdir as usize) as u32);
}

/// Switch hardware page table register to `p`'s page directory and set
/// up the TSS so that traps from user mode land on `p`'s kernel stack.
pub fn switchuvm(cpu: &mut Cpu, pgdir: *mut PageTable, kstack_top: usize) {
    crate::spinlock::push_off();

    let ts_base = &cpu.ts as *const _ as u32;
    let ts_limit = (core::mem::size_of::<crate::mmu::Taskstate>() - 1) as u32;
    cpu.gdt[SEG_TSS] = Segdesc::seg16(STS_T32A, ts_base, ts_limit, 0);

    cpu.ts.ss0 = (crate::mmu::SEG_KDATA << 3) as u16;
    cpu.ts.esp0 = kstack_top as u32;
    // iomb beyond the TSS limit: no I/O permission bitmap for user code.
    cpu.ts.iomb = 0xFFFF;

    crate::x86::ltr((SEG_TSS << 3) as u16);
    crate::x86::lcr3(crate::memlayout::v2p(pgdir as usize) as u32);

    crate::spinlock::pop_off();
}

/// Create an empty user page table with no user memory, but the kernel
/// mappings copied over so the process can always trap into the kernel.
pub fn uvm_create() -> Option<*mut PageTable> {
    setup_kernel_vm()
}

/// Load the very first process's program image into address 0. `sz`
/// must fit in one page (the initcode blob always does).
pub fn uvm_init(pgdir: &mut PageTable, init: &[u8]) {
    if init.len() >= PGSIZE {
        panic!("uvm_init: more than a page");
    }
    let mem = unsafe { KMEM.kalloc() };
    unsafe { memset(mem, 0, PGSIZE) };
    map_pages(pgdir, 0, PGSIZE, crate::memlayout::v2p(mem as usize), PTE_W | PTE_U).unwrap();
    unsafe {
        core::ptr::copy_nonoverlapping(init.as_ptr(), mem, init.len());
    }
}

/// Grow a process's user image from `old_sz` to `new_sz`, allocating and
/// zeroing each new page. On failure, rolls back anything it allocated
/// and returns `old_sz`; returns `0` if `new_sz` would reach into the
/// kernel range.
pub fn alloc_user(pgdir: &mut PageTable, old_sz: usize, new_sz: usize) -> usize {
    if new_sz >= KERNBASE {
        return 0;
    }
    if new_sz < old_sz {
        return old_sz;
    }

    let mut a = PGROUNDUP!(old_sz);
    while a < new_sz {
        let mem = unsafe { KMEM.kalloc() };
        if mem.is_null() {
            dealloc_user(pgdir, a, old_sz);
            return 0;
        }
        unsafe { memset(mem, 0, PGSIZE) };
        if map_pages(pgdir, a, PGSIZE, crate::memlayout::v2p(mem as usize), PTE_W | PTE_U).is_err() {
            unsafe { KMEM.kfree(mem) };
            dealloc_user(pgdir, a, old_sz);
            return 0;
        }
        a += PGSIZE;
    }
    new_sz
}

/// Shrink a process's user image from `old_sz` to `new_sz`, freeing the
/// frame backing each page that's no longer needed. No-op if `new_sz >=
/// old_sz`.
pub fn dealloc_user(pgdir: &mut PageTable, old_sz: usize, new_sz: usize) -> usize {
    if new_sz >= old_sz {
        return old_sz;
    }

    let newpage = PGROUNDUP!(new_sz);
    let mut a = newpage;
    while a < old_sz {
        if let Some(pte) = walk_pgdir(pgdir, a, false) {
            unsafe {
                if (*pte).present() {
                    let pa = (*pte).frame();
                    KMEM.kfree(crate::memlayout::p2v(pa as usize) as *mut u8);
                    *pte = Pte::zero();
                }
            }
        }
        a += PGSIZE;
    }
    new_sz
}

/// Remove the user-accessible bit from the page containing `va` (used
/// to place a guard page just below the user stack).
pub fn clear_user_perm(pgdir: &mut PageTable, va: usize) {
    let pte = walk_pgdir(pgdir, va, false).expect("clear_user_perm: no such page");
    unsafe {
        (*pte).0 &= !PTE_U;
    }
}

/// Deep-copy every present user page of `pgdir` (up to `sz`) into a
/// freshly allocated address space, installing identical mappings. Used
/// by `fork`. On any failure, everything allocated so far is freed and
/// `None` is returned.
pub fn copy_user(pgdir: &mut PageTable, sz: usize) -> Option<*mut PageTable> {
    let new_pgdir = uvm_create()?;
    let new_ref = unsafe { &mut *new_pgdir };

    let mut i = 0;
    while i < sz {
        let pte = match walk_pgdir(pgdir, i, false) {
            Some(p) => p,
            None => panic!("copy_user: pte should exist"),
        };
        unsafe {
            if !(*pte).present() {
                panic!("copy_user: page not present");
            }
            let pa = (*pte).frame();
            let flags = crate::PTE_FLAGS!((*pte).0);

            let mem = KMEM.kalloc();
            if mem.is_null() {
                free_vm(new_pgdir, i);
                return None;
            }
            core::ptr::copy_nonoverlapping(
                crate::memlayout::p2v(pa as usize) as *const u8,
                mem,
                PGSIZE,
            );
            if map_pages(new_ref, i, PGSIZE, crate::memlayout::v2p(mem as usize), flags).is_err() {
                KMEM.kfree(mem);
                free_vm(new_pgdir, i);
                return None;
            }
        }
        i += PGSIZE;
    }

    Some(new_pgdir)
}

/// Translate a user virtual address to a kernel-dereferenceable pointer,
/// honoring the user-accessible bit (a guard page or a kernel-only page
/// is treated as unmapped).
pub fn uva2ka(pgdir: &mut PageTable, va: usize) -> Option<*mut u8> {
    let pte = walk_pgdir(pgdir, va, false)?;
    unsafe {
        if !(*pte).present() || (*pte).0 & PTE_U == 0 {
            return None;
        }
        Some(crate::memlayout::p2v((*pte).frame() as usize) as *mut u8)
    }
}

/// Copy `len` bytes from kernel memory `src` to the user virtual range
/// starting at `va`, walking the user page table one page at a time
/// since the destination need not be physically contiguous.
pub fn copy_out(pgdir: &mut PageTable, va: usize, src: *const u8, len: usize) -> Result<(), ()> {
    let mut remaining = len;
    let mut va = va;
    let mut src = src;

    while remaining > 0 {
        let va0 = PGROUNDDOWN!(va);
        let pa0 = uva2ka(pgdir, va0).ok_or(())?;
        let n = core::cmp::min(PGSIZE - (va - va0), remaining);
        unsafe {
            core::ptr::copy_nonoverlapping(src, pa0.add(va - va0), n);
        }
        remaining -= n;
        src = unsafe { src.add(n) };
        va = va0 + PGSIZE;
    }
    Ok(())
}

/// Free every present user page below `sz`, then recursively free every
/// present second-level page-table frame, then the directory itself.
pub fn free_vm(pgdir: *mut PageTable, sz: usize) {
    if pgdir.is_null() {
        panic!("free_vm: no pgdir");
    }
    let pg = unsafe { &mut *pgdir };
    if sz > 0 {
        dealloc_user(pg, sz, 0);
    }

    for i in 0..NPDENTRIES {
        let pde = pg.0[i];
        if pde.present() {
            let v = crate::memlayout::p2v(pde.frame() as usize) as *mut u8;
            unsafe { KMEM.kfree(v) };
        }
    }
    unsafe { KMEM.kfree(pgdir as *mut u8) };
}

/// Fetch a 32-bit integer from the current process's user memory at
/// `addr`, bounds-checked against `proc.sz`. Unlike the split-address-
/// space RISC-V port, x86 xv6 maps user memory inside the same page
/// directory the kernel runs on, so this is a direct, checked
/// dereference rather than a page-walk copy.
pub fn fetch_int(addr: usize) -> Option<i32> {
    let p = myproc();
    if addr + 4 > p.sz || addr + 4 < addr {
        return None;
    }
    Some(unsafe { *(addr as *const i32) })
}

/// Returns a kernel-usable `(ptr, len)` for the NUL-terminated string at
/// `addr`, or `None` if it runs past the end of the process's address
/// space without a terminator.
pub fn fetch_str(addr: usize) -> Option<(*const u8, usize)> {
    let p = myproc();
    if addr >= p.sz {
        return None;
    }
    let mut s = addr;
    while s < p.sz {
        if unsafe { *(s as *const u8) } == 0 {
            return Some((addr as *const u8, s - addr));
        }
        s += 1;
    }
    None
}

/// Copy `len` bytes out of the *currently running* process's user memory
/// at `va` into kernel memory at `dst`. Valid only for the process whose
/// page directory is presently loaded (every syscall-handling context),
/// same restriction as `fetch_int`/`fetch_str`.
pub fn copy_in(dst: *mut u8, va: usize, len: usize) -> Result<(), ()> {
    let p = myproc();
    if va + len > p.sz || va + len < va {
        return Err(());
    }
    unsafe { core::ptr::copy_nonoverlapping(va as *const u8, dst, len) };
    Ok(())
}

/// Copy `len` bytes from `src` to `dst`, where `dst` is a user address in
/// the current process if `is_user_dst`, or a kernel address otherwise.
/// Grounded in the teacher's `either_copyout`, used by devices (the
/// console) that can be asked to fill either a user or a kernel buffer.
pub fn either_copy_out(is_user_dst: bool, dst: usize, src: *const u8, len: usize) -> Result<(), ()> {
    if is_user_dst {
        copy_out(unsafe { &mut *myproc().pgdir }, dst, src, len)
    } else {
        unsafe { core::ptr::copy_nonoverlapping(src, dst as *mut u8, len) };
        Ok(())
    }
}

/// Copy `len` bytes from `src` into `dst`, where `src` is a user address
/// in the current process if `is_user_src`, or a kernel address
/// otherwise. Grounded in the teacher's `either_copyin`.
pub fn either_copy_in(dst: *mut u8, is_user_src: bool, src: usize, len: usize) -> Result<(), ()> {
    if is_user_src {
        copy_in(dst, src, len)
    } else {
        unsafe { core::ptr::copy_nonoverlapping(src as *const u8, dst, len) };
        Ok(())
    }
}
