// Physical page allocator: a free list of 4 KiB frames, each frame
// storing the pointer to the next free frame in its own first word.
// Grounded in the teacher's KMem (kernel/src/kalloc.rs) and
// examples/original_source/xv6/memory/kalloc.c, adapted to the
// lock-free-during-early-boot discipline the original describes (a single
// CPU is running before `kinit1`/`kinit2` finish, so `kinit` can skip the
// lock; spec.md formalizes this as a boot flag).

use crate::memlayout::PHYSTOP;
use crate::mmu::PGSIZE;
use crate::spinlock::Spinlock;
use crate::string::memset;
use crate::PGROUNDUP;
use core::sync::atomic::{AtomicBool, Ordering};

struct Run {
    next: *mut Run,
}

pub struct KMem {
    lock: Spinlock,
    use_lock: AtomicBool,
    freelist: *mut Run,
}

unsafe impl Sync for KMem {}

pub static mut KMEM: KMem = KMem::create();

impl KMem {
    const fn create() -> Self {
        KMem {
            lock: Spinlock::init_lock("kmem"),
            use_lock: AtomicBool::new(false),
            freelist: core::ptr::null_mut(),
        }
    }

    /// Called once, on CPU 0, before other CPUs are started: `kend` is
    /// the first free physical address (set by the linker / boot info),
    /// everything up to `PHYSTOP` is handed to the free list.
    pub fn kinit(kend: usize) {
        unsafe {
            KMEM.freerange(kend as *mut u8, PHYSTOP as *mut u8);
            KMEM.use_lock.store(true, Ordering::Relaxed);
        }
    }

    fn freerange(&mut self, pa_start: *mut u8, pa_end: *mut u8) {
        let mut p = PGROUNDUP!(pa_start as usize);
        while p + PGSIZE <= pa_end as usize {
            self.kfree(p as *mut u8);
            p += PGSIZE;
        }
    }

    /// Free the page of physical memory pointed at by `pa`. Must have
    /// been returned by `kalloc` (or be part of the initial freerange).
    pub fn kfree(&mut self, pa: *mut u8) {
        let a = pa as usize;
        if a % PGSIZE != 0 || a >= PHYSTOP {
            panic!("kfree: not a page-aligned, in-range frame");
        }

        // Fill with junk to catch dangling references.
        memset(pa, 1, PGSIZE);

        let r = pa as *mut Run;
        let locking = self.use_lock.load(Ordering::Relaxed);
        if locking {
            self.lock.acquire();
        }
        unsafe {
            (*r).next = self.freelist;
        }
        self.freelist = r;
        if locking {
            self.lock.release();
        }
    }

    /// Allocate one 4096-byte page of physical memory, or return null.
    pub fn kalloc(&mut self) -> *mut u8 {
        let locking = self.use_lock.load(Ordering::Relaxed);
        if locking {
            self.lock.acquire();
        }
        let r = self.freelist;
        if !r.is_null() {
            unsafe {
                self.freelist = (*r).next;
            }
        }
        if locking {
            self.lock.release();
        }

        if !r.is_null() {
            memset(r as *mut u8, 5, PGSIZE); // junk, to catch use of stale data
        }
        r as *mut u8
    }
}
