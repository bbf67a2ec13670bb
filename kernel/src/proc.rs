// Process table, per-CPU records, and the round-robin multi-CPU
// scheduler: allocation, fork/exit/wait, sleep/wakeup, and the
// voluntary context switch. Grounded in
// examples/original_source/xv6/processus/proc.c and proc.h, restructured
// around the teacher's Cpu/Proc split (kernel/src/proc.rs) but built for
// x86's {edi,esi,ebx,ebp,eip} context and two-level page tables instead
// of RISC-V's.

use crate::file::File;
use crate::fs::INode;
use crate::kalloc::KMEM;
use crate::lapic::id as lapicid;
use crate::mmu::{
    Pseudodesc, Segdesc, Taskstate, DPL_KERNEL, DPL_USER, FL_IF, NSEGS, SEG_KCODE, SEG_KDATA,
    SEG_UCODE, SEG_UDATA, STA_R, STA_W, STA_X,
};
use crate::mmu::PageTable;
use crate::param::{KSTACKSIZE, NCPU, NOFILE, NPROC};
use crate::spinlock::Spinlock;
use crate::string::{memset, safestrcpy};
use crate::x86::intr_enabled;

/// Callee-saved registers plus the return address, saved by `swtch` at
/// the bottom of a kernel stack. The field order must match what the
/// assembly context-switch routine pushes and restores; the routine
/// itself lives outside this crate's scope (an assembly entry stub).
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct Context {
    pub edi: u32,
    pub esi: u32,
    pub ebx: u32,
    pub ebp: u32,
    pub eip: u32,
}

extern "C" {
    /// Save the caller's registers into `*old`, load `new`'s, and jump to
    /// its saved `eip`. Implemented in assembly (swtch.S); not part of
    /// this crate's scope per the external-collaborator list.
    fn swtch(old: *mut *mut Context, new: *mut Context);
    fn trapret();
}

/// Hardware- and stub-defined trap frame, pushed on the kernel stack by
/// the assembly trap entry on every exception/interrupt/syscall. Bit-exact
/// with `struct trapframe` in the original; never reordered or padded
/// implicitly.
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct Trapframe {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub oesp: u32, // pushed by pusha, ignored
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,

    pub gs: u16,
    pub padding1: u16,
    pub fs: u16,
    pub padding2: u16,
    pub es: u16,
    pub padding3: u16,
    pub ds: u16,
    pub padding4: u16,
    pub trapno: u32,

    // hardware-pushed
    pub err: u32,
    pub eip: u32,
    pub cs: u16,
    pub padding5: u16,
    pub eflags: u32,

    // only present when crossing rings
    pub esp: u32,
    pub ss: u16,
    pub padding6: u16,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Procstate {
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

pub struct Proc {
    pub sz: usize,
    pub pgdir: *mut PageTable,
    pub kstack: *mut u8,
    pub state: Procstate,
    pub pid: i32,
    pub parent: *mut Proc,
    pub tf: *mut Trapframe,
    pub context: *mut Context,
    pub chan: Option<usize>,
    pub killed: bool,
    pub ofile: [*mut File; NOFILE],
    pub cwd: *mut INode,
    pub name: [u8; 16],
}

impl Proc {
    const fn unused() -> Self {
        Proc {
            sz: 0,
            pgdir: core::ptr::null_mut(),
            kstack: core::ptr::null_mut(),
            state: Procstate::Unused,
            pid: 0,
            parent: core::ptr::null_mut(),
            tf: core::ptr::null_mut(),
            context: core::ptr::null_mut(),
            chan: None,
            killed: false,
            ofile: [core::ptr::null_mut(); NOFILE],
            cwd: core::ptr::null_mut(),
            name: [0; 16],
        }
    }
}

/// Per-physical-CPU record: identity, the scheduler's own saved context,
/// the hardware task state and segment descriptor table used to enter
/// this CPU's kernel stack on a ring transition, the push_off/pop_off
/// nesting counters, and the process currently running here.
pub struct Cpu {
    pub id: usize,
    pub apicid: u8,
    pub scheduler: *mut Context,
    pub ts: Taskstate,
    pub gdt: [Segdesc; NSEGS],
    pub started: bool,
    pub noff: u32,
    pub intena: bool,
    pub proc: *mut Proc,
}

impl Cpu {
    const fn zero(id: usize) -> Self {
        Cpu {
            id,
            apicid: 0,
            scheduler: core::ptr::null_mut(),
            ts: Taskstate {
                link: 0, esp0: 0, ss0: 0, _pad1: 0, esp1: 0, ss1: 0, _pad2: 0,
                esp2: 0, ss2: 0, _pad3: 0, cr3: 0, eip: 0, eflags: 0, eax: 0,
                ecx: 0, edx: 0, ebx: 0, esp: 0, ebp: 0, esi: 0, edi: 0,
                es: 0, _pad4: 0, cs: 0, _pad5: 0, ss: 0, _pad6: 0, ds: 0,
                _pad7: 0, fs: 0, _pad8: 0, gs: 0, _pad9: 0, ldt: 0, _pad10: 0,
                t: 0, iomb: 0,
            },
            gdt: [Segdesc::zero(); NSEGS],
            started: false,
            noff: 0,
            intena: false,
            proc: core::ptr::null_mut(),
        }
    }
}

const PROC_UNUSED: Proc = Proc::unused();
const CPU_PLACEHOLDER: Cpu = Cpu::zero(0);

const fn make_cpus() -> [Cpu; NCPU] {
    let mut arr = [CPU_PLACEHOLDER; NCPU];
    let mut i = 0;
    while i < NCPU {
        arr[i].id = i;
        i += 1;
    }
    arr
}

pub static mut CPUS: [Cpu; NCPU] = make_cpus();
pub static mut NCPU_ACTIVE: usize = 1;

struct Ptable {
    lock: Spinlock,
    proc: [Proc; NPROC],
}

static mut PTABLE: Ptable = Ptable { lock: Spinlock::init_lock("ptable"), proc: [PROC_UNUSED; NPROC] };
static mut NEXT_PID: i32 = 1;
static mut INITPROC: *mut Proc = core::ptr::null_mut();

pub fn pinit() {
    // PTABLE.lock is already const-initialized; nothing further to set up.
}

/// Build this CPU's GDT (kernel/user code and data descriptors spanning
/// the full 4GiB address space) and load it. Must run on every CPU
/// before it can take a trap, since traps reload `cs`/`ds` from these
/// selectors. The TSS descriptor (`SEG_TSS`) is filled in later, per
/// process switch, by `vm::switchuvm`.
pub fn seginit() {
    let c = mycpu();
    c.gdt[SEG_KCODE] = Segdesc::seg(STA_X | STA_R, 0, 0xffff_ffff, DPL_KERNEL);
    c.gdt[SEG_KDATA] = Segdesc::seg(STA_W, 0, 0xffff_ffff, DPL_KERNEL);
    c.gdt[SEG_UCODE] = Segdesc::seg(STA_X | STA_R, 0, 0xffff_ffff, DPL_USER);
    c.gdt[SEG_UDATA] = Segdesc::seg(STA_W, 0, 0xffff_ffff, DPL_USER);

    let pd = Pseudodesc {
        limit: (core::mem::size_of::<[Segdesc; NSEGS]>() - 1) as u16,
        base: c.gdt.as_ptr() as u32,
    };
    crate::x86::lgdt(&pd as *const Pseudodesc as *const u8);
}

/// Must be called with interrupts disabled: the apicid-to-index lookup
/// below would otherwise race a reschedule onto a different CPU.
pub fn cpuid() -> usize {
    mycpu().id
}

/// Returns this CPU's record, found by matching the local APIC id
/// `mp::init` recorded for it against the id the hardware reports right
/// now.
pub fn mycpu() -> &'static mut Cpu {
    if intr_enabled() {
        panic!("mycpu: called with interrupts enabled");
    }
    let apicid = lapicid();
    unsafe {
        for i in 0..NCPU_ACTIVE {
            if CPUS[i].apicid == apicid {
                return &mut CPUS[i];
            }
        }
    }
    panic!("mycpu: unknown apicid");
}

/// The process running on this CPU, or a dangling pointer's target if
/// none — callers in the scheduler path only call this when they know a
/// process is current.
pub fn myproc() -> &'static mut Proc {
    crate::spinlock::push_off();
    let p = mycpu().proc;
    crate::spinlock::pop_off();
    unsafe { &mut *p }
}

fn ptable_procs() -> &'static mut [Proc; NPROC] {
    unsafe { &mut PTABLE.proc }
}

/// Find an `Unused` slot, mark it `Embryo`, assign the next pid, allocate
/// its kernel stack, and lay out a trap frame + return-to-`trapret`
/// marker + context whose `eip` is `forkret`, so the process starts
/// there the first time it's scheduled.
fn allocproc() -> Option<*mut Proc> {
    unsafe {
        PTABLE.lock.acquire();
        let mut found: Option<*mut Proc> = None;
        for p in ptable_procs().iter_mut() {
            if p.state == Procstate::Unused {
                p.state = Procstate::Embryo;
                p.pid = NEXT_PID;
                NEXT_PID += 1;
                found = Some(p as *mut Proc);
                break;
            }
        }
        PTABLE.lock.release();

        let p = found?;

        let kstack = KMEM.kalloc();
        if kstack.is_null() {
            (*p).state = Procstate::Unused;
            return None;
        }
        (*p).kstack = kstack;

        let mut sp = kstack.add(KSTACKSIZE);

        sp = sp.sub(core::mem::size_of::<Trapframe>());
        (*p).tf = sp as *mut Trapframe;

        sp = sp.sub(4);
        *(sp as *mut u32) = trapret as usize as u32;

        sp = sp.sub(core::mem::size_of::<Context>());
        (*p).context = sp as *mut Context;
        memset(sp, 0, core::mem::size_of::<Context>());
        (*(*p).context).eip = forkret as usize as u32;

        Some(p)
    }
}

/// Build the first process: map the embedded initcode image at virtual
/// address 0, set up its trap frame to "return" into user mode at `eip
/// 0`, and mark it runnable.
pub fn userinit() {
    unsafe {
        let p = allocproc().expect("userinit: allocproc failed");
        INITPROC = p;

        let pgdir = crate::vm::uvm_create().expect("userinit: out of memory");
        (*p).pgdir = pgdir;
        crate::vm::uvm_init(&mut *pgdir, crate::initcode::INITCODE);
        (*p).sz = crate::mmu::PGSIZE;

        memset((*p).tf as *mut u8, 0, core::mem::size_of::<Trapframe>());
        let tf = &mut *(*p).tf;
        tf.cs = ((SEG_UCODE << 3) | DPL_USER as usize) as u16;
        tf.ds = ((SEG_UDATA << 3) | DPL_USER as usize) as u16;
        tf.es = tf.ds;
        tf.ss = tf.ds;
        tf.eflags = FL_IF;
        tf.esp = crate::mmu::PGSIZE as u32;
        tf.eip = 0;

        safestrcpy(&mut (*p).name, b"initcode");
        (*p).cwd = crate::fs::namei(b"/").expect("userinit: root inode missing");

        PTABLE.lock.acquire();
        (*p).state = Procstate::Runnable;
        PTABLE.lock.release();
    }
}

/// Grow or shrink the calling process's address space by `n` bytes
/// (negative to shrink); installs the resulting page directory on this
/// CPU. Returns `false` on failure, leaving the process size unchanged.
pub fn growproc(n: isize) -> bool {
    let p = myproc();
    let pgdir = unsafe { &mut *p.pgdir };
    let sz = if n > 0 {
        crate::vm::alloc_user(pgdir, p.sz, p.sz + n as usize)
    } else if n < 0 {
        crate::vm::dealloc_user(pgdir, p.sz, (p.sz as isize + n) as usize)
    } else {
        p.sz
    };
    if sz == 0 && n != 0 {
        return false;
    }
    p.sz = sz;
    crate::vm::switchuvm(mycpu(), p.pgdir, p.kstack as usize + KSTACKSIZE);
    true
}

/// Deep-copy the calling process into a new one: duplicate its address
/// space, trap frame, open files, and current directory; the child's
/// `eax` is cleared so `fork` returns 0 there. Returns the child's pid,
/// or -1 on failure.
pub fn fork() -> i32 {
    let curproc = myproc();

    let np = match allocproc() {
        Some(p) => p,
        None => return -1,
    };

    unsafe {
        let new_pgdir = match crate::vm::copy_user(&mut *curproc.pgdir, curproc.sz) {
            Some(pd) => pd,
            None => {
                KMEM.kfree((*np).kstack);
                (*np).kstack = core::ptr::null_mut();
                (*np).state = Procstate::Unused;
                return -1;
            }
        };
        (*np).pgdir = new_pgdir;
        (*np).sz = curproc.sz;
        (*np).parent = curproc as *mut Proc;
        *(*np).tf = *curproc.tf;
        (*(*np).tf).eax = 0;

        for i in 0..NOFILE {
            if !curproc.ofile[i].is_null() {
                (*np).ofile[i] = crate::file::filedup(curproc.ofile[i]);
            }
        }
        (*np).cwd = crate::fs::idup(curproc.cwd);

        (*np).name = curproc.name;

        let pid = (*np).pid;

        PTABLE.lock.acquire();
        (*np).state = Procstate::Runnable;
        PTABLE.lock.release();

        pid
    }
}

/// Close every open file, drop the current-directory inode, wake a
/// waiting parent, reparent this process's children to init, and jump
/// into the scheduler as a `Zombie`. Never returns.
pub fn exit() -> ! {
    let curproc = myproc();
    unsafe {
        if curproc as *mut Proc == INITPROC {
            panic!("exit: init exiting");
        }

        for fd in 0..NOFILE {
            if !curproc.ofile[fd].is_null() {
                crate::file::fileclose(curproc.ofile[fd]);
                curproc.ofile[fd] = core::ptr::null_mut();
            }
        }

        crate::fslog::begin_op();
        crate::fs::iput(curproc.cwd);
        crate::fslog::end_op();
        curproc.cwd = core::ptr::null_mut();

        PTABLE.lock.acquire();

        wakeup1(curproc.parent as usize);

        for p in ptable_procs().iter_mut() {
            if p.parent == curproc as *mut Proc {
                p.parent = INITPROC;
                if p.state == Procstate::Zombie {
                    wakeup1(INITPROC as usize);
                }
            }
        }

        curproc.state = Procstate::Zombie;
        sched();
        panic!("exit: zombie process resumed");
    }
}

/// Scan for an already-exited child, reclaim it, and return its pid;
/// block on this process's own address until one appears; return -1 if
/// there are no children left at all.
pub fn wait() -> i32 {
    let curproc = myproc();
    unsafe {
        PTABLE.lock.acquire();
        loop {
            let mut havekids = false;
            for p in ptable_procs().iter_mut() {
                if p.parent != curproc as *mut Proc {
                    continue;
                }
                havekids = true;
                if p.state == Procstate::Zombie {
                    let pid = p.pid;
                    KMEM.kfree(p.kstack);
                    p.kstack = core::ptr::null_mut();
                    crate::vm::free_vm(p.pgdir, p.sz);
                    p.pid = 0;
                    p.parent = core::ptr::null_mut();
                    p.name = [0; 16];
                    p.killed = false;
                    p.state = Procstate::Unused;
                    PTABLE.lock.release();
                    return pid;
                }
            }

            if !havekids || curproc.killed {
                PTABLE.lock.release();
                return -1;
            }

            sleep(curproc as *mut Proc as usize, &mut PTABLE.lock);
        }
    }
}

/// Each CPU's scheduler loop: pick the next runnable process round-robin,
/// switch its address space in, mark it `Running`, and context-switch
/// into it. Control returns here only when the process voluntarily
/// yields via `sched`. Never returns.
pub fn scheduler() -> ! {
    let c = mycpu();
    c.proc = core::ptr::null_mut();

    loop {
        crate::x86::sti();

        unsafe {
            PTABLE.lock.acquire();
            for p in ptable_procs().iter_mut() {
                if p.state != Procstate::Runnable {
                    continue;
                }

                c.proc = p as *mut Proc;
                crate::vm::switchuvm(c, p.pgdir, p.kstack as usize + KSTACKSIZE);
                p.state = Procstate::Running;

                swtch(&mut c.scheduler, p.context);
                crate::vm::switchkvm(crate::main::kernel_pgdir());

                c.proc = core::ptr::null_mut();
            }
            PTABLE.lock.release();
        }
    }
}

/// Yield the CPU back to the scheduler: caller must hold the process
/// table lock exactly once, have interrupts disabled, and not be
/// `Running`.
pub fn sched() {
    let p = myproc();
    unsafe {
        if !PTABLE.lock.holding() {
            panic!("sched: ptable lock not held");
        }
    }
    if mycpu().noff != 1 {
        panic!("sched: locks");
    }
    if p.state == Procstate::Running {
        panic!("sched: process running");
    }
    if intr_enabled() {
        panic!("sched: interruptible");
    }
    let intena = mycpu().intena;
    unsafe {
        swtch(&mut p.context, mycpu().scheduler);
    }
    mycpu().intena = intena;
}

pub fn proc_yield() {
    unsafe {
        PTABLE.lock.acquire();
        myproc().state = Procstate::Runnable;
        sched();
        PTABLE.lock.release();
    }
}

/// The first instruction a freshly scheduled process runs. Releases the
/// process-table lock the scheduler held across the switch-in, and on
/// the very first call ever, finishes bringing up the file-system layer
/// (inode cache, log recovery) — work that can only run in a regular
/// process context because it may sleep.
pub extern "C" fn forkret() {
    static mut FIRST: bool = true;
    unsafe {
        PTABLE.lock.release();
        if FIRST {
            FIRST = false;
            crate::fs::iinit();
            crate::fs::fsinit(crate::param::ROOTDEV);
        }
    }
}

/// Atomically release `lk` (unless it's already the process-table lock)
/// and mark this process `Sleeping` on `chan`, then yield. On return,
/// re-takes `lk` if it had been swapped out.
pub fn sleep(chan: usize, lk: &mut Spinlock) {
    let p = myproc();

    let swapped = unsafe { lk as *mut Spinlock != &mut PTABLE.lock as *mut Spinlock };
    unsafe {
        if swapped {
            PTABLE.lock.acquire();
            lk.release();
        }
    }

    p.chan = Some(chan);
    p.state = Procstate::Sleeping;

    sched();

    p.chan = None;

    unsafe {
        if swapped {
            PTABLE.lock.release();
            lk.acquire();
        }
    }
}

fn wakeup1(chan: usize) {
    for p in ptable_procs().iter_mut() {
        if p.state == Procstate::Sleeping && p.chan == Some(chan) {
            p.state = Procstate::Runnable;
        }
    }
}

/// Wake every process sleeping on `chan`. Wakeups are advisory: a waiter
/// must re-check its condition after returning.
pub fn wakeup(chan: usize) {
    unsafe {
        PTABLE.lock.acquire();
        wakeup1(chan);
        PTABLE.lock.release();
    }
}

/// Mark `pid` killed; if it is currently sleeping, also make it runnable
/// so it observes the flag. The process actually terminates on its next
/// trap return to user space.
pub fn kill(pid: i32) -> i32 {
    unsafe {
        PTABLE.lock.acquire();
        for p in ptable_procs().iter_mut() {
            if p.pid == pid {
                p.killed = true;
                if p.state == Procstate::Sleeping {
                    p.state = Procstate::Runnable;
                }
                PTABLE.lock.release();
                return 0;
            }
        }
        PTABLE.lock.release();
    }
    -1
}

/// Debug dump to the console, triggered by `^P`. Takes no lock
/// deliberately: run from an already-wedged machine, it must not be
/// able to deadlock further.
pub fn procdump() {
    let names = ["unused", "embryo", "sleep ", "runble", "run   ", "zombie"];
    for p in ptable_procs().iter() {
        if p.state == Procstate::Unused {
            continue;
        }
        let state = names[p.state as usize];
        let namelen = p.name.iter().position(|&b| b == 0).unwrap_or(p.name.len());
        log::info!("{} {} {}", p.pid, state, core::str::from_utf8(&p.name[..namelen]).unwrap_or("?"));
    }
}
