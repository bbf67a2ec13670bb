// Load and run an ELF binary in place of the calling process's image.
// Grounded in examples/LENSHOOD-xv6-rust/kernel/src/exec.rs for overall
// shape, but the stack-setup tail follows classic x86 xv6 exec.c: argv
// strings and a fake return PC/argc/argv triple get pushed directly onto
// the user stack, since this port's syscall convention reads arguments
// off the stack rather than out of registers.

use core::mem;

use crate::elf::{ElfHeader, ProgramHeader, ELF_MAGIC, ELF_PROG_LOAD};
use crate::fs::{namei, INode};
use crate::fslog::{begin_op, end_op};
use crate::mmu::{PageTable, PGSIZE};
use crate::param::MAXARG;
use crate::proc::myproc;
use crate::vm::{alloc_user, clear_user_perm, copy_out, free_vm, switchuvm, uva2ka, uvm_create};
use crate::PGROUNDUP;

pub fn exec(path: &[u8], argv: &[&[u8]]) -> i32 {
    begin_op();

    let Some(ip) = namei(path) else {
        end_op();
        return -1;
    };
    let ipi = unsafe { &mut *ip };
    ipi.ilock();

    let mut elf = ElfHeader::create();
    if read_struct(ipi, &mut elf as *mut ElfHeader as *mut u8, 0, mem::size_of::<ElfHeader>()) {
        if elf.magic != ELF_MAGIC {
            return bad(None, ip);
        }
    } else {
        return bad(None, ip);
    }

    let Some(pgdir) = uvm_create() else {
        return bad(None, ip);
    };
    let pg = unsafe { &mut *pgdir };

    let mut sz = 0usize;
    let mut off = elf.phoff;
    for _ in 0..elf.phnum {
        let mut ph = ProgramHeader::create();
        if !read_struct(ipi, &mut ph as *mut ProgramHeader as *mut u8, off, mem::size_of::<ProgramHeader>()) {
            return bad(Some(pgdir), ip);
        }
        off += mem::size_of::<ProgramHeader>() as u32;

        if ph.hdr_type != ELF_PROG_LOAD {
            continue;
        }
        if ph.memsz < ph.filesz {
            return bad(Some(pgdir), ip);
        }
        if ph.vaddr.wrapping_add(ph.memsz) < ph.vaddr {
            return bad(Some(pgdir), ip);
        }
        if ph.vaddr as usize % PGSIZE != 0 {
            return bad(Some(pgdir), ip);
        }

        let newsz = alloc_user(pg, sz, (ph.vaddr + ph.memsz) as usize);
        if newsz == 0 {
            return bad(Some(pgdir), ip);
        }
        sz = newsz;
        if loadseg(pg, ph.vaddr as usize, ipi, ph.off, ph.filesz as usize) < 0 {
            return bad(Some(pgdir), ip);
        }
    }
    ipi.iunlockput();
    end_op();

    let p = myproc();
    let oldsz = p.sz;

    // Two pages past the next page boundary: a guard page, then the
    // user stack.
    sz = PGROUNDUP!(sz);
    let newsz = alloc_user(pg, sz, sz + 2 * PGSIZE);
    if newsz == 0 {
        return bad_late(pgdir);
    }
    sz = newsz;
    clear_user_perm(pg, sz - 2 * PGSIZE);

    let mut sp = sz;
    let stackbase = sp - PGSIZE;

    let mut ustack = [0u32; 3 + MAXARG + 1];
    let mut argc = 0usize;
    for arg in argv {
        if argc >= MAXARG {
            return bad_late(pgdir);
        }
        let n = arg.len() + 1;
        sp -= n;
        sp &= !3;
        if sp < stackbase {
            return bad_late(pgdir);
        }
        if copy_out(pg, sp, arg.as_ptr(), arg.len()).is_err() {
            return bad_late(pgdir);
        }
        // the NUL terminator: copy_out wrote arg.len() bytes, one byte
        // short of the slot reserved; write it explicitly.
        if copy_out(pg, sp + arg.len(), &0u8 as *const u8, 1).is_err() {
            return bad_late(pgdir);
        }
        ustack[3 + argc] = sp as u32;
        argc += 1;
    }
    ustack[3 + argc] = 0;

    ustack[0] = 0xffffffff; // fake return PC
    ustack[1] = argc as u32;
    ustack[2] = (sp - (argc + 1) * 4) as u32; // argv pointer

    sp -= (3 + argc + 1) * 4;
    sp &= !3;
    if sp < stackbase {
        return bad_late(pgdir);
    }
    if copy_out(pg, sp, ustack.as_ptr() as *const u8, (3 + argc + 1) * 4).is_err() {
        return bad_late(pgdir);
    }

    let mut name = [0u8; 16];
    let base = path.iter().rposition(|&c| c == b'/').map(|i| i + 1).unwrap_or(0);
    let tail = &path[base..];
    let len = core::cmp::min(tail.len(), name.len() - 1);
    name[..len].copy_from_slice(&tail[..len]);
    p.name = name;

    let oldpgdir = p.pgdir;
    p.pgdir = pgdir;
    p.sz = sz;
    let tf = unsafe { &mut *p.tf };
    tf.eip = elf.entry;
    tf.esp = sp as u32;
    switchuvm(crate::proc::mycpu(), p.pgdir, p.kstack as usize + crate::param::KSTACKSIZE);
    free_vm(oldpgdir, oldsz);

    argc as i32 // ends up in %eax, the return value main(argc, argv) sees
}

/// Used by every failure path up to and including the program-header
/// load loop, before `ip` has been unlocked/put and the transaction
/// ended.
fn bad(pgdir: Option<*mut PageTable>, ip: *mut INode) -> i32 {
    if let Some(pgdir) = pgdir {
        free_vm(pgdir, 0);
    }
    unsafe { (*ip).iunlockput() };
    end_op();
    -1
}

/// Used by every failure path after the program-header loop, where `ip`
/// has already been unlocked/put and the transaction already ended (see
/// the `iunlockput`/`end_op` call right after that loop). Calling `bad`
/// here would release/end a second time -- `INode::iunlock` panics when
/// its sleep lock isn't held, which it no longer is by this point.
fn bad_late(pgdir: *mut PageTable) -> i32 {
    free_vm(pgdir, 0);
    -1
}

fn read_struct(ip: &mut INode, dst: *mut u8, off: u32, n: usize) -> bool {
    ip.readi(false, dst, off, n) as usize == n
}

fn loadseg(pgdir: &mut PageTable, va: usize, ip: &mut INode, offset: u32, sz: usize) -> i32 {
    let mut i = 0;
    while i < sz {
        let Some(pa) = uva2ka(pgdir, va + i) else {
            panic!("exec: address should exist");
        };
        let n = core::cmp::min(sz - i, PGSIZE);
        if ip.readi(false, pa, offset + i as u32, n) as usize != n {
            return -1;
        }
        i += PGSIZE;
    }
    0
}
