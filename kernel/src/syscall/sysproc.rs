// Process-control syscalls. Thin wrappers around the primitives already
// implemented in crate::proc -- grounded in
// examples/original_source/xv6/systemCall/sysproc.c. Unlike the teacher's
// sysproc.rs, which re-implements fork/exit/wait locally, this port's
// proc.rs already carries full implementations, so these handlers just
// fetch arguments and call through.

use super::syscall::argint;
use crate::proc::{self, myproc};
use crate::trap::{TICKS, TICKSLOCK};

pub(super) fn sys_fork() -> i32 {
    proc::fork()
}

pub(super) fn sys_exit() -> i32 {
    proc::exit()
}

pub(super) fn sys_wait() -> i32 {
    proc::wait()
}

pub(super) fn sys_kill() -> i32 {
    let pid = argint(0);
    proc::kill(pid)
}

pub(super) fn sys_getpid() -> i32 {
    myproc().pid
}

pub(super) fn sys_sbrk() -> i32 {
    let n = argint(0) as isize;
    let old_sz = myproc().sz;
    if !proc::growproc(n) {
        return -1;
    }
    old_sz as i32
}

pub(super) fn sys_sleep() -> i32 {
    let n = argint(0);
    if n < 0 {
        return -1;
    }
    let n = n as u32;

    unsafe {
        TICKSLOCK.acquire();
        let ticks0 = TICKS;
        while TICKS.wrapping_sub(ticks0) < n {
            if myproc().killed {
                TICKSLOCK.release();
                return -1;
            }
            proc::sleep(&TICKS as *const u32 as usize, &mut TICKSLOCK);
        }
        TICKSLOCK.release();
    }
    0
}

pub(super) fn sys_uptime() -> i32 {
    unsafe {
        TICKSLOCK.acquire();
        let ticks = TICKS;
        TICKSLOCK.release();
        ticks as i32
    }
}
