// Argument fetching and the syscall dispatch table. On this 32-bit x86
// port a syscall's arguments live on the *user* stack just above the
// trap frame's `esp` (the caller's `int` pushed no register arguments),
// not in registers — grounded in
// examples/original_source/xv6/systemCall/syscall.c's `argint`/`argptr`/
// `argstr`, which read `myproc()->tf->esp + 4 + 4*n`.

use crate::proc::myproc;
use crate::vm::{fetch_int, fetch_str};

use super::sysfile::{
    sys_chdir, sys_close, sys_dup, sys_exec, sys_fstat, sys_link, sys_mkdir, sys_mknod, sys_open,
    sys_pipe, sys_read, sys_unlink, sys_write,
};
use super::sysproc::{
    sys_exit, sys_fork, sys_getpid, sys_kill, sys_sbrk, sys_sleep, sys_uptime, sys_wait,
};
use super::{
    SYS_CHDIR, SYS_CLOSE, SYS_DUP, SYS_EXEC, SYS_EXIT, SYS_FORK, SYS_FSTAT, SYS_GETPID, SYS_KILL,
    SYS_LINK, SYS_MKDIR, SYS_MKNOD, SYS_OPEN, SYS_PIPE, SYS_READ, SYS_SBRK, SYS_SLEEP, SYS_UPTIME,
    SYS_WAIT, SYS_WRITE,
};

fn argraw(n: u8) -> i32 {
    let p = myproc();
    let tf = unsafe { &*p.tf };
    let addr = tf.esp as usize + 4 + 4 * n as usize;
    fetch_int(addr).unwrap_or(-1)
}

/// Fetch the nth syscall argument as a 32-bit int.
pub(super) fn argint(n: u8) -> i32 {
    argraw(n)
}

/// Fetch the nth syscall argument as a raw user address. No bounds
/// checking here -- whatever later dereferences it (copy_in/copy_out,
/// fetch_str) does that.
pub(super) fn argaddr(n: u8) -> usize {
    argraw(n) as u32 as usize
}

/// Fetch the nth syscall argument as a pointer into user memory, checked
/// against the current process's size the same way `fetch_int` checks a
/// single word: `[addr, addr+len)` must lie entirely within `[0, p.sz)`.
/// Any syscall handler that writes or reads a fixed-size struct through a
/// user pointer (`fstat`, `pipe`) must go through this rather than raw
/// `argaddr`, which performs no such check.
pub(super) fn argptr(n: u8, len: usize) -> Option<usize> {
    let addr = argaddr(n);
    let p = myproc();
    let end = addr.checked_add(len)?;
    if end > p.sz {
        return None;
    }
    Some(addr)
}

/// Fetch the nth syscall argument as a NUL-terminated user string,
/// returning a slice directly over user memory (valid only while this
/// process remains current).
pub(super) fn argstr(n: u8) -> Option<&'static [u8]> {
    let addr = argaddr(n);
    fetch_str(addr).map(|(ptr, len)| unsafe { core::slice::from_raw_parts(ptr, len) })
}

/// Fetch the nth syscall argument as an open file descriptor, returning
/// its number and the `*mut File` it names.
pub(super) fn argfd(n: u8) -> Option<(usize, *mut crate::file::File)> {
    let fd = argint(n);
    if fd < 0 || fd as usize >= crate::param::NOFILE {
        return None;
    }
    let f = myproc().ofile[fd as usize];
    if f.is_null() {
        return None;
    }
    Some((fd as usize, f))
}

const NSYSCALL: usize = 22;
const SYSCALL: [Option<fn() -> i32>; NSYSCALL] = {
    let mut arr: [Option<fn() -> i32>; NSYSCALL] = [None; NSYSCALL];
    arr[SYS_FORK as usize] = Some(sys_fork);
    arr[SYS_EXIT as usize] = Some(sys_exit);
    arr[SYS_WAIT as usize] = Some(sys_wait);
    arr[SYS_PIPE as usize] = Some(sys_pipe);
    arr[SYS_READ as usize] = Some(sys_read);
    arr[SYS_KILL as usize] = Some(sys_kill);
    arr[SYS_EXEC as usize] = Some(sys_exec);
    arr[SYS_FSTAT as usize] = Some(sys_fstat);
    arr[SYS_CHDIR as usize] = Some(sys_chdir);
    arr[SYS_DUP as usize] = Some(sys_dup);
    arr[SYS_GETPID as usize] = Some(sys_getpid);
    arr[SYS_SBRK as usize] = Some(sys_sbrk);
    arr[SYS_SLEEP as usize] = Some(sys_sleep);
    arr[SYS_UPTIME as usize] = Some(sys_uptime);
    arr[SYS_OPEN as usize] = Some(sys_open);
    arr[SYS_WRITE as usize] = Some(sys_write);
    arr[SYS_MKNOD as usize] = Some(sys_mknod);
    arr[SYS_UNLINK as usize] = Some(sys_unlink);
    arr[SYS_LINK as usize] = Some(sys_link);
    arr[SYS_MKDIR as usize] = Some(sys_mkdir);
    arr[SYS_CLOSE as usize] = Some(sys_close);
    arr
};

pub fn syscall() {
    let p = myproc();
    let tf = unsafe { &mut *p.tf };
    let num = tf.eax as usize;

    if num > 0 && num < SYSCALL.len() {
        if let Some(handler) = SYSCALL[num] {
            tf.eax = handler() as u32;
            return;
        }
    }

    let name_len = p.name.iter().position(|&c| c == 0).unwrap_or(p.name.len());
    log::warn!(
        "{} {}: unknown sys call {}",
        p.pid,
        core::str::from_utf8(&p.name[..name_len]).unwrap_or("?"),
        num
    );
    tf.eax = u32::MAX;
}
