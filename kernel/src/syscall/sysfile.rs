// File-system syscalls. Mostly argument checking, since user code isn't
// trusted -- grounded in examples/original_source/xv6/systemCall/sysfile.c
// and examples/LENSHOOD-xv6-rust/kernel/src/syscall/sysfile.rs.

use core::mem;

use super::syscall::{argaddr, argfd, argint, argptr, argstr};
use crate::file::{
    self, fileclose, filedup, filestat, File, O_CREATE, O_RDWR, O_TRUNC, O_WRONLY,
};
use crate::fs::{dirlink, dirlookup, ialloc, namei, nameiparent, DIRSIZ};
use crate::fslog::{begin_op, end_op};
use crate::param::{MAXARG, NOFILE};
use crate::pipe::pipealloc;
use crate::proc::myproc;
use crate::stat::FileType;

/// Allocate the lowest-numbered free descriptor in the caller's table
/// for `f`.
fn fdalloc(f: *mut File) -> i32 {
    let p = myproc();
    for fd in 0..NOFILE {
        if p.ofile[fd].is_null() {
            p.ofile[fd] = f;
            return fd as i32;
        }
    }
    -1
}

/// True if `dp` contains nothing but the standard `.`/`..` entries.
fn isdirempty(dp: *mut crate::fs::INode) -> bool {
    let dp = unsafe { &mut *dp };
    let sz = mem::size_of::<crate::fs::Dirent>() as u32;
    let mut de = crate::fs::Dirent { inum: 0, name: [0; DIRSIZ] };
    let mut off = 2 * sz;
    while off < dp.size {
        if dp.readi(false, &mut de as *mut crate::fs::Dirent as *mut u8, off, sz as usize) as u32 != sz {
            panic!("isdirempty: readi");
        }
        if de.inum != 0 {
            return false;
        }
        off += sz;
    }
    true
}

/// Create a file or directory at `path`. Must be called inside a
/// begin_op/end_op transaction. Returns a locked, referenced inode.
///
/// The original C `create()` panics on every failure past this point
/// (disk corruption, essentially); this port can't panic its way out of
/// an ordinary name collision, so dirlink failures here unwind with an
/// explicit rollback of the nlink bump, rather than the panic the
/// original uses.
fn create(path: &[u8], file_type: FileType, major: i16, minor: i16) -> Option<*mut crate::fs::INode> {
    let (dp, (nstart, nend)) = nameiparent(path);
    let dp = dp?;
    let name = &path[nstart..nend];

    let dpi = unsafe { &mut *dp };
    dpi.ilock();

    if let Some(ip) = dirlookup(dp, name, &mut 0) {
        dpi.iunlockput();
        let ipi = unsafe { &mut *ip };
        ipi.ilock();
        if file_type == FileType::File && ipi.file_type == FileType::File {
            return Some(ip);
        }
        ipi.iunlockput();
        return None;
    }

    let ip = ialloc(dpi.dev, file_type);
    if ip.is_null() {
        panic!("create: ialloc");
    }
    let ipi = unsafe { &mut *ip };
    ipi.ilock();
    ipi.major = major;
    ipi.minor = minor;
    ipi.nlink = 1;
    ipi.iupdate();

    if file_type == FileType::Dir {
        dpi.nlink += 1;
        dpi.iupdate();
        // No nlink bump for ".": avoid a cyclic ref count.
        if dirlink(ip, b".", ipi.inum as u16).is_err() || dirlink(ip, b"..", dpi.inum as u16).is_err() {
            panic!("create: dots");
        }
    }

    if dirlink(dp, name, ipi.inum as u16).is_err() {
        panic!("create: dirlink");
    }

    dpi.iunlockput();
    Some(ip)
}

pub(super) fn sys_dup() -> i32 {
    let Some((_fd, f)) = argfd(0) else { return -1 };
    let newfd = fdalloc(f);
    if newfd < 0 {
        return -1;
    }
    filedup(f);
    newfd
}

pub(super) fn sys_read() -> i32 {
    let Some((_fd, f)) = argfd(0) else { return -1 };
    let addr = argaddr(1);
    let n = argint(2);
    if n < 0 {
        return -1;
    }
    file::fileread(f, addr, n as usize)
}

pub(super) fn sys_write() -> i32 {
    let Some((_fd, f)) = argfd(0) else { return -1 };
    let addr = argaddr(1);
    let n = argint(2);
    if n < 0 {
        return -1;
    }
    file::filewrite(f, addr, n as usize)
}

pub(super) fn sys_close() -> i32 {
    let Some((fd, f)) = argfd(0) else { return -1 };
    myproc().ofile[fd] = core::ptr::null_mut();
    fileclose(f);
    0
}

pub(super) fn sys_fstat() -> i32 {
    let Some((_fd, f)) = argfd(0) else { return -1 };
    let Some(addr) = argptr(1, mem::size_of::<crate::stat::Stat>()) else { return -1 };
    filestat(f, addr as *mut crate::stat::Stat)
}

pub(super) fn sys_link() -> i32 {
    let Some(old) = argstr(0) else { return -1 };
    let Some(new) = argstr(1) else { return -1 };

    begin_op();
    let Some(ip) = namei(old) else {
        end_op();
        return -1;
    };

    let ipi = unsafe { &mut *ip };
    ipi.ilock();
    if ipi.file_type == FileType::Dir {
        ipi.iunlockput();
        end_op();
        return -1;
    }

    ipi.nlink += 1;
    ipi.iupdate();
    ipi.iunlock();

    let (dp, (nstart, nend)) = nameiparent(new);
    let Some(dp) = dp else {
        ipi.ilock();
        ipi.nlink -= 1;
        ipi.iupdate();
        ipi.iunlockput();
        end_op();
        return -1;
    };
    let name = &new[nstart..nend];

    let dpi = unsafe { &mut *dp };
    dpi.ilock();
    if dpi.dev != ipi.dev || dirlink(dp, name, ipi.inum as u16).is_err() {
        dpi.iunlockput();
        ipi.ilock();
        ipi.nlink -= 1;
        ipi.iupdate();
        ipi.iunlockput();
        end_op();
        return -1;
    }
    dpi.iunlockput();
    crate::fs::iput(ip);

    end_op();
    0
}

pub(super) fn sys_unlink() -> i32 {
    let Some(path) = argstr(0) else { return -1 };

    begin_op();
    let (dp, (nstart, nend)) = nameiparent(path);
    let Some(dp) = dp else {
        end_op();
        return -1;
    };
    let name = &path[nstart..nend];

    let dpi = unsafe { &mut *dp };
    dpi.ilock();

    if name == b"." || name == b".." {
        dpi.iunlockput();
        end_op();
        return -1;
    }

    let mut off = 0u32;
    let Some(ip) = dirlookup(dp, name, &mut off) else {
        dpi.iunlockput();
        end_op();
        return -1;
    };
    let ipi = unsafe { &mut *ip };
    ipi.ilock();

    if ipi.nlink < 1 {
        panic!("unlink: nlink < 1");
    }
    if ipi.file_type == FileType::Dir && !isdirempty(ip) {
        ipi.iunlockput();
        dpi.iunlockput();
        end_op();
        return -1;
    }

    let de = crate::fs::Dirent { inum: 0, name: [0; DIRSIZ] };
    let sz = mem::size_of::<crate::fs::Dirent>();
    if dpi.writei(false, &de as *const crate::fs::Dirent as *const u8, off, sz) as usize != sz {
        panic!("unlink: writei");
    }
    if ipi.file_type == FileType::Dir {
        dpi.nlink -= 1;
        dpi.iupdate();
    }
    dpi.iunlockput();

    ipi.nlink -= 1;
    ipi.iupdate();
    ipi.iunlockput();

    end_op();
    0
}

pub(super) fn sys_open() -> i32 {
    let Some(path) = argstr(0) else { return -1 };
    let omode = argint(1);

    begin_op();

    let ip = if omode & O_CREATE != 0 {
        match create(path, FileType::File, 0, 0) {
            Some(ip) => ip,
            None => {
                end_op();
                return -1;
            }
        }
    } else {
        let Some(ip) = namei(path) else {
            end_op();
            return -1;
        };
        let ipi = unsafe { &mut *ip };
        ipi.ilock();
        if ipi.file_type == FileType::Dir && omode != crate::file::O_RDONLY {
            ipi.iunlockput();
            end_op();
            return -1;
        }
        ip
    };

    let ipi = unsafe { &mut *ip };
    let f = file::filealloc();
    let fd = if f.is_null() { -1 } else { fdalloc(f) };
    if f.is_null() || fd < 0 {
        if !f.is_null() {
            fileclose(f);
        }
        ipi.iunlockput();
        end_op();
        return -1;
    }

    let is_device = ipi.file_type == FileType::Device;
    file::file_set_inode(f, is_device, ip, ipi.major);
    unsafe {
        (*f).readable = omode & O_WRONLY == 0;
        (*f).writable = (omode & O_WRONLY != 0) || (omode & O_RDWR != 0);
    }

    if omode & O_TRUNC != 0 && ipi.file_type == FileType::File {
        ipi.itrunc();
    }

    ipi.iunlock();
    end_op();
    fd
}

pub(super) fn sys_mkdir() -> i32 {
    begin_op();
    let Some(path) = argstr(0) else {
        end_op();
        return -1;
    };
    let Some(ip) = create(path, FileType::Dir, 0, 0) else {
        end_op();
        return -1;
    };
    unsafe { (*ip).iunlockput() };
    end_op();
    0
}

pub(super) fn sys_mknod() -> i32 {
    begin_op();
    let Some(path) = argstr(0) else {
        end_op();
        return -1;
    };
    let major = argint(1);
    let minor = argint(2);
    let Some(ip) = create(path, FileType::Device, major as i16, minor as i16) else {
        end_op();
        return -1;
    };
    unsafe { (*ip).iunlockput() };
    end_op();
    0
}

pub(super) fn sys_chdir() -> i32 {
    let p = myproc();

    begin_op();
    let Some(path) = argstr(0) else {
        end_op();
        return -1;
    };
    let Some(ip) = namei(path) else {
        end_op();
        return -1;
    };

    let ipi = unsafe { &mut *ip };
    ipi.ilock();
    if ipi.file_type != FileType::Dir {
        ipi.iunlockput();
        end_op();
        return -1;
    }
    ipi.iunlock();
    crate::fs::iput(p.cwd);
    end_op();
    p.cwd = ip;
    0
}

pub(super) fn sys_exec() -> i32 {
    let Some(path) = argstr(0) else { return -1 };
    let uargv = argaddr(1);

    let mut argv: [&[u8]; MAXARG] = [&[]; MAXARG];
    let mut argc = 0usize;
    for i in 0..MAXARG {
        let Some(uarg) = crate::vm::fetch_int(uargv + 4 * i) else { return -1 };
        let uarg = uarg as u32 as usize;
        if uarg == 0 {
            break;
        }
        let Some((ptr, len)) = crate::vm::fetch_str(uarg) else { return -1 };
        argv[i] = unsafe { core::slice::from_raw_parts(ptr, len) };
        argc = i + 1;
    }

    crate::exec::exec(path, &argv[..argc])
}

pub(super) fn sys_pipe() -> i32 {
    let fdarray_addr = argaddr(0);

    let Some((rf, wf)) = pipealloc() else { return -1 };

    let fd0 = fdalloc(rf);
    let fd1 = if fd0 >= 0 { fdalloc(wf) } else { -1 };
    if fd0 < 0 || fd1 < 0 {
        if fd0 >= 0 {
            myproc().ofile[fd0 as usize] = core::ptr::null_mut();
        }
        fileclose(rf);
        fileclose(wf);
        return -1;
    }

    let pgdir = unsafe { &mut *myproc().pgdir };
    let fds = [fd0 as i32, fd1 as i32];
    if crate::vm::copy_out(pgdir, fdarray_addr, fds.as_ptr() as *const u8, mem::size_of::<[i32; 2]>()).is_err() {
        myproc().ofile[fd0 as usize] = core::ptr::null_mut();
        myproc().ofile[fd1 as usize] = core::ptr::null_mut();
        fileclose(rf);
        fileclose(wf);
        return -1;
    }

    0
}
