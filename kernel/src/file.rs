// Open file table and the major-device switch. Grounded in
// examples/LENSHOOD-xv6-rust/kernel/src/file/mod.rs and file/file.rs,
// adapted from reference-counted `&mut` handles to the raw-pointer style
// the rest of this x86 port uses for cross-process-table objects, and
// from examples/original_source/xv6/fileSystem/file.c.

use crate::fs::INode;
use crate::fslog::{begin_op, end_op};
use crate::param::NFILE;
use crate::pipe::Pipe;
use crate::spinlock::Spinlock;

pub const O_RDONLY: i32 = 0x000;
pub const O_WRONLY: i32 = 0x001;
pub const O_RDWR: i32 = 0x002;
pub const O_CREATE: i32 = 0x200;
pub const O_TRUNC: i32 = 0x400;

#[derive(Copy, Clone, PartialEq, Eq)]
enum FdType {
    None,
    Pipe,
    Inode,
    Device,
}

#[derive(Copy, Clone)]
pub struct File {
    fd_type: FdType,
    ref_cnt: i32,
    pub readable: bool,
    pub writable: bool,
    pipe: *mut Pipe,
    pub ip: *mut INode,
    pub off: u32,
    pub major: i16,
}

impl File {
    pub const fn create() -> Self {
        File {
            fd_type: FdType::None,
            ref_cnt: 0,
            readable: false,
            writable: false,
            pipe: core::ptr::null_mut(),
            ip: core::ptr::null_mut(),
            off: 0,
            major: 0,
        }
    }
}

/// Map a major device number onto its read/write entry points. `CONSOLE`
/// is the only device wired up by this kernel.
pub trait Devsw {
    fn read(&mut self, is_user_dst: bool, dst: usize, sz: usize) -> i32;
    fn write(&mut self, is_user_src: bool, src: usize, sz: usize) -> i32;
}

pub const CONSOLE: usize = 1;
pub static mut DEVSW: [Option<*mut dyn Devsw>; NFILE_DEVS] = [None; NFILE_DEVS];
const NFILE_DEVS: usize = crate::param::NDEV;

struct FTable {
    lock: Spinlock,
    file: [File; NFILE],
}

static mut FTABLE: FTable = FTable {
    lock: Spinlock::init_lock("ftable"),
    file: [File::create(); NFILE],
};

pub fn fileinit() {
    // FTABLE is already fully initialized as a static.
}

/// Find a free slot in the system file table and claim it.
pub fn filealloc() -> *mut File {
    unsafe {
        FTABLE.lock.acquire();
        for f in FTABLE.file.iter_mut() {
            if f.ref_cnt == 0 {
                f.ref_cnt = 1;
                FTABLE.lock.release();
                return f as *mut File;
            }
        }
        FTABLE.lock.release();
        core::ptr::null_mut()
    }
}

pub fn filedup(f: *mut File) -> *mut File {
    unsafe {
        FTABLE.lock.acquire();
        let file = &mut *f;
        if file.ref_cnt < 1 {
            panic!("filedup");
        }
        file.ref_cnt += 1;
        FTABLE.lock.release();
    }
    f
}

/// Drop a reference; once it hits zero, release the underlying pipe end
/// or inode. Must not be called while `f` is null.
pub fn fileclose(f: *mut File) {
    unsafe {
        FTABLE.lock.acquire();
        let file = &mut *f;
        if file.ref_cnt < 1 {
            panic!("fileclose");
        }
        file.ref_cnt -= 1;
        if file.ref_cnt > 0 {
            FTABLE.lock.release();
            return;
        }
        let fd_type = file.fd_type;
        let pipe = file.pipe;
        let writable = file.writable;
        let ip = file.ip;

        file.ref_cnt = 0;
        file.fd_type = FdType::None;
        FTABLE.lock.release();

        match fd_type {
            FdType::Pipe => crate::pipe::pipeclose(pipe, writable),
            FdType::Inode | FdType::Device => {
                begin_op();
                crate::fs::iput(ip);
                end_op();
            }
            FdType::None => {}
        }
    }
}

/// Dispatch a read through a pipe, device, or inode, depending on how
/// `f` was opened.
pub fn fileread(f: *mut File, addr: usize, n: usize) -> i32 {
    unsafe {
        let file = &mut *f;
        if !file.readable {
            return -1;
        }
        match file.fd_type {
            FdType::Pipe => crate::pipe::piperead(file.pipe, addr, n),
            FdType::Device => {
                if file.major < 0 || file.major as usize >= crate::param::NDEV {
                    return -1;
                }
                match DEVSW[file.major as usize] {
                    Some(dev) => (*dev).read(true, addr, n),
                    None => -1,
                }
            }
            FdType::Inode => {
                let ip = &mut *file.ip;
                ip.ilock();
                let r = ip.readi(true, addr as *mut u8, file.off, n);
                if r > 0 {
                    file.off += r as u32;
                }
                ip.iunlock();
                r as i32
            }
            FdType::None => -1,
        }
    }
}

/// Dispatch a write, chunking at `MAXOPBLOCKS/2` worth of blocks per
/// transaction the same way the original `filewrite` does, so a single
/// large write can't overrun the journaling log.
pub fn filewrite(f: *mut File, addr: usize, n: usize) -> i32 {
    unsafe {
        let file = &mut *f;
        if !file.writable {
            return -1;
        }
        match file.fd_type {
            FdType::Pipe => crate::pipe::pipewrite(file.pipe, addr, n),
            FdType::Device => {
                if file.major < 0 || file.major as usize >= crate::param::NDEV {
                    return -1;
                }
                match DEVSW[file.major as usize] {
                    Some(dev) => (*dev).write(true, addr, n),
                    None => -1,
                }
            }
            FdType::Inode => {
                let max = ((crate::param::MAXOPBLOCKS - 1 - 1 - 2) / 2) * crate::fs::BSIZE;
                let mut i = 0usize;
                let mut ret = 0i32;
                while i < n {
                    let n1 = core::cmp::min(n - i, max);
                    begin_op();
                    let ip = &mut *file.ip;
                    ip.ilock();
                    let r = ip.writei(true, (addr + i) as *const u8, file.off, n1);
                    if r > 0 {
                        file.off += r as u32;
                    }
                    ip.iunlock();
                    end_op();

                    if r != n1 as isize {
                        ret = -1;
                        break;
                    }
                    i += r as usize;
                    ret = i as i32;
                }
                ret
            }
            FdType::None => -1,
        }
    }
}

/// Populate `*st` from the inode behind `f`. Fails only for pipes.
pub fn filestat(f: *mut File, st: *mut crate::stat::Stat) -> i32 {
    unsafe {
        let file = &mut *f;
        match file.fd_type {
            FdType::Inode | FdType::Device => {
                let ip = &mut *file.ip;
                ip.ilock();
                ip.stati(st);
                ip.iunlock();
                0
            }
            _ => -1,
        }
    }
}

pub fn file_set_inode(f: *mut File, is_device: bool, ip: *mut INode, major: i16) {
    unsafe {
        let file = &mut *f;
        file.fd_type = if is_device { FdType::Device } else { FdType::Inode };
        file.ip = ip;
        file.off = 0;
        file.major = major;
    }
}

pub fn file_set_pipe(f: *mut File, pipe: *mut Pipe) {
    unsafe {
        let file = &mut *f;
        file.fd_type = FdType::Pipe;
        file.pipe = pipe;
        file.off = 0;
    }
}
