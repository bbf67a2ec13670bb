// Anonymous pipes. Grounded in
// examples/LENSHOOD-xv6-rust/kernel/src/pipe.rs (close()) and
// examples/original_source/xv6/fileSystem/pipe.c (alloc/read/write),
// restructured around raw `*mut Pipe`/`*mut File` handles instead of
// borrowed references to match this port's process/file-table style.

use crate::file::{file_set_pipe, filealloc, fileclose, File};
use crate::kalloc::KMEM;
use crate::proc::{myproc, sleep, wakeup};
use crate::spinlock::Spinlock;
use crate::vm::{copy_in, copy_out};

const PIPESIZE: usize = 512;

pub struct Pipe {
    lock: Spinlock,
    data: [u8; PIPESIZE],
    nread: u32,
    nwrite: u32,
    readopen: bool,
    writeopen: bool,
}

/// Allocate a fresh pipe plus a read and a write `File`, wired up so the
/// caller only needs to install the returned fds. Returns `(read_file,
/// write_file)` or fails if any of the three allocations do.
pub fn pipealloc() -> Option<(*mut File, *mut File)> {
    let rf = filealloc();
    let wf = filealloc();
    if rf.is_null() || wf.is_null() {
        if !rf.is_null() {
            fileclose(rf);
        }
        if !wf.is_null() {
            fileclose(wf);
        }
        return None;
    }

    let page = unsafe { KMEM.kalloc() };
    if page.is_null() {
        fileclose(rf);
        fileclose(wf);
        return None;
    }
    let pipe = page as *mut Pipe;
    unsafe {
        core::ptr::write(
            pipe,
            Pipe {
                lock: Spinlock::init_lock("pipe"),
                data: [0; PIPESIZE],
                nread: 0,
                nwrite: 0,
                readopen: true,
                writeopen: true,
            },
        );
    }

    unsafe {
        (*rf).readable = true;
        (*rf).writable = false;
        (*wf).readable = false;
        (*wf).writable = true;
    }
    file_set_pipe(rf, pipe);
    file_set_pipe(wf, pipe);

    Some((rf, wf))
}

pub fn pipeclose(p: *mut Pipe, writable: bool) {
    unsafe {
        let pipe = &mut *p;
        pipe.lock.acquire();
        if writable {
            pipe.writeopen = false;
            wakeup(&pipe.nread as *const u32 as usize);
        } else {
            pipe.readopen = false;
            wakeup(&pipe.nwrite as *const u32 as usize);
        }
        if !pipe.readopen && !pipe.writeopen {
            pipe.lock.release();
            KMEM.kfree(p as *mut u8);
        } else {
            pipe.lock.release();
        }
    }
}

/// Copy up to `n` bytes from user address `addr` into the pipe's
/// circular buffer, blocking when it fills. Returns bytes written, or
/// -1 if the read end closed or the writer was killed mid-write.
pub fn pipewrite(p: *mut Pipe, addr: usize, n: usize) -> i32 {
    let pipe = unsafe { &mut *p };
    pipe.lock.acquire();
    let mut i = 0usize;
    while i < n {
        if !pipe.readopen || myproc().killed {
            pipe.lock.release();
            return -1;
        }
        if pipe.nwrite == pipe.nread.wrapping_add(PIPESIZE as u32) {
            wakeup(&pipe.nread as *const u32 as usize);
            sleep(&pipe.nwrite as *const u32 as usize, &mut pipe.lock);
            continue;
        }
        let mut byte: u8 = 0;
        if copy_in(&mut byte as *mut u8, addr + i, 1).is_err() {
            break;
        }
        let idx = (pipe.nwrite % PIPESIZE as u32) as usize;
        pipe.data[idx] = byte;
        pipe.nwrite = pipe.nwrite.wrapping_add(1);
        i += 1;
    }
    wakeup(&pipe.nread as *const u32 as usize);
    pipe.lock.release();
    i as i32
}

/// Read up to `n` bytes into user address `addr`, blocking until at
/// least one byte is available or the write end closes. Returns bytes
/// read.
pub fn piperead(p: *mut Pipe, addr: usize, n: usize) -> i32 {
    let pipe = unsafe { &mut *p };
    pipe.lock.acquire();
    while pipe.nread == pipe.nwrite && pipe.writeopen {
        if myproc().killed {
            pipe.lock.release();
            return -1;
        }
        sleep(&pipe.nread as *const u32 as usize, &mut pipe.lock);
    }
    let mut i = 0usize;
    while i < n && pipe.nread != pipe.nwrite {
        let idx = (pipe.nread % PIPESIZE as u32) as usize;
        let byte = pipe.data[idx];
        pipe.nread = pipe.nread.wrapping_add(1);
        if copy_out(unsafe { &mut *myproc().pgdir }, addr + i, &byte as *const u8, 1).is_err() {
            break;
        }
        i += 1;
    }
    wakeup(&pipe.nwrite as *const u32 as usize);
    pipe.lock.release();
    i as i32
}
