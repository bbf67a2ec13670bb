// One cached disk block. Grounded in
// examples/LENSHOOD-xv6-rust/kernel/src/buf.rs and
// examples/original_source/xv6/fileSystem/buf.h.

use crate::fs::BSIZE;
use crate::sleeplock::Sleeplock;
use core::ptr::NonNull;

#[derive(Copy, Clone)]
pub struct Buf {
    pub valid: bool,
    pub disk: bool,
    pub dev: u32,
    pub blockno: u32,
    pub lock: Sleeplock,
    pub refcnt: u32,
    pub prev: Option<NonNull<Buf>>,
    pub next: Option<NonNull<Buf>>,
    pub qnext: *mut Buf,
    pub data: [u8; BSIZE],
}

impl Buf {
    pub const fn new() -> Self {
        Buf {
            valid: false,
            disk: false,
            dev: 0,
            blockno: 0,
            lock: Sleeplock::init_lock("buffer"),
            refcnt: 0,
            prev: None,
            next: None,
            qnext: core::ptr::null_mut(),
            data: [0; BSIZE],
        }
    }
}
