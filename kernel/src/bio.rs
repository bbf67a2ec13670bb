// Buffer cache.
//
// A linked list of `Buf` structures holding cached copies of disk block
// contents. Caching disk blocks in memory reduces the number of disk
// reads and gives multiple processes a synchronization point over the
// same block.
//
// Interface:
// * To get a buffer for a particular disk block, call `bread`.
// * After changing buffer data, call `bwrite` to write it to disk.
// * When done with the buffer, call `brelse`.
// * Do not use the buffer after calling `brelse`.
// * Only one process at a time can use a buffer, so do not keep one
//   longer than necessary.
//
// Grounded in examples/LENSHOOD-xv6-rust/kernel/src/bio.rs, with the
// virtio-mmio transport swapped for this port's IDE driver.

use core::ptr::NonNull;

use crate::buf::Buf;
use crate::ide::ide_rw;
use crate::param::NBUF;
use crate::spinlock::Spinlock;

struct BCache {
    lock: Spinlock,
    buf: [Buf; NBUF],
    head: NonNull<Buf>,
}

static mut DUMMY_HEAD: Buf = Buf::new();
static mut BCACHE: BCache = BCache {
    lock: Spinlock::init_lock("bcache"),
    buf: [Buf::new(); NBUF],
    head: unsafe { NonNull::new_unchecked((&mut DUMMY_HEAD) as *mut Buf) },
};

pub fn binit() {
    unsafe {
        // BCACHE.buf is NBUF blocks of BSIZE bytes each -- too big to build
        // on the stack and move in (4 KiB kernel stacks per CPU), so it's
        // initialized directly in the static and linked up here.
        let head = BCACHE.head.as_ptr().as_mut().unwrap();
        head.prev = Some(BCACHE.head);
        head.next = Some(BCACHE.head);
        for b in &mut BCACHE.buf {
            b.next = head.next;
            b.prev = Some(BCACHE.head);

            let head_next = head.next.unwrap().as_mut();
            head_next.prev = NonNull::new(b as *mut Buf);
            head.next = NonNull::new(b as *mut Buf);
        }
    }
}

/// Find the buffer for `(dev, blockno)`, or recycle the least-recently-used
/// unused one. Returns it locked either way.
fn bget(dev: u32, blockno: u32) -> &'static mut Buf {
    unsafe {
        BCACHE.lock.acquire();

        let head_ptr = BCACHE.head.as_ptr();
        let head = head_ptr.as_ref().unwrap();
        let mut b_ptr = head.next.unwrap().as_ptr();
        while b_ptr != head_ptr {
            let b = b_ptr.as_mut().unwrap();
            if b.dev == dev && b.blockno == blockno {
                b.refcnt += 1;
                BCACHE.lock.release();
                b.lock.acquire_sleep();
                return b;
            }
            b_ptr = b.next.unwrap().as_ptr();
        }

        let mut b_ptr = head.prev.unwrap().as_ptr();
        while b_ptr != head_ptr {
            let b = b_ptr.as_mut().unwrap();
            if b.refcnt == 0 {
                b.dev = dev;
                b.blockno = blockno;
                b.valid = false;
                b.refcnt = 1;
                BCACHE.lock.release();
                b.lock.acquire_sleep();
                return b;
            }
            b_ptr = b.prev.unwrap().as_ptr();
        }
    }

    panic!("bget: no buffers");
}

pub fn bread(dev: u32, blockno: u32) -> &'static mut Buf {
    let b = bget(dev, blockno);
    if !b.valid {
        ide_rw(b, false);
        b.valid = true;
    }
    b
}

pub fn bwrite(b: &mut Buf) {
    if !b.lock.holding_sleep() {
        panic!("bwrite");
    }
    ide_rw(b, true);
}

/// Release a locked buffer, moving it to the head of the
/// most-recently-used list.
pub fn brelse(b: &mut Buf) {
    if !b.lock.holding_sleep() {
        panic!("brelse");
    }

    b.lock.release_sleep();
    unsafe {
        BCACHE.lock.acquire();
        b.refcnt -= 1;
        if b.refcnt == 0 {
            b.next.unwrap().as_mut().prev = b.prev;
            b.prev.unwrap().as_mut().next = b.next;

            let head = BCACHE.head.as_mut();
            b.next = head.next;
            b.prev = Some(BCACHE.head);

            let nn = NonNull::new_unchecked(b as *mut Buf);
            head.next.unwrap().as_mut().prev = Some(nn);
            head.next = Some(nn);
        }

        BCACHE.lock.release();
    }
}

pub fn bpin(b: &mut Buf) {
    unsafe {
        BCACHE.lock.acquire();
        b.refcnt += 1;
        BCACHE.lock.release();
    }
}

pub fn bunpin(b: &mut Buf) {
    unsafe {
        BCACHE.lock.acquire();
        b.refcnt -= 1;
        BCACHE.lock.release();
    }
}
