// Simple write-ahead log that lets concurrent file-system calls commit
// as one redo transaction.
//
// A transaction contains the updates of multiple file system calls; the
// log only commits once none of them are still in progress, so nothing
// ever has to reason about a commit racing an uncommitted call. A
// syscall brackets its updates with `begin_op`/`end_op`: `begin_op`
// usually just bumps a count of in-progress calls, but sleeps if it
// looks like the log is close to full. `end_op` commits once the last
// in-progress call finishes.
//
// On-disk log format:
//   header block, listing the block numbers that follow
//   block A
//   block B
//   ...
// Log appends are synchronous.
//
// Grounded in examples/LENSHOOD-xv6-rust/kernel/src/log.rs (which
// carries `initlog`/`recover_from_log`/`read_head`/`install_trans`/
// `write_head`/`log_write`) and examples/original_source/xv6/fileSystem/
// log.c (source for the missing `begin_op`/`end_op`/`commit`/
// `write_log`). Named `fslog` rather than `log` to keep this journal
// distinct from the `log` crate's leveled diagnostics.

use core::mem;

use crate::bio::{bpin, bread, brelse, bunpin, bwrite};
use crate::buf::Buf;
use crate::fs::{SuperBlock, BSIZE};
use crate::param::{LOGSIZE, MAXOPBLOCKS};
use crate::proc::{sleep, wakeup};
use crate::spinlock::Spinlock;

struct LogHeader {
    n: u32,
    block: [u32; LOGSIZE],
}

struct Log {
    lock: Spinlock,
    start: u32,
    size: u32,
    outstanding: u32,
    committing: bool,
    dev: u32,
    lh: LogHeader,
}

static mut LOG: Log = Log {
    lock: Spinlock::init_lock("log"),
    start: 0,
    size: 0,
    outstanding: 0,
    committing: false,
    dev: 0,
    lh: LogHeader { n: 0, block: [0; LOGSIZE] },
};

pub fn initlog(dev: u32, sb: &SuperBlock) {
    if mem::size_of::<LogHeader>() >= BSIZE {
        panic!("initlog: too big logheader");
    }

    unsafe {
        LOG.start = sb.logstart;
        LOG.size = sb.nlog;
        LOG.dev = dev;
        recover_from_log();
    }
}

unsafe fn recover_from_log() {
    read_head();
    install_trans(true);
    LOG.lh.n = 0;
    write_head();
}

unsafe fn read_head() {
    let buf = bread(LOG.dev, LOG.start);
    let (_head, body, _tail) = buf.data[0..mem::size_of::<LogHeader>()].align_to::<LogHeader>();
    let lh = &body[0];
    LOG.lh.n = lh.n;
    for i in 0..LOG.lh.n as usize {
        LOG.lh.block[i] = lh.block[i];
    }
    brelse(buf);
}

/// Copy committed blocks from the log to their home locations. `recovering`
/// is set only during boot recovery, when the blocks aren't already pinned.
unsafe fn install_trans(recovering: bool) {
    for tail in 0..LOG.lh.n as usize {
        let lbuf = bread(LOG.dev, LOG.start + tail as u32 + 1);
        let dbuf = bread(LOG.dev, LOG.lh.block[tail]);
        dbuf.data[..].clone_from_slice(&lbuf.data[..]);
        bwrite(dbuf);
        if !recovering {
            bunpin(dbuf);
        }
        brelse(lbuf);
        brelse(dbuf);
    }
}

/// Write the in-memory log header to disk. This is the true commit
/// point, and also how a transaction's blocks are erased once installed.
unsafe fn write_head() {
    let buf = bread(LOG.dev, LOG.start);
    let (_head, body, _tail) = buf.data[0..mem::size_of::<LogHeader>()].align_to_mut::<LogHeader>();
    let hb = &mut body[0];
    hb.n = LOG.lh.n;
    for i in 0..LOG.lh.n as usize {
        hb.block[i] = LOG.lh.block[i];
    }
    bwrite(buf);
    brelse(buf);
}

/// Copy each logged block from the cache into its slot in the log
/// region (but not yet to its home location).
unsafe fn write_log() {
    for tail in 0..LOG.lh.n as usize {
        let to = bread(LOG.dev, LOG.start + tail as u32 + 1);
        let from = bread(LOG.dev, LOG.lh.block[tail]);
        to.data.clone_from_slice(&from.data);
        bwrite(to);
        brelse(from);
        brelse(to);
    }
}

fn commit() {
    unsafe {
        if LOG.lh.n > 0 {
            write_log();
            write_head();
            install_trans(false);
            LOG.lh.n = 0;
            write_head();
        }
    }
}

/// Mark the start of a file-system syscall's transaction. Blocks while a
/// commit is in progress or the log doesn't have room for this call's
/// worst-case contribution.
pub fn begin_op() {
    unsafe {
        LOG.lock.acquire();
        loop {
            if LOG.committing {
                sleep(&LOG as *const Log as usize, &mut LOG.lock);
            } else if LOG.lh.n + (LOG.outstanding + 1) * MAXOPBLOCKS as u32 > LOGSIZE as u32 {
                sleep(&LOG as *const Log as usize, &mut LOG.lock);
            } else {
                LOG.outstanding += 1;
                LOG.lock.release();
                break;
            }
        }
    }
}

/// Mark the end of a transaction. Commits once this was the last
/// outstanding call.
pub fn end_op() {
    unsafe {
        if LOG.committing {
            panic!("log.committing");
        }

        LOG.lock.acquire();
        LOG.outstanding -= 1;
        let do_commit = LOG.outstanding == 0;
        if do_commit {
            LOG.committing = true;
        } else {
            wakeup(&LOG as *const Log as usize);
        }
        LOG.lock.release();

        if do_commit {
            commit();
            LOG.lock.acquire();
            LOG.committing = false;
            wakeup(&LOG as *const Log as usize);
            LOG.lock.release();
        }
    }
}

/// Record that `b` was modified as part of the current transaction, so
/// `commit()` writes it out later. Replaces `bwrite` for any block
/// touched inside a `begin_op`/`end_op` bracket.
pub fn log_write(b: &mut Buf) {
    unsafe {
        LOG.lock.acquire();
        if LOG.lh.n as usize >= LOGSIZE || LOG.lh.n >= LOG.size - 1 {
            panic!("too big a transaction");
        }
        if LOG.outstanding < 1 {
            panic!("log_write outside of trans");
        }

        let mut idx = LOG.lh.n as usize;
        for i in 0..LOG.lh.n as usize {
            if LOG.lh.block[i] == b.blockno {
                idx = i;
                break;
            }
        }

        LOG.lh.block[idx] = b.blockno;
        if idx == LOG.lh.n as usize {
            bpin(b);
            LOG.lh.n += 1;
        }

        LOG.lock.release();
    }
}
