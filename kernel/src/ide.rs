// Simple PIO-based (non-DMA) IDE disk driver. Grounded in
// examples/original_source/xv6/drivers/ide.c, adapted to this port's
// `Buf` (which tracks readiness with `valid`/`disk` booleans rather than
// the original's `B_VALID`/`B_DIRTY` flag bits) and to raw pointers for
// the single-request queue instead of the original's intrusive
// `qnext`-linked list.

use crate::buf::Buf;
use crate::ioapic;
use crate::param::{FSSIZE, NCPU};
use crate::proc::{sleep, wakeup};
use crate::spinlock::Spinlock;
use crate::trap_const::IRQ_IDE;
use crate::x86::{inb, insl, outb, outsl};

const SECTOR_SIZE: u32 = 512;
const IDE_BSY: u8 = 0x80;
const IDE_DRDY: u8 = 0x40;
const IDE_DF: u8 = 0x20;
const IDE_ERR: u8 = 0x01;

const IDE_CMD_READ: u8 = 0x20;
const IDE_CMD_WRITE: u8 = 0x30;
const IDE_CMD_RDMUL: u8 = 0xc4;
const IDE_CMD_WRMUL: u8 = 0xc5;

static mut IDELOCK: Spinlock = Spinlock::init_lock("ide");
static mut IDEQUEUE: *mut Buf = core::ptr::null_mut();

fn idewait(checkerr: bool) -> Result<(), ()> {
    let mut r;
    loop {
        r = unsafe { inb(0x1f7) };
        if r & (IDE_BSY | IDE_DRDY) == IDE_DRDY {
            break;
        }
    }
    if checkerr && (r & (IDE_DF | IDE_ERR)) != 0 {
        return Err(());
    }
    Ok(())
}

pub fn init() {
    unsafe {
        ioapic::enable(IRQ_IDE, (NCPU - 1) as u8);
    }
    let _ = idewait(false);
}

/// Issue the command for `b`'s request. Caller must hold `IDELOCK`.
fn idestart(b: &mut Buf) {
    if b.blockno >= FSSIZE {
        panic!("incorrect blockno");
    }

    let sector_per_block = (crate::fs::BSIZE as u32) / SECTOR_SIZE;
    if sector_per_block > 7 {
        panic!("idestart");
    }
    let sector = b.blockno * sector_per_block;
    let read_cmd = if sector_per_block == 1 { IDE_CMD_READ } else { IDE_CMD_RDMUL };
    let write_cmd = if sector_per_block == 1 { IDE_CMD_WRITE } else { IDE_CMD_WRMUL };

    let _ = idewait(false);
    unsafe {
        outb(0x3f6, 0);
        outb(0x1f2, sector_per_block as u8);
        outb(0x1f3, (sector & 0xff) as u8);
        outb(0x1f4, ((sector >> 8) & 0xff) as u8);
        outb(0x1f5, ((sector >> 16) & 0xff) as u8);
        outb(0x1f6, 0xe0 | ((b.dev as u8 & 1) << 4) | ((sector >> 24) & 0x0f) as u8);

        if b.disk {
            outb(0x1f7, write_cmd);
            outsl(0x1f0, b.data.as_ptr(), crate::fs::BSIZE / 4);
        } else {
            outb(0x1f7, read_cmd);
        }
    }
}

/// Interrupt handler: complete the head-of-queue request and kick off
/// the next one.
pub fn intr() {
    unsafe {
        IDELOCK.acquire();

        if IDEQUEUE.is_null() {
            IDELOCK.release();
            return;
        }
        let b = &mut *IDEQUEUE;
        IDEQUEUE = b.qnext;

        if !b.disk && idewait(true).is_ok() {
            insl(0x1f0, b.data.as_mut_ptr(), crate::fs::BSIZE / 4);
        }

        b.valid = true;
        b.disk = false;
        wakeup(b as *const Buf as usize);

        if !IDEQUEUE.is_null() {
            idestart(&mut *IDEQUEUE);
        }

        IDELOCK.release();
    }
}

/// Queue `b`'s read or write (as marked by `b.disk`) and block until the
/// disk interrupt completes it.
pub fn ide_rw(b: &mut Buf, write: bool) {
    if !b.lock.holding_sleep() {
        panic!("ide_rw: buf not locked");
    }
    if b.valid && !write {
        panic!("ide_rw: nothing to do");
    }
    b.disk = write;

    unsafe {
        IDELOCK.acquire();

        // Append to the request queue.
        b.qnext = core::ptr::null_mut();
        if IDEQUEUE.is_null() {
            IDEQUEUE = b as *mut Buf;
        } else {
            let mut pp = IDEQUEUE;
            while !(*pp).qnext.is_null() {
                pp = (*pp).qnext;
            }
            (*pp).qnext = b as *mut Buf;
        }

        if IDEQUEUE == b as *mut Buf {
            idestart(b);
        }

        while !(b.valid && !b.disk) {
            sleep(b as *const Buf as usize, &mut IDELOCK);
        }

        IDELOCK.release();
    }
}
