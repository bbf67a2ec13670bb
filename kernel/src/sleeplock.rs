// Long-term locks, for operations that must hold a lock across a
// blocking wait (disk I/O, inode access). Built from a Spinlock plus a
// wait-channel, following the teacher's Sleeplock
// (examples/LENSHOOD-xv6-rust/kernel/src/sleeplock.rs).

use crate::proc::{myproc, sleep, wakeup};
use crate::spinlock::Spinlock;

#[derive(Copy, Clone)]
pub struct Sleeplock {
    locked: bool,
    lk: Spinlock,
    name: &'static str,
    pid: i32,
}

impl Sleeplock {
    pub const fn init_lock(name: &'static str) -> Self {
        Sleeplock {
            locked: false,
            lk: Spinlock::init_lock("sleep lock"),
            name,
            pid: 0,
        }
    }

    pub fn acquire_sleep(&mut self) {
        self.lk.acquire();
        while self.locked {
            sleep(self as *const Sleeplock as usize, &mut self.lk);
        }
        self.locked = true;
        self.pid = myproc().pid;
        self.lk.release();
    }

    pub fn release_sleep(&mut self) {
        self.lk.acquire();
        self.locked = false;
        self.pid = 0;
        wakeup(self as *const Sleeplock as usize);
        self.lk.release();
    }

    pub fn holding_sleep(&mut self) -> bool {
        self.lk.acquire();
        let r = self.locked && self.pid == myproc().pid;
        self.lk.release();
        r
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
