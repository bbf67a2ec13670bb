// Console input/output, layered over the UART. Grounded in
// examples/LENSHOOD-xv6-rust/kernel/src/console.rs for the `Devsw`
// wiring and line-discipline shape, and in
// examples/original_source/xv6/console.c's `consoleintr`/`consoleread`/
// `consolewrite` for the editing behavior -- the CGA half of that file
// has no counterpart here, since this port is UART-only like its
// teacher.

use core::fmt::{Error, Write};

use crate::file::{Devsw, CONSOLE, DEVSW};
use crate::proc::{myproc, procdump, sleep, wakeup};
use crate::spinlock::Spinlock;
use crate::uart::UART_INSTANCE;

const BACKSPACE: u16 = 0x100;
const INPUT_BUF_SIZE: usize = 128;

pub struct Console {
    lock: Spinlock,
    buf: [u8; INPUT_BUF_SIZE],
    r: usize,
    w: usize,
    e: usize,
}

pub static mut CONSOLE_INSTANCE: Console = Console::create();

impl Console {
    pub const fn create() -> Self {
        Console {
            lock: Spinlock::init_lock("cons"),
            buf: [0; INPUT_BUF_SIZE],
            r: 0,
            w: 0,
            e: 0,
        }
    }

    pub fn init() {
        unsafe {
            DEVSW[CONSOLE] = Some(&mut CONSOLE_INSTANCE as *mut Console);
        }
    }

    /// Send one character to the UART. Called by printf() and to echo
    /// input, not from write().
    pub fn putc(&mut self, c: u16) {
        unsafe {
            if c == BACKSPACE {
                UART_INSTANCE.putc_sync(0x08);
                UART_INSTANCE.putc_sync(0x20);
                UART_INSTANCE.putc_sync(0x08);
            } else {
                UART_INSTANCE.putc_sync(c as u8);
            }
        }
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> Result<(), Error> {
        for c in s.bytes() {
            self.putc(c as u16);
        }
        Ok(())
    }
}

impl Devsw for Console {
    /// Copy up to a whole input line to `dst`.
    fn read(&mut self, is_user_dst: bool, dst: usize, sz: usize) -> i32 {
        let target = sz;
        let mut dst = dst;
        let mut sz = sz;
        let chan = self as *const Self as usize;

        self.lock.acquire();
        while sz > 0 {
            while self.r == self.w {
                if myproc().killed {
                    self.lock.release();
                    return -1;
                }
                sleep(chan, &mut self.lock);
            }

            let c = self.buf[self.r % INPUT_BUF_SIZE];
            self.r += 1;

            if c as char == 'D' {
                // end-of-file; save it for next time unless this read
                // would otherwise return nothing.
                if sz < target {
                    self.r -= 1;
                }
                break;
            }

            if crate::vm::either_copy_out(is_user_dst, dst, &c as *const u8, 1).is_err() {
                break;
            }

            dst += 1;
            sz -= 1;

            if c as char == '\n' {
                break;
            }
        }
        self.lock.release();

        (target - sz) as i32
    }

    fn write(&mut self, is_user_src: bool, src: usize, sz: usize) -> i32 {
        let mut cnt = 0;
        for i in 0..sz {
            let mut c = 0u8;
            if crate::vm::either_copy_in(&mut c as *mut u8, is_user_src, src + i, 1).is_err() {
                break;
            }
            self.putc(c as u16);
            cnt = i + 1;
        }
        cnt as i32
    }
}

/// Console input interrupt handler: erase/kill processing, append to the
/// input buffer, wake `read()` once a whole line has arrived. Called by
/// both `kbd::kbdintr` and `uart::intr`.
pub fn consoleintr(c: u8) {
    unsafe {
        let cons = &mut CONSOLE_INSTANCE;
        cons.lock.acquire();

        match c as char {
            'P' => procdump(),
            'U' => {
                while cons.e != cons.w && cons.buf[(cons.e - 1) % INPUT_BUF_SIZE] != b'\n' {
                    cons.e -= 1;
                    cons.putc(BACKSPACE);
                }
            }
            'H' | '\x7f' => {
                if cons.e != cons.w {
                    cons.e -= 1;
                    cons.putc(BACKSPACE);
                }
            }
            _ => {
                if c != 0 && cons.e - cons.r < INPUT_BUF_SIZE {
                    let c = if c == b'\r' { b'\n' } else { c };
                    cons.putc(c as u16);
                    cons.buf[cons.e % INPUT_BUF_SIZE] = c;
                    cons.e += 1;
                    if c == b'\n' || c as char == 'D' || cons.e - cons.r == INPUT_BUF_SIZE {
                        cons.w = cons.e;
                        wakeup(&cons.r as *const usize as usize);
                    }
                }
            }
        }

        cons.lock.release();
    }
}
