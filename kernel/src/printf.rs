// Console text output. Grounded in
// examples/LENSHOOD-xv6-rust/kernel/src/printf.rs for the `Printer`/
// `printf!` pattern; `KernelLogger` is this port's bridge from the
// external `log` crate (used for leveled diagnostics throughout fs.rs,
// ioapic.rs, proc.rs, trap.rs) onto that same `Printer`/console path,
// since the teacher has no `log` crate integration of its own.

use core::fmt::{Arguments, Write};

use crate::console::CONSOLE_INSTANCE;
use crate::spinlock::Spinlock;

pub static mut PRINTER: Printer = Printer {
    lock: Spinlock::init_lock("pr"),
    locking: true,
};

#[macro_export]
macro_rules! printf {
    ($($arg:tt)*) => {
        unsafe {
            crate::printf::PRINTER.printf(core::format_args!($($arg)*))
        }
    };
}

/// Lock to avoid interleaving concurrent printf()s.
pub struct Printer {
    lock: Spinlock,
    locking: bool,
}

impl Printer {
    pub fn printf(&mut self, args: Arguments<'_>) {
        let locking = self.locking;
        if locking {
            self.lock.acquire();
        }

        unsafe {
            let _ = CONSOLE_INSTANCE.write_fmt(args);
        }

        if locking {
            self.lock.release();
        }
    }

    /// Disable locking; called from `panic` so a wedged lock held by the
    /// panicking CPU can't block the panic message from getting out.
    pub fn stop_locking(&mut self) {
        self.locking = false;
    }
}

/// `log::Log` implementation that writes every record through the same
/// `Printer`/console path as `printf!`, tagged with its level.
pub struct KernelLogger;

pub static KERNEL_LOGGER: KernelLogger = KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        printf!("[{}] {}\n", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Install `KernelLogger` as the global logger. Called once from boot,
/// after `console::init`.
pub fn init() {
    unsafe {
        log::set_logger_racy(&KERNEL_LOGGER).expect("logger already set");
        log::set_max_level(log::LevelFilter::Trace);
    }
}
