// PS/2 keyboard scancode decoding. Grounded in
// examples/original_source/xv6/drivers/kbd.c and kbd.h -- the scancode
// tables and shift/toggle state machine are carried over verbatim, only
// reshaped from C's designated-initializer arrays into const-built Rust
// ones.

use crate::x86::inb;

const KBSTATP: u16 = 0x64;
const KBS_DIB: u8 = 0x01;
const KBDATAP: u16 = 0x60;

const NO: u8 = 0;

const SHIFT: u8 = 1 << 0;
const CTL: u8 = 1 << 1;
const ALT: u8 = 1 << 2;
const CAPSLOCK: u8 = 1 << 3;
const NUMLOCK: u8 = 1 << 4;
const SCROLLLOCK: u8 = 1 << 5;

pub const KEY_HOME: u8 = 0xE0;
pub const KEY_END: u8 = 0xE1;
pub const KEY_UP: u8 = 0xE2;
pub const KEY_DN: u8 = 0xE3;
pub const KEY_LF: u8 = 0xE4;
pub const KEY_RT: u8 = 0xE5;
pub const KEY_PGUP: u8 = 0xE6;
pub const KEY_PGDN: u8 = 0xE7;
pub const KEY_INS: u8 = 0xE8;
pub const KEY_DEL: u8 = 0xE9;

const fn ctl(c: u8) -> u8 {
    c - b'@'
}

const fn with_overrides(mut base: [u8; 256], overrides: &[(usize, u8)]) -> [u8; 256] {
    let mut i = 0;
    while i < overrides.len() {
        let (idx, val) = overrides[i];
        base[idx] = val;
        i += 1;
    }
    base
}

const ARROW_OVERRIDES: [(usize, u8); 10] = [
    (0xC8, KEY_UP),
    (0xD0, KEY_DN),
    (0xC9, KEY_PGUP),
    (0xD1, KEY_PGDN),
    (0xCB, KEY_LF),
    (0xCD, KEY_RT),
    (0x97, KEY_HOME),
    (0xCF, KEY_END),
    (0xD2, KEY_INS),
    (0xD3, KEY_DEL),
];

static SHIFTCODE: [u8; 256] = with_overrides(
    [0; 256],
    &[(0x1D, CTL), (0x2A, SHIFT), (0x36, SHIFT), (0x38, ALT), (0x9D, CTL), (0xB8, ALT)],
);

static TOGGLECODE: [u8; 256] =
    with_overrides([0; 256], &[(0x3A, CAPSLOCK), (0x45, NUMLOCK), (0x46, SCROLLLOCK)]);

static NORMALMAP: [u8; 256] = {
    let mut m = [NO; 256];
    let seq: [u8; 0x54] = [
        NO, 0x1B, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 8, 9,
        b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', NO, b'a',
        b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', NO, b'\\', b'z', b'x',
        b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', NO, b'*', NO, b' ', NO, NO, NO, NO, NO,
        NO, NO, NO, NO, NO, NO, NO, b'7', b'8', b'9', b'-', b'4', b'5', b'6', b'+', b'1', b'2',
        b'3', b'0', b'.',
    ];
    let mut i = 0;
    while i < seq.len() {
        m[i] = seq[i];
        i += 1;
    }
    m = with_overrides(m, &[(0x9C, b'\n'), (0xB5, b'/')]);
    with_overrides(m, &ARROW_OVERRIDES)
};

static SHIFTMAP: [u8; 256] = {
    let mut m = [NO; 256];
    let seq: [u8; 0x54] = [
        NO, 0o33, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 8, 9,
        b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', NO, b'A',
        b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', NO, b'|', b'Z', b'X',
        b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', NO, b'*', NO, b' ', NO, NO, NO, NO, NO,
        NO, NO, NO, NO, NO, NO, NO, b'7', b'8', b'9', b'-', b'4', b'5', b'6', b'+', b'1', b'2',
        b'3', b'0', b'.',
    ];
    let mut i = 0;
    while i < seq.len() {
        m[i] = seq[i];
        i += 1;
    }
    m = with_overrides(m, &[(0x9C, b'\n'), (0xB5, b'/')]);
    with_overrides(m, &ARROW_OVERRIDES)
};

static CTLMAP: [u8; 256] = {
    let mut m = [NO; 256];
    let seq: [u8; 0x40] = [
        NO, NO, NO, NO, NO, NO, NO, NO, NO, NO, NO, NO, NO, NO, NO, NO, ctl(b'Q'), ctl(b'W'),
        ctl(b'E'), ctl(b'R'), ctl(b'T'), ctl(b'Y'), ctl(b'U'), ctl(b'I'), ctl(b'O'), ctl(b'P'),
        NO, NO, b'\r', NO, ctl(b'A'), ctl(b'S'), ctl(b'D'), ctl(b'F'), ctl(b'G'), ctl(b'H'),
        ctl(b'J'), ctl(b'K'), ctl(b'L'), NO, NO, NO, NO, ctl(b'\\'), ctl(b'Z'), ctl(b'X'),
        ctl(b'C'), ctl(b'V'), ctl(b'B'), ctl(b'N'), ctl(b'M'), NO, NO, ctl(b'/'), NO, NO,
    ];
    let mut i = 0;
    while i < seq.len() {
        m[i] = seq[i];
        i += 1;
    }
    m = with_overrides(m, &[(0x9C, b'\r'), (0xB5, ctl(b'/'))]);
    with_overrides(m, &ARROW_OVERRIDES)
};

/// Read and decode one scancode from the keyboard controller. Returns
/// `None` if the data-in buffer is empty, `Some(0)` on a release event or
/// a pure modifier press (nothing to feed the console).
pub fn kbdgetc() -> Option<u8> {
    static mut SHIFT_STATE: u8 = 0;

    let st = inb(KBSTATP);
    if st & KBS_DIB == 0 {
        return None;
    }

    let mut data = inb(KBDATAP);

    unsafe {
        if data & 0x80 != 0 {
            data &= 0x7F;
            SHIFT_STATE &= !SHIFTCODE[data as usize];
            return Some(0);
        }

        SHIFT_STATE |= SHIFTCODE[data as usize];
        SHIFT_STATE ^= TOGGLECODE[data as usize];

        let charcode = match SHIFT_STATE & 3 {
            0 => &NORMALMAP,
            1 => &SHIFTMAP,
            _ => &CTLMAP,
        };
        let mut c = charcode[data as usize];

        if SHIFT_STATE & CAPSLOCK != 0 {
            if c.is_ascii_lowercase() {
                c = c.to_ascii_uppercase();
            } else if c.is_ascii_uppercase() {
                c = c.to_ascii_lowercase();
            }
        }

        Some(c)
    }
}

pub fn kbdintr() {
    while let Some(c) = kbdgetc() {
        if c != 0 {
            crate::console::consoleintr(c);
        }
    }
}
