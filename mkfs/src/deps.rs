use std::mem;

// Mirrors kernel::param and kernel::fs. Kept as a standalone copy rather
// than a dependency on the `kernel` crate: mkfs builds the on-disk image
// the kernel's fs.rs reads, and the two must agree on layout, but pulling
// the kernel crate in as a library just for a handful of constants isn't
// worth the dependency-tree churn.
pub const MAXOPBLOCKS: u32 = 10; // max # of blocks any FS op writes
pub const LOGSIZE: u32 = MAXOPBLOCKS * 3; // max data blocks in on-disk log

pub const FSSIZE: u32 = 2000; // size of file system in blocks

pub const BSIZE: usize = 512; // block size (x86 sector size)

pub const IPB: u32 = (BSIZE / mem::size_of::<DINode>()) as u32;

pub const NDIRECT: usize = 12;

pub const ROOTINO: u32 = 1;

pub const NINDIRECT: usize = BSIZE / mem::size_of::<u32>();
pub const MAXFILE: usize = NDIRECT + NINDIRECT;

#[derive(Copy, Clone)]
#[repr(i16)]
pub enum FileType {
    NoType = 0,
    TDir = 1,
    TFile = 2,
    TDevice = 3,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct DINode {
    pub file_type: FileType, // File type
    pub major: i16,          // Major device number (T_DEVICE only)
    pub minor: i16,          // Minor device number (T_DEVICE only)
    pub nlink: i16,          // Number of links to inode in file system
    pub size: u32,           // Size of file (bytes)
    pub addrs: [u32; NDIRECT + 1], // Data block addresses
}

pub const FSMAGIC: u32 = 0x10203040;

#[repr(C)]
pub struct SuperBlock {
    pub magic: u32,      // Must be FSMAGIC
    pub size: u32,       // Size of file system image (blocks)
    pub nblocks: u32,    // Number of data blocks
    pub ninodes: u32,    // Number of inodes
    pub nlog: u32,       // Number of log blocks
    pub logstart: u32,   // Block number of first log block
    pub inodestart: u32, // Block number of first inode block
    pub bmapstart: u32,  // Block number of first free map block
}

pub const DIRSIZ: usize = 14;

#[repr(C)]
pub struct Dirent {
    pub inum: u16,
    pub name: [u8; DIRSIZ],
}

#[macro_export]
macro_rules! IBLOCK {
    ( $i:expr, $sb:expr ) => {
        $i / IPB + $sb.inodestart
    };
}
