// Compile-time kernel size limits. Mirrors the teacher's (referenced but
// absent) `param` module and examples/original_source/xv6/type/param.h.

pub const NPROC: usize = 64; // maximum number of processes
pub const KSTACKSIZE: usize = 4096; // size of a process's kernel stack
pub const NCPU: usize = 8; // maximum number of CPUs supported
pub const NOFILE: usize = 16; // open files per process
pub const NFILE: usize = 100; // open files per system
pub const NINODE: usize = 50; // maximum number of active in-memory inodes
pub const NDEV: usize = 10; // maximum major device number
pub const ROOTDEV: u32 = 1; // device number of the root file system
pub const MAXARG: usize = 32; // max exec arguments
pub const MAXPATH: usize = 128; // max path length
pub const MAXOPBLOCKS: usize = 10; // max # of blocks any FS op writes
pub const LOGSIZE: usize = MAXOPBLOCKS * 3; // max data blocks in the on-disk log
pub const NBUF: usize = MAXOPBLOCKS * 3; // size of the disk block cache
pub const FSSIZE: u32 = 2000; // total blocks in the file system image
