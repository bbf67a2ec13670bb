// The very first user program: a tiny hand-assembled blob that execs
// `/init`, and loops calling exit if that somehow returns. Mapped at
// virtual address 0 by `proc::userinit`. The source assembly isn't part
// of the retrieval pack (assembly entry stubs are an external
// collaborator per scope), so this is the classic two-instruction-pair
// x86 encoding of:
//
//   start:
//     pushl $argv
//     pushl $init
//     pushl $0
//     movl  $SYS_EXEC, %eax
//     int   $T_SYSCALL
//   exit:
//     movl  $SYS_EXIT, %eax
//     int   $T_SYSCALL
//     jmp   exit
//   init:
//     .string "/init"
//   argv:
//     .long init
//     .long 0
//
// with SYS_EXEC = 7, SYS_EXIT = 2, T_SYSCALL = 0x40, `init` at offset 28
// and `argv` at offset 36.
pub static INITCODE: [u8; 44] = [
    0x68, 0x24, 0x00, 0x00, 0x00, // pushl $36        (argv)
    0x68, 0x1c, 0x00, 0x00, 0x00, // pushl $28        (init)
    0x6a, 0x00, //                  pushl $0
    0xb8, 0x07, 0x00, 0x00, 0x00, // movl $7, %eax    (SYS_exec)
    0xcd, 0x40, //                  int $0x40
    0xb8, 0x02, 0x00, 0x00, 0x00, // movl $2, %eax    (SYS_exit)
    0xcd, 0x40, //                  int $0x40
    0xeb, 0xf7, //                  jmp exit
    b'/', b'i', b'n', b'i', b't', 0x00, // "/init\0"
    0x00, 0x00, // alignment padding
    0x1c, 0x00, 0x00, 0x00, // argv[0] = &init (28)
    0x00, 0x00, 0x00, 0x00, // argv[1] = 0
];
