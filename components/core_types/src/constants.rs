//! Fixed limits and defaults shared by the runtime layers.

/// Maximum number of frames an execution context may hold.
pub const FRAME_STACK_SIZE: usize = 1024;

/// Initial operand stack capacity reserved for each frame.
pub const VALUE_STACK_SIZE: usize = 64;

/// Number of I/O registers per execution context.
pub const IO_REGISTER_COUNT: usize = 48;

/// Smallest stack accepted for the background collector thread.
pub const THREAD_MINIMUM_STACK_SIZE: usize = 262_144;

/// Stack size used for the background collector thread by default.
pub const THREAD_DEFAULT_STACK_SIZE: usize = 1_048_576;

/// Default collector time slice in milliseconds.
pub const GC_DEFAULT_TIME_SLICE_MS: u32 = 8;

/// Default idle wait between collector slices in milliseconds.
pub const GC_DEFAULT_TIME_WAIT_MS: u32 = 3;

/// Leading bytes of every module blob.
pub const MODULE_MAGIC: [u8; 4] = *b"HQMD";

/// Module blob format version understood by this runtime.
pub const MODULE_VERSION: u32 = 1;

/// Class name prefix of the built-in exception objects.
pub const STANDARD_EXCEPTION_NAMESPACE: &str = "Harlequin.System.Exception";

/// Member holding the message string of a standard exception.
pub const STANDARD_EXCEPTION_MESSAGE_MEMBER: &str = "_message";
