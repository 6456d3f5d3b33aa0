//! Memory layout of SINVM version 1.
//!
//! Addresses range from $0000 to $FFFF. The data and call stacks grow
//! downward; the heap grows upward.

/// Total addressable memory.
pub const MEMORY_SIZE: usize = 0x10000;

/// The zero page is a table of pointers. It starts at $0002 so a null
/// pointer points at nothing.
pub const POINTER_TABLE_BOTTOM: u16 = 0x0002;
/// Scratch word holding a pointer to dynamic memory mid-allocation.
pub const LOCAL_DYNAMIC_POINTER: u16 = 0x0002;
pub const POINTER_TABLE_TOP: u16 = 0x00FF;

/// `@rs` reservations are assigned from here upward.
pub const RS_START: u16 = 0x0100;
pub const RS_END: u16 = 0x03FF;

/// Heap region for dynamic memory.
pub const HEAP_START: u16 = 0x0400;
pub const HEAP_MAX: u16 = 0x13FF;

/// Buffer for string and input data.
pub const STRING_BUFFER_START: u16 = 0x1400;
pub const STRING_BUFFER_MAX: u16 = 0x17FF;

/// Data stack; grows downward from STACK to STACK_BOTTOM.
pub const STACK: u16 = 0x23FF;
pub const STACK_BOTTOM: u16 = 0x1800;

/// Call stack; grows downward, two pages.
pub const CALL_STACK: u16 = 0x25FF;
pub const CALL_STACK_BOTTOM: u16 = 0x2400;

/// Program code and data.
pub const PRG_BOTTOM: u16 = 0x2600;
pub const PRG_TOP: u16 = 0xEFFF;

/// Command-line / environment argument pages.
pub const ARG_START: u16 = 0xF000;

pub const MEMORY_MAX: u16 = 0xFFFF;
