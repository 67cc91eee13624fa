//! Constant values of the interpreted architecture.

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 0x10; // 16

/// The lower memory space was historically reserved for the interpreter
/// itself, and now holds only the builtin font.
pub const MEM_START: usize = 0x200; // 512
pub const MEM_SIZE: usize = 0x1000; // 4096

/// Levels of nesting allowed in the call stack.
///
/// The architecture defines 16 slots of 16-bit return addresses.
/// Exceeding the limit is a runtime error, not a silent wrap.
pub const STACK_SIZE: usize = 16;

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;
pub const DISPLAY_BUFFER_SIZE: usize = DISPLAY_WIDTH * DISPLAY_HEIGHT;

/// Width and height are powers of two, so coordinate wrapping
/// is a bitwise AND with these masks.
pub const DISPLAY_WIDTH_MASK: usize = DISPLAY_WIDTH - 1;
pub const DISPLAY_HEIGHT_MASK: usize = DISPLAY_HEIGHT - 1;

/// Rate at which the delay and sound timers count down, and at which
/// a frontend is expected to drive the cycle loop.
pub const TICK_FREQUENCY: u64 = 60;

/// Number of nanoseconds in a second
#[doc(hidden)]
pub const NANOS_IN_SECOND: u64 = 1_000_000_000;

/// Number of keys on the keypad (0x0-0xF)
pub const KEY_COUNT: u8 = 16;

/// Instructions executed per tick when the configuration does not say
/// otherwise.
pub const DEFAULT_STEPS_PER_TICK: usize = 10;

/// Square-wave frequency of the buzzer tone, in hertz.
pub const TONE_FREQUENCY: u64 = 440;

/// Builtin font glyphs live at the bottom of memory.
pub const FONTSET_START: usize = 0x000;

/// Every glyph is 8 pixels wide and 5 rows tall, one byte per row.
pub const FONTSET_HEIGHT: usize = 5;

/// The 16 hexadecimal digit glyphs, packed together without padding.
/// Glyph `k` occupies bytes `[5k, 5k + 5)`.
#[rustfmt::skip]
pub const FONTSET: [u8; REGISTER_COUNT * FONTSET_HEIGHT] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

/// Type for storing the 12-bit memory addresses.
pub type Address = u16;
