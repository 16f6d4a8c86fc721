/// Outcome of a single CHIP-8 CPU cycle that did not end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip8Result {
    /// The instruction ran to completion.
    Continue,
    /// FX0A is still waiting for a key to be pressed and released;
    /// the same instruction runs again on the next cycle.
    WaitingForKey,
    /// The fetched word matches no instruction. It was skipped.
    IllegalOpcode { opcode: u16, address: u16 },
}

/// Fatal error types that can occur during CHIP-8 emulation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomLoadError { size: usize, max_size: usize },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: u16 },

    #[error("Stack overflow: subroutine call with all {depth} stack slots in use")]
    StackOverflow { depth: usize },

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Machine halted after a fatal error: {0}")]
    Halted(Box<Chip8Error>),
}

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
/// A type alias for the CHIP-8 display buffer representation
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];
