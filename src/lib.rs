//! CHIP-8 virtual machine: the fetch-decode-execute core, its 60Hz timers
//! and a wall-clock cycle scheduler.
//!
//! Rendering, audio and input devices live outside the library. They read
//! [`emu::Chip8::display`] and [`emu::Chip8::should_beep`] and feed key
//! transitions through [`emu::Chip8::set_key`].

pub mod emu;
mod nibble;

pub use nibble::u4;
