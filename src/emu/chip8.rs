use rand::{SeedableRng, rngs::StdRng};

use super::{
    Chip8Error, Chip8Result, DISPLAY_X, DISPLAY_Y, Display, FONT, FONT_END_ADDRESS,
    FONT_START_ADDRESS, Opcode,
};
use crate::u4;

// The constants are specified by the CHIP-8 specification
pub const ROM_START_ADDRESS: usize = 0x200;
pub const MEMORY_SIZE: usize = 4096;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;
pub const STACK_SIZE: usize = 16;

/// Progress of the FX0A key-wait instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyWait {
    /// No key has been seen yet.
    #[default]
    Idle,
    /// This key was pressed; waiting for it to be released.
    Captured(u4),
}

/// CHIP-8 virtual machine state
pub struct Chip8 {
    /// 4KB memory array
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// Display buffer: 64x32 monochrome pixels
    pub(crate) display: Display<bool>,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Call stack for subroutine returns
    pub(crate) stack: [u16; STACK_SIZE],
    /// Number of occupied stack slots
    pub(crate) sp: usize,

    /// Delay timer: decrements at 60Hz until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements at 60Hz, beeps while non-zero
    pub(crate) sound_timer: u8,
    /// Set by FX18 with a non-zero value, cleared once the sound timer runs out
    pub(crate) sound_enabled: bool,

    pub(crate) key_wait: KeyWait,
    /// Keypad state: 16 keys mapped as booleans (true = pressed)
    pub(crate) keypad: [bool; 16],

    pub(crate) rng: StdRng,
    /// First fatal error; once set the machine refuses to run
    pub(crate) fault: Option<Chip8Error>,
}

impl Chip8 {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Creates a machine whose RND instruction draws from a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut chip8 = Chip8 {
            memory: [0; MEMORY_SIZE],
            display: [[false; DISPLAY_X]; DISPLAY_Y],
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: [0; STACK_SIZE],
            sp: 0,
            delay_timer: 0,
            sound_timer: 0,
            sound_enabled: false,
            key_wait: KeyWait::Idle,
            keypad: [false; 16],
            rng,
            fault: None,
        };
        chip8.reset();
        chip8
    }

    /// Returns the machine to its power-on state: font in place, everything
    /// else cleared. The random generator keeps its stream.
    pub fn reset(&mut self) {
        self.memory = [0; MEMORY_SIZE];
        self.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
        self.display = [[false; DISPLAY_X]; DISPLAY_Y];
        self.pc = ROM_START_ADDRESS as u16;
        self.i = 0;
        self.v = [0; 16];
        self.stack = [0; STACK_SIZE];
        self.sp = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.sound_enabled = false;
        self.key_wait = KeyWait::Idle;
        self.keypad = [false; 16];
        self.fault = None;
    }

    /// Creates a machine with `rom` loaded at 0x200.
    pub fn from_rom(rom: &[u8]) -> Result<Self, Chip8Error> {
        let mut chip8 = Self::new();
        chip8.load(rom)?;
        Ok(chip8)
    }

    /// Resets the machine and loads a ROM into memory.
    ///
    /// Oversized ROMs are rejected, never truncated, and leave the machine untouched.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomLoadError {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            });
        }

        self.reset();
        self.memory[ROM_START_ADDRESS..ROM_START_ADDRESS + rom.len()].copy_from_slice(rom);
        log::debug!("Loaded {} byte ROM at {:#05X}", rom.len(), ROM_START_ADDRESS);

        Ok(())
    }

    /// Executes a single CPU cycle (fetch, decode, execute).
    ///
    /// Illegal opcodes are reported in the result and skipped. Any error
    /// halts the machine: the faulting instruction leaves no partial writes
    /// behind and every later cycle fails with [`Chip8Error::Halted`].
    pub fn cpu_cycle(&mut self) -> Result<Chip8Result, Chip8Error> {
        if let Some(fault) = &self.fault {
            return Err(Chip8Error::Halted(Box::new(fault.clone())));
        }

        let address = self.pc;
        let result = self
            .fetch()
            .map(Opcode::decode)
            .and_then(|opcode| {
                log::trace!("{address:#05X}: {opcode}");
                self.execute(opcode)
            });

        if let Err(e) = &result {
            log::error!("Fatal error at {address:#05X}: {e}");
            self.pc = address;
            self.fault = Some(e.clone());
        }

        result
    }

    /// Counts the delay and sound timers down by one. Should be called at 60Hz.
    pub fn timers_cycle(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);

        if self.sound_timer == 0 {
            self.sound_enabled = false;
        }
    }

    /// Returns true while the tone should be audible.
    pub fn should_beep(&self) -> bool {
        self.sound_enabled
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keypad[key] = pressed;
    }

    pub fn is_key_pressed(&self, key: u4) -> bool {
        self.keypad[key]
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, y: usize, x: usize) -> bool {
        self.display[y][x]
    }

    pub fn display(&self) -> &Display<bool> {
        &self.display
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn index(&self) -> u16 {
        self.i
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.v
    }

    /// Return addresses currently on the call stack, oldest first.
    pub fn stack(&self) -> &[u16] {
        &self.stack[..self.sp]
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn key_wait(&self) -> KeyWait {
        self.key_wait
    }

    /// The error that halted the machine, if any.
    pub fn fault(&self) -> Option<&Chip8Error> {
        self.fault.as_ref()
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    /// Fetches the next 16-bit opcode from memory.
    fn fetch(&mut self) -> Result<u16, Chip8Error> {
        let high = *self.mem_get(self.pc)?;
        let low = *self.mem_get(self.pc.wrapping_add(1))?;

        Ok(u16::from_be_bytes([high, low]))
    }

    /// Helper to get a mutable reference to a memory location with bounds checking.
    pub(crate) fn mem_get(&mut self, addr: u16) -> Result<&mut u8, Chip8Error> {
        self.memory
            .get_mut(addr as usize)
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })
    }

    /// Bounds-checked view of `len` bytes starting at `addr`.
    ///
    /// Reports the first address that falls outside memory.
    pub(crate) fn mem_range(&mut self, addr: u16, len: usize) -> Result<&mut [u8], Chip8Error> {
        let start = addr as usize;
        if start + len > MEMORY_SIZE {
            return Err(Chip8Error::MemoryOutOfBounds {
                address: addr.max(MEMORY_SIZE as u16),
            });
        }

        Ok(&mut self.memory[start..start + len])
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_machine_has_font_and_starts_at_program_origin() {
        let chip8 = Chip8::new();
        assert_eq!(chip8.pc(), 0x200);
        assert_eq!(chip8.memory()[..FONT.len()], FONT);
        assert!(chip8.stack().is_empty());
        assert!(!chip8.should_beep());
    }

    #[test]
    fn load_copies_rom_to_program_origin() {
        let chip8 = Chip8::from_rom(&[0x12, 0x34, 0x56]).unwrap();
        assert_eq!(chip8.memory()[0x200..0x203], [0x12, 0x34, 0x56]);
    }

    #[test]
    fn load_accepts_rom_filling_all_of_memory() {
        let rom = vec![0xAA; MAX_ROM_SIZE];
        let chip8 = Chip8::from_rom(&rom).unwrap();
        assert_eq!(chip8.memory()[MEMORY_SIZE - 1], 0xAA);
    }

    #[test]
    fn load_rejects_oversized_rom() {
        let rom = vec![0; MAX_ROM_SIZE + 1];
        assert_eq!(
            Chip8::from_rom(&rom).err(),
            Some(Chip8Error::RomLoadError {
                size: MAX_ROM_SIZE + 1,
                max_size: MAX_ROM_SIZE,
            })
        );
    }

    #[test]
    fn load_clears_a_captured_key_from_the_previous_program() {
        let mut chip8 = Chip8::from_rom(&[0xF0, 0x0A]).unwrap();
        chip8.set_key(u4::new(3), true);
        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::WaitingForKey));
        assert_eq!(chip8.key_wait(), KeyWait::Captured(u4::new(3)));
        chip8.set_key(u4::new(3), false);

        chip8.load(&[0xF0, 0x0A]).unwrap();
        assert_eq!(chip8.key_wait(), KeyWait::Idle);
        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::WaitingForKey));
        assert_eq!(chip8.pc(), 0x200);
    }

    #[test]
    fn load_restarts_a_halted_machine_from_power_on_state() {
        let mut chip8 = Chip8::from_rom(&[0x60, 0x07, 0x22, 0x00, 0xAA, 0xBB]).unwrap();
        chip8.delay_timer = 9;
        chip8.sound_timer = 9;
        chip8.sound_enabled = true;
        chip8.display[4][4] = true;
        chip8.i = 0x300;
        // LD V0, 7; CALL 0x200 recurses until the stack overflows
        for _ in 0..40 {
            let _ = chip8.cpu_cycle();
        }
        assert!(chip8.fault().is_some());

        chip8.load(&[0x00, 0xEE]).unwrap();
        assert!(chip8.fault().is_none());
        assert_eq!(chip8.pc(), 0x200);
        assert_eq!(chip8.index(), 0);
        assert_eq!(chip8.registers(), &[0; 16]);
        assert!(chip8.stack().is_empty());
        assert_eq!(chip8.delay_timer(), 0);
        assert_eq!(chip8.sound_timer(), 0);
        assert!(!chip8.should_beep());
        assert!(chip8.display().iter().flatten().all(|&p| !p));
        assert_eq!(chip8.memory()[0x202..0x206], [0; 4]);
        assert_eq!(chip8.memory()[..FONT.len()], FONT);

        assert_eq!(chip8.cpu_cycle(), Err(Chip8Error::StackUnderflow));
    }

    #[test]
    fn oversized_reload_keeps_the_loaded_program() {
        let mut chip8 = Chip8::from_rom(&[0x12, 0x34]).unwrap();
        chip8.v[1] = 5;
        assert!(chip8.load(&vec![0; MAX_ROM_SIZE + 1]).is_err());
        assert_eq!(chip8.memory()[0x200..0x202], [0x12, 0x34]);
        assert_eq!(chip8.registers()[1], 5);
    }

    #[test]
    fn fetch_past_end_of_memory_halts() {
        let mut chip8 = Chip8::new();
        chip8.pc = 0x0FFF;

        assert_eq!(
            chip8.cpu_cycle(),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        );
        assert_eq!(chip8.pc(), 0x0FFF);
        assert!(matches!(chip8.cpu_cycle(), Err(Chip8Error::Halted(_))));
    }

    #[test]
    fn timers_stop_at_zero_and_silence_sound() {
        let mut chip8 = Chip8::new();
        chip8.delay_timer = 1;
        chip8.sound_timer = 1;
        chip8.sound_enabled = true;

        chip8.timers_cycle();
        assert_eq!(chip8.delay_timer(), 0);
        assert_eq!(chip8.sound_timer(), 0);
        assert!(!chip8.should_beep());

        chip8.timers_cycle();
        assert_eq!(chip8.delay_timer(), 0);
        assert_eq!(chip8.sound_timer(), 0);
    }

    #[test]
    fn mem_range_reports_first_address_outside_memory() {
        let mut chip8 = Chip8::new();
        assert_eq!(chip8.mem_range(0x0FFE, 2).map(|m| m.len()), Ok(2));
        assert_eq!(
            chip8.mem_range(0x0FFE, 3).err(),
            Some(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        );
        assert_eq!(
            chip8.mem_range(0x2000, 1).err(),
            Some(Chip8Error::MemoryOutOfBounds { address: 0x2000 })
        );
    }
}
