use rand::Rng;

use super::{
    Chip8, Chip8Error, Chip8Result, DISPLAY_X, DISPLAY_Y, FONT_GLYPH_SIZE, FONT_START_ADDRESS,
    KeyWait, Opcode, OpcodeALU, STACK_SIZE,
};
use crate::u4;

impl Chip8 {
    /// Runs one decoded instruction.
    ///
    /// The PC is advanced past the instruction before dispatch. Errors are
    /// raised before any machine state other than the PC is touched.
    pub(crate) fn execute(&mut self, opcode: Opcode) -> Result<Chip8Result, Chip8Error> {
        let address = self.pc;
        self.pc = self.pc.wrapping_add(2);

        match opcode {
            Opcode::ClearDisplay => {
                self.display = [[false; DISPLAY_X]; DISPLAY_Y];
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn + u16::from(self.v[0]);
            }
            Opcode::Call { nnn } => {
                let slot = self
                    .stack
                    .get_mut(self.sp)
                    .ok_or(Chip8Error::StackOverflow { depth: STACK_SIZE })?;
                *slot = self.pc;
                self.sp += 1;
                self.pc = nnn;
            }
            Opcode::Return => {
                self.sp = self.sp.checked_sub(1).ok_or(Chip8Error::StackUnderflow)?;
                self.pc = self.stack[self.sp];
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                if self.v[x] == nn {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                if self.v[x] != nn {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegEqualReg { x, y } => {
                if self.v[x] == self.v[y] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                if self.v[x] != self.v[y] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                // No carry into VF, even when I leaves the 12-bit address space
                self.i = self.i.wrapping_add(self.v[x].into());
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(x, y, n)?;
            }
            Opcode::SkipIfPressed { x } => {
                if self.keypad[u4::from_low_bits(self.v[x])] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipIfNotPressed { x } => {
                if !self.keypad[u4::from_low_bits(self.v[x])] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::WaitForKey { x } => {
                return Ok(self.execute_wait_for_key(x));
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
                if self.sound_timer > 0 {
                    self.sound_enabled = true;
                }
            }
            Opcode::FontChar { x } => {
                self.i = FONT_START_ADDRESS as u16 + u16::from(self.v[x]) * FONT_GLYPH_SIZE as u16;
            }
            Opcode::BCD { x } => {
                let value = self.v[x];
                self.mem_range(self.i, 3)?
                    .copy_from_slice(&[value / 100, (value / 10) % 10, value % 10]);
            }
            Opcode::StoreRegs { x } => {
                let count = usize::from(x) + 1;
                let regs = self.v;
                self.mem_range(self.i, count)?
                    .copy_from_slice(&regs[..count]);
                self.i = self.i.wrapping_add(count as u16);
            }
            Opcode::LoadRegs { x } => {
                let count = usize::from(x) + 1;
                let mut regs = [0; 16];
                regs[..count].copy_from_slice(self.mem_range(self.i, count)?);
                self.v[..count].copy_from_slice(&regs[..count]);
                self.i = self.i.wrapping_add(count as u16);
            }
            Opcode::Unknown(opcode) => {
                log::warn!("Illegal opcode {opcode:#06X} at {address:#05X}");
                return Ok(Chip8Result::IllegalOpcode { opcode, address });
            }
        };

        Ok(Chip8Result::Continue)
    }

    // VF is written before the result in the flagged operations below, so an
    // operand that names VF reads the new flag.
    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        match op {
            OpcodeALU::Set => self.v[x] = self.v[y],
            OpcodeALU::Or => self.v[x] |= self.v[y],
            OpcodeALU::And => self.v[x] &= self.v[y],
            OpcodeALU::Xor => self.v[x] ^= self.v[y],
            OpcodeALU::Add => {
                let (res, overflow) = self.v[x].overflowing_add(self.v[y]);
                self.v[0xF] = u8::from(overflow);
                self.v[x] = res;
            }
            OpcodeALU::Sub => {
                // VF = 1 means "no borrow"
                self.v[0xF] = u8::from(self.v[y] <= self.v[x]);
                self.v[x] = self.v[x].wrapping_sub(self.v[y]);
            }
            OpcodeALU::SubReverse => {
                self.v[0xF] = u8::from(self.v[x] <= self.v[y]);
                self.v[x] = self.v[y].wrapping_sub(self.v[x]);
            }
            OpcodeALU::ShiftRight => {
                self.v[0xF] = self.v[x] & 1;
                self.v[x] >>= 1;
            }
            OpcodeALU::ShiftLeft => {
                self.v[0xF] = (self.v[x] >> 7) & 1;
                self.v[x] <<= 1;
            }
        }
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<(), Chip8Error> {
        let rows = usize::from(n);
        let mut sprite = [0u8; 16];
        sprite[..rows].copy_from_slice(self.mem_range(self.i, rows)?);

        self.v[0xF] = 0;
        let x_pos = self.v[x] as usize;
        let y_pos = self.v[y] as usize;

        let mut any_erased = false;
        for (row, sprite_byte) in sprite[..rows].iter().enumerate() {
            for col in 0..8 {
                // If current sprite bit is non-zero
                if (sprite_byte & (0x80 >> col)) != 0 {
                    let pixel =
                        &mut self.display[(y_pos + row) % DISPLAY_Y][(x_pos + col) % DISPLAY_X];

                    // Flip the pixel
                    *pixel ^= true;

                    if !*pixel {
                        any_erased = true;
                    }
                }
            }
        }

        self.v[0xF] = u8::from(any_erased);
        Ok(())
    }

    fn execute_wait_for_key(&mut self, x: u4) -> Chip8Result {
        match self.key_wait {
            KeyWait::Captured(key) if !self.keypad[key] => {
                // The key we were waiting for has been released
                log::debug!("Key {key} released, FX0A complete");
                self.key_wait = KeyWait::Idle;
                return Chip8Result::Continue;
            }
            KeyWait::Captured(_) => {}
            KeyWait::Idle => {
                if let Some(key) = self.keypad.iter().position(|&pressed| pressed) {
                    let key = u4::new(key as u8);
                    log::debug!("Key {key} captured into V{x}");
                    self.v[x] = key.value();
                    self.key_wait = KeyWait::Captured(key);
                }
            }
        }

        // Repeat this instruction until a key is released
        self.pc = self.pc.wrapping_sub(2);
        Chip8Result::WaitingForKey
    }
}
