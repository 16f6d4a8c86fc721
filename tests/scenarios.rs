use chip8_vm::{
    emu::{Chip8, Chip8Error, Chip8Result, MAX_ROM_SIZE, TIMER_PERIOD, TimerDriver},
    u4,
};

fn rom(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn run_cycles(chip8: &mut Chip8, cycles: usize) {
    for _ in 0..cycles {
        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::Continue));
    }
}

#[test]
fn add_without_carry() {
    let mut chip8 = Chip8::from_rom(&rom(&[0x6005, 0x6103, 0x8014])).unwrap();
    run_cycles(&mut chip8, 3);

    assert_eq!(chip8.registers()[0], 8);
    assert_eq!(chip8.registers()[0xF], 0);
    assert_eq!(chip8.pc(), 0x206);
}

#[test]
fn add_with_carry() {
    let mut chip8 = Chip8::from_rom(&rom(&[0x60FF, 0x6101, 0x8014])).unwrap();
    run_cycles(&mut chip8, 3);

    assert_eq!(chip8.registers()[0], 0x00);
    assert_eq!(chip8.registers()[0xF], 1);
}

#[test]
fn clear_then_draw_full_sprite() {
    // CLS; LD I, 0x208; DRW V0, V1, 2; sprite data at 0x208
    let mut program = rom(&[0x00E0, 0xA208, 0xD012, 0x1206]);
    program.extend([0xFF, 0xFF]);

    let mut chip8 = Chip8::from_rom(&program).unwrap();
    run_cycles(&mut chip8, 3);

    for (y, row) in chip8.display().iter().enumerate() {
        for (x, &pixel) in row.iter().enumerate() {
            assert_eq!(pixel, x < 8 && y < 2, "pixel ({x}, {y})");
        }
    }
    assert_eq!(chip8.registers()[0xF], 0);
}

#[test]
fn delay_timer_stops_at_zero() {
    let mut chip8 = Chip8::from_rom(&rom(&[0x6005, 0xF015])).unwrap();
    run_cycles(&mut chip8, 2);
    assert_eq!(chip8.delay_timer(), 5);

    let mut timer = TimerDriver::new();
    for _ in 0..5 {
        timer.advance(TIMER_PERIOD, &mut chip8);
    }
    assert_eq!(chip8.delay_timer(), 0);

    timer.advance(TIMER_PERIOD, &mut chip8);
    assert_eq!(chip8.delay_timer(), 0);
}

#[test]
fn sound_plays_until_sound_timer_expires() {
    let mut chip8 = Chip8::from_rom(&rom(&[0x6002, 0xF018])).unwrap();
    run_cycles(&mut chip8, 2);
    assert!(chip8.should_beep());

    let mut timer = TimerDriver::new();
    timer.advance(TIMER_PERIOD, &mut chip8);
    assert!(chip8.should_beep());
    timer.advance(TIMER_PERIOD, &mut chip8);
    assert!(!chip8.should_beep());
}

#[test]
fn wait_for_key_completes_on_release() {
    let mut chip8 = Chip8::from_rom(&rom(&[0xF40A, 0x6001])).unwrap();

    assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::WaitingForKey));
    assert_eq!(chip8.pc(), 0x200);

    chip8.set_key(u4::new(0xE), true);
    assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::WaitingForKey));
    assert_eq!(chip8.registers()[4], 0xE);
    assert_eq!(chip8.pc(), 0x200);

    chip8.set_key(u4::new(0xE), false);
    assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::Continue));
    assert_eq!(chip8.pc(), 0x202);
}

#[test]
fn illegal_opcode_is_reported_and_skipped() {
    let mut chip8 = Chip8::from_rom(&rom(&[0x0123, 0x6042])).unwrap();

    assert_eq!(
        chip8.cpu_cycle(),
        Ok(Chip8Result::IllegalOpcode {
            opcode: 0x0123,
            address: 0x200
        })
    );
    assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::Continue));
    assert_eq!(chip8.registers()[0], 0x42);
}

#[test]
fn subroutine_call_and_return() {
    // 0x200: CALL 0x206; 0x202: LD V1, 1; 0x204: JP 0x204; 0x206: LD V0, 7; RET
    let mut chip8 = Chip8::from_rom(&rom(&[0x2206, 0x6101, 0x1204, 0x6007, 0x00EE])).unwrap();
    run_cycles(&mut chip8, 5);

    assert_eq!(chip8.registers()[0], 7);
    assert_eq!(chip8.registers()[1], 1);
    assert_eq!(chip8.pc(), 0x204);
    assert!(chip8.stack().is_empty());
}

#[test]
fn stack_underflow_halts_the_machine() {
    let mut chip8 = Chip8::from_rom(&rom(&[0x00EE])).unwrap();

    assert_eq!(chip8.cpu_cycle(), Err(Chip8Error::StackUnderflow));
    assert_eq!(chip8.pc(), 0x200);
    assert_eq!(chip8.fault(), Some(&Chip8Error::StackUnderflow));
    assert_eq!(
        chip8.cpu_cycle(),
        Err(Chip8Error::Halted(Box::new(Chip8Error::StackUnderflow)))
    );
}

#[test]
fn runaway_recursion_overflows_the_stack() {
    let mut chip8 = Chip8::from_rom(&rom(&[0x2200])).unwrap();
    run_cycles(&mut chip8, 16);

    assert!(matches!(
        chip8.cpu_cycle(),
        Err(Chip8Error::StackOverflow { depth: 16 })
    ));
    assert_eq!(chip8.stack().len(), 16);
}

#[test]
fn oversized_rom_is_refused() {
    let result = Chip8::from_rom(&vec![0; MAX_ROM_SIZE + 2]);
    assert!(matches!(result, Err(Chip8Error::RomLoadError { .. })));
}
