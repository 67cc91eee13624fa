//! Virtual machine.
use std::{fmt::Write as _, time::Duration};

use rand::prelude::*;

use crate::{
    bytecode::*,
    constants::*,
    cpu::{OchoCpu, WaitState},
    devices::{Devices, KeyCode},
    error::{OchoError, OchoResult},
    DisplayBuffer,
};

pub struct OchoVm {
    cpu: OchoCpu,
    conf: OchoConf,
}

/// VM Configuration Parameters.
#[derive(Default, Clone)]
pub struct OchoConf {
    /// Instructions executed per tick. Defaults to
    /// [`DEFAULT_STEPS_PER_TICK`] when absent.
    pub steps_per_tick: Option<usize>,
}

/// Frequency in hertz (per second)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    Error,
    /// Machine is halted; a fatal condition was already reported.
    Interrupt,
    /// Program counter has jumped to a new address.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - Bnnn (`JP V0, addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    Jump,
    Draw,
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

impl OchoVm {
    pub fn new(conf: OchoConf) -> Self {
        OchoVm {
            cpu: OchoCpu::new(),
            conf,
        }
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &OchoConf {
        &self.conf
    }

    /// Load a program image, placing it at the architectural start
    /// address.
    ///
    /// The whole machine is reset first, so a new image never runs on
    /// top of a previous program's registers, stack or display.
    pub fn load_rom(&mut self, rom: &[u8]) -> OchoResult<()> {
        if rom.len() > MEM_SIZE - MEM_START {
            return Err(OchoError::LargeProgram);
        }

        self.cpu.reset();
        self.load_font();

        self.cpu.ram[MEM_START..MEM_START + rom.len()].copy_from_slice(rom);
        self.cpu.pc = MEM_START;

        Ok(())
    }

    /// Write the builtin font glyphs to the bottom of memory.
    fn load_font(&mut self) {
        self.cpu.ram[FONTSET_START..FONTSET_START + FONTSET.len()].copy_from_slice(&FONTSET);
    }

    pub fn display_buffer(&self) -> DisplayBuffer<'_> {
        self.cpu.display.buffer()
    }

    /// Whether the buzzer is currently on.
    pub fn sound_active(&self) -> bool {
        self.cpu.buzzer_state
    }

    /// Halt the machine from the outside.
    pub fn interrupt(&mut self) {
        self.cpu.interrupt();
    }
}

/// Interpreter
impl OchoVm {
    /// Sets the keyboard key input state.
    ///
    /// Key events are pushed in by the input adapter; the instruction
    /// stream only ever reads the resulting bitmask.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.set_key_state(key.as_u8(), pressed);
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }

    /// Run one tick: a batch of instruction steps, then one timer
    /// countdown, then the tick's side effects published to `devices`.
    ///
    /// While the machine is suspended waiting for a key, the batch
    /// slots elapse without executing; timers and the buzzer signal
    /// proceed regardless.
    pub fn cycle(&mut self, devices: &mut impl Devices) -> OchoResult<Flow> {
        if self.cpu.trap {
            return Ok(Flow::Interrupt);
        }

        let steps = self.conf.steps_per_tick.unwrap_or(DEFAULT_STEPS_PER_TICK);
        let mut flow = Flow::Ok;

        for _ in 0..steps {
            if let WaitState::WaitingForKey { dest } = self.cpu.wait_state {
                match self.cpu.first_key() {
                    Some(key) => {
                        self.cpu.registers[dest as usize] = key;
                        self.cpu.wait_state = WaitState::Running;
                    }
                    // Still suspended; the slot elapses without executing.
                    None => continue,
                }
            }

            match self.step() {
                Flow::Error => match self.cpu.error.take() {
                    Some(err) => return Err(err),
                    None => return Ok(Flow::Error),
                },
                step_flow => flow = step_flow,
            }
        }

        // Timers count down once per tick, never once per instruction.
        self.cpu.tick_delay();
        self.cpu.tick_sound();
        self.cpu.buzzer_state = self.cpu.sound_timer > 0;

        let tone = if self.cpu.buzzer_state {
            Some(Hz(TONE_FREQUENCY))
        } else {
            None
        };
        devices.buzz(tone);
        devices.draw(self.cpu.display.buffer());

        Ok(flow)
    }

    /// Perform exactly one fetch, decode, execute step.
    fn step(&mut self) -> Flow {
        let mut rng = thread_rng();

        if self.cpu.pc + 1 >= MEM_SIZE {
            self.cpu.set_error(OchoError::OutOfBounds { addr: self.cpu.pc });
            return Flow::Error;
        }

        // Each instruction is two bytes, high byte first.
        let word = u16::from_be_bytes([self.cpu.ram[self.cpu.pc], self.cpu.ram[self.cpu.pc + 1]]);

        let code = op_code(word);
        let vx = op_x(word) as usize;
        let vy = op_y(word) as usize;
        let n = op_n(word);
        let nn = op_nn(word);
        let nnn = op_nnn(word);

        // Advance past the fetched word before dispatch. Jumps, calls
        // and returns overwrite the program counter with their own
        // target instead of being advanced again.
        self.cpu.pc += 2;

        let mut control_flow = Flow::Ok;

        match code {
            // Instructions identified by their low byte.
            0x0 | 0xE | 0xF => control_flow = self.exec_misc(word),
            // 1NNN (JP addr)
            //
            // Jump to address.
            0x1 => {
                op_trace_nnn("JP", self.cpu.pc - 2, nnn);

                self.cpu.pc = nnn as usize;

                control_flow = Flow::Jump;
            }
            // 2NNN (CALL addr)
            //
            // Call subroutine at NNN.
            0x2 => {
                op_trace_nnn("CALL", self.cpu.pc - 2, nnn);

                if !self.cpu.push_return(self.cpu.pc as Address) {
                    self.cpu.set_error(OchoError::StackOverflow);
                    control_flow = Flow::Error;
                } else {
                    self.cpu.pc = nnn as usize;
                    control_flow = Flow::Jump;
                }
            }
            // 3XNN (SE Vx, byte)
            //
            // Skip the next instruction if register VX equals value NN.
            0x3 => {
                op_trace_xnn("SE", self.cpu.pc - 2, vx, nn);

                if self.cpu.registers[vx] == nn {
                    self.cpu.pc += 2;
                }
            }
            // 4XNN (SNE Vx, byte)
            //
            // Skip the next instruction if register VX does not equal value NN.
            0x4 => {
                op_trace_xnn("SNE", self.cpu.pc - 2, vx, nn);

                if self.cpu.registers[vx] != nn {
                    self.cpu.pc += 2;
                }
            }
            // 5XY0 (SE Vx, Vy)
            //
            // Skip the next instruction if register VX equals register VY.
            // The low nibble is part of the pattern.
            0x5 => {
                op_trace_xy("SE", self.cpu.pc - 2, vx, vy);

                if n != 0 {
                    control_flow = self.unknown_opcode(word);
                } else if self.cpu.registers[vx] == self.cpu.registers[vy] {
                    self.cpu.pc += 2;
                }
            }
            // 6XNN (LD Vx, byte)
            //
            // Set register VX to value NN.
            0x6 => {
                op_trace_xnn("LD", self.cpu.pc - 2, vx, nn);

                self.cpu.registers[vx] = nn;
            }
            // 7XNN (ADD Vx, byte)
            //
            // Add value NN to register VX. Carry flag is not touched.
            0x7 => {
                op_trace_xnn("ADD", self.cpu.pc - 2, vx, nn);

                let x = self.cpu.registers[vx];
                self.cpu.registers[vx] = x.wrapping_add(nn);
            }
            // Arithmetic instructions identified by their low nibble.
            0x8 => control_flow = self.exec_math(word),
            // 9XY0 (SNE Vx, Vy)
            //
            // Skip the next instruction if register VX does not equal register VY.
            0x9 => {
                op_trace_xy("SNE", self.cpu.pc - 2, vx, vy);

                if n != 0 {
                    control_flow = self.unknown_opcode(word);
                } else if self.cpu.registers[vx] != self.cpu.registers[vy] {
                    self.cpu.pc += 2;
                }
            }
            // ANNN (LD I, addr)
            //
            // Set address register I to value NNN.
            0xA => {
                op_trace_nnn("LD I", self.cpu.pc - 2, nnn);

                self.cpu.address = nnn;
            }
            // BNNN (JP V0, addr)
            //
            // Jump to address NNN plus the value of register V0.
            0xB => {
                op_trace_nnn("JP V0", self.cpu.pc - 2, nnn);

                self.cpu.pc = nnn as usize + self.cpu.registers[0] as usize;

                control_flow = Flow::Jump;
            }
            // CXNN (RND Vx, byte)
            //
            // Set register VX to the bitwise AND of a random byte and NN.
            0xC => {
                op_trace_xnn("RND", self.cpu.pc - 2, vx, nn);

                self.cpu.registers[vx] = rng.gen::<u8>() & nn;
            }
            // DXYN (DRW Vx, Vy, nibble)
            //
            // Draw an 8xN sprite read from memory at address register I,
            // at coordinate (VX, VY). Each set sprite bit toggles its
            // display pixel; coordinates wrap around the display edges.
            //
            // VF reports a collision: 1 when any toggle erased a lit
            // pixel, 0 otherwise.
            0xD => {
                op_trace_xyn("DRW", self.cpu.pc - 2, vx, vy, n);

                let addr = self.cpu.address as usize;
                let rows = n as usize;

                if rows > 0 && addr + rows > MEM_SIZE {
                    self.cpu.set_error(OchoError::OutOfBounds {
                        addr: addr + rows - 1,
                    });
                    control_flow = Flow::Error;
                } else {
                    let (x, y) = (
                        self.cpu.registers[vx] as usize,
                        self.cpu.registers[vy] as usize,
                    );
                    let mut erased = false;

                    for row in 0..rows {
                        // Each row is one byte, one bit per pixel,
                        // highest bit leftmost.
                        let bits = self.cpu.ram[addr + row];
                        for col in 0..8 {
                            if bits & (0x80 >> col) != 0 {
                                erased |= self.cpu.display.set_pixel(x + col, y + row);
                            }
                        }
                    }

                    // An erased pixel means a collision occurred.
                    self.cpu.registers[0xF] = erased as u8;
                    control_flow = Flow::Draw;
                }
            }
            // Unreachable: the top nibble is 4 bits and every value is
            // dispatched above.
            _ => control_flow = self.unknown_opcode(word),
        }

        control_flow
    }

    /// Execute an arithmetic instruction
    #[inline]
    #[must_use]
    fn exec_math(&mut self, word: u16) -> Flow {
        debug_assert_eq!(op_code(word), 0x8);

        let vx = op_x(word) as usize;
        let vy = op_y(word) as usize;

        let mut control_flow = Flow::Ok;

        match op_n(word) {
            // 8XY0 (LD Vx, Vy)
            //
            // Store the value of register VY in register VX.
            0x0 => {
                op_trace_xy("LD", self.cpu.pc - 2, vx, vy);

                self.cpu.registers[vx] = self.cpu.registers[vy];
            }
            // 8XY1 (OR Vx, Vy)
            //
            // Performs bitwise OR on VX and VY, and stores the result in VX.
            0x1 => {
                op_trace_xy("OR", self.cpu.pc - 2, vx, vy);

                self.cpu.registers[vx] |= self.cpu.registers[vy];
            }
            // 8XY2 (AND Vx, Vy)
            //
            // Performs bitwise AND on VX and VY, and stores the result in VX.
            0x2 => {
                op_trace_xy("AND", self.cpu.pc - 2, vx, vy);

                self.cpu.registers[vx] &= self.cpu.registers[vy];
            }
            // 8XY3 (XOR Vx, Vy)
            //
            // Performs bitwise XOR on VX and VY, and stores the result in VX.
            0x3 => {
                op_trace_xy("XOR", self.cpu.pc - 2, vx, vy);

                self.cpu.registers[vx] ^= self.cpu.registers[vy];
            }
            // 8XY4 (ADD Vx, Vy)
            //
            // Adds VY to VX and stores the result in VX, wrapped to
            // 8 bits. VF becomes 1 on carry, 0 otherwise.
            //
            // Operands are read into temporaries before any write, so
            // the flag lands in VF last even when VX is VF itself.
            0x4 => {
                op_trace_xy("ADD", self.cpu.pc - 2, vx, vy);

                let (x, y) = (self.cpu.registers[vx], self.cpu.registers[vy]);
                let sum = x as u16 + y as u16;
                self.cpu.registers[vx] = sum as u8;
                self.cpu.registers[0xF] = (sum > 0xFF) as u8;
            }
            // 8XY5 (SUB Vx, Vy)
            //
            // Subtracts VY from VX and stores the result in VX, wrapped
            // to 8 bits. VF becomes 1 when VX > VY, 0 otherwise.
            0x5 => {
                op_trace_xy("SUB", self.cpu.pc - 2, vx, vy);

                let (x, y) = (self.cpu.registers[vx], self.cpu.registers[vy]);
                self.cpu.registers[vx] = x.wrapping_sub(y);
                self.cpu.registers[0xF] = (x > y) as u8;
            }
            // 8XY6 (SHR Vx)
            //
            // Shift VX right by 1. VF receives the shifted-out bit.
            // VY is unused.
            0x6 => {
                op_trace_xy("SHR", self.cpu.pc - 2, vx, vy);

                let x = self.cpu.registers[vx];
                self.cpu.registers[vx] = x >> 1;
                self.cpu.registers[0xF] = x & 1;
            }
            // 8XY7 (SUBN Vx, Vy)
            //
            // Subtracts VX from VY and stores the result in VX, wrapped
            // to 8 bits. VF becomes 1 when VY > VX, 0 otherwise.
            0x7 => {
                op_trace_xy("SUBN", self.cpu.pc - 2, vx, vy);

                let (x, y) = (self.cpu.registers[vx], self.cpu.registers[vy]);
                self.cpu.registers[vx] = y.wrapping_sub(x);
                self.cpu.registers[0xF] = (y > x) as u8;
            }
            // 8XYE (SHL Vx)
            //
            // Shift VX left by 1. VF receives the shifted-out bit,
            // as 0 or 1. VY is unused.
            0xE => {
                op_trace_xy("SHL", self.cpu.pc - 2, vx, vy);

                let x = self.cpu.registers[vx];
                self.cpu.registers[vx] = x << 1;
                self.cpu.registers[0xF] = (x >> 7) & 1;
            }
            // ----------------------------------------------------------------
            // Unsupported operation.
            _ => control_flow = self.unknown_opcode(word),
        }

        control_flow
    }

    /// Execute a miscellaneous instruction
    #[inline]
    #[must_use]
    fn exec_misc(&mut self, word: u16) -> Flow {
        let vx = op_x(word) as usize;

        let mut control_flow = Flow::Ok;

        match (op_code(word), op_nn(word)) {
            // ----------------------------------------------------------------
            // 00E0 (CLS)
            //
            // Clear display
            (0x0, 0xE0) => {
                op_trace("CLS", self.cpu.pc - 2);

                self.cpu.display.clear();
            }
            // 00EE (RET)
            //
            // Return from a subroutine.
            // Pop the top of the stack into the program counter.
            (0x0, 0xEE) => {
                op_trace("RET", self.cpu.pc - 2);

                match self.cpu.pop_return() {
                    Some(addr) => {
                        self.cpu.pc = addr as usize;
                        control_flow = Flow::Jump;
                    }
                    None => {
                        self.cpu.set_error(OchoError::StackUnderflow);
                        control_flow = Flow::Error;
                    }
                }
            }
            // ----------------------------------------------------------------
            // EX9E (SKP Vx)
            //
            // Skip the next instruction if the key with the value of VX
            // is currently pressed.
            (0xE, 0x9E) => {
                op_trace_fx("SKP", self.cpu.pc - 2, vx);

                if self.cpu.key_state(self.cpu.registers[vx]) {
                    self.cpu.pc += 2;
                }
            }
            // EXA1 (SKNP Vx)
            //
            // Skip the next instruction if the key with the value of VX
            // is currently not pressed.
            (0xE, 0xA1) => {
                op_trace_fx("SKNP", self.cpu.pc - 2, vx);

                if !self.cpu.key_state(self.cpu.registers[vx]) {
                    self.cpu.pc += 2;
                }
            }
            // ----------------------------------------------------------------
            // FX07 (LD Vx, DT)
            //
            // Set Vx = delay timer value.
            (0xF, 0x07) => {
                op_trace_fx("LD DT", self.cpu.pc - 2, vx);

                self.cpu.registers[vx] = self.cpu.delay_timer;
            }
            // FX0A (LD Vx, K)
            //
            // Suspend execution until a key is pressed, then store the
            // value of that key in VX.
            //
            // The suspension is a state flag polled by the cycle
            // driver, not a callback; the destination register rides
            // along in the wait state.
            (0xF, 0x0A) => {
                op_trace_fx("LD K", self.cpu.pc - 2, vx);

                self.cpu.wait_state = WaitState::WaitingForKey { dest: vx as u8 };
                control_flow = Flow::KeyWait;
            }
            // FX15 (LD DT, Vx)
            //
            // Set delay timer = Vx.
            (0xF, 0x15) => {
                op_trace_fx("LD DT", self.cpu.pc - 2, vx);

                self.cpu.delay_timer = self.cpu.registers[vx];
            }
            // FX18 (LD ST, Vx)
            //
            // Set sound timer = Vx.
            (0xF, 0x18) => {
                op_trace_fx("LD ST", self.cpu.pc - 2, vx);

                self.cpu.sound_timer = self.cpu.registers[vx];
                self.cpu.buzzer_state = self.cpu.sound_timer > 0;
                control_flow = Flow::Sound;
            }
            // FX1E (ADD I, Vx)
            //
            // Add Vx to I. The sum is not masked to 12 bits; a result
            // past the end of memory traps at the next access through I.
            (0xF, 0x1E) => {
                op_trace_fx("ADD I", self.cpu.pc - 2, vx);

                let x = self.cpu.registers[vx] as Address;
                self.cpu.address = self.cpu.address.wrapping_add(x);
            }
            // FX29 (LD F, Vx)
            //
            // Set I = location of the builtin glyph for digit VX.
            (0xF, 0x29) => {
                op_trace_fx("LD F", self.cpu.pc - 2, vx);

                let x = self.cpu.registers[vx] as usize;
                self.cpu.address = (FONTSET_START + x * FONTSET_HEIGHT) as Address;
            }
            // FX33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of VX in
            // the memory locations I, I+1, and I+2.
            #[rustfmt::skip]
            (0xF, 0x33) => {
                op_trace_fx("LD B", self.cpu.pc - 2, vx);

                let addr = self.cpu.address as usize;
                if addr + 3 > MEM_SIZE {
                    self.cpu.set_error(OchoError::OutOfBounds { addr: addr + 2 });
                    control_flow = Flow::Error;
                } else {
                    let x = self.cpu.registers[vx];
                    self.cpu.ram[addr]     = x / 100 % 10;
                    self.cpu.ram[addr + 1] = x / 10  % 10;
                    self.cpu.ram[addr + 2] = x       % 10;
                }
            }
            // FX55 (LD [I], Vx)
            //
            // Store registers V0 through VX in memory starting at
            // location I.
            (0xF, 0x55) => {
                op_trace_fx("LD [I]", self.cpu.pc - 2, vx);

                let addr = self.cpu.address as usize;
                if addr + vx + 1 > MEM_SIZE {
                    self.cpu.set_error(OchoError::OutOfBounds { addr: addr + vx });
                    control_flow = Flow::Error;
                } else {
                    self.cpu.ram[addr..=addr + vx].copy_from_slice(&self.cpu.registers[0..=vx]);
                }
            }
            // FX65 (LD Vx, [I])
            //
            // Read registers V0 through VX from memory starting at
            // location I.
            (0xF, 0x65) => {
                op_trace_fx("LD Vx [I]", self.cpu.pc - 2, vx);

                let addr = self.cpu.address as usize;
                if addr + vx + 1 > MEM_SIZE {
                    self.cpu.set_error(OchoError::OutOfBounds { addr: addr + vx });
                    control_flow = Flow::Error;
                } else {
                    self.cpu.registers[0..=vx].copy_from_slice(&self.cpu.ram[addr..=addr + vx]);
                }
            }
            // ----------------------------------------------------------------
            // Unsupported operation.
            _ => control_flow = self.unknown_opcode(word),
        }

        control_flow
    }

    /// Trap on an instruction word that matches no known pattern.
    ///
    /// The program counter was already advanced past the word, so the
    /// fetch address is two behind it.
    fn unknown_opcode(&mut self, word: u16) -> Flow {
        self.cpu.set_error(OchoError::UnknownOpcode {
            opcode: word,
            addr: (self.cpu.pc - 2) as Address,
        });
        Flow::Error
    }
}

/// Troubleshooting
#[allow(dead_code)]
#[doc(hidden)]
impl OchoVm {
    /// Returns the contents of the memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, std::fmt::Error> {
        let iter = self
            .cpu
            .ram
            .iter()
            .enumerate()
            .skip(MEM_START)
            .take(count)
            .step_by(2);
        let mut buf = String::new();

        for (i, op) in iter {
            writeln!(buf, "{:04X}: {:02X}{:02X}", i, op, self.cpu.ram[i + 1])?;
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        let display = self.cpu.display.buffer();

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if display[x + y * DISPLAY_WIDTH] {
                    write!(buf, "#")?;
                } else {
                    write!(buf, ".")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace(name: &str, addr: usize) {
    println!("{addr:04X}: {name:6}");
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_nnn(name: &str, addr: usize, nnn: u16) {
    println!("{addr:04X}: {name:6} {nnn:03X}");
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_xnn(name: &str, addr: usize, vx: usize, nn: u8) {
    println!("{addr:04X}: {name:6} V{vx:01X} {nn:02X}");
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_xy(name: &str, addr: usize, vx: usize, vy: usize) {
    println!("{addr:04X}: {name:6} V{vx:01X} V{vy:01X}");
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_xyn(name: &str, addr: usize, vx: usize, vy: usize, n: u8) {
    println!("{addr:04X}: {name:6} V{vx:01X} V{vy:01X} {n:01X}");
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_fx(name: &str, addr: usize, vx: usize) {
    println!("{addr:04X}: {name:6} V{vx:01X}");
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: &str, _: usize) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_nnn(_: &str, _: usize, _: u16) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_xnn(_: &str, _: usize, _: usize, _: u8) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_xy(_: &str, _: usize, _: usize, _: usize) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_xyn(_: &str, _: usize, _: usize, _: usize, _: u8) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_fx(_: &str, _: usize, _: usize) {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::devices::NullDevices;

    fn load_vm(rom: &[u8]) -> OchoVm {
        let mut vm = OchoVm::new(OchoConf::default());
        vm.load_rom(rom).unwrap();
        vm
    }

    #[test]
    fn test_tick_frequency_interval() {
        let interval: Duration = Hz(TICK_FREQUENCY).into();
        assert_eq!(interval.as_millis(), 16);
    }

    #[test]
    fn test_font_loaded() {
        let vm = load_vm(&[]);
        assert_eq!(&vm.cpu.ram[0..FONTSET.len()], &FONTSET[..]);
    }

    #[test]
    fn test_glyph_address() {
        // LD V4, 0x0A; LD F, V4
        let mut vm = load_vm(&[0x64, 0x0A, 0xF4, 0x29]);

        vm.step();
        vm.step();
        assert_eq!(vm.cpu.address, 0x0A * FONTSET_HEIGHT as Address);
    }

    #[test]
    fn test_add_carry() {
        // ADD V0, V1
        let mut vm = load_vm(&[0x80, 0x14]);
        vm.cpu.registers[0] = 0xFF;
        vm.cpu.registers[1] = 0x01;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0x00);
        assert_eq!(vm.cpu.registers[0xF], 1);

        let mut vm = load_vm(&[0x80, 0x14]);
        vm.cpu.registers[0] = 0x10;
        vm.cpu.registers[1] = 0x20;
        vm.cpu.registers[0xF] = 1;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0x30);
        assert_eq!(vm.cpu.registers[0xF], 0, "flag must be cleared on no carry");
    }

    #[test]
    fn test_add_flag_wins_when_vf_is_destination() {
        // ADD VF, V1
        let mut vm = load_vm(&[0x8F, 0x14]);
        vm.cpu.registers[0xF] = 0x01;
        vm.cpu.registers[1] = 0x02;

        vm.step();
        // The carry flag overwrites the arithmetic result.
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_add_immediate_wraps() {
        // ADD V0, 0x02
        let mut vm = load_vm(&[0x70, 0x02]);
        vm.cpu.registers[0] = 0xFF;
        vm.cpu.registers[0xF] = 7;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0x01);
        assert_eq!(vm.cpu.registers[0xF], 7, "ADD Vx, byte must not touch VF");
    }

    #[test]
    fn test_sub_borrow() {
        // SUB V0, V1
        let mut vm = load_vm(&[0x80, 0x15]);
        vm.cpu.registers[0] = 0x01;
        vm.cpu.registers[1] = 0x02;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0xFF);
        assert_eq!(vm.cpu.registers[0xF], 0);

        let mut vm = load_vm(&[0x80, 0x15]);
        vm.cpu.registers[0] = 0x05;
        vm.cpu.registers[1] = 0x03;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0x02);
        assert_eq!(vm.cpu.registers[0xF], 1);

        // Equal operands do not set the flag.
        let mut vm = load_vm(&[0x80, 0x15]);
        vm.cpu.registers[0] = 0x42;
        vm.cpu.registers[1] = 0x42;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0x00);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_subn() {
        // SUBN V0, V1
        let mut vm = load_vm(&[0x80, 0x17]);
        vm.cpu.registers[0] = 0x02;
        vm.cpu.registers[1] = 0x05;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0x03);
        assert_eq!(vm.cpu.registers[0xF], 1);

        let mut vm = load_vm(&[0x80, 0x17]);
        vm.cpu.registers[0] = 0x05;
        vm.cpu.registers[1] = 0x02;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0xFD);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_shr() {
        // SHR V0
        let mut vm = load_vm(&[0x80, 0x06]);
        vm.cpu.registers[0] = 0b1001_0001;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0b0100_1000);
        assert_eq!(vm.cpu.registers[0xF], 1);

        let mut vm = load_vm(&[0x80, 0x06]);
        vm.cpu.registers[0] = 0b1001_0000;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0b0100_1000);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_shl() {
        // SHL V0
        let mut vm = load_vm(&[0x80, 0x0E]);
        vm.cpu.registers[0] = 0b1001_0001;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0b0010_0010);
        assert_eq!(vm.cpu.registers[0xF], 1, "shifted-out bit must be 0 or 1");

        let mut vm = load_vm(&[0x80, 0x0E]);
        vm.cpu.registers[0] = 0x7F;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0xFE);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_bitwise_and_copy() {
        // LD V0, V1; OR V0, V2; AND V0, V3; XOR V0, V4
        let mut vm = load_vm(&[0x80, 0x10, 0x80, 0x21, 0x80, 0x32, 0x80, 0x43]);
        vm.cpu.registers[1] = 0b1100_0000;
        vm.cpu.registers[2] = 0b0011_0000;
        vm.cpu.registers[3] = 0b1111_1100;
        vm.cpu.registers[4] = 0b0000_0101;

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0b1100_0000);
        vm.step();
        assert_eq!(vm.cpu.registers[0], 0b1111_0000);
        vm.step();
        assert_eq!(vm.cpu.registers[0], 0b1111_0000);
        vm.step();
        assert_eq!(vm.cpu.registers[0], 0b1111_0101);
    }

    #[test]
    fn test_skip_equal_immediate() {
        // SE V0, 0x42
        let mut vm = load_vm(&[0x30, 0x42]);
        vm.cpu.registers[0] = 0x42;

        vm.step();
        assert_eq!(vm.cpu.pc, MEM_START + 4, "equal operands must skip");

        let mut vm = load_vm(&[0x30, 0x42]);
        vm.step();
        assert_eq!(vm.cpu.pc, MEM_START + 2, "unequal operands must not skip");
    }

    #[test]
    fn test_skip_family() {
        // SNE V0, 0x42
        let mut vm = load_vm(&[0x40, 0x42]);
        vm.step();
        assert_eq!(vm.cpu.pc, MEM_START + 4);

        // SE V0, V1
        let mut vm = load_vm(&[0x50, 0x10]);
        vm.step();
        assert_eq!(vm.cpu.pc, MEM_START + 4);

        // SNE V0, V1
        let mut vm = load_vm(&[0x90, 0x10]);
        vm.cpu.registers[1] = 1;
        vm.step();
        assert_eq!(vm.cpu.pc, MEM_START + 4);
    }

    #[test]
    fn test_jump() {
        // JP 0x2A0
        let mut vm = load_vm(&[0x12, 0xA0]);

        assert_eq!(vm.step(), Flow::Jump);
        assert_eq!(vm.cpu.pc, 0x2A0);
    }

    #[test]
    fn test_jump_offset() {
        // JP V0, 0x300
        let mut vm = load_vm(&[0xB3, 0x00]);
        vm.cpu.registers[0] = 0x05;

        assert_eq!(vm.step(), Flow::Jump);
        assert_eq!(vm.cpu.pc, 0x305);
    }

    #[test]
    fn test_call_and_return() {
        // CALL 0x300
        let mut vm = load_vm(&[0x23, 0x00]);
        // RET
        vm.cpu.ram[0x300] = 0x00;
        vm.cpu.ram[0x301] = 0xEE;

        assert_eq!(vm.step(), Flow::Jump);
        assert_eq!(vm.cpu.pc, 0x300);
        assert_eq!(vm.cpu.sp, 1);

        assert_eq!(vm.step(), Flow::Jump);
        assert_eq!(
            vm.cpu.pc,
            MEM_START + 2,
            "RET must land just after the CALL"
        );
        assert_eq!(vm.cpu.sp, 0);
    }

    #[test]
    fn test_stack_underflow() {
        // RET with an empty stack
        let mut vm = load_vm(&[0x00, 0xEE]);

        assert_eq!(vm.step(), Flow::Error);
        assert_eq!(vm.cpu.error, Some(OchoError::StackUnderflow));
        assert!(vm.cpu.trap);
    }

    #[test]
    fn test_stack_overflow() {
        // CALL 0x200: an endless recursion without returns
        let mut vm = load_vm(&[0x22, 0x00]);

        for _ in 0..STACK_SIZE {
            assert_eq!(vm.step(), Flow::Jump);
        }
        assert_eq!(vm.step(), Flow::Error);
        assert_eq!(vm.cpu.error, Some(OchoError::StackOverflow));
    }

    #[test]
    fn test_unknown_opcode() {
        let mut vm = load_vm(&[0xFF, 0xFF]);

        assert_eq!(vm.step(), Flow::Error);
        assert_eq!(
            vm.cpu.error,
            Some(OchoError::UnknownOpcode {
                opcode: 0xFFFF,
                addr: 0x200
            })
        );
        // The program counter stays past the offending word.
        assert_eq!(vm.cpu.pc, MEM_START + 2);
    }

    #[test]
    fn test_unknown_opcode_subdispatch() {
        // SE Vx, Vy with a non-zero low nibble matches nothing.
        let mut vm = load_vm(&[0x51, 0x21]);
        assert_eq!(vm.step(), Flow::Error);
        assert_eq!(
            vm.cpu.error,
            Some(OchoError::UnknownOpcode {
                opcode: 0x5121,
                addr: 0x200
            })
        );

        // 0NNN system calls are not supported.
        let mut vm = load_vm(&[0x00, 0x00]);
        assert_eq!(vm.step(), Flow::Error);

        // 8XYF is not an arithmetic instruction.
        let mut vm = load_vm(&[0x80, 0x1F]);
        assert_eq!(vm.step(), Flow::Error);
    }

    #[test]
    fn test_random_masked() {
        // RND V0, 0x00; RND V1, 0x0F
        let mut vm = load_vm(&[0xC0, 0x00, 0xC1, 0x0F]);

        vm.step();
        assert_eq!(vm.cpu.registers[0], 0, "zero mask must produce zero");

        vm.step();
        assert_eq!(vm.cpu.registers[1] & 0xF0, 0);
    }

    #[test]
    fn test_load_address_and_offset() {
        // LD I, 0x2A5; ADD I, V0
        let mut vm = load_vm(&[0xA2, 0xA5, 0xF0, 0x1E]);
        vm.cpu.registers[0] = 0x10;

        vm.step();
        assert_eq!(vm.cpu.address, 0x2A5);

        vm.step();
        assert_eq!(vm.cpu.address, 0x2B5);
    }

    #[test]
    fn test_delay_timer_transfer() {
        // LD DT, V0; LD V1, DT
        let mut vm = load_vm(&[0xF0, 0x15, 0xF1, 0x07]);
        vm.cpu.registers[0] = 42;

        vm.step();
        assert_eq!(vm.cpu.delay_timer, 42);

        vm.step();
        assert_eq!(vm.cpu.registers[1], 42);
    }

    #[test]
    fn test_bcd() {
        // LD B, V0
        let mut vm = load_vm(&[0xF0, 0x33]);
        vm.cpu.registers[0] = 234;
        vm.cpu.address = 0x300;

        vm.step();
        assert_eq!(&vm.cpu.ram[0x300..0x303], &[2, 3, 4]);

        let mut vm = load_vm(&[0xF0, 0x33]);
        vm.cpu.registers[0] = 7;
        vm.cpu.address = 0x300;

        vm.step();
        assert_eq!(&vm.cpu.ram[0x300..0x303], &[0, 0, 7]);
    }

    #[test]
    fn test_store_and_load_registers() {
        // LD [I], V2
        let mut vm = load_vm(&[0xF2, 0x55]);
        vm.cpu.registers[0] = 0xAA;
        vm.cpu.registers[1] = 0xBB;
        vm.cpu.registers[2] = 0xCC;
        vm.cpu.registers[3] = 0xDD;
        vm.cpu.address = 0x300;

        vm.step();
        assert_eq!(&vm.cpu.ram[0x300..0x303], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(vm.cpu.ram[0x303], 0, "V3 is past X and must not be stored");

        // LD Vx, [I]
        let mut vm = load_vm(&[0xF2, 0x65]);
        vm.cpu.ram[0x300..0x304].copy_from_slice(&[0x11, 0x22, 0x33, 0x44]);
        vm.cpu.address = 0x300;

        vm.step();
        assert_eq!(&vm.cpu.registers[0..4], &[0x11, 0x22, 0x33, 0x00]);
    }

    #[test]
    fn test_memory_access_out_of_bounds() {
        // LD [I], V2 with I close to the end of memory
        let mut vm = load_vm(&[0xF2, 0x55]);
        vm.cpu.address = 0xFFE;

        assert_eq!(vm.step(), Flow::Error);
        assert_eq!(vm.cpu.error, Some(OchoError::OutOfBounds { addr: 0x1000 }));

        // DRW reading sprite rows past the end of memory
        let mut vm = load_vm(&[0xD0, 0x05]);
        vm.cpu.address = 0xFFF;

        assert_eq!(vm.step(), Flow::Error);
        assert_eq!(vm.cpu.error, Some(OchoError::OutOfBounds { addr: 0x1003 }));

        // Instruction fetch past the end of memory
        let mut vm = load_vm(&[]);
        vm.cpu.pc = 0xFFF;

        assert_eq!(vm.step(), Flow::Error);
        assert_eq!(vm.cpu.error, Some(OchoError::OutOfBounds { addr: 0xFFF }));
    }

    #[test]
    fn test_draw_collision_and_xor() {
        // DRW V0, V1, 1 twice, drawing near the corner so the sprite
        // wraps around both display edges.
        let mut vm = load_vm(&[0xD0, 0x11, 0xD0, 0x11]);
        vm.cpu.ram[0x300] = 0b1111_1111;
        vm.cpu.address = 0x300;
        vm.cpu.registers[0] = (DISPLAY_WIDTH - 4) as u8;
        vm.cpu.registers[1] = (DISPLAY_HEIGHT - 1) as u8;

        assert_eq!(vm.step(), Flow::Draw);
        assert_eq!(vm.cpu.registers[0xF], 0, "fresh pixels are not a collision");
        // Four pixels at the end of the last row, four wrapped to its start.
        for x in 60..64 {
            assert!(vm.cpu.display.pixel(x, DISPLAY_HEIGHT - 1));
        }
        for x in 0..4 {
            assert!(vm.cpu.display.pixel(x, DISPLAY_HEIGHT - 1));
        }

        // The identical draw erases every pixel and reports a collision.
        assert_eq!(vm.step(), Flow::Draw);
        assert_eq!(vm.cpu.registers[0xF], 1);
        assert!(vm.display_buffer().iter().all(|px| !px));
    }

    #[test]
    fn test_draw_no_collision_between_sprites() {
        // Two sprites drawn side by side; the zero bits of the second
        // must not erase the pixels of the first.
        let mut vm = load_vm(&[0xD0, 0x11, 0x62, 0x04, 0xD2, 0x11]);
        vm.cpu.ram[0x300] = 0b1111_0000;
        vm.cpu.address = 0x300;

        vm.step(); // DRW V0, V1, 1 at (0, 0)
        vm.step(); // LD V2, 4
        vm.step(); // DRW V2, V1, 1 at (4, 0)

        assert_eq!(vm.cpu.registers[0xF], 0);
        for x in 0..8 {
            assert!(vm.cpu.display.pixel(x, 0));
        }
    }

    #[test]
    fn test_clear_display() {
        // CLS
        let mut vm = load_vm(&[0x00, 0xE0]);
        vm.cpu.display.set_pixel(10, 10);

        vm.step();
        assert!(vm.display_buffer().iter().all(|px| !px));
    }

    #[test]
    fn test_skip_on_key() {
        // SKP V0
        let mut vm = load_vm(&[0xE0, 0x9E]);
        vm.cpu.registers[0] = 0x5;
        vm.set_key(KeyCode::Key5, true);

        vm.step();
        assert_eq!(vm.cpu.pc, MEM_START + 4);

        // SKNP V0
        let mut vm = load_vm(&[0xE0, 0xA1]);
        vm.cpu.registers[0] = 0x5;

        vm.step();
        assert_eq!(vm.cpu.pc, MEM_START + 4);

        vm.load_rom(&[0xE0, 0xA1]).unwrap();
        vm.cpu.registers[0] = 0x5;
        vm.set_key(KeyCode::Key5, true);

        vm.step();
        assert_eq!(vm.cpu.pc, MEM_START + 2, "pressed key must not skip SKNP");
    }

    /// FX0A (LD Vx, K)
    ///
    /// Wait for a keypress, then store the key value in Vx.
    /// The machine must suspend and signal the state to the driver.
    #[test]
    fn test_key_wait() {
        let mut vm = load_vm(&[0xF3, 0x0A]);

        assert_eq!(vm.step(), Flow::KeyWait);
        assert_eq!(vm.cpu.pc, MEM_START + 2);
        assert_eq!(vm.cpu.wait_state, WaitState::WaitingForKey { dest: 3 });
    }

    #[test]
    fn test_cycle_timers_once_per_tick() {
        // LD V0, 5; LD DT, V0; JP 0x204
        let mut vm = load_vm(&[0x60, 0x05, 0xF0, 0x15, 0x12, 0x04]);
        let mut devices = NullDevices;

        // One tick runs the whole batch but decrements the timer once.
        vm.cycle(&mut devices).unwrap();
        assert_eq!(vm.cpu.delay_timer, 4);

        for _ in 0..4 {
            vm.cycle(&mut devices).unwrap();
        }
        assert_eq!(vm.cpu.delay_timer, 0);

        vm.cycle(&mut devices).unwrap();
        assert_eq!(vm.cpu.delay_timer, 0);
    }

    #[test]
    fn test_cycle_reports_fatal_error_once() {
        let mut vm = load_vm(&[0xFF, 0xFF]);
        let mut devices = NullDevices;

        let err = vm.cycle(&mut devices).unwrap_err();
        assert_eq!(
            err,
            OchoError::UnknownOpcode {
                opcode: 0xFFFF,
                addr: 0x200
            }
        );

        // The machine stays halted instead of re-reporting.
        assert_eq!(vm.cycle(&mut devices).unwrap(), Flow::Interrupt);
    }

    #[test]
    fn test_dump_display() {
        // LD V0, 0; LD F, V0; DRW V1, V2, 5
        let mut vm = load_vm(&[0x60, 0x00, 0xF0, 0x29, 0xD1, 0x25]);

        vm.step();
        vm.step();
        vm.step();

        let dump = vm.dump_display().unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        // The zero glyph: a four pixel wide box.
        assert!(lines[0].starts_with("####...."));
        assert!(lines[1].starts_with("#..#...."));
        assert!(lines[4].starts_with("####...."));
    }
}
