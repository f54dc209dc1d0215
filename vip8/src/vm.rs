//! Virtual machine.
use std::{
    fmt::{self, Write},
    time::Duration,
};

use rand::prelude::*;

#[cfg(feature = "throttle")]
use crate::clock::Clock;
use crate::{
    constants::*,
    cpu::Vip8Cpu,
    decode::{decode, Op},
    devices::{KeyCode, KeyEventSource},
    error::{Vip8Error, Vip8Result},
    FrameBuffer,
};

/// Number of control-transfer cycles `execute` tolerates before it
/// interrupts the machine. Programs conventionally end in a busy loop,
/// which would otherwise hang a headless host forever.
const JUMP_GUARD: usize = 10_000;

/// An owned Chip-8 machine.
///
/// Construction leaves the machine initialized: memory zeroed, the builtin
/// font written into the reserved interpreter region, and the program
/// counter at the start of program space.
pub struct Vip8Vm {
    cpu: Vip8Cpu,
    #[cfg(feature = "throttle")]
    clock: Clock,
    conf: Vip8Conf,
}

impl Vip8Vm {
    pub fn new(conf: Vip8Conf) -> Self {
        Vip8Vm {
            cpu: Vip8Cpu::new(),
            #[cfg(feature = "throttle")]
            clock: Clock::new(conf.clock_frequency.unwrap_or_default().into()),
            conf,
        }
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Vip8Conf {
        &self.conf
    }

    /// Copy a program image into memory, starting at the first program
    /// address.
    ///
    /// The machine is reset to its power-on state first, so no previous
    /// program leaks through. An image larger than the program space is
    /// rejected whole rather than truncated, and the machine keeps its
    /// pre-load state.
    pub fn load_program(&mut self, image: &[u8]) -> Vip8Result<()> {
        if image.len() > MAX_PROGRAM_SIZE {
            return Err(Vip8Error::ImageTooLarge { size: image.len() });
        }

        self.cpu.reset();
        self.cpu.ram[MEM_START..MEM_START + image.len()].copy_from_slice(image);

        log::debug!("loaded {} byte program image", image.len());

        Ok(())
    }

    /// Borrow the monochrome display buffer.
    pub fn framebuffer(&self) -> FrameBuffer<'_> {
        &self.cpu.display
    }

    /// Whether the display buffer changed since the host last cleared the
    /// flag.
    pub fn display_dirty(&self) -> bool {
        self.cpu.display_dirty
    }

    /// Acknowledge a render; called by the host after it consumed the
    /// framebuffer.
    pub fn clear_display_dirty(&mut self) {
        self.cpu.display_dirty = false;
    }

    /// Whether the buzzer should currently be audible.
    pub fn buzzer(&self) -> bool {
        self.cpu.buzzer_state
    }

    /// Whether the sound timer ran out on the most recent cycle.
    pub fn tone_expired(&self) -> bool {
        self.cpu.tone_expired
    }

    /// Whether the machine is stalled on a wait-for-keypress instruction.
    pub fn waiting_for_key(&self) -> bool {
        self.cpu.key_wait
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    /// The fault the machine halted on, if any.
    pub fn error(&self) -> Option<&Vip8Error> {
        self.cpu.error.as_ref()
    }

    /// Stop the run loop at the next cycle boundary.
    pub fn interrupt(&mut self) {
        self.cpu.trap = true;
    }

    /// Set one keypad key up or down.
    ///
    /// A press resumes a machine stalled on the wait-for-keypress
    /// instruction.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.set_key_state(key.as_u8(), pressed);
        if pressed {
            self.cpu.key_wait = false;
        }
    }

    /// Clear the keypad state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }

    /// Drain pending key edges from a host input source into the keypad.
    pub fn pump_keys(&mut self, keys: &mut dyn KeyEventSource) {
        while let Some((key, pressed)) = keys.poll_key() {
            self.set_key(key, pressed);
        }
    }
}

/// Per-cycle control flow report, so hosts can react without inspecting
/// machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// Returned for absolute jumps, offset jumps, calls and returns. The
    /// caller can use this to avoid being blocked on long running loops.
    Jump,
    /// The display buffer changed.
    Draw,
    /// Buzzer state changed: the sound timer was set, or it just ran out.
    Sound,
    /// Stalled on `Fx0A` (`LD Vx, K`) waiting for a keypress. The program
    /// counter holds until a key goes down.
    KeyWait,
    /// The trap flag stopped the machine.
    Interrupt,
}

/// VM configuration parameters.
#[derive(Default, Clone)]
pub struct Vip8Conf {
    /// Clock frequency cycles are paced at when the `throttle` feature is
    /// enabled.
    pub clock_frequency: Option<Hz>,
}

/// CPU clock frequency, in hertz (per second).
#[derive(Debug, Default, Clone, Copy)]
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

/// Interpreter
impl Vip8Vm {
    /// Run one instruction cycle: fetch, decode, execute, then count the
    /// timers down.
    ///
    /// A fatal fault halts the machine; every further call returns the
    /// same error until a new program is loaded.
    pub fn step(&mut self) -> Vip8Result<Flow> {
        if let Some(error) = &self.cpu.error {
            return Err(error.clone());
        }
        if self.cpu.trap {
            return Ok(Flow::Interrupt);
        }

        #[cfg(feature = "throttle")]
        self.clock.wait();

        self.cpu.tone_expired = false;

        // Fetch two bytes at the program counter, composed big-endian.
        let word = self.cpu.fetch();

        // Decode. A word that matches no instruction halts the machine
        // before any state changes, program counter included.
        let Some(op) = decode(word) else {
            let error = Vip8Error::UnknownOpcode {
                opcode: word,
                pc: self.cpu.pc as Address,
            };
            self.cpu.halt(error.clone());
            return Err(error);
        };

        op_trace(&op, &self.cpu);

        // Execute. Instructions that transfer control overwrite the
        // default advance to the next instruction.
        self.cpu.pc += 2;
        let flow = match self.exec(op) {
            Ok(flow) => flow,
            Err(error) => {
                self.cpu.halt(error.clone());
                return Err(error);
            }
        };

        // Timers count down once per cycle, after instruction effects.
        // The 1 -> 0 transition of the sound timer is the tone-expired
        // edge reported to the host.
        self.cpu.tick_delay();
        if self.cpu.tick_sound() {
            self.cpu.tone_expired = true;
            self.cpu.buzzer_state = false;
            if flow == Flow::Ok {
                return Ok(Flow::Sound);
            }
        }

        Ok(flow)
    }

    /// Run cycles until the machine is interrupted or faults.
    pub fn execute(&mut self) -> Vip8Result<Flow> {
        self.cpu.trap = false;
        #[cfg(feature = "throttle")]
        self.clock.reset();

        // TODO: recognise a jump-to-self halt loop and interrupt on it
        // directly instead of counting down the whole guard allowance.
        let mut stalls = 0_usize;
        loop {
            match self.step()? {
                Flow::Interrupt => return Ok(Flow::Interrupt),
                Flow::Jump | Flow::KeyWait => {
                    stalls += 1;
                    if stalls > JUMP_GUARD {
                        self.cpu.trap = true;
                    }
                }
                _ => {}
            }
        }
    }

    /// Run a bounded number of cycles.
    pub fn run_steps(&mut self, step_count: usize) -> Vip8Result<Flow> {
        self.cpu.trap = false;
        #[cfg(feature = "throttle")]
        self.clock.reset();

        let mut flow = Flow::Ok;
        for _ in 0..step_count {
            flow = self.step()?;
            if flow == Flow::Interrupt {
                break;
            }
        }
        Ok(flow)
    }

    /// Apply one decoded instruction to the machine state.
    ///
    /// The program counter has already been advanced past the instruction.
    fn exec(&mut self, op: Op) -> Vip8Result<Flow> {
        let mut flow = Flow::Ok;

        match op {
            // Zero the display buffer.
            Op::ClearScreen => {
                self.cpu.clear_display();
                flow = Flow::Draw;
            }
            // Pop the recorded call site and resume at the instruction
            // after it.
            Op::Return => {
                if self.cpu.sp == 0 {
                    return Err(Vip8Error::StackUnderflow {
                        pc: (self.cpu.pc - 2) as Address,
                    });
                }
                self.cpu.sp -= 1;
                self.cpu.pc = self.cpu.stack[self.cpu.sp] as usize + 2;
                flow = Flow::Jump;
            }
            Op::Jump { addr } => {
                self.cpu.pc = addr as usize;
                flow = Flow::Jump;
            }
            // The stack records the call site itself; `Return` adds the
            // instruction width.
            Op::Call { addr } => {
                if self.cpu.sp == STACK_SIZE {
                    return Err(Vip8Error::StackOverflow {
                        pc: (self.cpu.pc - 2) as Address,
                    });
                }
                self.cpu.stack[self.cpu.sp] = (self.cpu.pc - 2) as Address;
                self.cpu.sp += 1;
                self.cpu.pc = addr as usize;
                flow = Flow::Jump;
            }
            // Conditional skips advance an extra instruction when the
            // condition holds.
            Op::SkipEqByte { vx, nn } => {
                if self.cpu.registers[vx as usize] == nn {
                    self.cpu.pc += 2;
                }
            }
            Op::SkipNeByte { vx, nn } => {
                if self.cpu.registers[vx as usize] != nn {
                    self.cpu.pc += 2;
                }
            }
            Op::SkipEq { vx, vy } => {
                if self.cpu.registers[vx as usize] == self.cpu.registers[vy as usize] {
                    self.cpu.pc += 2;
                }
            }
            Op::SkipNe { vx, vy } => {
                if self.cpu.registers[vx as usize] != self.cpu.registers[vy as usize] {
                    self.cpu.pc += 2;
                }
            }
            Op::LoadByte { vx, nn } => {
                self.cpu.registers[vx as usize] = nn;
            }
            // Wrapping add; the carry flag is untouched.
            Op::AddByte { vx, nn } => {
                let x = self.cpu.registers[vx as usize];
                self.cpu.registers[vx as usize] = x.wrapping_add(nn);
            }
            Op::Load { vx, vy } => {
                self.cpu.registers[vx as usize] = self.cpu.registers[vy as usize];
            }
            Op::Or { vx, vy } => {
                self.cpu.registers[vx as usize] |= self.cpu.registers[vy as usize];
            }
            Op::And { vx, vy } => {
                self.cpu.registers[vx as usize] &= self.cpu.registers[vy as usize];
            }
            Op::Xor { vx, vy } => {
                self.cpu.registers[vx as usize] ^= self.cpu.registers[vy as usize];
            }
            // The flag register is written after the result, so the flag
            // wins when VF is the destination.
            Op::Add { vx, vy } => {
                let (x, y) = (
                    self.cpu.registers[vx as usize],
                    self.cpu.registers[vy as usize],
                );
                let (result, carry) = x.overflowing_add(y);
                self.cpu.registers[vx as usize] = result;
                self.cpu.registers[0xF] = carry as u8;
            }
            // VF is 0 when the subtraction borrows, 1 when it doesn't.
            Op::Sub { vx, vy } => {
                let (x, y) = (
                    self.cpu.registers[vx as usize],
                    self.cpu.registers[vy as usize],
                );
                self.cpu.registers[vx as usize] = x.wrapping_sub(y);
                self.cpu.registers[0xF] = (x >= y) as u8;
            }
            // Shifts apply to the named register; VF receives the
            // shifted-out bit.
            Op::ShiftRight { vx } => {
                let x = self.cpu.registers[vx as usize];
                self.cpu.registers[vx as usize] = x >> 1;
                self.cpu.registers[0xF] = x & 1;
            }
            Op::SubReverse { vx, vy } => {
                let (x, y) = (
                    self.cpu.registers[vx as usize],
                    self.cpu.registers[vy as usize],
                );
                self.cpu.registers[vx as usize] = y.wrapping_sub(x);
                self.cpu.registers[0xF] = (y >= x) as u8;
            }
            Op::ShiftLeft { vx } => {
                let x = self.cpu.registers[vx as usize];
                self.cpu.registers[vx as usize] = x << 1;
                self.cpu.registers[0xF] = (x >> 7) & 1;
            }
            Op::LoadAddress { addr } => {
                self.cpu.index = addr;
            }
            Op::JumpOffset { addr } => {
                self.cpu.pc = self.cpu.registers[0] as usize + addr as usize;
                flow = Flow::Jump;
            }
            Op::Random { vx, nn } => {
                let mut rng = thread_rng();
                self.cpu.registers[vx as usize] = nn & rng.gen::<u8>();
            }
            // XOR an n-row sprite read from the index register into the
            // display buffer. Each sprite byte is one row, MSB leftmost.
            // Coordinates wrap around the display edges.
            Op::Draw { vx, vy, n } => {
                let x = self.cpu.registers[vx as usize] as usize;
                let y = self.cpu.registers[vy as usize] as usize;
                let base = self.cpu.index as usize;
                let mut erased = false;

                for r in 0..n as usize {
                    let row = self.cpu.ram[(base + r) & (MEM_SIZE - 1)];
                    for c in 0..8 {
                        let px = ((x + c) & DISPLAY_WIDTH_MASK)
                            + ((y + r) & DISPLAY_HEIGHT_MASK) * DISPLAY_WIDTH;
                        let old = self.cpu.display[px];
                        let new = (row >> (7 - c)) & 1 != 0;
                        // Collision is decided on the pre-blit pixel.
                        erased |= old && new;
                        self.cpu.display[px] = old ^ new;
                    }
                }

                self.cpu.registers[0xF] = erased as u8;
                self.cpu.display_dirty = true;
                flow = Flow::Draw;
            }
            Op::SkipKey { vx } => {
                if self.cpu.key_state(self.cpu.registers[vx as usize] & 0xF) {
                    self.cpu.pc += 2;
                }
            }
            Op::SkipNoKey { vx } => {
                if !self.cpu.key_state(self.cpu.registers[vx as usize] & 0xF) {
                    self.cpu.pc += 2;
                }
            }
            Op::LoadDelay { vx } => {
                self.cpu.registers[vx as usize] = self.cpu.delay_timer;
            }
            // Stall until a key is pressed: rewind so the instruction
            // re-executes next cycle. Timers keep counting down while the
            // machine waits.
            Op::WaitKey { vx } => {
                if let Some(key) = self.cpu.first_key() {
                    self.cpu.registers[vx as usize] = key;
                    self.cpu.key_wait = false;
                } else {
                    self.cpu.pc -= 2;
                    self.cpu.key_wait = true;
                    flow = Flow::KeyWait;
                }
            }
            Op::SetDelay { vx } => {
                self.cpu.delay_timer = self.cpu.registers[vx as usize];
            }
            Op::SetSound { vx } => {
                self.cpu.sound_timer = self.cpu.registers[vx as usize];
                self.cpu.buzzer_state = self.cpu.sound_timer > 0;
                flow = Flow::Sound;
            }
            Op::AddAddress { vx } => {
                let x = self.cpu.registers[vx as usize] as u16;
                self.cpu.index = self.cpu.index.wrapping_add(x);
            }
            // Point the index register at the builtin glyph for the low
            // nibble of the register value.
            Op::LoadGlyph { vx } => {
                let digit = self.cpu.registers[vx as usize] & 0xF;
                self.cpu.index = (FONT_START + digit as usize * FONT_GLYPH_SIZE) as Address;
            }
            // Store the decimal digits of the register value in the three
            // memory cells at the index register.
            Op::StoreBcd { vx } => {
                let addr = self.cpu.index as usize;
                let x = self.cpu.registers[vx as usize];
                self.cpu.ram[addr & (MEM_SIZE - 1)] = x / 100;
                self.cpu.ram[(addr + 1) & (MEM_SIZE - 1)] = x / 10 % 10;
                self.cpu.ram[(addr + 2) & (MEM_SIZE - 1)] = x % 10;
            }
            // Register transfers walk the index register past the
            // transferred block.
            Op::StoreRegisters { vx } => {
                let addr = self.cpu.index as usize;
                for v in 0..=vx as usize {
                    self.cpu.ram[(addr + v) & (MEM_SIZE - 1)] = self.cpu.registers[v];
                }
                self.cpu.index = self.cpu.index.wrapping_add(vx as u16 + 1);
            }
            Op::LoadRegisters { vx } => {
                let addr = self.cpu.index as usize;
                for v in 0..=vx as usize {
                    self.cpu.registers[v] = self.cpu.ram[(addr + v) & (MEM_SIZE - 1)];
                }
                self.cpu.index = self.cpu.index.wrapping_add(vx as u16 + 1);
            }
        }

        Ok(flow)
    }
}

/// Troubleshooting
impl Vip8Vm {
    /// Returns the program memory contents as human readable hex words.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        let end = (MEM_START + count).min(MEM_SIZE - 1);
        let mut buf = String::new();

        for addr in (MEM_START..end).step_by(2) {
            writeln!(
                buf,
                "{:04X}: {:02X}{:02X}",
                addr,
                self.cpu.ram[addr],
                self.cpu.ram[addr + 1]
            )?;
        }

        Ok(buf)
    }

    /// Returns the display buffer rendered as text rows.
    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if self.cpu.display[x + y * DISPLAY_WIDTH] {
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
fn op_trace(op: &Op, cpu: &Vip8Cpu) {
    log::trace!("{:04X}: {}", cpu.pc, op);
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: &Op, _: &Vip8Cpu) {}
