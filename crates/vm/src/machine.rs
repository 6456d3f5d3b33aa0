//! The SINVM execution engine: a fetch/decode/execute loop over the
//! instruction set defined in `sin-core`.
//!
//! Registers are A, B, X, Y, SP, PC, and STATUS. The data stack grows
//! downward from the top of the stack region; SP names the low byte of the
//! next free word, so a push writes at SP and then steps down one word,
//! and a pull steps up one word and reads there. The call stack is a
//! separate downward-growing region used by JSR/RTS.
//!
//! STATUS layout (bit 7 to bit 0): N V _ H _ F Z C.

use std::io::Write as _;

use tracing::trace;

use sin_core::float16::{pack_32, unpack_16};
use sin_core::memmap::{
    CALL_STACK, CALL_STACK_BOTTOM, MEMORY_SIZE, PRG_BOTTOM, STACK, STACK_BOTTOM,
    STRING_BUFFER_START,
};
use sin_core::opcode::*;
use sin_core::{addressing, syscall, FlatBinary};

use crate::error::{VmError, VmErrorKind};
use crate::heap::Heap;

pub const FLAG_N: u8 = 0b1000_0000;
pub const FLAG_V: u8 = 0b0100_0000;
pub const FLAG_H: u8 = 0b0001_0000;
pub const FLAG_F: u8 = 0b0000_0100;
pub const FLAG_Z: u8 = 0b0000_0010;
pub const FLAG_C: u8 = 0b0000_0001;

/// Default instruction budget; a program still running after this many
/// steps is assumed to have hung.
const DEFAULT_MAX_STEPS: u64 = 50_000_000;

pub struct Vm {
    memory: Vec<u8>,
    pub a: u16,
    pub b: u16,
    pub x: u16,
    pub y: u16,
    pub sp: u16,
    pub pc: u16,
    pub status: u8,
    call_sp: u16,
    halted: bool,
    exit_code: u16,
    heap: Heap,
    /// Bytes written by the output syscalls.
    output: Vec<u8>,
    /// Bytes consumed by the read syscall.
    input: Vec<u8>,
    max_steps: u64,
}

impl Vm {
    /// Load a flat binary at the program base.
    pub fn new(binary: &FlatBinary) -> Result<Self, VmError> {
        if binary.wordsize != 16 {
            return Err(VmError::new(
                VmErrorKind::IllegalInstruction,
                format!("this VM only executes 16-bit binaries, not {}-bit", binary.wordsize),
                0,
            ));
        }
        let mut memory = vec![0u8; MEMORY_SIZE];
        let base = PRG_BOTTOM as usize;
        if base + binary.bytes.len() > MEMORY_SIZE {
            return Err(VmError::new(
                VmErrorKind::Segmentation,
                "program image does not fit in memory",
                0,
            ));
        }
        memory[base..base + binary.bytes.len()].copy_from_slice(&binary.bytes);

        Ok(Vm {
            memory,
            a: 0,
            b: 0,
            x: 0,
            y: 0,
            sp: STACK - 1,
            pc: PRG_BOTTOM,
            status: 0,
            call_sp: CALL_STACK - 1,
            halted: false,
            exit_code: 0,
            heap: Heap::new(),
            output: Vec::new(),
            input: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
        })
    }

    /// Provide bytes for the read syscall.
    pub fn set_input(&mut self, input: impl Into<Vec<u8>>) {
        self.input = input.into();
    }

    pub fn set_max_steps(&mut self, steps: u64) {
        self.max_steps = steps;
    }

    /// Everything the program printed.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn exit_code(&self) -> u16 {
        self.exit_code
    }

    /// Read a big-endian word from memory.
    pub fn read_word(&self, address: u16) -> Result<u16, VmError> {
        let i = address as usize;
        if i + 1 >= MEMORY_SIZE {
            return Err(VmError::new(
                VmErrorKind::Segmentation,
                format!("word read past end of memory at ${:04x}", address),
                self.pc,
            ));
        }
        Ok(u16::from_be_bytes([self.memory[i], self.memory[i + 1]]))
    }

    pub fn write_word(&mut self, address: u16, value: u16) -> Result<(), VmError> {
        let i = address as usize;
        if i + 1 >= MEMORY_SIZE {
            return Err(VmError::new(
                VmErrorKind::Segmentation,
                format!("word write past end of memory at ${:04x}", address),
                self.pc,
            ));
        }
        let bytes = value.to_be_bytes();
        self.memory[i] = bytes[0];
        self.memory[i + 1] = bytes[1];
        Ok(())
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    /// Run until HALT, exit, or an error.
    pub fn run(&mut self) -> Result<(), VmError> {
        let mut steps = 0u64;
        while !self.halted {
            self.step()?;
            steps += 1;
            if steps > self.max_steps {
                return Err(VmError::new(
                    VmErrorKind::IllegalInstruction,
                    "instruction budget exhausted; program appears to hang",
                    self.pc,
                ));
            }
        }
        Ok(())
    }

    fn fetch_byte(&mut self) -> u8 {
        let byte = self.memory[self.pc as usize];
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch_word(&mut self) -> Result<u16, VmError> {
        let value = self.read_word(self.pc)?;
        self.pc = self.pc.wrapping_add(2);
        Ok(value)
    }

    /// Execute one instruction.
    pub fn step(&mut self) -> Result<(), VmError> {
        let instruction_pc = self.pc;
        let opcode = self.fetch_byte();
        trace!(pc = instruction_pc, opcode = format_args!("{:02x}", opcode), "step");

        // standalone instructions carry no mode byte
        if is_standalone(opcode) {
            return self.execute_standalone(opcode, instruction_pc);
        }

        let mode = self.fetch_byte();
        if !addressing::is_valid(mode) {
            return Err(VmError::new(
                VmErrorKind::IllegalInstruction,
                format!("invalid addressing mode ${:02x}", mode),
                instruction_pc,
            ));
        }
        let operand = if addressing::is_register(mode) {
            0
        } else {
            self.fetch_word()?
        };

        match opcode {
            LOADA => self.a = self.load(mode, operand, instruction_pc)?,
            LOADB => self.b = self.load(mode, operand, instruction_pc)?,
            LOADX => self.x = self.load(mode, operand, instruction_pc)?,
            LOADY => self.y = self.load(mode, operand, instruction_pc)?,
            STOREA => self.store(mode, operand, self.a, instruction_pc)?,
            STOREB => self.store(mode, operand, self.b, instruction_pc)?,
            STOREX => self.store(mode, operand, self.x, instruction_pc)?,
            STOREY => self.store(mode, operand, self.y, instruction_pc)?,

            ADDCA => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.a = self.add_with_carry(self.a, value);
            }
            ADDCB => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.b = self.add_with_carry(self.b, value);
            }
            SUBCA => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.a = self.subtract_with_carry(self.a, value);
            }
            SUBCB => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.b = self.subtract_with_carry(self.b, value);
            }
            MULTA => {
                let value = self.load(mode, operand, instruction_pc)?;
                let product = (self.a as i16 as i32) * (value as i16 as i32);
                self.a = product as u16;
                self.b = (product >> 16) as u16;
                self.set_zn(self.a);
            }
            MULTUA => {
                let value = self.load(mode, operand, instruction_pc)?;
                let product = (self.a as u32) * (value as u32);
                self.a = product as u16;
                self.b = (product >> 16) as u16;
                self.set_zn(self.a);
            }
            DIVA => {
                let value = self.load(mode, operand, instruction_pc)?;
                if value == 0 {
                    return Err(VmError::new(
                        VmErrorKind::FloatingPoint,
                        "division by zero",
                        instruction_pc,
                    ));
                }
                let quotient = (self.a as i16) / (value as i16);
                let remainder = (self.a as i16) % (value as i16);
                self.a = quotient as u16;
                self.b = remainder as u16;
                self.set_zn(self.a);
            }
            DIVUA => {
                let value = self.load(mode, operand, instruction_pc)?;
                if value == 0 {
                    return Err(VmError::new(
                        VmErrorKind::FloatingPoint,
                        "division by zero",
                        instruction_pc,
                    ));
                }
                self.b = self.a % value;
                self.a /= value;
                self.set_zn(self.a);
            }
            ANDA => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.a &= value;
                self.set_zn(self.a);
            }
            ORA => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.a |= value;
                self.set_zn(self.a);
            }
            XORA => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.a ^= value;
                self.set_zn(self.a);
            }
            CMPA => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.compare(self.a, value);
            }
            CMPB => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.compare(self.b, value);
            }
            CMPX => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.compare(self.x, value);
            }
            CMPY => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.compare(self.y, value);
            }

            LSL | LSR | ROR => self.bitshift(opcode, mode, operand, instruction_pc)?,
            INCM => {
                let address = self.effective_address(mode, operand, instruction_pc)?;
                let value = self.read_word(address)?.wrapping_add(1);
                self.write_word(address, value)?;
                self.set_zn(value);
            }
            DECM => {
                let address = self.effective_address(mode, operand, instruction_pc)?;
                let value = self.read_word(address)?.wrapping_sub(1);
                self.write_word(address, value)?;
                self.set_zn(value);
            }

            FADDA | FSUBA | FMULTA | FDIVA => {
                let value = self.load(mode, operand, instruction_pc)?;
                self.a = self.float_op(opcode, self.a, value, instruction_pc)?;
            }
            FINC | FDEC => {
                let one = pack_32(1.0f32.to_bits());
                let target = if mode == addressing::REG_B { self.b } else { self.a };
                let result = if opcode == FINC {
                    self.float_op(FADDA, target, one, instruction_pc)?
                } else {
                    self.float_op(FSUBA, target, one, instruction_pc)?
                };
                if mode == addressing::REG_B {
                    self.b = result;
                } else {
                    self.a = result;
                }
            }

            JMP => self.pc = self.branch_target(mode, operand, instruction_pc)?,
            BRNE => self.branch_if(self.status & FLAG_Z == 0, mode, operand, instruction_pc)?,
            BREQ | BRZ => {
                self.branch_if(self.status & FLAG_Z != 0, mode, operand, instruction_pc)?
            }
            BRGT => {
                let greater = self.status & FLAG_Z == 0 && self.status & FLAG_N == 0;
                self.branch_if(greater, mode, operand, instruction_pc)?;
            }
            BRLT => self.branch_if(self.status & FLAG_N != 0, mode, operand, instruction_pc)?,
            BRN => self.branch_if(self.status & FLAG_N != 0, mode, operand, instruction_pc)?,
            BRPL => self.branch_if(self.status & FLAG_N == 0, mode, operand, instruction_pc)?,
            JSR => {
                let target = self.branch_target(mode, operand, instruction_pc)?;
                self.push_call(self.pc, instruction_pc)?;
                self.pc = target;
            }
            IRQ => {
                // interrupts are not wired up; treat as a no-op vector
            }

            SYSCALL => {
                let selector = self.load(mode, operand, instruction_pc)?;
                self.execute_syscall(selector, instruction_pc)?;
            }

            _ => {
                return Err(VmError::new(
                    VmErrorKind::IllegalInstruction,
                    format!("illegal instruction ${:02x}", opcode),
                    instruction_pc,
                ));
            }
        }
        Ok(())
    }

    fn execute_standalone(&mut self, opcode: u8, at: u16) -> Result<(), VmError> {
        match opcode {
            NOOP => {}
            TAB => self.b = self.a,
            TAX => self.x = self.a,
            TAY => self.y = self.a,
            TASP => self.sp = self.a,
            TASTATUS => self.status = self.a as u8,
            INCA => self.a = self.a.wrapping_add(1),
            DECA => self.a = self.a.wrapping_sub(1),
            TBA => self.a = self.b,
            TBX => self.x = self.b,
            TBY => self.y = self.b,
            TBSP => self.sp = self.b,
            TBSTATUS => self.status = self.b as u8,
            INCB => self.b = self.b.wrapping_add(1),
            DECB => self.b = self.b.wrapping_sub(1),
            TXA => self.a = self.x,
            TXB => self.b = self.x,
            TXY => self.y = self.x,
            TXSP => self.sp = self.x,
            INCX => self.x = self.x.wrapping_add(1),
            DECX => self.x = self.x.wrapping_sub(1),
            TYA => self.a = self.y,
            TYB => self.b = self.y,
            TYX => self.x = self.y,
            TYSP => self.sp = self.y,
            INCY => self.y = self.y.wrapping_add(1),
            DECY => self.y = self.y.wrapping_sub(1),
            ROL => {
                // standalone rotate: A left through the carry
                let carry_in = (self.status & FLAG_C) as u16;
                if self.a & 0x8000 != 0 {
                    self.status |= FLAG_C;
                } else {
                    self.status &= !FLAG_C;
                }
                self.a = (self.a << 1) | carry_in;
                self.set_zn(self.a);
            }
            PHA => self.push(self.a, at)?,
            PHB => self.push(self.b, at)?,
            PLA => self.a = self.pull(at)?,
            PLB => self.b = self.pull(at)?,
            TSPA => self.a = self.sp,
            TSPB => self.b = self.sp,
            TSPX => self.x = self.sp,
            TSPY => self.y = self.sp,
            INCSP => self.sp = self.sp.wrapping_add(2),
            DECSP => self.sp = self.sp.wrapping_sub(2),
            CLC => self.status &= !FLAG_C,
            SEC => self.status |= FLAG_C,
            CLN => self.status &= !FLAG_N,
            SEN => self.status |= FLAG_N,
            CLF => self.status &= !FLAG_F,
            SEF => self.status |= FLAG_F,
            TSTATUSA => self.a = self.status as u16,
            TSTATUSB => self.b = self.status as u16,
            RTS | RTI => {
                self.pc = self.pull_call(at)?;
            }
            RESET => {
                self.pc = PRG_BOTTOM;
                self.sp = STACK - 1;
                self.call_sp = CALL_STACK - 1;
                self.status = 0;
            }
            HALT => {
                self.status |= FLAG_H;
                self.halted = true;
            }
            _ => {
                return Err(VmError::new(
                    VmErrorKind::IllegalInstruction,
                    format!("illegal instruction ${:02x}", opcode),
                    at,
                ));
            }
        }
        Ok(())
    }

    /// Resolve an addressing mode to a value.
    fn load(&self, mode: u8, operand: u16, at: u16) -> Result<u16, VmError> {
        match mode {
            addressing::IMMEDIATE => Ok(operand),
            addressing::REG_A => Ok(self.a),
            addressing::REG_B => Ok(self.b),
            _ => {
                let address = self.effective_address(mode, operand, at)?;
                self.read_word(address)
            }
        }
    }

    fn store(&mut self, mode: u8, operand: u16, value: u16, at: u16) -> Result<(), VmError> {
        if mode == addressing::IMMEDIATE || addressing::is_register(mode) {
            return Err(VmError::new(
                VmErrorKind::IllegalInstruction,
                "store instructions require a memory operand",
                at,
            ));
        }
        let address = self.effective_address(mode, operand, at)?;
        self.write_word(address, value)
    }

    fn effective_address(&self, mode: u8, operand: u16, at: u16) -> Result<u16, VmError> {
        match mode {
            addressing::ABSOLUTE => Ok(operand),
            addressing::X_INDEX => Ok(operand.wrapping_add(self.x)),
            addressing::Y_INDEX => Ok(operand.wrapping_add(self.y)),
            addressing::INDIRECT_X => {
                let pointer = self.read_word(operand.wrapping_add(self.x))?;
                Ok(pointer)
            }
            addressing::INDIRECT_Y => {
                let pointer = self.read_word(operand)?;
                Ok(pointer.wrapping_add(self.y))
            }
            _ => Err(VmError::new(
                VmErrorKind::IllegalInstruction,
                format!("addressing mode ${:02x} does not name memory", mode),
                at,
            )),
        }
    }

    fn branch_target(&self, mode: u8, operand: u16, at: u16) -> Result<u16, VmError> {
        match mode {
            addressing::ABSOLUTE => Ok(operand),
            addressing::INDIRECT_Y | addressing::INDIRECT_X | addressing::X_INDEX
            | addressing::Y_INDEX => self.effective_address(mode, operand, at),
            _ => Err(VmError::new(
                VmErrorKind::IllegalInstruction,
                "control flow requires an address operand",
                at,
            )),
        }
    }

    fn branch_if(
        &mut self,
        condition: bool,
        mode: u8,
        operand: u16,
        at: u16,
    ) -> Result<(), VmError> {
        if condition {
            self.pc = self.branch_target(mode, operand, at)?;
        }
        Ok(())
    }

    fn add_with_carry(&mut self, register: u16, value: u16) -> u16 {
        let carry_in = (self.status & FLAG_C) as u32;
        let sum = register as u32 + value as u32 + carry_in;
        if sum > 0xFFFF {
            self.status |= FLAG_C;
        } else {
            self.status &= !FLAG_C;
        }
        let result = sum as u16;
        self.set_zn(result);
        result
    }

    fn subtract_with_carry(&mut self, register: u16, value: u16) -> u16 {
        // carry acts as "no borrow": set carry before a plain subtraction
        let borrow = 1 - (self.status & FLAG_C) as i32;
        let difference = register as i32 - value as i32 - borrow;
        if difference >= 0 {
            self.status |= FLAG_C;
        } else {
            self.status &= !FLAG_C;
        }
        let result = difference as u16;
        self.set_zn(result);
        result
    }

    fn compare(&mut self, register: u16, value: u16) {
        let difference = (register as i16).wrapping_sub(value as i16);
        if register == value {
            self.status |= FLAG_Z;
        } else {
            self.status &= !FLAG_Z;
        }
        if difference < 0 {
            self.status |= FLAG_N;
        } else {
            self.status &= !FLAG_N;
        }
        if register >= value {
            self.status |= FLAG_C;
        } else {
            self.status &= !FLAG_C;
        }
    }

    fn bitshift(&mut self, opcode: u8, mode: u8, operand: u16, at: u16) -> Result<(), VmError> {
        let (value, target_address) = if mode == addressing::REG_A {
            (self.a, None)
        } else {
            let address = self.effective_address(mode, operand, at)?;
            (self.read_word(address)?, Some(address))
        };

        let carry_in = (self.status & FLAG_C) as u16;
        let (result, carry_out) = match opcode {
            LSL => (value << 1, value & 0x8000 != 0),
            LSR => (value >> 1, value & 0x0001 != 0),
            ROR => ((value >> 1) | (carry_in << 15), value & 0x0001 != 0),
            _ => unreachable!("bitshift called on a non-shift opcode"),
        };
        if carry_out {
            self.status |= FLAG_C;
        } else {
            self.status &= !FLAG_C;
        }
        self.set_zn(result);
        match target_address {
            Some(address) => self.write_word(address, result)?,
            None => self.a = result,
        }
        Ok(())
    }

    fn float_op(&mut self, opcode: u8, left: u16, right: u16, at: u16) -> Result<u16, VmError> {
        let lhs = f32::from_bits(unpack_16(left));
        let rhs = f32::from_bits(unpack_16(right));
        let result = match opcode {
            FADDA => lhs + rhs,
            FSUBA => lhs - rhs,
            FMULTA => lhs * rhs,
            FDIVA => {
                if rhs == 0.0 {
                    return Err(VmError::new(
                        VmErrorKind::FloatingPoint,
                        "floating-point division by zero",
                        at,
                    ));
                }
                lhs / rhs
            }
            _ => unreachable!("float_op called on a non-FPU opcode"),
        };
        if !result.is_finite() {
            return Err(VmError::new(
                VmErrorKind::FloatingPoint,
                "floating-point overflow",
                at,
            ));
        }
        Ok(pack_32(result.to_bits()))
    }

    fn set_zn(&mut self, value: u16) {
        if value == 0 {
            self.status |= FLAG_Z;
        } else {
            self.status &= !FLAG_Z;
        }
        if value & 0x8000 != 0 {
            self.status |= FLAG_N;
        } else {
            self.status &= !FLAG_N;
        }
    }

    fn push(&mut self, value: u16, at: u16) -> Result<(), VmError> {
        if self.sp < STACK_BOTTOM || self.sp > STACK {
            return Err(VmError::new(
                VmErrorKind::StackFault,
                "data stack overflow",
                at,
            ));
        }
        self.write_word(self.sp, value)?;
        self.sp = self.sp.wrapping_sub(2);
        Ok(())
    }

    fn pull(&mut self, at: u16) -> Result<u16, VmError> {
        let new_sp = self.sp.wrapping_add(2);
        if new_sp > STACK - 1 || new_sp < STACK_BOTTOM {
            return Err(VmError::new(
                VmErrorKind::StackFault,
                "data stack underflow",
                at,
            ));
        }
        self.sp = new_sp;
        self.read_word(self.sp)
    }

    fn push_call(&mut self, value: u16, at: u16) -> Result<(), VmError> {
        if self.call_sp < CALL_STACK_BOTTOM || self.call_sp > CALL_STACK {
            return Err(VmError::new(
                VmErrorKind::StackFault,
                "call stack overflow",
                at,
            ));
        }
        self.write_word(self.call_sp, value)?;
        self.call_sp = self.call_sp.wrapping_sub(2);
        Ok(())
    }

    fn pull_call(&mut self, at: u16) -> Result<u16, VmError> {
        let new_sp = self.call_sp.wrapping_add(2);
        if new_sp > CALL_STACK - 1 {
            return Err(VmError::new(
                VmErrorKind::StackFault,
                "return with an empty call stack",
                at,
            ));
        }
        self.call_sp = new_sp;
        self.read_word(self.call_sp)
    }

    fn execute_syscall(&mut self, selector: u16, at: u16) -> Result<(), VmError> {
        match selector {
            syscall::STD_OUT => {
                // A = length, B = address of the bytes
                let start = self.b as usize;
                let end = start + self.a as usize;
                if end > MEMORY_SIZE {
                    return Err(VmError::new(
                        VmErrorKind::Syscall,
                        "output range past end of memory",
                        at,
                    ));
                }
                let bytes = self.memory[start..end].to_vec();
                self.output.extend_from_slice(&bytes);
            }
            syscall::STD_OUT_HEX => {
                let text = format!("${:04x}", self.a);
                self.output.extend_from_slice(text.as_bytes());
            }
            syscall::STD_READ => {
                // consume one line of input into the string buffer:
                // length word first, bytes after; registers follow the
                // string convention
                let newline = self.input.iter().position(|&b| b == b'\n');
                let line: Vec<u8> = match newline {
                    Some(i) => {
                        let line = self.input[..i].to_vec();
                        self.input.drain(..=i);
                        line
                    }
                    None => std::mem::take(&mut self.input),
                };
                self.write_word(STRING_BUFFER_START, line.len() as u16)?;
                for (i, &byte) in line.iter().enumerate() {
                    self.memory[STRING_BUFFER_START as usize + 2 + i] = byte;
                }
                self.a = line.len() as u16;
                self.b = STRING_BUFFER_START + 2;
            }
            syscall::FILE_OPEN_READ | syscall::FILE_OPEN_WRITE | syscall::FILE_CLOSE => {
                return Err(VmError::new(
                    VmErrorKind::Syscall,
                    "file syscalls are not available in this VM build",
                    at,
                ));
            }
            syscall::MEM_ALLOC => {
                // A = byte count; the block address comes back in B
                let address = self.heap.alloc(self.a).ok_or_else(|| {
                    VmError::new(VmErrorKind::Syscall, "heap exhausted", at)
                })?;
                self.b = address;
            }
            syscall::MEM_FREE => {
                if !self.heap.free(self.b) {
                    return Err(VmError::new(
                        VmErrorKind::Syscall,
                        format!("free of ${:04x}, which is not a live allocation", self.b),
                        at,
                    ));
                }
            }
            syscall::MEM_REALLOC => {
                let old = self.b;
                // the old block's extent must be read before realloc
                // drops it; only its own bytes move
                let old_size = self.heap.size_of(old).unwrap_or(0);
                let (address, must_copy) =
                    self.heap.realloc(old, self.a).ok_or_else(|| {
                        VmError::new(
                            VmErrorKind::Syscall,
                            format!("realloc of ${:04x} failed", old),
                            at,
                        )
                    })?;
                if must_copy {
                    self.copy_block(old, address, old_size);
                }
                self.b = address;
            }
            syscall::MEM_REALLOC_SAFE => {
                // like realloc, but an address that is not a live block
                // gets a fresh allocation instead of an error
                if self.heap.is_live(self.b) {
                    let old = self.b;
                    let old_size = self.heap.size_of(old).unwrap_or(0);
                    let (address, must_copy) =
                        self.heap.realloc(old, self.a).ok_or_else(|| {
                            VmError::new(VmErrorKind::Syscall, "heap exhausted", at)
                        })?;
                    if must_copy {
                        self.copy_block(old, address, old_size);
                    }
                    self.b = address;
                } else {
                    let address = self.heap.alloc(self.a).ok_or_else(|| {
                        VmError::new(VmErrorKind::Syscall, "heap exhausted", at)
                    })?;
                    self.b = address;
                }
            }
            syscall::SYS_EXIT => {
                self.exit_code = self.a;
                self.halted = true;
            }
            other => {
                return Err(VmError::new(
                    VmErrorKind::Syscall,
                    format!("unknown syscall ${:02x}", other),
                    at,
                ));
            }
        }
        Ok(())
    }

    /// Move `size` bytes of a relocated heap block. The caller supplies
    /// the old block's size; the new block is at least that large, and
    /// the bytes past the old extent belong to neighboring allocations.
    fn copy_block(&mut self, from: u16, to: u16, size: u16) {
        for i in 0..size as usize {
            let byte = self.memory[from as usize + i];
            self.memory[to as usize + i] = byte;
        }
    }

    /// Print captured output to the real stdout; used by the CLI.
    pub fn flush_output(&mut self) -> std::io::Result<()> {
        let mut stdout = std::io::stdout();
        stdout.write_all(&self.output)?;
        self.output.clear();
        stdout.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sin_core::Wordsize;

    fn vm_with(code: &[u8]) -> Vm {
        let binary = FlatBinary::new(Wordsize::W16, code.to_vec());
        Vm::new(&binary).unwrap()
    }

    #[test]
    fn test_load_immediate_and_halt() {
        // loada #$2A / halt
        let mut vm = vm_with(&[LOADA, addressing::IMMEDIATE, 0x00, 0x2A, HALT]);
        vm.run().unwrap();
        assert_eq!(vm.a, 0x2A);
        assert!(vm.status & FLAG_H != 0);
    }

    #[test]
    fn test_store_and_reload_absolute() {
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x12, 0x34, // loada #$1234
            STOREA, addressing::ABSOLUTE, 0x01, 0x00, // storea $0100
            LOADB, addressing::ABSOLUTE, 0x01, 0x00, // loadb $0100
            HALT,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.b, 0x1234);
        assert_eq!(vm.read_word(0x0100).unwrap(), 0x1234);
    }

    #[test]
    fn test_add_and_subtract_with_carry() {
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x00, 0x0A, // 10
            CLC,
            ADDCA, addressing::IMMEDIATE, 0x00, 0x20, // + 32
            SEC,
            SUBCA, addressing::IMMEDIATE, 0x00, 0x08, // - 8
            HALT,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.a, 34);
    }

    #[test]
    fn test_stack_push_pull() {
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x00, 0x07, PHA, LOADA, addressing::IMMEDIATE,
            0x00, 0x00, PLA, HALT,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.a, 7);
        assert_eq!(vm.sp, STACK - 1);
    }

    #[test]
    fn test_jsr_rts_round_trip() {
        // jsr $2608 / halt ... $2608: loada #$05 / rts
        let mut vm = vm_with(&[
            JSR, addressing::ABSOLUTE, 0x26, 0x08, // 0x2600
            HALT, // 0x2604
            NOOP, NOOP, NOOP, // padding to 0x2608
            LOADA, addressing::IMMEDIATE, 0x00, 0x05, // 0x2608
            RTS,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.a, 5);
    }

    #[test]
    fn test_compare_and_branch() {
        // loada #3; cmpa #0; breq +halt-with-0 else loada #1
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x00, 0x03, // 0x2600
            CMPA, addressing::IMMEDIATE, 0x00, 0x00, // 0x2604
            BREQ, addressing::ABSOLUTE, 0x26, 0x11, // 0x2608 -> 0x2611
            LOADA, addressing::IMMEDIATE, 0x00, 0x01, // 0x260c
            HALT, // 0x2610
            LOADA, addressing::IMMEDIATE, 0x00, 0x02, // 0x2611
            HALT,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.a, 1);
    }

    #[test]
    fn test_signed_compare_sets_n() {
        // -1 < 1: cmpa should set N
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0xFF, 0xFF, // -1
            CMPA, addressing::IMMEDIATE, 0x00, 0x01,
            HALT,
        ]);
        vm.run().unwrap();
        assert!(vm.status & FLAG_N != 0);
        assert!(vm.status & FLAG_Z == 0);
    }

    #[test]
    fn test_multiply_and_divide() {
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x00, 0x07,
            LOADB, addressing::IMMEDIATE, 0x00, 0x06,
            MULTA, addressing::REG_B, // 42
            HALT,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.a, 42);

        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x00, 0x2B, // 43
            LOADB, addressing::IMMEDIATE, 0x00, 0x05,
            DIVUA, addressing::REG_B,
            HALT,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.a, 8);
        assert_eq!(vm.b, 3); // remainder
    }

    #[test]
    fn test_indirect_y_load() {
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x04, 0x00, // pointer value $0400
            STOREA, addressing::ABSOLUTE, 0x00, 0x02, // at $0002
            LOADA, addressing::IMMEDIATE, 0xBE, 0xEF,
            STOREA, addressing::ABSOLUTE, 0x04, 0x00, // data at $0400
            LOADY, addressing::IMMEDIATE, 0x00, 0x00,
            LOADA, addressing::INDIRECT_Y, 0x00, 0x02, // loada ($02), y
            HALT,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.a, 0xBEEF);
    }

    #[test]
    fn test_illegal_opcode_reported() {
        let mut vm = vm_with(&[0x0F, 0x00, 0x00, 0x00]);
        let err = vm.run().unwrap_err();
        assert_eq!(err.kind, VmErrorKind::IllegalInstruction);
    }

    #[test]
    fn test_standalone_rol_rotates_a_through_carry() {
        // sec / rol: bit comes in from the carry, top bit goes out to it
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x80, 0x01,
            SEC,
            ROL,
            HALT,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.a, 0x0003);
        assert!(vm.status & FLAG_C != 0);
    }

    #[test]
    fn test_move_realloc_copies_only_the_old_block() {
        let mut vm = vm_with(&[HALT]);
        vm.run().unwrap();

        // two adjacent blocks; growing the first forces a move
        let first = vm.heap.alloc(4).unwrap();
        let second = vm.heap.alloc(4).unwrap();
        assert_eq!(second, first + 4);
        for i in 0..4u16 {
            vm.memory[(first + i) as usize] = 0xAB;
            vm.memory[(second + i) as usize] = 0xCD;
        }

        vm.b = first;
        vm.a = 8;
        vm.execute_syscall(syscall::MEM_REALLOC, 0).unwrap();
        let moved = vm.b;
        assert_ne!(moved, first);

        // the old block's bytes moved; the neighbor's did not leak into
        // the grown tail
        for i in 0..4u16 {
            assert_eq!(vm.memory[(moved + i) as usize], 0xAB);
        }
        for i in 4..8u16 {
            assert_ne!(vm.memory[(moved + i) as usize], 0xCD);
        }
        assert!(vm.heap.is_live(second));
    }

    #[test]
    fn test_syscall_alloc_and_free() {
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x00, 0x10, // 16 bytes
            SYSCALL, addressing::IMMEDIATE, 0x00, 0x21,
            SYSCALL, addressing::IMMEDIATE, 0x00, 0x20, // free what came back in B
            HALT,
        ]);
        vm.run().unwrap();
        assert!(!vm.heap.is_live(vm.b));
    }

    #[test]
    fn test_double_free_is_a_syscall_error() {
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x00, 0x10,
            SYSCALL, addressing::IMMEDIATE, 0x00, 0x21,
            SYSCALL, addressing::IMMEDIATE, 0x00, 0x20,
            SYSCALL, addressing::IMMEDIATE, 0x00, 0x20,
            HALT,
        ]);
        let err = vm.run().unwrap_err();
        assert_eq!(err.kind, VmErrorKind::Syscall);
    }

    #[test]
    fn test_stdout_syscall_captures_bytes() {
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x48, 0x49, // "HI"
            STOREA, addressing::ABSOLUTE, 0x04, 0x00,
            LOADB, addressing::IMMEDIATE, 0x04, 0x00,
            LOADA, addressing::IMMEDIATE, 0x00, 0x02,
            SYSCALL, addressing::IMMEDIATE, 0x00, 0x14,
            HALT,
        ]);
        vm.run().unwrap();
        assert_eq!(vm.output(), b"HI");
    }

    #[test]
    fn test_exit_syscall() {
        let mut vm = vm_with(&[
            LOADA, addressing::IMMEDIATE, 0x00, 0x07,
            SYSCALL, addressing::IMMEDIATE, 0x00, 0xFF,
            NOOP, // never reached
        ]);
        vm.run().unwrap();
        assert_eq!(vm.exit_code(), 7);
    }

    #[test]
    fn test_runaway_program_hits_step_budget() {
        // jmp to self
        let mut vm = vm_with(&[JMP, addressing::ABSOLUTE, 0x26, 0x00]);
        vm.set_max_steps(1000);
        let err = vm.run().unwrap_err();
        assert!(err.message().contains("budget"));
    }
}
