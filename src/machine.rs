use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::num::Wrapping;

use crate::cpu::op::cycles;
use crate::cpu::{Instruction, Op, Parameter, ParameterSet, RepeatMode, CPU, R};
use crate::hex::hex_bytes;
use crate::interrupt;
use crate::io::IoBus;
use crate::memory::{MemoryAddress, MemoryError, MMU};

#[cfg(test)]
#[path = "./machine_test.rs"]
mod machine_test;

/// where flat binaries are loaded and started: CS=0000, IP=7C00,
/// the classical boot-sector convention
pub const LOAD_SEGMENT: u16 = 0x0000;
pub const LOAD_OFFSET: u16 = 0x7C00;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MachineState {
    Running,
    Halted,
    Faulted,
}

/// errors that terminate a run and fault the machine
#[derive(Debug, PartialEq)]
pub enum RuntimeError {
    UnknownOpcode { addr: u32, bytes: Vec<u8> },
    DivideByZero { addr: u32 },
    DivideOverflow { addr: u32 },
    StepLimit { max: usize },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuntimeError::UnknownOpcode { addr, bytes } => {
                write!(f, "executor: unknown opcode {} at {:06X}", hex_bytes(bytes), addr)
            }
            RuntimeError::DivideByZero { addr } => {
                write!(f, "executor: divide by zero at {:06X}", addr)
            }
            RuntimeError::DivideOverflow { addr } => {
                write!(f, "executor: divide result out of range at {:06X}", addr)
            }
            RuntimeError::StepLimit { max } => {
                write!(f, "executor: exceeded the limit of {} instructions", max)
            }
        }
    }
}

enum AluKind {
    Add,
    Adc,
    Sub,
    Sbb,
    And,
    Or,
    Xor,
    Cmp,
}

pub struct Machine {
    pub cpu: CPU,
    pub mmu: MMU,
    pub io: IoBus,
    pub state: MachineState,

    /// base address where the binary was loaded
    pub rom_base: MemoryAddress,
    /// length of the loaded binary in bytes
    pub rom_length: usize,

    /// everything the guest wrote to the console; mirrored to the
    /// host stdout unless the machine is deterministic
    pub console_output: Vec<u8>,

    /// pending keystrokes for the keyboard services
    keys: VecDeque<u8>,
}

impl Machine {
    pub fn default() -> Self {
        Machine {
            cpu: CPU::default(),
            mmu: MMU::default(),
            io: IoBus::default_handlers(),
            state: MachineState::Running,
            rom_base: MemoryAddress::new(LOAD_SEGMENT, LOAD_OFFSET),
            rom_length: 0,
            console_output: Vec::new(),
            keys: VecDeque::new(),
        }
    }

    /// a machine that never blocks on host input and does not mirror
    /// console output; used by tests
    pub fn deterministic() -> Self {
        let mut m = Self::default();
        m.cpu.deterministic = true;
        m
    }

    /// load a flat binary at the boot address and point CS:IP at it
    pub fn load_rom(&mut self, data: &[u8]) -> Result<(), MemoryError> {
        self.cpu.set_r16(R::CS, LOAD_SEGMENT);
        self.cpu.regs.ip = LOAD_OFFSET;
        self.rom_base = MemoryAddress::new(LOAD_SEGMENT, LOAD_OFFSET);
        self.rom_length = data.len();
        self.mmu.write(LOAD_SEGMENT, LOAD_OFFSET, data)
    }

    /// clear the halted latch and zero registers, flags and memory
    pub fn hard_reset(&mut self) {
        let deterministic = self.cpu.deterministic;
        self.cpu = if deterministic { CPU::deterministic() } else { CPU::default() };
        self.mmu.memory.clear();
        self.state = MachineState::Running;
        self.keys.clear();
    }

    /// queue a keystroke for the keyboard services
    pub fn inject_key(&mut self, code: u8) {
        self.keys.push_back(code);
    }

    pub fn pop_key(&mut self) -> Option<u8> {
        self.keys.pop_front()
    }

    pub fn peek_key(&self) -> Option<u8> {
        self.keys.front().copied()
    }

    /// byte written by the guest to the console
    pub fn write_console(&mut self, b: u8) {
        self.console_output.push(b);
        if !self.cpu.deterministic {
            print!("{}", b as char);
            let _ = io::stdout().flush();
        }
    }

    pub fn console_string(&self) -> String {
        self.console_output.iter().map(|b| *b as char).collect()
    }

    /// run until HLT, a fault, or `max_instructions` executed
    pub fn run(&mut self, max_instructions: usize) -> Result<(), RuntimeError> {
        while self.state == MachineState::Running {
            if self.cpu.instruction_count >= max_instructions {
                self.state = MachineState::Faulted;
                return Err(RuntimeError::StepLimit { max: max_instructions });
            }
            self.execute_instruction()?;
        }
        Ok(())
    }

    /// fetch, decode and execute one instruction at CS:IP
    pub fn execute_instruction(&mut self) -> Result<(), RuntimeError> {
        let cs = self.cpu.get_r16(R::CS);
        let ip = self.cpu.regs.ip;
        let op = self.cpu.decoder.get_instruction(&self.mmu, cs, ip);

        match op.command {
            Op::Uninitialized | Op::Invalid(_, _) => {
                self.state = MachineState::Faulted;
                Err(RuntimeError::UnknownOpcode {
                    addr: MemoryAddress::new(cs, ip).value(),
                    bytes: self.mmu.read(cs, ip, op.length.max(1) as usize),
                })
            }
            _ => {
                let cycle_cost = match self.execute(&op) {
                    Ok(n) => n,
                    Err(e) => {
                        self.state = MachineState::Faulted;
                        return Err(e);
                    }
                };
                self.cpu.instruction_count += 1;
                self.cpu.cycle_count += cycle_cost;
                if self.cpu.halted {
                    self.state = MachineState::Halted;
                }
                Ok(())
            }
        }
    }

    /// executes a decoded instruction, returning the cycles consumed
    fn execute(&mut self, op: &Instruction) -> Result<usize, RuntimeError> {
        let fault_addr = self.cpu.get_memory_address().value();
        self.cpu.regs.ip = (Wrapping(self.cpu.regs.ip) + Wrapping(u16::from(op.length))).0;

        let cycle_cost = match op.command {
            Op::Add8 => self.alu(AluKind::Add, false, &op.params),
            Op::Add16 => self.alu(AluKind::Add, true, &op.params),
            Op::Adc8 => self.alu(AluKind::Adc, false, &op.params),
            Op::Adc16 => self.alu(AluKind::Adc, true, &op.params),
            Op::Sub8 => self.alu(AluKind::Sub, false, &op.params),
            Op::Sub16 => self.alu(AluKind::Sub, true, &op.params),
            Op::Sbb8 => self.alu(AluKind::Sbb, false, &op.params),
            Op::Sbb16 => self.alu(AluKind::Sbb, true, &op.params),
            Op::And8 => self.alu(AluKind::And, false, &op.params),
            Op::And16 => self.alu(AluKind::And, true, &op.params),
            Op::Or8 => self.alu(AluKind::Or, false, &op.params),
            Op::Or16 => self.alu(AluKind::Or, true, &op.params),
            Op::Xor8 => self.alu(AluKind::Xor, false, &op.params),
            Op::Xor16 => self.alu(AluKind::Xor, true, &op.params),
            Op::Cmp8 => self.alu(AluKind::Cmp, false, &op.params),
            Op::Cmp16 => self.alu(AluKind::Cmp, true, &op.params),

            Op::Inc8 => self.incdec(true, false, &op.params),
            Op::Inc16 => self.incdec(true, true, &op.params),
            Op::Dec8 => self.incdec(false, false, &op.params),
            Op::Dec16 => self.incdec(false, true, &op.params),

            Op::Not8 | Op::Not16 => {
                // NOT modifies no flags
                let lv = self.cpu.resolve(&op.params.dst);
                let mask = if op.command == Op::Not16 { 0xFFFF } else { 0xFF };
                let val = self.cpu.read_lvalue(&self.mmu, lv);
                self.cpu.write_lvalue(&mut self.mmu, lv, !val & mask);
                if op.params.dst.is_ptr() {
                    cycles::NOTNEG_MEM
                } else {
                    cycles::NOTNEG_REG
                }
            }
            Op::Neg8 => self.neg(false, &op.params),
            Op::Neg16 => self.neg(true, &op.params),
            Op::Test8 => self.test(false, &op.params),
            Op::Test16 => self.test(true, &op.params),

            Op::Mul8 => {
                let src = self.cpu.value_of(&self.mmu, &op.params.dst) & 0xFF;
                let ax = u16::from(self.cpu.get_r8(R::AL)) * src;
                self.cpu.set_r16(R::AX, ax);
                let upper = ax >> 8;
                self.cpu.regs.flags.carry = upper != 0;
                self.cpu.regs.flags.overflow = upper != 0;
                self.cpu.regs.flags.zero = ax == 0;
                self.cpu.regs.flags.set_sign_u8(upper as usize);
                self.cpu.regs.flags.set_parity(ax as usize);
                cycles::MUL8
            }
            Op::Mul16 => {
                let src = u32::from(self.cpu.value_of(&self.mmu, &op.params.dst));
                let product = u32::from(self.cpu.get_r16(R::AX)) * src;
                self.cpu.set_r16(R::AX, product as u16);
                self.cpu.set_r16(R::DX, (product >> 16) as u16);
                let upper = (product >> 16) as u16;
                self.cpu.regs.flags.carry = upper != 0;
                self.cpu.regs.flags.overflow = upper != 0;
                self.cpu.regs.flags.zero = product == 0;
                self.cpu.regs.flags.set_sign_u16(upper as usize);
                self.cpu.regs.flags.set_parity(product as usize);
                cycles::MUL16
            }
            Op::Imul8 => {
                let src = self.cpu.value_of(&self.mmu, &op.params.dst) as u8 as i8;
                let ax = (i16::from(self.cpu.get_r8(R::AL) as i8) * i16::from(src)) as u16;
                self.cpu.set_r16(R::AX, ax);
                // CF and OF clear when AH is a pure sign extension of AL
                let fits = (ax & 0xFF80) == 0xFF80 || (ax & 0xFF80) == 0x0000;
                self.cpu.regs.flags.carry = !fits;
                self.cpu.regs.flags.overflow = !fits;
                self.cpu.regs.flags.zero = ax == 0;
                self.cpu.regs.flags.set_sign_u8((ax >> 8) as usize);
                self.cpu.regs.flags.set_parity(ax as usize);
                cycles::IMUL8
            }
            Op::Imul16 => {
                let src = self.cpu.value_of(&self.mmu, &op.params.dst) as i16;
                let product =
                    (i32::from(self.cpu.get_r16(R::AX) as i16) * i32::from(src)) as u32;
                self.cpu.set_r16(R::AX, product as u16);
                self.cpu.set_r16(R::DX, (product >> 16) as u16);
                let ax = product as u16;
                let dx = (product >> 16) as u16;
                let sign_ext = if ax & 0x8000 != 0 { 0xFFFF } else { 0x0000 };
                let fits = dx == sign_ext;
                self.cpu.regs.flags.carry = !fits;
                self.cpu.regs.flags.overflow = !fits;
                self.cpu.regs.flags.zero = product == 0;
                self.cpu.regs.flags.set_sign_u16(dx as usize);
                self.cpu.regs.flags.set_parity(ax as usize);
                cycles::IMUL16
            }
            Op::Div8 => {
                // AL = AX / src, AH = remainder
                let src = self.cpu.value_of(&self.mmu, &op.params.dst) & 0xFF;
                if src == 0 {
                    return Err(RuntimeError::DivideByZero { addr: fault_addr });
                }
                let ax = self.cpu.get_r16(R::AX);
                let quotient = ax / src;
                if quotient > 0xFF {
                    return Err(RuntimeError::DivideOverflow { addr: fault_addr });
                }
                self.cpu.set_r8(R::AL, quotient as u8);
                self.cpu.set_r8(R::AH, (ax % src) as u8);
                cycles::DIV8
            }
            Op::Div16 => {
                // AX = DX:AX / src, DX = remainder
                let src = u32::from(self.cpu.value_of(&self.mmu, &op.params.dst));
                if src == 0 {
                    return Err(RuntimeError::DivideByZero { addr: fault_addr });
                }
                let num =
                    u32::from(self.cpu.get_r16(R::DX)) << 16 | u32::from(self.cpu.get_r16(R::AX));
                let quotient = num / src;
                if quotient > 0xFFFF {
                    return Err(RuntimeError::DivideOverflow { addr: fault_addr });
                }
                self.cpu.set_r16(R::AX, quotient as u16);
                self.cpu.set_r16(R::DX, (num % src) as u16);
                cycles::DIV16
            }
            Op::Idiv8 => {
                // widened so -32768 / -1 reaches the range check
                let src = i32::from(self.cpu.value_of(&self.mmu, &op.params.dst) as u8 as i8);
                if src == 0 {
                    return Err(RuntimeError::DivideByZero { addr: fault_addr });
                }
                let ax = i32::from(self.cpu.get_r16(R::AX) as i16);
                let quotient = ax / src;
                if quotient < -128 || quotient > 127 {
                    return Err(RuntimeError::DivideOverflow { addr: fault_addr });
                }
                self.cpu.set_r8(R::AL, quotient as u8);
                self.cpu.set_r8(R::AH, (ax % src) as u8);
                cycles::IDIV8
            }
            Op::Idiv16 => {
                let src = i64::from(self.cpu.value_of(&self.mmu, &op.params.dst) as i16);
                if src == 0 {
                    return Err(RuntimeError::DivideByZero { addr: fault_addr });
                }
                let num = i64::from(
                    (u32::from(self.cpu.get_r16(R::DX)) << 16
                        | u32::from(self.cpu.get_r16(R::AX))) as i32,
                );
                let quotient = num / src;
                if quotient < -32768 || quotient > 32767 {
                    return Err(RuntimeError::DivideOverflow { addr: fault_addr });
                }
                self.cpu.set_r16(R::AX, quotient as u16);
                self.cpu.set_r16(R::DX, (num % src) as u16);
                cycles::IDIV16
            }

            Op::Mov8 | Op::Mov16 => {
                let data = self.cpu.value_of(&self.mmu, &op.params.src);
                let lv = self.cpu.resolve(&op.params.dst);
                self.cpu.write_lvalue(&mut self.mmu, lv, data);
                if op.params.dst.is_ptr() || op.params.src.is_ptr() {
                    if op.params.src.is_imm() {
                        cycles::MOV_MEM_IMM
                    } else {
                        cycles::MOV_MEM
                    }
                } else if op.params.src.is_imm() {
                    cycles::MOV_REG_IMM
                } else {
                    cycles::MOV_REG_REG
                }
            }

            Op::Shl8 | Op::Shr8 | Op::Sar8 | Op::Rol8 | Op::Ror8 | Op::Rcl8 | Op::Rcr8 => {
                self.shift(&op.command, false, &op.params)
            }
            Op::Shl16 | Op::Shr16 | Op::Sar16 | Op::Rol16 | Op::Ror16 | Op::Rcl16 | Op::Rcr16 => {
                self.shift(&op.command, true, &op.params)
            }

            Op::Push16 => {
                let data = self.cpu.value_of(&self.mmu, &op.params.dst);
                self.cpu.push16(&mut self.mmu, data);
                cycles::PUSH
            }
            Op::Pop16 => {
                let data = self.cpu.pop16(&mut self.mmu);
                let lv = self.cpu.resolve(&op.params.dst);
                self.cpu.write_lvalue(&mut self.mmu, lv, data);
                cycles::POP
            }

            Op::JmpShort => {
                self.cpu.regs.ip = self.cpu.value_of(&self.mmu, &op.params.dst);
                cycles::JMP_SHORT
            }
            Op::JmpNear => {
                self.cpu.regs.ip = self.cpu.value_of(&self.mmu, &op.params.dst);
                cycles::JMP_NEAR
            }
            Op::Jz | Op::Jnz | Op::Jg | Op::Jge | Op::Jl | Op::Jle => {
                let f = &self.cpu.regs.flags;
                let taken = match op.command {
                    Op::Jz => f.zero,
                    Op::Jnz => !f.zero,
                    Op::Jg => !f.zero && f.sign == f.overflow,
                    Op::Jge => f.sign == f.overflow,
                    Op::Jl => f.sign != f.overflow,
                    _ => f.zero || f.sign != f.overflow,
                };
                if taken {
                    self.cpu.regs.ip = self.cpu.value_of(&self.mmu, &op.params.dst);
                    cycles::JCC_TAKEN
                } else {
                    cycles::JCC_NOT_TAKEN
                }
            }
            Op::CallNear => {
                let target = self.cpu.value_of(&self.mmu, &op.params.dst);
                let ret = self.cpu.regs.ip;
                self.cpu.push16(&mut self.mmu, ret);
                self.cpu.regs.ip = target;
                cycles::CALL_NEAR
            }
            Op::Retn => {
                self.cpu.regs.ip = self.cpu.pop16(&mut self.mmu);
                cycles::RET_NEAR
            }
            Op::Iret => {
                // pops IP, CS and the flags word in that order
                let ip = self.cpu.pop16(&mut self.mmu);
                let cs = self.cpu.pop16(&mut self.mmu);
                let flags = self.cpu.pop16(&mut self.mmu);
                self.cpu.regs.ip = ip;
                self.cpu.set_r16(R::CS, cs);
                self.cpu.regs.flags.set_u16(flags);
                cycles::IRET
            }

            Op::Movsb | Op::Movsw | Op::Cmpsb | Op::Cmpsw | Op::Stosb | Op::Stosw | Op::Lodsb
            | Op::Lodsw | Op::Scasb | Op::Scasw => self.string_op(op),

            Op::Clc => {
                self.cpu.regs.flags.carry = false;
                cycles::FLAG_SET
            }
            Op::Stc => {
                self.cpu.regs.flags.carry = true;
                cycles::FLAG_SET
            }
            Op::Cmc => {
                self.cpu.regs.flags.carry = !self.cpu.regs.flags.carry;
                cycles::FLAG_SET
            }
            Op::Cld => {
                self.cpu.regs.flags.direction = false;
                cycles::FLAG_SET
            }
            Op::Std => {
                self.cpu.regs.flags.direction = true;
                cycles::FLAG_SET
            }
            Op::Cli => {
                self.cpu.regs.flags.interrupt = false;
                cycles::FLAG_SET
            }
            Op::Sti => {
                self.cpu.regs.flags.interrupt = true;
                cycles::FLAG_SET
            }

            Op::In8 => {
                let port = self.cpu.value_of(&self.mmu, &op.params.src);
                let val = self.io.in_u8(port);
                self.cpu.set_r8(R::AL, val);
                self.io_cycles(&op.params.src)
            }
            Op::In16 => {
                let port = self.cpu.value_of(&self.mmu, &op.params.src);
                let val = self.io.in_u16(port);
                self.cpu.set_r16(R::AX, val);
                self.io_cycles(&op.params.src)
            }
            Op::Out8 => {
                let port = self.cpu.value_of(&self.mmu, &op.params.dst);
                let val = self.cpu.get_r8(R::AL);
                self.io.out_u8(port, val);
                self.io_cycles(&op.params.dst)
            }
            Op::Out16 => {
                let port = self.cpu.value_of(&self.mmu, &op.params.dst);
                let val = self.cpu.get_r16(R::AX);
                self.io.out_u16(port, val);
                self.io_cycles(&op.params.dst)
            }

            Op::Int => {
                let n = self.cpu.value_of(&self.mmu, &op.params.dst) as u8;
                self.interrupt(n);
                cycles::INT
            }
            Op::Hlt => {
                self.cpu.halted = true;
                cycles::HLT
            }
            _ => {
                return Err(RuntimeError::UnknownOpcode {
                    addr: fault_addr,
                    bytes: vec![],
                })
            }
        };
        Ok(cycle_cost)
    }

    /// dispatch a software interrupt: the emulated services execute
    /// directly against the host, everything else goes through the
    /// interrupt vector table
    fn interrupt(&mut self, n: u8) {
        match n {
            0x10 => interrupt::int10::handle(self),
            0x16 => interrupt::int16::handle(self),
            0x21 => interrupt::int21::handle(self),
            _ => self.execute_interrupt(n),
        }
    }

    /// the real interrupt sequence: push FLAGS, CS and IP, clear IF
    /// and TF, then load CS:IP from the vector table at `n * 4`
    pub fn execute_interrupt(&mut self, n: u8) {
        let flags = self.cpu.regs.flags.u16();
        self.cpu.push16(&mut self.mmu, flags);
        self.cpu.regs.flags.interrupt = false;
        self.cpu.regs.flags.trap = false;
        let cs = self.cpu.get_r16(R::CS);
        let ip = self.cpu.regs.ip;
        self.cpu.push16(&mut self.mmu, cs);
        self.cpu.push16(&mut self.mmu, ip);
        let (seg, offset) = self.mmu.read_vec(u16::from(n));
        self.cpu.regs.ip = offset;
        self.cpu.set_r16(R::CS, seg);
    }

    fn alu(&mut self, kind: AluKind, wide: bool, params: &ParameterSet) -> usize {
        let mask: usize = if wide { 0xFFFF } else { 0xFF };
        let lv = self.cpu.resolve(&params.dst);
        let dst = self.cpu.read_lvalue(&self.mmu, lv) as usize;
        let src = self.cpu.value_of(&self.mmu, &params.src) as usize & mask;
        let carry = self.cpu.regs.flags.carry_val();

        let (res, write) = match kind {
            AluKind::Add => {
                let res = dst + src;
                self.add_flags(res, src, dst, wide);
                (res, true)
            }
            AluKind::Adc => {
                let res = dst + src + carry;
                self.add_flags(res, src, dst, wide);
                (res, true)
            }
            AluKind::Sub => {
                let res = dst.wrapping_sub(src);
                self.sub_flags(res, src, dst, wide);
                (res, true)
            }
            AluKind::Sbb => {
                let res = dst.wrapping_sub(src).wrapping_sub(carry);
                self.sub_flags(res, src, dst, wide);
                (res, true)
            }
            AluKind::Cmp => {
                let res = dst.wrapping_sub(src);
                self.sub_flags(res, src, dst, wide);
                (res, false)
            }
            AluKind::And => {
                let res = dst & src;
                self.logic_flags(res, wide);
                (res, true)
            }
            AluKind::Or => {
                let res = dst | src;
                self.logic_flags(res, wide);
                (res, true)
            }
            AluKind::Xor => {
                let res = dst ^ src;
                self.logic_flags(res, wide);
                (res, true)
            }
        };
        if write {
            self.cpu.write_lvalue(&mut self.mmu, lv, (res & mask) as u16);
        }
        alu_cycles(params)
    }

    /// the OF, SF, ZF, AF, CF and PF of an addition
    fn add_flags(&mut self, res: usize, src: usize, dst: usize, wide: bool) {
        let f = &mut self.cpu.regs.flags;
        if wide {
            f.set_carry_u16(res);
            f.set_overflow_add_u16(res, src, dst);
            f.set_sign_u16(res);
            f.set_zero_u16(res);
        } else {
            f.set_carry_u8(res);
            f.set_overflow_add_u8(res, src, dst);
            f.set_sign_u8(res);
            f.set_zero_u8(res);
        }
        f.set_adjust(res, src, dst);
        f.set_parity(res);
    }

    /// the OF, SF, ZF, AF, CF and PF of a subtraction `dst - src`
    fn sub_flags(&mut self, res: usize, src: usize, dst: usize, wide: bool) {
        let f = &mut self.cpu.regs.flags;
        if wide {
            f.set_carry_u16(res);
            f.set_overflow_sub_u16(res, src, dst);
            f.set_sign_u16(res);
            f.set_zero_u16(res);
        } else {
            f.set_carry_u8(res);
            f.set_overflow_sub_u8(res, src, dst);
            f.set_sign_u8(res);
            f.set_zero_u8(res);
        }
        f.set_adjust(res, src, dst);
        f.set_parity(res);
    }

    /// logical ops clear CF, OF and AF and set ZF, SF, PF from the result
    fn logic_flags(&mut self, res: usize, wide: bool) {
        let f = &mut self.cpu.regs.flags;
        f.carry = false;
        f.overflow = false;
        f.adjust = false;
        if wide {
            f.set_sign_u16(res);
            f.set_zero_u16(res);
        } else {
            f.set_sign_u8(res);
            f.set_zero_u8(res);
        }
        f.set_parity(res);
    }

    /// INC and DEC follow the ADD/SUB flag rules with src=1 but
    /// preserve CF
    fn incdec(&mut self, inc: bool, wide: bool, params: &ParameterSet) -> usize {
        let mask: usize = if wide { 0xFFFF } else { 0xFF };
        let lv = self.cpu.resolve(&params.dst);
        let dst = self.cpu.read_lvalue(&self.mmu, lv) as usize;
        let carry = self.cpu.regs.flags.carry;
        let res = if inc { dst + 1 } else { dst.wrapping_sub(1) };
        if inc {
            self.add_flags(res, 1, dst, wide);
        } else {
            self.sub_flags(res, 1, dst, wide);
        }
        self.cpu.regs.flags.carry = carry;
        self.cpu.write_lvalue(&mut self.mmu, lv, (res & mask) as u16);
        if params.dst.is_ptr() {
            cycles::INCDEC_MEM
        } else {
            cycles::INCDEC_REG
        }
    }

    fn neg(&mut self, wide: bool, params: &ParameterSet) -> usize {
        let mask: usize = if wide { 0xFFFF } else { 0xFF };
        let lv = self.cpu.resolve(&params.dst);
        let val = self.cpu.read_lvalue(&self.mmu, lv) as usize;
        let res = 0usize.wrapping_sub(val);
        self.sub_flags(res, val, 0, wide);
        self.cpu.write_lvalue(&mut self.mmu, lv, (res & mask) as u16);
        if params.dst.is_ptr() {
            cycles::NOTNEG_MEM
        } else {
            cycles::NOTNEG_REG
        }
    }

    /// TEST computes AND, sets the logical flags and discards the result
    fn test(&mut self, wide: bool, params: &ParameterSet) -> usize {
        let mask: usize = if wide { 0xFFFF } else { 0xFF };
        let dst = self.cpu.value_of(&self.mmu, &params.dst) as usize;
        let src = self.cpu.value_of(&self.mmu, &params.src) as usize & mask;
        self.logic_flags(dst & src, wide);
        alu_cycles(params)
    }

    fn shift(&mut self, command: &Op, wide: bool, params: &ParameterSet) -> usize {
        let bits: u32 = if wide { 16 } else { 8 };
        let mask: usize = if wide { 0xFFFF } else { 0xFF };
        let top: usize = 1 << (bits - 1);

        let by_cl = params.src == Parameter::Reg8(R::CL);
        let count_raw = match params.src {
            Parameter::Imm8(n) => usize::from(n),
            Parameter::Reg8(R::CL) => usize::from(self.cpu.get_r8(R::CL)),
            _ => 1,
        };
        // the carry participates in RCL/RCR, widening the rotation
        let steps = match command {
            Op::Rol8 | Op::Rol16 | Op::Ror8 | Op::Ror16 => count_raw % bits as usize,
            Op::Rcl8 | Op::Rcl16 | Op::Rcr8 | Op::Rcr16 => count_raw % (bits as usize + 1),
            _ => count_raw,
        };

        let base_cost = match (by_cl, params.dst.is_ptr()) {
            (false, false) => cycles::SHIFT1_REG,
            (false, true) => cycles::SHIFT1_MEM,
            (true, false) => cycles::SHIFT_CL_REG,
            (true, true) => cycles::SHIFT_CL_MEM,
        };
        if count_raw == 0 {
            return base_cost;
        }

        let lv = self.cpu.resolve(&params.dst);
        let original = self.cpu.read_lvalue(&self.mmu, lv) as usize;
        let mut val = original;
        let mut carry = self.cpu.regs.flags.carry;

        for _ in 0..steps {
            match command {
                Op::Shl8 | Op::Shl16 => {
                    carry = val & top != 0;
                    val = (val << 1) & mask;
                }
                Op::Shr8 | Op::Shr16 => {
                    carry = val & 1 != 0;
                    val >>= 1;
                }
                Op::Sar8 | Op::Sar16 => {
                    carry = val & 1 != 0;
                    val = (val >> 1) | (val & top);
                }
                Op::Rol8 | Op::Rol16 => {
                    carry = val & top != 0;
                    val = ((val << 1) | (val >> (bits - 1))) & mask;
                }
                Op::Ror8 | Op::Ror16 => {
                    carry = val & 1 != 0;
                    val = (val >> 1) | ((val & 1) << (bits - 1));
                }
                Op::Rcl8 | Op::Rcl16 => {
                    let new_carry = val & top != 0;
                    val = ((val << 1) | carry as usize) & mask;
                    carry = new_carry;
                }
                Op::Rcr8 | Op::Rcr16 => {
                    let new_carry = val & 1 != 0;
                    val = (val >> 1) | ((carry as usize) << (bits - 1));
                    carry = new_carry;
                }
                _ => unreachable!(),
            }
        }

        let f = &mut self.cpu.regs.flags;
        f.carry = carry;
        // OF is defined only for a count of one
        if count_raw == 1 {
            f.overflow = match command {
                Op::Shr8 | Op::Shr16 => original & top != 0,
                Op::Sar8 | Op::Sar16 => false,
                _ => (original ^ val) & top != 0,
            };
        }
        if wide {
            f.set_sign_u16(val);
            f.set_zero_u16(val);
        } else {
            f.set_sign_u8(val);
            f.set_zero_u8(val);
        }
        f.set_parity(val);

        self.cpu.write_lvalue(&mut self.mmu, lv, val as u16);
        base_cost + steps.saturating_sub(1) * cycles::SHIFT_STEP
    }

    /// executes one string primitive, honoring any REP prefix
    fn string_op(&mut self, op: &Instruction) -> usize {
        let step_cost = match op.command {
            Op::Movsb | Op::Movsw => cycles::STRING_MOVS,
            Op::Cmpsb | Op::Cmpsw => cycles::STRING_CMPS,
            Op::Stosb | Op::Stosw => cycles::STRING_STOS,
            Op::Lodsb | Op::Lodsw => cycles::STRING_LODS,
            _ => cycles::STRING_SCAS,
        };
        match op.repeat {
            RepeatMode::None => {
                self.string_step(&op.command);
                step_cost
            }
            _ => {
                let mut total = cycles::REP_STEP;
                while self.cpu.get_r16(R::CX) > 0 {
                    self.string_step(&op.command);
                    let cx = self.cpu.get_r16(R::CX).wrapping_sub(1);
                    self.cpu.set_r16(R::CX, cx);
                    total += step_cost + cycles::REP_STEP;
                    if op.command.is_string_compare() {
                        let zf = self.cpu.regs.flags.zero;
                        let go_on = match op.repeat {
                            RepeatMode::Repne => !zf,
                            _ => zf,
                        };
                        if !go_on {
                            break;
                        }
                    }
                }
                total
            }
        }
    }

    /// one transfer or compare, then SI/DI stepping per DF
    fn string_step(&mut self, command: &Op) {
        let wide = match command {
            Op::Movsw | Op::Cmpsw | Op::Stosw | Op::Lodsw | Op::Scasw => true,
            _ => false,
        };
        let delta: u16 = if self.cpu.regs.flags.direction {
            (if wide { -2i16 } else { -1i16 }) as u16
        } else if wide {
            2
        } else {
            1
        };
        let ds = self.cpu.get_r16(R::DS);
        let es = self.cpu.get_r16(R::ES);
        let si = self.cpu.get_r16(R::SI);
        let di = self.cpu.get_r16(R::DI);

        match command {
            Op::Movsb => {
                let b = self.mmu.read_u8(ds, si);
                self.mmu.write_u8(es, di, b);
                self.cpu.set_r16(R::SI, si.wrapping_add(delta));
                self.cpu.set_r16(R::DI, di.wrapping_add(delta));
            }
            Op::Movsw => {
                let w = self.mmu.read_u16(ds, si);
                self.mmu.write_u16(es, di, w);
                self.cpu.set_r16(R::SI, si.wrapping_add(delta));
                self.cpu.set_r16(R::DI, di.wrapping_add(delta));
            }
            Op::Cmpsb => {
                let src = usize::from(self.mmu.read_u8(ds, si));
                let dst = usize::from(self.mmu.read_u8(es, di));
                let res = src.wrapping_sub(dst);
                self.sub_flags(res, dst, src, false);
                self.cpu.set_r16(R::SI, si.wrapping_add(delta));
                self.cpu.set_r16(R::DI, di.wrapping_add(delta));
            }
            Op::Cmpsw => {
                let src = usize::from(self.mmu.read_u16(ds, si));
                let dst = usize::from(self.mmu.read_u16(es, di));
                let res = src.wrapping_sub(dst);
                self.sub_flags(res, dst, src, true);
                self.cpu.set_r16(R::SI, si.wrapping_add(delta));
                self.cpu.set_r16(R::DI, di.wrapping_add(delta));
            }
            Op::Stosb => {
                let al = self.cpu.get_r8(R::AL);
                self.mmu.write_u8(es, di, al);
                self.cpu.set_r16(R::DI, di.wrapping_add(delta));
            }
            Op::Stosw => {
                let ax = self.cpu.get_r16(R::AX);
                self.mmu.write_u16(es, di, ax);
                self.cpu.set_r16(R::DI, di.wrapping_add(delta));
            }
            Op::Lodsb => {
                let b = self.mmu.read_u8(ds, si);
                self.cpu.set_r8(R::AL, b);
                self.cpu.set_r16(R::SI, si.wrapping_add(delta));
            }
            Op::Lodsw => {
                let w = self.mmu.read_u16(ds, si);
                self.cpu.set_r16(R::AX, w);
                self.cpu.set_r16(R::SI, si.wrapping_add(delta));
            }
            Op::Scasb => {
                let src = usize::from(self.cpu.get_r8(R::AL));
                let dst = usize::from(self.mmu.read_u8(es, di));
                let res = src.wrapping_sub(dst);
                self.sub_flags(res, dst, src, false);
                self.cpu.set_r16(R::DI, di.wrapping_add(delta));
            }
            Op::Scasw => {
                let src = usize::from(self.cpu.get_r16(R::AX));
                let dst = usize::from(self.mmu.read_u16(es, di));
                let res = src.wrapping_sub(dst);
                self.sub_flags(res, dst, src, true);
                self.cpu.set_r16(R::DI, di.wrapping_add(delta));
            }
            _ => unreachable!(),
        }
    }

    fn io_cycles(&self, port: &Parameter) -> usize {
        if port.is_imm() {
            cycles::IO_IMM
        } else {
            cycles::IO_DX
        }
    }
}

fn alu_cycles(params: &ParameterSet) -> usize {
    if params.dst.is_ptr() {
        if params.src.is_imm() {
            cycles::ALU_MEM_IMM
        } else {
            cycles::ALU_MEM_REG
        }
    } else if params.src.is_ptr() {
        cycles::ALU_REG_MEM
    } else if params.src.is_imm() {
        cycles::ALU_REG_IMM
    } else {
        cycles::ALU_REG_REG
    }
}
