use crate::{
    errors::CpuError,
    globals::{PC_ADDR, PRIMITIVE_COUNT, RP_ADDR, SP_ADDR},
    memory::Memory,
    utils::flag,
};

/// The 32 primitive operations, numbered by their opcode word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Op {
    Nop = 0x00,
    Lit,
    Drop,
    Dup,
    Swap,
    Over,
    Rot,
    ToR,
    FromR,
    LoadByte,
    LoadWord,
    StoreByte,
    StoreWord,
    Jump,
    JumpZero,
    JumpNonZero,
    Add = 0x10,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Eq,
    Lt,
    Le,
    Call,
    Ret,
}
impl Op {
    pub const ALL: [Op; PRIMITIVE_COUNT as usize] = [
        Op::Nop, Op::Lit, Op::Drop, Op::Dup, Op::Swap, Op::Over, Op::Rot, Op::ToR,
        Op::FromR, Op::LoadByte, Op::LoadWord, Op::StoreByte, Op::StoreWord, Op::Jump,
        Op::JumpZero, Op::JumpNonZero, Op::Add, Op::Sub, Op::Mul, Op::Div, Op::Mod,
        Op::And, Op::Or, Op::Xor, Op::Not, Op::Shl, Op::Shr, Op::Eq, Op::Lt, Op::Le,
        Op::Call, Op::Ret,
    ];
    pub fn from_code(code: u16) -> Option<Op> {
        Op::ALL.get(code as usize).copied()
    }
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// A fetched word is either a primitive or the address of a subroutine to call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    Primitive(Op),
    Call(u16),
}
impl Instruction {
    pub fn decode(word: u16) -> Instruction {
        match Op::from_code(word) {
            Some(op) => Instruction::Primitive(op),
            None => Instruction::Call(word),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    pub pc: u16,
    pub sp: u16,
    pub rp: u16,
}
impl Registers {
    pub fn load(memory: &Memory) -> Self {
        Registers {
            pc: memory.read_word(PC_ADDR),
            sp: memory.read_word(SP_ADDR),
            rp: memory.read_word(RP_ADDR),
        }
    }
    pub fn store(&self, memory: &mut Memory) {
        memory.write_word(PC_ADDR, self.pc);
        memory.write_word(SP_ADDR, self.sp);
        memory.write_word(RP_ADDR, self.rp);
    }
}

/// Both stacks live in guest memory and grow down. The top value sits at
/// `pointer + 2`, so a push writes first and a pop moves first.
fn push_at(memory: &mut Memory, pointer: &mut u16, val: u16) {
    memory.write_word(*pointer, val);
    *pointer = pointer.wrapping_sub(2);
}
fn pop_at(memory: &Memory, pointer: &mut u16) -> u16 {
    *pointer = pointer.wrapping_add(2);
    memory.read_word(*pointer)
}

#[derive(Default)]
pub struct Cpu {
    regs: Registers,
}
impl Cpu {
    pub fn new() -> Self {
        Cpu {
            regs: Registers::default(),
        }
    }
    /// Runs one batch: pulls the registers out of memory, executes `cycles`
    /// steps and writes the registers back, even when a step faults.
    pub fn run(&mut self, memory: &mut Memory, cycles: usize) -> Result<(), CpuError> {
        self.regs = Registers::load(memory);
        let mut result = Ok(());
        for _ in 0..cycles {
            if let Err(e) = self.step(memory) {
                result = Err(e);
                break;
            }
        }
        self.regs.store(memory);
        result
    }
    pub fn registers(&self) -> Registers {
        self.regs
    }
    pub fn set_registers(&mut self, regs: Registers) {
        self.regs = regs;
    }
    /// Executes a single instruction against the live registers. On a fault
    /// the registers are rolled back so `pc` points at the faulting opcode.
    pub fn step(&mut self, memory: &mut Memory) -> Result<(), CpuError> {
        let saved = self.regs;
        let word = self.next_word(memory);
        let result = match Instruction::decode(word) {
            Instruction::Primitive(op) => self.execute(memory, op),
            Instruction::Call(addr) => {
                self.push_return(memory, self.regs.pc);
                self.regs.pc = addr;
                Ok(())
            }
        };
        if result.is_err() {
            self.regs = saved;
        }
        result
    }
    fn execute(&mut self, memory: &mut Memory, op: Op) -> Result<(), CpuError> {
        match op {
            Op::Nop => (),
            Op::Lit => {
                let val = self.next_word(memory);
                self.push(memory, val);
            },
            Op::Drop => {
                self.pop(memory);
            },
            Op::Dup => {
                let a = self.pop(memory);
                self.push(memory, a);
                self.push(memory, a);
            },
            Op::Swap => {
                let b = self.pop(memory);
                let a = self.pop(memory);
                self.push(memory, b);
                self.push(memory, a);
            },
            Op::Over => {
                let b = self.pop(memory);
                let a = self.pop(memory);
                self.push(memory, a);
                self.push(memory, b);
                self.push(memory, a);
            },
            Op::Rot => {
                let c = self.pop(memory);
                let b = self.pop(memory);
                let a = self.pop(memory);
                self.push(memory, b);
                self.push(memory, c);
                self.push(memory, a);
            },
            Op::ToR => {
                let a = self.pop(memory);
                self.push_return(memory, a);
            },
            Op::FromR => {
                let a = self.pop_return(memory);
                self.push(memory, a);
            },
            Op::LoadByte => {
                let addr = self.pop(memory);
                let val = memory.read_byte(addr) as u16;
                self.push(memory, val);
            },
            Op::LoadWord => {
                let addr = self.pop(memory);
                let val = memory.read_word(addr);
                self.push(memory, val);
            },
            Op::StoreByte => {
                let addr = self.pop(memory);
                let val = self.pop(memory);
                memory.write_byte(addr, (val & 0xFF) as u8);
            },
            Op::StoreWord => {
                let addr = self.pop(memory);
                let val = self.pop(memory);
                memory.write_word(addr, val);
            },
            Op::Jump => self.regs.pc = self.pop(memory),
            Op::JumpZero => {
                let addr = self.pop(memory);
                if self.pop(memory) == 0 {
                    self.regs.pc = addr;
                }
            },
            Op::JumpNonZero => {
                let addr = self.pop(memory);
                if self.pop(memory) != 0 {
                    self.regs.pc = addr;
                }
            },
            Op::Add => self.binary(memory, |a, b| a.wrapping_add(b)),
            Op::Sub => self.binary(memory, |a, b| a.wrapping_sub(b)),
            Op::Mul => self.binary(memory, |a, b| a.wrapping_mul(b)),
            Op::Div | Op::Mod => {
                let b = self.pop(memory);
                let a = self.pop(memory);
                if b == 0 {
                    // pc has already moved past the opcode
                    let pc = self.regs.pc.wrapping_sub(2);
                    return Err(CpuError::DivisionByZero { op, pc });
                }
                let val = if op == Op::Div { a / b } else { a % b };
                self.push(memory, val);
            },
            Op::And => self.binary(memory, |a, b| a & b),
            Op::Or => self.binary(memory, |a, b| a | b),
            Op::Xor => self.binary(memory, |a, b| a ^ b),
            Op::Not => {
                let a = self.pop(memory);
                self.push(memory, !a);
            },
            Op::Shl => self.binary(memory, |a, b| a.checked_shl(b as u32).unwrap_or(0)),
            Op::Shr => self.binary(memory, |a, b| a.checked_shr(b as u32).unwrap_or(0)),
            Op::Eq => self.binary(memory, |a, b| flag(a == b)),
            Op::Lt => self.binary(memory, |a, b| flag(a < b)),
            Op::Le => self.binary(memory, |a, b| flag(a <= b)),
            Op::Call => {
                self.push_return(memory, self.regs.pc);
                self.regs.pc = self.pop(memory);
            },
            Op::Ret => self.regs.pc = self.pop_return(memory),
        };
        Ok(())
    }
    /// pops b, then a, pushes f(a, b)
    fn binary(&mut self, memory: &mut Memory, f: impl Fn(u16, u16) -> u16) {
        let b = self.pop(memory);
        let a = self.pop(memory);
        self.push(memory, f(a, b));
    }
    fn next_word(&mut self, memory: &Memory) -> u16 {
        let word = memory.read_word(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(2);
        word
    }
    fn push(&mut self, memory: &mut Memory, val: u16) {
        push_at(memory, &mut self.regs.sp, val);
    }
    fn pop(&mut self, memory: &Memory) -> u16 {
        pop_at(memory, &mut self.regs.sp)
    }
    fn push_return(&mut self, memory: &mut Memory, val: u16) {
        push_at(memory, &mut self.regs.rp, val);
    }
    fn pop_return(&mut self, memory: &Memory) -> u16 {
        pop_at(memory, &mut self.regs.rp)
    }
}

/// Runs one batch with a throwaway interpreter; all state lives in `memory`.
pub fn run(memory: &mut Memory, cycles: usize) -> Result<(), CpuError> {
    Cpu::new().run(memory, cycles)
}
