//! Assembler for FX16 source files.
//!
//! Source is a stream of whitespace separated tokens. Mnemonics emit their
//! opcode word, numbers emit a literal push and any other bare word is a
//! reference to a label, which the CPU treats as a call. The output is always
//! a complete 64K memory image.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fx16_core::{globals::PRIMITIVE_COUNT, Memory, Op};
use thiserror::Error;
use tracing::{debug, trace, warn};

#[rustfmt::skip]
const MNEMONICS: [(&str, Op); 31] = [
    ("nop", Op::Nop),
    ("drop", Op::Drop), ("dup", Op::Dup), ("swap", Op::Swap), ("over", Op::Over), ("rot", Op::Rot),
    // return stack transfers
    ("push", Op::ToR), ("pop", Op::FromR),
    ("ldb", Op::LoadByte), ("ldw", Op::LoadWord), ("stb", Op::StoreByte), ("stw", Op::StoreWord),
    ("jmp", Op::Jump), ("jz", Op::JumpZero), ("jnz", Op::JumpNonZero),
    ("add", Op::Add), ("sub", Op::Sub), ("mul", Op::Mul), ("div", Op::Div), ("mod", Op::Mod),
    ("and", Op::And), ("or", Op::Or), ("xor", Op::Xor), ("not", Op::Not),
    ("shl", Op::Shl), ("shr", Op::Shr),
    ("eq", Op::Eq), ("lt", Op::Lt), ("le", Op::Le),
    ("call", Op::Call), ("ret", Op::Ret),
];

pub fn lookup_mnemonic(name: &str) -> Option<Op> {
    let name = name.to_lowercase();
    MNEMONICS.iter().find(|(m, _)| *m == name).map(|(_, op)| *op)
}

/// Parses `0x10`, `$10`, `10h` as hex and anything else as decimal.
/// Negative and oversized values wrap to 16 bits.
pub fn parse_number(token: &str) -> Option<u16> {
    let parsed = if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(hex) = token.strip_prefix('$') {
        i64::from_str_radix(hex, 16)
    } else if let Some(hex) = token.strip_suffix('h') {
        i64::from_str_radix(hex, 16)
    } else {
        token.parse::<i64>()
    };
    parsed.ok().map(|n| (n & 0xFFFF) as u16)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
}
impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Error)]
pub enum AsmError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{location}: invalid number '{token}'")]
    InvalidNumber { location: Location, token: String },
    #[error("{location}: undefined reference: '{label}'")]
    UndefinedLabel { location: Location, label: String },
    #[error("{} is already being assembled", .path.display())]
    IncludeCycle { path: PathBuf },
}

struct Reference {
    label: String,
    position: u16,
    location: Location,
    // bare word, executed as a call rather than pushed
    call: bool,
}

pub struct Assembler {
    labels: HashMap<String, u16>,
    references: Vec<Reference>,
    memory: Memory,
    pc: u16,
    includes: Vec<PathBuf>,
}
impl Assembler {
    pub fn new() -> Self {
        Assembler {
            labels: HashMap::new(),
            references: Vec::new(),
            memory: Memory::new(),
            pc: 0,
            includes: Vec::new(),
        }
    }
    pub fn labels(&self) -> &HashMap<String, u16> {
        &self.labels
    }
    /// Current location counter.
    pub fn pc(&self) -> u16 {
        self.pc
    }
    pub fn assemble_file(&mut self, path: impl AsRef<Path>) -> Result<(), AsmError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| AsmError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.includes.contains(&key) {
            return Err(AsmError::IncludeCycle {
                path: path.to_path_buf(),
            });
        }
        debug!("assembling {} at {:#06x}", path.display(), self.pc);
        self.includes.push(key);
        let result = self.assemble_str(&path.display().to_string(), &source);
        self.includes.pop();
        result
    }
    /// Assembles in-memory source; `name` only shows up in error messages.
    /// Includes are still read from disk.
    pub fn assemble_str(&mut self, name: &str, source: &str) -> Result<(), AsmError> {
        for (i, line) in source.lines().enumerate() {
            let location = Location {
                file: name.to_string(),
                line: i + 1,
            };
            self.parse_line(&location, line)?;
        }
        Ok(())
    }
    /// Resolves every label reference and hands back the finished image.
    pub fn finalize(mut self) -> Result<Memory, AsmError> {
        for reference in self.references.drain(..) {
            let target = match self.labels.get(&reference.label) {
                Some(target) => *target,
                None => {
                    return Err(AsmError::UndefinedLabel {
                        location: reference.location,
                        label: reference.label,
                    })
                }
            };
            if reference.call && target < PRIMITIVE_COUNT {
                warn!(
                    "{}: '{}' is at {:#06x}, which runs as a primitive, not a call",
                    reference.location, reference.label, target
                );
            }
            self.memory.write_word(reference.position, target);
        }
        Ok(self.memory)
    }
    fn parse_line(&mut self, location: &Location, line: &str) -> Result<(), AsmError> {
        for token in line.split_whitespace() {
            if token.starts_with(';') {
                return Ok(());
            } else if let Some(label) = token.strip_suffix(':') {
                trace!("{label} = {:#06x}", self.pc);
                self.labels.insert(label.to_string(), self.pc);
            } else if let Some(label) = token.strip_prefix('@') {
                self.out16(Op::Lit.code());
                self.reference(label, location, false);
            } else if let Some(num) = token.strip_prefix('.') {
                let val = Self::number(num, location)?;
                self.out8((val & 0xFF) as u8);
            } else if let Some(num) = token.strip_prefix(',') {
                let val = Self::number(num, location)?;
                self.out16(val);
            } else if let Some(num) = token.strip_prefix('>') {
                self.pc = Self::number(num, location)?;
            } else if let Some(path) = token.strip_prefix('#') {
                self.assemble_file(path)?;
            } else {
                self.command(token, location);
            }
        }
        Ok(())
    }
    fn command(&mut self, token: &str, location: &Location) {
        if let Some(op) = lookup_mnemonic(token) {
            self.out16(op.code());
        } else if let Some(val) = parse_number(token) {
            self.out16(Op::Lit.code());
            self.out16(val);
        } else {
            self.reference(token, location, true);
        }
    }
    fn number(token: &str, location: &Location) -> Result<u16, AsmError> {
        parse_number(token).ok_or_else(|| AsmError::InvalidNumber {
            location: location.clone(),
            token: token.to_string(),
        })
    }
    fn reference(&mut self, label: &str, location: &Location, call: bool) {
        self.references.push(Reference {
            label: label.to_string(),
            position: self.pc,
            location: location.clone(),
            call,
        });
        self.out16(0x0000);
    }
    fn out8(&mut self, val: u8) {
        self.memory.write_byte(self.pc, val);
        self.pc = self.pc.wrapping_add(1);
    }
    fn out16(&mut self, val: u16) {
        self.memory.write_word(self.pc, val);
        self.pc = self.pc.wrapping_add(2);
    }
}
impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience for a single in-memory source.
pub fn assemble(source: &str) -> Result<Memory, AsmError> {
    let mut asm = Assembler::new();
    asm.assemble_str("<input>", source)?;
    asm.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx16_core::{globals::FRAME_BUFFER_ADDR, run, Instruction, Registers};
    use std::io::Write;

    #[test]
    fn numbers() {
        assert!(parse_number("0x1F") == Some(0x1F));
        assert!(parse_number("0X1f") == Some(0x1F));
        assert!(parse_number("$400") == Some(0x400));
        assert!(parse_number("400h") == Some(0x400));
        assert!(parse_number("1234") == Some(1234));
        assert!(parse_number("-1") == Some(0xFFFF));
        assert!(parse_number("65537") == Some(1));
        assert!(parse_number("loop") == None);
        assert!(parse_number("0x") == None);
    }
    #[test]
    fn mnemonics_are_case_insensitive() {
        assert!(lookup_mnemonic("ADD") == Some(Op::Add));
        assert!(lookup_mnemonic("push") == Some(Op::ToR));
        assert!(lookup_mnemonic("pop") == Some(Op::FromR));
        assert!(lookup_mnemonic("lit") == None);
    }
    #[test]
    fn every_primitive_but_literal_has_a_mnemonic() {
        for op in Op::ALL {
            let named = MNEMONICS.iter().any(|(_, o)| *o == op);
            assert!(named == (op != Op::Lit), "{op:?}");
        }
    }
    #[test]
    fn emits_words() {
        let memory = assemble("nop dup 5 ret").unwrap();
        let words: Vec<u16> = (0..5).map(|i| memory.read_word(2 * i)).collect();
        assert!(words == vec![0x00, 0x03, 0x01, 0x05, 0x1F]);
    }
    #[test]
    fn comments_end_the_line() {
        let memory = assemble("dup ; swap\nover").unwrap();
        assert!(memory.read_word(0) == Op::Dup.code());
        assert!(memory.read_word(2) == Op::Over.code());
    }
    #[test]
    fn origin_bytes_and_words() {
        let memory = assemble(">0x0100 .255 .0x10 ,0xBEEF .-1").unwrap();
        assert!(memory.read_byte(0x0100) == 255);
        assert!(memory.read_byte(0x0101) == 0x10);
        assert!(memory.read_word(0x0102) == 0xBEEF);
        assert!(memory.read_byte(0x0104) == 0xFF);
    }
    #[test]
    fn labels_resolve_forward_and_back() {
        let source = "
            >0x0040
            start: sub1 @start jmp
            sub1: ret
        ";
        let mut asm = Assembler::new();
        asm.assemble_str("test", source).unwrap();
        assert!(asm.labels()["start"] == 0x0040);
        assert!(asm.labels()["sub1"] == 0x0048);
        let memory = asm.finalize().unwrap();
        assert!(memory.read_word(0x0040) == 0x0048);
        assert!(memory.read_word(0x0042) == Op::Lit.code());
        assert!(memory.read_word(0x0044) == 0x0040);
        assert!(memory.read_word(0x0046) == Op::Jump.code());
        assert!(memory.read_word(0x0048) == Op::Ret.code());
    }
    #[test]
    fn later_label_wins() {
        let memory = assemble("a: nop a: nop >0x20 ,0 @a").unwrap();
        assert!(memory.read_word(0x24) == 2);
    }
    #[test]
    fn undefined_label() {
        let err = assemble("\n  nowhere").unwrap_err();
        match err {
            AsmError::UndefinedLabel { location, label } => {
                assert!(label == "nowhere");
                assert!(location.line == 2);
            }
            e => panic!("unexpected {e}"),
        }
    }
    #[test]
    fn invalid_number() {
        assert!(matches!(assemble(",zz"), Err(AsmError::InvalidNumber { .. })));
        assert!(matches!(assemble(">"), Err(AsmError::InvalidNumber { .. })));
    }
    #[test]
    fn location_counter_wraps() {
        let memory = assemble(">0xFFFF ,0x1234").unwrap();
        assert!(memory.read_byte(0xFFFF) == 0x12);
        assert!(memory.read_byte(0x0000) == 0x34);
    }
    #[test]
    fn image_is_full_size() {
        let memory = assemble("").unwrap();
        assert!(memory.as_bytes().len() == 0x10000);
    }
    #[test]
    fn includes_files() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.asm");
        let mut f = fs::File::create(&lib).unwrap();
        writeln!(f, "double: dup add ret").unwrap();
        let main = format!(">0x0040 #{} 4 double", lib.display());
        let mut asm = Assembler::new();
        asm.assemble_str("main", &main).unwrap();
        assert!(asm.labels()["double"] == 0x0040);
        let memory = asm.finalize().unwrap();
        assert!(memory.read_word(0x0046) == Op::Lit.code());
        assert!(memory.read_word(0x004A) == 0x0040);
    }
    #[test]
    fn include_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("self.asm");
        fs::write(&path, format!("nop #{}", path.display())).unwrap();
        let mut asm = Assembler::new();
        assert!(matches!(
            asm.assemble_file(&path),
            Err(AsmError::IncludeCycle { .. })
        ));
    }
    #[test]
    fn missing_include() {
        assert!(matches!(
            assemble("#/definitely/not/here.asm"),
            Err(AsmError::Io { .. })
        ));
    }
    #[test]
    fn assembled_program_runs() {
        let source = "
            >0x0000 ,0x0008 ,0xFFFE ,0xFFFC
            >0x0008
            start: 5 3 add 0x0400 stw
            halt: @halt jmp
        ";
        let mut memory = assemble(source).unwrap();
        // five instructions, then whole trips around the halt loop
        run(&mut memory, 15).unwrap();
        assert!(memory.read_word(FRAME_BUFFER_ADDR) == 8);
        assert!(Registers::load(&memory).sp == 0xFFFE);
    }
    #[test]
    fn subroutine_call_by_name() {
        let source = "
            >0x0000 ,0x0008 ,0xFFFE ,0xF000
            >0x0008
            start: 21 double 0x3000 stw
            halt: @halt jmp
            >0x0040
            double: dup add ret
        ";
        let mut memory = assemble(source).unwrap();
        assert!(memory.read_word(0x000C) == 0x0040);
        assert!(Instruction::decode(0x0040) == Instruction::Call(0x0040));
        // seven instructions, then whole trips around the halt loop
        run(&mut memory, 31).unwrap();
        assert!(memory.read_word(0x3000) == 42);
        let regs = Registers::load(&memory);
        assert!(regs.rp == 0xF000);
        assert!(regs.sp == 0xFFFE);
    }
    #[test]
    fn call_below_primitive_range_runs_as_primitive() {
        // the label assembles fine, but its address is an opcode
        let memory = assemble(">0x0010 low: ret >0x0040 low").unwrap();
        let word = memory.read_word(0x0040);
        assert!(word == 0x0010);
        assert!(matches!(Instruction::decode(word), Instruction::Primitive(_)));
        // the same label pushed as a literal is just a number
        let memory = assemble(">0x0010 low: ret >0x0040 @low").unwrap();
        assert!(memory.read_word(0x0042) == 0x0010);
    }
    #[test]
    fn location_counter_tracks_output() {
        let mut asm = Assembler::new();
        assert!(asm.pc() == 0);
        asm.assemble_str("test", ">0x0100 nop .1").unwrap();
        assert!(asm.pc() == 0x0103);
        asm.assemble_str("test", "5 @here here:").unwrap();
        assert!(asm.pc() == 0x010B);
        assert!(asm.labels()["here"] == 0x010B);
    }
    #[test]
    fn gradient_demo() {
        let mut memory = assemble(include_str!("../../../demos/gradient.asm")).unwrap();
        // palette setup plus at least one full pass over the frame buffer
        run(&mut memory, 1_000_000).unwrap();
        let palette = fx16_core::video::palette(&memory);
        assert!(palette[1] == fx16_core::video::Rgb { r: 1, g: 0, b: 254 });
        assert!(fx16_core::video::pixel(&memory, 3, 2) == 5);
        assert!(fx16_core::video::pixel(&memory, 127, 127) == 254);
    }
}
