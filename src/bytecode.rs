// (C) 2020 Brandon Lewis
//
// The in-memory program format.
//
// Every instruction has the same fixed shape: an opcode and up to
// three integer operands, with unused operands left at zero, plus an
// optional debug annotation. This keeps the stream trivially
// serializable and makes illegal operand layouts a runtime check
// rather than a representational impossibility.
//
// String literals do not fit an integer operand, so a Program carries
// a string table next to the code; PUSH refers into it by index. The
// table owns the literals -- the engine only ever clones the
// refcounted payload.

use std::fs::File;
use std::rc::Rc;

use ron::de::from_reader;
use serde::{Deserialize, Serialize};

// Literal variant selectors for PUSH (operand2).
pub const LIT_INT: i64 = 0;
pub const LIT_FLOAT: i64 = 1;
pub const LIT_BOOL: i64 = 2;
pub const LIT_NIL: i64 = 3;
pub const LIT_STR: i64 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Opcode {
    Push,
    Pop,
    Dup,
    Swap,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    LoadVar,
    StoreVar,
    LoadGlobal,
    StoreGlobal,
    LoadArg,
    StoreArg,
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    Call,
    Return,
    ForInit,
    ForCondition,
    ForIncrement,
    ForEnd,
    WhileStart,
    WhileCondition,
    WhileEnd,
    Break,
    Continue,
    SwitchStart,
    Case,
    DefaultCase,
    SwitchEnd,
    TryStart,
    Catch,
    Throw,
    TryEnd,
    ArrayNew,
    ArrayGet,
    ArraySet,
    ArrayLen,
    ArrayPush,
    ArrayPop,
    HashmapNew,
    HashmapGet,
    HashmapSet,
    HashmapHas,
    HashmapDelete,
    StructNew,
    StructGet,
    StructSet,
    FunctionDef,
    ClosureNew,
    ClosureCapture,
    StringConcat,
    StringSubstr,
    StringLen,
    StringCompare,
    Print,
    Input,
    GcCollect,
    WeakRefNew,
    WeakRefGet,
    Halt,
    Nop,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub line: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: i64,
    pub operand2: i64,
    pub operand3: i64,
    pub debug: Option<DebugInfo>,
}

impl Instruction {
    pub fn at_line(mut self, line: u32) -> Instruction {
        self.debug = Some(DebugInfo { line });
        self
    }
}

// Instruction constructors for zero to three operands.

pub fn inst(opcode: Opcode) -> Instruction {
    inst3(opcode, 0, 0, 0)
}

pub fn inst1(opcode: Opcode, operand: i64) -> Instruction {
    inst3(opcode, operand, 0, 0)
}

pub fn inst2(opcode: Opcode, operand: i64, operand2: i64) -> Instruction {
    inst3(opcode, operand, operand2, 0)
}

pub fn inst3(opcode: Opcode, operand: i64, operand2: i64, operand3: i64) -> Instruction {
    Instruction {
        opcode,
        operand,
        operand2,
        operand3,
        debug: None,
    }
}

// Literal shorthands for PUSH.

pub fn push_int(v: i64) -> Instruction {
    inst2(Opcode::Push, v, LIT_INT)
}

// The float payload travels as an integer and is converted on push.
pub fn push_float(v: i64) -> Instruction {
    inst2(Opcode::Push, v, LIT_FLOAT)
}

pub fn push_bool(v: bool) -> Instruction {
    inst2(Opcode::Push, v as i64, LIT_BOOL)
}

pub fn push_nil() -> Instruction {
    inst2(Opcode::Push, 0, LIT_NIL)
}

// An already-built, immutable instruction vector plus the string
// table its PUSH instructions refer into.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub code: Vec<Instruction>,
    pub strings: Vec<Rc<str>>,
}

impl Program {
    pub fn new(code: Vec<Instruction>) -> Program {
        Program {
            code,
            strings: Vec::new(),
        }
    }

    // Intern a string literal, returning its table index.
    pub fn add_string(&mut self, s: &str) -> i64 {
        for (i, existing) in self.strings.iter().enumerate() {
            if &**existing == s {
                return i as i64;
            }
        }
        self.strings.push(Rc::from(s));
        (self.strings.len() - 1) as i64
    }

    // Append a PUSH of a string literal.
    pub fn push_str(&mut self, s: &str) {
        let index = self.add_string(s);
        self.code.push(inst2(Opcode::Push, index, LIT_STR));
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

pub type LoadResult = std::result::Result<Program, String>;

// Load a program from a RON file.
pub fn load(path: String) -> LoadResult {
    let file = File::open(&path).map_err(|e| format!("couldn't open {}: {}", path, e))?;
    from_reader(file).map_err(|e| format!("couldn't parse {}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_constructors_zero_fill() {
        let i = inst(Opcode::Halt);
        assert_eq!((i.operand, i.operand2, i.operand3), (0, 0, 0));
        assert_eq!(i.debug, None);

        let i = inst1(Opcode::Jump, 7);
        assert_eq!((i.operand, i.operand2, i.operand3), (7, 0, 0));

        let i = inst2(Opcode::Call, 2, 11);
        assert_eq!((i.operand, i.operand2, i.operand3), (2, 11, 0));

        let i = inst3(Opcode::FunctionDef, 1, 5, 1);
        assert_eq!((i.operand, i.operand2, i.operand3), (1, 5, 1));

        let i = inst(Opcode::Nop).at_line(42);
        assert_eq!(i.debug, Some(DebugInfo { line: 42 }));
    }

    #[test]
    fn test_push_literals() {
        assert_eq!(push_int(9), inst2(Opcode::Push, 9, LIT_INT));
        assert_eq!(push_float(3), inst2(Opcode::Push, 3, LIT_FLOAT));
        assert_eq!(push_bool(true), inst2(Opcode::Push, 1, LIT_BOOL));
        assert_eq!(push_nil(), inst2(Opcode::Push, 0, LIT_NIL));
    }

    #[test]
    fn test_string_table_interning() {
        let mut p = Program::default();
        p.push_str("foo");
        p.push_str("bar");
        p.push_str("foo");
        assert_eq!(p.strings.len(), 2);
        assert_eq!(p.code[0], inst2(Opcode::Push, 0, LIT_STR));
        assert_eq!(p.code[2], inst2(Opcode::Push, 0, LIT_STR));
    }

    #[test]
    fn test_program_ron_round_trip() {
        let mut p = Program::new(vec![push_int(1), inst(Opcode::Print), inst(Opcode::Halt)]);
        p.push_str("hello");
        let text = ron::ser::to_string(&p).expect("serialize");
        let back: Program = ron::de::from_str(&text).expect("deserialize");
        assert_eq!(back, p);
    }
}
