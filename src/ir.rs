use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::{BaseType, TypeDescriptor};
use crate::error::PatchError;

/// Virtual register, scoped to one [`Program`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Register(pub u32);

/// Index of a basic block inside its [`Program`]. Block 0 is the entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Constant operand. Floating-point values are stored as raw bits so that
/// constants can be compared and hashed during value numbering.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(#[serde(with = "f32_bits")] u32),
    Double(#[serde(with = "f64_bits")] u64),
    String(String),
}

impl Constant {
    pub fn float(value: f32) -> Self {
        Constant::Float(value.to_bits())
    }

    pub fn double(value: f64) -> Self {
        Constant::Double(value.to_bits())
    }

    /// Zero or null value of a type, `None` for `void`.
    pub fn default_for(descriptor: &TypeDescriptor) -> Option<Self> {
        match descriptor {
            TypeDescriptor::Base(BaseType::Void) => None,
            TypeDescriptor::Base(BaseType::Long) => Some(Constant::Long(0)),
            TypeDescriptor::Base(BaseType::Float) => Some(Constant::float(0.0)),
            TypeDescriptor::Base(BaseType::Double) => Some(Constant::double(0.0)),
            TypeDescriptor::Base(_) => Some(Constant::Int(0)),
            TypeDescriptor::Array(_) | TypeDescriptor::Object(_) => Some(Constant::Null),
        }
    }
}

mod f32_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bits: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f32(f32::from_bits(*bits))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        f32::deserialize(deserializer).map(f32::to_bits)
    }
}

mod f64_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bits: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(f64::from_bits(*bits))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        f64::deserialize(deserializer).map(f64::to_bits)
    }
}

/// Symbolic reference to a method.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodRef {
    pub fn new(class: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        MethodRef {
            class: class.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// Symbolic reference to a field.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

/// Call opcode classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}

/// Numeric kind of a binary operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
}

/// Condition over one operand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BranchCondition {
    Zero,
    NonZero,
    Null,
    NotNull,
}

/// Condition over two integer or reference operands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryCondition {
    Equal,
    NotEqual,
    Less,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    ReferenceEqual,
    ReferenceNotEqual,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Instruction {
    Const {
        receiver: Register,
        value: Constant,
    },
    Assign {
        receiver: Register,
        assignee: Register,
    },
    Binary {
        receiver: Register,
        op: BinaryOp,
        kind: NumericKind,
        first: Register,
        second: Register,
    },
    /// Allocates an instance of `class`; the constructor is a separate invoke.
    Construct {
        receiver: Register,
        class: String,
    },
    Invoke {
        receiver: Option<Register>,
        kind: CallKind,
        method: MethodRef,
        instance: Option<Register>,
        arguments: Vec<Register>,
    },
    GetField {
        receiver: Register,
        field: FieldRef,
        instance: Option<Register>,
    },
    PutField {
        field: FieldRef,
        instance: Option<Register>,
        value: Register,
    },
    Jump {
        target: BlockId,
    },
    Branch {
        condition: BranchCondition,
        operand: Register,
        consequent: BlockId,
        alternative: BlockId,
    },
    BinaryBranch {
        condition: BinaryCondition,
        first: Register,
        second: Register,
        consequent: BlockId,
        alternative: BlockId,
    },
    Exit {
        value: Option<Register>,
    },
    Raise {
        exception: Register,
    },
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jump { .. }
                | Instruction::Branch { .. }
                | Instruction::BinaryBranch { .. }
                | Instruction::Exit { .. }
                | Instruction::Raise { .. }
        )
    }

    /// Register written by this instruction.
    pub fn receiver(&self) -> Option<Register> {
        match self {
            Instruction::Const { receiver, .. }
            | Instruction::Assign { receiver, .. }
            | Instruction::Binary { receiver, .. }
            | Instruction::Construct { receiver, .. }
            | Instruction::GetField { receiver, .. } => Some(*receiver),
            Instruction::Invoke { receiver, .. } => *receiver,
            _ => None,
        }
    }

    /// Registers read by this instruction, in operand order.
    pub fn uses(&self) -> Vec<Register> {
        match self {
            Instruction::Const { .. } | Instruction::Construct { .. } | Instruction::Jump { .. } => {
                Vec::new()
            }
            Instruction::Assign { assignee, .. } => vec![*assignee],
            Instruction::Binary { first, second, .. }
            | Instruction::BinaryBranch { first, second, .. } => vec![*first, *second],
            Instruction::Invoke {
                instance, arguments, ..
            } => instance.iter().chain(arguments).copied().collect(),
            Instruction::GetField { instance, .. } => instance.iter().copied().collect(),
            Instruction::PutField {
                instance, value, ..
            } => instance.iter().copied().chain([*value]).collect(),
            Instruction::Branch { operand, .. } => vec![*operand],
            Instruction::Exit { value } => value.iter().copied().collect(),
            Instruction::Raise { exception } => vec![*exception],
        }
    }

    /// Rewrites every register this instruction reads.
    pub fn map_uses(&mut self, mut map: impl FnMut(Register) -> Register) {
        match self {
            Instruction::Const { .. } | Instruction::Construct { .. } | Instruction::Jump { .. } => {}
            Instruction::Assign { assignee, .. } => *assignee = map(*assignee),
            Instruction::Binary { first, second, .. }
            | Instruction::BinaryBranch { first, second, .. } => {
                *first = map(*first);
                *second = map(*second);
            }
            Instruction::Invoke {
                instance, arguments, ..
            } => {
                if let Some(instance) = instance {
                    *instance = map(*instance);
                }
                for argument in arguments {
                    *argument = map(*argument);
                }
            }
            Instruction::GetField { instance, .. } => {
                if let Some(instance) = instance {
                    *instance = map(*instance);
                }
            }
            Instruction::PutField {
                instance, value, ..
            } => {
                if let Some(instance) = instance {
                    *instance = map(*instance);
                }
                *value = map(*value);
            }
            Instruction::Branch { operand, .. } => *operand = map(*operand),
            Instruction::Exit { value } => {
                if let Some(value) = value {
                    *value = map(*value);
                }
            }
            Instruction::Raise { exception } => *exception = map(*exception),
        }
    }

    /// Successor blocks of a terminator; empty for everything else.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Instruction::Jump { target } => vec![*target],
            Instruction::Branch {
                consequent,
                alternative,
                ..
            }
            | Instruction::BinaryBranch {
                consequent,
                alternative,
                ..
            } => vec![*consequent, *alternative],
            _ => Vec::new(),
        }
    }

    pub fn map_targets(&mut self, mut map: impl FnMut(BlockId) -> BlockId) {
        match self {
            Instruction::Jump { target } => *target = map(*target),
            Instruction::Branch {
                consequent,
                alternative,
                ..
            }
            | Instruction::BinaryBranch {
                consequent,
                alternative,
                ..
            } => {
                *consequent = map(*consequent);
                *alternative = map(*alternative);
            }
            _ => {}
        }
    }

    /// Instructions without side effects, safe to remove when unused.
    /// Integer division is excluded because it may raise.
    pub fn is_pure(&self) -> bool {
        match self {
            Instruction::Const { .. } | Instruction::Assign { .. } => true,
            Instruction::Binary { op, kind, .. } => !matches!(
                (op, kind),
                (
                    BinaryOp::Divide | BinaryOp::Modulo,
                    NumericKind::Int | NumericKind::Long
                )
            ),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Incoming {
    pub source: BlockId,
    pub value: Register,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Phi {
    pub receiver: Register,
    pub incomings: Vec<Incoming>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BasicBlock {
    pub phis: Vec<Phi>,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|instruction| instruction.is_terminator())
    }

    pub fn terminator_mut(&mut self) -> Option<&mut Instruction> {
        self.instructions
            .last_mut()
            .filter(|instruction| instruction.is_terminator())
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator()
            .map(Instruction::successors)
            .unwrap_or_default()
    }
}

/// Control-flow program of one method.
///
/// Registers `0..parameter_count` hold the arguments on entry, the receiver
/// first for instance methods. Every other register has exactly one
/// definition, either a phi or an instruction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Program {
    pub parameter_count: u32,
    pub register_count: u32,
    pub blocks: Vec<BasicBlock>,
}

impl Program {
    pub fn new(parameter_count: u32) -> Self {
        Program {
            parameter_count,
            register_count: parameter_count,
            blocks: Vec::new(),
        }
    }

    pub fn parameter(&self, index: u32) -> Option<Register> {
        (index < self.parameter_count).then_some(Register(index))
    }

    pub fn create_register(&mut self) -> Register {
        let register = Register(self.register_count);
        self.register_count += 1;
        register
    }

    pub fn create_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::default());
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index())
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// Applies `map` to every register read by a phi or an instruction.
    pub fn map_uses(&mut self, mut map: impl FnMut(Register) -> Register) {
        for block in &mut self.blocks {
            for phi in &mut block.phis {
                for incoming in &mut phi.incomings {
                    incoming.value = map(incoming.value);
                }
            }
            for instruction in &mut block.instructions {
                instruction.map_uses(&mut map);
            }
        }
    }

    /// Checks the structural invariants every emitted program must satisfy.
    pub fn validate(&self) -> Result<(), PatchError> {
        if self.blocks.is_empty() {
            return Err(PatchError::invariant(0, "program has no blocks"));
        }
        if self.parameter_count > self.register_count {
            return Err(PatchError::invariant(0, "more parameters than registers"));
        }
        let mut defined = vec![false; self.register_count as usize];
        for slot in defined.iter_mut().take(self.parameter_count as usize) {
            *slot = true;
        }
        for (index, block) in self.blocks.iter().enumerate() {
            let id = index as u32;
            let check_register = |register: Register| {
                if register.0 >= self.register_count {
                    Err(PatchError::invariant(
                        id,
                        format!("register r{} was not created in this program", register.0),
                    ))
                } else {
                    Ok(())
                }
            };
            let check_block = |target: BlockId| {
                if target.index() >= self.blocks.len() {
                    Err(PatchError::invariant(
                        id,
                        format!("reference to missing block {}", target.0),
                    ))
                } else {
                    Ok(())
                }
            };

            let Some(last) = block.instructions.last() else {
                return Err(PatchError::invariant(id, "block is empty"));
            };
            if !last.is_terminator() {
                return Err(PatchError::invariant(id, "block does not end in a terminator"));
            }
            for phi in &block.phis {
                for incoming in &phi.incomings {
                    check_block(incoming.source)?;
                    check_register(incoming.value)?;
                }
            }
            let body = &block.instructions[..block.instructions.len() - 1];
            if body.iter().any(Instruction::is_terminator) {
                return Err(PatchError::invariant(id, "terminator in the middle of a block"));
            }

            let definitions = block
                .phis
                .iter()
                .map(|phi| phi.receiver)
                .chain(block.instructions.iter().filter_map(Instruction::receiver));
            for register in definitions {
                check_register(register)?;
                let slot = &mut defined[register.0 as usize];
                if *slot {
                    return Err(PatchError::invariant(
                        id,
                        format!("register r{} is defined more than once", register.0),
                    ));
                }
                *slot = true;
            }
            for instruction in &block.instructions {
                for register in instruction.uses() {
                    check_register(register)?;
                }
                for target in instruction.successors() {
                    check_block(target)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Int(value) => write!(f, "{value}"),
            Constant::Long(value) => write!(f, "{value}L"),
            Constant::Float(bits) => write!(f, "{}F", f32::from_bits(*bits)),
            Constant::Double(bits) => write!(f, "{}D", f64::from_bits(*bits)),
            Constant::String(value) => write!(f, "{value:?}"),
        }
    }
}

fn optional(register: Option<Register>) -> String {
    register.map_or_else(|| "_".to_string(), |register| register.to_string())
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Const { receiver, value } => write!(f, "{receiver} := {value}"),
            Instruction::Assign { receiver, assignee } => write!(f, "{receiver} := {assignee}"),
            Instruction::Binary {
                receiver,
                op,
                kind,
                first,
                second,
            } => write!(f, "{receiver} := {op:?}.{kind:?} {first}, {second}"),
            Instruction::Construct { receiver, class } => write!(f, "{receiver} := new {class}"),
            Instruction::Invoke {
                receiver,
                kind,
                method,
                instance,
                arguments,
            } => {
                let arguments: Vec<String> = arguments.iter().map(Register::to_string).collect();
                write!(
                    f,
                    "{} := invoke.{kind:?} {}.{}{} on {} ({})",
                    optional(*receiver),
                    method.class,
                    method.name,
                    method.descriptor,
                    optional(*instance),
                    arguments.join(", ")
                )
            }
            Instruction::GetField {
                receiver,
                field,
                instance,
            } => write!(
                f,
                "{receiver} := field {}.{} on {}",
                field.class,
                field.name,
                optional(*instance)
            ),
            Instruction::PutField {
                field,
                instance,
                value,
            } => write!(
                f,
                "field {}.{} on {} := {value}",
                field.class,
                field.name,
                optional(*instance)
            ),
            Instruction::Jump { target } => write!(f, "goto {target}"),
            Instruction::Branch {
                condition,
                operand,
                consequent,
                alternative,
            } => write!(f, "if {operand} {condition:?} then {consequent} else {alternative}"),
            Instruction::BinaryBranch {
                condition,
                first,
                second,
                consequent,
                alternative,
            } => write!(
                f,
                "if {first} {condition:?} {second} then {consequent} else {alternative}"
            ),
            Instruction::Exit { value: Some(value) } => write!(f, "return {value}"),
            Instruction::Exit { value: None } => f.write_str("return"),
            Instruction::Raise { exception } => write!(f, "throw {exception}"),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "program parameters={} registers={}",
            self.parameter_count, self.register_count
        )?;
        for (index, block) in self.blocks.iter().enumerate() {
            writeln!(f, "{}:", BlockId(index as u32))?;
            for phi in &block.phis {
                let incomings: Vec<String> = phi
                    .incomings
                    .iter()
                    .map(|incoming| format!("{} from {}", incoming.value, incoming.source))
                    .collect();
                writeln!(f, "    {} := phi {}", phi.receiver, incomings.join(", "))?;
            }
            for instruction in &block.instructions {
                writeln!(f, "    {instruction}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn returning_constant() -> Program {
        let mut program = Program::new(1);
        let entry = program.create_block();
        let value = program.create_register();
        let block = program.block_mut(entry).expect("entry");
        block.instructions.push(Instruction::Const {
            receiver: value,
            value: Constant::Int(3),
        });
        block.instructions.push(Instruction::Exit { value: Some(value) });
        program
    }

    #[test]
    fn well_formed_program_validates() {
        returning_constant().validate().expect("valid");
    }

    #[test]
    fn block_without_terminator_is_rejected() {
        let mut program = returning_constant();
        program.blocks[0].instructions.pop();
        let error = program.validate().expect_err("missing terminator");
        assert!(matches!(error, PatchError::InvariantViolation { block: 0, .. }));
    }

    #[test]
    fn foreign_register_is_rejected() {
        let mut program = returning_constant();
        program.blocks[0].instructions[1] = Instruction::Exit {
            value: Some(Register(9)),
        };
        let error = program.validate().expect_err("foreign register");
        assert!(error.to_string().contains("r9"));
    }

    #[test]
    fn branch_to_missing_block_and_double_definition_are_rejected() {
        let mut program = returning_constant();
        program.blocks[0].instructions[1] = Instruction::Jump { target: BlockId(4) };
        assert!(program.validate().is_err());

        let mut program = returning_constant();
        program.blocks[0].instructions.insert(
            0,
            Instruction::Const {
                receiver: Register(1),
                value: Constant::Null,
            },
        );
        assert!(program.validate().is_err());
    }

    #[test]
    fn listing_shows_blocks_and_instructions() {
        let listing = returning_constant().to_string();
        assert_eq!(
            listing,
            "program parameters=1 registers=2\nb0:\n    r1 := 3\n    return r1\n"
        );
    }

    #[test]
    fn default_constants_follow_descriptor() {
        let parse = |text: &str| TypeDescriptor::parse(text).expect("descriptor");
        assert_eq!(Constant::default_for(&parse("V")), None);
        assert_eq!(Constant::default_for(&parse("Z")), Some(Constant::Int(0)));
        assert_eq!(Constant::default_for(&parse("J")), Some(Constant::Long(0)));
        assert_eq!(Constant::default_for(&parse("D")), Some(Constant::double(0.0)));
        assert_eq!(
            Constant::default_for(&parse("[Ljava/lang/String;")),
            Some(Constant::Null)
        );
    }
}
