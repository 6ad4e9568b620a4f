//! Bytecode instruction set
//!
//! Stack-based instructions, one opcode byte followed by inline operands.
//! Multi-byte operands are big-endian `u16`.

/// Bytecode opcode
///
/// Operand layout is given in brackets. `sym` is a method symbol, `const` a
/// constant-pool index, `slot` a local slot relative to the frame start.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // ===== Constants =====
    /// Push a constant [u16 const]
    Constant = 0x01,
    Null = 0x02,
    False = 0x03,
    True = 0x04,

    // ===== Variables =====
    /// [u8 slot]
    LoadLocal = 0x10,
    /// Store top of stack without popping [u8 slot]
    StoreLocal = 0x11,
    /// [u8 upvalue]
    LoadUpvalue = 0x12,
    /// [u8 upvalue]
    StoreUpvalue = 0x13,
    /// [u16 variable]
    LoadModuleVar = 0x14,
    /// [u16 variable]
    StoreModuleVar = 0x15,

    // ===== Fields =====
    /// Field of the receiver in slot 0 [u8 field]
    LoadFieldThis = 0x20,
    /// [u8 field]
    StoreFieldThis = 0x21,
    /// Pop an instance, push its field [u8 field]
    LoadField = 0x22,
    /// Pop an instance, store the value below it [u8 field]
    StoreField = 0x23,

    // ===== Stack =====
    Pop = 0x30,

    // ===== Calls =====
    /// Dynamic dispatch on the receiver [u8 argc][u16 sym]
    Call = 0x40,
    /// Dispatch starting at the superclass of the method's class [u8 argc][u16 sym]
    Super = 0x41,

    // ===== Control flow =====
    /// Forward jump [u16 offset]
    Jump = 0x50,
    /// Backward jump [u16 offset]
    Loop = 0x51,
    /// Pop the condition, jump forward if it is falsy [u16 offset]
    JumpIfFalse = 0x52,
    /// Short-circuit: jump if top is falsy, else pop [u16 offset]
    And = 0x53,
    /// Short-circuit: jump if top is truthy, else pop [u16 offset]
    Or = 0x54,

    // ===== Functions =====
    /// Close the upvalue for the top stack slot, then pop it
    CloseUpvalue = 0x60,
    Return = 0x61,
    /// Create a closure [u16 const] then, per upvalue, [u8 is_local][u8 index]
    Closure = 0x62,

    // ===== Classes =====
    /// Replace the class in slot 0 with a new instance
    Construct = 0x70,
    /// Replace the class in slot 0 with a new foreign instance
    ForeignConstruct = 0x71,
    /// Pop superclass and name, push a new class [u8 own_fields]
    Class = 0x72,
    /// Pop superclass and name, push a new foreign class
    ForeignClass = 0x73,
    /// Pop class and method, bind as instance method [u16 sym]
    MethodInstance = 0x74,
    /// Pop class and method, bind on the metaclass [u16 sym]
    MethodStatic = 0x75,

    // ===== Modules =====
    /// Record the finished module and push null
    EndModule = 0x80,
    /// Import a module by name [u16 const]
    ImportModule = 0x81,
    /// Push a variable of the last imported module [u16 const]
    ImportVariable = 0x82,
}

impl Opcode {
    /// Fixed operand bytes following the opcode. `Closure` has additional
    /// upvalue pairs that depend on the function it creates.
    pub fn operand_len(self) -> usize {
        match self {
            Opcode::Null
            | Opcode::False
            | Opcode::True
            | Opcode::Pop
            | Opcode::CloseUpvalue
            | Opcode::Return
            | Opcode::Construct
            | Opcode::ForeignConstruct
            | Opcode::ForeignClass
            | Opcode::EndModule => 0,
            Opcode::LoadLocal
            | Opcode::StoreLocal
            | Opcode::LoadUpvalue
            | Opcode::StoreUpvalue
            | Opcode::LoadFieldThis
            | Opcode::StoreFieldThis
            | Opcode::LoadField
            | Opcode::StoreField
            | Opcode::Class => 1,
            Opcode::Constant
            | Opcode::LoadModuleVar
            | Opcode::StoreModuleVar
            | Opcode::Jump
            | Opcode::Loop
            | Opcode::JumpIfFalse
            | Opcode::And
            | Opcode::Or
            | Opcode::Closure
            | Opcode::MethodInstance
            | Opcode::MethodStatic
            | Opcode::ImportModule
            | Opcode::ImportVariable => 2,
            Opcode::Call | Opcode::Super => 3,
        }
    }

    /// Net change in stack height. Calls are adjusted by their argument
    /// count separately.
    pub fn stack_effect(self) -> i32 {
        match self {
            Opcode::Constant
            | Opcode::Null
            | Opcode::False
            | Opcode::True
            | Opcode::LoadLocal
            | Opcode::LoadUpvalue
            | Opcode::LoadModuleVar
            | Opcode::LoadFieldThis
            | Opcode::Closure
            | Opcode::EndModule
            | Opcode::ImportModule
            | Opcode::ImportVariable => 1,
            Opcode::StoreLocal
            | Opcode::StoreUpvalue
            | Opcode::StoreModuleVar
            | Opcode::StoreFieldThis
            | Opcode::LoadField
            | Opcode::Call
            | Opcode::Super
            | Opcode::Jump
            | Opcode::Loop
            | Opcode::Construct
            | Opcode::ForeignConstruct
            | Opcode::And
            | Opcode::Or => 0,
            Opcode::StoreField
            | Opcode::Pop
            | Opcode::JumpIfFalse
            | Opcode::CloseUpvalue
            | Opcode::Return
            | Opcode::Class
            | Opcode::ForeignClass => -1,
            Opcode::MethodInstance | Opcode::MethodStatic => -2,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let op = match byte {
            0x01 => Opcode::Constant,
            0x02 => Opcode::Null,
            0x03 => Opcode::False,
            0x04 => Opcode::True,
            0x10 => Opcode::LoadLocal,
            0x11 => Opcode::StoreLocal,
            0x12 => Opcode::LoadUpvalue,
            0x13 => Opcode::StoreUpvalue,
            0x14 => Opcode::LoadModuleVar,
            0x15 => Opcode::StoreModuleVar,
            0x20 => Opcode::LoadFieldThis,
            0x21 => Opcode::StoreFieldThis,
            0x22 => Opcode::LoadField,
            0x23 => Opcode::StoreField,
            0x30 => Opcode::Pop,
            0x40 => Opcode::Call,
            0x41 => Opcode::Super,
            0x50 => Opcode::Jump,
            0x51 => Opcode::Loop,
            0x52 => Opcode::JumpIfFalse,
            0x53 => Opcode::And,
            0x54 => Opcode::Or,
            0x60 => Opcode::CloseUpvalue,
            0x61 => Opcode::Return,
            0x62 => Opcode::Closure,
            0x70 => Opcode::Construct,
            0x71 => Opcode::ForeignConstruct,
            0x72 => Opcode::Class,
            0x73 => Opcode::ForeignClass,
            0x74 => Opcode::MethodInstance,
            0x75 => Opcode::MethodStatic,
            0x80 => Opcode::EndModule,
            0x81 => Opcode::ImportModule,
            0x82 => Opcode::ImportVariable,
            other => return Err(other),
        };
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_decodes_to_itself() {
        let mut seen = 0;
        for byte in 0..=u8::MAX {
            if let Ok(op) = Opcode::try_from(byte) {
                assert_eq!(op as u8, byte);
                seen += 1;
            }
        }
        assert_eq!(seen, 34);
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        assert_eq!(Opcode::try_from(0x00), Err(0x00));
        assert_eq!(Opcode::try_from(0xff), Err(0xff));
    }
}
