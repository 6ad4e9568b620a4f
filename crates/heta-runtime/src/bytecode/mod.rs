//! Bytecode instruction set and the buffer functions are assembled in
//!
//! A [`Chunk`] collects instruction bytes, the source line of every byte and
//! the constant pool while the compiler walks a function body. Once the body
//! is complete the chunk is frozen into an [`ObjFn`](crate::object::ObjFn).

mod opcode;

pub use opcode::Opcode;

use crate::buffer::Buffer;
use crate::value::Value;

/// Instruction stream under construction
#[derive(Debug, Default)]
pub struct Chunk {
    /// Raw instruction bytes
    pub code: Buffer<u8>,
    /// Source line for each byte in `code`
    pub lines: Buffer<u32>,
    /// Constant pool
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an opcode
    pub fn emit(&mut self, opcode: Opcode, line: u32) -> usize {
        self.emit_u8(opcode as u8, line)
    }

    /// Emit a raw byte, returning its offset
    pub fn emit_u8(&mut self, byte: u8, line: u32) -> usize {
        self.code.write(byte);
        self.lines.write(line);
        self.code.count() - 1
    }

    /// Emit a u16 operand (big-endian), returning the offset of its first byte
    pub fn emit_u16(&mut self, value: u16, line: u32) -> usize {
        let offset = self.emit_u8((value >> 8) as u8, line);
        self.emit_u8((value & 0xff) as u8, line);
        offset
    }

    /// Add a constant to the pool and return its index
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Current instruction offset, for jump targets
    pub fn offset(&self) -> usize {
        self.code.count()
    }

    /// Patch the u16 placeholder at `operand` to jump to the current offset.
    /// Returns false if the distance does not fit.
    pub fn patch_jump(&mut self, operand: usize) -> bool {
        let distance = self.code.count() - operand - 2;
        if distance > u16::MAX as usize {
            return false;
        }
        self.code[operand] = (distance >> 8) as u8;
        self.code[operand + 1] = (distance & 0xff) as u8;
        true
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        read_u16(&self.code, offset)
    }
}

/// Decode a big-endian u16 operand
#[inline]
pub fn read_u16(code: &[u8], offset: usize) -> u16 {
    (u16::from(code[offset]) << 8) | u16::from(code[offset + 1])
}
