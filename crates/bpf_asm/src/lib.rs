//! Typed model of the eBPF opcode byte.
//!
//! Every eBPF instruction starts with an 8-bit opcode whose
//! interpretation hinges on a 3-bit class tag:
//!
//! ```text
//! +--------+-------+--------+     +--------+--------+--------+
//! | 4 bits | 1 bit | 3 bits |     | 3 bits | 2 bits | 3 bits |
//! |   op   |  src  | class  |     |  mode  |  size  | class  |
//! +--------+-------+--------+     +--------+--------+--------+
//!        ALU and jump                   load and store
//! ```
//!
//! This crate models that byte as a composable value type: an
//! [`OpCode`] is built from a class plus typed facets, mutated through
//! setters that validate class compatibility and mask coverage, and
//! projected back to the kernel's encoding or to the conventional
//! mnemonic. Failures are values, not panics: setters degrade to
//! [`OpCode::INVALID`] and accessors answer `None` for facets the
//! class does not carry, so loaders and assemblers can chain
//! constructions and check validity once.
//!
//! The numeric encodings are the kernel's uapi values, bit for bit.
//!
//! # Modules
//!
//! - [`class`] - the 3-bit instruction class and its category predicates
//! - [`load_store`] - addressing mode and access width facets
//! - [`alu`] - ALU operations, operand source, byte-swap direction
//! - [`jump`] - jump operations and their class restrictions
//! - [`atomic`] - atomic read-modify-write flavors
//! - [`opcode`] - the composite carrier, builders and raw projection
//!
//! # Quick start
//!
//! ```
//! use bpf_asm::{Class, JumpOp, OpCode, Size, Source};
//!
//! let load = OpCode::load_mem(Size::Word);
//! assert_eq!(load.raw_opcode(), Ok(0x61));
//! assert_eq!(load.to_string(), "LdXMemW");
//!
//! let branch = OpCode::jump(JumpOp::Jeq, Class::Jump32).set_source(Source::Reg);
//! assert_eq!(branch.to_string(), "JEqX32");
//!
//! // The 64-bit immediate load is the only two-slot instruction.
//! assert_eq!(OpCode::load_imm(Size::DWord).raw_instructions(), 2);
//! ```

#![no_std]

#[cfg(test)]
extern crate alloc;

pub mod alu;
pub mod atomic;
mod bits;
pub mod class;
pub mod jump;
pub mod load_store;
pub mod opcode;

pub use alu::{AluOp, Endianness, Source};
pub use atomic::AtomicOp;
pub use class::Class;
pub use jump::JumpOp;
pub use load_store::{Mode, Size};
pub use opcode::{EncodingError, OpCode};
