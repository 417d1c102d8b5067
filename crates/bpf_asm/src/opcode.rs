//! The composite opcode carrier.
//!
//! An [`OpCode`] holds the kernel-visible opcode byte in its low 8 bits
//! and decodes it through the facet types of the sibling modules. The
//! carrier is wider than the byte for two reasons:
//!
//! - the flavor of an atomic store does not fit into the opcode byte
//!   (the kernel moves it to the instruction's immediate field); it is
//!   packed into bits 8-15 of the carrier, and
//! - setters fail by value, returning the [`OpCode::INVALID`] sentinel,
//!   which must not collide with any encodable opcode.
//!
//! Facet accessors inspect the class first and return `None` when the
//! class does not carry the facet. Setters reject a wrong class, a
//! value outside the facet's mask, and the semantic restrictions
//! (64-bit-only jumps on the 32-bit jump class, sign-extended
//! double-word loads, sub-word exclusive adds), all by degrading to
//! `INVALID`. Chains of setters therefore compose without intermediate
//! checks; validity is asserted once at the end, or at the latest by
//! [`OpCode::raw_opcode`], the only fallible projection.

use core::fmt;

use thiserror::Error;

use crate::alu::{AluOp, Endianness, Source};
use crate::atomic::AtomicOp;
use crate::bits;
use crate::class::Class;
use crate::jump::JumpOp;
use crate::load_store::{Mode, Size};

/// Operand source or byte-swap direction, bit 3 of the opcode byte.
const SOURCE_MASK: u32 = 0x08;
/// Access width, bits 3-4 of the opcode byte.
const SIZE_MASK: u32 = 0x18;
/// Addressing mode, bits 5-7 of the opcode byte.
const MODE_MASK: u32 = 0xe0;
/// ALU or jump operation, bits 4-7 of the opcode byte.
const OP_MASK: u32 = 0xf0;
/// Atomic flavor, packed above the opcode byte.
const ATOMIC_MASK: u32 = 0xff00;
const ATOMIC_SHIFT: u32 = 8;

/// Errors that can occur when projecting an opcode to its raw byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The opcode is the invalid sentinel.
    #[error("invalid opcode cannot be encoded")]
    InvalidOpCode,
    /// Carrier bits outside the opcode byte and the atomic field are set.
    #[error("opcode {raw:#06x} has reserved bits set")]
    ReservedBits {
        /// Offending carrier value
        raw: u32,
    },
}

/// A single eBPF opcode: class tag plus class-specific facets.
///
/// Opcodes are cheap immutable values. Every mutator returns a new
/// opcode and degrades to [`OpCode::INVALID`] on any violation, so
/// construction chains freely:
///
/// ```
/// use bpf_asm::{AtomicOp, OpCode, Size};
///
/// let op = OpCode::store_mem(Size::DWord)
///     .set_mode(bpf_asm::Mode::Atomic)
///     .set_atomic_op(AtomicOp::CmpXchg);
/// assert_eq!(op.raw_opcode(), Ok(0xdb));
/// assert_eq!(op.atomic_op(), Some(AtomicOp::CmpXchg));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpCode(u32);

impl OpCode {
    /// Sentinel returned by setters on any violation.
    ///
    /// Its low byte would place the atomic field out of range for a
    /// non-store class, so no valid opcode can equal it.
    pub const INVALID: OpCode = OpCode(0xffff);

    /// Lift a raw kernel opcode byte into the typed model.
    ///
    /// Every byte carries a class, but facets may still fail to decode
    /// (reserved mode bits, unassigned operation nibbles). For an
    /// atomic store the flavor lives in the instruction's immediate;
    /// disassemblers apply it afterwards via [`OpCode::set_atomic_op`].
    #[inline]
    pub const fn from_raw(raw: u8) -> OpCode {
        OpCode(raw as u32)
    }

    /// Load of a wide immediate: `Ld` class, immediate mode.
    #[inline]
    pub const fn load_imm(size: Size) -> OpCode {
        OpCode(Class::Ld as u32).set_mode(Mode::Imm).set_size(size)
    }

    /// Legacy absolute packet load: `Ld` class, absolute mode.
    #[inline]
    pub const fn load_abs(size: Size) -> OpCode {
        OpCode(Class::Ld as u32).set_mode(Mode::Abs).set_size(size)
    }

    /// Legacy indirect packet load: `Ld` class, indirect mode.
    #[inline]
    pub const fn load_ind(size: Size) -> OpCode {
        OpCode(Class::Ld as u32).set_mode(Mode::Ind).set_size(size)
    }

    /// Load from memory: `LdX` class, memory mode.
    #[inline]
    pub const fn load_mem(size: Size) -> OpCode {
        OpCode(Class::Ldx as u32).set_mode(Mode::Mem).set_size(size)
    }

    /// Sign-extending load from memory: `LdX` class, sign-extended mode.
    ///
    /// A 64-bit access has nothing to extend; `DWord` yields `INVALID`.
    #[inline]
    pub const fn load_mem_sx(size: Size) -> OpCode {
        if matches!(size, Size::DWord) {
            return Self::INVALID;
        }
        OpCode(Class::Ldx as u32).set_mode(Mode::MemSx).set_size(size)
    }

    /// Store an immediate to memory: `St` class, memory mode.
    #[inline]
    pub const fn store_imm(size: Size) -> OpCode {
        OpCode(Class::St as u32).set_mode(Mode::Mem).set_size(size)
    }

    /// Store a register to memory: `StX` class, memory mode.
    #[inline]
    pub const fn store_mem(size: Size) -> OpCode {
        OpCode(Class::Stx as u32).set_mode(Mode::Mem).set_size(size)
    }

    /// Legacy exclusive add: `StX` class, atomic mode, plain add flavor.
    ///
    /// The kernel only accepts word and double-word exclusive adds;
    /// `Byte` and `Half` yield `INVALID`.
    #[inline]
    pub const fn store_xadd(size: Size) -> OpCode {
        if !matches!(size, Size::Word | Size::DWord) {
            return Self::INVALID;
        }
        OpCode(Class::Stx as u32).set_mode(Mode::Atomic).set_size(size)
    }

    /// Build an ALU opcode with an immediate source.
    ///
    /// `class` must be one of the two ALU classes.
    #[inline]
    pub const fn alu(op: AluOp, class: Class) -> OpCode {
        if !class.is_alu() {
            return Self::INVALID;
        }
        OpCode(class as u32).set_alu_op(op)
    }

    /// Build a jump opcode with an immediate source.
    ///
    /// `class` must be one of the two jump classes; `Ja`, `Call` and
    /// `Exit` are rejected on the 32-bit one.
    #[inline]
    pub const fn jump(op: JumpOp, class: Class) -> OpCode {
        if !class.is_jump() {
            return Self::INVALID;
        }
        OpCode(class as u32).set_jump_op(op)
    }

    /// Get the instruction class.
    ///
    /// `None` only for the invalid sentinel.
    #[inline]
    pub const fn class(&self) -> Option<Class> {
        if self.0 == Self::INVALID.0 {
            return None;
        }
        Some(Class::from_opcode(self.0 as u8))
    }

    /// Get the addressing mode of a load or store opcode.
    #[inline]
    pub const fn mode(&self) -> Option<Mode> {
        let class = match self.class() {
            Some(c) => c,
            None => return None,
        };
        if !class.is_memory() {
            return None;
        }
        Mode::from_opcode(self.0 as u8)
    }

    /// Get the access width of a load or store opcode.
    #[inline]
    pub const fn size(&self) -> Option<Size> {
        let class = match self.class() {
            Some(c) => c,
            None => return None,
        };
        if !class.is_memory() {
            return None;
        }
        Some(Size::from_opcode(self.0 as u8))
    }

    /// Get the operand source of an ALU or jump opcode.
    ///
    /// Swap opcodes repurpose the source bit for the byte-swap
    /// direction and have no source.
    #[inline]
    pub const fn source(&self) -> Option<Source> {
        let class = match self.class() {
            Some(c) => c,
            None => return None,
        };
        if !class.is_jump_or_alu() {
            return None;
        }
        if matches!(self.alu_op(), Some(AluOp::Swap)) {
            return None;
        }
        Some(Source::from_opcode(self.0 as u8))
    }

    /// Get the byte-swap direction of a 32-bit swap opcode.
    ///
    /// The 64-bit swap is an unconditional byte reversal and carries no
    /// direction.
    #[inline]
    pub const fn endianness(&self) -> Option<Endianness> {
        if !matches!(self.class(), Some(Class::Alu32)) {
            return None;
        }
        if !matches!(self.alu_op(), Some(AluOp::Swap)) {
            return None;
        }
        Some(Endianness::from_opcode(self.0 as u8))
    }

    /// Get the ALU operation.
    #[inline]
    pub const fn alu_op(&self) -> Option<AluOp> {
        let class = match self.class() {
            Some(c) => c,
            None => return None,
        };
        if !class.is_alu() {
            return None;
        }
        AluOp::from_opcode(self.0 as u8)
    }

    /// Get the jump operation.
    ///
    /// `Ja`, `Call` and `Exit` do not exist on the 32-bit jump class
    /// and read back as `None` there.
    #[inline]
    pub const fn jump_op(&self) -> Option<JumpOp> {
        let class = match self.class() {
            Some(c) => c,
            None => return None,
        };
        if !class.is_jump() {
            return None;
        }
        let op = match JumpOp::from_opcode(self.0 as u8) {
            Some(op) => op,
            None => return None,
        };
        if matches!(class, Class::Jump32) && op.is_wide_only() {
            return None;
        }
        Some(op)
    }

    /// Get the atomic flavor of a store-atomic opcode.
    #[inline]
    pub const fn atomic_op(&self) -> Option<AtomicOp> {
        if !matches!(self.class(), Some(Class::Stx)) {
            return None;
        }
        if !matches!(self.mode(), Some(Mode::Atomic)) {
            return None;
        }
        AtomicOp::from_imm(((self.0 & ATOMIC_MASK) >> ATOMIC_SHIFT) as i32)
    }

    /// Set the addressing mode on a load or store opcode.
    ///
    /// Leaving the atomic mode clears the packed atomic flavor, so no
    /// mutation can strand stale bits above the opcode byte.
    #[inline]
    pub const fn set_mode(self, mode: Mode) -> OpCode {
        let class = match self.class() {
            Some(c) => c,
            None => return Self::INVALID,
        };
        if !class.is_memory() {
            return Self::INVALID;
        }
        if !bits::fits(mode as u32, MODE_MASK) {
            return Self::INVALID;
        }
        let raw = bits::replace(self.0, MODE_MASK, mode as u32);
        if matches!(mode, Mode::Atomic) {
            OpCode(raw)
        } else {
            OpCode(raw & !ATOMIC_MASK)
        }
    }

    /// Set the access width on a load or store opcode.
    #[inline]
    pub const fn set_size(self, size: Size) -> OpCode {
        let class = match self.class() {
            Some(c) => c,
            None => return Self::INVALID,
        };
        if !class.is_memory() {
            return Self::INVALID;
        }
        if !bits::fits(size as u32, SIZE_MASK) {
            return Self::INVALID;
        }
        OpCode(bits::replace(self.0, SIZE_MASK, size as u32))
    }

    /// Set the operand source on an ALU or jump opcode.
    ///
    /// Rejected on swap opcodes, where bit 3 is the byte-swap
    /// direction.
    #[inline]
    pub const fn set_source(self, source: Source) -> OpCode {
        let class = match self.class() {
            Some(c) => c,
            None => return Self::INVALID,
        };
        if !class.is_jump_or_alu() {
            return Self::INVALID;
        }
        if matches!(self.alu_op(), Some(AluOp::Swap)) {
            return Self::INVALID;
        }
        if !bits::fits(source as u32, SOURCE_MASK) {
            return Self::INVALID;
        }
        OpCode(bits::replace(self.0, SOURCE_MASK, source as u32))
    }

    /// Set the byte-swap direction on a 32-bit swap opcode.
    #[inline]
    pub const fn set_endianness(self, endian: Endianness) -> OpCode {
        if !matches!(self.class(), Some(Class::Alu32)) {
            return Self::INVALID;
        }
        if !matches!(self.alu_op(), Some(AluOp::Swap)) {
            return Self::INVALID;
        }
        if !bits::fits(endian as u32, SOURCE_MASK) {
            return Self::INVALID;
        }
        OpCode(bits::replace(self.0, SOURCE_MASK, endian as u32))
    }

    /// Set the ALU operation on an ALU opcode.
    #[inline]
    pub const fn set_alu_op(self, op: AluOp) -> OpCode {
        let class = match self.class() {
            Some(c) => c,
            None => return Self::INVALID,
        };
        if !class.is_alu() {
            return Self::INVALID;
        }
        if !bits::fits(op as u32, OP_MASK) {
            return Self::INVALID;
        }
        OpCode(bits::replace(self.0, OP_MASK, op as u32))
    }

    /// Set the jump operation on a jump opcode.
    ///
    /// The result is read back through [`OpCode::jump_op`]; an
    /// operation that is legal at the mask layer but not on this class
    /// (`Exit` on `Jump32`) degrades to `INVALID` here.
    #[inline]
    pub const fn set_jump_op(self, op: JumpOp) -> OpCode {
        let class = match self.class() {
            Some(c) => c,
            None => return Self::INVALID,
        };
        if !class.is_jump() {
            return Self::INVALID;
        }
        if !bits::fits(op as u32, OP_MASK) {
            return Self::INVALID;
        }
        let next = OpCode(bits::replace(self.0, OP_MASK, op as u32));
        match next.jump_op() {
            Some(_) => next,
            None => Self::INVALID,
        }
    }

    /// Set the atomic flavor on a store-atomic opcode.
    #[inline]
    pub const fn set_atomic_op(self, atomic: AtomicOp) -> OpCode {
        if !matches!(self.class(), Some(Class::Stx)) {
            return Self::INVALID;
        }
        if !matches!(self.mode(), Some(Mode::Atomic)) {
            return Self::INVALID;
        }
        let field = (atomic as u32) << ATOMIC_SHIFT;
        if !bits::fits(field, ATOMIC_MASK) {
            return Self::INVALID;
        }
        OpCode(bits::replace(self.0, ATOMIC_MASK, field))
    }

    /// Check if this is the two-slot load of a 64-bit immediate.
    #[inline]
    pub const fn is_dword_load(&self) -> bool {
        self.0 == OpCode::load_imm(Size::DWord).0
    }

    /// Number of 8-byte instruction slots this opcode occupies.
    ///
    /// 2 exactly for the 64-bit immediate load, 1 for everything else.
    #[inline]
    pub const fn raw_instructions(&self) -> usize {
        if self.is_dword_load() { 2 } else { 1 }
    }

    /// Project the kernel-visible opcode byte.
    ///
    /// The invalid sentinel does not encode. Carrier bits above the
    /// opcode byte are only legal as the atomic field of a store-atomic
    /// opcode; anything else is a reserved-bits error. The atomic
    /// flavor itself is not part of the byte; serializers read it via
    /// [`OpCode::atomic_op`] and place it in the instruction immediate.
    pub const fn raw_opcode(&self) -> Result<u8, EncodingError> {
        if self.0 == Self::INVALID.0 {
            return Err(EncodingError::InvalidOpCode);
        }
        let upper = self.0 & !0xff;
        if upper != 0 && ((upper & !ATOMIC_MASK) != 0 || self.atomic_op().is_none()) {
            return Err(EncodingError::ReservedBits { raw: self.0 });
        }
        Ok(self.0 as u8)
    }

    /// Check if this opcode can be projected to a kernel byte.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        matches!(self.raw_opcode(), Ok(_))
    }

    fn fmt_unknown(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpCode({:#x})", self.0)
    }
}

impl fmt::Debug for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpCode")
            .field(&format_args!("{:#06x}", self.0))
            .finish()
    }
}

impl fmt::Display for OpCode {
    /// Render the conventional mnemonic.
    ///
    /// Load/store opcodes concatenate class, mode, atomic flavor and
    /// size suffix (`LdXMemW`, `StXAtomicCmpXChgDW`). ALU and jump
    /// opcodes concatenate the operation, the register-source marker
    /// and a `32` suffix on the 32-bit classes (`Add32`, `JEqX32`);
    /// swaps render their direction (`SwapBE`) or, on the 64-bit
    /// class, as the unconditional `BSwap`. Anything undecodable
    /// renders as `OpCode(0x…)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.class() {
            Some(c) => c,
            None => return self.fmt_unknown(f),
        };

        if class.is_memory() {
            let mode = match self.mode() {
                Some(m) => m,
                None => return self.fmt_unknown(f),
            };
            let size = match self.size() {
                Some(s) => s,
                None => return self.fmt_unknown(f),
            };
            write!(f, "{}{}", class, mode)?;
            if let Some(atomic) = self.atomic_op() {
                write!(f, "{}", atomic)?;
            }
            return write!(f, "{}", size.suffix());
        }

        if class.is_alu() {
            let op = match self.alu_op() {
                Some(op) => op,
                None => return self.fmt_unknown(f),
            };
            if matches!(op, AluOp::Swap) {
                return match self.endianness() {
                    Some(endian) => write!(f, "Swap{}", endian),
                    None => write!(f, "BSwap"),
                };
            }
            write!(f, "{}", op)?;
            if let Some(source) = self.source() {
                write!(f, "{}", source.suffix())?;
            }
            if matches!(class, Class::Alu32) {
                write!(f, "32")?;
            }
            return Ok(());
        }

        let op = match self.jump_op() {
            Some(op) => op,
            None => return self.fmt_unknown(f),
        };
        write!(f, "{}", op)?;
        if op.is_conditional() {
            if let Some(source) = self.source() {
                write!(f, "{}", source.suffix())?;
            }
        }
        if matches!(class, Class::Jump32) {
            write!(f, "32")?;
        }
        Ok(())
    }
}
