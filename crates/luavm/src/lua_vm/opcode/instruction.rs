/*----------------------------------------------------------------------
  Instruction Format (32-bit), opcode in the low 6 bits:

  iABC     B(9)    |    C(9)     |   A(8)    |  Op(6)  |
  iABx           Bx(18)          |   A(8)    |  Op(6)  |
  iAsBx         sBx(18)          |   A(8)    |  Op(6)  |
  iAx                  Ax(26)                |  Op(6)  |

  sBx is stored in excess-K: the written unsigned value minus MAX_BX >> 1.
  B and C hold RK operands: bit 8 set selects constant K[x & 0xFF].
----------------------------------------------------------------------*/

use std::fmt;

use super::{OpCode, OpMode};

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instruction(u32);

impl Instruction {
    #[inline(always)]
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    // Size of each field
    pub const SIZE_OP: u32 = 6;
    pub const SIZE_A: u32 = 8;
    pub const SIZE_B: u32 = 9;
    pub const SIZE_C: u32 = 9;
    pub const SIZE_BX: u32 = Self::SIZE_C + Self::SIZE_B; // 18
    pub const SIZE_AX: u32 = Self::SIZE_BX + Self::SIZE_A; // 26

    // Position of each field
    pub const POS_OP: u32 = 0;
    pub const POS_A: u32 = Self::POS_OP + Self::SIZE_OP;
    pub const POS_C: u32 = Self::POS_A + Self::SIZE_A;
    pub const POS_B: u32 = Self::POS_C + Self::SIZE_C;
    pub const POS_BX: u32 = Self::POS_C;
    pub const POS_AX: u32 = Self::POS_A;

    // Maximum values
    pub const MAX_A: u32 = (1 << Self::SIZE_A) - 1;
    pub const MAX_B: u32 = (1 << Self::SIZE_B) - 1;
    pub const MAX_C: u32 = (1 << Self::SIZE_C) - 1;
    pub const MAX_BX: u32 = (1 << Self::SIZE_BX) - 1;
    pub const MAX_AX: u32 = (1 << Self::SIZE_AX) - 1;
    pub const OFFSET_SBX: i32 = (Self::MAX_BX >> 1) as i32;

    /// Constant flag inside an RK operand
    pub const BITRK: u32 = 1 << (Self::SIZE_B - 1);
    /// Largest constant index an RK operand can address
    pub const MAXINDEXRK: u32 = Self::BITRK - 1;

    #[inline(always)]
    const fn mask1(n: u32, p: u32) -> u32 {
        (!((!0u32) << n)) << p
    }

    #[inline(always)]
    fn get_arg(self, pos: u32, size: u32) -> u32 {
        (self.0 >> pos) & Self::mask1(size, 0)
    }

    #[inline(always)]
    fn set_arg(&mut self, v: u32, pos: u32, size: u32) {
        self.0 = (self.0 & !Self::mask1(size, pos)) | ((v << pos) & Self::mask1(size, pos));
    }

    /// Decoded opcode; `None` only for malformed words
    #[inline(always)]
    pub fn get_opcode(self) -> Option<OpCode> {
        OpCode::from_u8(self.get_arg(Self::POS_OP, Self::SIZE_OP) as u8)
    }

    #[inline(always)]
    pub fn get_a(self) -> u32 {
        self.get_arg(Self::POS_A, Self::SIZE_A)
    }

    #[inline(always)]
    pub fn set_a(&mut self, v: u32) {
        self.set_arg(v, Self::POS_A, Self::SIZE_A);
    }

    #[inline(always)]
    pub fn get_b(self) -> u32 {
        self.get_arg(Self::POS_B, Self::SIZE_B)
    }

    #[inline(always)]
    pub fn set_b(&mut self, v: u32) {
        self.set_arg(v, Self::POS_B, Self::SIZE_B);
    }

    #[inline(always)]
    pub fn get_c(self) -> u32 {
        self.get_arg(Self::POS_C, Self::SIZE_C)
    }

    #[inline(always)]
    pub fn set_c(&mut self, v: u32) {
        self.set_arg(v, Self::POS_C, Self::SIZE_C);
    }

    #[inline(always)]
    pub fn get_bx(self) -> u32 {
        self.get_arg(Self::POS_BX, Self::SIZE_BX)
    }

    #[inline(always)]
    pub fn set_bx(&mut self, v: u32) {
        self.set_arg(v, Self::POS_BX, Self::SIZE_BX);
    }

    #[inline(always)]
    pub fn get_sbx(self) -> i32 {
        self.get_bx() as i32 - Self::OFFSET_SBX
    }

    #[inline(always)]
    pub fn set_sbx(&mut self, v: i32) {
        self.set_bx((v + Self::OFFSET_SBX) as u32);
    }

    #[inline(always)]
    pub fn get_ax(self) -> u32 {
        self.get_arg(Self::POS_AX, Self::SIZE_AX)
    }

    // Instruction creation
    pub fn create_abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        Self(
            ((op as u32) << Self::POS_OP)
                | ((a & Self::MAX_A) << Self::POS_A)
                | ((b & Self::MAX_B) << Self::POS_B)
                | ((c & Self::MAX_C) << Self::POS_C),
        )
    }

    pub fn create_abx(op: OpCode, a: u32, bx: u32) -> Self {
        Self(
            ((op as u32) << Self::POS_OP)
                | ((a & Self::MAX_A) << Self::POS_A)
                | ((bx & Self::MAX_BX) << Self::POS_BX),
        )
    }

    pub fn create_asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        Self::create_abx(op, a, (sbx + Self::OFFSET_SBX) as u32)
    }

    pub fn create_ax(op: OpCode, ax: u32) -> Self {
        Self(((op as u32) << Self::POS_OP) | ((ax & Self::MAX_AX) << Self::POS_AX))
    }

    // RK(x) - if k then K[x] else R[x]
    #[inline(always)]
    pub fn is_k(x: u32) -> bool {
        x & Self::BITRK != 0
    }

    #[inline(always)]
    pub fn rk_index(x: u32) -> u32 {
        x & !Self::BITRK
    }

    /// Encode constant index `k` as an RK operand
    #[inline(always)]
    pub fn rk_constant(k: u32) -> u32 {
        k | Self::BITRK
    }
}

impl From<u32> for Instruction {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Instruction> for u32 {
    fn from(value: Instruction) -> Self {
        value.0
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Instruction {
    /// One-line listing: `NAME A B C`, RK constants shown as negative `-(k+1)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.get_opcode() else {
            return write!(f, "<invalid {:#010x}>", self.0);
        };
        let rk = |x: u32| -> i64 {
            if op.uses_rk() && Self::is_k(x) {
                -(Self::rk_index(x) as i64) - 1
            } else {
                x as i64
            }
        };
        let a = self.get_a();
        match op.get_mode() {
            OpMode::IABC => match op {
                OpCode::Move
                | OpCode::LoadNil
                | OpCode::GetUpval
                | OpCode::SetUpval
                | OpCode::Unm
                | OpCode::BNot
                | OpCode::Not
                | OpCode::Len
                | OpCode::Return
                | OpCode::Vararg => write!(f, "{:<9} {} {}", op.name(), a, self.get_b()),
                OpCode::Test | OpCode::TForCall => {
                    write!(f, "{:<9} {} {}", op.name(), a, self.get_c())
                }
                _ => write!(
                    f,
                    "{:<9} {} {} {}",
                    op.name(),
                    a,
                    rk(self.get_b()),
                    rk(self.get_c())
                ),
            },
            OpMode::IABx => write!(f, "{:<9} {} {}", op.name(), a, self.get_bx()),
            OpMode::IAsBx => write!(f, "{:<9} {} {}", op.name(), a, self.get_sbx()),
            OpMode::IAx => write!(f, "{:<9} {}", op.name(), self.get_ax()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abc_fields() {
        let i = Instruction::create_abc(OpCode::Add, 10, 300, 45);
        assert_eq!(i.get_opcode(), Some(OpCode::Add));
        assert_eq!(i.get_a(), 10);
        assert_eq!(i.get_b(), 300);
        assert_eq!(i.get_c(), 45);
        assert!(Instruction::is_k(i.get_b()));
        assert_eq!(Instruction::rk_index(i.get_b()), 44);
        assert!(!Instruction::is_k(i.get_c()));
    }

    #[test]
    fn test_sbx_extremes() {
        for sbx in [-Instruction::OFFSET_SBX, -1, 0, 1, Instruction::OFFSET_SBX] {
            let i = Instruction::create_asbx(OpCode::Jmp, 0, sbx);
            assert_eq!(i.get_sbx(), sbx);
        }
    }

    #[test]
    fn test_setters_preserve_other_fields() {
        let mut i = Instruction::create_abc(OpCode::Call, 1, 2, 3);
        i.set_b(0);
        assert_eq!((i.get_a(), i.get_b(), i.get_c()), (1, 0, 3));
        i.set_a(255);
        assert_eq!(i.get_opcode(), Some(OpCode::Call));
        assert_eq!(i.get_a(), 255);
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Instruction::from_u32(63).get_opcode(), None);
        assert_eq!(OpCode::from_u8(OpCode::ExtraArg as u8), Some(OpCode::ExtraArg));
    }

    #[test]
    fn test_listing() {
        let i = Instruction::create_abc(OpCode::GetTabUp, 0, 0, Instruction::rk_constant(1));
        assert_eq!(i.to_string(), "GETTABUP  0 0 -2");
        assert_eq!(
            Instruction::create_asbx(OpCode::ForPrep, 2, -3).to_string(),
            "FORPREP   2 -3"
        );
    }
}
