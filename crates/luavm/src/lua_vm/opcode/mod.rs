mod instruction;

pub use instruction::Instruction;

/// Instruction format modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    IABC,
    IABx,
    IAsBx,
    IAx,
}

/// Register-machine opcode set (47 opcodes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Load/Move operations
    Move = 0, // R(A) := R(B)
    LoadK,    // R(A) := K(Bx)
    LoadKX,   // R(A) := K(extra arg)
    LoadBool, // R(A) := (Bool)B; if (C) pc++
    LoadNil,  // R(A), R(A+1), ..., R(A+B) := nil

    // Upvalue and table access
    GetUpval, // R(A) := UpValue[B]
    GetTabUp, // R(A) := UpValue[B][RK(C)]
    GetTable, // R(A) := R(B)[RK(C)]
    SetTabUp, // UpValue[A][RK(B)] := RK(C)
    SetUpval, // UpValue[B] := R(A)
    SetTable, // R(A)[RK(B)] := RK(C)
    NewTable, // R(A) := {} (size = B,C)
    Self_,    // R(A+1) := R(B); R(A) := R(B)[RK(C)]

    // Arithmetic
    Add,  // R(A) := RK(B) + RK(C)
    Sub,  // R(A) := RK(B) - RK(C)
    Mul,  // R(A) := RK(B) * RK(C)
    Mod,  // R(A) := RK(B) % RK(C)
    Pow,  // R(A) := RK(B) ^ RK(C)
    Div,  // R(A) := RK(B) / RK(C)
    IDiv, // R(A) := RK(B) // RK(C)

    // Bitwise
    BAnd, // R(A) := RK(B) & RK(C)
    BOr,  // R(A) := RK(B) | RK(C)
    BXor, // R(A) := RK(B) ~ RK(C)
    Shl,  // R(A) := RK(B) << RK(C)
    Shr,  // R(A) := RK(B) >> RK(C)

    // Unary
    Unm,  // R(A) := -R(B)
    BNot, // R(A) := ~R(B)
    Not,  // R(A) := not R(B)
    Len,  // R(A) := length of R(B)

    Concat, // R(A) := R(B).. ... ..R(C)

    Jmp, // pc += sBx; if (A) close all upvalues >= R(A - 1)

    // Comparison
    Eq, // if ((RK(B) == RK(C)) ~= A) then pc++
    Lt, // if ((RK(B) <  RK(C)) ~= A) then pc++
    Le, // if ((RK(B) <= RK(C)) ~= A) then pc++

    // Test
    Test,    // if not (R(A) <=> C) then pc++
    TestSet, // if (R(B) <=> C) then R(A) := R(B) else pc++

    // Calls
    Call,     // R(A), ... ,R(A+C-2) := R(A)(R(A+1), ... ,R(A+B-1))
    TailCall, // return R(A)(R(A+1), ... ,R(A+B-1))
    Return,   // return R(A), ... ,R(A+B-2)

    // Numeric for
    ForLoop, // R(A)+=R(A+2); if R(A) <?= R(A+1) then { pc+=sBx; R(A+3)=R(A) }
    ForPrep, // R(A)-=R(A+2); pc+=sBx

    // Generic for
    TForCall, // R(A+3), ... ,R(A+2+C) := R(A)(R(A+1), R(A+2))
    TForLoop, // if R(A+1) ~= nil then { R(A)=R(A+1); pc += sBx }

    SetList, // R(A)[(C-1)*FPF+i] := R(A+i), 1 <= i <= B

    Closure, // R(A) := closure(KPROTO[Bx])

    Vararg, // R(A), R(A+1), ..., R(A+B-2) = vararg

    ExtraArg, // extra (larger) argument for previous opcode
}

impl OpCode {
    const ALL: [OpCode; 47] = {
        use OpCode::*;
        [
            Move, LoadK, LoadKX, LoadBool, LoadNil, GetUpval, GetTabUp, GetTable, SetTabUp,
            SetUpval, SetTable, NewTable, Self_, Add, Sub, Mul, Mod, Pow, Div, IDiv, BAnd, BOr,
            BXor, Shl, Shr, Unm, BNot, Not, Len, Concat, Jmp, Eq, Lt, Le, Test, TestSet, Call,
            TailCall, Return, ForLoop, ForPrep, TForCall, TForLoop, SetList, Closure, Vararg,
            ExtraArg,
        ]
    };

    /// Decode an opcode byte; bytes past the last opcode are rejected
    #[inline(always)]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Get the instruction format mode for this opcode
    pub fn get_mode(self) -> OpMode {
        use OpCode::*;
        match self {
            LoadK | LoadKX | Closure => OpMode::IABx,
            Jmp | ForLoop | ForPrep | TForLoop => OpMode::IAsBx,
            ExtraArg => OpMode::IAx,
            _ => OpMode::IABC,
        }
    }

    /// Whether B and C may carry the constant flag (RK operands)
    pub fn uses_rk(self) -> bool {
        use OpCode::*;
        matches!(
            self,
            GetTabUp
                | GetTable
                | SetTabUp
                | SetTable
                | Self_
                | Add
                | Sub
                | Mul
                | Mod
                | Pow
                | Div
                | IDiv
                | BAnd
                | BOr
                | BXor
                | Shl
                | Shr
                | Eq
                | Lt
                | Le
        )
    }

    /// Instructions that read the dynamic top left by the previous instruction
    pub fn uses_top(self) -> bool {
        use OpCode::*;
        matches!(self, Call | TailCall | Return | SetList)
    }

    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            Move => "MOVE",
            LoadK => "LOADK",
            LoadKX => "LOADKX",
            LoadBool => "LOADBOOL",
            LoadNil => "LOADNIL",
            GetUpval => "GETUPVAL",
            GetTabUp => "GETTABUP",
            GetTable => "GETTABLE",
            SetTabUp => "SETTABUP",
            SetUpval => "SETUPVAL",
            SetTable => "SETTABLE",
            NewTable => "NEWTABLE",
            Self_ => "SELF",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Mod => "MOD",
            Pow => "POW",
            Div => "DIV",
            IDiv => "IDIV",
            BAnd => "BAND",
            BOr => "BOR",
            BXor => "BXOR",
            Shl => "SHL",
            Shr => "SHR",
            Unm => "UNM",
            BNot => "BNOT",
            Not => "NOT",
            Len => "LEN",
            Concat => "CONCAT",
            Jmp => "JMP",
            Eq => "EQ",
            Lt => "LT",
            Le => "LE",
            Test => "TEST",
            TestSet => "TESTSET",
            Call => "CALL",
            TailCall => "TAILCALL",
            Return => "RETURN",
            ForLoop => "FORLOOP",
            ForPrep => "FORPREP",
            TForCall => "TFORCALL",
            TForLoop => "TFORLOOP",
            SetList => "SETLIST",
            Closure => "CLOSURE",
            Vararg => "VARARG",
            ExtraArg => "EXTRAARG",
        }
    }
}
