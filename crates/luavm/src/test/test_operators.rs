// Arithmetic, bitwise, comparison, logical and string operators
use super::{int, new_vm, s};
use crate::lua_value::{ChunkBuilder, LuaTable, LuaValue};
use crate::{LuaError, LuaResult, LuaState, LuaVM, OpCode};

/// Global `name` bound to a fresh table whose metatable is `mt`
fn global_with_metatable(vm: &mut LuaVM, name: &str, mt: LuaTable) -> LuaValue {
    let t = vm.create_table(0, 0);
    let mt = LuaValue::table(mt);
    if let Some(table) = t.as_table() {
        table.borrow_mut().set_metatable(mt.as_table().cloned());
    }
    vm.set_global(name, t.clone());
    t
}

/// R(dst) = RK(lhs) <op> RK(rhs) as a boolean, the way comparisons are compiled
fn compare_into(b: &mut ChunkBuilder, op: OpCode, dst: u32, lhs: u32, rhs: u32) {
    b.abc(op, 1, lhs, rhs);
    b.asbx(OpCode::Jmp, 0, 1);
    b.abc(OpCode::LoadBool, dst, 0, 1);
    b.abc(OpCode::LoadBool, dst, 1, 0);
}

fn second_operand(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(2)?;
    l.push_value(value)?;
    Ok(1)
}

fn bnot_tag(l: &mut LuaState) -> LuaResult<usize> {
    l.push_value(LuaValue::string("bnot!"))?;
    Ok(1)
}

fn always_true(l: &mut LuaState) -> LuaResult<usize> {
    l.push_value(LuaValue::Boolean(true))?;
    Ok(1)
}

#[test]
fn test_arithmetic_opcodes() {
    let mut b = ChunkBuilder::new("=main");
    b.load_constant(0, int(7));
    b.load_constant(1, int(2));
    let neg7 = b.rk_constant(int(-7));
    let ten = b.rk_constant(int(10));
    let three = b.rk_constant(s("3"));
    b.abc(OpCode::Mul, 2, 0, 1);
    b.abc(OpCode::Mod, 3, 0, 1);
    b.abc(OpCode::Mod, 4, neg7, 1);
    b.abc(OpCode::Pow, 5, 1, ten);
    b.abc(OpCode::Div, 6, 0, 1);
    b.abc(OpCode::IDiv, 7, neg7, 1);
    b.abc(OpCode::Mul, 8, three, 1);
    b.abc(OpCode::Return, 2, 8, 0);

    let mut vm = new_vm();
    let results = vm.execute(b.build()).unwrap();
    assert_eq!(
        results,
        vec![
            int(14),
            int(1),
            int(1),
            int(1024),
            LuaValue::Number(3.5),
            int(-4),
            int(6),
        ]
    );
}

#[test]
fn test_bitwise_opcodes() {
    let mut b = ChunkBuilder::new("=main");
    b.load_constant(0, int(12));
    b.load_constant(1, int(10));
    let two = b.rk_constant(int(2));
    let eight = b.rk_constant(s("8"));
    let one = b.rk_constant(int(1));
    let minus_one = b.rk_constant(int(-1));
    b.abc(OpCode::BAnd, 2, 0, 1);
    b.abc(OpCode::BOr, 3, 0, 1);
    b.abc(OpCode::BXor, 4, 0, 1);
    b.abc(OpCode::Shl, 5, 0, two);
    b.abc(OpCode::Shr, 6, eight, one);
    b.abc(OpCode::BNot, 7, 0, 0);
    b.abc(OpCode::Shl, 8, 0, minus_one);
    b.abc(OpCode::Return, 2, 8, 0);

    let mut vm = new_vm();
    let results = vm.execute(b.build()).unwrap();
    assert_eq!(
        results,
        vec![int(8), int(14), int(6), int(48), int(4), int(-13), int(6)]
    );
}

#[test]
fn test_bitwise_operand_errors() {
    let mut vm = new_vm();

    let mut b = ChunkBuilder::new("=main");
    let half = b.rk_constant(LuaValue::Number(1.5));
    let one = b.rk_constant(int(1));
    b.abc(OpCode::BOr, 0, half, one);
    let err = vm.execute(b.build()).unwrap_err();
    assert!(matches!(err, LuaError::TypeError(_)));
    assert_eq!(err.to_string(), "main:1: number has no integer representation");

    let mut b = ChunkBuilder::new("=main");
    let word = b.rk_constant(s("abc"));
    let one = b.rk_constant(int(1));
    b.abc(OpCode::BAnd, 0, word, one);
    let err = vm.execute(b.build()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "main:1: attempt to perform bitwise operation on a string and a number"
    );

    let mut b = ChunkBuilder::new("=main");
    b.abc(OpCode::NewTable, 0, 0, 0);
    b.abc(OpCode::BNot, 1, 0, 0);
    let err = vm.execute(b.build()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "main:1: attempt to perform bitwise operation on a table value"
    );
}

#[test]
fn test_bitwise_metamethods() {
    let mut vm = new_vm();
    let mut mt = LuaTable::new(0, 4);
    mt.set_str("__band", vm.create_function("second_operand", second_operand));
    mt.set_str("__bor", vm.create_function("second_operand", second_operand));
    mt.set_str("__bxor", vm.create_function("second_operand", second_operand));
    mt.set_str("__bnot", vm.create_function("bnot_tag", bnot_tag));
    let t = global_with_metatable(&mut vm, "t", mt);

    // t & 5, 1 | t, 1.5 ~ t, ~t
    let mut b = ChunkBuilder::new("=main");
    let name = b.rk_constant(s("t"));
    let five = b.rk_constant(int(5));
    let one = b.rk_constant(int(1));
    let half = b.rk_constant(LuaValue::Number(1.5));
    b.abc(OpCode::GetTabUp, 0, 0, name);
    b.abc(OpCode::BAnd, 1, 0, five);
    b.abc(OpCode::BOr, 2, one, 0);
    b.abc(OpCode::BXor, 3, half, 0);
    b.abc(OpCode::BNot, 4, 0, 0);
    b.abc(OpCode::Return, 1, 5, 0);

    let results = vm.execute(b.build()).unwrap();
    assert_eq!(results, vec![int(5), t.clone(), t, s("bnot!")]);
}

#[test]
fn test_ordering_opcodes() {
    let mut b = ChunkBuilder::new("=main");
    let one = b.rk_constant(int(1));
    let two = b.rk_constant(int(2));
    let three = b.rk_constant(int(3));
    let sa = b.rk_constant(s("a"));
    let sb = b.rk_constant(s("b"));
    compare_into(&mut b, OpCode::Lt, 0, one, two);
    compare_into(&mut b, OpCode::Le, 1, two, two);
    compare_into(&mut b, OpCode::Lt, 2, sa, sb);
    compare_into(&mut b, OpCode::Lt, 3, three, two);
    compare_into(&mut b, OpCode::Le, 4, sb, sa);
    b.abc(OpCode::Return, 0, 6, 0);

    let mut vm = new_vm();
    let results = vm.execute(b.build()).unwrap();
    let t = LuaValue::Boolean(true);
    let f = LuaValue::Boolean(false);
    assert_eq!(results, vec![t.clone(), t.clone(), t, f.clone(), f]);
}

#[test]
fn test_ordering_ignores_lt_handler() {
    let mut vm = new_vm();
    let mut mt = LuaTable::new(0, 2);
    mt.set_str("__lt", vm.create_function("always_true", always_true));
    mt.set_str("__le", vm.create_function("always_true", always_true));
    global_with_metatable(&mut vm, "t", mt);

    let mut b = ChunkBuilder::new("=main");
    let name = b.rk_constant(s("t"));
    b.abc(OpCode::GetTabUp, 0, 0, name);
    compare_into(&mut b, OpCode::Lt, 1, 0, 0);
    let err = vm.execute(b.build()).unwrap_err();
    assert!(matches!(err, LuaError::TypeError(_)));
    assert_eq!(err.to_string(), "main:1: attempt to compare two table values");

    let mut b = ChunkBuilder::new("=main");
    let one = b.rk_constant(int(1));
    let two = b.rk_constant(s("2"));
    compare_into(&mut b, OpCode::Le, 0, one, two);
    let err = vm.execute(b.build()).unwrap_err();
    assert_eq!(err.to_string(), "main:1: attempt to compare number with string");
}

#[test]
fn test_not_test_and_testset() {
    let mut b = ChunkBuilder::new("=main");
    b.abc(OpCode::LoadNil, 10, 0, 0);
    b.load_constant(11, int(0));
    b.abc(OpCode::LoadBool, 12, 0, 0);

    // not nil, not 0
    b.abc(OpCode::Not, 0, 10, 0);
    b.abc(OpCode::Not, 1, 11, 0);
    // nil or "dflt", 0 or "dflt"
    b.abc(OpCode::TestSet, 2, 10, 1);
    b.asbx(OpCode::Jmp, 0, 1);
    b.load_constant(2, s("dflt"));
    b.abc(OpCode::TestSet, 3, 11, 1);
    b.asbx(OpCode::Jmp, 0, 1);
    b.load_constant(3, s("dflt"));
    // false and 1
    b.abc(OpCode::TestSet, 4, 12, 0);
    b.asbx(OpCode::Jmp, 0, 1);
    b.load_constant(4, int(1));
    // if 0 then ... end
    b.load_constant(5, s("else"));
    b.abc(OpCode::Test, 11, 0, 0);
    b.asbx(OpCode::Jmp, 0, 1);
    b.load_constant(5, s("then"));
    // if nil then ... end
    b.load_constant(6, s("kept"));
    b.abc(OpCode::Test, 10, 0, 0);
    b.asbx(OpCode::Jmp, 0, 1);
    b.load_constant(6, s("never"));
    b.abc(OpCode::Return, 0, 8, 0);

    let mut vm = new_vm();
    let results = vm.execute(b.build()).unwrap();
    assert_eq!(
        results,
        vec![
            LuaValue::Boolean(true),
            LuaValue::Boolean(false),
            s("dflt"),
            int(0),
            LuaValue::Boolean(false),
            s("then"),
            s("kept"),
        ]
    );
}

#[test]
fn test_concat() {
    let mut b = ChunkBuilder::new("=main");
    b.load_constant(0, s("a"));
    b.load_constant(1, int(1));
    b.load_constant(2, s("b"));
    b.load_constant(3, LuaValue::Number(2.5));
    b.abc(OpCode::Concat, 4, 0, 3);
    b.abc(OpCode::Return, 4, 2, 0);

    let mut vm = new_vm();
    assert_eq!(vm.execute(b.build()).unwrap(), vec![s("a1b2.5")]);

    let mut b = ChunkBuilder::new("=main");
    b.load_constant(0, s("a"));
    b.abc(OpCode::NewTable, 1, 0, 0);
    b.abc(OpCode::Concat, 2, 0, 1);
    let err = vm.execute(b.build()).unwrap_err();
    assert!(matches!(err, LuaError::TypeError(_)));
    assert_eq!(err.to_string(), "main:1: attempt to concatenate a table value");
}

#[test]
fn test_self_method_call() {
    // get = function(self) return self.name end, found through __index
    let mut getter = ChunkBuilder::new("=get").params(1);
    let field = getter.rk_constant(s("name"));
    getter.abc(OpCode::GetTable, 1, 0, field);
    getter.abc(OpCode::Return, 1, 2, 0);

    let mut vm = new_vm();
    let mut methods = LuaTable::new(0, 1);
    methods.set_str("get", vm.load(getter.build()));
    let mut mt = LuaTable::new(0, 1);
    mt.set_str("__index", LuaValue::table(methods));
    let obj = global_with_metatable(&mut vm, "obj", mt);
    if let Some(t) = obj.as_table() {
        t.borrow_mut().set_str("name", s("widget"));
    }

    // return obj:get()
    let mut b = ChunkBuilder::new("=main");
    let name = b.rk_constant(s("obj"));
    let method = b.rk_constant(s("get"));
    b.abc(OpCode::GetTabUp, 0, 0, name);
    b.abc(OpCode::Self_, 0, 0, method);
    b.abc(OpCode::Call, 0, 2, 2);
    b.abc(OpCode::Return, 0, 2, 0);

    assert_eq!(vm.execute(b.build()).unwrap(), vec![s("widget")]);
}

#[test]
fn test_settabup_and_loadkx() {
    let mut b = ChunkBuilder::new("=main");
    let name = b.rk_constant(s("answer"));
    let value = b.rk_constant(int(42));
    b.abc(OpCode::SetTabUp, 0, name, value);
    let far = b.constant(s("far"));
    b.abx(OpCode::LoadKX, 0, 0);
    b.ax(OpCode::ExtraArg, far);
    b.abc(OpCode::Return, 0, 2, 0);

    let mut vm = new_vm();
    assert_eq!(vm.execute(b.build()).unwrap(), vec![s("far")]);
    assert_eq!(vm.get_global("answer"), int(42));
}
