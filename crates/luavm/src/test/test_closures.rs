// Upvalue capture, sharing and closing
use super::{int, new_vm};
use crate::OpCode;
use crate::lua_value::{Chunk, ChunkBuilder};

/// function() return <upvalue 0> end, capturing the enclosing register `reg`
fn getter(reg: u32) -> Chunk {
    let mut f = ChunkBuilder::new("=get");
    f.upvalue("x", true, reg);
    f.abc(OpCode::GetUpval, 0, 0, 0);
    f.abc(OpCode::Return, 0, 2, 0);
    f.build()
}

/// function(v) <upvalue 0> = v end, capturing the enclosing register `reg`
fn setter(reg: u32) -> Chunk {
    let mut f = ChunkBuilder::new("=set").params(1);
    f.upvalue("x", true, reg);
    f.abc(OpCode::SetUpval, 0, 0, 0);
    f.abc(OpCode::Return, 0, 1, 0);
    f.build()
}

#[test]
fn test_open_upvalue_aliases_local() {
    // local x = 1; local f = function() return x end; x = 2; return f()
    let mut b = ChunkBuilder::new("=main");
    b.load_constant(0, int(1));
    let child = b.child(getter(0));
    b.abx(OpCode::Closure, 1, child);
    b.load_constant(0, int(2));
    b.abc(OpCode::Move, 2, 1, 0);
    b.abc(OpCode::Call, 2, 1, 2);
    b.abc(OpCode::Return, 2, 2, 0);

    let mut vm = new_vm();
    assert_eq!(vm.execute(b.build()).unwrap(), vec![int(2)]);
}

#[test]
fn test_siblings_share_until_scope_closes() {
    // do
    //   local x = 10
    //   local get = function() return x end
    //   local set = function(v) x = v end
    //   set(20)
    //   a, b = get(), x
    // end            -- closes x
    // local y = 99   -- reuses x's register
    // return a, b, get()
    let mut b = ChunkBuilder::new("=main");
    b.load_constant(0, int(10));
    let get = b.child(getter(0));
    let set = b.child(setter(0));
    b.abx(OpCode::Closure, 1, get);
    b.abx(OpCode::Closure, 2, set);
    // set(20)
    b.abc(OpCode::Move, 3, 2, 0);
    b.load_constant(4, int(20));
    b.abc(OpCode::Call, 3, 2, 1);
    // R3 = get(); R4 = x
    b.abc(OpCode::Move, 3, 1, 0);
    b.abc(OpCode::Call, 3, 1, 2);
    b.abc(OpCode::Move, 4, 0, 0);
    // leave the block: close upvalues from R0
    b.asbx(OpCode::Jmp, 1, 0);
    b.load_constant(0, int(99));
    // R5 = get()
    b.abc(OpCode::Move, 5, 1, 0);
    b.abc(OpCode::Call, 5, 1, 2);
    b.abc(OpCode::Return, 3, 4, 0);

    let mut vm = new_vm();
    assert_eq!(
        vm.execute(b.build()).unwrap(),
        vec![int(20), int(20), int(20)]
    );
}

#[test]
fn test_each_activation_gets_its_own_cell() {
    // local function make() local x = 0; return function(v) x = v end, function() return x end end
    // local set1, get1 = make(); local set2, get2 = make()
    // set1(5); return get1(), get2()
    let mut make = ChunkBuilder::new("=make");
    make.load_constant(0, int(0));
    let set = make.child(setter(0));
    let get = make.child(getter(0));
    make.abx(OpCode::Closure, 1, set);
    make.abx(OpCode::Closure, 2, get);
    make.abc(OpCode::Return, 1, 3, 0);

    let mut b = ChunkBuilder::new("=main");
    let child = b.child(make.build());
    b.abx(OpCode::Closure, 0, child);
    b.abc(OpCode::Move, 1, 0, 0);
    b.abc(OpCode::Call, 1, 1, 3);
    b.abc(OpCode::Move, 3, 0, 0);
    b.abc(OpCode::Call, 3, 1, 3);
    // set1(5)
    b.abc(OpCode::Move, 5, 1, 0);
    b.load_constant(6, int(5));
    b.abc(OpCode::Call, 5, 2, 1);
    // get1(), get2()
    b.abc(OpCode::Move, 5, 2, 0);
    b.abc(OpCode::Call, 5, 1, 2);
    b.abc(OpCode::Move, 6, 4, 0);
    b.abc(OpCode::Call, 6, 1, 2);
    b.abc(OpCode::Return, 5, 3, 0);

    let mut vm = new_vm();
    assert_eq!(vm.execute(b.build()).unwrap(), vec![int(5), int(0)]);
}

#[test]
fn test_transitive_capture() {
    // local x = 3
    // local outer = function() return function() return x end end
    // x = 4
    // return outer()()
    let mut inner = ChunkBuilder::new("=inner");
    inner.upvalue("x", false, 0);
    inner.abc(OpCode::GetUpval, 0, 0, 0);
    inner.abc(OpCode::Return, 0, 2, 0);

    let mut outer = ChunkBuilder::new("=outer");
    outer.upvalue("x", true, 0);
    let child = outer.child(inner.build());
    outer.abx(OpCode::Closure, 0, child);
    outer.abc(OpCode::Return, 0, 2, 0);

    let mut b = ChunkBuilder::new("=main");
    b.load_constant(0, int(3));
    let child = b.child(outer.build());
    b.abx(OpCode::Closure, 1, child);
    b.load_constant(0, int(4));
    b.abc(OpCode::Move, 2, 1, 0);
    b.abc(OpCode::Call, 2, 1, 2);
    b.abc(OpCode::Call, 2, 1, 2);
    b.abc(OpCode::Return, 2, 2, 0);

    let mut vm = new_vm();
    assert_eq!(vm.execute(b.build()).unwrap(), vec![int(4)]);
}

#[test]
fn test_closure_outlives_frame() {
    // local function counter() local n = 0; return function() n = n + 1; return n end end
    // local c = counter(); c(); return c()
    let mut inc = ChunkBuilder::new("=inc");
    inc.upvalue("n", true, 0);
    let one = inc.rk_constant(int(1));
    inc.abc(OpCode::GetUpval, 0, 0, 0);
    inc.abc(OpCode::Add, 0, 0, one);
    inc.abc(OpCode::SetUpval, 0, 0, 0);
    inc.abc(OpCode::Return, 0, 2, 0);

    let mut counter = ChunkBuilder::new("=counter");
    counter.load_constant(0, int(0));
    let child = counter.child(inc.build());
    counter.abx(OpCode::Closure, 1, child);
    counter.abc(OpCode::Return, 1, 2, 0);

    let mut b = ChunkBuilder::new("=main");
    let child = b.child(counter.build());
    b.abx(OpCode::Closure, 0, child);
    b.abc(OpCode::Call, 0, 1, 2);
    b.abc(OpCode::Move, 1, 0, 0);
    b.abc(OpCode::Call, 1, 1, 1);
    b.abc(OpCode::Move, 1, 0, 0);
    b.abc(OpCode::Call, 1, 1, 2);
    b.abc(OpCode::Return, 1, 2, 0);

    let mut vm = new_vm();
    assert_eq!(vm.execute(b.build()).unwrap(), vec![int(2)]);
    assert_eq!(vm.main_thread().borrow().open_upvalue_count(), 0);
}
