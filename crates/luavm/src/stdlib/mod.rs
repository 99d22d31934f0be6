// Standard libraries: base functions, coroutine, table and math

pub mod basic;
pub mod coroutine;
pub mod math;
pub mod table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stdlib {
    Basic,
    Coroutine,
    Table,
    Math,

    All,
}
