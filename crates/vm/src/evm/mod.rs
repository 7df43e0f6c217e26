//! EVM-class stack machine.

mod gas;
pub use gas::GasTable;

mod interpreter;

mod memory;

pub(crate) mod opcode;

mod precompiles;
pub(crate) use precompiles::Precompile;

mod stack;

/// Stack machine attached to a [`Machine`](crate::Machine).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StackVm {
    table: GasTable,
}

impl StackVm {
    /// Stack machine charging `table`.
    pub const fn new(table: GasTable) -> Self {
        Self { table }
    }

    /// Gas table in use.
    pub const fn gas_table(&self) -> GasTable {
        self.table
    }
}
