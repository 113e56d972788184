//! Communication and record-routing algorithms.

pub mod communicator;
pub mod crystal;
pub mod exchange;
pub mod tuple_list;
pub mod wire;

pub use crystal::CrystalRouter;
pub use tuple_list::TupleList;
