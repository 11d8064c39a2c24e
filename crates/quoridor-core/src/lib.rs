pub mod move_gate;
pub mod protocol;
pub mod turn;
