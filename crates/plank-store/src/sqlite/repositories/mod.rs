//! Row repositories — stateless, every method takes `&Connection`.

pub mod change_log;
pub mod object;
