pub mod best;
pub mod eval;
pub mod norm_int;
pub mod session;
pub mod test_derivs;
pub mod worker;
