pub mod math;

pub use math::{abs_delta, p32, P32};
