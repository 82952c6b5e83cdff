pub mod atomic;
pub mod index;
