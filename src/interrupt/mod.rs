pub mod int10;
pub mod int16;
pub mod int21;
