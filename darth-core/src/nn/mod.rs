pub mod activations;
pub mod linear;
pub mod losses;
