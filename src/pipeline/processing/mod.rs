pub mod extract;
pub mod fusion;
pub mod gaps;
pub mod quality;
