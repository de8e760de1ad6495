pub mod cleanup;
pub mod generate;
pub mod status;
