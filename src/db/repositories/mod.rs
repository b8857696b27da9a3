pub mod sellers;
pub mod visits;
