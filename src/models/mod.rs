pub mod approval;
pub mod policy;
pub mod tool;
