pub mod legacy;
pub mod v1;
