pub mod common_utils;
pub mod disent;
