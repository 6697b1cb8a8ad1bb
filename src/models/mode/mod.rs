pub mod mode_model;
