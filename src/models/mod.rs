pub mod distributions;
pub mod mode;
pub mod model_base;
