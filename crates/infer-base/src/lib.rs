pub mod logging;
pub mod tensor;

pub use logging::{ConsoleLogger, init_console_logger};
pub use tensor::{DType, Element, Tensor, TensorError};

// Re-export log crate so downstream crates can use infer_base::log::*
pub use log;
