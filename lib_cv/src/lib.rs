pub mod calibration;
pub mod detection;
pub mod dictionary;
pub mod error;
pub mod pipeline;
pub mod preview;
pub mod table;
pub mod utils;
pub mod video;

pub use error::{Error, Result};
