pub mod config;
pub mod error;
pub mod finder;
pub mod logging;
pub mod upload;

pub use error::{AppError, Result};
pub use upload::{Canceller, TransferHandle, UploadRequest, Uploader};
