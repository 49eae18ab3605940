use core::error::Error;

#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    #[display("Server error: {message}")]
    ServerError { message: String },
}

impl Error for ApiError {}
