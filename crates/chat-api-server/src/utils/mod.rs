pub mod error;
pub mod similarity;

pub use error::ApiError;
pub use similarity::cosine_similarity;
