use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("PLY header is missing or malformed: {0}")]
    Header(String),

    #[error("unsupported PLY format: {0}")]
    Format(String),

    #[error("PLY body holds {actual} bytes, expected {expected} for {count} vertices")]
    Truncated {
        count: usize,
        expected: usize,
        actual: usize,
    },

    #[error("point cloud is empty")]
    Empty,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
