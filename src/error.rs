use thiserror::Error;

#[derive(Debug, Error)]
pub enum InflateError {
  #[error("corrupt deflate stream: {0}")]
  Corrupt(#[from] flate2::DecompressError),

  #[error("deflate stream truncated after {consumed} input bytes")]
  Truncated { consumed: usize },

  #[error("inflater already reached the end of a stream; reset it before reuse")]
  Finished,
}
