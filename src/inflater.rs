//! Pooled zlib/deflate decompressors.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::{Decompress, FlushDecompress, Status};
use tracing::trace;

use crate::config::{Capacity, InflaterPoolConfig};
use crate::error::InflateError;
use crate::pool::{ResourcePool, Reusable};

const CHUNK: usize = 16 * 1024;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Outcome of a single [`Inflater::inflate`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
  pub consumed: usize,
  pub produced: usize,
  /// The end-of-stream marker was reached.
  pub finished: bool,
}

/// A stateful deflate decompressor.
///
/// With `nowrap` set the input is raw deflate data, otherwise a zlib header
/// and adler32 trailer are expected around it.
pub struct Inflater {
  id: u64,
  nowrap: bool,
  finished: bool,
  inner: Decompress,
}

impl Inflater {
  pub fn new(nowrap: bool) -> Self {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    trace!(id, nowrap, "inflater created");
    Self {
      id,
      nowrap,
      finished: false,
      inner: Decompress::new(!nowrap),
    }
  }

  /// Process-unique id, stable across resets.
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn nowrap(&self) -> bool {
    self.nowrap
  }

  pub fn total_in(&self) -> u64 {
    self.inner.total_in()
  }

  pub fn total_out(&self) -> u64 {
    self.inner.total_out()
  }

  pub fn is_finished(&self) -> bool {
    self.finished
  }

  /// Runs one decompression step, appending into the spare capacity of
  /// `output`. Nothing is written when `output` has no spare capacity.
  pub fn inflate(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<Progress, InflateError> {
    if self.finished {
      return Err(InflateError::Finished);
    }

    let (in_before, out_before) = (self.inner.total_in(), self.inner.total_out());
    let status = self
      .inner
      .decompress_vec(input, output, FlushDecompress::None)?;
    self.finished = matches!(status, Status::StreamEnd);

    Ok(Progress {
      consumed: (self.inner.total_in() - in_before) as usize,
      produced: (self.inner.total_out() - out_before) as usize,
      finished: self.finished,
    })
  }

  /// Inflates one complete stream.
  pub fn inflate_all(&mut self, input: &[u8]) -> Result<Vec<u8>, InflateError> {
    let mut output = Vec::with_capacity(input.len().saturating_mul(2).max(CHUNK));
    let mut consumed = 0;

    loop {
      if output.capacity() - output.len() < CHUNK {
        output.reserve(CHUNK);
      }
      let step = self.inflate(&input[consumed..], &mut output)?;
      consumed += step.consumed;

      if step.finished {
        return Ok(output);
      }
      if step.consumed == 0 && step.produced == 0 {
        return Err(InflateError::Truncated { consumed });
      }
    }
  }
}

impl Reusable for Inflater {
  fn reset(&mut self) {
    self.inner.reset(!self.nowrap);
    self.finished = false;
    trace!(id = self.id, "inflater reset");
  }

  fn destroy(self) {
    trace!(id = self.id, total_in = self.total_in(), "inflater destroyed");
  }
}

impl fmt::Debug for Inflater {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Inflater")
      .field("id", &self.id)
      .field("nowrap", &self.nowrap)
      .field("finished", &self.finished)
      .field("total_in", &self.total_in())
      .field("total_out", &self.total_out())
      .finish()
  }
}

pub type InflaterPool = ResourcePool<Inflater>;

impl ResourcePool<Inflater> {
  pub fn from_config(config: InflaterPoolConfig) -> Self {
    let nowrap = config.nowrap;
    ResourcePool::new(config.capacity, move || Inflater::new(nowrap))
  }

  pub fn with_capacity(capacity: impl Into<Capacity>, nowrap: bool) -> Self {
    Self::from_config(InflaterPoolConfig::new(capacity).nowrap(nowrap))
  }

  /// Inflates a complete stream with a pooled inflater.
  pub fn inflate(&self, input: &[u8]) -> Result<Vec<u8>, InflateError> {
    self.acquire_guard().inflate_all(input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use flate2::write::{DeflateEncoder, ZlibEncoder};
  use flate2::Compression;
  use std::io::Write;

  fn payload() -> Vec<u8> {
    (0..20_000u32)
      .flat_map(|i| format!("line {} of the payload\n", i % 97).into_bytes())
      .collect()
  }

  fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
  }

  fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
  }

  #[test]
  fn test_inflate_zlib() {
    let pool = InflaterPool::with_capacity(2i64, false);
    let data = payload();
    assert_eq!(pool.inflate(&zlib(&data)).unwrap(), data);
    assert_eq!(pool.idle_count(), 1);
  }

  #[test]
  fn test_inflate_raw_deflate() {
    let pool = InflaterPool::from_config(InflaterPoolConfig::new(-1i64).nowrap(true));
    let data = payload();
    let inflater = pool.acquire();
    assert!(inflater.nowrap());
    pool.release(inflater);
    assert_eq!(pool.inflate(&deflate(&data)).unwrap(), data);
  }

  #[test]
  fn test_corrupt_input() {
    let mut inflater = Inflater::new(false);
    let err = inflater.inflate_all(b"not a zlib stream at all").unwrap_err();
    assert!(matches!(err, InflateError::Corrupt(_)));
  }

  #[test]
  fn test_truncated_input() {
    let compressed = zlib(&payload());
    let mut inflater = Inflater::new(false);
    let half = &compressed[..compressed.len() / 2];
    match inflater.inflate_all(half) {
      Err(InflateError::Truncated { consumed }) => assert!(consumed > 0 && consumed <= half.len()),
      other => panic!("expected truncation, got {:?}", other),
    }
    assert!(!inflater.is_finished());
  }

  #[test]
  fn test_finished_requires_reset() {
    let compressed = zlib(b"hello");
    let mut inflater = Inflater::new(false);
    assert_eq!(inflater.inflate_all(&compressed).unwrap(), b"hello");
    assert!(inflater.is_finished());
    assert!(matches!(
      inflater.inflate_all(&compressed),
      Err(InflateError::Finished)
    ));

    inflater.reset();
    assert_eq!(inflater.total_in(), 0);
    assert_eq!(inflater.inflate_all(&compressed).unwrap(), b"hello");
  }

  #[test]
  fn test_streaming_steps() {
    let data = payload();
    let compressed = zlib(&data);
    let mut inflater = Inflater::new(false);
    let mut output = Vec::new();

    'outer: for piece in compressed.chunks(7) {
      let mut offset = 0;
      while offset < piece.len() {
        output.reserve(CHUNK);
        let step = inflater.inflate(&piece[offset..], &mut output).unwrap();
        offset += step.consumed;
        if step.finished {
          break 'outer;
        }
      }
    }

    assert!(inflater.is_finished());
    assert_eq!(output, data);
    assert_eq!(inflater.total_in(), compressed.len() as u64);
    assert_eq!(inflater.total_out(), data.len() as u64);
  }

  #[test]
  fn test_released_inflater_comes_back_clean() {
    let pool = InflaterPool::with_capacity(1i64, false);
    let data = payload();
    let compressed = zlib(&data);

    let mut inflater = pool.acquire();
    let id = inflater.id();
    assert!(inflater.inflate_all(&compressed[..100]).is_err());
    pool.release(inflater);

    let mut inflater = pool.acquire();
    assert_eq!(inflater.id(), id);
    assert_eq!(inflater.total_in(), 0);
    assert_eq!(inflater.total_out(), 0);
    assert_eq!(inflater.inflate_all(&compressed).unwrap(), data);
  }

  #[test]
  fn test_bounded_pool_destroys_overflow() {
    let pool = InflaterPool::with_capacity(2i64, false);
    let a = pool.acquire();
    let b = pool.acquire();
    let c = pool.acquire();
    let (a_id, b_id, c_id) = (a.id(), b.id(), c.id());
    assert!(a_id != b_id && b_id != c_id && a_id != c_id);

    pool.release(a);
    pool.release(b);
    pool.release(c);
    assert_eq!(pool.idle_count(), 2);

    let first = pool.acquire().id();
    let second = pool.acquire().id();
    let third = pool.acquire().id();
    assert!([a_id, b_id].contains(&first));
    assert!([a_id, b_id].contains(&second));
    assert!(![a_id, b_id, c_id].contains(&third));
  }

  #[test]
  fn test_disabled_pool_builds_every_time() {
    let pool = InflaterPool::with_capacity(0i64, false);
    let first = pool.acquire();
    let first_id = first.id();
    pool.release(first);
    assert_ne!(pool.acquire().id(), first_id);
    assert_eq!(pool.idle_count(), 0);
  }

  #[test]
  fn test_shared_pool_across_threads() {
    let pool = InflaterPool::with_capacity(3i64, false);
    let data = payload();
    let compressed = zlib(&data);

    std::thread::scope(|s| {
      for _ in 0..6 {
        s.spawn(|| {
          for _ in 0..10 {
            assert_eq!(pool.inflate(&compressed).unwrap(), data);
            assert!(pool.idle_count() <= 3);
          }
        });
      }
    });
    assert!(pool.idle_count() <= 3);
  }
}
