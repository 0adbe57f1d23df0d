use std::num::NonZeroUsize;

/// Default number of idle inflaters retained by an [`InflaterPoolConfig`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// Retention policy of a pool.
///
/// The signed integer form is kept for callers that configure pools from
/// untyped sources (JS, CLI flags): `0` disables pooling, a negative value
/// removes the upper bound and a positive value caps the idle set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capacity {
  /// Nothing is retained; every release destroys its instance.
  Disabled,
  /// Every released instance is retained.
  Unbounded,
  /// At most this many idle instances are retained.
  Bounded(NonZeroUsize),
}

impl Capacity {
  pub fn bounded(max_idle: usize) -> Self {
    match NonZeroUsize::new(max_idle) {
      Some(n) => Capacity::Bounded(n),
      None => Capacity::Disabled,
    }
  }

  /// Signed integer form, the inverse of `Capacity::from(i64)`.
  pub fn as_raw(&self) -> i64 {
    match self {
      Capacity::Disabled => 0,
      Capacity::Unbounded => -1,
      Capacity::Bounded(n) => i64::try_from(n.get()).unwrap_or(i64::MAX),
    }
  }
}

impl From<i64> for Capacity {
  fn from(raw: i64) -> Self {
    match raw {
      0 => Capacity::Disabled,
      r if r < 0 => Capacity::Unbounded,
      r => Capacity::bounded(usize::try_from(r).unwrap_or(usize::MAX)),
    }
  }
}

impl From<i32> for Capacity {
  fn from(raw: i32) -> Self {
    Capacity::from(i64::from(raw))
  }
}

impl Default for Capacity {
  fn default() -> Self {
    Capacity::bounded(DEFAULT_CAPACITY)
  }
}

/// Construction parameters of an inflater pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InflaterPoolConfig {
  pub capacity: Capacity,
  /// Inflate raw deflate data (no zlib header or trailer).
  pub nowrap: bool,
}

impl InflaterPoolConfig {
  pub fn new(capacity: impl Into<Capacity>) -> Self {
    Self {
      capacity: capacity.into(),
      nowrap: false,
    }
  }

  pub fn capacity(mut self, capacity: impl Into<Capacity>) -> Self {
    self.capacity = capacity.into();
    self
  }

  pub fn nowrap(mut self, nowrap: bool) -> Self {
    self.nowrap = nowrap;
    self
  }
}
