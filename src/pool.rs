use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;
use tracing::{debug, trace};

use crate::config::Capacity;

/// A stateful object that is worth keeping around between uses.
pub trait Reusable: Send {
  /// Return to the state of a freshly constructed instance.
  ///
  /// Should not panic. If it does, the instance is dropped without `destroy`
  /// and its reserved idle slot is handed back.
  fn reset(&mut self);

  /// Release the instance for good. Called instead of `reset` when the pool
  /// will not retain it.
  fn destroy(self)
  where
    Self: Sized,
  {
    drop(self);
  }
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

enum Retention<T> {
  Disabled,
  Unbounded {
    idle: SegQueue<T>,
  },
  Bounded {
    idle: SegQueue<T>,
    // Reserved before a push and released after a pop, so it never lags
    // behind the number of queued items.
    idle_count: AtomicUsize,
    max_idle: usize,
  },
}

/// Lock-free pool of reusable resources.
///
/// `acquire` never blocks: it hands out an idle instance when one is
/// available and builds a new one otherwise. `release` either resets the
/// instance and keeps it, or destroys it when pooling is disabled or the
/// idle set is already at capacity.
pub struct ResourcePool<T: Reusable> {
  retention: Retention<T>,
  factory: Factory<T>,
}

impl<T: Reusable> ResourcePool<T> {
  /// Builds a pool whose fresh instances come from `factory`.
  ///
  /// A panic inside `factory` propagates out of [`acquire`](Self::acquire);
  /// the pool does not catch or retry it.
  pub fn new<F>(capacity: impl Into<Capacity>, factory: F) -> Self
  where
    F: Fn() -> T + Send + Sync + 'static,
  {
    let retention = match capacity.into() {
      Capacity::Disabled => Retention::Disabled,
      Capacity::Unbounded => Retention::Unbounded {
        idle: SegQueue::new(),
      },
      Capacity::Bounded(max_idle) => Retention::Bounded {
        idle: SegQueue::new(),
        idle_count: AtomicUsize::new(0),
        max_idle: max_idle.get(),
      },
    };
    Self {
      retention,
      factory: Box::new(factory),
    }
  }

  pub fn capacity(&self) -> Capacity {
    match &self.retention {
      Retention::Disabled => Capacity::Disabled,
      Retention::Unbounded { .. } => Capacity::Unbounded,
      Retention::Bounded { max_idle, .. } => Capacity::bounded(*max_idle),
    }
  }

  /// Number of idle instances currently retained.
  ///
  /// In bounded mode this is the admission counter, which may briefly run
  /// ahead of the queue while a release is between reserving and pushing.
  pub fn idle_count(&self) -> usize {
    match &self.retention {
      Retention::Disabled => 0,
      Retention::Unbounded { idle } => idle.len(),
      Retention::Bounded { idle_count, .. } => idle_count.load(Ordering::Acquire),
    }
  }

  pub fn acquire(&self) -> T {
    match self.take_idle() {
      Some(resource) => {
        trace!("reusing idle resource");
        resource
      }
      None => self.create(),
    }
  }

  /// Like [`acquire`](Self::acquire), but the resource goes back to the pool
  /// when the guard is dropped.
  pub fn acquire_guard(&self) -> Pooled<'_, T> {
    Pooled {
      pool: self,
      resource: Some(self.acquire()),
    }
  }

  /// Hands a resource back. `None` is ignored.
  pub fn release(&self, resource: impl Into<Option<T>>) {
    let Some(mut resource) = resource.into() else {
      return;
    };

    match &self.retention {
      Retention::Disabled => resource.destroy(),
      Retention::Unbounded { idle } => {
        resource.reset();
        idle.push(resource);
      }
      Retention::Bounded {
        idle,
        idle_count,
        max_idle,
      } => {
        // Admit-or-reject: claim a slot with a CAS loop before the instance
        // becomes visible to `acquire`.
        let reserved = idle_count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| {
          if d < *max_idle {
            Some(d + 1)
          } else {
            None
          }
        });
        match reserved {
          Ok(_) => {
            let slot = Reservation { idle_count };
            resource.reset();
            idle.push(resource);
            slot.commit();
          }
          Err(idle_now) => {
            debug!(
              idle = idle_now,
              capacity = *max_idle,
              "pool full, destroying released resource"
            );
            resource.destroy();
          }
        }
      }
    }
  }

  /// Destroys every idle instance. Returns how many were destroyed.
  pub fn clear(&self) -> usize {
    let mut destroyed = 0;
    while let Some(resource) = self.take_idle() {
      resource.destroy();
      destroyed += 1;
    }
    destroyed
  }

  fn take_idle(&self) -> Option<T> {
    match &self.retention {
      Retention::Disabled => None,
      Retention::Unbounded { idle } => idle.pop(),
      Retention::Bounded {
        idle, idle_count, ..
      } => {
        let resource = idle.pop()?;
        idle_count.fetch_sub(1, Ordering::AcqRel);
        Some(resource)
      }
    }
  }

  fn create(&self) -> T {
    let resource = (self.factory)();
    trace!(capacity = self.capacity().as_raw(), "created resource");
    resource
  }

  #[cfg(test)]
  fn queued(&self) -> usize {
    match &self.retention {
      Retention::Disabled => 0,
      Retention::Unbounded { idle } | Retention::Bounded { idle, .. } => idle.len(),
    }
  }
}

/// An admitted idle slot. Dropping it before `commit` gives the slot back.
struct Reservation<'a> {
  idle_count: &'a AtomicUsize,
}

impl Reservation<'_> {
  fn commit(self) {
    std::mem::forget(self);
  }
}

impl Drop for Reservation<'_> {
  fn drop(&mut self) {
    self.idle_count.fetch_sub(1, Ordering::AcqRel);
  }
}

impl<T: Reusable> Drop for ResourcePool<T> {
  fn drop(&mut self) {
    let destroyed = self.clear();
    if destroyed > 0 {
      debug!(destroyed, "pool dropped, destroyed idle resources");
    }
  }
}

impl<T: Reusable> fmt::Debug for ResourcePool<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourcePool")
      .field("capacity", &self.capacity())
      .field("idle_count", &self.idle_count())
      .finish_non_exhaustive()
  }
}

/// A resource on loan from a [`ResourcePool`]; released on drop.
pub struct Pooled<'a, T: Reusable> {
  pool: &'a ResourcePool<T>,
  resource: Option<T>,
}

impl<T: Reusable> Pooled<'_, T> {
  /// Keeps the resource instead of returning it to the pool.
  pub fn into_inner(mut self) -> T {
    self
      .resource
      .take()
      .expect("pooled resource is present until drop")
  }
}

impl<T: Reusable> Deref for Pooled<'_, T> {
  type Target = T;

  fn deref(&self) -> &T {
    self
      .resource
      .as_ref()
      .expect("pooled resource is present until drop")
  }
}

impl<T: Reusable> DerefMut for Pooled<'_, T> {
  fn deref_mut(&mut self) -> &mut T {
    self
      .resource
      .as_mut()
      .expect("pooled resource is present until drop")
  }
}

impl<T: Reusable> Drop for Pooled<'_, T> {
  fn drop(&mut self) {
    self.pool.release(self.resource.take());
  }
}
