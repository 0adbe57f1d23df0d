use std::sync::Arc;

use napi::bindgen_prelude::*;
use napi_derive::napi;
use parking_lot::Mutex;

use crate::config::InflaterPoolConfig;
use crate::inflater::{Inflater, InflaterPool};

#[napi(js_name = "Inflater")]
pub struct JsInflater {
  // Emptied when the handle is released back to its pool.
  inner: Mutex<Option<Inflater>>,
}

impl JsInflater {
  fn with_inflater<R>(&self, f: impl FnOnce(&mut Inflater) -> R) -> Result<R> {
    let mut slot = self.inner.lock();
    match slot.as_mut() {
      Some(inflater) => Ok(f(inflater)),
      None => Err(Error::from_reason("Inflater was released")),
    }
  }
}

#[napi]
impl JsInflater {
  #[napi(getter)]
  pub fn id(&self) -> Result<i64> {
    self.with_inflater(|inflater| inflater.id() as i64)
  }

  #[napi(getter)]
  pub fn total_in(&self) -> Result<i64> {
    self.with_inflater(|inflater| inflater.total_in() as i64)
  }

  #[napi(getter)]
  pub fn total_out(&self) -> Result<i64> {
    self.with_inflater(|inflater| inflater.total_out() as i64)
  }

  #[napi(getter)]
  pub fn finished(&self) -> Result<bool> {
    self.with_inflater(|inflater| inflater.is_finished())
  }

  #[napi]
  pub fn inflate(&self, data: Buffer) -> Result<Buffer> {
    self
      .with_inflater(|inflater| inflater.inflate_all(&data))?
      .map(Buffer::from)
      .map_err(|e| Error::from_reason(e.to_string()))
  }
}

#[napi(js_name = "InflaterPool")]
pub struct JsInflaterPool {
  inner: Arc<InflaterPool>,
}

#[napi]
impl JsInflaterPool {
  #[napi(constructor)]
  pub fn new(capacity: i64, nowrap: Option<bool>) -> Self {
    let config = InflaterPoolConfig::new(capacity).nowrap(nowrap.unwrap_or(false));
    JsInflaterPool {
      inner: Arc::new(InflaterPool::from_config(config)),
    }
  }

  #[napi]
  pub fn acquire(&self) -> JsInflater {
    JsInflater {
      inner: Mutex::new(Some(self.inner.acquire())),
    }
  }

  #[napi]
  pub fn release(&self, inflater: Option<&JsInflater>) {
    // `null`, `undefined` and an already released handle are all no-ops.
    self
      .inner
      .release(inflater.and_then(|handle| handle.inner.lock().take()));
  }

  #[napi]
  pub async fn inflate(&self, data: Buffer) -> Result<Buffer> {
    let pool = self.inner.clone();
    let input = data.to_vec();

    let output = tokio::task::spawn_blocking(move || pool.inflate(&input))
      .await
      .map_err(|e| Error::from_reason(e.to_string()))?
      .map_err(|e| Error::from_reason(e.to_string()))?;

    Ok(output.into())
  }

  #[napi]
  pub fn idle_count(&self) -> u32 {
    self.inner.idle_count() as u32
  }

  #[napi(getter)]
  pub fn capacity(&self) -> i64 {
    self.inner.capacity().as_raw()
  }

  #[napi]
  pub fn clear(&self) -> u32 {
    self.inner.clear() as u32
  }
}
