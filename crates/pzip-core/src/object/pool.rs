use std::fs::Metadata;
use std::path::Path;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use super::Object;
use crate::compress::CompressorFactory;
use crate::error::Result;

/// Free list of [`Object`]s, so the 2 MiB staging buffer and the
/// compressor state survive across entries instead of being
/// reallocated per file.
///
/// Backed by a bounded recycler channel: acquire pops a recycled
/// object or builds a fresh one, release pushes it back and drops the
/// excess when the pool is full. Safe to share across workers.
#[derive(Debug)]
pub struct ObjectPool {
    recycler: Sender<Object>,
    receiver: Receiver<Object>,
    buf_size: usize,
}

impl ObjectPool {
    /// `buf_size` is the per-object in-memory capacity; `max_objects`
    /// bounds how many idle objects the pool retains.
    pub fn new(buf_size: usize, max_objects: usize) -> Self {
        let (tx, rx) = bounded(max_objects);
        Self {
            recycler: tx,
            receiver: rx,
            buf_size,
        }
    }

    /// Takes an object and re-arms it for the given entry.
    pub fn acquire(
        &self,
        path: &Path,
        meta: Metadata,
        level: i32,
        root: &Path,
        factory: &CompressorFactory,
    ) -> Result<Object> {
        let mut object = match self.receiver.try_recv() {
            Ok(object) => object,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                Object::new(self.buf_size)
            }
        };
        object.reset(path, meta, level, root, factory)?;
        Ok(object)
    }

    /// Returns an object to the pool. Its overflow file is released
    /// first; a full pool simply drops the object.
    pub fn release(&self, mut object: Object) {
        object.close();
        if let Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) =
            self.recycler.try_send(object)
        {
            // Dropped; the next acquire allocates a fresh one.
        }
    }
}
