use std::collections::BTreeMap;
use std::sync::Arc;

use super::controller::{
    FormController, FormResult, FormSnapshot, read_lock, snapshot_of, write_lock,
};
use super::validation::{FieldLens, ValidationError};

pub(super) type WatchFn<T, E> = Arc<dyn Fn(&FormSnapshot<T, E>) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WatchHandle(u64);

pub(super) struct Watchers<T, E> {
    next: u64,
    handlers: BTreeMap<u64, WatchFn<T, E>>,
}

impl<T, E> Watchers<T, E> {
    pub(super) fn new() -> Self {
        Self {
            next: 1,
            handlers: BTreeMap::new(),
        }
    }
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    /// Subscribe to state changes. The handler runs synchronously with a
    /// fresh snapshot after every mutation and must not call back into the
    /// controller.
    pub fn watch(
        &self,
        handler: impl Fn(&FormSnapshot<T, E>) + Send + Sync + 'static,
    ) -> FormResult<WatchHandle> {
        let mut watchers = write_lock(&self.watchers, "registering watcher")?;
        let id = watchers.next;
        watchers.next += 1;
        watchers.handlers.insert(id, Arc::new(handler));
        Ok(WatchHandle(id))
    }

    pub fn unwatch(&self, handle: WatchHandle) -> FormResult<()> {
        let mut watchers = write_lock(&self.watchers, "removing watcher")?;
        watchers.handlers.remove(&handle.0);
        Ok(())
    }

    pub(super) fn notify_watchers(&self) -> FormResult<()> {
        let handlers = {
            let watchers = read_lock(&self.watchers, "reading watchers")?;
            if watchers.handlers.is_empty() {
                return Ok(());
            }
            watchers.handlers.values().cloned().collect::<Vec<_>>()
        };
        let snapshot = {
            let state = read_lock(&self.state, "snapshotting for watchers")?;
            snapshot_of(&state)
        };
        for handler in handlers {
            handler(&snapshot);
        }
        Ok(())
    }

    /// Error message for inline display. Quiet until the field was touched or
    /// a submit was attempted, so pristine forms do not light up red.
    pub fn field_error_for_display<L>(&self, lens: L) -> FormResult<Option<String>>
    where
        L: FieldLens<T>,
    {
        let state = read_lock(&self.state, "reading display error message")?;
        let Some(meta) = state.field_meta.get(&lens.key()) else {
            return Ok(None);
        };
        if !meta.touched && state.submit_count == 0 {
            return Ok(None);
        }
        Ok(meta.errors.first().map(|error| error.message().to_string()))
    }

    pub fn form_error_for_display(&self) -> FormResult<Option<String>> {
        let state = read_lock(&self.state, "reading form-level display error")?;
        Ok(state
            .form_error
            .as_ref()
            .map(|error| error.message().to_string()))
    }
}
