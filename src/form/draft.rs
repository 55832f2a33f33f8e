use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};

use super::controller::{
    FormController, FormError, FormId, FormResult, SubmitState, read_lock, write_lock,
};
use super::validation::ValidationError;

/// Keeps a half-filled form across unmount/remount within a session. Stores
/// are keyed by `FormId`; nothing here is durable.
pub trait DraftStore<T>: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn save(&self, form_id: FormId, model: &T) -> Result<(), Self::Error>;
    fn load(&self, form_id: FormId) -> Result<Option<T>, Self::Error>;
    fn clear(&self, form_id: FormId) -> Result<(), Self::Error>;
}

#[derive(Clone)]
pub struct MemoryDraftStore<T> {
    drafts: Arc<RwLock<BTreeMap<FormId, T>>>,
}

impl<T> MemoryDraftStore<T> {
    pub fn new() -> Self {
        Self {
            drafts: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<T> Default for MemoryDraftStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DraftStore<T> for MemoryDraftStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Error = Infallible;

    fn save(&self, form_id: FormId, model: &T) -> Result<(), Self::Error> {
        let mut drafts = match self.drafts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        drafts.insert(form_id, model.clone());
        Ok(())
    }

    fn load(&self, form_id: FormId) -> Result<Option<T>, Self::Error> {
        let drafts = match self.drafts.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(drafts.get(&form_id).cloned())
    }

    fn clear(&self, form_id: FormId) -> Result<(), Self::Error> {
        let mut drafts = match self.drafts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        drafts.remove(&form_id);
        Ok(())
    }
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub fn save_draft<S>(&self, store: &S) -> FormResult<()>
    where
        S: DraftStore<T>,
    {
        let state = read_lock(&self.state, "saving draft")?;
        store
            .save(state.id, &state.model)
            .map_err(|error| FormError::DraftSaveFailed(error.to_string()))
    }

    /// Replace the model with a stored draft. Every schema field is marked
    /// dirty since the draft may differ from the initial model anywhere.
    pub fn load_draft<S>(&self, store: &S) -> FormResult<bool>
    where
        S: DraftStore<T>,
    {
        let form_id = self.form_id()?;
        let Some(draft) = store
            .load(form_id)
            .map_err(|error| FormError::DraftLoadFailed(error.to_string()))?
        else {
            return Ok(false);
        };

        let mut known_keys = self.validators.field_keys();
        {
            let mut state = write_lock(&self.state, "loading draft into form")?;
            known_keys.extend(state.field_meta.keys().copied());
            state.model = draft;
            state.submit_state = SubmitState::Idle;
            state.submit_count = 0;
            state.tickets.clear();
            state.first_error = None;
            state.form_error = None;
            state.dirty_fields = known_keys;
            for key in state.dirty_fields.clone() {
                let meta = state.ensure_meta(key);
                meta.dirty = true;
                meta.validating = false;
                meta.errors.clear();
            }
        }
        self.notify_watchers()?;
        Ok(true)
    }

    pub fn clear_draft<S>(&self, store: &S) -> FormResult<()>
    where
        S: DraftStore<T>,
    {
        let form_id = self.form_id()?;
        store
            .clear(form_id)
            .map_err(|error| FormError::DraftClearFailed(error.to_string()))
    }
}
