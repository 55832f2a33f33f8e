use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::validation::ValidationError;
use super::watch::Watchers;

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevalidateMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
    pub revalidate_mode: RevalidateMode,
    pub validate_first_error_only: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_mode: ValidationMode::OnSubmit,
            revalidate_mode: RevalidateMode::OnChange,
            validate_first_error_only: true,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldMeta<E> {
    pub dirty: bool,
    pub touched: bool,
    pub validating: bool,
    pub errors: Vec<E>,
}

impl<E> Default for FieldMeta<E> {
    fn default() -> Self {
        Self {
            dirty: false,
            touched: false,
            validating: false,
            errors: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormSnapshot<T, E> {
    pub model: T,
    pub submit_state: SubmitState,
    pub submit_count: u32,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub field_meta: BTreeMap<FieldKey, FieldMeta<E>>,
    pub form_error: Option<E>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    BlankFieldName,
    DuplicateField(FieldKey),
    DraftLoadFailed(String),
    DraftSaveFailed(String),
    DraftClearFailed(String),
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "form state lock poisoned while {context}")
            }
            FormError::InvalidStateTransition { from, to } => {
                write!(f, "invalid submit state transition: {from:?} -> {to:?}")
            }
            FormError::BlankFieldName => f.write_str("form field name must not be blank"),
            FormError::DuplicateField(key) => {
                write!(f, "form field \"{key}\" is declared more than once")
            }
            FormError::DraftLoadFailed(error) => write!(f, "failed to load draft: {error}"),
            FormError::DraftSaveFailed(error) => write!(f, "failed to save draft: {error}"),
            FormError::DraftClearFailed(error) => write!(f, "failed to clear draft: {error}"),
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

pub(super) type SyncFieldValidatorFn<T, E> = Arc<dyn Fn(&T) -> Result<(), E> + Send + Sync>;
pub(super) type SyncFormValidatorFn<T, E> = Arc<dyn Fn(&T) -> Vec<(FieldKey, E)> + Send + Sync>;
pub(super) type AsyncFieldValidatorFn<T, E> =
    Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'static>> + Send + Sync>;

#[derive(Clone)]
pub(super) struct AsyncFieldValidatorEntry<T, E> {
    pub(super) debounce: Duration,
    pub(super) validator: AsyncFieldValidatorFn<T, E>,
}

// Frozen at construction; the field set never mutates after `from_schema`.
pub(super) struct ValidatorSet<T, E> {
    pub(super) sync_field: BTreeMap<FieldKey, Vec<SyncFieldValidatorFn<T, E>>>,
    pub(super) async_field: BTreeMap<FieldKey, Vec<AsyncFieldValidatorEntry<T, E>>>,
    pub(super) form: Vec<SyncFormValidatorFn<T, E>>,
    pub(super) dependents: BTreeMap<FieldKey, BTreeSet<FieldKey>>,
    pub(super) required: BTreeSet<FieldKey>,
    pub(super) descriptions: BTreeMap<FieldKey, String>,
}

impl<T, E> ValidatorSet<T, E> {
    pub(super) fn field_keys(&self) -> BTreeSet<FieldKey> {
        let mut keys = BTreeSet::new();
        keys.extend(self.sync_field.keys().copied());
        keys.extend(self.async_field.keys().copied());
        keys.extend(
            self.dependents
                .iter()
                .flat_map(|(key, values)| std::iter::once(*key).chain(values.iter().copied())),
        );
        keys.extend(self.required.iter().copied());
        keys.extend(self.descriptions.keys().copied());
        keys
    }
}

pub(super) struct FormState<T, E> {
    pub(super) id: FormId,
    pub(super) initial_model: T,
    pub(super) model: T,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
    pub(super) dirty_fields: BTreeSet<FieldKey>,
    pub(super) field_meta: BTreeMap<FieldKey, FieldMeta<E>>,
    pub(super) tickets: BTreeMap<FieldKey, ValidationTicket>,
    pub(super) first_error: Option<FieldKey>,
    pub(super) form_error: Option<E>,
}

impl<T, E> FormState<T, E> {
    pub(super) fn ensure_meta(&mut self, key: FieldKey) -> &mut FieldMeta<E> {
        self.field_meta.entry(key).or_default()
    }
}

impl<T: Clone, E> FormState<T, E> {
    // Pristine means initial values and no errors. Submission status is not
    // touched here; callers own that transition.
    pub(super) fn clear_to_pristine(&mut self) {
        self.model = self.initial_model.clone();
        self.dirty_fields.clear();
        self.tickets.clear();
        self.first_error = None;
        self.form_error = None;
        for meta in self.field_meta.values_mut() {
            meta.dirty = false;
            meta.touched = false;
            meta.validating = false;
            meta.errors.clear();
        }
    }
}

#[derive(Clone)]
pub struct FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub(super) options: FormOptions,
    pub(super) validators: Arc<ValidatorSet<T, E>>,
    pub(super) state: Arc<RwLock<FormState<T, E>>>,
    pub(super) watchers: Arc<RwLock<Watchers<T, E>>>,
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub(super) fn from_parts(
        initial: T,
        validators: ValidatorSet<T, E>,
        options: FormOptions,
    ) -> Self {
        Self {
            options,
            validators: Arc::new(validators),
            state: Arc::new(RwLock::new(FormState {
                id: FormId::next(),
                initial_model: initial.clone(),
                model: initial,
                submit_state: SubmitState::Idle,
                submit_count: 0,
                dirty_fields: BTreeSet::new(),
                field_meta: BTreeMap::new(),
                tickets: BTreeMap::new(),
                first_error: None,
                form_error: None,
            })),
            watchers: Arc::new(RwLock::new(Watchers::new())),
        }
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    pub fn is_submitting(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submit state")?.submit_state == SubmitState::Submitting)
    }

    pub fn value<L>(&self, lens: L) -> FormResult<L::Value>
    where
        L: super::validation::FieldLens<T>,
    {
        let state = read_lock(&self.state, "reading field value")?;
        Ok(lens.get(&state.model).clone())
    }

    pub fn first_error(&self) -> FormResult<Option<FieldKey>> {
        Ok(read_lock(&self.state, "reading first error key")?.first_error)
    }

    pub fn form_error(&self) -> FormResult<Option<E>> {
        Ok(read_lock(&self.state, "reading form-level error")?
            .form_error
            .clone())
    }

    pub fn is_required<L>(&self, lens: L) -> bool
    where
        L: super::validation::FieldLens<T>,
    {
        self.validators.required.contains(&lens.key())
    }

    pub fn field_description<L>(&self, lens: L) -> Option<&str>
    where
        L: super::validation::FieldLens<T>,
    {
        self.validators
            .descriptions
            .get(&lens.key())
            .map(String::as_str)
    }

    pub fn reset_to_initial(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "resetting form")?;
            state.clear_to_pristine();
        }
        self.notify_watchers()
    }

    pub fn reset_field<L>(&self, lens: L) -> FormResult<()>
    where
        L: super::validation::FieldLens<T>,
    {
        let key = lens.key();
        {
            let mut state = write_lock(&self.state, "resetting field")?;
            let initial_value = lens.get(&state.initial_model).clone();
            lens.set(&mut state.model, initial_value);
            state.dirty_fields.remove(&key);
            state.tickets.remove(&key);
            let meta = state.ensure_meta(key);
            meta.dirty = false;
            meta.touched = false;
            meta.validating = false;
            meta.errors.clear();
            state.first_error = first_error_key(&state.field_meta);
        }
        self.notify_watchers()
    }

    pub fn clear_errors(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "clearing all field errors")?;
            for meta in state.field_meta.values_mut() {
                meta.errors.clear();
                meta.validating = false;
            }
            state.first_error = None;
            state.form_error = None;
        }
        self.notify_watchers()
    }

    pub fn clear_field_errors<L>(&self, lens: L) -> FormResult<()>
    where
        L: super::validation::FieldLens<T>,
    {
        let key = lens.key();
        {
            let mut state = write_lock(&self.state, "clearing field errors")?;
            if let Some(meta) = state.field_meta.get_mut(&key) {
                meta.errors.clear();
                meta.validating = false;
            }
            state.first_error = first_error_key(&state.field_meta);
        }
        self.notify_watchers()
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot<T, E>> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        Ok(snapshot_of(&state))
    }

    pub fn field_meta<L>(&self, lens: L) -> FormResult<Option<FieldMeta<E>>>
    where
        L: super::validation::FieldLens<T>,
    {
        Ok(read_lock(&self.state, "reading field meta")?
            .field_meta
            .get(&lens.key())
            .cloned())
    }
}

pub(super) fn snapshot_of<T: Clone, E: Clone>(state: &FormState<T, E>) -> FormSnapshot<T, E> {
    let is_valid = state.field_meta.values().all(|meta| meta.errors.is_empty());
    FormSnapshot {
        model: state.model.clone(),
        submit_state: state.submit_state,
        submit_count: state.submit_count,
        is_dirty: !state.dirty_fields.is_empty(),
        is_valid,
        field_meta: state.field_meta.clone(),
        form_error: state.form_error.clone(),
    }
}

pub(super) fn transition_submit_state<T, E>(
    state: &mut FormState<T, E>,
    next: SubmitState,
) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

pub(super) fn first_error_key<E>(
    field_meta: &BTreeMap<FieldKey, FieldMeta<E>>,
) -> Option<FieldKey> {
    field_meta
        .iter()
        .find_map(|(key, meta)| (!meta.errors.is_empty()).then_some(*key))
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
