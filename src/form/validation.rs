use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use futures_timer::Delay;

use super::controller::{
    FieldKey, FormController, FormResult, RevalidateMode, ValidationMode, ValidationTicket,
    first_error_key, read_lock, write_lock,
};

pub trait ValidationError: Clone + Send + Sync + 'static {
    fn message(&self) -> &str;
}

/// The standard validation error: a human-readable message, nothing else.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Violation(Cow<'static, str>);

impl Violation {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self(message.into())
    }
}

impl ValidationError for Violation {
    fn message(&self) -> &str {
        &self.0
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait FieldLens<T>: Copy + Send + Sync + 'static {
    type Value: Clone + PartialEq + Send + Sync + 'static;

    fn key(self) -> FieldKey;
    fn get<'a>(self, model: &'a T) -> &'a Self::Value;
    fn set(self, model: &mut T, value: Self::Value);
}

pub trait FormModel: Clone + Send + Sync + 'static {
    type Fields;

    fn fields() -> Self::Fields;
}

pub trait FieldValidator<T, L, E>: Send + Sync
where
    L: FieldLens<T>,
    E: ValidationError,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), E>;
}

impl<T, L, E, F> FieldValidator<T, L, E> for F
where
    L: FieldLens<T>,
    E: ValidationError,
    F: for<'a> Fn(&'a T, &'a L::Value) -> Result<(), E> + Send + Sync,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), E> {
        (self)(model, value)
    }
}

pub trait FormValidator<T, E>: Send + Sync
where
    E: ValidationError,
{
    fn validate(&self, model: &T) -> Vec<(FieldKey, E)>;
}

impl<T, E, F> FormValidator<T, E> for F
where
    E: ValidationError,
    F: Fn(&T) -> Vec<(FieldKey, E)> + Send + Sync,
{
    fn validate(&self, model: &T) -> Vec<(FieldKey, E)> {
        (self)(model)
    }
}

pub type BoxedValidationFuture<'a, E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'a>>;

pub trait AsyncFieldValidator<T, L, E>: Send + Sync
where
    L: FieldLens<T>,
    E: ValidationError,
{
    type Fut<'a>: Future<Output = Result<(), E>> + Send + 'a
    where
        Self: 'a,
        T: 'a,
        L::Value: 'a;

    fn validate<'a>(&'a self, model: &'a T, value: &'a L::Value) -> Self::Fut<'a>;
}

impl<T, L, E, F> AsyncFieldValidator<T, L, E> for F
where
    L: FieldLens<T>,
    E: ValidationError,
    F: for<'a> Fn(&'a T, &'a L::Value) -> BoxedValidationFuture<'a, E> + Send + Sync,
{
    type Fut<'a>
        = BoxedValidationFuture<'a, E>
    where
        Self: 'a,
        T: 'a,
        L::Value: 'a;

    fn validate<'a>(&'a self, model: &'a T, value: &'a L::Value) -> Self::Fut<'a> {
        (self)(model, value)
    }
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub fn set<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        {
            let mut state = write_lock(&self.state, "writing form model")?;
            lens.set(&mut state.model, value);
            let is_dirty = lens.get(&state.model) != lens.get(&state.initial_model);
            if is_dirty {
                state.dirty_fields.insert(key);
            } else {
                state.dirty_fields.remove(&key);
            }
            state.ensure_meta(key).dirty = is_dirty;
        }

        if self.options.validate_mode == ValidationMode::OnChange {
            let _ = self.validate_field_by_key(key)?;
        }
        if self.options.revalidate_mode == RevalidateMode::OnChange {
            self.revalidate_dependents(key)?;
        }
        self.notify_watchers()
    }

    pub fn touch<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        {
            let mut state = write_lock(&self.state, "touching field")?;
            state.ensure_meta(key).touched = true;
        }

        if self.options.validate_mode == ValidationMode::OnBlur {
            let _ = self.validate_field_by_key(key)?;
        }
        if self.options.revalidate_mode == RevalidateMode::OnBlur {
            self.revalidate_dependents(key)?;
        }
        self.notify_watchers()
    }

    pub async fn set_async<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        self.set(lens, value)?;
        if self.options.validate_mode == ValidationMode::OnChange {
            let _ = self.validate_field_async_registered_by_key(key).await?;
        }
        if self.options.revalidate_mode == RevalidateMode::OnChange {
            self.revalidate_dependents_async(key).await?;
        }
        Ok(())
    }

    pub async fn touch_async<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        self.touch(lens)?;
        if self.options.validate_mode == ValidationMode::OnBlur {
            let _ = self.validate_field_async_registered_by_key(key).await?;
        }
        if self.options.revalidate_mode == RevalidateMode::OnBlur {
            self.revalidate_dependents_async(key).await?;
        }
        Ok(())
    }

    pub fn validate_field<L>(&self, lens: L) -> FormResult<bool>
    where
        L: FieldLens<T>,
    {
        let valid = self.validate_field_by_key(lens.key())?;
        self.notify_watchers()?;
        Ok(valid)
    }

    pub async fn validate_field_async<L, V>(
        &self,
        lens: L,
        validator: &V,
    ) -> FormResult<ValidationTicket>
    where
        L: FieldLens<T>,
        V: AsyncFieldValidator<T, L, E>,
    {
        let key = lens.key();
        let (ticket, model, value) = {
            let mut state = write_lock(&self.state, "starting async validation")?;
            let next = next_ticket(&state.tickets, key);
            state.tickets.insert(key, next);
            state.ensure_meta(key).validating = true;
            (next, state.model.clone(), lens.get(&state.model).clone())
        };

        let result = validator.validate(&model, &value).await;
        self.finish_async_validation(key, ticket, result)?;
        Ok(ticket)
    }

    pub async fn validate_field_async_registered<L>(
        &self,
        lens: L,
    ) -> FormResult<Vec<ValidationTicket>>
    where
        L: FieldLens<T>,
    {
        self.validate_field_async_registered_by_key(lens.key())
            .await
    }

    pub fn validate_form(&self) -> FormResult<bool> {
        let model = {
            read_lock(&self.state, "reading model for form validation")?
                .model
                .clone()
        };

        let mut field_errors = BTreeMap::<FieldKey, Vec<E>>::new();
        for (key, validators) in &self.validators.sync_field {
            let mut errors = Vec::new();
            for validator in validators {
                if let Err(error) = validator(&model) {
                    errors.push(error);
                    if self.options.validate_first_error_only {
                        break;
                    }
                }
            }
            field_errors.insert(*key, errors);
        }

        for validator in &self.validators.form {
            for (key, error) in validator(&model) {
                field_errors.entry(key).or_default().push(error);
            }
        }

        let is_valid;
        {
            let mut state = write_lock(&self.state, "applying form validation result")?;
            let mut keys = state
                .field_meta
                .keys()
                .copied()
                .collect::<BTreeSet<FieldKey>>();
            keys.extend(field_errors.keys().copied());
            for key in keys {
                let meta = state.ensure_meta(key);
                meta.validating = false;
                meta.errors = field_errors.remove(&key).unwrap_or_default();
            }
            state.first_error = first_error_key(&state.field_meta);
            is_valid = state.field_meta.values().all(|meta| meta.errors.is_empty());
        }
        self.notify_watchers()?;
        Ok(is_valid)
    }

    pub async fn validate_form_async(&self) -> FormResult<bool> {
        let _ = self.validate_form()?;
        let keys = self
            .validators
            .async_field
            .keys()
            .copied()
            .collect::<Vec<_>>();

        for key in keys {
            let _ = self.validate_field_async_registered_by_key(key).await?;
        }

        Ok(self.snapshot()?.is_valid)
    }

    pub(super) fn validate_field_by_key(&self, key: FieldKey) -> FormResult<bool> {
        let model = {
            read_lock(&self.state, "reading model for field validation")?
                .model
                .clone()
        };
        let validators = self
            .validators
            .sync_field
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut errors = Vec::new();
        for validator in validators {
            if let Err(error) = validator(&model) {
                errors.push(error);
                if self.options.validate_first_error_only {
                    break;
                }
            }
        }

        let mut state = write_lock(&self.state, "writing field validation result")?;
        let meta = state.ensure_meta(key);
        meta.validating = false;
        meta.errors = errors;
        state.first_error = first_error_key(&state.field_meta);
        Ok(state
            .field_meta
            .get(&key)
            .is_none_or(|m| m.errors.is_empty()))
    }

    pub(super) fn revalidate_dependents(&self, source: FieldKey) -> FormResult<()> {
        let Some(dependents) = self.validators.dependents.get(&source) else {
            return Ok(());
        };
        for dependent in dependents {
            let _ = self.validate_field_by_key(*dependent)?;
        }
        Ok(())
    }

    pub(super) async fn revalidate_dependents_async(&self, source: FieldKey) -> FormResult<()> {
        let dependents = self
            .validators
            .dependents
            .get(&source)
            .cloned()
            .unwrap_or_default();
        for dependent in dependents {
            let _ = self
                .validate_field_async_registered_by_key(dependent)
                .await?;
        }
        Ok(())
    }

    pub(super) async fn validate_field_async_registered_by_key(
        &self,
        key: FieldKey,
    ) -> FormResult<Vec<ValidationTicket>> {
        let model = {
            read_lock(&self.state, "reading model for registered async validation")?
                .model
                .clone()
        };
        let entries = self
            .validators
            .async_field
            .get(&key)
            .cloned()
            .unwrap_or_default();

        let mut tickets = Vec::with_capacity(entries.len());
        for entry in entries {
            let ticket = {
                let mut state = write_lock(&self.state, "starting registered async validation")?;
                let next = next_ticket(&state.tickets, key);
                state.tickets.insert(key, next);
                state.ensure_meta(key).validating = true;
                next
            };

            if !entry.debounce.is_zero() {
                Delay::new(entry.debounce).await;
                if !self.is_latest_ticket(key, ticket)? {
                    continue;
                }
            }

            let result = (entry.validator)(model.clone()).await;
            self.finish_async_validation(key, ticket, result)?;
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    fn is_latest_ticket(&self, key: FieldKey, ticket: ValidationTicket) -> FormResult<bool> {
        Ok(read_lock(&self.state, "checking latest validation ticket")?
            .tickets
            .get(&key)
            .copied()
            == Some(ticket))
    }

    fn finish_async_validation(
        &self,
        key: FieldKey,
        ticket: ValidationTicket,
        result: Result<(), E>,
    ) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "finishing async validation")?;
            if state.tickets.get(&key).copied() != Some(ticket) {
                return Ok(());
            }
            let meta = state.ensure_meta(key);
            meta.validating = false;
            meta.errors = match result {
                Ok(()) => Vec::new(),
                Err(error) => vec![error],
            };
            state.first_error = first_error_key(&state.field_meta);
        }
        self.notify_watchers()
    }
}

fn next_ticket(
    tickets: &BTreeMap<FieldKey, ValidationTicket>,
    key: FieldKey,
) -> ValidationTicket {
    ValidationTicket(tickets.get(&key).map_or(0, |ticket| ticket.0) + 1)
}
