use std::future::Future;

use tracing::{debug, warn};

use super::controller::{
    FieldKey, FormController, FormResult, SubmitState, first_error_key, transition_submit_state,
    write_lock,
};
use super::validation::ValidationError;

/// A failure reported by the submit action, optionally naming the field it
/// belongs to. Without a field it lands as the form-level error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubmitFailure<E> {
    pub field: Option<FieldKey>,
    pub error: E,
}

impl<E> SubmitFailure<E> {
    pub fn form(error: E) -> Self {
        Self { field: None, error }
    }

    pub fn field(field: FieldKey, error: E) -> Self {
        Self {
            field: Some(field),
            error,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitOutcome<I> {
    /// Validation failed; field errors were recorded and the action never ran.
    Rejected,
    /// Another submission was in flight; this call did nothing.
    InFlight,
    /// The action reported a failure; it is attached to a field or the form,
    /// and the entered values are untouched.
    Failed,
    /// The action succeeded and the form was cleared. The carried intent
    /// (e.g. where to navigate) is the caller's to act on.
    Completed(I),
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    /// Validate everything, then run `action` exactly once with the current
    /// model. See `SubmitOutcome` for the four ways this can end.
    pub fn submit_with<I, F>(&self, action: F) -> FormResult<SubmitOutcome<I>>
    where
        F: FnOnce(&T) -> Result<I, SubmitFailure<E>>,
    {
        if !self.begin_submit()? {
            return Ok(SubmitOutcome::InFlight);
        }
        if !self.validate_form()? {
            return self.reject_submit();
        }
        let Some(model) = self.begin_action()? else {
            return Ok(SubmitOutcome::InFlight);
        };
        let result = action(&model);
        self.finish_submit(result)
    }

    /// Async flavor of `submit_with`; also runs registered async rules.
    /// There is no retry and no timeout: the action is one outstanding
    /// request, and if the caller drops this future the result is discarded.
    pub async fn submit_with_async<I, F, Fut>(&self, action: F) -> FormResult<SubmitOutcome<I>>
    where
        F: FnOnce(&T) -> Fut,
        Fut: Future<Output = Result<I, SubmitFailure<E>>>,
    {
        if !self.begin_submit()? {
            return Ok(SubmitOutcome::InFlight);
        }
        if !self.validate_form_async().await? {
            return self.reject_submit();
        }
        let Some(model) = self.begin_action()? else {
            return Ok(SubmitOutcome::InFlight);
        };
        let result = action(&model).await;
        self.finish_submit(result)
    }

    fn begin_submit(&self) -> FormResult<bool> {
        {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if state.submit_state == SubmitState::Submitting {
                debug!(
                    form = state.id.0,
                    "submit ignored, another submission is in flight"
                );
                return Ok(false);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
            state.form_error = None;
        }
        self.notify_watchers()?;
        Ok(true)
    }

    fn reject_submit<I>(&self) -> FormResult<SubmitOutcome<I>> {
        {
            let mut state = write_lock(&self.state, "recording submit rejection")?;
            transition_submit_state(&mut state, SubmitState::Failed)?;
            debug!(
                form = state.id.0,
                first_error = ?state.first_error,
                "submit rejected by validation"
            );
        }
        self.notify_watchers()?;
        Ok(SubmitOutcome::Rejected)
    }

    // Returns the model to submit, or None when this call lost the race and
    // another submission already moved past validation.
    fn begin_action(&self) -> FormResult<Option<T>> {
        let model = {
            let mut state = write_lock(&self.state, "moving submit in flight")?;
            if state.submit_state != SubmitState::Validating {
                return Ok(None);
            }
            transition_submit_state(&mut state, SubmitState::Submitting)?;
            state.model.clone()
        };
        self.notify_watchers()?;
        Ok(Some(model))
    }

    fn finish_submit<I>(
        &self,
        result: Result<I, SubmitFailure<E>>,
    ) -> FormResult<SubmitOutcome<I>> {
        let outcome = {
            let mut state = write_lock(&self.state, "completing submit")?;
            match result {
                Ok(intent) => {
                    state.clear_to_pristine();
                    transition_submit_state(&mut state, SubmitState::Succeeded)?;
                    debug!(form = state.id.0, "submit succeeded");
                    SubmitOutcome::Completed(intent)
                }
                Err(failure) => {
                    warn!(
                        form = state.id.0,
                        field = failure.field.map(FieldKey::as_str),
                        error = failure.error.message(),
                        "submit failed"
                    );
                    match failure.field {
                        Some(key) => {
                            state.ensure_meta(key).errors.push(failure.error);
                            state.first_error = first_error_key(&state.field_meta);
                        }
                        None => state.form_error = Some(failure.error),
                    }
                    transition_submit_state(&mut state, SubmitState::Failed)?;
                    SubmitOutcome::Failed
                }
            }
        };
        self.notify_watchers()?;
        Ok(outcome)
    }
}
