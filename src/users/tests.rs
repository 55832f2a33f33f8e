use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::executor::block_on;
use secrecy::ExposeSecret;

use super::*;
use crate::form::{FieldLens, FormModel, SubmitOutcome, Violation};

fn roles() -> Vec<RoleOption> {
    vec![
        RoleOption::new("teacher", "Teacher"),
        RoleOption::new("student", "Student"),
        RoleOption::new("super-admin", "Super admin"),
    ]
}

fn filled_form() -> NewUserForm {
    let form = NewUserForm::new(roles()).expect("schema is well formed");
    let fields = NewUserInput::fields();
    let controller = form.controller();
    controller.set(fields.name(), "Jo".into()).expect("set name");
    controller
        .set(fields.email(), "jo@x.com".into())
        .expect("set email");
    controller
        .set(fields.password(), "abcdef".into())
        .expect("set password");
    controller
        .set(fields.date_of_birth(), "2000-01-01".into())
        .expect("set date of birth");
    controller
        .set(fields.role(), "teacher".into())
        .expect("set role");
    form
}

#[derive(Debug)]
struct RecordedCall {
    name: String,
    email: String,
    password: String,
    date_of_birth: String,
    role: String,
}

#[derive(Clone, Default)]
struct RecordingBackend {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    fail_with: Option<String>,
}

impl RecordingBackend {
    fn failing(reason: &str) -> Self {
        Self {
            calls: Arc::default(),
            fail_with: Some(reason.to_string()),
        }
    }
}

impl CreateUser for RecordingBackend {
    fn create<'a>(&'a self, request: &'a UserCreationRequest) -> BoxedCreateUserFuture<'a> {
        Box::pin(async move {
            self.calls.lock().expect("calls lock").push(RecordedCall {
                name: request.name.clone(),
                email: request.email.clone(),
                password: request.password.expose_secret().to_string(),
                date_of_birth: request.date_of_birth.to_string(),
                role: request.role.clone(),
            });
            match &self.fail_with {
                Some(reason) => Err(CreateUserError::new(reason.clone())),
                None => Ok(()),
            }
        })
    }
}

#[test]
fn valid_submission_calls_backend_once_with_form_values() {
    let form = filled_form();
    assert!(form.controller().validate_form().expect("validate"));

    let backend = RecordingBackend::default();
    let outcome = block_on(form.submit(&backend)).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Completed(NavigationIntent::UserList));

    let calls = backend.calls.lock().expect("calls lock");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "Jo");
    assert_eq!(calls[0].email, "jo@x.com");
    assert_eq!(calls[0].password, "abcdef");
    assert_eq!(calls[0].date_of_birth, "2000-01-01");
    assert_eq!(calls[0].role, "teacher");
}

#[test]
fn short_name_blocks_submission_with_message() {
    let form = filled_form();
    let fields = NewUserInput::fields();
    form.controller()
        .set(fields.name(), "J".into())
        .expect("set short name");

    let backend = RecordingBackend::default();
    let outcome = block_on(form.submit(&backend)).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Rejected);
    assert!(backend.calls.lock().expect("calls lock").is_empty());

    assert_eq!(
        form.controller()
            .field_meta(fields.name())
            .expect("meta")
            .expect("name meta")
            .errors,
        vec![Violation::new("Name must be at least 2 characters")]
    );
    assert_eq!(
        form.controller()
            .field_error_for_display(fields.name())
            .expect("display error"),
        Some("Name must be at least 2 characters".to_string())
    );
}

#[test]
fn empty_form_yields_an_error_on_every_required_field() {
    let form = NewUserForm::new(roles()).expect("schema is well formed");
    let backend = RecordingBackend::default();

    let outcome = block_on(form.submit(&backend)).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Rejected);
    assert!(backend.calls.lock().expect("calls lock").is_empty());

    let fields = NewUserInput::fields();
    let snapshot = form.controller().snapshot().expect("snapshot");
    for key in [
        fields.name().key(),
        fields.email().key(),
        fields.password().key(),
        fields.date_of_birth().key(),
        fields.role().key(),
    ] {
        let meta = snapshot.field_meta.get(&key).expect("field meta");
        assert!(!meta.errors.is_empty(), "expected an error for {key}");
    }
}

#[test]
fn duplicate_email_failure_lands_on_email_field() {
    let form = filled_form();
    let fields = NewUserInput::fields();
    let before = form.controller().snapshot().expect("snapshot").model;

    let backend = RecordingBackend::failing("email already exists");
    let outcome = block_on(form.submit(&backend)).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Failed);

    let controller = form.controller();
    assert!(!controller.is_submitting().expect("is submitting"));
    assert_eq!(
        controller
            .field_meta(fields.email())
            .expect("meta")
            .expect("email meta")
            .errors,
        vec![Violation::new("email already exists")]
    );
    assert_eq!(controller.snapshot().expect("snapshot").model, before);
    assert!(controller.form_error().expect("form error").is_none());
}

#[test]
fn unattributable_failure_becomes_form_level_error() {
    let form = filled_form();

    let backend = RecordingBackend::failing("user quota exceeded");
    let outcome = block_on(form.submit(&backend)).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Failed);

    assert_eq!(
        form.controller().form_error().expect("form error"),
        Some(Violation::new("user quota exceeded"))
    );
    assert_eq!(
        form.controller().form_error_for_display().expect("display"),
        Some("user quota exceeded".to_string())
    );
}

#[test]
fn successful_submission_clears_form_and_emits_intent_once() {
    let form = filled_form();
    let backend = RecordingBackend::default();

    let outcome = block_on(form.submit(&backend)).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Completed(NavigationIntent::UserList));

    let snapshot = form.controller().snapshot().expect("snapshot");
    assert_eq!(snapshot.model, NewUserInput::default());
    assert!(!snapshot.is_dirty);
    assert_eq!(backend.calls.lock().expect("calls lock").len(), 1);
}

#[test]
fn role_outside_the_supplied_options_is_rejected() {
    let form = filled_form();
    let fields = NewUserInput::fields();
    form.controller()
        .set(fields.role(), "intruder".into())
        .expect("set role");

    let backend = RecordingBackend::default();
    let outcome = block_on(form.submit(&backend)).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Rejected);
    assert!(backend.calls.lock().expect("calls lock").is_empty());
    assert_eq!(
        form.controller()
            .field_meta(fields.role())
            .expect("meta")
            .expect("role meta")
            .errors,
        vec![Violation::new("Role must be one of the offered roles")]
    );
}

#[test]
fn retry_after_backend_failure_succeeds_with_corrected_email() {
    let form = filled_form();
    let fields = NewUserInput::fields();

    let failing = RecordingBackend::failing("email already exists");
    let outcome = block_on(form.submit(&failing)).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Failed);

    form.controller()
        .set(fields.email(), "jo.other@x.com".into())
        .expect("correct email");
    let backend = RecordingBackend::default();
    let outcome = block_on(form.submit(&backend)).expect("retry");
    assert_eq!(outcome, SubmitOutcome::Completed(NavigationIntent::UserList));
    assert_eq!(
        backend.calls.lock().expect("calls lock")[0].email,
        "jo.other@x.com"
    );
}

struct CountingBackend {
    calls: Arc<AtomicUsize>,
}

impl CreateUser for CountingBackend {
    fn create<'a>(&'a self, _request: &'a UserCreationRequest) -> BoxedCreateUserFuture<'a> {
        let calls = self.calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

struct ReentrantBackend {
    form: NewUserForm,
    inner_calls: Arc<AtomicUsize>,
    inner_outcome: Arc<Mutex<Option<SubmitOutcome<NavigationIntent>>>>,
}

impl CreateUser for ReentrantBackend {
    fn create<'a>(&'a self, _request: &'a UserCreationRequest) -> BoxedCreateUserFuture<'a> {
        Box::pin(async move {
            let counting = CountingBackend {
                calls: self.inner_calls.clone(),
            };
            let outcome = self.form.submit(&counting).await.expect("inner submit");
            *self.inner_outcome.lock().expect("outcome lock") = Some(outcome);
            Ok(())
        })
    }
}

#[test]
fn submit_while_in_flight_makes_no_additional_backend_call() {
    let form = filled_form();
    let backend = ReentrantBackend {
        form: form.clone(),
        inner_calls: Arc::new(AtomicUsize::new(0)),
        inner_outcome: Arc::default(),
    };

    let outcome = block_on(form.submit(&backend)).expect("outer submit");
    assert_eq!(outcome, SubmitOutcome::Completed(NavigationIntent::UserList));
    assert_eq!(
        *backend.inner_outcome.lock().expect("outcome lock"),
        Some(SubmitOutcome::InFlight)
    );
    assert_eq!(backend.inner_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn role_options_are_kept_in_supplied_order() {
    let form = NewUserForm::new(roles()).expect("schema is well formed");
    let values = form
        .roles()
        .iter()
        .map(|role| role.value.as_str())
        .collect::<Vec<_>>();
    assert_eq!(values, ["teacher", "student", "super-admin"]);
}
