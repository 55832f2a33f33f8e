use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use secrecy::SecretString;

use crate::form::{
    FieldLens, FieldSpec, FormController, FormModel, FormOptions, FormResult, FormSchema,
    SubmitFailure, SubmitOutcome, ValidationMode, Violation, rules,
};

/// What the inputs hold while the admin types; strings, like the widgets.
#[derive(Clone, Debug, Default, Eq, PartialEq, FormModel)]
pub struct NewUserInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub date_of_birth: String,
    pub role: String,
}

/// One entry of the externally supplied role set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoleOption {
    pub value: String,
    pub label: String,
}

impl RoleOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Sent to the create-user backend once every field rule has passed.
/// Immutable; consumed by exactly one call.
#[derive(Debug)]
pub struct UserCreationRequest {
    pub name: String,
    pub email: String,
    pub password: SecretString,
    pub date_of_birth: jiff::civil::Date,
    pub role: String,
}

impl UserCreationRequest {
    fn from_input(input: &NewUserInput) -> Result<Self, SubmitFailure<Violation>> {
        let date_of_birth: jiff::civil::Date =
            input.date_of_birth.trim().parse().map_err(|_| {
                SubmitFailure::field(
                    NewUserInput::fields().date_of_birth().key(),
                    Violation::new("Date of birth must be a valid date"),
                )
            })?;
        Ok(Self {
            name: input.name.clone(),
            email: input.email.clone(),
            password: SecretString::from(input.password.clone()),
            date_of_birth,
            role: input.role.clone(),
        })
    }
}

/// Failure reason reported by the create-user backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateUserError(pub String);

impl CreateUserError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

impl Display for CreateUserError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CreateUserError {}

pub type BoxedCreateUserFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), CreateUserError>> + Send + 'a>>;

/// The external collaborator that actually creates the user. Call/response;
/// the transport is its business, not this crate's.
pub trait CreateUser: Send + Sync {
    fn create<'a>(&'a self, request: &'a UserCreationRequest) -> BoxedCreateUserFuture<'a>;
}

/// Where the host should go after a successful submission. The host performs
/// the navigation; this flow only emits the intent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NavigationIntent {
    UserList,
}

/// The super-admin add-user form: the declared rule set over `NewUserInput`
/// plus the submission pipeline against a `CreateUser` backend.
#[derive(Clone)]
pub struct NewUserForm {
    controller: FormController<NewUserInput, Violation>,
    roles: Vec<RoleOption>,
}

impl NewUserForm {
    pub fn new(roles: Vec<RoleOption>) -> FormResult<Self> {
        let fields = NewUserInput::fields();
        let role_values: Vec<String> = roles.iter().map(|role| role.value.clone()).collect();
        let schema = FormSchema::new()
            .field(
                FieldSpec::new(fields.name())
                    .required()
                    .check(rules::required("Name is required"))
                    .check(rules::min_length(2, "Name must be at least 2 characters")),
            )
            .field(
                FieldSpec::new(fields.email())
                    .required()
                    .check(rules::required("Email is required"))
                    .check(rules::email("Email must be a valid email address")),
            )
            .field(
                FieldSpec::new(fields.password())
                    .required()
                    .check(rules::required("Password is required"))
                    .check(rules::min_length(
                        6,
                        "Password must be at least 6 characters",
                    )),
            )
            .field(
                FieldSpec::new(fields.date_of_birth())
                    .required()
                    .check(rules::date("Date of birth is required")),
            )
            .field(
                FieldSpec::new(fields.role()).required().check(rules::one_of(
                    role_values,
                    "Role must be one of the offered roles",
                )),
            );
        let options = FormOptions {
            validate_mode: ValidationMode::OnBlur,
            ..FormOptions::default()
        };
        let controller = FormController::from_schema(NewUserInput::default(), schema, options)?;
        Ok(Self { controller, roles })
    }

    pub fn controller(&self) -> &FormController<NewUserInput, Violation> {
        &self.controller
    }

    pub fn roles(&self) -> &[RoleOption] {
        &self.roles
    }

    /// Drive the add-user pipeline against `backend`. On success the form is
    /// cleared and the outcome carries `NavigationIntent::UserList`.
    pub async fn submit<B>(&self, backend: &B) -> FormResult<SubmitOutcome<NavigationIntent>>
    where
        B: CreateUser,
    {
        self.controller
            .submit_with_async(|input| {
                let request = UserCreationRequest::from_input(input);
                async move {
                    let request = request?;
                    match backend.create(&request).await {
                        Ok(()) => Ok(NavigationIntent::UserList),
                        Err(error) => Err(attribute_failure(error)),
                    }
                }
            })
            .await
    }
}

// "email already exists" belongs on the email field; a reason naming no
// field (or several) becomes the form-level error.
fn attribute_failure(error: CreateUserError) -> SubmitFailure<Violation> {
    let fields = NewUserInput::fields();
    let keys = [
        fields.name().key(),
        fields.email().key(),
        fields.password().key(),
        fields.date_of_birth().key(),
        fields.role().key(),
    ];
    let reason = error.reason().to_ascii_lowercase();
    let mut named = keys.into_iter().filter(|key| {
        reason.contains(key.as_str()) || reason.contains(&key.as_str().replace('_', " "))
    });
    match (named.next(), named.next()) {
        (Some(key), None) => SubmitFailure::field(key, Violation::new(error.0)),
        _ => SubmitFailure::form(Violation::new(error.0)),
    }
}
