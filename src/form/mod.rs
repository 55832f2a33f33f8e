mod controller;
mod draft;
mod schema;
mod submit;
mod validation;
mod watch;

pub mod rules;


pub use intake_form_derive::FormModel;

pub use controller::{
    FieldKey, FieldMeta, FormController, FormError, FormId, FormOptions, FormResult, FormSnapshot,
    RevalidateMode, SubmitState, ValidationMode, ValidationTicket,
};
pub use draft::{DraftStore, MemoryDraftStore};
pub use schema::{FieldSpec, FormSchema};
pub use submit::{SubmitFailure, SubmitOutcome};
pub use validation::{
    AsyncFieldValidator, BoxedValidationFuture, FieldLens, FieldValidator, FormModel,
    FormValidator, ValidationError, Violation,
};
pub use watch::WatchHandle;
