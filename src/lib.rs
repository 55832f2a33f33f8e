pub mod form;
pub mod users;

pub use users::NewUserForm;
