use intake::form::{FieldLens, FormModel};

#[derive(Clone, intake::form::FormModel)]
struct InviteForm {
    email: String,
    #[form(skip)]
    attempts: u8,
}

fn main() {
    let fields = InviteForm::fields();
    let model = InviteForm {
        email: "a@school.edu".to_string(),
        attempts: 0,
    };
    assert_eq!(fields.email().key().as_str(), "email");
    assert_eq!(fields.email().get(&model), "a@school.edu");
}
