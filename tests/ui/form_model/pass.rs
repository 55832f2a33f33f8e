use intake::form::{FieldLens, FormModel};

#[derive(Clone, intake::form::FormModel)]
struct DemoForm {
    email: String,
}

fn main() {
    let fields = DemoForm::fields();
    let lens = fields.email();
    let mut model = DemoForm {
        email: "a@school.edu".to_string(),
    };
    lens.set(&mut model, "b@school.edu".to_string());
    assert_eq!(lens.key().as_str(), "email");
    assert_eq!(lens.get(&model), "b@school.edu");
}
