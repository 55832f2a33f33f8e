use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use super::controller::{
    AsyncFieldValidatorEntry, AsyncFieldValidatorFn, FieldKey, FormController, FormError,
    FormOptions, FormResult, SyncFieldValidatorFn, SyncFormValidatorFn, ValidatorSet,
};
use super::validation::{
    AsyncFieldValidator, FieldLens, FieldValidator, FormValidator, ValidationError,
};

/// Declaration of one form field: its lens plus the ordered rule list.
/// Rules run in declaration order; by default the first failing rule wins.
pub struct FieldSpec<T, L, E>
where
    T: Clone + Send + Sync + 'static,
    L: FieldLens<T>,
    E: ValidationError,
{
    lens: L,
    required: bool,
    description: Option<String>,
    rules: Vec<SyncFieldValidatorFn<T, E>>,
    async_rules: Vec<AsyncFieldValidatorEntry<T, E>>,
    depends_on: Vec<FieldKey>,
}

impl<T, L, E> FieldSpec<T, L, E>
where
    T: Clone + Send + Sync + 'static,
    L: FieldLens<T>,
    E: ValidationError,
{
    pub fn new(lens: L) -> Self {
        Self {
            lens,
            required: false,
            description: None,
            rules: Vec::new(),
            async_rules: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn rule<V>(mut self, validator: V) -> Self
    where
        V: FieldValidator<T, L, E> + 'static,
    {
        let lens = self.lens;
        let validator = Arc::new(validator);
        let wrapped: SyncFieldValidatorFn<T, E> =
            Arc::new(move |model: &T| validator.validate(model, lens.get(model)));
        self.rules.push(wrapped);
        self
    }

    /// Attach a value-only rule for string-backed fields.
    pub fn check<R>(self, rule: R) -> Self
    where
        L::Value: AsRef<str>,
        R: Fn(&str) -> Result<(), E> + Send + Sync + 'static,
    {
        self.rule(move |_model: &T, value: &L::Value| rule(value.as_ref()))
    }

    pub fn async_rule<V>(self, validator: V) -> Self
    where
        V: AsyncFieldValidator<T, L, E> + 'static,
    {
        self.async_rule_debounced(0, validator)
    }

    pub fn async_rule_debounced<V>(mut self, debounce_ms: u64, validator: V) -> Self
    where
        V: AsyncFieldValidator<T, L, E> + 'static,
    {
        let lens = self.lens;
        let validator = Arc::new(validator);
        let wrapped: AsyncFieldValidatorFn<T, E> = Arc::new(move |model: T| {
            let value = lens.get(&model).clone();
            let validator = validator.clone();
            Box::pin(async move { validator.validate(&model, &value).await })
        });
        self.async_rules.push(AsyncFieldValidatorEntry {
            debounce: Duration::from_millis(debounce_ms),
            validator: wrapped,
        });
        self
    }

    /// Revalidate this field whenever `source` changes.
    pub fn depends_on<S>(mut self, source: S) -> Self
    where
        S: FieldLens<T>,
    {
        self.depends_on.push(source.key());
        self
    }

    fn into_entry(self) -> FieldEntry<T, E> {
        FieldEntry {
            key: self.lens.key(),
            required: self.required,
            description: self.description,
            rules: self.rules,
            async_rules: self.async_rules,
            depends_on: self.depends_on,
        }
    }
}

struct FieldEntry<T, E> {
    key: FieldKey,
    required: bool,
    description: Option<String>,
    rules: Vec<SyncFieldValidatorFn<T, E>>,
    async_rules: Vec<AsyncFieldValidatorEntry<T, E>>,
    depends_on: Vec<FieldKey>,
}

/// The statically declared field set of one form type. Built once, then
/// frozen into the controller by `FormController::from_schema`.
pub struct FormSchema<T, E>
where
    E: ValidationError,
{
    entries: Vec<FieldEntry<T, E>>,
    form_rules: Vec<SyncFormValidatorFn<T, E>>,
}

impl<T, E> FormSchema<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            form_rules: Vec::new(),
        }
    }

    pub fn field<L>(mut self, spec: FieldSpec<T, L, E>) -> Self
    where
        L: FieldLens<T>,
    {
        self.entries.push(spec.into_entry());
        self
    }

    /// Attach a cross-field rule; its errors land on the keys it reports.
    pub fn rule<V>(mut self, validator: V) -> Self
    where
        V: FormValidator<T, E> + 'static,
    {
        let validator = Arc::new(validator);
        let wrapped: SyncFormValidatorFn<T, E> =
            Arc::new(move |model: &T| validator.validate(model));
        self.form_rules.push(wrapped);
        self
    }
}

impl<T, E> Default for FormSchema<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    /// Build a controller from a declared schema. Blank or duplicate field
    /// names are programmer errors and fail here, before the form exists.
    pub fn from_schema(
        initial: T,
        schema: FormSchema<T, E>,
        options: FormOptions,
    ) -> FormResult<Self> {
        let mut set = ValidatorSet {
            sync_field: BTreeMap::new(),
            async_field: BTreeMap::new(),
            form: schema.form_rules,
            dependents: BTreeMap::new(),
            required: BTreeSet::new(),
            descriptions: BTreeMap::new(),
        };

        let mut seen = BTreeSet::new();
        for entry in schema.entries {
            if entry.key.as_str().trim().is_empty() {
                return Err(FormError::BlankFieldName);
            }
            if !seen.insert(entry.key) {
                return Err(FormError::DuplicateField(entry.key));
            }
            if !entry.rules.is_empty() {
                set.sync_field.insert(entry.key, entry.rules);
            }
            if !entry.async_rules.is_empty() {
                set.async_field.insert(entry.key, entry.async_rules);
            }
            for source in entry.depends_on {
                set.dependents.entry(source).or_default().insert(entry.key);
            }
            if entry.required {
                set.required.insert(entry.key);
            }
            if let Some(description) = entry.description {
                set.descriptions.insert(entry.key, description);
            }
        }

        Ok(Self::from_parts(initial, set, options))
    }
}
