//! Built-in field rules: pure predicates over the entered text, each carrying
//! the message shown when it fails.

use std::borrow::Cow;
use std::collections::BTreeSet;

use jiff::civil::Date;

use super::validation::Violation;

pub fn required(
    message: impl Into<Cow<'static, str>>,
) -> impl Fn(&str) -> Result<(), Violation> + Clone + Send + Sync + 'static {
    let message = message.into();
    move |value: &str| {
        if value.trim().is_empty() {
            Err(Violation::new(message.clone()))
        } else {
            Ok(())
        }
    }
}

pub fn min_length(
    min: usize,
    message: impl Into<Cow<'static, str>>,
) -> impl Fn(&str) -> Result<(), Violation> + Clone + Send + Sync + 'static {
    let message = message.into();
    move |value: &str| {
        if value.trim().chars().count() < min {
            Err(Violation::new(message.clone()))
        } else {
            Ok(())
        }
    }
}

// Shape check only; deliverability is the backend's problem.
pub fn email(
    message: impl Into<Cow<'static, str>>,
) -> impl Fn(&str) -> Result<(), Violation> + Clone + Send + Sync + 'static {
    let message = message.into();
    move |value: &str| {
        let value = value.trim();
        let shaped = !value.chars().any(char::is_whitespace)
            && value.split_once('@').is_some_and(|(local, domain)| {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            });
        if shaped {
            Ok(())
        } else {
            Err(Violation::new(message.clone()))
        }
    }
}

/// Requires a parseable calendar date; empty input fails too.
pub fn date(
    message: impl Into<Cow<'static, str>>,
) -> impl Fn(&str) -> Result<(), Violation> + Clone + Send + Sync + 'static {
    let message = message.into();
    move |value: &str| match value.trim().parse::<Date>() {
        Ok(_) => Ok(()),
        Err(_) => Err(Violation::new(message.clone())),
    }
}

pub fn one_of<I, S>(
    allowed: I,
    message: impl Into<Cow<'static, str>>,
) -> impl Fn(&str) -> Result<(), Violation> + Clone + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let allowed: BTreeSet<String> = allowed.into_iter().map(Into::into).collect();
    let message = message.into();
    move |value: &str| {
        if allowed.contains(value) {
            Ok(())
        } else {
            Err(Violation::new(message.clone()))
        }
    }
}
