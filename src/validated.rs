//! Error-accumulating results.
//!
//! `flat_map` chains dependent steps and stops at the first failure.
//! `zip` combines independent steps and keeps the errors of every failing side.

use std::fmt;

/// Non-empty list of errors carried by [`Validated::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Errors<E>(Vec<E>);

impl<E> Errors<E> {
    pub fn one(error: E) -> Self {
        Self(vec![error])
    }

    pub fn first(&self) -> &E {
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; an `Errors` holds at least one error.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<E> {
        self.0
    }

    fn concat(mut self, other: Errors<E>) -> Self {
        self.0.extend(other.0);
        self
    }
}

impl<E> IntoIterator for Errors<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a Errors<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<E: fmt::Display> fmt::Display for Errors<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Errors<E> {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated<T, E> {
    Valid(T),
    Invalid(Errors<E>),
}

impl<T, E> Validated<T, E> {
    pub fn invalid(error: E) -> Self {
        Validated::Invalid(Errors::one(error))
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validated::Valid(_))
    }

    pub fn valid(self) -> Option<T> {
        match self {
            Validated::Valid(value) => Some(value),
            Validated::Invalid(_) => None,
        }
    }

    pub fn errors(&self) -> Option<&Errors<E>> {
        match self {
            Validated::Valid(_) => None,
            Validated::Invalid(errors) => Some(errors),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Validated<U, E> {
        match self {
            Validated::Valid(value) => Validated::Valid(f(value)),
            Validated::Invalid(errors) => Validated::Invalid(errors),
        }
    }

    pub fn map_err<F>(self, f: impl FnMut(E) -> F) -> Validated<T, F> {
        match self {
            Validated::Valid(value) => Validated::Valid(value),
            Validated::Invalid(errors) => Validated::Invalid(Errors(
                errors.0.into_iter().map(f).collect(),
            )),
        }
    }

    /// Monadic bind: the first failing step wins.
    pub fn flat_map<U>(self, f: impl FnOnce(T) -> Validated<U, E>) -> Validated<U, E> {
        match self {
            Validated::Valid(value) => f(value),
            Validated::Invalid(errors) => Validated::Invalid(errors),
        }
    }

    /// Applicative combine: errors from both sides accumulate.
    pub fn zip<U>(self, other: Validated<U, E>) -> Validated<(T, U), E> {
        match (self, other) {
            (Validated::Valid(a), Validated::Valid(b)) => Validated::Valid((a, b)),
            (Validated::Valid(_), Validated::Invalid(e)) => Validated::Invalid(e),
            (Validated::Invalid(e), Validated::Valid(_)) => Validated::Invalid(e),
            (Validated::Invalid(e1), Validated::Invalid(e2)) => Validated::Invalid(e1.concat(e2)),
        }
    }

    pub fn zip_with<U, V>(self, other: Validated<U, E>, f: impl FnOnce(T, U) -> V) -> Validated<V, E> {
        self.zip(other).map(|(a, b)| f(a, b))
    }

    pub fn into_result(self) -> Result<T, Errors<E>> {
        match self {
            Validated::Valid(value) => Ok(value),
            Validated::Invalid(errors) => Err(errors),
        }
    }
}

/// Three independent validations, errors accumulated left to right.
pub fn zip3<A, B, C, E>(
    a: Validated<A, E>,
    b: Validated<B, E>,
    c: Validated<C, E>,
) -> Validated<(A, B, C), E> {
    a.zip(b).zip(c).map(|((a, b), c)| (a, b, c))
}

impl<T, E> From<Result<T, E>> for Validated<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Validated::Valid(value),
            Err(error) => Validated::invalid(error),
        }
    }
}

/// Lifts an `Option` into a `Validated`, failing with `error` on `None`.
pub trait OrInvalid<T> {
    fn or_invalid<E>(self, error: impl FnOnce() -> E) -> Validated<T, E>;
}

impl<T> OrInvalid<T> for Option<T> {
    fn or_invalid<E>(self, error: impl FnOnce() -> E) -> Validated<T, E> {
        match self {
            Some(value) => Validated::Valid(value),
            None => Validated::invalid(error()),
        }
    }
}
