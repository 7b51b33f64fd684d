//! Ordered aggregation of failures collected while tearing down several
//! resources.
use std::fmt;

/// An ordered list of errors with a joined, human-readable message.
///
/// Insertion order is discovery order. An aggregate with no entries means
/// "no failure"; use [`MultiError::into_result`] to turn it into a `Result`
/// so that an empty aggregate is never surfaced as an error.
#[derive(Debug)]
pub struct MultiError<E> {
    errors: Vec<E>,
}

impl<E> MultiError<E> {
    /// Creates an aggregate seeded with pre-existing errors, e.g. an open
    /// failure that is about to be followed by cleanup failures.
    pub fn new(initial: Vec<E>) -> Self {
        Self { errors: initial }
    }

    /// Appends an error, preserving order.
    pub fn push(&mut self, err: E) {
        self.errors.push(err);
    }

    /// Appends the error of a failed operation; a successful one is a no-op.
    pub fn append<T>(&mut self, result: Result<T, E>) {
        if let Err(err) = result {
            self.push(err);
        }
    }

    /// Number of collected errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True when nothing failed.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Read-only view of the collected errors in discovery order.
    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    /// Consumes the aggregate, returning the collected errors.
    pub fn into_errors(self) -> Vec<E> {
        self.errors
    }

    /// `Ok(())` when empty, otherwise the aggregate itself.
    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<E> Default for MultiError<E> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<E: fmt::Display> fmt::Display for MultiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, err) in self.errors.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for MultiError<E> {}

impl<E> FromIterator<E> for MultiError<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<E> Extend<E> for MultiError<E> {
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    #[test]
    fn joins_messages_in_append_order() {
        let mut errs = MultiError::new(vec![TestError("error 1"), TestError("error 2")]);
        errs.push(TestError("error 3"));
        errs.append::<()>(Err(TestError("error 4")));

        assert_eq!(errs.len(), 4);
        assert_eq!(errs.to_string(), "error 1, error 2, error 3, error 4");
        assert_eq!(errs.errors()[2].0, "error 3");
    }

    #[test]
    fn appending_success_does_not_change_len() {
        let mut errs = MultiError::new(vec![TestError("only")]);
        errs.append(Ok::<_, TestError>(()));
        errs.append(Ok::<_, TestError>(42));

        assert_eq!(errs.len(), 1);
        assert_eq!(errs.to_string(), "only");
    }

    #[test]
    fn empty_aggregate_is_not_a_failure() {
        let errs: MultiError<TestError> = MultiError::default();
        assert!(errs.is_empty());
        assert_eq!(errs.to_string(), "");
        assert!(errs.into_result().is_ok());

        let errs: MultiError<TestError> = std::iter::once(TestError("boom")).collect();
        let err = errs.into_result().unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn extend_keeps_order() {
        let mut errs = MultiError::new(vec![TestError("a")]);
        errs.extend([TestError("b"), TestError("c")]);
        let messages: Vec<_> = errs.into_errors().into_iter().map(|e| e.0).collect();
        assert_eq!(messages, ["a", "b", "c"]);
    }
}
