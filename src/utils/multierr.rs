use std::error::Error;
use std::fmt;

/// Failures collected from independent units of work, each tagged with the
/// index of the unit that produced it.
#[derive(Debug)]
pub struct MultiError<E> {
    errors: Vec<(usize, E)>,
}

impl<E> MultiError<E> {
    pub fn errors(&self) -> &[(usize, E)] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing failed, otherwise the collected failures.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<E> FromIterator<(usize, E)> for MultiError<E> {
    fn from_iter<I: IntoIterator<Item = (usize, E)>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for MultiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: ", self.len())?;
        for (i, (index, error)) in self.errors().iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "[{}] {}", index, error)?;
        }
        Ok(())
    }
}

impl<E: Error + 'static> Error for MultiError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.errors.first().map(|(_, e)| e as &dyn Error)
    }
}
