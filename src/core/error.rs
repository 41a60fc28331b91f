// Structured error type shared by the engine, the CLI and the HTTP layer.
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    BookUnavailable,
    LoanNotFound,
    UserNotFound,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    book: Option<u64>,
    user: Option<u64>,
    loan: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            book: None,
            user: None,
            loan: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn book(&self) -> Option<u64> {
        self.book
    }

    pub fn user(&self) -> Option<u64> {
        self.user
    }

    pub fn loan(&self) -> Option<u64> {
        self.loan
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_book(mut self, book: u64) -> Self {
        self.book = Some(book);
        self
    }

    pub fn with_user(mut self, user: u64) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_loan(mut self, loan: u64) -> Self {
        self.loan = Some(loan);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(book) = self.book {
            write!(f, " (book: {book})")?;
        }
        if let Some(user) = self.user {
            write!(f, " (user: {user})")?;
        }
        if let Some(loan) = self.loan {
            write!(f, " (loan: {loan})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::BookUnavailable => 4,
        ErrorKind::LoanNotFound => 5,
        ErrorKind::UserNotFound => 6,
        ErrorKind::Io => 8,
    }
}
