//! Purpose: Shared JSON projections for CLI and HTTP serving paths.
//! Exports: `book_json`, `user_json`, `loan_json`, `search_hit_json`, `statistics_json`,
//! Exports: `summary_json`, `report_json`, `error_json`, `timestamp`.
//! Role: Keep payload shapes consistent across entry points.
//! Invariants: Stable key names for v0 payloads; ids are plain integers.
//! Invariants: Loans referencing unregistered users render the user as `null`.

use serde_json::{Map, Value, json};
use shelfkeep::api::{
    Book, BookId, Error, ErrorKind, Library, Loan, LoanId, SearchHit, Statistics, Summary, User,
    UserId, ValidationReport,
};
use std::error::Error as StdError;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub(crate) fn timestamp(value: OffsetDateTime) -> Value {
    match value.format(&Rfc3339) {
        Ok(text) => json!(text),
        Err(_) => Value::Null,
    }
}

pub(crate) fn book_json(id: BookId, book: &Book) -> Value {
    json!({
        "id": id.0,
        "title": book.title,
        "author": book.author,
        "year": book.year,
        "available": book.is_available(),
    })
}

pub(crate) fn user_json(id: UserId, user: &User) -> Value {
    let held: Vec<u64> = user.held_books().iter().map(|book| book.0).collect();
    json!({
        "id": id.0,
        "name": user.name,
        "email": user.email,
        "held_books": held,
    })
}

/// Loan joined with the book title and borrower name it references.
pub(crate) fn loan_json(library: &Library, id: LoanId, loan: &Loan) -> Value {
    let mut map = Map::new();
    map.insert("id".to_string(), json!(id.0));
    map.insert("user_id".to_string(), json!(loan.user.0));
    map.insert("book_id".to_string(), json!(loan.book.0));
    map.insert("loaned_at".to_string(), timestamp(loan.loaned_at));
    map.insert("due_at".to_string(), timestamp(loan.due_at));
    let book = library.get_book(loan.book).ok();
    map.insert(
        "book_title".to_string(),
        json!(book.map(|book| book.title.as_str())),
    );
    let user = library.get_user(loan.user).ok();
    map.insert(
        "user_name".to_string(),
        json!(user.map(|user| user.name.as_str())),
    );
    Value::Object(map)
}

pub(crate) fn search_hit_json(hit: &SearchHit<'_>) -> Value {
    json!({
        "id": hit.id.0,
        "book": book_json(hit.id, hit.book),
        "is_available": hit.is_available,
    })
}

pub(crate) fn statistics_json(stats: &Statistics) -> Value {
    json!({
        "total_books": stats.total_books,
        "available": stats.available,
        "borrowed": stats.borrowed,
        "total_authors": stats.total_authors,
        "active_borrowers": stats.active_borrowers,
        "active_loans": stats.active_loans,
        "authors": stats.authors,
    })
}

pub(crate) fn summary_json(summary: Summary) -> Value {
    json!({
        "total_books": summary.total_books,
        "available_books": summary.available_books,
        "total_users": summary.total_users,
        "active_loans": summary.active_loans,
    })
}

pub(crate) fn report_json(report: &ValidationReport) -> Value {
    let issues: Vec<Value> = report
        .issues
        .iter()
        .map(|issue| json!({ "code": issue.code, "message": issue.message }))
        .collect();
    json!({ "ok": report.is_ok(), "issues": issues })
}

pub(crate) fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::BookUnavailable => "book is not available".to_string(),
        ErrorKind::LoanNotFound => "loan not found".to_string(),
        ErrorKind::UserNotFound => "user not found".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

pub(crate) fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(book) = err.book() {
        inner.insert("book_id".to_string(), json!(book));
    }
    if let Some(user) = err.user() {
        inner.insert("user_id".to_string(), json!(user));
    }
    if let Some(loan) = err.loan() {
        inner.insert("loan_id".to_string(), json!(loan));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}
