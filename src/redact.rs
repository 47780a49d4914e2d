//! PII redaction applied to capability inputs before transmission
//!
//! Emails, phone numbers, and street addresses are replaced with labeled
//! placeholders. Runs on every LLM-bound payload; deterministic execution
//! never needs it because nothing leaves the process.

use once_cell::sync::Lazy;
use regex::Regex;

pub const EMAIL_PLACEHOLDER: &str = "[redacted-email]";
pub const PHONE_PLACEHOLDER: &str = "[redacted-phone]";
pub const ADDRESS_PLACEHOLDER: &str = "[redacted-address]";

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b").expect("valid email regex")
});

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\b[0-9]{3}-[0-9]{3}-[0-9]{4}\b|\b\([0-9]{3}\)\s*[0-9]{3}-[0-9]{4}\b")
    .expect("valid phone regex")
});

static ADDRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)\b\d{1,5}\s+(?:[A-Za-z][A-Za-z.']*\s+){1,3}(?:st(?:reet)?|ave(?:nue)?|blvd|boulevard|rd|road|dr(?:ive)?|ln|lane|ct|court|way|pl(?:ace)?|ter(?:race)?)\b\.?",
  )
  .expect("valid street address regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionStats {
  pub emails: usize,
  pub phones: usize,
  pub addresses: usize,
}

impl RedactionStats {
  pub fn total(&self) -> usize {
    self.emails + self.phones + self.addresses
  }
}

/// Replace PII-shaped substrings with placeholders. Addresses run first so a
/// street number is not left dangling next to an already-redacted token.
pub fn redact_pii(text: &str) -> (String, RedactionStats) {
  let mut stats = RedactionStats::default();

  stats.addresses = ADDRESS_REGEX.find_iter(text).count();
  let pass = ADDRESS_REGEX.replace_all(text, ADDRESS_PLACEHOLDER);

  stats.emails = EMAIL_REGEX.find_iter(&pass).count();
  let pass = EMAIL_REGEX.replace_all(&pass, EMAIL_PLACEHOLDER);

  stats.phones = PHONE_REGEX.find_iter(&pass).count();
  let pass = PHONE_REGEX.replace_all(&pass, PHONE_PLACEHOLDER);

  (pass.into_owned(), stats)
}
