//! Random identifiers and credentials
//!
//! Account numbers, card numbers, CVVs and temporary passwords. Values that
//! must be unique in the database go through [`generate_unique`], which
//! retries against a caller-supplied existence check.

use rand::seq::SliceRandom;
use rand::Rng;
use std::future::Future;

use super::card::luhn_check_digit;
use super::DomainError;

/// Length of generated account numbers
pub const ACCOUNT_NUMBER_LEN: usize = 10;

/// Length of generated card numbers (PAN)
pub const CARD_NUMBER_LEN: usize = 16;

/// Length of generated temporary passwords
pub const TEMP_PASSWORD_LEN: usize = 12;

/// Attempts before giving up on a unique value
pub const MAX_UNIQUE_ATTEMPTS: u32 = 10;

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_+=?";

fn random_digits<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Ten-digit account number that never starts with zero
pub fn generate_account_number<R: Rng>(rng: &mut R) -> String {
    let first = char::from(b'0' + rng.gen_range(1..10u8));
    let mut number = String::with_capacity(ACCOUNT_NUMBER_LEN);
    number.push(first);
    number.push_str(&random_digits(rng, ACCOUNT_NUMBER_LEN - 1));
    number
}

/// Sixteen-digit Luhn-valid card number under the given issuer prefix
pub fn generate_card_number<R: Rng>(rng: &mut R, bin: &str) -> String {
    let body_len = CARD_NUMBER_LEN.saturating_sub(bin.len() + 1);
    let mut payload = String::with_capacity(CARD_NUMBER_LEN);
    payload.push_str(bin);
    payload.push_str(&random_digits(rng, body_len));
    let check = luhn_check_digit(&payload);
    payload.push(char::from_digit(check, 10).unwrap_or('0'));
    payload
}

/// Three-digit card verification value
pub fn generate_cvv<R: Rng>(rng: &mut R) -> String {
    random_digits(rng, 3)
}

/// Temporary password with at least one character from every class.
///
/// Ambiguous glyphs (0/O, 1/l/I) are left out of the alphabets since the
/// password is read from an email and typed by hand.
pub fn generate_temporary_password<R: Rng>(rng: &mut R) -> String {
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut chars: Vec<u8> = classes
        .iter()
        .filter_map(|class| class.choose(rng).copied())
        .collect();
    while chars.len() < TEMP_PASSWORD_LEN {
        if let Some(c) = all.choose(rng) {
            chars.push(*c);
        }
    }
    chars.shuffle(rng);

    chars.into_iter().map(char::from).collect()
}

/// Generate values until `exists` reports one as free.
///
/// `generate` is synchronous so no RNG handle is held across the lookup.
pub async fn generate_unique<G, P, Fut, E>(
    kind: &'static str,
    mut generate: G,
    mut exists: P,
) -> Result<String, E>
where
    G: FnMut() -> String,
    P: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: From<DomainError>,
{
    for attempt in 1..=MAX_UNIQUE_ATTEMPTS {
        let candidate = generate();
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
        tracing::debug!(kind, attempt, "Generated value already taken, retrying");
    }

    tracing::error!(kind, attempts = MAX_UNIQUE_ATTEMPTS, "Unique value generation exhausted");
    Err(DomainError::UniqueValueExhausted {
        kind,
        attempts: MAX_UNIQUE_ATTEMPTS,
    }
    .into())
}
