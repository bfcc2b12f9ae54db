//! Generated account identities.

use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

const FIRST_NAMES: &[&str] = &[
    "Adrian", "Alina", "Andrei", "Bianca", "Catalin", "Claudia", "Daniel", "Diana", "Elena",
    "Florin", "Gabriel", "Ioana", "Larisa", "Lucian", "Maria", "Mihai", "Monica", "Oana", "Paul",
    "Radu", "Roxana", "Sergiu", "Simona", "Stefan", "Teodora", "Victor",
];

const LAST_NAMES: &[&str] = &[
    "Albu", "Ardelean", "Balan", "Ciobanu", "Constantin", "Dinu", "Dobre", "Dumitrescu", "Florea",
    "Georgescu", "Ilie", "Ionescu", "Lazar", "Lupu", "Marin", "Matei", "Munteanu", "Nistor",
    "Popa", "Popescu", "Radu", "Rusu", "Stanciu", "Stoica", "Tudor", "Ungureanu",
];

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SPECIAL: &[u8] = b"!$%&*+-=?";

/// Random characters in the password body before the fixed suffix.
const PASSWORD_BODY_LEN: usize = 12;

/// One freshly generated account: names, derived address, credentials, and
/// when it was generated.
///
/// The serialized form is exactly the provisioning record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedIdentity {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub created_at: DateTime<Local>,
}

impl GeneratedIdentity {
    /// The part of the address before the `@`, as typed into creation forms.
    pub fn email_local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

/// Generates plausible account identities with strong one-off passwords.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityGenerator;

impl IdentityGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a fresh identity with an address under `domain`.
    pub fn generate(&self, domain: &str) -> GeneratedIdentity {
        let mut rng = rand::thread_rng();
        let first_name = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Adrian");
        let last_name = LAST_NAMES.choose(&mut rng).copied().unwrap_or("Popescu");
        let local_part = Self::derive_local_part(first_name, last_name);

        GeneratedIdentity {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: format!("{local_part}@{domain}"),
            password: Self::random_password(&mut rng),
            created_at: Local::now(),
        }
    }

    /// Address local part derived from the names: lower-cased, dot-joined.
    pub fn derive_local_part(first_name: &str, last_name: &str) -> String {
        format!(
            "{}.{}",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        )
    }

    /// Password with at least one character from every class, shuffled, with
    /// a fixed `#` suffix to satisfy symbol rules even after truncation.
    fn random_password(rng: &mut impl Rng) -> String {
        let mut chars: Vec<char> = vec![
            pick(rng, UPPER),
            pick(rng, LOWER),
            pick(rng, DIGITS),
            pick(rng, SPECIAL),
        ];

        let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();
        while chars.len() < PASSWORD_BODY_LEN {
            chars.push(pick(rng, &all));
        }
        chars.shuffle(rng);
        chars.push('#');
        chars.into_iter().collect()
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, set: &[u8]) -> char {
    set[rng.gen_range(0..set.len())] as char
}
