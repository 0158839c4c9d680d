//! Bulk insertion of synthetic users for load testing the search queries.

use std::time::Instant;

use rand::Rng;
use tracing::info;

use crate::auth::hash_password;
use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::models::{NewUser, UserRole};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const SEED_PASSWORD: &str = "Abc1234!";
const EMAIL_SUFFIX: &str = "@test.com";

const FIRST_NAMES: &[&str] = &[
    "Ava", "Ben", "Chloe", "Daniel", "Ella", "Felix", "Grace", "Henry", "Isla", "Jack", "Kai",
    "Lily", "Mason", "Nora", "Oscar", "Piper", "Quinn", "Ruby", "Sam", "Theo", "Uma", "Violet",
    "Wyatt", "Zoe",
];

const LAST_NAMES: &[&str] = &[
    "Adams", "Baker", "Clark", "Davis", "Evans", "Foster", "Garcia", "Harris", "Irwin", "Jones",
    "King", "Lopez", "Miller", "Nguyen", "Owens", "Patel", "Reed", "Smith", "Turner", "Walker",
    "Young",
];

const COLORS: &[&str] = &[
    "Amber", "Azure", "Coral", "Crimson", "Cyan", "Gold", "Indigo", "Ivory", "Jade", "Lime",
    "Magenta", "Olive", "Orchid", "Plum", "Rust", "Silver", "Teal", "Violet",
];

fn any<'a>(rng: &mut impl Rng, words: &[&'a str]) -> &'a str {
    words[rng.random_range(0..words.len())]
}

/// Emails embed the row index, so they stay unique within one run.
pub fn generate_users(count: usize, password_hash: &str) -> Vec<NewUser> {
    let mut rng = rand::rng();
    (0..count)
        .map(|i| NewUser {
            email: format!("{}{i}{EMAIL_SUFFIX}", any(&mut rng, FIRST_NAMES)),
            password_hash: password_hash.to_string(),
            role: UserRole::User,
            nickname: format!(
                "{}{}{}",
                any(&mut rng, COLORS),
                any(&mut rng, LAST_NAMES),
                any(&mut rng, FIRST_NAMES)
            ),
        })
        .collect()
}

pub fn seed_users(pool: &DbPool, count: usize, batch_size: usize) -> Result<usize, AppError> {
    let started = Instant::now();

    let password_hash = hash_password(SEED_PASSWORD)?;
    let users = generate_users(count, &password_hash);

    let inserted = {
        let mut conn = db::lock(pool)?;
        db::insert_users_batched(&mut conn, &users, batch_size)?
    };

    info!(
        inserted,
        batch_size,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Seeded users"
    );
    Ok(inserted)
}
