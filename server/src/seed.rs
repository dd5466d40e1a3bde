//! Startup data: the administrator account and a starter catalog. Safe to run on every
//! boot; records that already exist are left untouched.

use tracing::{debug, info};

use crate::auth::{hash_password, Role};
use crate::config::Config;
use crate::models::{MovieInput, NewUser};
use crate::store::{Database, StoreError};
use crate::utils::error::AppError;

pub const ADMIN_USERNAME: &str = "admin";

fn starter_catalog() -> Vec<MovieInput> {
    [
        (
            "Inception",
            "A thief who steals corporate secrets through dream-sharing technology is given the task of planting an idea.",
            "Sci-Fi",
            "https://example.com/inception.jpg",
        ),
        (
            "The Dark Knight",
            "Batman faces the Joker, a criminal mastermind who plunges Gotham into anarchy.",
            "Action",
            "https://example.com/dark_knight.jpg",
        ),
        (
            "Interstellar",
            "A team of explorers travels through a wormhole in search of a new home for humanity.",
            "Sci-Fi",
            "https://example.com/interstellar.jpg",
        ),
    ]
    .into_iter()
    .map(|(title, description, genre, poster_image)| MovieInput {
        title: title.to_string(),
        description: description.to_string(),
        genre: genre.to_string(),
        poster_image: poster_image.to_string(),
    })
    .collect()
}

pub async fn run(db: &dyn Database, config: &Config) -> Result<(), AppError> {
    if let Some(password) = &config.admin_password {
        seed_admin(db, password).await?;
    }
    if config.seed_catalog {
        seed_catalog(db).await?;
    }
    Ok(())
}

async fn seed_admin(db: &dyn Database, password: &str) -> Result<(), AppError> {
    if db.find_user_by_username(ADMIN_USERNAME).await?.is_some() {
        debug!("Admin account already present");
        return Ok(());
    }

    let admin = NewUser {
        username: ADMIN_USERNAME.to_string(),
        password_hash: hash_password(password)?,
        role: Role::Admin,
    };
    match db.create_user(&admin).await {
        Ok(_) => info!(username = ADMIN_USERNAME, "Seeded admin account"),
        Err(StoreError::Conflict(_)) => debug!("Admin account created concurrently"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn seed_catalog(db: &dyn Database) -> Result<(), AppError> {
    let mut added = 0;
    for movie in starter_catalog() {
        match db.create_movie(&movie).await {
            Ok(_) => added += 1,
            Err(StoreError::Conflict(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    info!(added, "Seeded movie catalog");
    Ok(())
}
