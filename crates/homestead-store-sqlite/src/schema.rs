//! SQL schema for the Homestead SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! layout so later migrations can be gated on it.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
///
/// `favorites` and `user_roles` carry exactly the columns listed by
/// `Collection::columns`, in the same order.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS auth_users (
    user_id       TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,  -- trimmed and lowercased
    password_hash TEXT NOT NULL,         -- argon2id PHC string
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- Only a digest of each bearer token is kept.
CREATE TABLE IF NOT EXISTS auth_sessions (
    token_hash  TEXT PRIMARY KEY,        -- hex SHA-256 of the token
    user_id     TEXT NOT NULL REFERENCES auth_users(user_id) ON DELETE CASCADE,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS favorites (
    id                TEXT PRIMARY KEY,
    user_id           TEXT NOT NULL REFERENCES auth_users(user_id) ON DELETE CASCADE,
    property_id       TEXT NOT NULL,
    property_title    TEXT,
    property_image    TEXT,
    property_price    TEXT,
    property_location TEXT,
    created_at        TEXT NOT NULL,
    UNIQUE (user_id, property_id)
);

CREATE TABLE IF NOT EXISTS user_roles (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES auth_users(user_id) ON DELETE CASCADE,
    role        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (user_id, role),
    CHECK  (role IN ('admin', 'moderator', 'user'))
);

CREATE INDEX IF NOT EXISTS auth_sessions_user_idx ON auth_sessions(user_id);
CREATE INDEX IF NOT EXISTS favorites_user_idx     ON favorites(user_id, created_at);
CREATE INDEX IF NOT EXISTS user_roles_user_idx    ON user_roles(user_id);

PRAGMA user_version = 1;
";
