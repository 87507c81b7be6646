//! Database utilities for connections and schema migrations.
//!
//! - [`connection::connect_sqlite`] applies WAL and a 5000ms busy_timeout.
//! - [`migrate::run_sqlite`] applies the embedded migrations.
//!
//! Example:
//! ```no_run
//! use short_volume::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("short_volume_example.db");
//! migrate::run_sqlite(db_path.to_str().unwrap()).expect("migrations");
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;
