pub mod db;

pub use db::{CatalogDb, DbError};
