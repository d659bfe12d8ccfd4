//! Thin host services around the stores: item CRUD that kicks off the
//! confirmation protocol, and user registration.

mod catalog;
mod users;

use thiserror::Error;

use crate::store::StoreError;

pub use catalog::CatalogService;
pub use users::UserService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}
