//! Request handlers for the CRUD, recipe and user endpoints.

mod crud;
mod recipes;
mod users;

pub use crud::*;
pub use recipes::*;
pub use users::*;
