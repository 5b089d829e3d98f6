pub mod connections;
pub mod result;
pub mod role;
pub mod schema;
